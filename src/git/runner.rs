use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, warn};

/// Captured result of one git invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn from_output(output: &Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout);
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: stdout.lines().map(str::to_string).collect(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Called once an asynchronous invocation has finished and its output is captured
pub type OnComplete = Box<dyn FnOnce(ToolOutput) + Send + 'static>;

/// The boundary to the git executable. Arguments are pre-tokenized; no shell is involved.
pub trait GitRunner {
    /// Run git synchronously. Errors only when git could not be started.
    fn run(&self, args: &[&str]) -> Result<ToolOutput>;

    /// Start git and return immediately; `on_complete` fires when it exits
    fn run_async(&self, args: Vec<String>, on_complete: OnComplete) -> Result<()>;

    /// Stdout lines of a command that must succeed
    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let out = self.run(args)?;
        if !out.success() {
            anyhow::bail!("git {} failed: {}", args.join(" "), out.stderr.trim());
        }
        Ok(out.stdout)
    }

    /// First stdout line, or `None` when the command fails or prints nothing
    fn optional_line(&self, args: &[&str]) -> Result<Option<String>> {
        let out = self.run(args)?;
        if !out.success() {
            return Ok(None);
        }
        Ok(out
            .stdout
            .into_iter()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()))
    }
}

/// Runs the real `git` binary inside one repository
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the repository containing `dir`
    pub fn discover(dir: &Path) -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()
            .context(format!("Failed to run git in '{}'", dir.display()))?;

        if !output.status.success() {
            anyhow::bail!("Not a git repository: {}", dir.display());
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .env("GIT_OPTIONAL_LOCKS", "0");
        cmd
    }
}

impl GitRunner for Git {
    fn run(&self, args: &[&str]) -> Result<ToolOutput> {
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
        let out = ToolOutput::from_output(&output);
        debug!(
            args = %args.join(" "),
            exit = out.exit_code,
            lines = out.stdout.len(),
            "git finished"
        );
        Ok(out)
    }

    fn run_async(&self, args: Vec<String>, on_complete: OnComplete) -> Result<()> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let child = self
            .command(&refs)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn git {}", args.join(" ")))?;

        std::thread::spawn(move || {
            let out = match child.wait_with_output() {
                Ok(output) => ToolOutput::from_output(&output),
                Err(e) => {
                    warn!(args = %args.join(" "), error = %e, "waiting for git failed");
                    ToolOutput {
                        exit_code: -1,
                        stdout: Vec::new(),
                        stderr: e.to_string(),
                    }
                }
            };
            debug!(args = %args.join(" "), exit = out.exit_code, "async git finished");
            on_complete(out);
        });
        Ok(())
    }
}

#[cfg(test)]
pub use scripted::ScriptedRunner;
