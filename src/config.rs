use crate::section::{HiddenPolicy, SectionKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StratumConfig {
    #[serde(default)]
    pub status: BufferConfig,
    #[serde(default = "BufferConfig::refs")]
    pub refs: BufferConfig,
    #[serde(default)]
    pub sections: SectionsConfig,
    #[serde(default)]
    pub repos: ReposConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            status: BufferConfig::default(),
            refs: BufferConfig::refs(),
            sections: SectionsConfig::default(),
            repos: ReposConfig::default(),
            watch: WatchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// `[status]` / `[refs]`: inserter names in rendering order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    pub sections: Vec<String>,
}

impl BufferConfig {
    fn refs() -> Self {
        Self {
            sections: ["local", "remotes", "tags"].map(String::from).to_vec(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            sections: [
                "head", "merge", "untracked", "unstaged", "staged", "stashes", "unpulled", "unpushed",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// `[sections]`: kinds collapsed the first time they appear
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionsConfig {
    #[serde(default = "default_hidden")]
    pub hidden: Vec<SectionKind>,
}

fn default_hidden() -> Vec<SectionKind> {
    vec![SectionKind::Branch, SectionKind::File, SectionKind::Stash]
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            hidden: default_hidden(),
        }
    }
}

impl SectionsConfig {
    pub fn policy(&self) -> HiddenPolicy {
        HiddenPolicy::new(self.hidden.iter().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReposConfig {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_depth() -> usize {
    1
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            depth: default_depth(),
            ignore: Vec::new(),
        }
    }
}

impl ReposConfig {
    /// Roots with a leading `~` replaced by the home directory
    pub fn root_paths(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| expand_home(r)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

impl LogConfig {
    /// Configured log file, or `<cache dir>/stratum/stratum.log`
    pub fn file_path(&self) -> Option<PathBuf> {
        match &self.file {
            Some(file) => Some(expand_home(file)),
            None => dirs::cache_dir().map(|d| d.join("stratum").join("stratum.log")),
        }
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Load config by merging global defaults with per-repo overrides.
/// Priority: per-repo `.stratum.toml` > global `<config dir>/stratum/config.toml` > built-in defaults.
/// Merging is deep: individual fields within tables override independently.
pub fn load_config(repo_root: Option<&Path>) -> StratumConfig {
    let global = dirs::config_dir().map(|d| d.join("stratum").join("config.toml"));
    let local = repo_root.map(|r| r.join(".stratum.toml"));
    load_layers(global.as_deref(), local.as_deref())
}

fn read_table(path: &Path) -> Option<toml::Table> {
    let content = std::fs::read_to_string(path).ok()?;
    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn load_layers(global: Option<&Path>, local: Option<&Path>) -> StratumConfig {
    let global_table = global.and_then(read_table);
    let local_table = local.and_then(read_table);

    let merged = match (global_table, local_table) {
        (Some(mut global), Some(local)) => {
            deep_merge(&mut global, local);
            global
        }
        (Some(global), None) => global,
        (None, Some(local)) => local,
        (None, None) => return StratumConfig::default(),
    };

    match toml::Value::Table(merged).try_into() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "invalid configuration, using defaults");
            StratumConfig::default()
        }
    }
}

/// Recursively merge `overlay` into `base`. Overlay values win; nested tables are merged recursively.
fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    // ── defaults ──

    #[test]
    fn defaults_when_no_files() {
        let config = load_layers(None, None);
        assert_eq!(config, StratumConfig::default());
        assert_eq!(config.status.sections.len(), 8);
        assert_eq!(config.repos.depth, 1);
        assert!(config.watch.enabled);
    }

    #[test]
    fn missing_tables_get_defaults() {
        let dir = TempDir::new().unwrap();
        let local = write(&dir, "local.toml", "[watch]\nenabled = false\n");
        let config = load_layers(None, Some(&local));
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.refs.sections, vec!["local", "remotes", "tags"]);
        assert_eq!(config.sections.hidden, default_hidden());
    }

    // ── merging ──

    #[test]
    fn local_overrides_global_per_field() {
        let dir = TempDir::new().unwrap();
        let global = write(
            &dir,
            "global.toml",
            "[repos]\nroots = [\"/src\"]\ndepth = 3\n[log]\nlevel = \"debug\"\n",
        );
        let local = write(&dir, "local.toml", "[repos]\ndepth = 0\n");
        let config = load_layers(Some(&global), Some(&local));
        assert_eq!(config.repos.roots, vec!["/src"]);
        assert_eq!(config.repos.depth, 0);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn section_order_and_hidden_kinds() {
        let dir = TempDir::new().unwrap();
        let local = write(
            &dir,
            "local.toml",
            "[status]\nsections = [\"staged\", \"head\"]\n[sections]\nhidden = [\"tag\", \"merge-log\"]\n",
        );
        let config = load_layers(None, Some(&local));
        assert_eq!(config.status.sections, vec!["staged", "head"]);
        let policy = config.sections.policy();
        assert!(policy.default_hidden(SectionKind::MergeLog));
        assert!(!policy.default_hidden(SectionKind::Branch));
    }

    #[test]
    fn unparsable_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let global = write(&dir, "global.toml", "[watch]\ndebounce_ms = 100\n");
        let local = write(&dir, "local.toml", "this is = = not toml");
        let config = load_layers(Some(&global), Some(&local));
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let local = write(&dir, "local.toml", "[repos]\ndepth = \"deep\"\n");
        assert_eq!(load_layers(None, Some(&local)), StratumConfig::default());
    }

    #[test]
    fn deep_merge_nested() {
        let mut base: toml::Table = "[a]\nx = 1\ny = 2\n".parse().unwrap();
        let overlay: toml::Table = "[a]\ny = 3\n[b]\nz = 4\n".parse().unwrap();
        deep_merge(&mut base, overlay);
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }

    // ── paths ──

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/src"), home.join("src"));
            assert_eq!(expand_home("~"), home);
        }
        assert_eq!(expand_home("/abs/~x"), PathBuf::from("/abs/~x"));
    }
}
