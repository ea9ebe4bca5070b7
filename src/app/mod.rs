mod state;

pub use state::{editor_command, App, EditorLaunch, Visit};
