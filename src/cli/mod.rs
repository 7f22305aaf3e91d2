pub mod args;
pub mod commands;

pub use args::{Cli, Commands, SourceKind};
pub use commands::run;
