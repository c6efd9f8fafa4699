pub mod cli;
pub mod commands;
pub mod load_config;
pub mod progress;
pub mod prompt;
pub mod ragflow;

pub use cli::{run, Cli, Commands};
