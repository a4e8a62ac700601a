// Command line boundary
pub mod commands;

pub use commands::{Cli, CliHandler, Commands};
