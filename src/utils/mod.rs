// Shared utilities module
pub mod config_loader;
pub mod errors;
pub mod logging;
pub mod path_aliases;

pub use config_loader::{CliOverrides, ConfigLoader};
pub use errors::*;
pub use logging::*;
