//! Multi-target build orchestrator: one source tree, several platform
//! bundles, each produced by its own stage pipeline.

pub mod analysis;
pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod plugins;
pub mod utils;

pub use crate::core::{BuildDriver, RunReport, TargetDescriptor};
pub use crate::utils::{BuildError, ConfigLoader, Result};
