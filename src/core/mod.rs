// Core domain layer
pub mod descriptor;
pub mod diagnostics;
pub mod driver;
pub mod graph;
pub mod interfaces;
pub mod models;
pub mod plugin;

pub use descriptor::TargetDescriptor;
pub use driver::{BuildDriver, RunReport, TargetReport};
pub use interfaces::*;
pub use models::*;
