// Infrastructure layer
pub mod file_system;
pub mod license;
pub mod node_resolver;
pub mod processors;
pub mod resolver;

pub use file_system::*;
pub use license::LicenseAggregator;
pub use node_resolver::{NodeModuleResolver, PackageJson};
pub use resolver::{Resolver, ResolverOptions};
