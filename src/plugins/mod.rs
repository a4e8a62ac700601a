// Output plugins: extra content attached to emitted chunks

pub mod banner_plugin;
pub mod module_package_plugin;

pub use banner_plugin::BannerPlugin;
pub use module_package_plugin::ModulePackagePlugin;
