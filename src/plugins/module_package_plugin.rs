// Module Package Plugin: declares the module type of an output directory

use crate::core::models::OutputFormat;
use crate::infrastructure::file_system::PendingFile;
use std::path::Path;

/// Writes `{"type": …}` so Node picks the right loader for the chunks
pub struct ModulePackagePlugin {
    format: OutputFormat,
}

impl ModulePackagePlugin {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn module_type(&self) -> &'static str {
        match self.format {
            OutputFormat::Es => "module",
            OutputFormat::Cjs => "commonjs",
        }
    }

    /// The package file at `relative` (e.g. `package.json`) below `dir`
    pub fn file(&self, dir: &Path, relative: &str) -> PendingFile {
        PendingFile {
            path: dir.join(relative),
            contents: format!("{{\"type\":\"{}\"}}\n", self.module_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_module_type_follows_format() {
        let es = ModulePackagePlugin::new(OutputFormat::Es).file(Path::new("/out/es"), "package.json");
        assert_eq!(es.path, PathBuf::from("/out/es/package.json"));
        assert_eq!(es.contents, "{\"type\":\"module\"}\n");

        let cjs = ModulePackagePlugin::new(OutputFormat::Cjs);
        assert_eq!(cjs.module_type(), "commonjs");
    }
}
