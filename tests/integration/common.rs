use std::path::Path;
use std::sync::Arc;
use tandem::core::models::BuildConfig;
use tandem::infrastructure::TokioFileSystemService;
use tandem::{BuildDriver, ConfigLoader, RunReport};
use tempfile::TempDir;

/// A project tree in a temporary directory
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, contents: &str) -> &Self {
        let path = self.root().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        self
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.root().join(file))
            .unwrap_or_else(|e| panic!("{} was not written: {}", file, e))
    }

    pub fn exists(&self, file: &str) -> bool {
        self.root().join(file).exists()
    }

    pub fn config(&self, json: &str) -> BuildConfig {
        ConfigLoader::parse(json, self.root()).unwrap()
    }

    pub fn driver(config: &BuildConfig) -> BuildDriver {
        BuildDriver::new(Arc::new(TokioFileSystemService)).with_schedule(config.schedule, config.failure_mode)
    }

    pub async fn build(&self, json: &str) -> RunReport {
        let config = self.config(json);
        Self::driver(&config).run(&config).await.unwrap()
    }
}

/// Builds a single-target configuration around `options` (a JSON object body)
pub fn single_target(options: &str) -> String {
    format!(r#"{{ "targets": [ {{ "name": "node", {} }} ] }}"#, options)
}
