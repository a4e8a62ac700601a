//! Third-party license report of one target.

use crate::core::diagnostics::{Diagnostics, LICENSE_COLLECTION};
use crate::core::graph::ModuleGraph;
use crate::core::interfaces::FileSystemService;
use crate::core::models::PackageRef;
use crate::infrastructure::node_resolver::{normalize, PackageJson};
use crate::infrastructure::processors::tree_shaker::ShakeResult;
use crate::utils::{BuildError, Logger, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const LICENSE_FILE: &str = "LICENSE.md";

const LICENSE_FILE_PREFIXES: &[&str] = &["LICENSE", "LICENCE", "COPYING"];
const SEPARATOR: &str = "\n\n---------------------------------------\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub name: String,
    pub version: String,
    pub license: Option<String>,
    pub text: Option<String>,
    pub author: Option<String>,
    pub repository: Option<String>,
}

/// Collects one record per bundled third-party package, keyed by
/// (name, version). One instance per target.
pub struct LicenseAggregator<'a> {
    fs: &'a dyn FileSystemService,
    target: String,
    project_root: PathBuf,
    records: BTreeMap<(String, String), LicenseRecord>,
}

impl<'a> LicenseAggregator<'a> {
    pub fn new(fs: &'a dyn FileSystemService, target: &str, project_root: &Path) -> Self {
        Self {
            fs,
            target: target.to_string(),
            project_root: normalize(project_root),
            records: BTreeMap::new(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &LicenseRecord> {
        self.records.values()
    }

    /// Records the packages owning the modules that survived treeshaking.
    /// Failures are reported as notices and never abort the target.
    pub async fn collect(&mut self, graph: &ModuleGraph, shaken: &ShakeResult, diagnostics: &Diagnostics) -> usize {
        let mut seen_dirs = BTreeSet::new();
        for id in shaken.included_modules(graph) {
            let Some(package) = graph.get(&id).and_then(|n| n.package.as_ref()) else {
                continue;
            };
            if normalize(&package.dir) == self.project_root || !seen_dirs.insert(package.dir.clone()) {
                continue;
            }
            if let Err(e) = self.record(package).await {
                diagnostics.notice(LICENSE_COLLECTION, e.to_string(), Some(id.to_string()));
            }
        }
        Logger::debug(&format!("[{}] {} licensed packages bundled", self.target, self.records.len()));
        self.records.len()
    }

    async fn record(&mut self, package: &PackageRef) -> Result<()> {
        let manifest = &package.manifest;
        let name = manifest
            .name
            .clone()
            .ok_or_else(|| BuildError::license(&package.dir.display().to_string(), "package.json has no name"))?;
        let version = manifest.version.clone().unwrap_or_else(|| "0.0.0".to_string());
        let key = (name.clone(), version.clone());
        if self.records.contains_key(&key) {
            return Ok(());
        }

        let text = self
            .license_text(&package.dir)
            .await
            .map_err(|e| BuildError::license(&name, e.to_string()))?;
        self.records.insert(
            key,
            LicenseRecord {
                name,
                version,
                license: manifest.license_id(),
                text,
                author: manifest.author_name(),
                repository: manifest.repository_url(),
            },
        );
        Ok(())
    }

    async fn license_text(&self, dir: &Path) -> Result<Option<String>> {
        let entries = self.fs.list_dir(dir).await?;
        // A report written into the project root is not the project's license
        let is_report = |name: &str| dir == self.project_root && name == LICENSE_FILE;
        let found = entries.iter().find(|name| {
            let upper = name.to_uppercase();
            if is_report(name.as_str()) {
                return false;
            }
            LICENSE_FILE_PREFIXES.iter().any(|p| upper.starts_with(p))
        });
        match found {
            Some(file) => Ok(Some(self.fs.read_file(&dir.join(file)).await?.trim().to_string())),
            None => Ok(None),
        }
    }

    /// Markdown report, dependencies ordered by name then version
    pub fn render(&self, project: Option<&PackageJson>, project_license: Option<&str>) -> String {
        let project_name = project.map(|p| p.display_name()).unwrap_or_else(|| self.target.clone());
        let mut out = String::new();

        if let Some(text) = project_license {
            let id = project.and_then(|p| p.license_id()).unwrap_or_else(|| "following".to_string());
            out.push_str(&format!("# {} core license\n", project_name));
            out.push_str(&format!("{} is released under the {} license:\n\n", project_name, id));
            out.push_str(text.trim());
            out.push_str("\n\n");
        }

        let licenses: BTreeSet<&str> = self.records.values().filter_map(|r| r.license.as_deref()).collect();
        out.push_str("# Licenses of bundled dependencies\n");
        out.push_str(&format!(
            "The published {} artifact additionally contains code with the following licenses:\n",
            project_name
        ));
        out.push_str(&licenses.into_iter().collect::<Vec<_>>().join(", "));
        out.push_str("\n\n# Bundled dependencies:\n");

        let sections: Vec<String> = self.records.values().map(render_record).collect();
        out.push_str(&sections.join(SEPARATOR));
        out.push('\n');
        out
    }

    /// Writes `LICENSE.md` into `dir`; consumes the aggregator so a target
    /// writes its report at most once
    pub async fn write(self, dir: &Path) -> Result<PathBuf> {
        let project_dir = self.project_root.clone();
        let project = self
            .fs
            .read_file(&project_dir.join("package.json"))
            .await
            .ok()
            .and_then(|raw| serde_json::from_str::<PackageJson>(&raw).ok());
        let project_license = match self.license_text(&project_dir).await {
            Ok(text) => text,
            Err(e) => {
                Logger::warn(&format!("[{}] no project license text: {}", self.target, e));
                None
            }
        };

        let report = self.render(project.as_ref(), project_license.as_deref());
        self.fs.create_directory(dir).await?;
        let path = dir.join(LICENSE_FILE);
        self.fs.write_file(&path, &report).await?;
        Logger::info(&format!(
            "[{}] wrote {} ({} packages)",
            self.target,
            path.display(),
            self.records.len()
        ));
        Ok(path)
    }
}

fn render_record(record: &LicenseRecord) -> String {
    let mut out = format!("## {}\n", record.name);
    if let Some(license) = &record.license {
        out.push_str(&format!("License: {}\n", license));
    }
    if let Some(author) = &record.author {
        out.push_str(&format!("By: {}\n", author));
    }
    if let Some(repository) = &record.repository {
        out.push_str(&format!("Repository: {}\n", repository));
    }
    if let Some(text) = &record.text {
        out.push('\n');
        let quoted: Vec<String> = text
            .lines()
            .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {}", line) })
            .collect();
        out.push_str(&quoted.join("\n"));
    }
    out.trim_end().to_string()
}
