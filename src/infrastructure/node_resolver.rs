use crate::core::models::{PackageRef, Platform};
use crate::utils::Logger;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Package.json structure for parsing npm packages
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub exports: Option<Value>,
    #[serde(default)]
    pub license: Option<Value>,
    #[serde(default)]
    pub author: Option<Value>,
    #[serde(default)]
    pub repository: Option<Value>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default, rename = "sideEffects")]
    pub side_effects: Option<SideEffectsField>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SideEffectsField {
    Flag(bool),
    Patterns(Vec<String>),
}

impl PackageJson {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// SPDX id from `"license": "MIT"` or the legacy `{"type": "MIT"}` form
    pub fn license_id(&self) -> Option<String> {
        match self.license.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("type").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub fn author_name(&self) -> Option<String> {
        match self.author.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub fn repository_url(&self) -> Option<String> {
        let url = match self.repository.as_ref()? {
            Value::String(s) => s.clone(),
            Value::Object(o) => o.get("url").and_then(Value::as_str)?.to_string(),
            _ => return None,
        };
        Some(url.trim_start_matches("git+").to_string())
    }
}

/// Outcome of resolving a bare or relative specifier on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeResolution {
    File(PathBuf),
    /// The package's `browser` map replaces the module with nothing
    Empty,
}

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants", "crypto",
    "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "fs/promises", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "path/posix", "path/win32", "perf_hooks",
    "process", "punycode", "querystring", "readline", "repl", "stream", "stream/promises",
    "string_decoder", "sys", "timers", "timers/promises", "tls", "trace_events", "tty", "url", "util",
    "util/types", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// Node.js-style module resolution implementation
pub struct NodeModuleResolver {
    extensions: Vec<String>,
    /// Cache of package.json files, `None` when absent or unreadable
    package_cache: DashMap<PathBuf, Option<Arc<PackageJson>>>,
}

impl NodeModuleResolver {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            package_cache: DashMap::new(),
        }
    }

    pub fn is_builtin(specifier: &str) -> bool {
        specifier.starts_with("node:") || NODE_BUILTINS.contains(&specifier)
    }

    /// Check if a specifier is a bare package import
    pub fn is_bare(specifier: &str) -> bool {
        !specifier.starts_with("./")
            && !specifier.starts_with("../")
            && !specifier.starts_with('/')
            && specifier != "."
            && specifier != ".."
    }

    /// Resolve a relative or absolute path with extension probing and
    /// directory index files
    pub async fn resolve_path(&self, path: &Path, platform: Platform) -> Option<NodeResolution> {
        let path = normalize(path);
        if let Some(file) = self.resolve_as_file(&path).await {
            return Some(self.apply_browser_file_map(file, platform).await);
        }
        if !is_dir(&path).await {
            return None;
        }

        if let Some(pkg) = self.read_package_json(&path.join("package.json")).await {
            if let Some(entry) = self.package_entry(&path, &pkg, platform).await {
                return Some(entry);
            }
        }
        let file = self.resolve_index(&path).await?;
        Some(self.apply_browser_file_map(file, platform).await)
    }

    /// Resolve a node_modules package, walking up from `from_dir`
    pub async fn resolve_package(&self, specifier: &str, from_dir: &Path, platform: Platform) -> Option<NodeResolution> {
        let (pkg_name, subpath) = parse_package_specifier(specifier);
        let mut current = Some(from_dir);

        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if is_dir(&package_dir).await {
                if let Some(found) = self.resolve_in_package(&package_dir, subpath.as_deref(), platform).await {
                    return Some(found);
                }
            }
            current = dir.parent();
        }
        None
    }

    /// Bare specifier remapped by the `browser` object of the importer's package
    pub async fn browser_remap(&self, specifier: &str, importer: &Path) -> Option<NodeResolution> {
        let package = self.nearest_package(importer).await?;
        let Some(BrowserField::Object(map)) = &package.manifest.browser else {
            return None;
        };
        match map.get(specifier)? {
            Value::Bool(false) => Some(NodeResolution::Empty),
            Value::String(target) if NodeModuleResolver::is_bare(target) => {
                self.resolve_package(target, &package.dir, Platform::Browser).await
            }
            Value::String(target) => self.resolve_as_file(&normalize(&package.dir.join(target))).await.map(NodeResolution::File),
            _ => None,
        }
    }

    async fn resolve_in_package(&self, package_dir: &Path, subpath: Option<&str>, platform: Platform) -> Option<NodeResolution> {
        let pkg = self.read_package_json(&package_dir.join("package.json")).await;

        if let Some(exports) = pkg.as_ref().and_then(|p| p.exports.as_ref()) {
            let key = match subpath {
                Some(sub) => format!("./{}", sub),
                None => ".".to_string(),
            };
            if let Some(target) = resolve_exports(exports, &key, platform) {
                let file = normalize(&package_dir.join(target));
                return self.resolve_as_file(&file).await.map(NodeResolution::File);
            }
            Logger::debug(&format!("{} does not export {}", package_dir.display(), key));
        }

        match (subpath, pkg) {
            (Some(sub), _) => self.resolve_path(&package_dir.join(sub), platform).await,
            (None, Some(pkg)) => match self.package_entry(package_dir, &pkg, platform).await {
                Some(entry) => Some(entry),
                None => self.resolve_index(package_dir).await.map(NodeResolution::File),
            },
            (None, None) => self.resolve_index(package_dir).await.map(NodeResolution::File),
        }
    }

    /// Entry point from `module`, `browser` (browser platform) and `main`
    async fn package_entry(&self, package_dir: &Path, pkg: &PackageJson, platform: Platform) -> Option<NodeResolution> {
        let mut candidates = Vec::new();
        if let Some(module) = &pkg.module {
            candidates.push(module.clone());
        }
        if platform == Platform::Browser {
            if let Some(BrowserField::String(browser)) = &pkg.browser {
                candidates.insert(0, browser.clone());
            }
        }
        if let Some(main) = &pkg.main {
            candidates.push(main.clone());
        }

        for candidate in candidates {
            let entry = normalize(&package_dir.join(&candidate));
            if let Some(file) = self.resolve_as_file(&entry).await {
                return Some(self.apply_browser_file_map(file, platform).await);
            }
            if let Some(file) = self.resolve_index(&entry).await {
                return Some(self.apply_browser_file_map(file, platform).await);
            }
        }
        None
    }

    /// Applies `browser: { "./file.js": "./file-browser.js" | false }`
    async fn apply_browser_file_map(&self, file: PathBuf, platform: Platform) -> NodeResolution {
        if platform != Platform::Browser {
            return NodeResolution::File(file);
        }
        let Some(package) = self.nearest_package(&file).await else {
            return NodeResolution::File(file);
        };
        let Some(BrowserField::Object(map)) = &package.manifest.browser else {
            return NodeResolution::File(file);
        };

        for (key, value) in map {
            if NodeModuleResolver::is_bare(key) {
                continue;
            }
            let Some(mapped) = self.resolve_as_file(&normalize(&package.dir.join(key))).await else {
                continue;
            };
            if mapped != file {
                continue;
            }
            match value {
                Value::Bool(false) => return NodeResolution::Empty,
                Value::String(target) => {
                    if let Some(replacement) = self.resolve_as_file(&normalize(&package.dir.join(target))).await {
                        return NodeResolution::File(replacement);
                    }
                }
                _ => {}
            }
        }
        NodeResolution::File(file)
    }

    /// Try to resolve as a file with the configured extensions appended
    pub async fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if is_file(path).await {
            return Some(path.to_path_buf());
        }

        for ext in &self.extensions {
            let mut with_ext = path.as_os_str().to_os_string();
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if is_file(&with_ext).await {
                return Some(with_ext);
            }
        }

        // `./util.js` written in TypeScript sources refers to `util.ts`
        if let Some("js" | "mjs") = path.extension().and_then(|e| e.to_str()) {
            for ext in ["ts", "tsx", "mts"] {
                let swapped = path.with_extension(ext);
                if is_file(&swapped).await {
                    return Some(swapped);
                }
            }
        }
        None
    }

    async fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        if !is_dir(dir).await {
            return None;
        }
        self.resolve_as_file(&dir.join("index")).await
    }

    /// Read and cache package.json
    pub async fn read_package_json(&self, path: &Path) -> Option<Arc<PackageJson>> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let parsed = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<PackageJson>(&content) {
                Ok(pkg) => Some(Arc::new(pkg)),
                Err(e) => {
                    Logger::warn(&format!("ignoring malformed {}: {}", path.display(), e));
                    None
                }
            },
            Err(_) => None,
        };

        self.package_cache.insert(path.to_path_buf(), parsed.clone());
        parsed
    }

    /// Closest package.json above `file`
    pub async fn nearest_package(&self, file: &Path) -> Option<PackageRef> {
        let mut current = file.parent();
        while let Some(dir) = current {
            if let Some(manifest) = self.read_package_json(&dir.join("package.json")).await {
                return Some(PackageRef {
                    dir: dir.to_path_buf(),
                    manifest,
                });
            }
            current = dir.parent();
        }
        None
    }
}

/// Parse package specifier into package name and subpath
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let mut name = parts.next().unwrap_or_default().to_string();
    if specifier.starts_with('@') {
        if let Some(scoped) = parts.next() {
            name = format!("{}/{}", name, scoped);
        }
    }
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

fn conditions(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Browser => &["browser", "import", "module", "default"],
        Platform::Node | Platform::Shared => &["node", "import", "module", "default"],
    }
}

/// Resolves a subpath (`.` or `./x`) through an `exports` field
pub fn resolve_exports(exports: &Value, subpath: &str, platform: Platform) -> Option<String> {
    let is_subpath_map = match exports {
        Value::Object(map) => map.keys().any(|k| k.starts_with('.')),
        _ => false,
    };

    if !is_subpath_map {
        return (subpath == ".").then(|| resolve_conditions(exports, platform)).flatten();
    }

    let map = exports.as_object()?;
    if let Some(entry) = map.get(subpath) {
        return resolve_conditions(entry, platform);
    }
    for (key, entry) in map {
        if let Some((prefix, suffix)) = key.split_once('*') {
            if let Some(rest) = subpath.strip_prefix(prefix).and_then(|r| r.strip_suffix(suffix)) {
                return resolve_conditions(entry, platform).map(|t| t.replace('*', rest));
            }
        }
    }
    None
}

fn resolve_conditions(entry: &Value, platform: Platform) -> Option<String> {
    match entry {
        Value::String(target) => Some(target.clone()),
        Value::Array(items) => items.iter().find_map(|item| resolve_conditions(item, platform)),
        Value::Object(map) => {
            let wanted = conditions(platform);
            map.iter()
                .filter(|(condition, _)| wanted.contains(&condition.as_str()))
                .find_map(|(_, value)| resolve_conditions(value, platform))
        }
        _ => None,
    }
}

/// Lexically removes `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        [".ts", ".js", ".json", ".md"].iter().map(|s| s.to_string()).collect()
    }

    async fn write(path: &Path, content: &str) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("acorn"), ("acorn".to_string(), None));
        assert_eq!(
            parse_package_specifier("acorn/dist/acorn.mjs"),
            ("acorn".to_string(), Some("dist/acorn.mjs".to_string()))
        );
        assert_eq!(parse_package_specifier("@scope/pkg"), ("@scope/pkg".to_string(), None));
        assert_eq!(
            parse_package_specifier("@scope/pkg/sub"),
            ("@scope/pkg".to_string(), Some("sub".to_string()))
        );
    }

    #[test]
    fn test_exports_conditions_follow_platform() {
        let exports = json!({
            ".": { "node": "./dist/node.js", "browser": "./dist/browser.js", "default": "./dist/index.js" },
            "./feature/*": "./dist/feature/*.js"
        });

        assert_eq!(resolve_exports(&exports, ".", Platform::Node).as_deref(), Some("./dist/node.js"));
        assert_eq!(resolve_exports(&exports, ".", Platform::Browser).as_deref(), Some("./dist/browser.js"));
        assert_eq!(
            resolve_exports(&exports, "./feature/x", Platform::Node).as_deref(),
            Some("./dist/feature/x.js")
        );
        assert_eq!(resolve_exports(&json!("./main.js"), ".", Platform::Node).as_deref(), Some("./main.js"));
        assert_eq!(resolve_exports(&json!("./main.js"), "./other", Platform::Node), None);
    }

    #[test]
    fn test_license_metadata_forms() {
        let pkg: PackageJson = serde_json::from_value(json!({
            "name": "legacy",
            "license": { "type": "BSD-2-Clause" },
            "author": { "name": "A. Person" },
            "repository": { "url": "git+https://example.com/legacy.git" },
            "sideEffects": ["*.css"]
        }))
        .unwrap();

        assert_eq!(pkg.license_id().as_deref(), Some("BSD-2-Clause"));
        assert_eq!(pkg.author_name().as_deref(), Some("A. Person"));
        assert_eq!(pkg.repository_url().as_deref(), Some("https://example.com/legacy.git"));
        assert_eq!(pkg.side_effects, Some(SideEffectsField::Patterns(vec!["*.css".to_string()])));
    }

    #[tokio::test]
    async fn test_relative_resolution_tries_extensions_and_index() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("src/utils.ts"), "").await;
        write(&root.join("src/lib/index.ts"), "").await;
        let resolver = NodeModuleResolver::new(extensions());

        assert_eq!(
            resolver.resolve_path(&root.join("src/./utils"), Platform::Node).await,
            Some(NodeResolution::File(root.join("src/utils.ts")))
        );
        assert_eq!(
            resolver.resolve_path(&root.join("src/lib"), Platform::Node).await,
            Some(NodeResolution::File(root.join("src/lib/index.ts")))
        );
        assert_eq!(
            resolver.resolve_path(&root.join("src/utils.js"), Platform::Node).await,
            Some(NodeResolution::File(root.join("src/utils.ts")))
        );
    }

    #[tokio::test]
    async fn test_package_fields_per_platform() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let pkg = root.join("node_modules/dual");
        write(
            &pkg.join("package.json"),
            r#"{"name": "dual", "version": "1.0.0", "main": "./main.js", "module": "./esm.js",
                "browser": {"./esm.js": "./esm-browser.js", "./fs-shim.js": false}}"#,
        )
        .await;
        write(&pkg.join("main.js"), "").await;
        write(&pkg.join("esm.js"), "").await;
        write(&pkg.join("esm-browser.js"), "").await;
        write(&pkg.join("fs-shim.js"), "").await;
        let resolver = NodeModuleResolver::new(extensions());
        let from = root.join("src");

        assert_eq!(
            resolver.resolve_package("dual", &from, Platform::Node).await,
            Some(NodeResolution::File(pkg.join("esm.js")))
        );
        assert_eq!(
            resolver.resolve_package("dual", &from, Platform::Browser).await,
            Some(NodeResolution::File(pkg.join("esm-browser.js")))
        );
        assert_eq!(
            resolver.resolve_package("dual/fs-shim", &from, Platform::Browser).await,
            Some(NodeResolution::Empty)
        );
        assert!(resolver.resolve_package("missing", &from, Platform::Node).await.is_none());
    }

    #[tokio::test]
    async fn test_nearest_package() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("package.json"), r#"{"name": "app", "version": "2.0.0"}"#).await;
        write(&root.join("src/deep/a.ts"), "").await;
        let resolver = NodeModuleResolver::new(extensions());

        let found = resolver.nearest_package(&root.join("src/deep/a.ts")).await.unwrap();
        assert_eq!(found.dir, root.to_path_buf());
        assert_eq!(found.manifest.version.as_deref(), Some("2.0.0"));
    }
}
