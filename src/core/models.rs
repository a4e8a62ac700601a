use crate::analysis::{identifier_from, ModuleAnalysis};
use crate::infrastructure::node_resolver::PackageJson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix marking generated modules that have no file on disk
pub const VIRTUAL_PREFIX: char = '\0';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Node,
    Browser,
    Shared,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Node => write!(f, "node"),
            Platform::Browser => write!(f, "browser"),
            Platform::Shared => write!(f, "shared"),
        }
    }
}

/// Resolved absolute source path, or a `\0`-prefixed virtual id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn virtual_id(name: &str) -> Self {
        Self(format!("{}{}", VIRTUAL_PREFIX, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_virtual(&self) -> bool {
        self.0.starts_with(VIRTUAL_PREFIX)
    }

    pub fn path(&self) -> Option<&Path> {
        (!self.is_virtual()).then(|| Path::new(&self.0))
    }

    pub fn extension(&self) -> Option<&str> {
        self.path()?.extension()?.to_str()
    }

    /// Identifier-safe short name used for generated bindings and chunk names
    pub fn stem(&self) -> String {
        let raw = match self.path() {
            Some(path) => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
                if stem == "index" {
                    path.parent()
                        .and_then(|p| p.file_name())
                        .and_then(|s| s.to_str())
                        .unwrap_or(stem)
                } else {
                    stem
                }
            }
            None => self
                .0
                .trim_start_matches(VIRTUAL_PREFIX)
                .rsplit(['/', ':'])
                .next()
                .unwrap_or("virtual"),
        };
        identifier_from(raw.split('.').next().unwrap_or(raw))
    }

    /// Path relative to `root` for display and glob matching
    pub fn relative_to(&self, root: &Path) -> String {
        match self.path() {
            Some(path) => path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/"),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.trim_start_matches(VIRTUAL_PREFIX))
    }
}

/// Where an import edge points after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedId {
    Module { id: ModuleId, platform: Platform },
    External { specifier: String },
}

impl ResolvedId {
    pub fn module_id(&self) -> Option<&ModuleId> {
        match self {
            ResolvedId::Module { id, .. } => Some(id),
            ResolvedId::External { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffects {
    Pure,
    HasSideEffects,
    Unknown,
}

impl SideEffects {
    /// Effectful statements are kept even when nothing imports from the module
    pub fn keeps_effects(&self) -> bool {
        !matches!(self, SideEffects::Pure)
    }
}

/// Nearest package.json owning a module
#[derive(Debug, Clone)]
pub struct PackageRef {
    pub dir: PathBuf,
    pub manifest: Arc<PackageJson>,
}

/// A loaded, transformed and analyzed module
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub raw_source: String,
    /// Output of the module-phase stages; analysis byte offsets point into it
    pub code: String,
    pub analysis: ModuleAnalysis,
    /// Resolution of each import record, index-aligned with `analysis.imports`
    pub resolved: Vec<ResolvedId>,
    pub side_effects: SideEffects,
    pub platform: Platform,
    pub package: Option<PackageRef>,
}

/// Per-target build lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetState {
    Configured,
    Resolving,
    Transforming,
    Treeshaking,
    Chunking,
    Emitting,
    Succeeded,
    Failed,
}

impl TargetState {
    /// The only state a successful step may move to
    pub fn next(&self) -> Option<TargetState> {
        match self {
            TargetState::Configured => Some(TargetState::Resolving),
            TargetState::Resolving => Some(TargetState::Transforming),
            TargetState::Transforming => Some(TargetState::Treeshaking),
            TargetState::Treeshaking => Some(TargetState::Chunking),
            TargetState::Chunking => Some(TargetState::Emitting),
            TargetState::Emitting => Some(TargetState::Succeeded),
            TargetState::Succeeded | TargetState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Succeeded | TargetState::Failed)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Configuration records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub project_root: PathBuf,
    #[serde(default)]
    pub base: TargetOptions,
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Concurrent,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    FailFast,
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningPolicy {
    #[default]
    Fatal,
    Advisory,
}

/// Target settings; every field is optional so a target can override the base
/// record field by field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetOptions {
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Logical entry name → entry path (relative to the project root)
    #[serde(default)]
    pub input: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub stages: Option<Vec<StageSpec>>,
    #[serde(default)]
    pub output: Option<Vec<OutputOptions>>,
    #[serde(default)]
    pub external: Option<Vec<String>>,
    #[serde(default)]
    pub alias: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub substitutions: Option<BTreeMap<String, SubstitutionTarget>>,
    #[serde(default)]
    pub source_roots: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub treeshake: Option<TreeshakeConfig>,
    #[serde(default)]
    pub manual_chunks: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub warning_policy: Option<WarningPolicy>,
    #[serde(default)]
    pub license_dir: Option<PathBuf>,
    #[serde(default)]
    pub clean_dir: Option<PathBuf>,
}

/// Replacement for a Node-only module on other platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubstitutionTarget {
    Path(String),
    Shim { shim: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeshakeConfig {
    #[serde(default)]
    pub module_side_effects: Option<bool>,
    #[serde(default)]
    pub pure_modules: Option<Vec<String>>,
    #[serde(default)]
    pub property_read_side_effects: Option<bool>,
    #[serde(default)]
    pub try_catch_deoptimization: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum StageSpec {
    Commonjs(CommonjsOptions),
    Json,
    #[serde(rename = "string")]
    Text(TextOptions),
    Typescript,
    Minify(MinifyOptions),
}

impl StageSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Commonjs(_) => "commonjs",
            StageSpec::Json => "json",
            StageSpec::Text(_) => "string",
            StageSpec::Typescript => "typescript",
            StageSpec::Minify(_) => "minify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonjsOptions {
    pub include: Vec<String>,
    pub ignore_try_catch: bool,
}

impl Default for CommonjsOptions {
    fn default() -> Self {
        Self {
            include: vec!["node_modules/**".to_string()],
            ignore_try_catch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    pub include: Vec<String>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            include: vec!["**/*.md".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifyOptions {
    pub mangle: bool,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        Self { mangle: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Es,
    Cjs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Single-file output; requires the target to produce exactly one chunk
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_entry_file_names")]
    pub entry_file_names: String,
    #[serde(default = "default_chunk_file_names")]
    pub chunk_file_names: String,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub sourcemap: bool,
    /// Relative path of a `{"type": …}` package.json written next to the chunks
    #[serde(default)]
    pub module_package_file: Option<String>,
}

fn default_entry_file_names() -> String {
    "[name].js".to_string()
}

fn default_chunk_file_names() -> String {
    "module-[name].js".to_string()
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: None,
            file: None,
            format: OutputFormat::Es,
            entry_file_names: default_entry_file_names(),
            chunk_file_names: default_chunk_file_names(),
            banner: None,
            sourcemap: false,
            module_package_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_stem() {
        assert_eq!(ModuleId::from_path(Path::new("/p/src/utils/helpers.ts")).stem(), "helpers");
        assert_eq!(ModuleId::from_path(Path::new("/p/node_modules/acorn/index.js")).stem(), "acorn");
        assert_eq!(ModuleId::virtual_id("commonjs-helpers").stem(), "commonjs_helpers");
        assert_eq!(ModuleId::from_path(Path::new("/p/src/my-lib.min.js")).stem(), "my_lib");
    }

    #[test]
    fn test_virtual_ids_have_no_path() {
        let id = ModuleId::virtual_id("shim:fsevents");
        assert!(id.is_virtual());
        assert!(id.path().is_none());
        assert_eq!(id.to_string(), "shim:fsevents");
    }

    #[test]
    fn test_state_sequence() {
        let mut state = TargetState::Configured;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(state, TargetState::Succeeded);
        assert!(state.is_terminal());
        assert!(!TargetState::Emitting.is_terminal());
    }

    #[test]
    fn test_stage_spec_deserialization() {
        let stages: Vec<StageSpec> = serde_json::from_str(
            r#"[{"stage": "commonjs", "ignore_try_catch": true}, {"stage": "string"}, {"stage": "minify"}]"#,
        )
        .unwrap();

        assert_eq!(
            stages[0],
            StageSpec::Commonjs(CommonjsOptions {
                include: vec!["node_modules/**".to_string()],
                ignore_try_catch: true,
            })
        );
        assert_eq!(stages[1], StageSpec::Text(TextOptions::default()));
        assert_eq!(stages[2], StageSpec::Minify(MinifyOptions { mangle: true }));
    }

    #[test]
    fn test_substitution_target_forms() {
        let map: BTreeMap<String, SubstitutionTarget> = serde_json::from_str(
            r#"{"fs": "./src/browser/fs.ts", "fsevents": {"shim": "export default {};"}}"#,
        )
        .unwrap();

        assert_eq!(map["fs"], SubstitutionTarget::Path("./src/browser/fs.ts".to_string()));
        assert!(matches!(map["fsevents"], SubstitutionTarget::Shim { .. }));
    }
}
