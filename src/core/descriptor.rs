//! Fully resolved per-target build settings.
//!
//! A target's options are its override record merged over the shared base
//! record: scalar fields are replaced, maps are merged key by key. Everything
//! is validated here, before any target starts.

use crate::analysis::EffectOptions;
use crate::core::graph::SideEffectRules;
use crate::core::models::{
    BuildConfig, CommonjsOptions, OutputOptions, Platform, StageSpec, SubstitutionTarget, TargetConfig, TargetOptions,
    TreeshakeConfig, WarningPolicy,
};
use crate::core::plugin::{Pipeline, Stage};
use crate::infrastructure::node_resolver::normalize;
use crate::infrastructure::processors::code_splitter::check_naming;
use crate::infrastructure::processors::common::IncludeFilter;
use crate::infrastructure::processors::{CommonjsStage, JsonStage, MinifyStage, TextAssetStage, TypeScriptStage};
use crate::infrastructure::resolver::{Resolver, ResolverOptions};
use crate::utils::{BuildError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".js", ".json", ".mjs", ".md"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeshakeOptions {
    pub module_side_effects: bool,
    pub pure_modules: Vec<String>,
    pub property_read_side_effects: bool,
    pub try_catch_deoptimization: bool,
}

impl Default for TreeshakeOptions {
    fn default() -> Self {
        Self {
            module_side_effects: true,
            pure_modules: Vec::new(),
            property_read_side_effects: true,
            try_catch_deoptimization: true,
        }
    }
}

impl TreeshakeOptions {
    fn from_config(config: &TreeshakeConfig) -> Self {
        let defaults = Self::default();
        Self {
            module_side_effects: config.module_side_effects.unwrap_or(defaults.module_side_effects),
            pure_modules: config.pure_modules.clone().unwrap_or_default(),
            property_read_side_effects: config
                .property_read_side_effects
                .unwrap_or(defaults.property_read_side_effects),
            try_catch_deoptimization: config
                .try_catch_deoptimization
                .unwrap_or(defaults.try_catch_deoptimization),
        }
    }

    pub fn effect_options(&self) -> EffectOptions {
        EffectOptions {
            property_read_side_effects: self.property_read_side_effects,
            try_catch_deoptimization: self.try_catch_deoptimization,
        }
    }

    pub fn side_effect_rules(&self) -> Result<SideEffectRules> {
        Ok(SideEffectRules {
            module_side_effects: self.module_side_effects,
            pure_modules: IncludeFilter::new(&self.pure_modules)?,
        })
    }
}

/// Everything one target build needs, with defaults applied and paths made
/// absolute
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub name: String,
    pub platform: Platform,
    pub project_root: PathBuf,
    pub input: BTreeMap<String, String>,
    pub stages: Vec<StageSpec>,
    pub outputs: Vec<OutputOptions>,
    pub external: Vec<String>,
    pub alias: BTreeMap<String, String>,
    pub substitutions: BTreeMap<String, SubstitutionTarget>,
    pub source_roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub treeshake: TreeshakeOptions,
    pub manual_chunks: BTreeMap<String, Vec<String>>,
    pub warning_policy: WarningPolicy,
    pub license_dir: PathBuf,
    pub clean_dir: Option<PathBuf>,
}

/// `over` wins field by field; maps are merged key by key
pub fn merge_options(base: &TargetOptions, over: &TargetOptions) -> TargetOptions {
    TargetOptions {
        platform: over.platform.or(base.platform),
        input: merge_maps(&base.input, &over.input),
        stages: over.stages.clone().or_else(|| base.stages.clone()),
        output: over.output.clone().or_else(|| base.output.clone()),
        external: over.external.clone().or_else(|| base.external.clone()),
        alias: merge_maps(&base.alias, &over.alias),
        substitutions: merge_maps(&base.substitutions, &over.substitutions),
        source_roots: over.source_roots.clone().or_else(|| base.source_roots.clone()),
        extensions: over.extensions.clone().or_else(|| base.extensions.clone()),
        treeshake: match (&base.treeshake, &over.treeshake) {
            (Some(b), Some(o)) => Some(TreeshakeConfig {
                module_side_effects: o.module_side_effects.or(b.module_side_effects),
                pure_modules: o.pure_modules.clone().or_else(|| b.pure_modules.clone()),
                property_read_side_effects: o.property_read_side_effects.or(b.property_read_side_effects),
                try_catch_deoptimization: o.try_catch_deoptimization.or(b.try_catch_deoptimization),
            }),
            (b, o) => o.clone().or_else(|| b.clone()),
        },
        manual_chunks: merge_maps(&base.manual_chunks, &over.manual_chunks),
        warning_policy: over.warning_policy.or(base.warning_policy),
        license_dir: over.license_dir.clone().or_else(|| base.license_dir.clone()),
        clean_dir: over.clean_dir.clone().or_else(|| base.clean_dir.clone()),
    }
}

fn merge_maps<V: Clone>(base: &Option<BTreeMap<String, V>>, over: &Option<BTreeMap<String, V>>) -> Option<BTreeMap<String, V>> {
    match (base, over) {
        (Some(b), Some(o)) => {
            let mut merged = b.clone();
            merged.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(merged)
        }
        (b, o) => o.clone().or_else(|| b.clone()),
    }
}

/// Puts the mandatory commonjs and typescript stages in when the list lacks
/// them: typescript before the first chunk-phase stage, commonjs right before
/// typescript
pub fn normalize_stages(mut stages: Vec<StageSpec>) -> Vec<StageSpec> {
    if !stages.iter().any(|s| matches!(s, StageSpec::Typescript)) {
        let at = stages
            .iter()
            .position(|s| matches!(s, StageSpec::Minify(_)))
            .unwrap_or(stages.len());
        stages.insert(at, StageSpec::Typescript);
    }
    if !stages.iter().any(|s| matches!(s, StageSpec::Commonjs(_))) {
        let at = stages
            .iter()
            .position(|s| matches!(s, StageSpec::Typescript))
            .unwrap_or(stages.len());
        stages.insert(at, StageSpec::Commonjs(CommonjsOptions::default()));
    }
    stages
}

impl TargetDescriptor {
    /// Merges and validates one target of `config`
    pub fn from_config(config: &BuildConfig, target: &TargetConfig) -> Result<Self> {
        let root = absolute(&config.project_root)?;
        let options = merge_options(&config.base, &target.options);
        let name = target.name.clone();
        let invalid = |msg: &str| BuildError::config(format!("target '{}': {}", name, msg));

        let input = options.input.unwrap_or_default();
        if input.is_empty() {
            return Err(invalid("no input entries"));
        }

        let mut outputs = options.output.unwrap_or_default();
        if outputs.is_empty() {
            return Err(invalid("no output configured"));
        }
        for output in outputs.iter_mut() {
            match (&output.dir, output.file.take()) {
                (Some(_), Some(_)) => return Err(invalid("an output sets both `dir` and `file`")),
                (None, None) => return Err(invalid("an output needs `dir` or `file`")),
                (Some(dir), None) => output.dir = Some(normalize(&root.join(dir))),
                (None, Some(file)) => {
                    let path = normalize(&root.join(&file));
                    let file_name = path
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .ok_or_else(|| invalid("output `file` has no file name"))?;
                    output.dir = path.parent().map(Path::to_path_buf);
                    output.entry_file_names = file_name;
                    output.file = Some(path);
                }
            }
        }

        let stages = normalize_stages(options.stages.unwrap_or_default());
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name()) {
                return Err(invalid(&format!("stage '{}' is listed twice", stage.name())));
            }
        }
        let minifies = stages.iter().any(|s| matches!(s, StageSpec::Minify(_)));
        if minifies && outputs.iter().any(|o| o.sourcemap) {
            return Err(invalid("source maps cannot be combined with the minify stage"));
        }

        let manual_chunks = options.manual_chunks.unwrap_or_default();
        for output in &outputs {
            check_naming(&input, &manual_chunks, output)?;
            if output.file.is_some() && !manual_chunks.is_empty() {
                return Err(invalid("`file` output cannot hold manual chunks"));
            }
        }

        let extensions = options
            .extensions
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());

        Ok(Self {
            platform: options.platform.unwrap_or_default(),
            input,
            stages,
            outputs,
            external: options.external.unwrap_or_default(),
            alias: options.alias.unwrap_or_default(),
            substitutions: options.substitutions.unwrap_or_default(),
            source_roots: options
                .source_roots
                .unwrap_or_default()
                .iter()
                .map(|p| normalize(&root.join(p)))
                .collect(),
            extensions,
            treeshake: TreeshakeOptions::from_config(&options.treeshake.unwrap_or_default()),
            manual_chunks,
            warning_policy: options.warning_policy.unwrap_or_default(),
            license_dir: options
                .license_dir
                .map(|p| normalize(&root.join(p)))
                .unwrap_or_else(|| root.clone()),
            clean_dir: options.clean_dir.map(|p| normalize(&root.join(p))),
            project_root: root,
            name,
        })
    }

    /// Descriptors of every target in `config`; the first invalid target
    /// fails the whole configuration
    pub fn all(config: &BuildConfig) -> Result<Vec<Self>> {
        if config.targets.is_empty() {
            return Err(BuildError::config("no targets configured"));
        }
        let mut names = HashSet::new();
        let mut license_dirs: HashMap<PathBuf, &str> = HashMap::new();
        let mut descriptors = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            if !names.insert(target.name.as_str()) {
                return Err(BuildError::config(format!("target '{}' is defined twice", target.name)));
            }
            let descriptor = Self::from_config(config, target)?;
            if let Some(other) = license_dirs.insert(descriptor.license_dir.clone(), &target.name) {
                return Err(BuildError::config(format!(
                    "targets '{}' and '{}' both write their license report to {}; give each its own license_dir",
                    other,
                    target.name,
                    descriptor.license_dir.display()
                )));
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();
        for spec in &self.stages {
            let stage: Arc<dyn Stage> = match spec {
                StageSpec::Commonjs(options) => Arc::new(CommonjsStage::new(options)?),
                StageSpec::Json => Arc::new(JsonStage::new()),
                StageSpec::Text(options) => Arc::new(TextAssetStage::new(options)?),
                StageSpec::Typescript => Arc::new(TypeScriptStage::new()),
                StageSpec::Minify(options) => Arc::new(MinifyStage::new(options)),
            };
            pipeline.register(stage);
        }
        Ok(pipeline)
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(ResolverOptions {
            project_root: self.project_root.clone(),
            platform: self.platform,
            alias: self.alias.clone(),
            substitutions: self.substitutions.clone(),
            external: self.external.clone(),
            source_roots: self.source_roots.clone(),
            extensions: self.extensions.clone(),
        })
    }

    /// Directories the target writes into (outputs, clean dir, license dir),
    /// sorted and deduplicated
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.outputs.iter().filter_map(|o| o.dir.clone()).collect();
        if let Some(clean) = &self.clean_dir {
            dirs.push(clean.clone());
        }
        dirs.push(self.license_dir.clone());
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{MinifyOptions, OutputFormat, Schedule, FailureMode};

    fn output(dir: &str) -> OutputOptions {
        OutputOptions {
            dir: Some(PathBuf::from(dir)),
            ..OutputOptions::default()
        }
    }

    fn config(base: TargetOptions, targets: Vec<TargetConfig>) -> BuildConfig {
        BuildConfig {
            project_root: PathBuf::from("/project"),
            base,
            targets,
            schedule: Schedule::Concurrent,
            failure_mode: FailureMode::FailFast,
        }
    }

    fn input(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_override_wins_and_maps_merge() {
        let base = TargetOptions {
            input: input(&[("main", "src/main.ts")]),
            alias: Some(BTreeMap::from([("a".to_string(), "./a.ts".to_string())])),
            external: Some(vec!["fsevents".to_string()]),
            output: Some(vec![output("dist")]),
            ..TargetOptions::default()
        };
        let browser = TargetConfig {
            name: "browser".to_string(),
            options: TargetOptions {
                platform: Some(Platform::Browser),
                alias: Some(BTreeMap::from([("b".to_string(), "./b.ts".to_string())])),
                external: Some(Vec::new()),
                ..TargetOptions::default()
            },
        };
        let config = config(base, vec![browser.clone()]);
        let descriptor = TargetDescriptor::from_config(&config, &browser).unwrap();

        assert_eq!(descriptor.platform, Platform::Browser);
        assert_eq!(descriptor.alias.len(), 2);
        assert!(descriptor.external.is_empty());
        assert_eq!(descriptor.outputs[0].dir, Some(PathBuf::from("/project/dist")));
        assert_eq!(descriptor.license_dir, PathBuf::from("/project"));
    }

    #[test]
    fn test_mandatory_stages_are_inserted() {
        let stages = normalize_stages(vec![StageSpec::Json, StageSpec::Minify(MinifyOptions::default())]);
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["json", "commonjs", "typescript", "minify"]);

        let stages = normalize_stages(vec![StageSpec::Typescript]);
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["commonjs", "typescript"]);
    }

    #[test]
    fn test_validation_errors() {
        let target = |options: TargetOptions| TargetConfig {
            name: "t".to_string(),
            options,
        };

        let no_output = target(TargetOptions {
            input: input(&[("main", "src/main.ts")]),
            ..TargetOptions::default()
        });
        let config_a = config(TargetOptions::default(), vec![no_output.clone()]);
        assert!(matches!(TargetDescriptor::from_config(&config_a, &no_output), Err(BuildError::Config(_))));

        let minified_maps = target(TargetOptions {
            input: input(&[("main", "src/main.ts")]),
            stages: Some(vec![StageSpec::Minify(MinifyOptions::default())]),
            output: Some(vec![OutputOptions {
                sourcemap: true,
                ..output("dist")
            }]),
            ..TargetOptions::default()
        });
        let config_b = config(TargetOptions::default(), vec![minified_maps.clone()]);
        assert!(TargetDescriptor::from_config(&config_b, &minified_maps).is_err());
    }

    #[test]
    fn test_naming_conflict_fails_validation() {
        let conflicting = TargetConfig {
            name: "node".to_string(),
            options: TargetOptions {
                input: input(&[("module-core", "src/main.ts")]),
                manual_chunks: Some(BTreeMap::from([("core".to_string(), vec!["src/core.ts".to_string()])])),
                output: Some(vec![output("dist")]),
                ..TargetOptions::default()
            },
        };
        let config = config(TargetOptions::default(), vec![conflicting]);
        assert!(matches!(
            TargetDescriptor::all(&config),
            Err(BuildError::ChunkNamingConflict { .. })
        ));
    }

    #[test]
    fn test_targets_cannot_share_a_license_dir() {
        let base = TargetOptions {
            input: input(&[("main", "src/main.ts")]),
            ..TargetOptions::default()
        };
        let target = |name: &str, license_dir: Option<&str>| TargetConfig {
            name: name.to_string(),
            options: TargetOptions {
                output: Some(vec![output(&format!("dist/{}", name))]),
                license_dir: license_dir.map(PathBuf::from),
                ..TargetOptions::default()
            },
        };

        let shared = config(base.clone(), vec![target("node", None), target("browser", None)]);
        let err = TargetDescriptor::all(&shared).unwrap_err();
        assert!(matches!(err, BuildError::Config(ref msg) if msg.contains("'node' and 'browser'")));

        let separate = config(base, vec![target("node", None), target("browser", Some("browser"))]);
        let descriptors = TargetDescriptor::all(&separate).unwrap();
        assert_eq!(
            descriptors[1].output_dirs(),
            vec![PathBuf::from("/project/browser"), PathBuf::from("/project/dist/browser")]
        );
        assert!(descriptors[0].output_dirs().contains(&PathBuf::from("/project")));
    }

    #[test]
    fn test_file_output_sets_entry_name() {
        let single = TargetConfig {
            name: "browser".to_string(),
            options: TargetOptions {
                input: input(&[("main", "src/browser.ts")]),
                output: Some(vec![OutputOptions {
                    file: Some(PathBuf::from("browser/dist/es/bundle.browser.js")),
                    format: OutputFormat::Es,
                    ..OutputOptions::default()
                }]),
                ..TargetOptions::default()
            },
        };
        let config = config(TargetOptions::default(), vec![single.clone()]);
        let descriptor = TargetDescriptor::from_config(&config, &single).unwrap();

        assert_eq!(descriptor.outputs[0].dir, Some(PathBuf::from("/project/browser/dist/es")));
        assert_eq!(descriptor.outputs[0].entry_file_names, "bundle.browser.js");
    }
}
