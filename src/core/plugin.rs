// Stage pipeline for tandem targets
// Module-phase stages rewrite sources before analysis, chunk-phase stages
// rewrite rendered chunks before they are written

use crate::core::diagnostics::Diagnostics;
use crate::core::models::{ModuleId, Platform};
use crate::utils::{BuildError, Logger, Result, Timer};
use std::path::Path;
use std::sync::Arc;

/// Context provided to stages during execution
pub struct StageContext<'a> {
    pub target: &'a str,
    pub project_root: &'a Path,
    pub platform: Platform,
    pub diagnostics: &'a Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Module,
    Chunk,
}

/// Source text of one module as it flows through the module phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub id: ModuleId,
    pub code: String,
}

/// A transformed module plus any virtual modules the stage generated for it
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub module: ModuleSource,
    pub emitted: Vec<ModuleSource>,
}

impl StageOutput {
    pub fn unchanged(module: ModuleSource) -> Self {
        Self {
            module,
            emitted: Vec::new(),
        }
    }
}

/// A named transformation step of a target's pipeline
pub trait Stage: Send + Sync {
    /// Identifier used in configuration
    fn name(&self) -> &str;

    fn phase(&self) -> StagePhase;

    /// Whether the module phase should run this stage on `id`
    fn applies_to(&self, _id: &ModuleId, _project_root: &Path) -> bool {
        false
    }

    fn transform_module(&self, source: ModuleSource, _context: &StageContext) -> Result<StageOutput> {
        Ok(StageOutput::unchanged(source))
    }

    fn transform_chunk(&self, code: String, _file_name: &str, _context: &StageContext) -> Result<String> {
        Ok(code)
    }
}

/// Ordered stage list of one target
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Register a stage; stages run in registration order
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn has_chunk_stages(&self) -> bool {
        self.stages.iter().any(|s| s.phase() == StagePhase::Chunk)
    }

    /// Runs every applicable module-phase stage; each stage receives the
    /// output of the previous one
    pub fn run_module(&self, source: ModuleSource, context: &StageContext) -> Result<StageOutput> {
        let mut current = source;
        let mut emitted = Vec::new();

        for stage in &self.stages {
            if stage.phase() != StagePhase::Module || !stage.applies_to(&current.id, context.project_root) {
                continue;
            }
            let id = current.id.clone();
            Logger::stage(context.target, stage.name(), id.as_str());
            let _timer = Timer::start(stage.name());

            let output = stage
                .transform_module(current, context)
                .map_err(|e| attribute(e, stage.name(), &id))?;
            current = output.module;
            emitted.extend(output.emitted);
        }

        Ok(StageOutput {
            module: current,
            emitted,
        })
    }

    /// Runs every chunk-phase stage over a rendered chunk
    pub fn run_chunk(&self, mut code: String, file_name: &str, context: &StageContext) -> Result<String> {
        for stage in &self.stages {
            if stage.phase() != StagePhase::Chunk {
                continue;
            }
            Logger::stage(context.target, stage.name(), file_name);
            code = stage
                .transform_chunk(code, file_name, context)
                .map_err(|e| attribute(e, stage.name(), file_name))?;
        }
        Ok(code)
    }
}

/// Every stage failure names the stage and the module it was working on
fn attribute(error: BuildError, stage: &str, module: impl std::fmt::Display) -> BuildError {
    match error {
        e @ (BuildError::TransformFailure { .. } | BuildError::DiagnosticRaised { .. }) => e,
        other => BuildError::transform(stage, module, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::WarningPolicy;
    use std::path::PathBuf;

    struct Upper;

    impl Stage for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn phase(&self) -> StagePhase {
            StagePhase::Module
        }

        fn applies_to(&self, id: &ModuleId, _root: &Path) -> bool {
            id.extension() == Some("txt")
        }

        fn transform_module(&self, source: ModuleSource, _context: &StageContext) -> Result<StageOutput> {
            Ok(StageOutput {
                emitted: vec![ModuleSource {
                    id: ModuleId::virtual_id("upper-helper"),
                    code: "export const x = 1;".to_string(),
                }],
                module: ModuleSource {
                    id: source.id,
                    code: source.code.to_uppercase(),
                },
            })
        }
    }

    struct Failing;

    impl Stage for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn phase(&self) -> StagePhase {
            StagePhase::Chunk
        }

        fn transform_chunk(&self, _code: String, _file_name: &str, _context: &StageContext) -> Result<String> {
            Err(BuildError::Other("boom".to_string()))
        }
    }

    fn context<'a>(diagnostics: &'a Diagnostics, root: &'a Path) -> StageContext<'a> {
        StageContext {
            target: "test",
            project_root: root,
            platform: Platform::Node,
            diagnostics,
        }
    }

    #[test]
    fn test_pipeline_registration() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.stage_count(), 0);

        pipeline.register(Arc::new(Upper));
        pipeline.register(Arc::new(Failing));
        assert_eq!(pipeline.names(), vec!["upper", "failing"]);
        assert!(pipeline.has_chunk_stages());
    }

    #[test]
    fn test_module_phase_respects_applies_to() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Arc::new(Upper));
        let diagnostics = Diagnostics::new("test", WarningPolicy::Fatal);
        let root = PathBuf::from("/p");
        let ctx = context(&diagnostics, &root);

        let txt = ModuleSource {
            id: ModuleId::from_path(Path::new("/p/a.txt")),
            code: "hello".to_string(),
        };
        let out = pipeline.run_module(txt, &ctx).unwrap();
        assert_eq!(out.module.code, "HELLO");
        assert_eq!(out.emitted.len(), 1);

        let js = ModuleSource {
            id: ModuleId::from_path(Path::new("/p/a.js")),
            code: "hello".to_string(),
        };
        assert_eq!(pipeline.run_module(js, &ctx).unwrap().module.code, "hello");
    }

    #[test]
    fn test_chunk_failure_names_the_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Arc::new(Failing));
        let diagnostics = Diagnostics::new("test", WarningPolicy::Fatal);
        let root = PathBuf::from("/p");

        let err = pipeline
            .run_chunk("x".to_string(), "main.js", &context(&diagnostics, &root))
            .unwrap_err();
        assert!(matches!(err, BuildError::TransformFailure { ref stage, ref module, .. }
            if stage == "failing" && module == "main.js"));
    }
}
