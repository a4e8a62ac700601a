use super::common::{is_javascript, is_typescript, source_type_for};
use crate::core::models::ModuleId;
use crate::core::plugin::{ModuleSource, Stage, StageContext, StageOutput, StagePhase};
use crate::utils::{BuildError, Result};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::Path;

/// Strips TypeScript syntax with oxc; JavaScript is parsed for validation only
/// and passed through byte for byte
pub struct TypeScriptStage;

impl TypeScriptStage {
    pub fn new() -> Self {
        Self
    }

    pub fn strip(&self, id: &ModuleId, code: &str) -> Result<String> {
        let allocator = Allocator::default();
        let source_type = source_type_for(id);
        let parsed = Parser::new(&allocator, code, source_type).parse();
        let failed = !parsed.errors.is_empty() || parsed.panicked;

        // Non-module scripts (sloppy mode, top-level return) are valid plain JavaScript
        if failed && is_javascript(id) {
            let script = Parser::new(&allocator, code, SourceType::cjs()).parse();
            if script.errors.is_empty() && !script.panicked {
                return Ok(code.to_string());
            }
        }
        if failed {
            let errors: Vec<String> = parsed.errors.iter().map(|e| format!("Parse error: {}", e)).collect();
            return Err(BuildError::transform(self.name(), id, errors.join("\n")));
        }
        if !is_typescript(id) {
            return Ok(code.to_string());
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let path = id.path().unwrap_or_else(|| Path::new("module.ts"));
        let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
            .build_with_scoping(scoping, &mut program);

        if !transformed.errors.is_empty() {
            let errors: Vec<String> = transformed.errors.iter().map(|e| e.to_string()).collect();
            return Err(BuildError::transform(self.name(), id, errors.join("\n")));
        }

        Ok(Codegen::new().build(&program).code)
    }
}

impl Default for TypeScriptStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TypeScriptStage {
    fn name(&self) -> &str {
        "typescript"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Module
    }

    fn applies_to(&self, id: &ModuleId, _project_root: &Path) -> bool {
        is_typescript(id) || is_javascript(id)
    }

    fn transform_module(&self, source: ModuleSource, _context: &StageContext) -> Result<StageOutput> {
        let code = self.strip(&source.id, &source.code)?;
        Ok(StageOutput::unchanged(ModuleSource { id: source.id, code }))
    }
}
