use crate::core::models::MinifyOptions;
use crate::core::plugin::{Stage, StageContext, StagePhase};
use crate::utils::{BuildError, Logger, Result};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

/// Chunk-phase minification using oxc
pub struct MinifyStage {
    mangle: bool,
}

impl MinifyStage {
    pub fn new(options: &MinifyOptions) -> Self {
        Self { mangle: options.mangle }
    }

    /// Minify an ES module chunk
    pub fn minify(&self, source_code: &str, file_name: &str) -> Result<String> {
        let allocator = Allocator::default();
        let parse_result = Parser::new(&allocator, source_code, SourceType::mjs()).parse();

        if !parse_result.errors.is_empty() || parse_result.panicked {
            let errors: Vec<String> = parse_result
                .errors
                .iter()
                .map(|e| format!("Parse error: {}", e))
                .collect();
            return Err(BuildError::transform(self.name(), file_name, errors.join("\n")));
        }

        let mut program = parse_result.program;
        let options = MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: Some(CompressOptions::default()),
        };
        let minified = Minifier::new(options).minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code;
        Ok(code)
    }
}

impl Stage for MinifyStage {
    fn name(&self) -> &str {
        "minify"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Chunk
    }

    fn transform_chunk(&self, code: String, file_name: &str, context: &StageContext) -> Result<String> {
        let minified = self.minify(&code, file_name)?;
        let stats = MinificationStats::new(&code, &minified);
        Logger::debug(&format!("[{}] {}: {}", context.target, file_name, stats));
        Ok(minified)
    }
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
}

impl MinificationStats {
    pub fn new(original: &str, minified: &str) -> Self {
        let reduction_percentage = if original.is_empty() {
            0.0
        } else {
            (original.len() as f64 - minified.len() as f64) / original.len() as f64 * 100.0
        };
        Self {
            original_size: original.len(),
            minified_size: minified.len(),
            reduction_percentage,
        }
    }
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "minified {:.1}% ({} → {} bytes)",
            self.reduction_percentage, self.original_size, self.minified_size
        )
    }
}
