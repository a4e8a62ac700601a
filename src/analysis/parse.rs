use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::{ParseOptions, Parser};
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::SourceType;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

/// Parses `src` as an ES module, falling back to a sloppy script for code only
/// valid outside modules (`with`, top-level `return`, octal literals)
pub fn parse_program<'a>(allocator: &'a Allocator, src: &'a str) -> Result<Program<'a>, ParseError> {
    let module = Parser::new(allocator, src, SourceType::mjs()).parse();
    if module.errors.is_empty() && !module.panicked {
        return Ok(module.program);
    }

    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let script = Parser::new(allocator, src, SourceType::cjs()).with_options(options).parse();
    if script.errors.is_empty() && !script.panicked {
        return Ok(script.program);
    }

    let errors: Vec<String> = module.errors.iter().map(|e| e.to_string()).collect();
    Err(ParseError {
        message: errors.join("\n"),
    })
}

pub fn scoping_of(program: &Program<'_>) -> Scoping {
    SemanticBuilder::new().build(program).semantic.into_scoping()
}

pub fn is_top_level(scoping: &Scoping, symbol: SymbolId) -> bool {
    scoping.symbol_scope_id(symbol) == scoping.root_scope_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_fallback() {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, "if (done) return;\nwith (scope) { run(); }").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let allocator = Allocator::default();
        let error = parse_program(&allocator, "const = ;").unwrap_err();
        assert!(!error.message.is_empty());
    }
}
