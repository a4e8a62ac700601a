use super::common::IncludeFilter;
use crate::analysis::identifier_from;
use crate::analysis::parse::{parse_program, scoping_of};
use crate::core::diagnostics::UNRESOLVED_REQUIRE;
use crate::core::models::{CommonjsOptions, ModuleId};
use crate::core::plugin::{ModuleSource, Stage, StageContext, StageOutput, StagePhase};
use crate::utils::{BuildError, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, AssignmentExpression, AssignmentTarget, CallExpression, Expression, IdentifierReference,
    TryStatement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::Scoping;
use oxc_span::GetSpan;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

pub const HELPERS_ID: &str = "commonjs-helpers";

const HELPERS_SOURCE: &str = r#"export function getDefaultExportFromCjs (x) {
	return x && x.__esModule && Object.prototype.hasOwnProperty.call(x, 'default') ? x['default'] : x;
}

export function requireValue (ns) {
	if (ns && Object.prototype.hasOwnProperty.call(ns, '__moduleExports')) return ns.__moduleExports;
	var keys = ns ? Object.keys(ns) : [];
	return keys.length === 1 && keys[0] === 'default' ? ns['default'] : ns;
}
"#;

/// Converts CommonJS modules into ES modules: the body runs inside a
/// `(module, exports)` wrapper and every static `require("x")` becomes a
/// hoisted namespace import
pub struct CommonjsStage {
    include: IncludeFilter,
    ignore_try_catch: bool,
}

/// A `require("x")` call site
struct RequireCall {
    /// Byte range of `require("x")`
    start: usize,
    end: usize,
    specifier: String,
    in_try: bool,
}

/// What the conversion needs to know about a module body
#[derive(Default)]
struct CommonjsScan {
    module_syntax: bool,
    /// Free `module`, `exports` or `require` reference
    uses_commonjs: bool,
    requires: Vec<RequireCall>,
    /// Names assigned as `exports.name = …` or `module.exports.name = …`
    named_exports: BTreeSet<String>,
}

impl CommonjsStage {
    pub fn new(options: &CommonjsOptions) -> Result<Self> {
        Ok(Self {
            include: IncludeFilter::new(&options.include)?,
            ignore_try_catch: options.ignore_try_catch,
        })
    }

    pub fn helpers_id() -> ModuleId {
        ModuleId::virtual_id(HELPERS_ID)
    }

    pub fn helpers_source() -> ModuleSource {
        ModuleSource {
            id: Self::helpers_id(),
            code: HELPERS_SOURCE.to_string(),
        }
    }

    /// Rewrites `code`, or returns `None` when it is not a CommonJS module
    pub fn convert(&self, id: &ModuleId, code: &str, context: &StageContext) -> Result<Option<String>> {
        let scan = scan(code).map_err(|e| BuildError::transform(self.name(), id, e.to_string()))?;
        if scan.module_syntax || !scan.uses_commonjs {
            return Ok(None);
        }

        let mut requires = Vec::new();
        let mut specifiers: Vec<String> = Vec::new();
        for call in scan.requires {
            if self.ignore_try_catch && call.in_try {
                context.diagnostics.raise(
                    UNRESOLVED_REQUIRE,
                    format!("require(\"{}\") inside try/catch is left untouched", call.specifier),
                    Some(id.to_string()),
                )?;
                continue;
            }
            if !specifiers.contains(&call.specifier) {
                specifiers.push(call.specifier.clone());
            }
            requires.push(call);
        }

        let name = identifier_from(&id.stem());
        let mut out = String::new();
        let _ = writeln!(
            out,
            "import {{ requireValue, getDefaultExportFromCjs }} from {};",
            quote(&Self::helpers_id().as_str().to_string())
        );
        for (index, specifier) in specifiers.iter().enumerate() {
            let _ = writeln!(out, "import * as require$${} from {};", index, quote(specifier));
        }

        let _ = writeln!(out, "var {}$module = {{ exports: {{}} }};", name);
        out.push_str("(function (module, exports) {\n");
        let mut cursor = 0;
        for call in &requires {
            let index = specifiers.iter().position(|s| s == &call.specifier).unwrap_or(0);
            out.push_str(&code[cursor..call.start]);
            let _ = write!(out, "requireValue(require$${})", index);
            cursor = call.end;
        }
        out.push_str(&code[cursor..]);
        if !code.ends_with('\n') {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "}}).call({0}$module.exports, {0}$module, {0}$module.exports);",
            name
        );
        out.push_str("var __moduleExports = ");
        let _ = writeln!(out, "{}$module.exports;", name);
        let _ = writeln!(
            out,
            "var {} = /*#__PURE__*/getDefaultExportFromCjs(__moduleExports);",
            name
        );

        let mut list = vec![format!("{} as default", name), "__moduleExports".to_string()];
        for export in &scan.named_exports {
            let _ = writeln!(out, "var __export_{0} = __moduleExports.{0};", export);
            list.push(format!("__export_{0} as {0}", export));
        }
        let _ = writeln!(out, "export {{ {} }};", list.join(", "));

        Ok(Some(out))
    }
}

impl Stage for CommonjsStage {
    fn name(&self) -> &str {
        "commonjs"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Module
    }

    fn applies_to(&self, id: &ModuleId, project_root: &Path) -> bool {
        matches!(id.extension(), Some("js" | "cjs")) && self.include.matches(id, project_root)
    }

    fn transform_module(&self, source: ModuleSource, context: &StageContext) -> Result<StageOutput> {
        match self.convert(&source.id, &source.code, context)? {
            Some(code) => Ok(StageOutput {
                module: ModuleSource { id: source.id, code },
                emitted: vec![Self::helpers_source()],
            }),
            None => Ok(StageOutput::unchanged(source)),
        }
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("'{}'", value))
}

fn scan(code: &str) -> std::result::Result<CommonjsScan, crate::analysis::ParseError> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, code)?;
    let scoping = scoping_of(&program);
    let mut scanner = CommonjsScanner {
        scoping: &scoping,
        try_depth: 0,
        scan: CommonjsScan {
            module_syntax: program.body.iter().any(|s| s.is_module_declaration()),
            ..CommonjsScan::default()
        },
    };
    scanner.visit_program(&program);
    Ok(scanner.scan)
}

struct CommonjsScanner<'s> {
    scoping: &'s Scoping,
    try_depth: usize,
    scan: CommonjsScan,
}

impl CommonjsScanner<'_> {
    /// Reference to an undeclared global called `name`
    fn is_free(&self, ident: &IdentifierReference<'_>, name: &str) -> bool {
        ident.name.as_str() == name
            && ident
                .reference_id
                .get()
                .map_or(true, |id| self.scoping.get_reference(id).symbol_id().is_none())
    }

    /// `exports` or `module.exports`
    fn is_exports_object(&self, object: &Expression<'_>) -> bool {
        match object {
            Expression::Identifier(ident) => self.is_free(ident, "exports"),
            Expression::StaticMemberExpression(member) => {
                member.property.name.as_str() == "exports"
                    && matches!(&member.object, Expression::Identifier(ident) if self.is_free(ident, "module"))
            }
            _ => false,
        }
    }
}

impl<'a> Visit<'a> for CommonjsScanner<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if ["module", "exports", "require"].iter().any(|name| self.is_free(ident, name)) {
            self.scan.uses_commonjs = true;
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        let literal = match (&call.callee, &call.arguments[..]) {
            (Expression::Identifier(callee), [Argument::StringLiteral(literal)]) if self.is_free(callee, "require") => {
                Some(literal)
            }
            _ => None,
        };
        if let Some(literal) = literal {
            let span = call.span();
            self.scan.requires.push(RequireCall {
                start: span.start as usize,
                end: span.end as usize,
                specifier: literal.value.to_string(),
                in_try: self.try_depth > 0,
            });
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_try_statement(&mut self, statement: &TryStatement<'a>) {
        self.try_depth += 1;
        self.visit_block_statement(&statement.block);
        self.try_depth -= 1;
        if let Some(handler) = &statement.handler {
            self.visit_catch_clause(handler);
        }
        if let Some(finalizer) = &statement.finalizer {
            self.visit_block_statement(finalizer);
        }
    }

    fn visit_assignment_expression(&mut self, assignment: &AssignmentExpression<'a>) {
        if let AssignmentTarget::StaticMemberExpression(member) = &assignment.left {
            let name = member.property.name.as_str();
            let valid = assignment.operator.is_assign()
                && self.is_exports_object(&member.object)
                && identifier_from(name) == name
                && !matches!(name, "default" | "__esModule" | "__moduleExports");
            if valid {
                self.scan.named_exports.insert(name.to_string());
            }
        }
        walk::walk_assignment_expression(self, assignment);
    }
}
