//! Top-level statement index of an ES module: imports, exports, declared
//! bindings and the identifiers each statement refers to.

use super::effects::{EffectOptions, EffectScanner, StatementEffects};
use super::parse::{is_top_level, parse_program, scoping_of, ParseError};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    self, AssignmentTargetPropertyIdentifier, BindingIdentifier, BindingProperty, ClassBody, Declaration,
    ExportDefaultDeclaration, ExportDefaultDeclarationKind, Expression, Function, IdentifierReference,
    ImportDeclarationSpecifier, ImportExpression, ModuleDeclaration, ObjectProperty, ThisExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::{ScopeFlags, Scoping};
use oxc_span::{GetSpan, Span};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;

/// Local name given to an anonymous `export default <expression>`
pub const DEFAULT_LOCAL: &str = "*default*";

/// Imported name standing for the whole namespace
pub const NAMESPACE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Import,
    ReExport,
    ExportList,
    Variable,
    Function,
    Class,
    DefaultExpression,
    Expression,
    Empty,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Byte range of the whole statement
    pub span: Range<usize>,
    /// Byte range of the code that survives bundling (no `export`/`export default` prefix)
    pub body: Range<usize>,
    pub declares: Vec<String>,
    pub references: BTreeSet<String>,
    /// `export default function () {}` / `export default class {}`
    pub anonymous_default: bool,
    /// Offset right after `function`, `*` or `class` where a name fits
    pub name_slot: Option<usize>,
    pub effects: StatementEffects,
}

impl Statement {
    fn new(kind: StatementKind, span: Range<usize>, body: Range<usize>) -> Self {
        Self {
            kind,
            span,
            body,
            declares: Vec::new(),
            references: BTreeSet::new(),
            anonymous_default: false,
            name_slot: None,
            effects: StatementEffects::default(),
        }
    }

    pub fn has_effects(&self, options: EffectOptions) -> bool {
        self.effects.apply(options)
    }
}

/// A module-level binding or a reference to one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub span: Range<usize>,
    pub name: String,
    /// `{ a }` in an object literal or pattern
    pub shorthand: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    /// `default`, a named export, or [`NAMESPACE`]
    pub imported: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
    pub statement: usize,
    /// Record of an `export … from` rather than an `import`
    pub reexport: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEntry {
    Local { exported: String, local: String },
    ReExport { exported: String, imported: String, record: usize },
    Star { record: usize },
}

#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    pub statements: Vec<Statement>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<ExportEntry>,
    /// Top-level binding → statements declaring it
    pub declarations: BTreeMap<String, Vec<usize>>,
    /// Import local → (record, imported name)
    pub import_locals: BTreeMap<String, (usize, String)>,
    pub dynamic_imports: Vec<String>,
    /// Module-level bindings and references to them, in source order
    pub occurrences: Vec<Occurrence>,
    /// Offsets of `this` evaluated at module level
    pub top_level_this: Vec<usize>,
}

impl ModuleAnalysis {
    pub fn exported_names(&self) -> Vec<&str> {
        self.exports
            .iter()
            .filter_map(|e| match e {
                ExportEntry::Local { exported, .. } | ExportEntry::ReExport { exported, .. } => {
                    Some(exported.as_str())
                }
                ExportEntry::Star { .. } => None,
            })
            .collect()
    }

    pub fn has_module_syntax(&self) -> bool {
        !self.imports.is_empty() || !self.exports.is_empty()
    }
}

/// Parses and indexes a module
pub fn analyze(src: &str) -> Result<ModuleAnalysis, ParseError> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, src)?;
    let scoping = scoping_of(&program);

    let mut indexer = Indexer {
        src,
        scoping: &scoping,
        analysis: ModuleAnalysis::default(),
    };
    for statement in &program.body {
        let statement = indexer.statement(statement);
        indexer.analysis.statements.push(statement);
    }
    Ok(indexer.finish())
}

fn range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

struct Indexer<'s> {
    src: &'s str,
    scoping: &'s Scoping,
    analysis: ModuleAnalysis,
}

impl<'s> Indexer<'s> {
    fn finish(mut self) -> ModuleAnalysis {
        let analysis = &mut self.analysis;
        for (index, statement) in analysis.statements.iter().enumerate() {
            for name in &statement.declares {
                analysis
                    .declarations
                    .entry(name.clone())
                    .or_default()
                    .push(index);
            }
        }
        for (record_index, record) in analysis.imports.iter().enumerate() {
            if record.reexport {
                continue;
            }
            for binding in &record.bindings {
                analysis
                    .import_locals
                    .insert(binding.local.clone(), (record_index, binding.imported.clone()));
            }
        }
        analysis.occurrences.sort_by_key(|o| o.span.start);
        self.analysis
    }

    fn statement(&mut self, statement: &ast::Statement<'_>) -> Statement {
        let span = range(statement.span());
        if let Some(module) = statement.as_module_declaration() {
            return self.module_declaration(module, span);
        }
        if let Some(declaration) = statement.as_declaration() {
            return self.declaration(declaration, span.clone(), span);
        }
        if let ast::Statement::EmptyStatement(_) = statement {
            return Statement::new(StatementKind::Empty, span.clone(), span.start..span.start);
        }

        let mut scanner = EffectScanner::new(self.scoping);
        scanner.visit_statement(statement);
        let mut entry = Statement::new(StatementKind::Expression, span.clone(), span);
        entry.effects = scanner.finish();
        self.collect(&mut entry, |c| c.visit_statement(statement));
        entry
    }

    fn declaration(&mut self, declaration: &Declaration<'_>, span: Range<usize>, body: Range<usize>) -> Statement {
        let mut scanner = EffectScanner::new(self.scoping);
        let mut entry = match declaration {
            Declaration::VariableDeclaration(variable) => {
                scanner.visit_variable_declaration(variable);
                let mut entry = Statement::new(StatementKind::Variable, span, body);
                self.collect(&mut entry, |c| c.visit_variable_declaration(variable));
                entry
            }
            Declaration::FunctionDeclaration(function) => {
                let mut entry = Statement::new(StatementKind::Function, span, body);
                self.collect(&mut entry, |c| c.visit_function(function, ScopeFlags::Function));
                entry
            }
            Declaration::ClassDeclaration(class) => {
                scanner.visit_class(class);
                let mut entry = Statement::new(StatementKind::Class, span, body);
                self.collect(&mut entry, |c| c.visit_class(class));
                entry
            }
            _ => Statement::new(StatementKind::Empty, span, body.start..body.start),
        };
        entry.effects = scanner.finish();
        entry
    }

    fn module_declaration(&mut self, module: &ModuleDeclaration<'_>, span: Range<usize>) -> Statement {
        let empty = |kind| Statement::new(kind, span.clone(), span.start..span.start);
        match module {
            ModuleDeclaration::ImportDeclaration(import) => {
                let bindings = import
                    .specifiers
                    .iter()
                    .flatten()
                    .map(|specifier| ImportBinding {
                        local: specifier.local().name.to_string(),
                        imported: match specifier {
                            ImportDeclarationSpecifier::ImportSpecifier(named) => named.imported.name().to_string(),
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(_) => "default".to_string(),
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => NAMESPACE.to_string(),
                        },
                    })
                    .collect();
                self.push_record(import.source.value.to_string(), bindings, false);
                empty(StatementKind::Import)
            }
            ModuleDeclaration::ExportAllDeclaration(export) => {
                let record = self.push_record(export.source.value.to_string(), Vec::new(), true);
                self.analysis.exports.push(match &export.exported {
                    Some(name) => ExportEntry::ReExport {
                        exported: name.name().to_string(),
                        imported: NAMESPACE.to_string(),
                        record,
                    },
                    None => ExportEntry::Star { record },
                });
                empty(StatementKind::ReExport)
            }
            ModuleDeclaration::ExportNamedDeclaration(export) => {
                if let Some(source) = &export.source {
                    let record = self.push_record(source.value.to_string(), Vec::new(), true);
                    for specifier in &export.specifiers {
                        self.analysis.exports.push(ExportEntry::ReExport {
                            exported: specifier.exported.name().to_string(),
                            imported: specifier.local.name().to_string(),
                            record,
                        });
                    }
                    return empty(StatementKind::ReExport);
                }
                if let Some(declaration) = &export.declaration {
                    let body = range(declaration.span());
                    let entry = self.declaration(declaration, span.clone(), body);
                    for name in &entry.declares {
                        self.analysis.exports.push(ExportEntry::Local {
                            exported: name.clone(),
                            local: name.clone(),
                        });
                    }
                    return entry;
                }
                for specifier in &export.specifiers {
                    self.analysis.exports.push(ExportEntry::Local {
                        exported: specifier.exported.name().to_string(),
                        local: specifier.local.name().to_string(),
                    });
                }
                empty(StatementKind::ExportList)
            }
            ModuleDeclaration::ExportDefaultDeclaration(export) => self.export_default(export, span.clone()),
            _ => empty(StatementKind::Empty),
        }
    }

    fn export_default(&mut self, export: &ExportDefaultDeclaration<'_>, span: Range<usize>) -> Statement {
        let mut entry = match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                let body = range(function.span);
                let mut entry = Statement::new(StatementKind::Function, span, body.clone());
                self.collect(&mut entry, |c| c.visit_function(function, ScopeFlags::Function));
                entry.name_slot = self.name_slot(&body, "function", function.generator);
                entry
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                let body = range(class.span);
                let mut scanner = EffectScanner::new(self.scoping);
                scanner.visit_class(class);
                let mut entry = Statement::new(StatementKind::Class, span, body.clone());
                entry.effects = scanner.finish();
                self.collect(&mut entry, |c| c.visit_class(class));
                entry.name_slot = self.name_slot(&body, "class", false);
                entry
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                return Statement::new(StatementKind::Empty, span.clone(), span.start..span.start);
            }
            kind => {
                let Some(expression) = kind.as_expression() else {
                    return Statement::new(StatementKind::Empty, span.clone(), span.start..span.start);
                };
                return self.default_expression(expression, span);
            }
        };

        if entry.declares.is_empty() {
            entry.declares.push(DEFAULT_LOCAL.to_string());
            entry.anonymous_default = true;
        } else {
            entry.name_slot = None;
        }
        self.analysis.exports.push(ExportEntry::Local {
            exported: "default".to_string(),
            local: entry.declares[0].clone(),
        });
        entry
    }

    /// `export default name;` where `name` is a module binding aliases that
    /// binding instead of creating a new one
    fn default_expression(&mut self, expression: &Expression<'_>, span: Range<usize>) -> Statement {
        if let Expression::Identifier(ident) = expression {
            if self.top_level_reference(ident) {
                self.analysis.exports.push(ExportEntry::Local {
                    exported: "default".to_string(),
                    local: ident.name.to_string(),
                });
                return Statement::new(StatementKind::ExportList, span.clone(), span.start..span.start);
            }
        }

        self.analysis.exports.push(ExportEntry::Local {
            exported: "default".to_string(),
            local: DEFAULT_LOCAL.to_string(),
        });
        let mut scanner = EffectScanner::new(self.scoping);
        scanner.visit_expression(expression);
        let mut entry = Statement::new(StatementKind::DefaultExpression, span, range(expression.span()));
        entry.effects = scanner.finish();
        self.collect(&mut entry, |c| c.visit_expression(expression));
        entry.declares.push(DEFAULT_LOCAL.to_string());
        entry
    }

    fn name_slot(&self, body: &Range<usize>, keyword: &str, generator: bool) -> Option<usize> {
        let text = self.src.get(body.clone())?;
        let mut slot = text.find(keyword)? + keyword.len();
        if generator {
            slot += text[slot..].find('*')? + 1;
        }
        Some(body.start + slot)
    }

    fn top_level_reference(&self, ident: &IdentifierReference<'_>) -> bool {
        ident
            .reference_id
            .get()
            .and_then(|id| self.scoping.get_reference(id).symbol_id())
            .is_some_and(|symbol| is_top_level(self.scoping, symbol))
    }

    fn push_record(&mut self, specifier: String, bindings: Vec<ImportBinding>, reexport: bool) -> usize {
        self.analysis.imports.push(ImportRecord {
            specifier,
            bindings,
            statement: self.analysis.statements.len(),
            reexport,
        });
        self.analysis.imports.len() - 1
    }

    /// Runs a [`Collector`] over a statement body and stores what it found
    fn collect(&mut self, entry: &mut Statement, visit: impl FnOnce(&mut Collector<'_>)) {
        let mut collector = Collector {
            scoping: self.scoping,
            function_depth: 0,
            shorthand: HashSet::new(),
            declares: Vec::new(),
            references: BTreeSet::new(),
            occurrences: Vec::new(),
            this: Vec::new(),
            dynamic_imports: Vec::new(),
        };
        visit(&mut collector);

        for name in &collector.declares {
            collector.references.remove(name);
        }
        entry.declares = collector.declares;
        entry.references = collector.references;
        self.analysis.occurrences.extend(collector.occurrences);
        self.analysis.top_level_this.extend(collector.this);
        self.analysis.dynamic_imports.extend(collector.dynamic_imports);
    }
}

/// Gathers declarations, references, module-level `this` and `import()`
/// specifiers of one top-level statement
struct Collector<'s> {
    scoping: &'s Scoping,
    /// Non-arrow functions and class bodies rebind `this`
    function_depth: usize,
    /// Start offsets of identifiers written in shorthand form
    shorthand: HashSet<u32>,
    declares: Vec<String>,
    references: BTreeSet<String>,
    occurrences: Vec<Occurrence>,
    this: Vec<usize>,
    dynamic_imports: Vec<String>,
}

impl Collector<'_> {
    fn record(&mut self, span: Span, name: &str) {
        self.occurrences.push(Occurrence {
            span: range(span),
            name: name.to_string(),
            shorthand: self.shorthand.contains(&span.start),
        });
    }
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let symbol = ident
            .reference_id
            .get()
            .and_then(|id| self.scoping.get_reference(id).symbol_id());
        match symbol {
            Some(symbol) if !is_top_level(self.scoping, symbol) => {}
            Some(_) => {
                self.references.insert(ident.name.to_string());
                self.record(ident.span, &ident.name);
            }
            None => {
                self.references.insert(ident.name.to_string());
            }
        }
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        let Some(symbol) = ident.symbol_id.get() else {
            return;
        };
        if !is_top_level(self.scoping, symbol) {
            return;
        }
        if !self.declares.iter().any(|d| d == ident.name.as_str()) {
            self.declares.push(ident.name.to_string());
        }
        self.record(ident.span, &ident.name);
    }

    fn visit_object_property(&mut self, property: &ObjectProperty<'a>) {
        if property.shorthand {
            self.shorthand.insert(property.value.span().start);
        }
        walk::walk_object_property(self, property);
    }

    fn visit_binding_property(&mut self, property: &BindingProperty<'a>) {
        if property.shorthand {
            self.shorthand.insert(property.value.span().start);
        }
        walk::walk_binding_property(self, property);
    }

    fn visit_assignment_target_property_identifier(&mut self, property: &AssignmentTargetPropertyIdentifier<'a>) {
        self.shorthand.insert(property.binding.span.start);
        walk::walk_assignment_target_property_identifier(self, property);
    }

    fn visit_function(&mut self, function: &Function<'a>, flags: ScopeFlags) {
        self.function_depth += 1;
        walk::walk_function(self, function, flags);
        self.function_depth -= 1;
    }

    fn visit_class_body(&mut self, body: &ClassBody<'a>) {
        self.function_depth += 1;
        walk::walk_class_body(self, body);
        self.function_depth -= 1;
    }

    fn visit_this_expression(&mut self, this: &ThisExpression) {
        if self.function_depth == 0 {
            self.this.push(this.span.start as usize);
        }
    }

    fn visit_import_expression(&mut self, import: &ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &import.source {
            self.dynamic_imports.push(literal.value.to_string());
        }
        walk::walk_import_expression(self, import);
    }
}
