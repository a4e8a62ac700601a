//! Conservative side-effect detection for top-level statements.
//!
//! Anything that may run user code, write state or throw is an effect: calls
//! and `new` (unless annotated pure or a known pure global), assignments,
//! updates, `delete`, `throw`, `await`, `yield`, dynamic `import()`, loops and,
//! depending on the options, member reads and `try` blocks. Function bodies are
//! not evaluated at definition time and are skipped.

use oxc_ast::ast::{
    ArrayPattern, ArrowFunctionExpression, AssignmentExpression, AwaitExpression, CallExpression, Class,
    ClassElement, ComputedMemberExpression, DebuggerStatement, Decorator, DoWhileStatement, Expression,
    ForInStatement, ForOfStatement, ForStatement, Function, IdentifierReference, ImportExpression,
    NewExpression, ObjectPattern, PrivateFieldExpression, PropertyKey, SpreadElement, StaticMemberExpression,
    Super, TaggedTemplateExpression, ThrowStatement, TryStatement, UnaryExpression, UpdateExpression,
    WhileStatement, WithStatement, YieldExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::{ScopeFlags, Scoping};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectOptions {
    /// Member reads may run getters or throw on `undefined`
    pub property_read_side_effects: bool,
    /// A `try` statement keeps the whole statement
    pub try_catch_deoptimization: bool,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            property_read_side_effects: true,
            try_catch_deoptimization: true,
        }
    }
}

/// What a statement may do when evaluated, grouped by the option that can waive it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementEffects {
    pub unconditional: bool,
    /// Member reads, object destructuring and spreads
    pub property_reads: bool,
    pub try_block: bool,
}

impl StatementEffects {
    pub fn apply(self, options: EffectOptions) -> bool {
        self.unconditional
            || (options.property_read_side_effects && self.property_reads)
            || (options.try_catch_deoptimization && self.try_block)
    }
}

const PURE_CALLS: &[&str] = &[
    "Symbol",
    "Symbol.for",
    "String",
    "Number",
    "Boolean",
    "BigInt",
    "Object.create",
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.getOwnPropertyNames",
    "Object.getPrototypeOf",
    "Array.isArray",
    "Date.now",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
];

const PURE_CONSTRUCTORS: &[&str] = &[
    "Map", "Set", "WeakMap", "WeakSet", "Array", "Object", "Date", "RegExp", "Error", "TypeError",
    "RangeError",
];

/// Globals whose members can be read without running user code
const PURE_NAMESPACES: &[&str] = &[
    "Math", "Object", "Symbol", "Array", "Number", "String", "JSON", "Reflect",
];

/// Walks one top-level statement and records what evaluating it may do
pub struct EffectScanner<'s> {
    scoping: &'s Scoping,
    effects: StatementEffects,
}

impl<'s> EffectScanner<'s> {
    pub fn new(scoping: &'s Scoping) -> Self {
        Self {
            scoping,
            effects: StatementEffects::default(),
        }
    }

    pub fn finish(self) -> StatementEffects {
        self.effects
    }

    fn effect(&mut self) {
        self.effects.unconditional = true;
    }

    fn is_global(&self, ident: &IdentifierReference<'_>) -> bool {
        match ident.reference_id.get() {
            Some(id) => self.scoping.get_reference(id).symbol_id().is_none(),
            None => true,
        }
    }

    /// `Object.keys` for a member chain rooted at an undeclared global
    fn global_path(&self, expr: &Expression<'_>) -> Option<String> {
        match expr.without_parentheses() {
            Expression::Identifier(ident) if self.is_global(ident) => Some(ident.name.to_string()),
            Expression::StaticMemberExpression(member) => {
                let base = self.global_path(&member.object)?;
                Some(format!("{}.{}", base, member.property.name))
            }
            _ => None,
        }
    }

    fn is_pure_call(&self, callee: &Expression<'_>) -> bool {
        self.global_path(callee).is_some_and(|path| {
            PURE_CALLS.contains(&path.as_str())
                || path.strip_prefix("Math.").is_some_and(|method| !method.contains('.'))
        })
    }

    fn is_pure_constructor(&self, callee: &Expression<'_>) -> bool {
        matches!(
            callee.without_parentheses(),
            Expression::Identifier(ident)
                if self.is_global(ident) && PURE_CONSTRUCTORS.contains(&ident.name.as_str())
        )
    }

    fn is_pure_namespace(&self, object: &Expression<'_>) -> bool {
        matches!(
            object,
            Expression::Identifier(ident)
                if self.is_global(ident) && PURE_NAMESPACES.contains(&ident.name.as_str())
        )
    }

    /// Parts of a class member evaluated when the class is defined
    fn class_member<'a>(
        &mut self,
        decorators: &[Decorator<'a>],
        key: &PropertyKey<'a>,
        computed: bool,
        initializer: Option<&Expression<'a>>,
    ) {
        if !decorators.is_empty() {
            self.effect();
        }
        if computed {
            self.visit_property_key(key);
        }
        if let Some(value) = initializer {
            self.visit_expression(value);
        }
    }
}

impl<'a> Visit<'a> for EffectScanner<'_> {
    fn visit_function(&mut self, _function: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _arrow: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, class: &Class<'a>) {
        if !class.decorators.is_empty() {
            self.effect();
        }
        if let Some(super_class) = &class.super_class {
            self.visit_expression(super_class);
        }
        for element in &class.body.body {
            match element {
                ClassElement::StaticBlock(_) => self.effect(),
                ClassElement::MethodDefinition(method) => {
                    self.class_member(&method.decorators, &method.key, method.computed, None)
                }
                ClassElement::PropertyDefinition(property) => self.class_member(
                    &property.decorators,
                    &property.key,
                    property.computed,
                    property.value.as_ref().filter(|_| property.r#static),
                ),
                ClassElement::AccessorProperty(property) => self.class_member(
                    &property.decorators,
                    &property.key,
                    property.computed,
                    property.value.as_ref().filter(|_| property.r#static),
                ),
                ClassElement::TSIndexSignature(_) => {}
            }
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if call.pure || self.is_pure_call(&call.callee) {
            self.visit_arguments(&call.arguments);
        } else {
            self.effect();
        }
    }

    fn visit_new_expression(&mut self, new: &NewExpression<'a>) {
        if new.pure || self.is_pure_constructor(&new.callee) {
            self.visit_arguments(&new.arguments);
        } else {
            self.effect();
        }
    }

    fn visit_tagged_template_expression(&mut self, _tagged: &TaggedTemplateExpression<'a>) {
        self.effect();
    }

    fn visit_assignment_expression(&mut self, _assignment: &AssignmentExpression<'a>) {
        self.effect();
    }

    fn visit_update_expression(&mut self, _update: &UpdateExpression<'a>) {
        self.effect();
    }

    fn visit_unary_expression(&mut self, unary: &UnaryExpression<'a>) {
        if unary.operator.is_delete() {
            self.effect();
        } else {
            walk::walk_unary_expression(self, unary);
        }
    }

    fn visit_await_expression(&mut self, _await: &AwaitExpression<'a>) {
        self.effect();
    }

    fn visit_yield_expression(&mut self, _yield: &YieldExpression<'a>) {
        self.effect();
    }

    fn visit_super(&mut self, _super: &Super) {
        self.effect();
    }

    fn visit_import_expression(&mut self, _import: &ImportExpression<'a>) {
        self.effect();
    }

    fn visit_throw_statement(&mut self, _throw: &ThrowStatement<'a>) {
        self.effect();
    }

    fn visit_debugger_statement(&mut self, _debugger: &DebuggerStatement) {
        self.effect();
    }

    fn visit_for_statement(&mut self, _loop: &ForStatement<'a>) {
        self.effect();
    }

    fn visit_for_in_statement(&mut self, _loop: &ForInStatement<'a>) {
        self.effect();
    }

    fn visit_for_of_statement(&mut self, _loop: &ForOfStatement<'a>) {
        self.effect();
    }

    fn visit_while_statement(&mut self, _loop: &WhileStatement<'a>) {
        self.effect();
    }

    fn visit_do_while_statement(&mut self, _loop: &DoWhileStatement<'a>) {
        self.effect();
    }

    fn visit_with_statement(&mut self, _with: &WithStatement<'a>) {
        self.effect();
    }

    fn visit_try_statement(&mut self, statement: &TryStatement<'a>) {
        self.effects.try_block = true;
        walk::walk_try_statement(self, statement);
    }

    fn visit_static_member_expression(&mut self, member: &StaticMemberExpression<'a>) {
        if !self.is_pure_namespace(&member.object) {
            self.effects.property_reads = true;
        }
        walk::walk_static_member_expression(self, member);
    }

    fn visit_computed_member_expression(&mut self, member: &ComputedMemberExpression<'a>) {
        if !self.is_pure_namespace(&member.object) {
            self.effects.property_reads = true;
        }
        walk::walk_computed_member_expression(self, member);
    }

    fn visit_private_field_expression(&mut self, member: &PrivateFieldExpression<'a>) {
        self.effects.property_reads = true;
        walk::walk_private_field_expression(self, member);
    }

    fn visit_object_pattern(&mut self, pattern: &ObjectPattern<'a>) {
        self.effects.property_reads = true;
        walk::walk_object_pattern(self, pattern);
    }

    /// Array destructuring runs the iterator protocol
    fn visit_array_pattern(&mut self, _pattern: &ArrayPattern<'a>) {
        self.effect();
    }

    fn visit_spread_element(&mut self, spread: &SpreadElement<'a>) {
        self.effects.property_reads = true;
        walk::walk_spread_element(self, spread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::statements::analyze;

    fn effects(src: &str, options: EffectOptions) -> Vec<bool> {
        let analysis = analyze(src).unwrap();
        analysis
            .statements
            .iter()
            .map(|s| s.has_effects(options))
            .collect()
    }

    fn default_effects(src: &str) -> Vec<bool> {
        effects(src, EffectOptions::default())
    }

    #[test]
    fn test_declarations_are_pure() {
        let src = "const a = 1;\nfunction f() { sideEffect(); }\nconst g = () => { launch(); };\nclass A { m() { go(); } }";
        assert_eq!(default_effects(src), vec![false, false, false, false]);
    }

    #[test]
    fn test_calls_and_assignments_are_effects() {
        let src = "init();\nwindow.x = 1;\nconst v = compute();\ncounter++;";
        assert_eq!(default_effects(src), vec![true, true, true, true]);
    }

    #[test]
    fn test_pure_annotations_and_known_globals() {
        let src = "const a = /*#__PURE__*/ make();\nconst b = Object.keys({ x: 1 });\nconst c = new Map();\nconst d = Math.max(1, 2);\nconst e = /*#__PURE__*/ (function () { return 1; })();";
        assert_eq!(default_effects(src), vec![false, false, false, false, false]);
    }

    #[test]
    fn test_global_mutating_builtins_are_effects() {
        let src = "Object.assign(globalThis, { installed: true });\nconst frozen = Object.freeze(shared);\nnew Promise(() => { console.log('boot'); });";
        let relaxed = EffectOptions {
            property_read_side_effects: false,
            try_catch_deoptimization: false,
        };
        assert_eq!(effects(src, relaxed), vec![true, true, true]);
    }

    #[test]
    fn test_local_binding_named_like_a_pure_global() {
        let src = "const Map = install;\nconst m = new Map();\nfunction String() { boot(); }\nString();";
        assert_eq!(default_effects(src), vec![false, true, false, true]);
    }

    #[test]
    fn test_property_reads_follow_option() {
        let src = "const a = obj.prop;\nconst { b } = obj;";
        assert_eq!(default_effects(src), vec![true, true]);

        let relaxed = EffectOptions {
            property_read_side_effects: false,
            ..EffectOptions::default()
        };
        assert_eq!(effects(src, relaxed), vec![false, false]);
    }

    #[test]
    fn test_try_catch_deoptimization_option() {
        let src = "if (flag) { try { x; } catch (e) {} }";
        assert_eq!(default_effects(src), vec![true]);

        let relaxed = EffectOptions {
            try_catch_deoptimization: false,
            ..EffectOptions::default()
        };
        assert_eq!(effects(src, relaxed), vec![false]);
    }

    #[test]
    fn test_static_class_members_run_at_definition() {
        let src = "class A { static x = setup(); }\nclass B { y = setup(); }\nclass C { static { boot(); } }";
        assert_eq!(default_effects(src), vec![true, false, true]);
    }

    #[test]
    fn test_computed_class_keys_run_at_definition() {
        let src = "class A { [register()]() {} }\nclass B { static [key()] = 1; }\nclass C { [name] = 1; }";
        let relaxed = EffectOptions {
            property_read_side_effects: false,
            try_catch_deoptimization: false,
        };
        assert_eq!(effects(src, relaxed), vec![true, true, false]);
    }

    #[test]
    fn test_loops_and_array_patterns() {
        let src = "for (const k in obj) {}\nconst [first] = list;\nwhile (false) {}";
        assert_eq!(default_effects(src), vec![true, true, true]);
    }
}
