pub mod effects;
pub mod parse;
pub mod rename;
pub mod statements;

pub use effects::{EffectOptions, StatementEffects};
pub use parse::ParseError;
pub use rename::Renamer;
pub use statements::{
    analyze, ExportEntry, ImportBinding, ImportRecord, ModuleAnalysis, Occurrence, Statement, StatementKind,
    DEFAULT_LOCAL, NAMESPACE,
};

pub const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "yield", "let", "static", "implements", "interface",
    "package", "private", "protected", "public", "await",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// Turns an arbitrary file stem into a valid identifier (`my-lib.min` → `my_lib_min`)
pub fn identifier_from(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for (i, c) in stem.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            if i == 0 && c.is_ascii_digit() {
                out.push('_');
            }
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || is_reserved(&out) {
        out.insert(0, '_');
    }
    out
}
