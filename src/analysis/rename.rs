use super::statements::ModuleAnalysis;
use std::collections::HashMap;
use std::ops::Range;

/// Re-emits byte ranges of a module with top-level bindings renamed.
///
/// Only identifiers bound at module level are touched, so shadowing
/// parameters, property names and object keys stay as written; shorthand
/// properties are expanded (`{ a }` → `{ a: a$1 }`).
pub struct Renamer<'a> {
    analysis: &'a ModuleAnalysis,
    src: &'a str,
    names: &'a HashMap<String, String>,
    rewrite_this: bool,
}

impl<'a> Renamer<'a> {
    pub fn new(analysis: &'a ModuleAnalysis, src: &'a str, names: &'a HashMap<String, String>) -> Self {
        Self {
            analysis,
            src,
            names,
            rewrite_this: false,
        }
    }

    /// Module-level `this` becomes `undefined`, as in any ES module
    pub fn rewrite_top_level_this(mut self, enabled: bool) -> Self {
        self.rewrite_this = enabled;
        self
    }

    pub fn render(&self, range: Range<usize>, out: &mut String) {
        self.render_with_insert(range, None, out);
    }

    /// Like [`Renamer::render`], inserting ` <text>` at byte offset `insert.0`
    pub fn render_with_insert(&self, range: Range<usize>, insert: Option<(usize, &str)>, out: &mut String) {
        if range.is_empty() {
            return;
        }
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        let occurrences = &self.analysis.occurrences;
        let first = occurrences.partition_point(|o| o.span.start < range.start);
        for occurrence in occurrences[first..].iter().take_while(|o| o.span.end <= range.end) {
            let Some(renamed) = self.names.get(&occurrence.name) else {
                continue;
            };
            if occurrence.shorthand {
                edits.push((occurrence.span.clone(), format!("{}: {}", occurrence.name, renamed)));
            } else if *renamed != occurrence.name {
                edits.push((occurrence.span.clone(), renamed.clone()));
            }
        }

        if self.rewrite_this {
            for &at in self.analysis.top_level_this.iter().filter(|&&at| range.contains(&at)) {
                edits.push((at..at + "this".len(), "undefined".to_string()));
            }
        }
        if let Some((at, text)) = insert {
            edits.push((at..at, format!(" {}", text)));
        }
        edits.sort_by_key(|(span, _)| span.start);

        let mut cursor = range.start;
        for (span, text) in edits {
            out.push_str(&self.src[cursor..span.start]);
            out.push_str(&text);
            cursor = span.end;
        }
        out.push_str(&self.src[cursor..range.end]);
    }
}
