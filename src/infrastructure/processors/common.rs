/// Shared functionality between stages
use crate::core::models::ModuleId;
use crate::utils::Result;
use glob::{MatchOptions, Pattern};
use oxc_span::SourceType;
use std::path::Path;

/// Check if a module path is from node_modules
pub fn is_node_modules_path(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "node_modules")
}

/// Glob list matched against project-relative module paths
#[derive(Debug, Clone)]
pub struct IncludeFilter {
    patterns: Vec<Pattern>,
}

impl IncludeFilter {
    pub fn new(globs: &[String]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| Pattern::new(g))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches_path(&self, relative: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: false,
            ..MatchOptions::new()
        };
        self.patterns.iter().any(|p| {
            // `node_modules/**` should also match nested node_modules trees
            p.matches_with(relative, options)
                || relative
                    .match_indices("node_modules/")
                    .any(|(at, _)| p.matches_with(&relative[at..], options))
        })
    }

    pub fn matches(&self, id: &ModuleId, project_root: &Path) -> bool {
        !id.is_virtual() && self.matches_path(&id.relative_to(project_root))
    }
}

/// oxc source type for a module id; virtual modules are plain ES modules
pub fn source_type_for(id: &ModuleId) -> SourceType {
    match id.path() {
        Some(path) => SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs()),
        None => SourceType::mjs(),
    }
}

pub fn is_typescript(id: &ModuleId) -> bool {
    matches!(id.extension(), Some("ts" | "tsx" | "mts" | "cts"))
}

pub fn is_javascript(id: &ModuleId) -> bool {
    matches!(id.extension(), Some("js" | "jsx" | "mjs" | "cjs"))
}
