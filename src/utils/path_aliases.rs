use crate::utils::Logger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What an alias rewrites a specifier into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// A file or directory, still subject to extension probing
    Path(PathBuf),
    /// Another bare specifier, resolved through the regular resolution path
    Specifier(String),
}

/// Path alias resolver for import path resolution
pub struct PathAliasResolver {
    aliases: BTreeMap<String, String>,
    root: PathBuf,
}

impl PathAliasResolver {
    pub fn new(aliases: BTreeMap<String, String>, root: PathBuf) -> Self {
        Logger::debug(&format!(
            "🔗 Initialized PathAliasResolver with {} aliases",
            aliases.len()
        ));
        for (alias, target) in &aliases {
            Logger::debug(&format!("  {} → {}", alias, target));
        }

        Self { aliases, root }
    }

    /// Resolve an import specifier using aliases.
    /// Exact keys win over `alias/rest` prefix matches; among prefixes the longest wins.
    pub fn resolve(&self, import_path: &str) -> Option<AliasTarget> {
        if let Some(target) = self.aliases.get(import_path) {
            let resolved = self.resolve_target(target, None);
            Logger::resolved(import_path, &format!("{:?}", resolved));
            return Some(resolved);
        }

        let (alias, target) = self
            .aliases
            .iter()
            .filter(|(alias, _)| {
                import_path.len() > alias.len()
                    && import_path.starts_with(alias.as_str())
                    && import_path.as_bytes()[alias.len()] == b'/'
            })
            .max_by_key(|(alias, _)| alias.len())?;

        let rest = &import_path[alias.len() + 1..];
        let resolved = self.resolve_target(target, Some(rest));
        Logger::resolved(import_path, &format!("{:?}", resolved));
        Some(resolved)
    }

    fn resolve_target(&self, target: &str, rest: Option<&str>) -> AliasTarget {
        let path = Path::new(target);

        if path.is_absolute() || target.starts_with("./") || target.starts_with("../") {
            let base = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.root.join(target.strip_prefix("./").unwrap_or(target))
            };
            match rest {
                Some(rest) => AliasTarget::Path(base.join(rest)),
                None => AliasTarget::Path(base),
            }
        } else {
            match rest {
                Some(rest) => AliasTarget::Specifier(format!("{}/{}", target, rest)),
                None => AliasTarget::Specifier(target.to_string()),
            }
        }
    }

    /// Check if an import path matches any alias
    pub fn matches_alias(&self, import_path: &str) -> bool {
        self.resolve(import_path).is_some()
    }
}
