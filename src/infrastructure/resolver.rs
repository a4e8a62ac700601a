use super::node_resolver::{normalize, NodeModuleResolver, NodeResolution};
use crate::core::models::{ModuleId, Platform, ResolvedId, SubstitutionTarget, VIRTUAL_PREFIX};
use crate::utils::path_aliases::{AliasTarget, PathAliasResolver};
use crate::utils::{BuildError, Logger, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SHIM_PREFIX: &str = "shim:";
const EMPTY_PREFIX: &str = "empty:";
const EMPTY_MODULE: &str = "export default {};\n";

/// Everything a target's resolver needs, taken from its descriptor
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub project_root: PathBuf,
    pub platform: Platform,
    pub alias: BTreeMap<String, String>,
    pub substitutions: BTreeMap<String, SubstitutionTarget>,
    pub external: Vec<String>,
    pub source_roots: Vec<PathBuf>,
    pub extensions: Vec<String>,
}

/// Specifier → module id for one target: aliases, then platform
/// substitutions, then externals, then Node-style resolution
pub struct Resolver {
    root: PathBuf,
    platform: Platform,
    aliases: PathAliasResolver,
    substitutions: BTreeMap<String, SubstitutionTarget>,
    external: Vec<String>,
    source_roots: Vec<PathBuf>,
    node: NodeModuleResolver,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            aliases: PathAliasResolver::new(options.alias, options.project_root.clone()),
            root: options.project_root,
            platform: options.platform,
            substitutions: options.substitutions,
            external: options.external,
            source_roots: options.source_roots,
            node: NodeModuleResolver::new(options.extensions),
        }
    }

    pub fn node(&self) -> &NodeModuleResolver {
        &self.node
    }

    pub fn project_root(&self) -> &Path {
        &self.root
    }

    /// Resolves an entry path given relative to the project root
    pub async fn resolve_entry(&self, entry: &str) -> Result<ModuleId> {
        let path = self.root.join(entry);
        match self.node.resolve_path(&path, self.platform).await {
            Some(NodeResolution::File(file)) => Ok(ModuleId::from_path(&file)),
            _ => Err(BuildError::unresolved(entry, "<entry>")),
        }
    }

    pub async fn resolve(&self, specifier: &str, importer: &ModuleId, importer_platform: Platform) -> Result<ResolvedId> {
        let resolved = self.resolve_inner(specifier, importer, importer_platform).await?;
        let shown = match &resolved {
            ResolvedId::Module { id, .. } => id.to_string(),
            ResolvedId::External { specifier } => format!("external {}", specifier),
        };
        Logger::resolved(specifier, &shown);
        Ok(resolved)
    }

    async fn resolve_inner(&self, specifier: &str, importer: &ModuleId, importer_platform: Platform) -> Result<ResolvedId> {
        if let Some(name) = specifier.strip_prefix(VIRTUAL_PREFIX) {
            return Ok(ResolvedId::Module {
                id: ModuleId::virtual_id(name),
                platform: importer_platform,
            });
        }

        let specifier = match self.aliases.resolve(specifier) {
            Some(AliasTarget::Path(path)) => {
                return match self.node.resolve_path(&path, self.platform).await {
                    Some(found) => Ok(self.module(found, specifier, importer_platform)),
                    None => Err(BuildError::unresolved(specifier, importer)),
                };
            }
            Some(AliasTarget::Specifier(rewritten)) => rewritten,
            None => specifier.to_string(),
        };

        if self.platform != Platform::Node {
            if let Some(found) = self.substitute(&specifier, importer).await? {
                return Ok(found);
            }
        }

        if self.is_external(&specifier) {
            return Ok(ResolvedId::External { specifier });
        }

        match self.default_resolution(&specifier, importer).await {
            Some(found) => Ok(self.module(found, &specifier, importer_platform)),
            None => Err(BuildError::unresolved(&specifier, importer)),
        }
    }

    fn module(&self, found: NodeResolution, specifier: &str, platform: Platform) -> ResolvedId {
        match found {
            NodeResolution::File(file) => ResolvedId::Module {
                id: ModuleId::from_path(&file),
                platform,
            },
            NodeResolution::Empty => ResolvedId::Module {
                id: ModuleId::virtual_id(&format!("{}{}", EMPTY_PREFIX, specifier)),
                platform,
            },
        }
    }

    fn is_external(&self, specifier: &str) -> bool {
        let listed = self.external.iter().any(|ext| {
            specifier == ext
                || (specifier.len() > ext.len()
                    && specifier.starts_with(ext.as_str())
                    && specifier.as_bytes()[ext.len()] == b'/')
        });
        listed || (self.platform == Platform::Node && NodeModuleResolver::is_builtin(specifier))
    }

    fn importer_dir(&self, importer: &ModuleId) -> PathBuf {
        importer
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
    }

    async fn default_resolution(&self, specifier: &str, importer: &ModuleId) -> Option<NodeResolution> {
        if !NodeModuleResolver::is_bare(specifier) {
            let path = if Path::new(specifier).is_absolute() {
                PathBuf::from(specifier)
            } else {
                self.importer_dir(importer).join(specifier)
            };
            return self.node.resolve_path(&path, self.platform).await;
        }

        if self.platform == Platform::Browser {
            if let Some(path) = importer.path() {
                if let Some(found) = self.node.browser_remap(specifier, path).await {
                    return Some(found);
                }
            }
        }

        for source_root in &self.source_roots {
            let candidate = self.root.join(source_root).join(specifier);
            if let Some(found) = self.node.resolve_path(&candidate, self.platform).await {
                return Some(found);
            }
        }

        self.node
            .resolve_package(specifier, &self.importer_dir(importer), self.platform)
            .await
    }

    /// Looks the specifier up in the substitution table; relative specifiers
    /// also match by their resolved project-relative path without extension
    async fn substitute(&self, specifier: &str, importer: &ModuleId) -> Result<Option<ResolvedId>> {
        let mut hit = self.substitutions.get_key_value(specifier);

        if hit.is_none() && !NodeModuleResolver::is_bare(specifier) {
            if let Some(NodeResolution::File(file)) = self.default_resolution(specifier, importer).await {
                let relative = strip_extension(&relative_path(&file, &self.root));
                hit = self
                    .substitutions
                    .iter()
                    .find(|(key, _)| strip_extension(key.trim_start_matches("./")) == relative);
            }
        }

        let Some((key, target)) = hit else {
            return Ok(None);
        };
        let resolved = match target {
            SubstitutionTarget::Path(path) => {
                let file = match self.node.resolve_path(&normalize(&self.root.join(path)), self.platform).await {
                    Some(NodeResolution::File(file)) => file,
                    _ => return Err(BuildError::unresolved(path, format!("substitution for '{}'", key))),
                };
                ModuleId::from_path(&file)
            }
            SubstitutionTarget::Shim { .. } => ModuleId::virtual_id(&format!("{}{}", SHIM_PREFIX, key)),
        };
        Logger::debug(&format!("substituted {} → {}", specifier, resolved));
        Ok(Some(ResolvedId::Module {
            id: resolved,
            platform: self.platform,
        }))
    }

    /// Source of a virtual module created by resolution, if `id` is one
    pub fn virtual_source(&self, id: &ModuleId) -> Option<String> {
        let name = id.as_str().strip_prefix(VIRTUAL_PREFIX)?;
        if name.starts_with(EMPTY_PREFIX) {
            return Some(EMPTY_MODULE.to_string());
        }
        let key = name.strip_prefix(SHIM_PREFIX)?;
        match self.substitutions.get(key)? {
            SubstitutionTarget::Shim { shim } => Some(shim.clone()),
            SubstitutionTarget::Path(_) => None,
        }
    }
}

fn relative_path(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

fn strip_extension(path: &str) -> String {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => path[..name_start + dot].to_string(),
        _ => path.to_string(),
    }
}
