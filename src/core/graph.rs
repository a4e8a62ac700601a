//! Module graph of one target: every module reachable from the entries,
//! loaded, transformed by the module-phase stages, analyzed and with each
//! import resolved to another module or an external.

use crate::analysis::{analyze, ExportEntry, NAMESPACE};
use crate::core::diagnostics::{Diagnostics, MISSING_EXPORT, THIS_IS_UNDEFINED};
use crate::core::interfaces::FileSystemService;
use crate::core::models::{ModuleId, ModuleNode, PackageRef, Platform, ResolvedId, SideEffects};
use crate::core::plugin::{ModuleSource, Pipeline, StageContext};
use crate::infrastructure::node_resolver::SideEffectsField;
use crate::infrastructure::processors::common::IncludeFilter;
use crate::infrastructure::resolver::Resolver;
use crate::utils::{BuildError, Logger, Result};
use futures::future::join_all;
use glob::Pattern;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Name a CommonJS shim exports its `module.exports` object under
pub const MODULE_EXPORTS: &str = "__moduleExports";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub module: ModuleId,
}

/// What an imported or exported name ultimately refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A top-level binding declared in `module`
    Local { module: ModuleId, name: String },
    /// The namespace object of `module`
    Namespace(ModuleId),
    /// A property of a CommonJS module's exports object that was not
    /// statically detected
    Synthetic { module: ModuleId, property: String },
    External { specifier: String, imported: String },
    Missing,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: BTreeMap<ModuleId, ModuleNode>,
    entries: Vec<EntryPoint>,
}

impl ModuleGraph {
    pub fn from_nodes(nodes: Vec<ModuleNode>, entries: Vec<EntryPoint>) -> Self {
        Self {
            modules: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            entries,
        }
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.modules.get(id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn entries(&self) -> &[EntryPoint] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module ids imported by `id` (static imports and re-exports, source order)
    pub fn dependencies(&self, id: &ModuleId) -> Vec<&ModuleId> {
        let Some(node) = self.modules.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&ModuleId> = Vec::new();
        for resolved in &node.resolved {
            if let Some(dep) = resolved.module_id() {
                if !out.contains(&dep) {
                    out.push(dep);
                }
            }
        }
        out
    }

    /// DFS post-order from the entries in declaration order: every module
    /// comes after the modules it imports (cycles aside)
    pub fn execution_order(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut visited = HashSet::new();
        for entry in &self.entries {
            self.visit(&entry.module, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, id: &ModuleId, visited: &mut HashSet<ModuleId>, order: &mut Vec<ModuleId>) {
        if !visited.insert(id.clone()) {
            return;
        }
        for dep in self.dependencies(id) {
            self.visit(dep, visited, order);
        }
        order.push(id.clone());
    }

    fn is_commonjs_shim(&self, id: &ModuleId) -> bool {
        self.modules
            .get(id)
            .is_some_and(|n| n.analysis.exported_names().contains(&MODULE_EXPORTS))
    }

    /// Follows `exported` through re-exports and `export *` to its binding
    pub fn resolve_export(&self, module: &ModuleId, exported: &str) -> Binding {
        let mut visited = HashSet::new();
        let found = self.resolve_export_inner(module, exported, &mut visited);
        if found == Binding::Missing && exported != "default" && self.is_commonjs_shim(module) {
            return Binding::Synthetic {
                module: module.clone(),
                property: exported.to_string(),
            };
        }
        found
    }

    fn resolve_export_inner(&self, module: &ModuleId, exported: &str, visited: &mut HashSet<(ModuleId, String)>) -> Binding {
        if !visited.insert((module.clone(), exported.to_string())) {
            return Binding::Missing;
        }
        let Some(node) = self.modules.get(module) else {
            return Binding::Missing;
        };

        for entry in &node.analysis.exports {
            match entry {
                ExportEntry::Local { exported: name, local } if name == exported => {
                    return self.trace_local_inner(module, local, visited);
                }
                ExportEntry::ReExport {
                    exported: name,
                    imported,
                    record,
                } if name == exported => {
                    return self.follow(&node.resolved[*record], imported, visited);
                }
                _ => {}
            }
        }

        if exported == "default" {
            return Binding::Missing;
        }
        for entry in &node.analysis.exports {
            if let ExportEntry::Star { record } = entry {
                if let ResolvedId::Module { id, .. } = &node.resolved[*record] {
                    let found = self.resolve_export_inner(id, exported, visited);
                    if found != Binding::Missing {
                        return found;
                    }
                }
            }
        }
        Binding::Missing
    }

    fn follow(&self, target: &ResolvedId, imported: &str, visited: &mut HashSet<(ModuleId, String)>) -> Binding {
        match target {
            ResolvedId::External { specifier } => Binding::External {
                specifier: specifier.clone(),
                imported: imported.to_string(),
            },
            ResolvedId::Module { id, .. } if imported == NAMESPACE => Binding::Namespace(id.clone()),
            ResolvedId::Module { id, .. } => {
                let found = self.resolve_export_inner(id, imported, visited);
                if found == Binding::Missing && imported != "default" && self.is_commonjs_shim(id) {
                    return Binding::Synthetic {
                        module: id.clone(),
                        property: imported.to_string(),
                    };
                }
                found
            }
        }
    }

    /// What a top-level name used inside `module` refers to
    pub fn trace_local(&self, module: &ModuleId, local: &str) -> Binding {
        self.trace_local_inner(module, local, &mut HashSet::new())
    }

    fn trace_local_inner(&self, module: &ModuleId, local: &str, visited: &mut HashSet<(ModuleId, String)>) -> Binding {
        let Some(node) = self.modules.get(module) else {
            return Binding::Missing;
        };
        match node.analysis.import_locals.get(local) {
            Some((record, imported)) => self.follow(&node.resolved[*record], imported, visited),
            None => Binding::Local {
                module: module.clone(),
                name: local.to_string(),
            },
        }
    }

    /// Every name `module` exports, including names reached through `export *`
    pub fn export_names(&self, module: &ModuleId) -> Vec<String> {
        let mut names = Vec::new();
        let mut visited = HashSet::new();
        self.collect_export_names(module, true, &mut visited, &mut names);
        names
    }

    fn collect_export_names(&self, module: &ModuleId, with_default: bool, visited: &mut HashSet<ModuleId>, names: &mut Vec<String>) {
        if !visited.insert(module.clone()) {
            return;
        }
        let Some(node) = self.modules.get(module) else {
            return;
        };
        for name in node.analysis.exported_names() {
            if (with_default || name != "default") && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        for entry in &node.analysis.exports {
            if let ExportEntry::Star { record } = entry {
                if let ResolvedId::Module { id, .. } = &node.resolved[*record] {
                    self.collect_export_names(id, false, visited, names);
                }
            }
        }
    }

    /// `export * from "<external>"` records of a module
    pub fn external_stars(&self, module: &ModuleId) -> Vec<String> {
        let Some(node) = self.modules.get(module) else {
            return Vec::new();
        };
        node.analysis
            .exports
            .iter()
            .filter_map(|e| match e {
                ExportEntry::Star { record } => match &node.resolved[*record] {
                    ResolvedId::External { specifier } => Some(specifier.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    /// Checks that every imported name exists in the module it is imported from
    pub fn link(&self, diagnostics: &Diagnostics) -> Result<()> {
        for node in self.modules.values() {
            for (index, record) in node.analysis.imports.iter().enumerate() {
                let target = match &node.resolved[index] {
                    ResolvedId::Module { id, .. } => id,
                    ResolvedId::External { .. } => continue,
                };
                let mut names: Vec<&str> = record.bindings.iter().map(|b| b.imported.as_str()).collect();
                for entry in &node.analysis.exports {
                    if let ExportEntry::ReExport { imported, record: r, .. } = entry {
                        if *r == index {
                            names.push(imported);
                        }
                    }
                }
                for name in names {
                    if name != NAMESPACE && self.resolve_export(target, name) == Binding::Missing {
                        diagnostics.raise(
                            MISSING_EXPORT,
                            format!("\"{}\" is not exported by \"{}\"", name, target),
                            Some(node.id.to_string()),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Which modules may lose their top-level side effects when unused
pub struct SideEffectRules {
    pub module_side_effects: bool,
    pub pure_modules: IncludeFilter,
}

impl SideEffectRules {
    pub fn classify(&self, id: &ModuleId, package: Option<&PackageRef>, project_root: &std::path::Path) -> SideEffects {
        if id.is_virtual() {
            return SideEffects::Pure;
        }
        if !self.module_side_effects || self.pure_modules.matches(id, project_root) {
            return SideEffects::Pure;
        }
        let Some(package) = package else {
            return SideEffects::Unknown;
        };
        match &package.manifest.side_effects {
            Some(SideEffectsField::Flag(false)) => SideEffects::Pure,
            Some(SideEffectsField::Flag(true)) => SideEffects::HasSideEffects,
            Some(SideEffectsField::Patterns(patterns)) => {
                let relative = id
                    .path()
                    .and_then(|p| p.strip_prefix(&package.dir).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                let matched = patterns.iter().any(|pattern| {
                    let pattern = pattern.trim_start_matches("./");
                    let pattern = if pattern.contains('/') {
                        pattern.to_string()
                    } else {
                        format!("**/{}", pattern)
                    };
                    Pattern::new(&pattern).is_ok_and(|p| p.matches(&relative))
                });
                if matched {
                    SideEffects::HasSideEffects
                } else {
                    SideEffects::Pure
                }
            }
            None => SideEffects::Unknown,
        }
    }
}

/// Builds the module graph of one target
pub struct GraphBuilder<'a> {
    pub resolver: &'a Resolver,
    pub pipeline: &'a Pipeline,
    pub fs: &'a dyn FileSystemService,
    pub context: &'a StageContext<'a>,
    pub side_effects: &'a SideEffectRules,
}

impl<'a> GraphBuilder<'a> {
    pub async fn build(&self, input: &BTreeMap<String, String>) -> Result<ModuleGraph> {
        let mut entries = Vec::with_capacity(input.len());
        for (name, path) in input {
            let module = self.resolver.resolve_entry(path).await?;
            entries.push(EntryPoint {
                name: name.clone(),
                module,
            });
        }

        let mut queue: VecDeque<(ModuleId, Platform)> =
            entries.iter().map(|e| (e.module.clone(), Platform::Shared)).collect();
        let mut seen: HashSet<ModuleId> = queue.iter().map(|(id, _)| id.clone()).collect();
        let mut emitted: HashMap<ModuleId, String> = HashMap::new();
        let mut nodes = Vec::new();

        while let Some((id, platform)) = queue.pop_front() {
            Logger::loading_module(self.context.target, id.as_str());
            let raw_source = self.load(&id, &emitted).await?;

            let output = self.pipeline.run_module(
                ModuleSource {
                    id: id.clone(),
                    code: raw_source.clone(),
                },
                self.context,
            )?;
            for source in output.emitted {
                emitted.entry(source.id).or_insert(source.code);
            }
            let code = output.module.code;

            let analysis = analyze(&code).map_err(|e| BuildError::transform("parse", &id, e.to_string()))?;
            if !analysis.top_level_this.is_empty() && !id.is_virtual() {
                self.context.diagnostics.raise(
                    THIS_IS_UNDEFINED,
                    "The 'this' keyword is equivalent to 'undefined' at the top level of an ES module, and has been rewritten",
                    Some(id.to_string()),
                )?;
            }

            let lookups = analysis
                .imports
                .iter()
                .map(|record| self.resolver.resolve(&record.specifier, &id, platform));
            let resolved = join_all(lookups).await.into_iter().collect::<Result<Vec<_>>>()?;

            for target in &resolved {
                if let ResolvedId::Module { id: dep, platform } = target {
                    if seen.insert(dep.clone()) {
                        queue.push_back((dep.clone(), *platform));
                    }
                }
            }

            let package = match id.path() {
                Some(path) => self.resolver.node().nearest_package(path).await,
                None => None,
            };
            let side_effects = self
                .side_effects
                .classify(&id, package.as_ref(), self.context.project_root);

            nodes.push(ModuleNode {
                id,
                raw_source,
                code,
                analysis,
                resolved,
                side_effects,
                platform,
                package,
            });
        }

        Ok(ModuleGraph::from_nodes(nodes, entries))
    }

    async fn load(&self, id: &ModuleId, emitted: &HashMap<ModuleId, String>) -> Result<String> {
        match id.path() {
            Some(path) => self.fs.read_file(path).await,
            None => emitted
                .get(id)
                .cloned()
                .or_else(|| self.resolver.virtual_source(id))
                .ok_or_else(|| BuildError::unresolved(id.as_str(), "<virtual>")),
        }
    }
}
