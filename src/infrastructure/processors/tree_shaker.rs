use crate::analysis::{EffectOptions, StatementKind};
use crate::core::graph::{Binding, ModuleGraph, MODULE_EXPORTS};
use crate::core::models::ModuleId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// A top-level declaration dropped from the output
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemovedDeclaration {
    pub module: ModuleId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeShakingStats {
    pub total_modules: usize,
    pub included_modules: usize,
    pub total_statements: usize,
    pub included_statements: usize,
    pub removed_declarations: usize,
}

impl fmt::Display for TreeShakingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reduction = if self.total_statements == 0 {
            0.0
        } else {
            (self.total_statements - self.included_statements) as f64 / self.total_statements as f64 * 100.0
        };
        write!(
            f,
            "{}/{} modules, {}/{} statements kept ({:.1}% removed), {} declarations dropped",
            self.included_modules,
            self.total_modules,
            self.included_statements,
            self.total_statements,
            reduction,
            self.removed_declarations
        )
    }
}

/// Result of treeshaking: what survives of the graph
#[derive(Debug, Default)]
pub struct ShakeResult {
    /// Included statement indices per module; modules absent here are dropped
    pub included: BTreeMap<ModuleId, BTreeSet<usize>>,
    /// Modules whose namespace object is referenced
    pub namespaces: BTreeSet<ModuleId>,
    pub removed: Vec<RemovedDeclaration>,
    pub stats: TreeShakingStats,
}

impl ShakeResult {
    pub fn is_included(&self, id: &ModuleId) -> bool {
        self.included.contains_key(id)
    }

    pub fn statements(&self, id: &ModuleId) -> Option<&BTreeSet<usize>> {
        self.included.get(id)
    }

    /// Included modules in execution order
    pub fn included_modules(&self, graph: &ModuleGraph) -> Vec<ModuleId> {
        graph
            .execution_order()
            .into_iter()
            .filter(|id| self.is_included(id))
            .collect()
    }
}

/// Statement-level dead code elimination over the whole graph
pub struct TreeShaker<'g> {
    graph: &'g ModuleGraph,
    options: EffectOptions,
    used_bindings: HashSet<(ModuleId, String)>,
    used_modules: HashSet<ModuleId>,
    namespaces: BTreeSet<ModuleId>,
    included: BTreeMap<ModuleId, BTreeSet<usize>>,
    effects: HashMap<ModuleId, Vec<usize>>,
    queue: VecDeque<Binding>,
}

impl<'g> TreeShaker<'g> {
    pub fn new(graph: &'g ModuleGraph, options: EffectOptions) -> Self {
        Self {
            graph,
            options,
            used_bindings: HashSet::new(),
            used_modules: HashSet::new(),
            namespaces: BTreeSet::new(),
            included: BTreeMap::new(),
            effects: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn shake(mut self) -> ShakeResult {
        for node in self.graph.modules() {
            let effects = node
                .analysis
                .statements
                .iter()
                .enumerate()
                .filter(|(_, s)| s.has_effects(self.options))
                .map(|(i, _)| i)
                .collect();
            self.effects.insert(node.id.clone(), effects);
        }

        for entry in self.graph.entries() {
            self.used_modules.insert(entry.module.clone());
            self.included.entry(entry.module.clone()).or_default();
            for name in self.graph.export_names(&entry.module) {
                self.queue.push_back(self.graph.resolve_export(&entry.module, &name));
            }
        }

        loop {
            self.drain();
            if !self.include_effects() {
                break;
            }
        }

        self.finish()
    }

    fn drain(&mut self) {
        while let Some(binding) = self.queue.pop_front() {
            match binding {
                Binding::Local { module, name } => {
                    if !self.used_bindings.insert((module.clone(), name.clone())) {
                        continue;
                    }
                    self.used_modules.insert(module.clone());
                    let Some(node) = self.graph.get(&module) else {
                        continue;
                    };
                    if let Some(statements) = node.analysis.declarations.get(&name) {
                        for &index in statements {
                            self.include_statement(&module, index);
                        }
                    }
                }
                Binding::Namespace(module) => {
                    if !self.namespaces.insert(module.clone()) {
                        continue;
                    }
                    self.used_modules.insert(module.clone());
                    self.included.entry(module.clone()).or_default();
                    for name in self.graph.export_names(&module) {
                        self.queue.push_back(self.graph.resolve_export(&module, &name));
                    }
                }
                Binding::Synthetic { module, .. } => {
                    self.queue.push_back(Binding::Local {
                        module,
                        name: MODULE_EXPORTS.to_string(),
                    });
                }
                Binding::External { .. } | Binding::Missing => {}
            }
        }
    }

    fn include_statement(&mut self, module: &ModuleId, index: usize) {
        if !self.included.entry(module.clone()).or_default().insert(index) {
            return;
        }
        let Some(node) = self.graph.get(module) else {
            return;
        };
        for name in &node.analysis.statements[index].references {
            let binding = self.graph.trace_local(module, name);
            self.queue.push_back(binding);
        }
    }

    /// Adds effectful statements of modules that keep their effects; returns
    /// whether anything new was included
    fn include_effects(&mut self) -> bool {
        let mut pending = Vec::new();
        for node in self.graph.modules() {
            let keeps = node.side_effects.keeps_effects() || self.used_modules.contains(&node.id);
            if !keeps {
                continue;
            }
            let included = self.included.get(&node.id);
            for &index in &self.effects[&node.id] {
                if !included.is_some_and(|set| set.contains(&index)) {
                    pending.push((node.id.clone(), index));
                }
            }
        }

        let changed = !pending.is_empty();
        for (module, index) in pending {
            self.used_modules.insert(module.clone());
            self.include_statement(&module, index);
        }
        changed
    }

    fn finish(self) -> ShakeResult {
        let mut stats = TreeShakingStats {
            total_modules: self.graph.len(),
            ..TreeShakingStats::default()
        };
        let mut removed = Vec::new();

        for node in self.graph.modules() {
            let countable = node
                .analysis
                .statements
                .iter()
                .filter(|s| !matches!(s.kind, StatementKind::Import | StatementKind::Empty))
                .count();
            stats.total_statements += countable;

            let kept = self.included.get(&node.id);
            if let Some(kept) = kept {
                stats.included_modules += 1;
                stats.included_statements += kept.len();
            }
            for (name, statements) in &node.analysis.declarations {
                let survives = kept.is_some_and(|set| statements.iter().any(|i| set.contains(i)));
                if !survives {
                    removed.push(RemovedDeclaration {
                        module: node.id.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
        stats.removed_declarations = removed.len();

        ShakeResult {
            included: self.included,
            namespaces: self.namespaces,
            removed,
            stats,
        }
    }
}
