use super::tree_shaker::ShakeResult;
use crate::core::graph::ModuleGraph;
use crate::core::models::{ModuleId, OutputOptions};
use crate::infrastructure::node_resolver::normalize;
use crate::utils::{BuildError, Logger, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Holds an entry module and everything only that entry needs
    Entry,
    /// Declared in `manual_chunks`
    Manual,
    /// Modules needed by more than one entry
    Shared,
    /// Entry file that only re-exports from the chunk holding its module
    Facade,
}

#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub name: String,
    pub file_name: String,
    pub chunk_type: ChunkType,
    /// Modules in execution order
    pub modules: Vec<ModuleId>,
    /// Module whose exports this chunk exposes
    pub entry: Option<ModuleId>,
}

#[derive(Debug, Default)]
pub struct ChunkPlan {
    pub chunks: Vec<ChunkInfo>,
    module_chunk: HashMap<ModuleId, usize>,
}

impl ChunkPlan {
    pub fn chunk_of(&self, id: &ModuleId) -> Option<usize> {
        self.module_chunk.get(id).copied()
    }
}

/// File name for `[name]` templates
pub fn file_name(template: &str, name: &str) -> String {
    template.replace("[name]", name)
}

/// Every file name fixed by configuration (entries and manual chunks) must be
/// unique; checked before any build work
pub fn check_naming(
    input: &BTreeMap<String, String>,
    manual_chunks: &BTreeMap<String, Vec<String>>,
    output: &OutputOptions,
) -> Result<()> {
    let mut claimed: BTreeMap<String, String> = BTreeMap::new();
    let fixed = input
        .keys()
        .map(|name| (file_name(&output.entry_file_names, name), format!("entry '{}'", name)))
        .chain(
            manual_chunks
                .keys()
                .map(|name| (file_name(&output.chunk_file_names, name), format!("manual chunk '{}'", name))),
        );

    for (file, owner) in fixed {
        if let Some(first) = claimed.get(&file) {
            return Err(BuildError::ChunkNamingConflict {
                file_name: file,
                first: first.clone(),
                second: owner,
            });
        }
        claimed.insert(file, owner);
    }
    Ok(())
}

/// Groups the included modules of a graph into output chunks
pub struct CodeSplitter<'a> {
    graph: &'a ModuleGraph,
    shaken: &'a ShakeResult,
    project_root: &'a Path,
}

impl<'a> CodeSplitter<'a> {
    pub fn new(graph: &'a ModuleGraph, shaken: &'a ShakeResult, project_root: &'a Path) -> Self {
        Self {
            graph,
            shaken,
            project_root,
        }
    }

    pub fn split(&self, manual_chunks: &BTreeMap<String, Vec<String>>, output: &OutputOptions) -> Result<ChunkPlan> {
        let order = self.shaken.included_modules(self.graph);
        let position: HashMap<&ModuleId, usize> = order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut plan = ChunkPlan::default();
        let mut used_files: HashSet<String> = HashSet::new();

        // Entry chunks first so that they get the lowest indices
        let entries = self.graph.entries();
        let mut entry_chunk = Vec::with_capacity(entries.len());
        for entry in entries {
            let file = file_name(&output.entry_file_names, &entry.name);
            used_files.insert(file.clone());
            plan.chunks.push(ChunkInfo {
                name: entry.name.clone(),
                file_name: file,
                chunk_type: ChunkType::Entry,
                modules: Vec::new(),
                entry: Some(entry.module.clone()),
            });
            entry_chunk.push(plan.chunks.len() - 1);
        }

        for (name, listed) in manual_chunks {
            let index = plan.chunks.len();
            let file = file_name(&output.chunk_file_names, name);
            used_files.insert(file.clone());
            plan.chunks.push(ChunkInfo {
                name: name.clone(),
                file_name: file,
                chunk_type: ChunkType::Manual,
                modules: Vec::new(),
                entry: None,
            });
            for path in listed {
                match self.find_module(path) {
                    Some(id) => self.claim_with_dependencies(&id, index, &mut plan),
                    None => Logger::warn(&format!("manual chunk '{}': {} is not part of the bundle", name, path)),
                }
            }
        }

        for (index, entry) in entries.iter().enumerate() {
            if plan.chunk_of(&entry.module).is_none() && self.shaken.is_included(&entry.module) {
                plan.module_chunk.insert(entry.module.clone(), entry_chunk[index]);
            }
        }

        let reach = self.entry_reachability();
        let mut shared: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
        for id in &order {
            if plan.chunk_of(id).is_some() {
                continue;
            }
            let dependents = reach.get(id).cloned().unwrap_or_default();
            let target = match dependents.as_slice() {
                [single] => entry_chunk[*single],
                _ => match shared.get(&dependents) {
                    Some(&chunk) => chunk,
                    None => {
                        let stem = id.stem();
                        let file = unique_file(&output.chunk_file_names, &stem, &mut used_files);
                        plan.chunks.push(ChunkInfo {
                            name: stem,
                            file_name: file,
                            chunk_type: ChunkType::Shared,
                            modules: Vec::new(),
                            entry: None,
                        });
                        shared.insert(dependents.clone(), plan.chunks.len() - 1);
                        plan.chunks.len() - 1
                    }
                },
            };
            plan.module_chunk.insert(id.clone(), target);
        }

        for (id, chunk) in &plan.module_chunk {
            plan.chunks[*chunk].modules.push(id.clone());
        }
        for chunk in plan.chunks.iter_mut() {
            chunk.modules.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        }

        // An entry whose module lives elsewhere is rendered as a facade
        for (index, entry) in entries.iter().enumerate() {
            let chunk = &mut plan.chunks[entry_chunk[index]];
            if !chunk.modules.contains(&entry.module) {
                chunk.chunk_type = ChunkType::Facade;
            }
        }

        Ok(plan)
    }

    fn find_module(&self, listed: &str) -> Option<ModuleId> {
        let wanted = normalize(&self.project_root.join(listed));
        let wanted_stemless = wanted.with_extension("");
        self.graph
            .modules()
            .map(|n| &n.id)
            .find(|id| id.path().is_some_and(|p| p == wanted || p.with_extension("") == wanted_stemless))
            .cloned()
    }

    fn claim_with_dependencies(&self, root: &ModuleId, chunk: usize, plan: &mut ChunkPlan) {
        let mut stack = vec![root.clone()];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) || plan.chunk_of(&id).is_some() {
                continue;
            }
            if self.shaken.is_included(&id) {
                plan.module_chunk.insert(id.clone(), chunk);
            }
            for dep in self.graph.dependencies(&id) {
                stack.push(dep.clone());
            }
        }
    }

    /// Module → sorted indices of the entries that (transitively) import it
    fn entry_reachability(&self) -> HashMap<ModuleId, Vec<usize>> {
        let mut reach: HashMap<ModuleId, Vec<usize>> = HashMap::new();
        for (index, entry) in self.graph.entries().iter().enumerate() {
            let mut stack = vec![entry.module.clone()];
            let mut seen = HashSet::new();
            while let Some(id) = stack.pop() {
                if !seen.insert(id.clone()) {
                    continue;
                }
                reach.entry(id.clone()).or_default().push(index);
                for dep in self.graph.dependencies(&id) {
                    stack.push(dep.clone());
                }
            }
        }
        reach
    }
}

fn unique_file(template: &str, stem: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = file_name(template, stem);
    let mut counter = 2;
    while used.contains(&candidate) {
        candidate = file_name(template, &format!("{}{}", stem, counter));
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}
