//! Scope-hoisted rendering of chunks.
//!
//! Linking happens once for the whole plan: every included top-level binding
//! gets a chunk-unique name, cross-chunk references become imports and
//! exports, externals are collected per chunk. Rendering then runs per chunk
//! in parallel over the immutable link tables.

use super::code_splitter::{ChunkPlan, ChunkType};
use super::tree_shaker::ShakeResult;
use crate::analysis::{identifier_from, is_reserved, Renamer, Statement, StatementKind, DEFAULT_LOCAL, NAMESPACE};
use crate::core::graph::{Binding, ModuleGraph, MODULE_EXPORTS};
use crate::core::models::{ModuleId, OutputFormat, ResolvedId};
use crate::infrastructure::file_system::PendingFile;
use crate::utils::{BuildError, Result};
use rayon::prelude::*;
use sourcemap::SourceMapBuilder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path};

/// Names never handed out to bundled bindings
const GLOBALS: &[&str] = &[
    "undefined", "NaN", "Infinity", "globalThis", "Object", "Array", "Function", "String", "Number",
    "Boolean", "Symbol", "BigInt", "Math", "JSON", "Date", "RegExp", "Error", "TypeError", "RangeError",
    "SyntaxError", "Promise", "Map", "Set", "WeakMap", "WeakSet", "Proxy", "Reflect", "console",
    "arguments", "eval", "process", "Buffer", "window", "document", "self",
];

const CJS_GLOBALS: &[&str] = &["require", "module", "exports", "__filename", "__dirname"];

#[derive(Debug, Clone)]
pub struct RenderOptions<'a> {
    pub format: OutputFormat,
    pub sourcemap: bool,
    /// Absolute output directory, for source paths in maps
    pub output_dir: &'a Path,
    /// Keep bare imports of externals nothing binds to
    pub external_side_effects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    pub line: u32,
    pub source: u32,
    pub src_line: u32,
    pub src_col: u32,
}

#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub file_name: String,
    pub code: String,
    pub exports: Vec<String>,
    /// Chunk files and externals this chunk imports, in import order
    pub imports: Vec<String>,
    pub is_empty: bool,
    mappings: Vec<LineMapping>,
    sources: Vec<(String, String)>,
}

impl RenderedChunk {
    pub fn source_map(&self, line_offset: u32) -> Result<String> {
        let file = Path::new(&self.file_name)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone());
        let mut builder = SourceMapBuilder::new(Some(file.as_str()));
        for (path, content) in &self.sources {
            let id = builder.add_source(path);
            builder.set_source_contents(id, Some(content.as_str()));
        }
        for m in &self.mappings {
            builder.add_raw(m.line + line_offset, 0, m.src_line, m.src_col, Some(m.source), None, false);
        }

        let mut buf = Vec::new();
        builder
            .into_sourcemap()
            .to_writer(&mut buf)
            .map_err(|e| BuildError::Other(format!("Could not write source map for {}: {}", self.file_name, e)))?;
        String::from_utf8(buf).map_err(|e| BuildError::Other(e.to_string()))
    }

    /// Final files of this chunk: `code` (after chunk stages) with the banner
    /// on top and, when enabled, a `.map` sibling
    pub fn into_files(self, code: String, banner: Option<&str>, dir: &Path, sourcemap: bool) -> Result<Vec<PendingFile>> {
        let mut contents = String::with_capacity(code.len() + 128);
        let mut offset = 0;
        if let Some(banner) = banner.filter(|b| !b.is_empty()) {
            contents.push_str(banner.trim_end_matches('\n'));
            contents.push('\n');
            offset = banner.trim_end_matches('\n').lines().count() as u32;
        }
        contents.push_str(&code);
        if !contents.ends_with('\n') {
            contents.push('\n');
        }

        let path = dir.join(&self.file_name);
        let mut files = Vec::with_capacity(2);
        if sourcemap {
            let map = self.source_map(offset)?;
            let base = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            contents.push_str(&format!("//# sourceMappingURL={}.map\n", base));
            files.push(PendingFile {
                path: dir.join(format!("{}.map", self.file_name)),
                contents: map,
            });
        }
        files.insert(0, PendingFile { path, contents });
        Ok(files)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Symbol {
    Local(ModuleId, String),
    Namespace(ModuleId),
}

impl Symbol {
    fn module(&self) -> &ModuleId {
        match self {
            Symbol::Local(id, _) | Symbol::Namespace(id) => id,
        }
    }
}

/// What a reference renders to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Symbol(Symbol, Option<String>),
    External { specifier: String, imported: String },
    Global(String),
    Missing,
}

#[derive(Debug, Default)]
struct ExternalImport {
    specifier: String,
    wants_namespace: bool,
    /// ES namespace import or CJS `require` variable
    namespace: Option<String>,
    /// Imported name → local (ES)
    named: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct ChunkLink {
    names: HashMap<Symbol, String>,
    used: HashSet<String>,
    public: Vec<(String, Target)>,
    /// ES locals holding public exports that are member expressions
    public_aliases: BTreeMap<String, String>,
    /// Symbols other chunks import from this one → export name
    exported: BTreeMap<Symbol, String>,
    /// Dependency chunk → imported symbol → local name
    imports: BTreeMap<usize, BTreeMap<Symbol, String>>,
    require_vars: BTreeMap<usize, String>,
    externals: Vec<ExternalImport>,
    external_stars: Vec<String>,
}

impl ChunkLink {
    fn external(&mut self, specifier: &str) -> &mut ExternalImport {
        let index = match self.externals.iter().position(|e| e.specifier == specifier) {
            Some(index) => index,
            None => {
                self.externals.push(ExternalImport {
                    specifier: specifier.to_string(),
                    ..ExternalImport::default()
                });
                self.externals.len() - 1
            }
        };
        &mut self.externals[index]
    }
}

pub struct ChunkRenderer<'a> {
    graph: &'a ModuleGraph,
    shaken: &'a ShakeResult,
    plan: &'a ChunkPlan,
    options: RenderOptions<'a>,
    links: Vec<ChunkLink>,
}

impl<'a> ChunkRenderer<'a> {
    pub fn new(graph: &'a ModuleGraph, shaken: &'a ShakeResult, plan: &'a ChunkPlan, options: RenderOptions<'a>) -> Self {
        let mut renderer = Self {
            graph,
            shaken,
            plan,
            options,
            links: Vec::new(),
        };
        renderer.links = renderer.link();
        renderer
    }

    pub fn render_all(&self) -> Vec<RenderedChunk> {
        (0..self.plan.chunks.len())
            .into_par_iter()
            .map(|index| self.render_chunk(index))
            .collect()
    }

    fn included_statements(&self, id: &ModuleId) -> Vec<&'a Statement> {
        let (Some(node), Some(kept)) = (self.graph.get(id), self.shaken.statements(id)) else {
            return Vec::new();
        };
        kept.iter().map(|&i| &node.analysis.statements[i]).collect()
    }

    fn target_of(&self, binding: Binding) -> Target {
        match binding {
            Binding::Local { module, name } => {
                let declared = self
                    .graph
                    .get(&module)
                    .is_some_and(|n| n.analysis.declarations.contains_key(&name));
                if declared {
                    Target::Symbol(Symbol::Local(module, name), None)
                } else {
                    Target::Global(name)
                }
            }
            Binding::Namespace(module) => Target::Symbol(Symbol::Namespace(module), None),
            Binding::Synthetic { module, property } => {
                Target::Symbol(Symbol::Local(module, MODULE_EXPORTS.to_string()), Some(property))
            }
            Binding::External { specifier, imported } => Target::External { specifier, imported },
            Binding::Missing => Target::Missing,
        }
    }

    /// Included modules `id` imports, looking through dropped modules
    fn effective_dependencies(&self, id: &ModuleId) -> Vec<ModuleId> {
        let mut out = Vec::new();
        let mut stack: Vec<ModuleId> = self.graph.dependencies(id).into_iter().cloned().collect();
        let mut seen = HashSet::new();
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            if self.shaken.is_included(&dep) {
                out.push(dep);
            } else {
                stack.extend(self.graph.dependencies(&dep).into_iter().cloned());
            }
        }
        out
    }

    fn link(&self) -> Vec<ChunkLink> {
        let chunks = &self.plan.chunks;
        let mut links: Vec<ChunkLink> = chunks.iter().map(|_| ChunkLink::default()).collect();

        // Declared names, after every global the chunk reads
        for (c, chunk) in chunks.iter().enumerate() {
            let link = &mut links[c];
            link.used.extend(GLOBALS.iter().map(|g| g.to_string()));
            if self.options.format == OutputFormat::Cjs {
                link.used.extend(CJS_GLOBALS.iter().map(|g| g.to_string()));
            }
            for id in &chunk.modules {
                for statement in self.included_statements(id) {
                    for name in &statement.references {
                        if let Target::Global(global) = self.target_of(self.graph.trace_local(id, name)) {
                            link.used.insert(global);
                        }
                    }
                }
            }
            for id in &chunk.modules {
                let stem = id.stem();
                for statement in self.included_statements(id) {
                    for name in &statement.declares {
                        let symbol = Symbol::Local(id.clone(), name.clone());
                        if link.names.contains_key(&symbol) {
                            continue;
                        }
                        let base = if name == DEFAULT_LOCAL { stem.as_str() } else { name.as_str() };
                        let local = claim(&mut link.used, base);
                        link.names.insert(symbol, local);
                    }
                }
                if self.shaken.namespaces.contains(id) {
                    let local = claim(&mut link.used, &stem);
                    link.names.insert(Symbol::Namespace(id.clone()), local);
                }
            }
        }

        // What each chunk needs from elsewhere
        for (c, chunk) in chunks.iter().enumerate() {
            let mut targets = Vec::new();
            for id in &chunk.modules {
                for statement in self.included_statements(id) {
                    for name in &statement.references {
                        targets.push(self.target_of(self.graph.trace_local(id, name)));
                    }
                }
                if self.shaken.namespaces.contains(id) {
                    for name in self.graph.export_names(id) {
                        targets.push(self.target_of(self.graph.resolve_export(id, &name)));
                    }
                }
                for dep in self.effective_dependencies(id) {
                    match self.plan.chunk_of(&dep) {
                        Some(d) if d != c => {
                            links[c].imports.entry(d).or_default();
                        }
                        _ => {}
                    }
                }
                if self.options.external_side_effects {
                    if let Some(node) = self.graph.get(id) {
                        for resolved in &node.resolved {
                            if let ResolvedId::External { specifier } = resolved {
                                links[c].external(specifier);
                            }
                        }
                    }
                }
            }
            if let Some(entry) = &chunk.entry {
                for name in self.graph.export_names(entry) {
                    let target = self.target_of(self.graph.resolve_export(entry, &name));
                    if target != Target::Missing {
                        targets.push(target.clone());
                        links[c].public.push((name, target));
                    }
                }
                for specifier in self.graph.external_stars(entry) {
                    links[c].external(&specifier).wants_namespace = true;
                    links[c].external_stars.push(specifier);
                }
            }
            for target in targets {
                self.require(&mut links, c, target);
            }
        }

        // Export names for cross-chunk symbols
        for link in links.iter_mut() {
            let mut taken: HashSet<String> = link.public.iter().map(|(name, _)| name.clone()).collect();
            let symbols: Vec<Symbol> = link.exported.keys().cloned().collect();
            for symbol in symbols {
                let public = link
                    .public
                    .iter()
                    .find(|(name, t)| is_identifier(name) && matches!(t, Target::Symbol(s, None) if *s == symbol))
                    .map(|(name, _)| name.clone());
                let name = match public {
                    Some(name) => name,
                    None => {
                        let base = link
                            .names
                            .get(&symbol)
                            .cloned()
                            .unwrap_or_else(|| symbol.module().stem());
                        claim(&mut taken, &base)
                    }
                };
                link.exported.insert(symbol, name);
            }
        }

        // Import locals
        for c in 0..links.len() {
            let mut imports = std::mem::take(&mut links[c].imports);
            for (d, symbols) in imports.iter_mut() {
                for (symbol, local) in symbols.iter_mut() {
                    let base = links[*d]
                        .names
                        .get(symbol)
                        .cloned()
                        .unwrap_or_else(|| symbol.module().stem());
                    *local = claim(&mut links[c].used, &base);
                }
                if self.options.format == OutputFormat::Cjs && !symbols.is_empty() {
                    let base = identifier_from(file_stem(&chunks[*d].file_name));
                    let var = claim(&mut links[c].used, &base);
                    links[c].require_vars.insert(*d, var);
                }
            }
            links[c].imports = imports;

            let link = &mut links[c];
            let mut externals = std::mem::take(&mut link.externals);
            for ext in externals.iter_mut() {
                let stem = identifier_from(specifier_stem(&ext.specifier));
                match self.options.format {
                    OutputFormat::Es => {
                        if ext.wants_namespace {
                            ext.namespace = Some(claim(&mut link.used, &stem));
                        }
                        for (imported, local) in ext.named.iter_mut() {
                            let base = if imported != "default" && is_identifier(imported) {
                                imported.as_str()
                            } else {
                                stem.as_str()
                            };
                            *local = claim(&mut link.used, base);
                        }
                    }
                    OutputFormat::Cjs => {
                        if ext.wants_namespace || !ext.named.is_empty() {
                            ext.namespace = Some(claim(&mut link.used, &stem));
                        }
                    }
                }
            }
            link.externals = externals;

            if self.options.format == OutputFormat::Es {
                for (name, target) in &link.public {
                    if matches!(target, Target::Symbol(_, Some(_))) {
                        let alias = claim(&mut link.used, &identifier_from(name));
                        link.public_aliases.insert(name.clone(), alias);
                    }
                }
            }
        }

        links
    }

    fn require(&self, links: &mut [ChunkLink], c: usize, target: Target) {
        match target {
            Target::Symbol(symbol, _) => {
                let Some(owner) = self.plan.chunk_of(symbol.module()) else {
                    return;
                };
                if owner != c {
                    links[owner].exported.entry(symbol.clone()).or_default();
                    links[c].imports.entry(owner).or_default().entry(symbol).or_default();
                }
            }
            Target::External { specifier, imported } => {
                let ext = links[c].external(&specifier);
                if imported == NAMESPACE {
                    ext.wants_namespace = true;
                } else {
                    ext.named.entry(imported).or_default();
                }
            }
            Target::Global(_) | Target::Missing => {}
        }
    }

    /// Rendered expression for `target` inside chunk `c`
    fn expression(&self, c: usize, target: &Target) -> Option<String> {
        let link = &self.links[c];
        match target {
            Target::Symbol(symbol, member) => {
                let owner = self.plan.chunk_of(symbol.module())?;
                let base = if owner == c {
                    link.names.get(symbol)?.clone()
                } else {
                    match self.options.format {
                        OutputFormat::Es => link.imports.get(&owner)?.get(symbol)?.clone(),
                        OutputFormat::Cjs => format!(
                            "{}{}",
                            link.require_vars.get(&owner)?,
                            member_access(self.links[owner].exported.get(symbol)?)
                        ),
                    }
                };
                Some(match member {
                    Some(property) => format!("{}{}", base, member_access(property)),
                    None => base,
                })
            }
            Target::External { specifier, imported } => {
                let ext = link.externals.iter().find(|e| &e.specifier == specifier)?;
                match self.options.format {
                    OutputFormat::Es if imported == NAMESPACE => ext.namespace.clone(),
                    OutputFormat::Es => ext.named.get(imported).cloned(),
                    OutputFormat::Cjs => {
                        let ns = ext.namespace.clone()?;
                        Some(if imported == NAMESPACE || imported == "default" {
                            ns
                        } else {
                            format!("{}{}", ns, member_access(imported))
                        })
                    }
                }
            }
            Target::Global(name) => Some(name.clone()),
            Target::Missing => Some("undefined".to_string()),
        }
    }

    /// Source word → rendered text, for every top-level name of a module
    fn renames(&self, c: usize, id: &ModuleId) -> HashMap<String, String> {
        let mut renames = HashMap::new();
        let Some(node) = self.graph.get(id) else {
            return renames;
        };
        let words = node
            .analysis
            .declarations
            .keys()
            .chain(node.analysis.import_locals.keys())
            .filter(|w| w.as_str() != DEFAULT_LOCAL);
        for word in words {
            let target = self.target_of(self.graph.trace_local(id, word));
            if let Some(text) = self.expression(c, &target) {
                if &text != word {
                    renames.insert(word.clone(), text);
                }
            }
        }
        renames
    }

    fn render_chunk(&self, c: usize) -> RenderedChunk {
        let chunk = &self.plan.chunks[c];
        let link = &self.links[c];
        let mut buf = CodeBuffer::default();

        if self.options.format == OutputFormat::Cjs {
            buf.push_block("'use strict';");
            if !link.public.is_empty() || !link.exported.is_empty() {
                buf.push_block("Object.defineProperty(exports, '__esModule', { value: true });");
            }
        }

        let (import_block, imports) = self.render_imports(c);
        if !import_block.is_empty() {
            buf.push_block(&import_block);
        }

        let mut has_code = false;
        for id in &chunk.modules {
            has_code |= self.render_module(c, id, &mut buf);
        }

        let (export_block, exports) = self.render_exports(c);
        if !export_block.is_empty() {
            buf.push_block(&export_block);
        }

        let is_empty = !has_code && exports.is_empty() && chunk.chunk_type != ChunkType::Facade;
        RenderedChunk {
            file_name: chunk.file_name.clone(),
            code: buf.finish(),
            exports,
            imports,
            is_empty,
            mappings: buf.mappings,
            sources: buf.sources,
        }
    }

    fn render_imports(&self, c: usize) -> (String, Vec<String>) {
        let chunk = &self.plan.chunks[c];
        let link = &self.links[c];
        let mut lines = Vec::new();
        let mut imports = Vec::new();

        for ext in &link.externals {
            imports.push(ext.specifier.clone());
            let from = quote(&ext.specifier);
            match self.options.format {
                OutputFormat::Es => {
                    if let Some(ns) = &ext.namespace {
                        lines.push(format!("import * as {} from {};", ns, from));
                    }
                    let default = ext.named.get("default");
                    let named: Vec<String> = ext
                        .named
                        .iter()
                        .filter(|(imported, _)| imported.as_str() != "default")
                        .map(|(imported, local)| specifier_pair(imported, local))
                        .collect();
                    match (default, named.is_empty()) {
                        (Some(d), true) => lines.push(format!("import {} from {};", d, from)),
                        (Some(d), false) => lines.push(format!("import {}, {{ {} }} from {};", d, named.join(", "), from)),
                        (None, false) => lines.push(format!("import {{ {} }} from {};", named.join(", "), from)),
                        (None, true) if ext.namespace.is_none() => lines.push(format!("import {};", from)),
                        (None, true) => {}
                    }
                }
                OutputFormat::Cjs => match &ext.namespace {
                    Some(ns) => lines.push(format!("var {} = require({});", ns, from)),
                    None => lines.push(format!("require({});", from)),
                },
            }
        }

        for (d, symbols) in &link.imports {
            let path = relative_import(&chunk.file_name, &self.plan.chunks[*d].file_name);
            imports.push(path.clone());
            let from = quote(&path);
            match self.options.format {
                OutputFormat::Es if symbols.is_empty() => lines.push(format!("import {};", from)),
                OutputFormat::Es => {
                    let specifiers: Vec<String> = symbols
                        .iter()
                        .filter_map(|(symbol, local)| {
                            let exported = self.links[*d].exported.get(symbol)?;
                            Some(specifier_pair(exported, local))
                        })
                        .collect();
                    lines.push(format!("import {{ {} }} from {};", specifiers.join(", "), from));
                }
                OutputFormat::Cjs => match link.require_vars.get(d) {
                    Some(var) => lines.push(format!("var {} = require({});", var, from)),
                    None => lines.push(format!("require({});", from)),
                },
            }
        }

        (lines.join("\n"), imports)
    }

    /// Writes the included statements of a module; false when nothing survived
    fn render_module(&self, c: usize, id: &ModuleId, buf: &mut CodeBuffer) -> bool {
        let Some(node) = self.graph.get(id) else {
            return false;
        };
        let link = &self.links[c];
        let renames = self.renames(c, id);
        let renamer = Renamer::new(&node.analysis, &node.code, &renames).rewrite_top_level_this(true);
        let lines = LineIndex::new(&node.code);
        let mut source = None;
        let mut wrote = false;

        for statement in self.included_statements(id) {
            if statement.body.is_empty() {
                continue;
            }
            let mut text = String::new();
            let default_name = || link.names.get(&Symbol::Local(id.clone(), DEFAULT_LOCAL.to_string()));
            match statement.kind {
                StatementKind::DefaultExpression => {
                    let name = default_name().cloned().unwrap_or_else(|| id.stem());
                    text.push_str(&format!("var {} = ", name));
                    renamer.render(statement.body.clone(), &mut text);
                    text.push(';');
                }
                _ if statement.anonymous_default => {
                    let name = default_name().cloned().unwrap_or_else(|| id.stem());
                    let insert = statement.name_slot.map(|slot| (slot, name.as_str()));
                    renamer.render_with_insert(statement.body.clone(), insert, &mut text);
                }
                StatementKind::Function | StatementKind::Class => renamer.render(statement.body.clone(), &mut text),
                _ => {
                    renamer.render(statement.body.clone(), &mut text);
                    if !text.ends_with(';') {
                        text.push(';');
                    }
                }
            }

            if !wrote {
                buf.start_block();
                wrote = true;
            } else {
                buf.push_str("\n");
            }
            if self.options.sourcemap {
                let index = *source.get_or_insert_with(|| buf.add_source(self.source_path(id), &node.code));
                let (src_line, src_col) = lines.locate(statement.body.start);
                buf.push_mapped(&text, index, src_line, src_col);
            } else {
                buf.push_str(&text);
            }
        }

        if let Some(ns) = link.names.get(&Symbol::Namespace(id.clone())) {
            let mut getters = vec!["\t__proto__: null".to_string()];
            for name in self.graph.export_names(id) {
                let target = self.target_of(self.graph.resolve_export(id, &name));
                if target == Target::Missing {
                    continue;
                }
                if let Some(expr) = self.expression(c, &target) {
                    getters.push(format!("\tget {} () {{ return {}; }}", property_key(&name), expr));
                }
            }
            let text = format!("var {} = /*#__PURE__*/Object.freeze({{\n{}\n}});", ns, getters.join(",\n"));
            if wrote {
                buf.push_str("\n\n");
            } else {
                buf.start_block();
            }
            buf.push_str(&text);
            wrote = true;
        }

        wrote
    }

    fn render_exports(&self, c: usize) -> (String, Vec<String>) {
        let link = &self.links[c];
        let mut lines = Vec::new();
        let mut names = Vec::new();

        let reused = |symbol: &Symbol, exported: &str| {
            link.public
                .iter()
                .any(|(name, t)| name == exported && matches!(t, Target::Symbol(s, None) if s == symbol))
        };

        match self.options.format {
            OutputFormat::Es => {
                let mut specifiers = Vec::new();
                for (name, target) in &link.public {
                    let local = match link.public_aliases.get(name) {
                        Some(alias) => {
                            if let Some(expr) = self.expression(c, target) {
                                lines.push(format!("var {} = {};", alias, expr));
                            }
                            alias.clone()
                        }
                        None => match self.expression(c, target) {
                            Some(expr) => expr,
                            None => continue,
                        },
                    };
                    specifiers.push(specifier_pair(&local, name));
                    names.push(name.clone());
                }
                for (symbol, exported) in &link.exported {
                    if reused(symbol, exported) {
                        continue;
                    }
                    if let Some(local) = link.names.get(symbol) {
                        specifiers.push(specifier_pair(local, exported));
                        names.push(exported.clone());
                    }
                }
                if !specifiers.is_empty() {
                    lines.push(format!("export {{ {} }};", specifiers.join(", ")));
                }
                for specifier in &link.external_stars {
                    lines.push(format!("export * from {};", quote(specifier)));
                }
            }
            OutputFormat::Cjs => {
                for (name, target) in &link.public {
                    let Some(expr) = self.expression(c, target) else {
                        continue;
                    };
                    let live = match target {
                        Target::Symbol(symbol, _) => self.plan.chunk_of(symbol.module()) != Some(c),
                        Target::External { .. } => true,
                        _ => false,
                    };
                    if live {
                        lines.push(format!(
                            "Object.defineProperty(exports, {}, {{\n\tenumerable: true,\n\tget: function () {{ return {}; }}\n}});",
                            quote(name),
                            expr
                        ));
                    } else {
                        lines.push(format!("exports{} = {};", member_access(name), expr));
                    }
                    names.push(name.clone());
                }
                for (symbol, exported) in &link.exported {
                    if reused(symbol, exported) {
                        continue;
                    }
                    if let Some(local) = link.names.get(symbol) {
                        lines.push(format!("exports{} = {};", member_access(exported), local));
                        names.push(exported.clone());
                    }
                }
                for specifier in &link.external_stars {
                    let Some(ns) = link
                        .externals
                        .iter()
                        .find(|e| &e.specifier == specifier)
                        .and_then(|e| e.namespace.as_ref())
                    else {
                        continue;
                    };
                    lines.push(format!(
                        "Object.keys({ns}).forEach(function (k) {{\n\tif (k !== 'default' && !Object.prototype.hasOwnProperty.call(exports, k)) Object.defineProperty(exports, k, {{\n\t\tenumerable: true,\n\t\tget: function () {{ return {ns}[k]; }}\n\t}});\n}});"
                    ));
                }
            }
        }

        (lines.join("\n"), names)
    }

    fn source_path(&self, id: &ModuleId) -> String {
        match id.path() {
            Some(path) => relative_path(self.options.output_dir, path),
            None => id.to_string(),
        }
    }
}

/// Output text with per-line source mappings
#[derive(Default)]
struct CodeBuffer {
    code: String,
    line: u32,
    mappings: Vec<LineMapping>,
    sources: Vec<(String, String)>,
}

impl CodeBuffer {
    /// Separates what follows from earlier output by a blank line
    fn start_block(&mut self) {
        if !self.code.is_empty() {
            self.push_str("\n\n");
        }
    }

    fn push_block(&mut self, text: &str) {
        self.start_block();
        self.push_str(text);
    }

    fn push_str(&mut self, text: &str) {
        self.line += text.matches('\n').count() as u32;
        self.code.push_str(text);
    }

    fn push_mapped(&mut self, text: &str, source: u32, src_line: u32, src_col: u32) {
        for (k, _) in text.split('\n').enumerate() {
            let k = k as u32;
            self.mappings.push(LineMapping {
                line: self.line + k,
                source,
                src_line: src_line + k,
                src_col: if k == 0 { src_col } else { 0 },
            });
        }
        self.push_str(text);
    }

    fn add_source(&mut self, path: String, content: &str) -> u32 {
        self.sources.push((path, content.to_string()));
        (self.sources.len() - 1) as u32
    }

    fn finish(&mut self) -> String {
        let mut code = std::mem::take(&mut self.code);
        code.push('\n');
        code
    }
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(src: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// Zero-based (line, column) of a byte offset
    fn locate(&self, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        (line as u32, (offset - self.starts[line]) as u32)
    }
}

/// `base`, or `base$1`, `base$2`… whichever is free
fn claim(used: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut counter = 1;
    while used.contains(&candidate) || is_reserved(&candidate) {
        candidate = format!("{}${}", base, counter);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn member_access(property: &str) -> String {
    if is_identifier(property) {
        format!(".{}", property)
    } else {
        format!("[{}]", quote(property))
    }
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

/// `imported as local` in an import or export clause
fn specifier_pair(from: &str, to: &str) -> String {
    let to = if is_identifier(to) { to.to_string() } else { quote(to) };
    if from == to {
        to
    } else {
        format!("{} as {}", from, to)
    }
}

fn file_stem(file_name: &str) -> &str {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.split('.').next().unwrap_or(base)
}

fn specifier_stem(specifier: &str) -> &str {
    specifier
        .rsplit(|c: char| c == '/' || c == ':')
        .find(|s| !s.is_empty())
        .unwrap_or(specifier)
}

fn relative_path(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(to[common..].iter().map(|c| c.as_os_str().to_string_lossy().into_owned()));
    parts.join("/")
}

/// Import path from one chunk file to another (both relative to the output dir)
fn relative_import(from_file: &str, to_file: &str) -> String {
    let from_dir = Path::new(from_file).parent().unwrap_or(Path::new(""));
    let path = relative_path(from_dir, Path::new(to_file));
    if path.starts_with("../") {
        path
    } else {
        format!("./{}", path)
    }
}
