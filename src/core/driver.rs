//! Runs every target of a build through its state machine.
//!
//! `Configured → Resolving → Transforming → Treeshaking → Chunking →
//! Emitting → Succeeded | Failed`, strictly in order per target. Targets
//! share nothing but the output directory locks.

use crate::core::descriptor::TargetDescriptor;
use crate::core::diagnostics::{Diagnostic, Diagnostics, EMPTY_BUNDLE};
use crate::core::graph::{GraphBuilder, ModuleGraph};
use crate::core::interfaces::FileSystemService;
use crate::core::models::{BuildConfig, FailureMode, OutputOptions, Schedule, TargetState};
use crate::core::plugin::{Pipeline, StageContext};
use crate::infrastructure::file_system::{OutputLocks, PendingFile, StagedWriter};
use crate::infrastructure::license::LicenseAggregator;
use crate::infrastructure::processors::code_splitter::{ChunkPlan, CodeSplitter};
use crate::infrastructure::processors::renderer::{ChunkRenderer, RenderOptions};
use crate::infrastructure::processors::tree_shaker::{ShakeResult, TreeShaker};
use crate::plugins::{BannerPlugin, ModulePackagePlugin};
use crate::utils::{BuildError, Logger, Result};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one target
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub name: String,
    /// `Configured` when the target never started
    pub state: TargetState,
    pub files: Vec<PathBuf>,
    pub license_file: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl TargetReport {
    fn not_started(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: TargetState::Configured,
            files: Vec::new(),
            license_file: None,
            diagnostics: Vec::new(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == TargetState::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.targets.iter().all(TargetReport::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.state == TargetState::Failed)
    }

    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Process exit status: 0 only when every target succeeded
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Validates a configuration and builds all of its targets
pub struct BuildDriver {
    fs: Arc<dyn FileSystemService>,
    locks: Arc<OutputLocks>,
    schedule: Schedule,
    failure_mode: FailureMode,
}

impl BuildDriver {
    pub fn new(fs: Arc<dyn FileSystemService>) -> Self {
        Self {
            fs,
            locks: Arc::new(OutputLocks::new()),
            schedule: Schedule::default(),
            failure_mode: FailureMode::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule, failure_mode: FailureMode) -> Self {
        self.schedule = schedule;
        self.failure_mode = failure_mode;
        self
    }

    /// Every target is validated before the first one starts; an invalid
    /// configuration is the only error returned here. Target failures are
    /// reported in the `RunReport`.
    pub async fn run(&self, config: &BuildConfig) -> Result<RunReport> {
        let descriptors = TargetDescriptor::all(config)?;
        Ok(self.run_descriptors(descriptors).await)
    }

    pub async fn run_descriptors(&self, descriptors: Vec<TargetDescriptor>) -> RunReport {
        let started = Instant::now();
        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        Logger::run_start(&names, self.schedule == Schedule::Concurrent);

        let targets = match self.schedule {
            Schedule::Concurrent => self.run_concurrent(descriptors).await,
            Schedule::Sequential => self.run_sequential(descriptors).await,
        };

        let report = RunReport {
            targets,
            elapsed: started.elapsed(),
        };
        let succeeded = report.targets.iter().filter(|t| t.succeeded()).count();
        Logger::run_complete(succeeded, report.targets.len() - succeeded, report.elapsed);
        report
    }

    async fn run_concurrent(&self, descriptors: Vec<TargetDescriptor>) -> Vec<TargetReport> {
        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let handles = descriptors.into_iter().map(|descriptor| {
            let build = TargetBuild::new(descriptor, self.fs.clone(), self.locks.clone());
            tokio::spawn(build.run())
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| match joined {
                Ok(report) => report,
                Err(e) => {
                    let error = BuildError::from(e).in_target(&name, "running");
                    Logger::target_failed(&name, &error.to_string());
                    TargetReport {
                        state: TargetState::Failed,
                        error: Some(error.to_string()),
                        ..TargetReport::not_started(&name)
                    }
                }
            })
            .collect()
    }

    async fn run_sequential(&self, descriptors: Vec<TargetDescriptor>) -> Vec<TargetReport> {
        let mut reports = Vec::with_capacity(descriptors.len());
        let mut halted = false;
        for descriptor in descriptors {
            if halted {
                Logger::info(&format!("[{}] not started after an earlier failure", descriptor.name));
                reports.push(TargetReport::not_started(&descriptor.name));
                continue;
            }
            let report = TargetBuild::new(descriptor, self.fs.clone(), self.locks.clone())
                .run()
                .await;
            halted = !report.succeeded() && self.failure_mode == FailureMode::FailFast;
            reports.push(report);
        }
        reports
    }
}

/// One target's pass through the state machine
struct TargetBuild {
    descriptor: TargetDescriptor,
    fs: Arc<dyn FileSystemService>,
    locks: Arc<OutputLocks>,
    state: TargetState,
    diagnostics: Diagnostics,
}

impl TargetBuild {
    fn new(descriptor: TargetDescriptor, fs: Arc<dyn FileSystemService>, locks: Arc<OutputLocks>) -> Self {
        let diagnostics = Diagnostics::new(&descriptor.name, descriptor.warning_policy);
        Self {
            descriptor,
            fs,
            locks,
            state: TargetState::Configured,
            diagnostics,
        }
    }

    async fn run(mut self) -> TargetReport {
        let started = Instant::now();
        let name = self.descriptor.name.clone();
        let outcome = self.build().await;

        let mut report = TargetReport {
            diagnostics: self.diagnostics.collected(),
            elapsed: started.elapsed(),
            ..TargetReport::not_started(&name)
        };
        match outcome {
            Ok((files, license_file)) => {
                self.advance();
                Logger::target_complete(&name, files.len(), report.elapsed);
                report.files = files;
                report.license_file = license_file;
            }
            Err(e) => {
                let error = e.in_target(&name, self.state);
                Logger::target_failed(&name, &error.to_string());
                self.state = TargetState::Failed;
                report.error = Some(error.format_detailed());
            }
        }
        report.state = self.state;
        report
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            self.state = next;
            Logger::state(&self.descriptor.name, &next.to_string());
        }
    }

    async fn build(&mut self) -> Result<(Vec<PathBuf>, Option<PathBuf>)> {
        let descriptor = self.descriptor.clone();
        let fs = self.fs.clone();
        let pipeline = descriptor.pipeline()?;
        let resolver = descriptor.resolver();
        let side_effects = descriptor.treeshake.side_effect_rules()?;

        self.advance();
        for entry in descriptor.input.values() {
            resolver.resolve_entry(entry).await?;
        }

        self.advance();
        let graph = {
            let context = self.context();
            let builder = GraphBuilder {
                resolver: &resolver,
                pipeline: &pipeline,
                fs: fs.as_ref(),
                context: &context,
                side_effects: &side_effects,
            };
            builder.build(&descriptor.input).await?
        };
        graph.link(&self.diagnostics)?;

        self.advance();
        let shaken = TreeShaker::new(&graph, descriptor.treeshake.effect_options()).shake();
        Logger::tree_shaking_stats(&descriptor.name, &shaken.stats.to_string());

        self.advance();
        let mut plans = Vec::with_capacity(descriptor.outputs.len());
        for output in &descriptor.outputs {
            let plan = CodeSplitter::new(&graph, &shaken, &descriptor.project_root)
                .split(&descriptor.manual_chunks, output)?;
            if output.file.is_some() && plan.chunks.len() != 1 {
                return Err(BuildError::config(format!(
                    "`file` output needs exactly one chunk, the build produced {}",
                    plan.chunks.len()
                )));
            }
            plans.push(plan);
        }
        let mut licenses = LicenseAggregator::new(fs.as_ref(), &descriptor.name, &descriptor.project_root);
        licenses.collect(&graph, &shaken, &self.diagnostics).await;

        self.advance();
        let project = resolver
            .node()
            .read_package_json(&descriptor.project_root.join("package.json"))
            .await;
        let mut files = Vec::new();
        for (output, plan) in descriptor.outputs.iter().zip(&plans) {
            let banner = output
                .banner
                .as_ref()
                .map(|template| BannerPlugin::new(template.as_str()).render(project.as_deref()));
            files.extend(self.render_output(&graph, &shaken, plan, output, banner.as_deref(), &pipeline)?);
        }

        let written: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let license_file = {
            let _guard = self.locks.acquire(&descriptor.output_dirs()).await;
            StagedWriter::new(fs.as_ref(), &descriptor.name)
                .commit(&files, descriptor.clean_dir.as_deref())
                .await?;
            match licenses.write(&descriptor.license_dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    Logger::warn(&format!("[{}] license report not written: {}", descriptor.name, e));
                    None
                }
            }
        };
        for file in &files {
            Logger::chunk_written(&descriptor.name, &file.path.display().to_string(), file.contents.len());
        }
        Ok((written, license_file))
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            target: &self.descriptor.name,
            project_root: &self.descriptor.project_root,
            platform: self.descriptor.platform,
            diagnostics: &self.diagnostics,
        }
    }

    /// Every file of one output, fully rendered in memory
    fn render_output(
        &self,
        graph: &ModuleGraph,
        shaken: &ShakeResult,
        plan: &ChunkPlan,
        output: &OutputOptions,
        banner: Option<&str>,
        pipeline: &Pipeline,
    ) -> Result<Vec<PendingFile>> {
        let dir = output
            .dir
            .clone()
            .ok_or_else(|| BuildError::config("output has no directory"))?;
        let renderer = ChunkRenderer::new(
            graph,
            shaken,
            plan,
            RenderOptions {
                format: output.format,
                sourcemap: output.sourcemap,
                output_dir: &dir,
                external_side_effects: true,
            },
        );

        let context = self.context();
        let mut files = Vec::new();
        for chunk in renderer.render_all() {
            if chunk.is_empty {
                self.diagnostics.raise(
                    EMPTY_BUNDLE,
                    format!("Generated an empty chunk: \"{}\"", chunk.file_name),
                    None,
                )?;
            }
            let code = pipeline.run_chunk(chunk.code.clone(), &chunk.file_name, &context)?;
            files.extend(chunk.into_files(code, banner, &dir, output.sourcemap)?);
        }
        if let Some(relative) = &output.module_package_file {
            files.push(ModulePackagePlugin::new(output.format).file(&dir, relative));
        }
        Ok(files)
    }
}
