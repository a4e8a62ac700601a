use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber; `RUST_LOG` wins over the given default filter
    pub fn init(default_filter: &str) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // A second init (tests, embedding) keeps the first subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn run_start(targets: &[String], concurrent: bool) {
        info!("🔨 tandem - multi-target build");
        info!("═══════════════════════════════════════");
        info!("🎯 Targets: {}", targets.join(", "));
        info!(
            "🧵 Schedule: {}",
            if concurrent { "concurrent" } else { "sequential" }
        );
    }

    pub fn state(target: &str, state: &str) {
        info!("[{}] ▶ {}", target, state);
    }

    pub fn loading_module(target: &str, id: &str) {
        debug!("[{}] 📄 Loading: {}", target, id);
    }

    pub fn stage(target: &str, stage: &str, id: &str) {
        debug!("[{}] ⚡ {} → {}", target, stage, id);
    }

    pub fn resolved(specifier: &str, resolved: &str) {
        debug!("🔗 {} → {}", specifier, resolved);
    }

    pub fn tree_shaking_stats(target: &str, stats: &str) {
        info!("[{}] 🌳 {}", target, stats);
    }

    pub fn chunk_written(target: &str, file: &str, bytes: usize) {
        info!("[{}] 📦 {} ({} bytes)", target, file, bytes);
    }

    pub fn target_complete(target: &str, files: usize, elapsed: Duration) {
        info!(
            "[{}] ✅ Succeeded: {} files written in {:.2?}",
            target, files, elapsed
        );
    }

    pub fn target_failed(target: &str, message: &str) {
        error!("[{}] ❌ Failed: {}", target, message);
    }

    pub fn run_complete(succeeded: usize, failed: usize, elapsed: Duration) {
        info!("");
        info!("📊 Run Statistics:");
        info!("  • Targets succeeded: {}", succeeded);
        info!("  • Targets failed: {}", failed);
        info!("  • Total time: {:.2?}", elapsed);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
