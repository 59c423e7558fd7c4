// Worker configuration: pool size, execution budgets and toolchain locations
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/judge.json";

/// Executables used to build and run submissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchains {
    pub gcc: String,
    pub gxx: String,
    pub javac: String,
    pub java: String,
    pub python: String,
    pub rustc: String,
}

impl Default for Toolchains {
    fn default() -> Self {
        Self {
            gcc: "gcc".to_string(),
            gxx: "g++".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            python: "python3".to_string(),
            rustc: "rustc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of submissions judged at the same time
    pub concurrency: usize,
    /// Wall-clock ceiling for one test-case run
    pub run_timeout_ms: u64,
    /// Wall-clock ceiling for the compile step
    pub compile_timeout_ms: u64,
    /// How long one queue receive blocks before re-checking for shutdown
    pub queue_poll_seconds: f64,
    /// Parent of the per-execution working directories
    pub workspace_root: PathBuf,
    pub toolchains: Toolchains,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_timeout_ms: 5_000,
            compile_timeout_ms: 10_000,
            queue_poll_seconds: 5.0,
            workspace_root: std::env::temp_dir().join("oj-judge"),
            toolchains: Toolchains::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Worker config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: WorkerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `JUDGE_CONFIG` (or config/judge.json), then apply env overrides.
    /// A missing default file is not an error; built-in defaults are used.
    pub fn load_default() -> Result<Self> {
        let explicit = std::env::var("JUDGE_CONFIG").ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() || explicit.is_some() {
            Self::load(&path)?
        } else {
            info!(path = %path.display(), "No worker config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides(
            std::env::var("WORKER_CONCURRENCY").ok(),
            std::env::var("JUDGE_WORKSPACE_ROOT").ok(),
        )?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(
        &mut self,
        concurrency: Option<String>,
        workspace_root: Option<String>,
    ) -> Result<()> {
        if let Some(value) = concurrency {
            self.concurrency = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid WORKER_CONCURRENCY: {}", value))?;
        }
        if let Some(root) = workspace_root.filter(|r| !r.trim().is_empty()) {
            self.workspace_root = PathBuf::from(root);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.run_timeout_ms == 0 || self.compile_timeout_ms == 0 {
            bail!("run_timeout_ms and compile_timeout_ms must be positive");
        }
        if self.queue_poll_seconds.is_nan() || self.queue_poll_seconds <= 0.0 {
            bail!("queue_poll_seconds must be positive");
        }
        Ok(())
    }
}
