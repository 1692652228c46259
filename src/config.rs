//! Executor configuration.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (`--db`, which also reads EXECLOOP_LEDGER)
//! 2. Environment variables (EXECLOOP_HOME)
//! 3. Config file (.execloop/config.yaml)
//! 4. Defaults (~/.execloop/executor.db)
//!
//! Config file discovery:
//! - Searches current directory and parents for .execloop/config.yaml
//! - `paths.home` is relative to the .execloop directory
//! - `paths.ledger` is relative to the project root (the parent of .execloop)
//!
//! The resolved [`ExecutorConfig`] is an explicit value handed to the
//! orchestrator; nothing here is cached globally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

/// Default bound on stdout/stderr previews in step error messages
pub const DEFAULT_PREVIEW_CHARS: usize = 2000;

/// Default bound on stdout/stderr previews in rollback events
pub const DEFAULT_ROLLBACK_PREVIEW_CHARS: usize = 1000;

const DEFAULT_RUN_NAME_PREFIX: &str = "run";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub executor: Option<ExecutorSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .execloop/)
    pub home: Option<String>,
    /// Ledger file (relative to the project root)
    pub ledger: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    pub preview_chars: Option<usize>,
    pub rollback_preview_chars: Option<usize>,
    pub run_name_prefix: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// SQLite ledger file
    pub ledger_path: PathBuf,
    /// Max chars of stdout/stderr embedded in step error messages
    pub preview_chars: usize,
    /// Max chars of stdout/stderr stored in rollback events
    pub rollback_preview_chars: usize,
    /// Prefix of generated run names
    pub run_name_prefix: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ExecutorConfig {
    /// Defaults with an explicit ledger path
    pub fn with_ledger(ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            preview_chars: DEFAULT_PREVIEW_CHARS,
            rollback_preview_chars: DEFAULT_ROLLBACK_PREVIEW_CHARS,
            run_name_prefix: DEFAULT_RUN_NAME_PREFIX.to_string(),
            config_file: None,
        }
    }

    /// Load configuration from the environment, config file and defaults
    pub fn load() -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".execloop");

        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let found = match find_config_file(&cwd) {
            Some(path) => {
                let file = load_config_file(&path)?;
                Some((path, file))
            }
            None => None,
        };

        let env_home = std::env::var("EXECLOOP_HOME").ok();
        Ok(resolve(found, env_home, default_home))
    }

    /// Replace the ledger path (CLI override)
    pub fn override_ledger(mut self, ledger_path: Option<PathBuf>) -> Self {
        if let Some(path) = ledger_path {
            self.ledger_path = path;
        }
        self
    }

    /// Generated run name: `<prefix>_YYYYmmdd_HHMMSS` (UTC)
    pub fn default_run_name(&self) -> String {
        format!(
            "{}_{}",
            self.run_name_prefix,
            Utc::now().format("%Y%m%d_%H%M%S")
        )
    }
}

/// Combine the sources into a resolved config
fn resolve(
    found: Option<(PathBuf, ConfigFile)>,
    env_home: Option<String>,
    default_home: PathBuf,
) -> ExecutorConfig {
    let Some((config_path, file)) = found else {
        let home = env_home.map(PathBuf::from).unwrap_or(default_home);
        return ExecutorConfig::with_ledger(home.join("executor.db"));
    };

    // .execloop/ and the project root above it
    let dot_dir = config_path.parent().unwrap_or(Path::new("."));
    let base_dir = dot_dir.parent().unwrap_or(Path::new("."));

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(ref home) = file.paths.home {
        resolve_path(dot_dir, home)
    } else {
        default_home
    };

    let ledger_path = match file.paths.ledger {
        Some(ref ledger) => resolve_path(base_dir, ledger),
        None => home.join("executor.db"),
    };

    let section = file.executor.as_ref();
    ExecutorConfig {
        ledger_path,
        preview_chars: section
            .and_then(|s| s.preview_chars)
            .unwrap_or(DEFAULT_PREVIEW_CHARS),
        rollback_preview_chars: section
            .and_then(|s| s.rollback_preview_chars)
            .unwrap_or(DEFAULT_ROLLBACK_PREVIEW_CHARS),
        run_name_prefix: section
            .and_then(|s| s.run_name_prefix.clone())
            .unwrap_or_else(|| DEFAULT_RUN_NAME_PREFIX.to_string()),
        config_file: Some(config_path),
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".execloop").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
