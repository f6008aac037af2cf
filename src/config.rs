//! Configuration loading.
//!
//! Loads taskhive configuration from `./taskhive.toml` (or
//! `$TASKHIVE_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TASKHIVE_CONFIG_PATH";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "taskhive.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskhiveConfig {
    /// Kernel core settings (`[kernel]`).
    pub kernel: KernelConfig,
    /// Admission rules (`[safety]`).
    pub safety: SafetyConfig,
    /// Storage backend selection (`[storage]`).
    pub storage: StorageConfig,
    /// Event bus delivery settings (`[events]`).
    pub events: EventsConfig,
    /// Audit log settings (`[audit]`).
    pub audit: AuditConfig,
}

impl TaskhiveConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (avoids `set_var` in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong field types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: TaskhiveConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides (env > config > defaults).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Kernel.
        if let Some(v) = env("TASKHIVE_LOG_LEVEL") {
            self.kernel.log_level = v;
        }
        override_parsed(
            &env,
            "TASKHIVE_MONITOR_INTERVAL_MS",
            &mut self.kernel.monitor_interval_ms,
        );
        if let Some(v) = env("TASKHIVE_WORKER_LIVENESS_SECS") {
            match v.parse::<u64>() {
                Ok(0) => self.kernel.worker_liveness_secs = None,
                Ok(n) => self.kernel.worker_liveness_secs = Some(n),
                Err(_) => warn_invalid("TASKHIVE_WORKER_LIVENESS_SECS", &v),
            }
        }

        // Safety.
        override_parsed(&env, "TASKHIVE_MAX_TOKENS", &mut self.safety.max_tokens);
        override_parsed(
            &env,
            "TASKHIVE_MAX_TIMEOUT_SECS",
            &mut self.safety.max_timeout_seconds,
        );
        override_parsed(
            &env,
            "TASKHIVE_REJECT_UNKNOWN_SAFETY_LEVELS",
            &mut self.safety.reject_unknown_safety_levels,
        );

        // Storage.
        override_parsed(&env, "TASKHIVE_STORAGE_BACKEND", &mut self.storage.backend);
        if let Some(v) = env("TASKHIVE_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }

        // Events.
        override_parsed(
            &env,
            "TASKHIVE_HANDLER_TIMEOUT_MS",
            &mut self.events.handler_timeout_ms,
        );
    }
}

/// Replace `field` with the parsed env value, warning on parse failure.
fn override_parsed<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(v) = env(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => warn_invalid(key, &v),
        }
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(var = key, value = %value, "ignoring invalid env override");
}

// ── Kernel config ───────────────────────────────────────────────

/// Kernel core settings (`[kernel]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Tracing log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Poll interval of the timeout monitor in milliseconds.
    pub monitor_interval_ms: u64,
    /// Workers silent for longer than this are demoted to offline. `None` disables demotion.
    pub worker_liveness_secs: Option<u64>,
}

impl KernelConfig {
    /// Monitor poll interval as a [`Duration`], never zero.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    /// Liveness window as a [`Duration`], if enabled.
    pub fn worker_liveness(&self) -> Option<Duration> {
        self.worker_liveness_secs.map(Duration::from_secs)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            monitor_interval_ms: 1_000,
            worker_liveness_secs: None,
        }
    }
}

// ── Safety config ───────────────────────────────────────────────

/// Admission rule settings (`[safety]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Case-insensitive regular expressions rejected in task descriptions.
    pub prohibited_patterns: Vec<String>,
    /// Largest `max_tokens` constraint a task may declare.
    pub max_tokens: u64,
    /// Largest timeout a task may request, in seconds.
    pub max_timeout_seconds: u64,
    /// Reject tasks declaring a safety level the kernel does not recognise.
    pub reject_unknown_safety_levels: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            prohibited_patterns: default_prohibited_patterns(),
            max_tokens: 100_000,
            max_timeout_seconds: 3_600,
            reject_unknown_safety_levels: false,
        }
    }
}

/// Destructive-operation patterns rejected when no list is configured.
pub fn default_prohibited_patterns() -> Vec<String> {
    [
        r"rm\s+-rf\s+[/~]",
        r"\bdrop\s+(table|database)\b",
        r"\bmkfs(\.\w+)?\b",
        r"\bdd\s+if=",
        r":\(\)\s*\{",
        r"\bformat\s+c:",
        r"chmod\s+-R\s+777\s+/",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

// ── Storage config ──────────────────────────────────────────────

/// Which key/value backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// SQLite file at [`StorageConfig::sqlite_path`].
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Storage settings (`[storage]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// Database file for the SQLite backend.
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: "./data/taskhive.db".to_owned(),
        }
    }
}

// ── Events config ───────────────────────────────────────────────

/// Event bus settings (`[events]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Upper bound on a single handler invocation in milliseconds.
    pub handler_timeout_ms: u64,
}

impl EventsConfig {
    /// Handler timeout as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 5_000,
        }
    }
}

// ── Audit config ────────────────────────────────────────────────

/// Audit log settings (`[audit]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Store scope holding audit entries.
    pub scope: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            scope: "audit".to_owned(),
        }
    }
}

/// Resolve the default config directory (`~/.taskhive/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".taskhive"))
}
