//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `FD_*`
//! environment variables, and merging configurations with proper precedence
//! rules. Applying the merged values to a [`DispatchConfig`] happens in the
//! CLI, which owns the final precedence order.
//!
//! [`DispatchConfig`]: crate::DispatchConfig

use crate::error::DispatchError;
use crate::generate::ID_PLACEHOLDER;
use crate::types::MAX_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Default values for dispatch options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Output formatting preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Where resources come from when none are given explicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConfig>,
}

/// Default values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Default worker count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-request timeout (as string, e.g. "5s", "500ms", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Overall dispatch deadline, same format as `timeout`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    /// Print results as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,

    /// Coloured output with header and spinner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<bool>,
}

/// Resource source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SourceConfig {
    /// URL template containing `{id}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Configuration discovery and loading functionality.
///
/// Search locations, lowest precedence first:
/// 1. `$XDG_CONFIG_HOME/fetch-dispatch/config.toml` (or `~/.config/...`)
/// 2. `~/.fetch-dispatch.toml` or `~/fetch-dispatch.toml`
/// 3. `./fetch-dispatch.toml` or `./.fetch-dispatch.toml`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    local_dir: PathBuf,
    home_dir: Option<PathBuf>,
    xdg_config_dir: Option<PathBuf>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a manager searching the current directory, `$HOME` and the
    /// XDG config directory.
    pub fn new() -> Self {
        let home_dir = env::var_os("HOME").map(PathBuf::from);
        let xdg_config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir.as_ref().map(|home| home.join(".config")));

        Self {
            local_dir: PathBuf::from("."),
            home_dir,
            xdg_config_dir,
        }
    }

    /// Create a manager with explicit search roots.
    pub fn with_search_roots(
        local_dir: PathBuf,
        home_dir: Option<PathBuf>,
        xdg_config_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            local_dir,
            home_dir,
            xdg_config_dir,
        }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, DispatchError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DispatchError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            DispatchError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        self.validate_config(&config)?;

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Files that fail to load are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, DispatchError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping config file"),
            }
        }

        if loaded_files.len() > 1 {
            let files: Vec<String> = loaded_files.iter().map(|p| p.display().to_string()).collect();
            debug!(files = ?files, "Merged multiple config files, last wins");
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["fetch-dispatch.toml", ".fetch-dispatch.toml"]
            .iter()
            .map(|name| self.local_dir.join(name))
            .find(|path| path.exists())
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = self.home_dir.as_ref()?;
        [".fetch-dispatch.toml", "fetch-dispatch.toml"]
            .iter()
            .map(|name| home.join(name))
            .find(|path| path.exists())
    }

    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let path = self
            .xdg_config_dir
            .as_ref()?
            .join("fetch-dispatch")
            .join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations; values from `higher` win.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower_defaults), Some(higher_defaults)) => Some(DefaultsConfig {
                    concurrency: higher_defaults.concurrency.or(lower_defaults.concurrency),
                    timeout: higher_defaults.timeout.or(lower_defaults.timeout),
                    deadline: higher_defaults.deadline.or(lower_defaults.deadline),
                    user_agent: higher_defaults.user_agent.or(lower_defaults.user_agent),
                }),
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            output: match (lower.output, higher.output) {
                (Some(lower_output), Some(higher_output)) => Some(OutputConfig {
                    json: higher_output.json.or(lower_output.json),
                    pretty: higher_output.pretty.or(lower_output.pretty),
                }),
                (lower_output, higher_output) => higher_output.or(lower_output),
            },
            source: match (lower.source, higher.source) {
                (Some(lower_source), Some(higher_source)) => Some(SourceConfig {
                    template: higher_source.template.or(lower_source.template),
                }),
                (lower_source, higher_source) => higher_source.or(lower_source),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), DispatchError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                validate_concurrency(concurrency)?;
            }

            for (name, value) in [("timeout", &defaults.timeout), ("deadline", &defaults.deadline)] {
                if let Some(value) = value {
                    if parse_duration_string(value).is_none() {
                        return Err(DispatchError::config(format!(
                            "Invalid {} format '{}'. Use format like '500ms', '5s', '2m'",
                            name, value
                        )));
                    }
                }
            }

            if defaults.user_agent.as_deref().is_some_and(|ua| ua.trim().is_empty()) {
                return Err(DispatchError::config("user_agent cannot be empty"));
            }
        }

        if let Some(template) = config.source.as_ref().and_then(|s| s.template.as_ref()) {
            validate_template(template)?;
        }

        Ok(())
    }
}

/// Check a worker count against the accepted range.
pub fn validate_concurrency(concurrency: usize) -> Result<(), DispatchError> {
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(DispatchError::config(format!(
            "Concurrency must be between 1 and {}",
            MAX_CONCURRENCY
        )));
    }
    Ok(())
}

fn validate_template(template: &str) -> Result<(), DispatchError> {
    if !template.contains(ID_PLACEHOLDER) {
        return Err(DispatchError::config(format!(
            "Template '{}' must contain {}",
            template, ID_PLACEHOLDER
        )));
    }
    Ok(())
}

/// Environment variable configuration that mirrors CLI options.
///
/// Values come from `FD_*` variables; invalid values are dropped with a
/// warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub deadline: Option<Duration>,
    pub json: Option<bool>,
    pub pretty: Option<bool>,
    pub file: Option<String>,
    pub config: Option<String>,
    pub template: Option<String>,
    pub user_agent: Option<String>,
}

/// Load configuration from the process environment.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    if let Some(val) = lookup("FD_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if validate_concurrency(concurrency).is_ok() => {
                debug!(concurrency, "Using FD_CONCURRENCY");
                env_config.concurrency = Some(concurrency);
            }
            _ => warn!(value = %val, "Invalid FD_CONCURRENCY, must be 1-{}", MAX_CONCURRENCY),
        }
    }

    env_config.timeout = lookup_duration(&lookup, "FD_TIMEOUT");
    env_config.deadline = lookup_duration(&lookup, "FD_DEADLINE");
    env_config.json = lookup_bool(&lookup, "FD_JSON");
    env_config.pretty = lookup_bool(&lookup, "FD_PRETTY");
    env_config.file = lookup_string(&lookup, "FD_FILE");
    env_config.config = lookup_string(&lookup, "FD_CONFIG");
    env_config.user_agent = lookup_string(&lookup, "FD_USER_AGENT");

    if let Some(template) = lookup_string(&lookup, "FD_TEMPLATE") {
        if validate_template(&template).is_ok() {
            env_config.template = Some(template);
        } else {
            warn!(value = %template, "Invalid FD_TEMPLATE, must contain {}", ID_PLACEHOLDER);
        }
    }

    env_config
}

fn lookup_string<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    let value = lookup(key)?;
    if value.trim().is_empty() {
        return None;
    }
    debug!(key, value = %value, "Using environment variable");
    Some(value)
}

fn lookup_bool<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<bool> {
    let value = lookup(key)?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %value, "Invalid boolean, use true/false");
            None
        }
    }
}

fn lookup_duration<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<Duration> {
    let value = lookup(key)?;
    let parsed = parse_duration_string(&value);
    if parsed.is_none() {
        warn!(key, value = %value, "Invalid duration, use format like '500ms', '5s', '2m'");
    }
    parsed
}

/// Parse a duration like "500ms", "5s", "2m", or bare seconds ("30").
///
/// Zero durations are rejected.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    let duration = if let Some(ms) = value.strip_suffix("ms") {
        Duration::from_millis(ms.trim().parse().ok()?)
    } else if let Some(secs) = value.strip_suffix('s') {
        Duration::from_secs(secs.trim().parse().ok()?)
    } else if let Some(mins) = value.strip_suffix('m') {
        Duration::from_secs(mins.trim().parse::<u64>().ok()?.checked_mul(60)?)
    } else {
        Duration::from_secs(value.parse().ok()?)
    };

    (!duration.is_zero()).then_some(duration)
}
