//! Configuration management for rotalog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rotate::RotationPolicy;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ROTALOG_CONFIG";

/// Environment keys that override config file values
pub mod env_keys {
    pub const APP_NAME: &str = "APP_NAME";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const LOG_CONSOLE: &str = "LOG_CONSOLE";
    pub const LOG_FILE_ENABLE: &str = "LOG_FILE_ENABLE";
    pub const LOG_FILE_PATH: &str = "LOG_FILE_PATH";
    pub const LOG_FILE_SIZE: &str = "LOG_FILE_SIZE";
    pub const LOG_FILE_ROTATE: &str = "LOG_FILE_ROTATE";
    pub const LOG_FILE_EXPIRED: &str = "LOG_FILE_EXPIRED";
    pub const LOG_FILE_COUNT: &str = "LOG_FILE_COUNT";
    pub const LOG_FILE_COMPRESS: &str = "LOG_FILE_COMPRESS";
    pub const LOG_REPORT_PATH: &str = "LOG_REPORT_PATH";
}

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full, free space needed to keep logging",
            DiskErrorKind::PermissionDenied => "permission denied on the log directory",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "I/O error",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28; EDQUOT = 122 on Linux, 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &std::io::Error, context: &str) -> String {
    match categorize_io_error(e) {
        DiskErrorKind::Other => format!("{}: {}", context, e),
        kind => format!("{}: {}", context, kind.user_message()),
    }
}

/// Rotating file settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    /// Write records to a rotating log file
    #[serde(default = "default_file_enable")]
    pub enable: bool,

    /// Live log file path; defaults to `<app_name>.log`
    #[serde(default)]
    pub path: Option<String>,

    /// Size limit in MB (<= 0 uses 100 MB)
    #[serde(default = "default_size_mb")]
    pub size_mb: i64,

    /// Rotation period in hours (0 disables time-based rotation)
    #[serde(default = "default_rotate_hours")]
    pub rotate_hours: u64,

    /// Days to keep rotated files (0 = forever)
    #[serde(default)]
    pub expired_days: u64,

    /// Number of rotated files to keep (0 = unlimited)
    #[serde(default)]
    pub count: usize,

    /// Gzip rotated files
    #[serde(default)]
    pub compress: bool,
}

fn default_file_enable() -> bool {
    true
}

fn default_size_mb() -> i64 {
    500
}

fn default_rotate_hours() -> u64 {
    1
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enable: default_file_enable(),
            path: None,
            size_mb: default_size_mb(),
            rotate_hours: default_rotate_hours(),
            expired_days: 0,
            count: 0,
            compress: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Name tagged onto reports and used for the default log file name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Minimum level: DEBUG, INFO, WARN, ERROR, FATAL or PANIC
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also print records to stdout
    #[serde(default = "default_console")]
    pub console: bool,

    /// Rotating file settings
    #[serde(default)]
    pub file: FileConfig,

    /// JSON-lines file receiving a copy of every ERROR record
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_app_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("rotalog")
        .to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_console() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            log_level: default_log_level(),
            console: default_console(),
            file: FileConfig::default(),
            report_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from `path`, or return default if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Override values from environment-style keys
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        use env_keys::*;

        if let Some(v) = lookup(APP_NAME) {
            self.app_name = v;
        }
        if let Some(v) = lookup(LOG_LEVEL) {
            self.log_level = v;
        }
        if let Some(v) = lookup(LOG_CONSOLE) {
            self.console = parse_bool(LOG_CONSOLE, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_ENABLE) {
            self.file.enable = parse_bool(LOG_FILE_ENABLE, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_PATH) {
            self.file.path = Some(v);
        }
        if let Some(v) = lookup(LOG_FILE_SIZE) {
            self.file.size_mb = parse_number(LOG_FILE_SIZE, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_ROTATE) {
            self.file.rotate_hours = parse_number(LOG_FILE_ROTATE, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_EXPIRED) {
            self.file.expired_days = parse_number(LOG_FILE_EXPIRED, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_COUNT) {
            self.file.count = parse_number(LOG_FILE_COUNT, &v)?;
        }
        if let Some(v) = lookup(LOG_FILE_COMPRESS) {
            self.file.compress = parse_bool(LOG_FILE_COMPRESS, &v)?;
        }
        if let Some(v) = lookup(LOG_REPORT_PATH) {
            self.report_path = (!v.is_empty()).then(|| expand_path(&v));
        }
        Ok(())
    }

    /// Path of the live log file, with `~` expanded
    pub fn log_file_path(&self) -> PathBuf {
        match &self.file.path {
            Some(path) if !path.is_empty() => expand_path(path),
            _ => PathBuf::from(format!("{}.log", self.app_name)),
        }
    }

    /// Rotation policy for the configured log file
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::from_limits(
            self.log_file_path(),
            self.file.size_mb,
            self.file.rotate_hours,
            self.file.expired_days,
            self.file.count,
            self.file.compress,
        )
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid boolean for {}: '{}'", key, other),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid number for {}: '{}'", key, value))
}

/// Get the base configuration directory (~/.rotalog)
/// Falls back to ./.rotalog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| PathBuf::from(".rotalog"))
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".rotalog"))
}

/// Get the path to the config file, honoring `ROTALOG_CONFIG`
pub fn config_file_path() -> PathBuf {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => expand_path(&path),
        _ => config_dir().join("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotate::MEGABYTE;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "INFO");
        assert!(config.console);
        assert!(config.file.enable);
        assert_eq!(config.file.size_mb, 500);
        assert_eq!(config.file.rotate_hours, 1);
        assert!(config.report_path.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.file.count = 7;
        config.file.compress = true;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            app_name = "billing"

            [file]
            path = "/var/log/billing/billing.log"
            count = 14
            "#,
        )
        .unwrap();

        assert_eq!(parsed.app_name, "billing");
        assert_eq!(parsed.file.count, 14);
        assert_eq!(parsed.file.size_mb, 500);
        assert_eq!(parsed.file.rotate_hours, 1);
        assert_eq!(parsed.log_level, "INFO");
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "file = 12").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[
                ("APP_NAME", "api"),
                ("LOG_LEVEL", "debug"),
                ("LOG_FILE_SIZE", "20"),
                ("LOG_FILE_ROTATE", "24"),
                ("LOG_FILE_EXPIRED", "7"),
                ("LOG_FILE_COUNT", "10"),
                ("LOG_FILE_COMPRESS", "true"),
                ("LOG_CONSOLE", "0"),
                ("LOG_REPORT_PATH", "/tmp/reports.jsonl"),
            ]))
            .unwrap();

        assert_eq!(config.app_name, "api");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.file.size_mb, 20);
        assert_eq!(config.file.rotate_hours, 24);
        assert_eq!(config.file.expired_days, 7);
        assert_eq!(config.file.count, 10);
        assert!(config.file.compress);
        assert!(!config.console);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/reports.jsonl")));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        assert!(config
            .apply_env_overrides(lookup(&[("LOG_FILE_SIZE", "big")]))
            .is_err());
        assert!(config
            .apply_env_overrides(lookup(&[("LOG_FILE_COMPRESS", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_default_log_path_uses_app_name() {
        let mut config = Config::default();
        config.app_name = "worker".to_string();
        assert_eq!(config.log_file_path(), PathBuf::from("worker.log"));
    }

    #[test]
    fn test_log_path_expands_home() {
        let mut config = Config::default();
        config.file.path = Some("~/logs/app.log".to_string());
        let path = config.log_file_path();
        assert!(path.ends_with("logs/app.log"));
        if dirs::home_dir().is_some() {
            assert!(!path.starts_with("~"));
        }
    }

    #[test]
    fn test_rotation_policy_conversion() {
        let mut config = Config::default();
        config.file.path = Some("/var/log/app.log".to_string());
        config.file.size_mb = 0;
        config.file.rotate_hours = 0;
        config.file.expired_days = 3;

        let policy = config.rotation_policy();
        assert_eq!(policy.path, PathBuf::from("/var/log/app.log"));
        assert_eq!(policy.max_size, 100 * MEGABYTE);
        assert!(policy.period.is_none());
        assert_eq!(policy.max_age, Some(Duration::from_secs(3 * 86_400)));
        assert!(policy.max_count.is_none());
    }

    #[test]
    fn test_friendly_io_error_message() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            friendly_io_error_message(&denied, "Failed to write log file"),
            "Failed to write log file: permission denied on the log directory"
        );
        assert_eq!(
            categorize_io_error(&std::io::Error::from_raw_os_error(28)),
            if cfg!(unix) {
                DiskErrorKind::DiskFull
            } else {
                DiskErrorKind::Other
            }
        );
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with(".rotalog"));
    }
}
