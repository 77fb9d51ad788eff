//! Configuration file management for certcheck.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Default values
//! 2. Configuration file (`certcheck.toml` or the one given with `--config`)
//! 3. Command-line arguments
//!
//! # Example Configuration File
//!
//! ```toml
//! hostname = "example.com"
//! port = 443
//! method = "get"
//! agent = false
//! timeout = 10
//! output = "certificateCheck.json"
//! warn_days = 30
//! exit_code = 2
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::dates::DEFAULT_DATE_FORMAT;
use crate::{CheckOptions, HttpMethod, DEFAULT_OUTPUT, DEFAULT_PORT};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "certcheck.toml";

/// Days below which a low-time-remaining warning is printed.
pub const DEFAULT_WARN_DAYS: i64 = 30;

/// Main configuration structure.
///
/// All fields are optional to support partial configuration and merging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Host to check, or an `https://` URL
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub method: Option<HttpMethod>,
    /// Keep-alive connection instead of a one-off one
    pub agent: Option<bool>,
    /// Connect/read/write timeout in seconds
    pub timeout: Option<u64>,
    /// Path of the JSON result file
    pub output: Option<String>,
    /// Warn when fewer days than this remain
    pub warn_days: Option<i64>,
    /// Exit code to use when the certificate is not valid
    pub exit_code: Option<i32>,
    /// `strftime` pattern for displayed timestamps
    pub date_format: Option<String>,
    /// PEM file with extra trust anchors
    pub ca_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hostname: None,
            port: None,
            method: Some(HttpMethod::Get),
            agent: Some(false),
            timeout: None,
            output: Some(DEFAULT_OUTPUT.to_string()),
            warn_days: Some(DEFAULT_WARN_DAYS),
            exit_code: Some(0),
            date_format: Some(DEFAULT_DATE_FORMAT.to_string()),
            ca_file: None,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// ```no_run
    /// # use certcheck::config::Config;
    /// let config = Config::from_file("certcheck.toml")?;
    /// # Ok::<(), certcheck::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Loads `path` if given, else `certcheck.toml` when it exists, else an
    /// empty configuration.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Config::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                log::debug!("loading {}", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Config::empty()),
        }
    }

    /// A configuration with every field unset.
    pub fn empty() -> Self {
        Config {
            hostname: None,
            port: None,
            method: None,
            agent: None,
            timeout: None,
            output: None,
            warn_days: None,
            exit_code: None,
            date_format: None,
            ca_file: None,
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    pub fn merge_with(self, other: Config) -> Self {
        Config {
            hostname: other.hostname.or(self.hostname),
            port: other.port.or(self.port),
            method: other.method.or(self.method),
            agent: other.agent.or(self.agent),
            timeout: other.timeout.or(self.timeout),
            output: other.output.or(self.output),
            warn_days: other.warn_days.or(self.warn_days),
            exit_code: other.exit_code.or(self.exit_code),
            date_format: other.date_format.or(self.date_format),
            ca_file: other.ca_file.or(self.ca_file),
        }
    }

    /// Validates the merged configuration and builds the check options.
    ///
    /// A hostname given as a URL contributes its host and, when no port is
    /// configured, its port.
    pub fn to_options(&self) -> Result<CheckOptions, ConfigError> {
        let raw = self
            .hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::Validation("hostname is required".to_string()))?;
        let (hostname, url_port) = split_target(raw)?;

        let port = self.port.or(url_port).unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }

        let timeout = match self.timeout {
            Some(0) => {
                return Err(ConfigError::Validation(
                    "timeout must be at least one second".to_string(),
                ))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let mut options = CheckOptions::new(hostname)
            .port(port)
            .method(self.method.unwrap_or_default())
            .agent(self.agent.unwrap_or(false))
            .timeout(timeout)
            .ca_file(self.ca_file.as_ref().map(PathBuf::from));
        if let Some(pattern) = &self.date_format {
            options = options.date_format(pattern.clone());
        }
        Ok(options)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(self.output.as_deref().unwrap_or(DEFAULT_OUTPUT))
    }

    pub fn warn_days(&self) -> i64 {
        self.warn_days.unwrap_or(DEFAULT_WARN_DAYS)
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            hostname: Some("example.com".to_string()),
            port: Some(443),
            method: Some(HttpMethod::Head),
            agent: Some(false),
            timeout: Some(10),
            output: Some(DEFAULT_OUTPUT.to_string()),
            warn_days: Some(DEFAULT_WARN_DAYS),
            exit_code: Some(2),
            date_format: Some(DEFAULT_DATE_FORMAT.to_string()),
            ca_file: Some("/etc/ssl/certs/ca-certificates.crt".to_string()),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Splits `example.com` or `https://example.com:8443/path` into host and
/// optional port.
fn split_target(raw: &str) -> Result<(String, Option<u16>), ConfigError> {
    if !raw.contains("://") {
        return Ok((raw.to_string(), None));
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::Validation(format!("{}: {}", raw, e)))?;
    if url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "only https URLs are supported, got '{}'",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::Validation(format!("{} has no host", raw)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    Ok((host, url.port()))
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
