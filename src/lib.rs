//! Single-shot TLS certificate checker.
//!
//! Connects to one host, reads the leaf certificate the peer presents and
//! reports its validity window, the days left until it expires and whether
//! the TLS stack trusted the chain.
//!
//! ```no_run
//! use certcheck::{check_certificate_validity, CheckOptions};
//!
//! let result = check_certificate_validity(&CheckOptions::new("example.com"))?;
//! println!("{} days left", result.day_remaining);
//! # Ok::<(), certcheck::CheckError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::{Display, EnumString};

pub mod config;
pub mod dates;
pub mod error;
pub mod fetcher;

pub use error::CheckError;
pub use fetcher::fetch_certificate_info;

/// Default TLS port.
pub const DEFAULT_PORT: u16 = 443;

/// Default result file name.
pub const DEFAULT_OUTPUT: &str = "certificateCheck.json";

/// HTTP method used to frame the request sent after the handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
}

impl HttpMethod {
    /// Method token as it appears on the request line.
    pub fn as_request_token(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// Options for a single check.
///
/// `CheckOptions::new` applies the defaults (`agent = false`, `method = get`,
/// `port = 443`, no timeout); the builder methods overlay caller values.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub hostname: String,
    pub port: u16,
    pub method: HttpMethod,
    /// Keep the connection alive instead of a one-off `Connection: close`.
    pub agent: bool,
    /// Bound on connect and on every socket read/write. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Extra trust anchors in PEM form.
    pub ca_file: Option<PathBuf>,
    /// `strftime` pattern for `valid_from` / `valid_to`.
    pub date_format: String,
}

impl CheckOptions {
    pub fn new(hostname: impl Into<String>) -> Self {
        CheckOptions {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            method: HttpMethod::default(),
            agent: false,
            timeout: None,
            ca_file: None,
            date_format: dates::DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn agent(mut self, agent: bool) -> Self {
        self.agent = agent;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ca_file(mut self, ca_file: Option<PathBuf>) -> Self {
        self.ca_file = ca_file;
        self
    }

    pub fn date_format(mut self, pattern: impl Into<String>) -> Self {
        self.date_format = pattern.into();
        self
    }
}

/// What the fetcher reads off the peer certificate and TLS session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    /// Subject CN, absent when the certificate has none
    pub subject: Option<String>,
    pub valid_from: String,
    pub valid_to: String,
    /// Days until `valid_to`, negative once expired
    pub day_remaining: i64,
    /// Trust-chain authorization reported by the TLS stack
    pub valid: bool,
}

/// A `CertificateInfo` with the derived `is_valid` verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateCheckResult {
    pub subject: Option<String>,
    pub valid_from: String,
    pub valid_to: String,
    pub day_remaining: i64,
    pub valid: bool,
    /// `day_remaining > 0 || valid`. An authorized but expired certificate
    /// still counts as valid, as does an unexpired untrusted one.
    pub is_valid: bool,
}

impl From<CertificateInfo> for CertificateCheckResult {
    fn from(info: CertificateInfo) -> Self {
        let is_valid = info.day_remaining > 0 || info.valid;
        CertificateCheckResult {
            subject: info.subject,
            valid_from: info.valid_from,
            valid_to: info.valid_to,
            day_remaining: info.day_remaining,
            valid: info.valid,
            is_valid,
        }
    }
}

/// Fetches the certificate for `options` and appends the `is_valid` verdict.
pub fn check_certificate_validity(
    options: &CheckOptions,
) -> Result<CertificateCheckResult, CheckError> {
    let info = fetch_certificate_info(options)?;
    let result = CertificateCheckResult::from(info);
    log::info!(
        "{}:{} day_remaining={} valid={} is_valid={}",
        options.hostname,
        options.port,
        result.day_remaining,
        result.valid,
        result.is_valid
    );
    Ok(result)
}

/// Overwrites `path` with the result as a single JSON object.
pub fn write_result<P: AsRef<Path>>(
    result: &CertificateCheckResult,
    path: P,
) -> Result<(), CheckError> {
    let path = path.as_ref();
    let output = |source: std::io::Error| CheckError::Output {
        path: path.display().to_string(),
        source,
    };
    let json = serde_json::to_string(result)
        .map_err(|e| output(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    fs::write(path, json).map_err(output)?;
    log::debug!("wrote {}", path.display());
    Ok(())
}
