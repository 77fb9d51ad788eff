//! Error types for certificate checks.
//!
//! Every failure is terminal for the single check it belongs to. Nothing in
//! this crate retries.

use std::fmt;
use std::io;

/// Error type for a failed certificate check.
#[derive(Debug)]
pub enum CheckError {
    /// The peer completed the handshake without presenting a certificate
    NoCertificate,

    /// A configured timeout expired
    Timeout {
        /// Which operation timed out
        operation: String,
    },

    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TLS handshake or HTTP exchange failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Invalid input provided to the API
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// OpenSSL error occurred
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Writing the result file failed
    Output {
        /// Path of the result file
        path: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },
}

impl CheckError {
    pub(crate) fn timeout(operation: &str) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
        }
    }

    /// Maps a socket error to `Timeout` when it came from an expired
    /// read/write/connect deadline, otherwise to `fallback`.
    pub(crate) fn from_socket<F>(e: io::Error, operation: &str, fallback: F) -> Self
    where
        F: FnOnce(io::Error) -> Self,
    {
        if is_timeout(&e) {
            Self::timeout(operation)
        } else {
            fallback(e)
        }
    }

    /// True for the network class of errors (DNS, connect, handshake, timeout).
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::DnsResolution { .. }
                | Self::ConnectionFailed { .. }
                | Self::HandshakeFailed { .. }
                | Self::IoError { .. }
        )
    }
}

/// Blocking sockets with a deadline report `WouldBlock` on Unix and
/// `TimedOut` on Windows.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCertificate => write!(f, "No certificate!"),
            Self::Timeout { operation } => write!(f, "Timeout! ({})", operation),
            Self::DnsResolution { hostname, source } => {
                write!(f, "Failed to resolve hostname: {} ({})", hostname, source)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "Connection failed to: {} ({})", address, source)
            }
            Self::HandshakeFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::Output { path, source } => {
                write!(f, "Failed to write {}: {}", path, source)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::Output { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckError {
    fn from(e: io::Error) -> Self {
        Self::from_socket(e, "socket I/O", |source| Self::IoError { source })
    }
}

impl From<openssl::error::ErrorStack> for CheckError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S> From<openssl::ssl::HandshakeError<S>> for CheckError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        use openssl::ssl::HandshakeError;

        match e {
            // Only reachable on a blocking socket when its read deadline expired.
            HandshakeError::WouldBlock(_) => Self::timeout("TLS handshake"),
            HandshakeError::Failure(mid) => {
                let timed_out = mid.error().io_error().map(is_timeout).unwrap_or(false);
                if timed_out {
                    Self::timeout("TLS handshake")
                } else {
                    Self::HandshakeFailed {
                        details: mid.error().to_string(),
                    }
                }
            }
            HandshakeError::SetupFailure(stack) => stack.into(),
        }
    }
}
