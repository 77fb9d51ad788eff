//! Fetches the peer certificate of a TLS endpoint.

use log::debug;
use openssl::nid::Nid;
use openssl::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::{X509Ref, X509VerifyResult, X509};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::dates::{asn1_to_utc, days_remaining, format_local};
use crate::error::CheckError;
use crate::{CertificateInfo, CheckOptions};

/// Upper bound on the response head we read before inspecting the session.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// Connects to `options.hostname:options.port`, sends one body-less HTTP
/// request and reads the peer certificate once the response arrives.
///
/// The handshake does not abort on an untrusted chain; trust is reported in
/// `CertificateInfo::valid` instead.
pub fn fetch_certificate_info(options: &CheckOptions) -> Result<CertificateInfo, CheckError> {
    if options.hostname.trim().is_empty() {
        return Err(CheckError::InvalidInput {
            field: "hostname".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }

    let connector = build_connector(options)?;
    let tcp_stream = connect(&options.hostname, options.port, options.timeout)?;

    debug!("starting TLS handshake with {}", options.hostname);
    let mut stream = connector
        .configure()?
        .connect(&options.hostname, tcp_stream)?;

    send_request(&mut stream, options)?;
    read_response_head(&mut stream)?;

    let ssl = stream.ssl();
    let valid = ssl.verify_result() == X509VerifyResult::OK;
    debug!("verify result: {}", ssl.verify_result().error_string());

    let info = peer_certificate_info(ssl.peer_certificate(), valid, &options.date_format)?;

    if !options.agent {
        let _ = stream.shutdown();
    }
    Ok(info)
}

/// Builds the `CertificateInfo` for whatever certificate the peer presented.
///
/// A peer without a certificate has no validity window and fails with
/// `CheckError::NoCertificate`.
pub fn peer_certificate_info(
    cert: Option<X509>,
    valid: bool,
    date_format: &str,
) -> Result<CertificateInfo, CheckError> {
    let cert = cert.ok_or(CheckError::NoCertificate)?;
    certificate_info(&cert, valid, date_format)
}

/// Builds the `CertificateInfo` for a peer certificate.
pub fn certificate_info(
    cert: &X509Ref,
    valid: bool,
    date_format: &str,
) -> Result<CertificateInfo, CheckError> {
    let valid_from = asn1_to_utc(cert.not_before())?;
    let valid_to = asn1_to_utc(cert.not_after())?;

    Ok(CertificateInfo {
        subject: common_name(cert),
        valid_from: format_local(valid_from, date_format),
        valid_to: format_local(valid_to, date_format),
        day_remaining: days_remaining(chrono::Utc::now(), valid_to),
        valid,
    })
}

/// Subject CN as text. Interior NUL bytes are kept visible as `\0` rather
/// than cutting the name short.
fn common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .map(|entry| String::from_utf8_lossy(entry.data().as_slice()).replace('\0', "\\0"))
}

fn build_connector(options: &CheckOptions) -> Result<SslConnector, CheckError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    // Handshake always completes; the chain verdict is read from verify_result().
    builder.set_verify(SslVerifyMode::NONE);
    load_system_roots(&mut builder);
    if let Some(ca_file) = &options.ca_file {
        builder.set_ca_file(ca_file)?;
    }
    Ok(builder.build())
}

/// Adds the platform trust store found by `openssl-probe`.
///
/// The vendored OpenSSL only looks under its own build prefix, which rarely
/// exists on the host. A location that fails to load is skipped.
fn load_system_roots(builder: &mut SslConnectorBuilder) {
    let probe = openssl_probe::probe();
    if let Some(cert_file) = &probe.cert_file {
        match builder.set_ca_file(cert_file) {
            Ok(()) => debug!("loaded trust anchors from {}", cert_file.display()),
            Err(e) => debug!("skipping {}: {}", cert_file.display(), e),
        }
    }
    for cert_dir in probe.cert_dir.iter() {
        match builder.load_verify_locations(None, Some(cert_dir.as_path())) {
            Ok(()) => debug!("using trust directory {}", cert_dir.display()),
            Err(e) => debug!("skipping {}: {}", cert_dir.display(), e),
        }
    }
}

fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, CheckError> {
    let address = format!("{}:{}", host, port);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| CheckError::DnsResolution {
            hostname: host.to_string(),
            source,
        })?
        .collect();

    let mut last_error =
        std::io::Error::new(ErrorKind::NotFound, "hostname resolved to no addresses");
    for addr in addrs {
        debug!("connecting to {}", addr);
        let attempt = match timeout {
            Some(duration) => TcpStream::connect_timeout(&addr, duration),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(tcp_stream) => {
                tcp_stream.set_read_timeout(timeout)?;
                tcp_stream.set_write_timeout(timeout)?;
                return Ok(tcp_stream);
            }
            Err(e) => {
                debug!("connection to {} failed: {}", addr, e);
                last_error = e;
            }
        }
    }

    Err(CheckError::from_socket(last_error, "TCP connect", |source| {
        CheckError::ConnectionFailed {
            address: address.clone(),
            source,
        }
    }))
}

fn send_request(
    stream: &mut SslStream<TcpStream>,
    options: &CheckOptions,
) -> Result<(), CheckError> {
    let host_header = if options.port == crate::DEFAULT_PORT {
        options.hostname.clone()
    } else {
        format!("{}:{}", options.hostname, options.port)
    };
    let connection = if options.agent { "keep-alive" } else { "close" };
    let request = format!(
        "{} / HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}/{}\r\nConnection: {}\r\nContent-Length: 0\r\n\r\n",
        options.method.as_request_token(),
        host_header,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        connection
    );

    debug!("sending {} request", options.method.as_request_token());
    stream
        .write_all(request.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(|e| {
            CheckError::from_socket(e, "HTTP request", |source| CheckError::IoError { source })
        })
}

/// Reads until the end of the response head, EOF or `MAX_RESPONSE_HEAD`.
fn read_response_head(stream: &mut SslStream<TcpStream>) -> Result<(), CheckError> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                return Err(CheckError::from_socket(e, "HTTP response", |source| {
                    CheckError::IoError { source }
                }))
            }
        };
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() >= MAX_RESPONSE_HEAD {
            break;
        }
    }

    if head.is_empty() {
        return Err(CheckError::HandshakeFailed {
            details: "socket hang up: no response from peer".to_string(),
        });
    }

    let status_line = head
        .split(|b| *b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim_end().to_string())
        .unwrap_or_default();
    debug!("response: {}", status_line);
    Ok(())
}
