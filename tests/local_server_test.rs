//! Checks against a TLS server running on the loopback interface.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use certcheck::{check_certificate_validity, write_result, CheckError, CheckOptions, HttpMethod};
use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use tempfile::NamedTempFile;

const DAY: i64 = 86_400;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Self-signed certificate for 127.0.0.1 valid from `not_before` to `not_after`.
fn certificate(not_before: i64, not_after: i64) -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "localhost").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Serves one HTTPS request and hands the raw request head back.
fn serve_once(cert: &X509, key: &PKey<Private>) -> (u16, mpsc::Receiver<String>) {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(key).unwrap();
    acceptor.set_certificate(cert).unwrap();
    acceptor.check_private_key().unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut tls = match acceptor.accept(stream) {
            Ok(tls) => tls,
            Err(_) => return,
        };
        let mut head = Vec::new();
        let mut buf = [0u8; 512];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match tls.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let _ = tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let _ = tls.flush();
        let _ = tx.send(String::from_utf8_lossy(&head).to_string());
        let _ = tls.shutdown();
    });

    (port, rx)
}

fn pem_file(cert: &X509) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&cert.to_pem().unwrap()).unwrap();
    file
}

#[test]
fn test_trusted_certificate_expiring_in_ten_days() {
    let (cert, key) = certificate(now() - 30 * DAY, now() + 10 * DAY);
    let ca = pem_file(&cert);
    let (port, _) = serve_once(&cert, &key);

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .timeout(Some(Duration::from_secs(10)))
        .ca_file(Some(ca.path().to_path_buf()));
    let result = check_certificate_validity(&options).unwrap();

    assert_eq!(result.subject.as_deref(), Some("localhost"));
    assert_eq!(result.day_remaining, 10);
    assert!(result.valid);
    assert!(result.is_valid);
}

#[test]
fn test_expired_untrusted_certificate() {
    let (cert, key) = certificate(now() - 90 * DAY, now() - 5 * DAY);
    let (port, _) = serve_once(&cert, &key);

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .timeout(Some(Duration::from_secs(10)));
    let result = check_certificate_validity(&options).unwrap();

    assert_eq!(result.day_remaining, -5);
    assert!(!result.valid);
    assert!(!result.is_valid);
}

#[test]
fn test_untrusted_but_unexpired_certificate_is_valid() {
    let (cert, key) = certificate(now() - DAY, now() + 40 * DAY);
    let (port, _) = serve_once(&cert, &key);

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .timeout(Some(Duration::from_secs(10)));
    let result = check_certificate_validity(&options).unwrap();

    assert_eq!(result.day_remaining, 40);
    assert!(!result.valid);
    assert!(result.is_valid);
}

#[test]
fn test_request_uses_method_and_agent() {
    let (cert, key) = certificate(now() - DAY, now() + 20 * DAY);
    let (port, requests) = serve_once(&cert, &key);

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .method(HttpMethod::Head)
        .agent(true)
        .timeout(Some(Duration::from_secs(10)));
    check_certificate_validity(&options).unwrap();

    let request = requests.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(request.starts_with("HEAD / HTTP/1.1\r\n"));
    assert!(request.contains(&format!("Host: 127.0.0.1:{}\r\n", port)));
    assert!(request.contains("Connection: keep-alive\r\n"));
}

#[test]
fn test_result_file_written_for_valid_certificate() {
    let (cert, key) = certificate(now() - DAY, now() + 20 * DAY);
    let (port, _) = serve_once(&cert, &key);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("certificateCheck.json");

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .timeout(Some(Duration::from_secs(10)));
    let result = check_certificate_validity(&options).unwrap();
    assert!(result.is_valid);
    write_result(&result, &path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 6);
    for field in ["subject", "validFrom", "validTo", "dayRemaining", "valid", "isValid"] {
        assert!(object.contains_key(field), "missing {}", field);
    }
}

#[test]
fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let options = CheckOptions::new("127.0.0.1").port(port);
    match check_certificate_validity(&options) {
        Err(CheckError::ConnectionFailed { address, .. }) => {
            assert_eq!(address, format!("127.0.0.1:{}", port));
        }
        other => panic!("expected connection failure, got {:?}", other),
    }
}

#[test]
fn test_unresolvable_host() {
    let options = CheckOptions::new("certcheck-does-not-exist.invalid")
        .timeout(Some(Duration::from_secs(5)));
    let err = check_certificate_validity(&options).unwrap_err();
    assert!(err.is_network(), "unexpected error: {:?}", err);
}

#[test]
fn test_silent_peer_times_out() {
    // Accepts the TCP connection in the backlog but never speaks TLS.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let options = CheckOptions::new("127.0.0.1")
        .port(port)
        .timeout(Some(Duration::from_secs(1)));
    match check_certificate_validity(&options) {
        Err(CheckError::Timeout { .. }) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    drop(listener);
}
