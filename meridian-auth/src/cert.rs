//! X.509 checks used by the trust-establishment fallback chain.
//!
//! Three entry points, matching the three validation methods the client
//! attempts in order: full chain validation, hostname-only subject
//! matching, and the validity-date check that precedes any fingerprint
//! comparison.
//!
//! The x509_parser library handles ASN.1 parsing safely; signature
//! verification uses its `verify` feature.

use thiserror::Error;
use x509_parser::prelude::*;
use x509_parser::time::ASN1Time;

/// Maximum certificate size accepted for parsing (DoS protection).
pub const MAX_CERT_SIZE: usize = 16 * 1024;

/// Errors from certificate inspection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertError {
    #[error("certificate too large: {0} bytes (max {MAX_CERT_SIZE})")]
    TooLarge(usize),

    #[error("failed to parse X.509 certificate: {0}")]
    Parse(String),

    #[error("certificate is expired or not yet valid")]
    OutsideValidity,

    #[error("certificate subject does not match host {host:?}")]
    HostnameMismatch { host: String },

    #[error("certificate chain broken at depth {depth}: {reason}")]
    BrokenChain { depth: usize, reason: String },

    #[error("system clock out of range")]
    Clock,
}

fn parse(cert_der: &[u8]) -> Result<X509Certificate<'_>, CertError> {
    if cert_der.len() > MAX_CERT_SIZE {
        return Err(CertError::TooLarge(cert_der.len()));
    }
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|e| CertError::Parse(format!("{e:?}")))?;
    Ok(cert)
}

fn now() -> Result<ASN1Time, CertError> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| CertError::Clock)?
        .as_secs();
    ASN1Time::from_timestamp(secs as i64).map_err(|_| CertError::Clock)
}

/// Verify the certificate's notBefore/notAfter window against the
/// current time.
///
/// # Errors
///
/// Returns [`CertError::OutsideValidity`] when expired or not yet valid.
pub fn verify_validity_dates(cert_der: &[u8]) -> Result<(), CertError> {
    let cert = parse(cert_der)?;
    if cert.validity().is_valid_at(now()?) {
        Ok(())
    } else {
        Err(CertError::OutsideValidity)
    }
}

/// Verify that the certificate was issued to `host`: either the subject
/// common name or a DNS subject-alternative name must match.
///
/// Matching is case-insensitive and honors a single leftmost wildcard
/// label (`*.example.com`).
pub fn verify_subject_matches_host(cert_der: &[u8], host: &str) -> Result<(), CertError> {
    let cert = parse(cert_der)?;

    if let Some(cn) = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
    {
        if name_matches(cn, host) {
            return Ok(());
        }
    }

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                if name_matches(dns, host) {
                    return Ok(());
                }
            }
        }
    }

    Err(CertError::HostnameMismatch {
        host: host.to_string(),
    })
}

/// Validate a full certificate chain (leaf first) against `host`.
///
/// Checks, for every link: validity dates, issuer/subject linkage, and
/// the signature of each certificate under its issuer's public key. The
/// terminal certificate must be self-issued and self-signed. The leaf
/// subject must match `host`.
pub fn validate_server_chain(chain: &[Vec<u8>], host: &str) -> Result<(), CertError> {
    if chain.len() < 2 {
        return Err(CertError::BrokenChain {
            depth: 0,
            reason: "chain has fewer than two certificates".to_string(),
        });
    }

    let certs = chain
        .iter()
        .map(|der| parse(der))
        .collect::<Result<Vec<_>, _>>()?;

    let at = now()?;
    for (depth, cert) in certs.iter().enumerate() {
        if !cert.validity().is_valid_at(at) {
            return Err(CertError::BrokenChain {
                depth,
                reason: "certificate outside its validity window".to_string(),
            });
        }
    }

    for depth in 0..certs.len() {
        let cert = &certs[depth];
        let issuer = if depth + 1 < certs.len() {
            &certs[depth + 1]
        } else {
            // Terminal certificate must close the chain on itself.
            if cert.issuer() != cert.subject() {
                return Err(CertError::BrokenChain {
                    depth,
                    reason: "terminal certificate is not self-issued".to_string(),
                });
            }
            cert
        };
        if cert.issuer() != issuer.subject() {
            return Err(CertError::BrokenChain {
                depth,
                reason: "issuer does not match next certificate's subject".to_string(),
            });
        }
        cert.verify_signature(Some(issuer.public_key()))
            .map_err(|e| CertError::BrokenChain {
                depth,
                reason: format!("signature verification failed: {e}"),
            })?;
    }

    verify_subject_matches_host(&chain[0], host)
}

/// Whether the certificate's issuer equals its subject.
pub fn is_self_issued(cert_der: &[u8]) -> Result<bool, CertError> {
    let cert = parse(cert_der)?;
    Ok(cert.issuer() == cert.subject())
}

fn name_matches(pattern: &str, host: &str) -> bool {
    if pattern.eq_ignore_ascii_case(host) {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some((_, host_suffix)) = host.split_once('.') {
            return suffix.eq_ignore_ascii_case(host_suffix);
        }
    }
    false
}
