//! End-to-end trust establishment against a scripted transport and a
//! real on-disk trust file.

mod common;

use common::{client_with, default_client, trust_file, MockConnection, MockTransport};
use common::{FINGERPRINT, HOST, IP_PORT, PORT};

use meridian_auth::trust::Slot;
use meridian_client::{CertValidation, Error, TrustErrorKind, TrustOptions, ValidationMethod};
use tempfile::TempDir;

fn accept() -> TrustOptions {
    TrustOptions {
        auto_accept: true,
        ..TrustOptions::default()
    }
}

#[test]
fn first_contact_auto_accept_installs_both_key_forms() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    let message = c.add_trust(None, &accept()).unwrap();

    // Composite message: the first-contact warning plus one confirmation
    // per key form written.
    assert!(message.contains("can't be established"));
    assert!(message.contains(FINGERPRINT));
    assert_eq!(message.matches("Added trust").count(), 2);

    let host_port = format!("{HOST}:{PORT}");
    for key in [IP_PORT, host_port.as_str()] {
        let stored = c.load_fingerprint(key, Slot::Normal).unwrap();
        assert_eq!(stored.as_str(), FINGERPRINT);
    }
}

#[test]
fn add_trust_is_idempotent_once_established() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    c.add_trust(None, &accept()).unwrap();
    let before = trust_file(&tmp);

    let message = c.add_trust(None, &accept()).unwrap();
    assert!(message.contains("already established"));
    assert_eq!(trust_file(&tmp), before);
}

#[test]
fn first_contact_without_auto_accept_is_refused() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    let err = c.add_trust(None, &TrustOptions::default()).unwrap_err();
    match err {
        Error::Trust(e) => {
            assert_eq!(e.kind, TrustErrorKind::NewConnection);
            assert_eq!(e.fingerprint, FINGERPRINT);
            assert!(e.message.contains("trust add"));
        }
        other => panic!("expected trust refusal, got {other}"),
    }
    assert!(trust_file(&tmp).is_empty());
}

#[test]
fn changed_fingerprint_requires_force() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.save_fingerprint(IP_PORT, Slot::Normal, "00:11:22").unwrap();
    c.save_fingerprint(&format!("{HOST}:{PORT}"), Slot::Normal, "00:11:22")
        .unwrap();

    let err = c.add_trust(None, &accept()).unwrap_err();
    match err {
        Error::Trust(e) => assert_eq!(e.kind, TrustErrorKind::NewKey),
        other => panic!("expected trust refusal, got {other}"),
    }

    let forced = TrustOptions {
        auto_accept: true,
        force: true,
        ..TrustOptions::default()
    };
    let message = c.add_trust(None, &forced).unwrap();
    assert!(message.contains("CHANGED"));
    let stored = c.load_fingerprint(IP_PORT, Slot::Normal).unwrap();
    assert_eq!(stored.as_str(), FINGERPRINT);
}

#[test]
fn explicit_value_implies_accept_and_force() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.save_fingerprint(IP_PORT, Slot::Normal, "00:11:22").unwrap();
    c.save_fingerprint(&format!("{HOST}:{PORT}"), Slot::Normal, "00:11:22")
        .unwrap();

    c.add_trust(Some("99:88:77"), &TrustOptions::default())
        .unwrap();
    let stored = c.load_fingerprint(IP_PORT, Slot::Normal).unwrap();
    assert_eq!(stored.as_str(), "99:88:77");
}

#[test]
fn auto_refuse_reports_without_writing() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    let opts = TrustOptions {
        auto_refuse: true,
        ..TrustOptions::default()
    };
    let message = c.add_trust(None, &opts).unwrap();
    assert!(message.contains("can't be established"));
    assert!(trust_file(&tmp).is_empty());
}

#[test]
fn replacement_option_writes_the_staging_slot() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    let opts = TrustOptions {
        auto_accept: true,
        replacement: true,
        ..TrustOptions::default()
    };
    c.add_trust(None, &opts).unwrap();

    assert!(c.load_fingerprint(IP_PORT, Slot::Normal).is_none());
    let staged = c.load_fingerprint(IP_PORT, Slot::Replacement).unwrap();
    assert_eq!(staged.as_str(), FINGERPRINT);
}

#[test]
fn check_fingerprint_refuses_unknown_server() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);

    let mut conn = MockConnection::default();
    let err = c.check_fingerprint(&mut conn).unwrap_err();
    assert!(matches!(
        err,
        Error::Trust(e) if e.kind == TrustErrorKind::NewConnection
    ));
    assert!(!conn.trusted);
}

#[test]
fn check_fingerprint_trusts_pinned_server() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.add_trust(None, &accept()).unwrap();

    let mut conn = MockConnection::default();
    c.check_fingerprint(&mut conn).unwrap();
    assert!(conn.trusted);
}

#[test]
fn check_fingerprint_flags_key_change() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.save_fingerprint(IP_PORT, Slot::Normal, "00:11:22").unwrap();

    let mut conn = MockConnection::default();
    let err = c.check_fingerprint(&mut conn).unwrap_err();
    assert!(matches!(
        err,
        Error::Trust(e) if e.kind == TrustErrorKind::NewKey
    ));
}

#[test]
fn matching_replacement_is_promoted_on_check() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    let host_port = format!("{HOST}:{PORT}");
    for key in [IP_PORT, host_port.as_str()] {
        c.save_fingerprint(key, Slot::Normal, "00:11:22").unwrap();
        c.save_fingerprint(key, Slot::Replacement, FINGERPRINT).unwrap();
    }

    let mut conn = MockConnection::default();
    c.check_fingerprint(&mut conn).unwrap();
    assert!(conn.trusted);

    for key in [IP_PORT, host_port.as_str()] {
        let promoted = c.load_fingerprint(key, Slot::Normal).unwrap();
        assert_eq!(promoted.as_str(), FINGERPRINT);
        assert!(c.load_fingerprint(key, Slot::Replacement).is_none());
    }
}

#[test]
fn stale_replacement_does_not_rescue_unknown_server() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.save_fingerprint(IP_PORT, Slot::Replacement, "00:11:22").unwrap();

    let mut conn = MockConnection::default();
    let err = c.check_fingerprint(&mut conn).unwrap_err();
    assert!(matches!(
        err,
        Error::Trust(e) if e.kind == TrustErrorKind::NewConnection
    ));
}

#[test]
fn insecure_connection_passes_unchecked() {
    let tmp = TempDir::new().unwrap();
    let mut conn = MockConnection {
        secure: false,
        fingerprint: None,
        ..MockConnection::default()
    };
    let mut c = default_client(&tmp);
    c.trust_connection_check(&mut conn).unwrap();
    assert!(c.validated_by().is_none());
}

#[test]
fn expired_certificate_is_rejected_before_fingerprint() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.add_trust(None, &accept()).unwrap();

    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::default();
    params.not_before = time::OffsetDateTime::now_utc() - time::Duration::days(10);
    params.not_after = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    let expired = params.self_signed(&key).unwrap().der().to_vec();

    let mut conn = MockConnection {
        certs: vec![expired],
        ..MockConnection::default()
    };
    let err = c.check_fingerprint(&mut conn).unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(!conn.trusted);
}

#[test]
fn chain_mode_validates_issued_chain_without_pinning() {
    let tmp = TempDir::new().unwrap();

    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::default();
    ca_params.distinguished_name = rcgen::DistinguishedName::new();
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "test ca");
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = rcgen::KeyPair::generate().unwrap();
    let mut leaf_params = rcgen::CertificateParams::default();
    leaf_params.distinguished_name = rcgen::DistinguishedName::new();
    leaf_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, HOST);
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let template = MockConnection {
        certs: vec![leaf_cert.der().to_vec(), ca_cert.der().to_vec()],
        self_signed: false,
        ..MockConnection::default()
    };
    let mut conn = template.clone();
    let mut c = client_with(&tmp, MockTransport::new(template), |config| {
        config.cert_validation = CertValidation::Chain;
    });

    c.trust_connection_check(&mut conn).unwrap();
    assert_eq!(c.validated_by(), Some(ValidationMethod::Chain));
    assert!(c.is_validated_by_chain());
    // Chain validation never touches the trust file.
    assert!(trust_file(&tmp).is_empty());
}

#[test]
fn chain_mode_falls_back_to_fingerprint_for_self_signed() {
    let tmp = TempDir::new().unwrap();
    let mut c = client_with(
        &tmp,
        MockTransport::new(MockConnection::default()),
        |config| config.cert_validation = CertValidation::Chain,
    );
    c.add_trust(None, &accept()).unwrap();

    let mut conn = MockConnection::default();
    c.trust_connection_check(&mut conn).unwrap();
    assert_eq!(c.validated_by(), Some(ValidationMethod::Fingerprint));
    assert!(!c.is_validated_by_chain());
    assert!(conn.trusted);
}

#[test]
fn remove_trust_clears_both_key_forms() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.add_trust(None, &accept()).unwrap();

    let message = c.remove_trust(&TrustOptions::default()).unwrap();
    assert_eq!(message.matches("Removed trust").count(), 2);
    assert!(c.load_fingerprint(IP_PORT, Slot::Normal).is_none());
    assert!(c
        .load_fingerprint(&format!("{HOST}:{PORT}"), Slot::Normal)
        .is_none());
}

#[test]
fn remove_trust_warns_per_unestablished_key_form() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    // Only the ip form is pinned; the host form should draw a warning.
    c.save_fingerprint(IP_PORT, Slot::Normal, FINGERPRINT).unwrap();

    let message = c.remove_trust(&TrustOptions::default()).unwrap();
    assert_eq!(message.matches("not been established").count(), 1);
    assert_eq!(message.matches("Removed trust").count(), 1);
}

#[test]
fn get_trusts_partitions_slots() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    c.save_fingerprint(IP_PORT, Slot::Normal, FINGERPRINT).unwrap();
    c.save_fingerprint(IP_PORT, Slot::Replacement, "00:11:22").unwrap();

    let normal = c.get_trusts().unwrap();
    assert_eq!(normal.len(), 1);
    assert_eq!(normal[0].server_key, IP_PORT);

    let staged = c.get_replacement_trusts().unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].value.as_str(), "00:11:22");
}

#[test]
fn get_trust_reads_the_live_fingerprint() {
    let tmp = TempDir::new().unwrap();
    let c = default_client(&tmp);
    assert_eq!(c.get_trust().unwrap(), FINGERPRINT);
}

#[test]
fn connect_refuses_untrusted_server_and_closes() {
    let tmp = TempDir::new().unwrap();
    let mut c = default_client(&tmp);
    let Err(err) = c.connect() else {
        panic!("connect succeeded against an unpinned server");
    };
    assert!(matches!(err, Error::Trust(_)));
}
