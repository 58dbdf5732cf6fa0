//! Session security and credentials for the meridian RPC protocol.
//!
//! This crate is the layer between the transport and command execution:
//! it decides whether a server may be talked to at all (fingerprint
//! pinning with certificate-validation fallbacks), caches and persists
//! the tickets that authenticate each user, and negotiates the
//! per-command protocol details (tagged output, environment descriptor).
//!
//! The pure trust and certificate primitives live in `meridian-auth`;
//! this crate adds files, locks, connections, and messages around them.
//!
//! # Layout
//!
//! - [`client`]: [`RpcClient`], the per-server session object
//! - [`trust`]: the trust API (`add_trust`, `remove_trust`, connection checks)
//! - [`store`]: the locked, file-backed credential store
//! - [`session`]: tagged-output decision and environment descriptor
//! - [`tls`]: the rustls-backed transport
//! - [`messages`]: localizable operator-facing message catalog

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod session;
pub mod store;
pub mod tls;
pub mod trust;

pub use client::{RpcClient, ServerDescription};
pub use config::{CertValidation, ClientConfig, LockParams, TrustNameMode};
pub use connection::{Endpoint, RpcConnection, Transport};
pub use error::{Error, Result, TrustError, TrustErrorKind};
pub use messages::{DefaultCatalog, MessageCatalog, MessageKey};
pub use session::{EnvDescriptor, SessionNegotiator};
pub use tls::TlsTransport;
pub use trust::{TrustOptions, ValidationMethod};
