//! Trust-store record model and the two-key-form trust decision.
//!
//! A server endpoint is keyed in the trust store under two independent
//! forms - its resolved `ip:port` and its configured `host:port` - because
//! either may be used to look it up later. Each key form carries up to two
//! slots: the normal slot holding the active fingerprint, and a
//! replacement slot staging a pending fingerprint awaiting promotion.

use crate::fingerprint::Fingerprint;

/// Reserved user-slot name for staged replacement fingerprints.
///
/// Distinct from any real username; round-trips through the trust file
/// unchanged.
pub const REPLACEMENT_SLOT_NAME: &str = "++++++";

/// User-slot name for the active fingerprint entry.
pub const NORMAL_SLOT_NAME: &str = "fingerprint";

/// Which slot of a trust-store key a record occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The active, trusted fingerprint.
    Normal,
    /// A staged fingerprint awaiting promotion.
    Replacement,
}

impl Slot {
    /// The reserved user name this slot is stored under.
    #[must_use]
    pub fn user_name(self) -> &'static str {
        match self {
            Slot::Normal => NORMAL_SLOT_NAME,
            Slot::Replacement => REPLACEMENT_SLOT_NAME,
        }
    }

    /// Map a stored user name back to a slot.
    #[must_use]
    pub fn from_user_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(REPLACEMENT_SLOT_NAME) {
            Slot::Replacement
        } else {
            Slot::Normal
        }
    }
}

/// One persisted trust-store record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEntry {
    /// `ip:port` or `host:port`.
    pub server_key: String,
    /// Which slot the record occupies.
    pub slot: Slot,
    /// The stored fingerprint value.
    pub value: Fingerprint,
}

/// Outcome of evaluating a live fingerprint against the trust store.
///
/// A closed set: callers match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustOutcome {
    /// A normal-slot entry exists and matches the live fingerprint.
    AlreadyTrusted,
    /// No entry exists under either key form.
    NewConnection,
    /// Entries exist but none match the live fingerprint.
    NewKey,
    /// A staged replacement matched and is eligible for promotion.
    Replaced,
}

/// Lookup facts for one key form of an endpoint.
///
/// All four flags are computed independently per key form; nothing here
/// crosses between the ip and host forms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFormStatus {
    /// A normal-slot entry exists for this key.
    pub exists: bool,
    /// The normal-slot entry equals the live fingerprint.
    pub matches: bool,
    /// A replacement-slot entry exists for this key.
    pub replacement_exists: bool,
    /// The replacement-slot entry equals the live fingerprint.
    pub replacement_matches: bool,
}

impl KeyFormStatus {
    /// Trust is established for this key form: the active entry matches.
    #[must_use]
    pub fn established(&self) -> bool {
        self.exists && self.matches
    }

    /// No usable entry for this key form: nothing is installed, and no
    /// matching replacement could stand in for the missing entry.
    #[must_use]
    pub fn not_established(&self) -> bool {
        (!self.exists && !self.replacement_exists) || (!self.exists && !self.replacement_matches)
    }

    /// The live fingerprint matches neither the active entry nor the
    /// staged replacement.
    #[must_use]
    pub fn new_key(&self) -> bool {
        !self.matches && !self.replacement_matches
    }

    /// The staged replacement should be promoted to the normal slot:
    /// the active entry is stale or missing and the replacement matches.
    #[must_use]
    pub fn promotion_eligible(&self) -> bool {
        (!self.exists || !self.matches) && self.replacement_exists && self.replacement_matches
    }
}

/// Combine the two key forms into a single trust outcome.
///
/// An endpoint is unknown only when *neither* form has a usable entry,
/// and presents a new key only when *neither* form's live fingerprint
/// matches. Promotion eligibility on either form reports [`TrustOutcome::Replaced`];
/// the caller performs the promotion per form.
#[must_use]
pub fn evaluate(ip: &KeyFormStatus, host: &KeyFormStatus) -> TrustOutcome {
    if ip.not_established() && host.not_established() {
        return TrustOutcome::NewConnection;
    }
    if ip.new_key() && host.new_key() {
        return TrustOutcome::NewKey;
    }
    if ip.promotion_eligible() || host.promotion_eligible() {
        return TrustOutcome::Replaced;
    }
    TrustOutcome::AlreadyTrusted
}
