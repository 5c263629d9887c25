//! Secure Links Data

use jiff::SignedDuration;
use serde::Deserialize;

use crate::domain::{
    links::{
        records::{SecureLinkMetadata, SecureLinkRecord},
        token::LinkToken,
    },
    rfqs::records::RfqUuid,
};

/// Default link lifetime substituted when a request carries no usable ttl.
pub const DEFAULT_LINK_TTL: SignedDuration = SignedDuration::from_hours(7 * 24);

/// New secure link persistence payload.
#[derive(Debug, Clone)]
pub struct NewSecureLink {
    pub token: LinkToken,
    pub rfq_uuid: RfqUuid,
    pub expires_at: jiff::Timestamp,
    pub one_time: bool,
}

/// Link issuance input as accepted from the outside.
///
/// `ttl_ms` is policy-sanitised rather than validated: an absent, zero, or
/// negative value falls back to [`DEFAULT_LINK_TTL`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueLinkRequest {
    pub ttl_ms: Option<i64>,
    pub one_time: Option<bool>,
}

impl IssueLinkRequest {
    /// The lifetime to use for this issuance.
    #[must_use]
    pub fn effective_ttl(&self) -> SignedDuration {
        match self.ttl_ms {
            Some(ms) if ms > 0 => SignedDuration::from_millis(ms),
            _ => DEFAULT_LINK_TTL,
        }
    }

    #[must_use]
    pub fn effective_one_time(&self) -> bool {
        self.one_time.unwrap_or(false)
    }
}

/// Issuance result: the persisted record plus the externally-shareable URL.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub record: SecureLinkRecord,
    pub share_url: String,
}

impl IssuedLink {
    #[must_use]
    pub fn metadata(&self) -> SecureLinkMetadata {
        SecureLinkMetadata::from(&self.record)
    }
}

/// Successful resolution: the updated record, ready for the RFQ fetch.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub rfq_uuid: RfqUuid,
    pub record: SecureLinkRecord,
}

/// Link issuance settings.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Front-end base URL the share link is built from, without a trailing
    /// slash, e.g. `https://rfq.example.com/rfq/link`.
    pub share_base_url: String,
}

impl LinkSettings {
    #[must_use]
    pub fn share_url(&self, token: &LinkToken) -> String {
        format!("{}/{token}", self.share_base_url.trim_end_matches('/'))
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            share_base_url: "http://localhost:9000/rfq/link".to_owned(),
        }
    }
}
