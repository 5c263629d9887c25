//! Secure Link Records

use jiff::Timestamp;
use serde::Serialize;

use crate::domain::{links::token::LinkToken, rfqs::records::RfqUuid};

/// One issued secure link capability.
#[derive(Debug, Clone)]
pub struct SecureLinkRecord {
    /// Capability token; immutable once created.
    pub token: LinkToken,

    /// RFQ this link grants access to; immutable.
    pub rfq_uuid: RfqUuid,

    /// Link creation timestamp.
    pub created_at: Timestamp,

    /// Instant after which the link no longer resolves.
    pub expires_at: Timestamp,

    /// When true, at most one successful resolution is ever permitted.
    pub one_time: bool,

    /// Permanent kill switch; set by `invalidate`, never cleared.
    pub disabled: bool,

    /// Set exactly once, on the first successful resolution.
    pub first_access_at: Option<Timestamp>,

    /// Updated on every successful resolution.
    pub last_access_ip: Option<String>,

    /// Incremented exactly once per successful resolution.
    pub access_count: i32,
}

impl SecureLinkRecord {
    /// Whether the one-time capability has been spent.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.one_time && self.access_count >= 1
    }

    /// Whether the link is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Serializable link metadata returned to callers alongside the RFQ payload.
#[derive(Debug, Clone, Serialize)]
pub struct SecureLinkMetadata {
    pub token: String,
    pub rfq_uuid: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub one_time: bool,
    pub first_access_at: Option<Timestamp>,
    pub last_access_ip: Option<String>,
    pub access_count: i32,
}

impl From<&SecureLinkRecord> for SecureLinkMetadata {
    fn from(record: &SecureLinkRecord) -> Self {
        Self {
            token: record.token.as_str().to_owned(),
            rfq_uuid: record.rfq_uuid.to_string(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            one_time: record.one_time,
            first_access_at: record.first_access_at,
            last_access_ip: record.last_access_ip.clone(),
            access_count: record.access_count,
        }
    }
}
