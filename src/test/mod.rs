//! Shared test fixtures.

pub(crate) mod db;

use jiff::Timestamp;

use crate::domain::rfqs::records::{RfqItemRecord, RfqItemUuid, RfqRecord, RfqUuid};

/// A representative RFQ payload for collaborator mocks.
pub(crate) fn sample_rfq(uuid: RfqUuid) -> RfqRecord {
    RfqRecord {
        uuid,
        company: "Acme Corp".to_owned(),
        contact_name: "Ada Lovelace".to_owned(),
        contact_email: "ada@acme.example".to_owned(),
        contact_phone: None,
        created_at: Timestamp::now(),
        items: vec![RfqItemRecord {
            uuid: RfqItemUuid::new(),
            name: "Widget".to_owned(),
            quantity: 12,
            details: Some("anodised".to_owned()),
        }],
        attachments: Vec::new(),
    }
}
