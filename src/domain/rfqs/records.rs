//! RFQ Records

use jiff::Timestamp;
use serde::Serialize;

use crate::uuids::TypedUuid;

/// RFQ UUID
pub type RfqUuid = TypedUuid<RfqRecord>;

/// RFQ Item UUID
pub type RfqItemUuid = TypedUuid<RfqItemRecord>;

/// RFQ Attachment UUID
pub type RfqAttachmentUuid = TypedUuid<RfqAttachmentRecord>;

/// One submitted request-for-quotation.
#[derive(Debug, Clone, Serialize)]
pub struct RfqRecord {
    pub uuid: RfqUuid,
    pub company: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub created_at: Timestamp,
    pub items: Vec<RfqItemRecord>,
    pub attachments: Vec<RfqAttachmentRecord>,
}

/// Line item on an RFQ.
#[derive(Debug, Clone, Serialize)]
pub struct RfqItemRecord {
    pub uuid: RfqItemUuid,
    pub name: String,
    pub quantity: i32,
    pub details: Option<String>,
}

/// File attached to an RFQ.
#[derive(Debug, Clone, Serialize)]
pub struct RfqAttachmentRecord {
    pub uuid: RfqAttachmentUuid,
    pub file_name: String,
    pub file_url: String,
    pub file_size: Option<i64>,
}
