//! RFQs Data

use crate::domain::rfqs::records::RfqUuid;

/// New RFQ Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewRfq {
    pub uuid: RfqUuid,
    pub company: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
}
