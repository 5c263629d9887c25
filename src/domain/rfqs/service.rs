//! RFQs service.
//!
//! The relational storage of RFQ business records is an external
//! collaborator of the secure-link subsystem; this module carries only the
//! interface the subsystem needs plus a thin `PostgreSQL` implementation.

use async_trait::async_trait;
use mockall::automock;
use sqlx::PgPool;

use crate::domain::rfqs::{
    data::NewRfq, errors::RfqsServiceError, records::RfqRecord, records::RfqUuid,
    repository::PgRfqsRepository,
};

#[derive(Debug, Clone)]
pub struct PgRfqsService {
    repository: PgRfqsRepository,
}

impl PgRfqsService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PgRfqsRepository::new(pool),
        }
    }
}

#[async_trait]
impl RfqsService for PgRfqsService {
    async fn create_rfq(&self, rfq: NewRfq) -> Result<RfqRecord, RfqsServiceError> {
        self.repository.create_rfq(rfq).await.map_err(Into::into)
    }

    async fn get_rfq(&self, uuid: RfqUuid) -> Result<RfqRecord, RfqsServiceError> {
        self.repository
            .get_rfq(uuid)
            .await?
            .ok_or(RfqsServiceError::NotFound)
    }
}

#[automock]
#[async_trait]
/// RFQ persistence operations used by the secure-link subsystem.
pub trait RfqsService: Send + Sync {
    /// Creates a new RFQ.
    async fn create_rfq(&self, rfq: NewRfq) -> Result<RfqRecord, RfqsServiceError>;

    /// Fetch a full RFQ with items and attachments.
    async fn get_rfq(&self, uuid: RfqUuid) -> Result<RfqRecord, RfqsServiceError>;
}
