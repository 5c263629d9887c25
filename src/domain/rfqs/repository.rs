//! RFQs Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query_as};
use uuid::Uuid;

use crate::domain::rfqs::{
    data::NewRfq,
    records::{RfqAttachmentRecord, RfqItemRecord, RfqRecord, RfqUuid},
};

const CREATE_RFQ_SQL: &str = include_str!("sql/create_rfq.sql");
const GET_RFQ_SQL: &str = include_str!("sql/get_rfq.sql");
const GET_RFQ_ITEMS_SQL: &str = include_str!("sql/get_rfq_items.sql");
const GET_RFQ_ATTACHMENTS_SQL: &str = include_str!("sql/get_rfq_attachments.sql");

#[derive(Debug, Clone)]
/// PostgreSQL-backed RFQs repository.
pub(crate) struct PgRfqsRepository {
    pool: PgPool,
}

impl PgRfqsRepository {
    #[must_use]
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn create_rfq(&self, rfq: NewRfq) -> Result<RfqRecord, sqlx::Error> {
        query_as::<Postgres, RfqRecord>(CREATE_RFQ_SQL)
            .bind(rfq.uuid.into_uuid())
            .bind(rfq.company)
            .bind(rfq.contact_name)
            .bind(rfq.contact_email)
            .bind(rfq.contact_phone)
            .fetch_one(&self.pool)
            .await
    }

    pub(crate) async fn get_rfq(&self, uuid: RfqUuid) -> Result<Option<RfqRecord>, sqlx::Error> {
        let Some(mut rfq) = query_as::<Postgres, RfqRecord>(GET_RFQ_SQL)
            .bind(uuid.into_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        rfq.items = query_as::<Postgres, RfqItemRecord>(GET_RFQ_ITEMS_SQL)
            .bind(uuid.into_uuid())
            .fetch_all(&self.pool)
            .await?;

        rfq.attachments = query_as::<Postgres, RfqAttachmentRecord>(GET_RFQ_ATTACHMENTS_SQL)
            .bind(uuid.into_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(rfq))
    }
}

impl<'r> FromRow<'r, PgRow> for RfqRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: RfqUuid::from_uuid(row.try_get("uuid")?),
            company: row.try_get("company")?,
            contact_name: row.try_get("contact_name")?,
            contact_email: row.try_get("contact_email")?,
            contact_phone: row.try_get("contact_phone")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            items: Vec::new(),
            attachments: Vec::new(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for RfqItemRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            details: row.try_get("details")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for RfqAttachmentRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: row.try_get::<Uuid, _>("uuid")?.into(),
            file_name: row.try_get("file_name")?,
            file_url: row.try_get("file_url")?,
            file_size: row.try_get("file_size")?,
        })
    }
}
