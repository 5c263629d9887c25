//! Links Repository
//!
//! Two implementations back the canonical link state: a `PostgreSQL`
//! repository for production and a deterministic in-memory one used by tests
//! and cache-less demos. The service layer never knows which is active.

use std::{
    net::IpAddr,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTimestamp, ToSqlx};
use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query_as};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    links::{
        data::NewSecureLink,
        records::SecureLinkRecord,
        token::LinkToken,
    },
    rfqs::records::RfqUuid,
};

const CREATE_LINK_SQL: &str = include_str!("sql/create_link.sql");
const GET_LINK_BY_TOKEN_SQL: &str = include_str!("sql/get_link_by_token.sql");
const RECORD_ACCESS_SQL: &str = include_str!("sql/record_access.sql");
const INVALIDATE_LINK_SQL: &str = include_str!("sql/invalidate_link.sql");

#[derive(Debug, Error)]
pub enum LinkRepositoryError {
    /// The referenced RFQ does not exist.
    #[error("referenced rfq does not exist")]
    SubjectNotFound,

    /// Underlying store failure (connection, timeout, constraint noise).
    #[error("storage error")]
    Storage(#[source] sqlx::Error),
}

impl From<sqlx::Error> for LinkRepositoryError {
    fn from(error: sqlx::Error) -> Self {
        use sqlx::error::{DatabaseError, ErrorKind};

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::SubjectNotFound,
            _ => Self::Storage(error),
        }
    }
}

/// Canonical state of every issued secure link.
///
/// `record_access` is the single mutating read: the terminal-condition check
/// and the access bookkeeping execute as one atomic unit, observed as
/// indivisible by all concurrent callers.
#[automock]
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Persist a new link record.
    async fn create(&self, link: NewSecureLink) -> Result<SecureLinkRecord, LinkRepositoryError>;

    /// Pure lookup; no side effects.
    async fn get_by_token(
        &self,
        token: &LinkToken,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError>;

    /// Atomically re-validate and record an access.
    ///
    /// Returns the updated record when the link was still valid at the
    /// instant of execution, `None` otherwise. A `None` writes nothing.
    async fn record_access(
        &self,
        token: &LinkToken,
        accessor_ip: IpAddr,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError>;

    /// Permanently disable a link and clamp its expiry to `now`.
    ///
    /// Returns `None` when no such token exists.
    async fn invalidate(
        &self,
        token: &LinkToken,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError>;
}

#[derive(Debug, Clone)]
/// PostgreSQL-backed links repository.
pub struct PgLinkRepository {
    pool: PgPool,
}

impl PgLinkRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn create(&self, link: NewSecureLink) -> Result<SecureLinkRecord, LinkRepositoryError> {
        query_as::<Postgres, SecureLinkRecord>(CREATE_LINK_SQL)
            .bind(link.token.as_str())
            .bind(link.rfq_uuid.into_uuid())
            .bind(link.expires_at.to_sqlx())
            .bind(link.one_time)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn get_by_token(
        &self,
        token: &LinkToken,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        query_as::<Postgres, SecureLinkRecord>(GET_LINK_BY_TOKEN_SQL)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn record_access(
        &self,
        token: &LinkToken,
        accessor_ip: IpAddr,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        // A single conditional UPDATE is the whole critical section; row
        // locking makes the check-and-increment linearizable per token.
        query_as::<Postgres, SecureLinkRecord>(RECORD_ACCESS_SQL)
            .bind(token.as_str())
            .bind(now.to_sqlx())
            .bind(accessor_ip.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn invalidate(
        &self,
        token: &LinkToken,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        query_as::<Postgres, SecureLinkRecord>(INVALIDATE_LINK_SQL)
            .bind(token.as_str())
            .bind(now.to_sqlx())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }
}

impl<'r> FromRow<'r, PgRow> for SecureLinkRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let token: String = row.try_get("token")?;
        let token = token
            .parse::<LinkToken>()
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?;

        Ok(Self {
            token,
            rfq_uuid: RfqUuid::from_uuid(row.try_get::<Uuid, _>("rfq_uuid")?),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            expires_at: row.try_get::<SqlxTimestamp, _>("expires_at")?.to_jiff(),
            one_time: row.try_get("one_time")?,
            disabled: row.try_get("disabled")?,
            first_access_at: row
                .try_get::<Option<SqlxTimestamp>, _>("first_access_at")?
                .map(SqlxTimestamp::to_jiff),
            last_access_ip: row.try_get("last_access_ip")?,
            access_count: row.try_get("access_count")?,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    links: FxHashMap<String, SecureLinkRecord>,
    rfqs: FxHashSet<Uuid>,
}

/// Deterministic in-memory links repository.
///
/// Keeps the same referential semantics as the `PostgreSQL` schema: creating
/// a link against an unregistered RFQ fails, matching the foreign key.
#[derive(Debug, Default)]
pub struct InMemoryLinkRepository {
    state: Mutex<InMemoryState>,
}

impl InMemoryLinkRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an RFQ uuid so links may reference it.
    pub fn register_rfq(&self, rfq_uuid: RfqUuid) {
        self.lock().rfqs.insert(rfq_uuid.into_uuid());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock is safe to recover.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn create(&self, link: NewSecureLink) -> Result<SecureLinkRecord, LinkRepositoryError> {
        let mut state = self.lock();

        if !state.rfqs.contains(&link.rfq_uuid.into_uuid()) {
            return Err(LinkRepositoryError::SubjectNotFound);
        }

        let record = SecureLinkRecord {
            token: link.token,
            rfq_uuid: link.rfq_uuid,
            created_at: Timestamp::now(),
            expires_at: link.expires_at,
            one_time: link.one_time,
            disabled: false,
            first_access_at: None,
            last_access_ip: None,
            access_count: 0,
        };

        state
            .links
            .insert(record.token.as_str().to_owned(), record.clone());

        Ok(record)
    }

    async fn get_by_token(
        &self,
        token: &LinkToken,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        Ok(self.lock().links.get(token.as_str()).cloned())
    }

    async fn record_access(
        &self,
        token: &LinkToken,
        accessor_ip: IpAddr,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        // Check and mutation share one lock guard, mirroring the conditional
        // UPDATE on the PostgreSQL side.
        let mut state = self.lock();

        let Some(record) = state.links.get_mut(token.as_str()) else {
            return Ok(None);
        };

        if record.disabled || record.is_expired(now) || record.is_consumed() {
            return Ok(None);
        }

        if record.first_access_at.is_none() {
            record.first_access_at = Some(now);
        }

        record.last_access_ip = Some(accessor_ip.to_string());
        record.access_count += 1;

        Ok(Some(record.clone()))
    }

    async fn invalidate(
        &self,
        token: &LinkToken,
        now: Timestamp,
    ) -> Result<Option<SecureLinkRecord>, LinkRepositoryError> {
        let mut state = self.lock();

        let Some(record) = state.links.get_mut(token.as_str()) else {
            return Ok(None);
        };

        record.disabled = true;
        record.expires_at = record.expires_at.min(now);

        Ok(Some(record.clone()))
    }
}

#[cfg(test)]
mod pg_tests {
    use std::net::{IpAddr, Ipv4Addr};

    use jiff::SignedDuration;
    use sqlx::query;
    use testresult::TestResult;

    use super::*;
    use crate::{domain::links::token::generate_link_token, test::db::TestDb};

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

    async fn seed_rfq(pool: &PgPool) -> Result<RfqUuid, sqlx::Error> {
        let uuid = RfqUuid::new();

        query(
            "INSERT INTO rfqs (uuid, company, contact_name, contact_email) \
             VALUES ($1, 'Acme Corp', 'Ada Lovelace', 'ada@acme.example')",
        )
        .bind(uuid.into_uuid())
        .execute(pool)
        .await?;

        Ok(uuid)
    }

    fn new_link(rfq_uuid: RfqUuid, ttl: SignedDuration, one_time: bool) -> NewSecureLink {
        NewSecureLink {
            token: generate_link_token(),
            rfq_uuid,
            expires_at: Timestamp::now() + ttl,
            one_time,
        }
    }

    #[tokio::test]
    #[ignore = "requires a local Docker daemon"]
    async fn create_and_record_access_round_trip() -> TestResult {
        let db = TestDb::new().await;
        let repo = PgLinkRepository::new(db.pool().clone());
        let rfq_uuid = seed_rfq(db.pool()).await?;

        let created = repo
            .create(new_link(rfq_uuid, SignedDuration::from_hours(1), false))
            .await?;
        assert_eq!(created.access_count, 0);
        assert!(created.first_access_at.is_none());

        let accessed = repo
            .record_access(&created.token, IP, Timestamp::now())
            .await?
            .expect("live link must accept an access");
        assert_eq!(accessed.access_count, 1);
        assert_eq!(accessed.last_access_ip.as_deref(), Some("203.0.113.9"));
        assert!(accessed.first_access_at.is_some());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a local Docker daemon"]
    async fn one_time_guard_blocks_the_second_access_without_writing() -> TestResult {
        let db = TestDb::new().await;
        let repo = PgLinkRepository::new(db.pool().clone());
        let rfq_uuid = seed_rfq(db.pool()).await?;

        let created = repo
            .create(new_link(rfq_uuid, SignedDuration::from_hours(1), true))
            .await?;

        let first = repo
            .record_access(&created.token, IP, Timestamp::now())
            .await?;
        assert!(first.is_some());

        let second = repo
            .record_access(&created.token, IP, Timestamp::now())
            .await?;
        assert!(second.is_none(), "consumed link must not accept an access");

        let record = repo
            .get_by_token(&created.token)
            .await?
            .expect("record must still exist");
        assert_eq!(record.access_count, 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a local Docker daemon"]
    async fn create_against_missing_rfq_is_subject_not_found() -> TestResult {
        let db = TestDb::new().await;
        let repo = PgLinkRepository::new(db.pool().clone());

        let result = repo
            .create(new_link(RfqUuid::new(), SignedDuration::from_hours(1), false))
            .await;

        assert!(
            matches!(result, Err(LinkRepositoryError::SubjectNotFound)),
            "expected SubjectNotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a local Docker daemon"]
    async fn invalidate_disables_and_clamps_expiry() -> TestResult {
        let db = TestDb::new().await;
        let repo = PgLinkRepository::new(db.pool().clone());
        let rfq_uuid = seed_rfq(db.pool()).await?;

        let created = repo
            .create(new_link(rfq_uuid, SignedDuration::from_hours(1), false))
            .await?;

        let now = Timestamp::now();
        let invalidated = repo
            .invalidate(&created.token, now)
            .await?
            .expect("existing link must invalidate");

        assert!(invalidated.disabled);
        assert!(invalidated.expires_at <= now);

        let miss = repo.record_access(&created.token, IP, Timestamp::now()).await?;
        assert!(miss.is_none());

        Ok(())
    }
}
