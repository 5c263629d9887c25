//! Links service.
//!
//! Implements the validate-and-consume state machine over a pluggable
//! [`LinkRepository`]. Each resolution is a single, non-resumable transition
//! to one of: not found, disabled, expired, consumed, or valid. Only the
//! valid path writes, and its terminal check and mutation are one atomic
//! repository operation.

use std::{net::IpAddr, sync::Arc};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use mockall::automock;
use tracing::debug;

use crate::domain::{
    links::{
        data::{IssueLinkRequest, IssuedLink, LinkSettings, NewSecureLink, ResolvedLink},
        errors::LinkServiceError,
        records::SecureLinkRecord,
        repository::{LinkRepository, LinkRepositoryError},
        token::{LinkToken, generate_link_token},
    },
    rfqs::records::RfqUuid,
};

impl From<LinkRepositoryError> for LinkServiceError {
    fn from(error: LinkRepositoryError) -> Self {
        match error {
            LinkRepositoryError::SubjectNotFound => Self::SubjectNotFound,
            LinkRepositoryError::Storage(error) => Self::Store(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinksService<R> {
    repository: Arc<R>,
    settings: LinkSettings,
}

impl<R: LinkRepository> LinksService<R> {
    #[must_use]
    pub fn new(repository: Arc<R>, settings: LinkSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Issue a link with an explicit signed ttl.
    ///
    /// Public issuance goes through [`LinkService::issue`], which sanitises
    /// the requested ttl; this lower-level entry point accepts any signed
    /// duration so callers (and tests) can mint already-expired links.
    ///
    /// # Errors
    ///
    /// Returns `SubjectNotFound` when the RFQ does not exist, or `Store` on
    /// storage failure.
    pub async fn issue_with_ttl(
        &self,
        rfq_uuid: RfqUuid,
        ttl: SignedDuration,
        one_time: bool,
    ) -> Result<IssuedLink, LinkServiceError> {
        let token = generate_link_token();
        let expires_at = Timestamp::now().saturating_add(ttl).unwrap_or(Timestamp::MAX);

        let record = self
            .repository
            .create(NewSecureLink {
                token,
                rfq_uuid,
                expires_at,
                one_time,
            })
            .await?;

        debug!(rfq_uuid = %record.rfq_uuid, one_time, "issued secure link");

        let share_url = self.settings.share_url(&record.token);

        Ok(IssuedLink { record, share_url })
    }

    /// Classify a resolution miss with fixed precedence: not found, then
    /// disabled, then expired, then consumed. Read-only.
    fn classify_miss(record: Option<SecureLinkRecord>, now: Timestamp) -> LinkServiceError {
        let Some(record) = record else {
            return LinkServiceError::NotFound;
        };

        if record.disabled {
            return LinkServiceError::Disabled;
        }

        if record.is_expired(now) {
            return LinkServiceError::Expired;
        }

        // The atomic update can only miss on a live record when another
        // caller consumed it in between; report it consumed.
        LinkServiceError::Consumed
    }
}

#[async_trait]
impl<R: LinkRepository + 'static> LinkService for LinksService<R> {
    async fn issue(
        &self,
        rfq_uuid: RfqUuid,
        request: IssueLinkRequest,
    ) -> Result<IssuedLink, LinkServiceError> {
        self.issue_with_ttl(rfq_uuid, request.effective_ttl(), request.effective_one_time())
            .await
    }

    async fn resolve(
        &self,
        raw_token: &str,
        accessor_ip: IpAddr,
    ) -> Result<ResolvedLink, LinkServiceError> {
        // Format validation happens before any store lookup.
        let token: LinkToken = raw_token
            .trim()
            .parse()
            .map_err(LinkServiceError::MalformedToken)?;

        let now = Timestamp::now();

        if let Some(record) = self.repository.record_access(&token, accessor_ip, now).await? {
            return Ok(ResolvedLink {
                rfq_uuid: record.rfq_uuid,
                record,
            });
        }

        // The access guard did not fire; re-read to report why. This path
        // performs no writes, so retried requests against a dead link stay
        // idempotent.
        let record = self.repository.get_by_token(&token).await?;

        Err(Self::classify_miss(record, now))
    }

    async fn invalidate(&self, raw_token: &str) -> Result<SecureLinkRecord, LinkServiceError> {
        let token: LinkToken = raw_token
            .trim()
            .parse()
            .map_err(LinkServiceError::MalformedToken)?;

        self.repository
            .invalidate(&token, Timestamp::now())
            .await?
            .ok_or(LinkServiceError::NotFound)
    }

    async fn inspect(&self, raw_token: &str) -> Result<SecureLinkRecord, LinkServiceError> {
        let token: LinkToken = raw_token
            .trim()
            .parse()
            .map_err(LinkServiceError::MalformedToken)?;

        self.repository
            .get_by_token(&token)
            .await?
            .ok_or(LinkServiceError::NotFound)
    }
}

#[automock]
#[async_trait]
/// Secure link lifecycle operations.
pub trait LinkService: Send + Sync {
    /// Issue a new link for an RFQ, sanitising the requested ttl.
    async fn issue(
        &self,
        rfq_uuid: RfqUuid,
        request: IssueLinkRequest,
    ) -> Result<IssuedLink, LinkServiceError>;

    /// Resolve a presented token; on success an access is recorded
    /// atomically and the linked RFQ identity is returned.
    async fn resolve(
        &self,
        raw_token: &str,
        accessor_ip: IpAddr,
    ) -> Result<ResolvedLink, LinkServiceError>;

    /// Permanently invalidate a link. Idempotent by token.
    async fn invalidate(&self, raw_token: &str) -> Result<SecureLinkRecord, LinkServiceError>;

    /// Read-only metadata lookup.
    async fn inspect(&self, raw_token: &str) -> Result<SecureLinkRecord, LinkServiceError>;
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use jiff::{SignedDuration, Timestamp};
    use testresult::TestResult;

    use super::*;
    use crate::domain::links::repository::{InMemoryLinkRepository, MockLinkRepository};

    const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
    const OTHER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 2));

    fn service_with_rfq() -> (LinksService<InMemoryLinkRepository>, RfqUuid) {
        let repository = Arc::new(InMemoryLinkRepository::new());
        let rfq_uuid = RfqUuid::new();
        repository.register_rfq(rfq_uuid);

        (
            LinksService::new(repository, LinkSettings::default()),
            rfq_uuid,
        )
    }

    #[tokio::test]
    async fn issue_returns_fresh_unconsumed_record_and_share_url() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();

        let issued = svc.issue(rfq_uuid, IssueLinkRequest::default()).await?;

        assert_eq!(issued.record.rfq_uuid, rfq_uuid);
        assert_eq!(issued.record.access_count, 0);
        assert!(issued.record.first_access_at.is_none());
        assert!(!issued.record.disabled);
        assert!(issued.record.expires_at > issued.record.created_at);
        assert!(issued.share_url.ends_with(issued.record.token.as_str()));

        Ok(())
    }

    #[tokio::test]
    async fn issue_against_unknown_rfq_is_subject_not_found() {
        let repository = Arc::new(InMemoryLinkRepository::new());
        let svc = LinksService::new(repository, LinkSettings::default());

        let result = svc.issue(RfqUuid::new(), IssueLinkRequest::default()).await;

        assert!(
            matches!(result, Err(LinkServiceError::SubjectNotFound)),
            "expected SubjectNotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn resolve_valid_link_records_access() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();
        let issued = svc.issue(rfq_uuid, IssueLinkRequest::default()).await?;

        let resolved = svc.resolve(issued.record.token.as_str(), CLIENT_IP).await?;

        assert_eq!(resolved.rfq_uuid, rfq_uuid);
        assert_eq!(resolved.record.access_count, 1);
        assert!(resolved.record.first_access_at.is_some());
        assert_eq!(
            resolved.record.last_access_ip.as_deref(),
            Some("203.0.113.7")
        );

        Ok(())
    }

    #[tokio::test]
    async fn one_time_link_is_valid_then_consumed() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();
        let issued = svc
            .issue(
                rfq_uuid,
                IssueLinkRequest {
                    ttl_ms: None,
                    one_time: Some(true),
                },
            )
            .await?;
        let token = issued.record.token.as_str();

        let first = svc.resolve(token, CLIENT_IP).await?;
        assert_eq!(first.record.access_count, 1);

        let second = svc.resolve(token, CLIENT_IP).await;
        assert!(
            matches!(second, Err(LinkServiceError::Consumed)),
            "expected Consumed, got {second:?}"
        );

        // The failed check wrote nothing.
        let record = svc.inspect(token).await?;
        assert_eq!(record.access_count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn expired_link_resolves_expired_without_mutation() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();
        let issued = svc
            .issue_with_ttl(rfq_uuid, SignedDuration::from_millis(-1000), false)
            .await?;
        let token = issued.record.token.as_str();

        let result = svc.resolve(token, CLIENT_IP).await;
        assert!(
            matches!(result, Err(LinkServiceError::Expired)),
            "expected Expired, got {result:?}"
        );
        if let Err(error) = result {
            assert_eq!(error.status(), 410);
        }

        let record = svc.inspect(token).await?;
        assert_eq!(record.access_count, 0);
        assert!(record.first_access_at.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn negative_ttl_request_falls_back_to_default_and_resolves() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();

        // Through the public issuance path a bad ttl is policy-corrected,
        // so the link is live.
        let issued = svc
            .issue(
                rfq_uuid,
                IssueLinkRequest {
                    ttl_ms: Some(-1000),
                    one_time: None,
                },
            )
            .await?;

        svc.resolve(issued.record.token.as_str(), CLIENT_IP).await?;

        Ok(())
    }

    #[tokio::test]
    async fn access_count_tracks_successful_resolutions_only() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();
        let issued = svc.issue(rfq_uuid, IssueLinkRequest::default()).await?;
        let token = issued.record.token.as_str();

        let first = svc.resolve(token, CLIENT_IP).await?;
        let first_access_at = first.record.first_access_at;

        for _ in 0..2 {
            svc.resolve(token, OTHER_IP).await?;
        }

        let record = svc.inspect(token).await?;
        assert_eq!(record.access_count, 3);
        assert_eq!(
            record.first_access_at, first_access_at,
            "first_access_at must not move after the first resolution"
        );
        assert_eq!(record.last_access_ip.as_deref(), Some("198.51.100.2"));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (svc, _) = service_with_rfq();
        let token = "0".repeat(64);

        let result = svc.resolve(&token, CLIENT_IP).await;

        assert!(
            matches!(result, Err(LinkServiceError::NotFound)),
            "expected NotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn malformed_token_rejected_before_any_repository_call() {
        // A mock with no expectations panics on any call, proving the
        // store is never consulted for malformed input.
        let repository = Arc::new(MockLinkRepository::new());
        let svc = LinksService::new(repository, LinkSettings::default());

        for raw in ["", "not-hex", "XYZ", &"Z".repeat(64), &"a".repeat(63)] {
            let result = svc.resolve(raw, CLIENT_IP).await;

            match result {
                Err(error @ LinkServiceError::MalformedToken(_)) => {
                    assert_eq!(error.status(), 400);
                }
                other => panic!("expected MalformedToken, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn invalidate_disables_link_permanently() -> TestResult {
        let (svc, rfq_uuid) = service_with_rfq();
        let issued = svc.issue(rfq_uuid, IssueLinkRequest::default()).await?;
        let token = issued.record.token.as_str();

        let invalidated = svc.invalidate(token).await?;
        assert!(invalidated.disabled);
        assert!(invalidated.expires_at <= Timestamp::now());

        let result = svc.resolve(token, CLIENT_IP).await;
        assert!(
            matches!(result, Err(LinkServiceError::Disabled)),
            "expected Disabled, got {result:?}"
        );

        // Idempotent by token.
        let again = svc.invalidate(token).await?;
        assert!(again.disabled);

        Ok(())
    }

    #[tokio::test]
    async fn invalidate_unknown_token_is_not_found() {
        let (svc, _) = service_with_rfq();

        let result = svc.invalidate(&"f".repeat(64)).await;

        assert!(
            matches!(result, Err(LinkServiceError::NotFound)),
            "expected NotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn concurrent_one_time_resolutions_have_exactly_one_winner() -> TestResult {
        const CONTENDERS: usize = 32;

        let repository = Arc::new(InMemoryLinkRepository::new());
        let rfq_uuid = RfqUuid::new();
        repository.register_rfq(rfq_uuid);
        let svc = Arc::new(LinksService::new(
            Arc::clone(&repository),
            LinkSettings::default(),
        ));

        let issued = svc
            .issue(
                rfq_uuid,
                IssueLinkRequest {
                    ttl_ms: None,
                    one_time: Some(true),
                },
            )
            .await?;
        let token = issued.record.token.as_str().to_owned();

        let mut handles = Vec::with_capacity(CONTENDERS);

        for _ in 0..CONTENDERS {
            let svc = Arc::clone(&svc);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                svc.resolve(&token, CLIENT_IP).await
            }));
        }

        let mut valid = 0;
        let mut consumed = 0;

        for handle in handles {
            match handle.await? {
                Ok(_) => valid += 1,
                Err(LinkServiceError::Consumed) => consumed += 1,
                Err(other) => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(valid, 1, "exactly one resolution may win");
        assert_eq!(consumed, CONTENDERS - 1);

        let record = svc.inspect(&token).await?;
        assert_eq!(record.access_count, 1);

        Ok(())
    }
}
