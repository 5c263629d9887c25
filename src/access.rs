//! Secure link access pipeline.
//!
//! Gates a resolution request in the contracted order: IP throttle, rate
//! limiter, then the validate-and-consume state machine. The throttle
//! outcome is recorded from the resolution result, so repeated presentations
//! of dead tokens from one address eventually earn a temporary ban.

use std::{net::IpAddr, sync::Arc};

use jiff::Timestamp;
use thiserror::Error;

use crate::{
    domain::{
        links::{LinkService, LinkServiceError, SecureLinkMetadata},
        rfqs::{RfqsService, RfqsServiceError, records::RfqRecord},
    },
    ratelimit::{RateLimitDecision, RateLimitPolicy, RateLimiter},
    throttle::{Admission, IpThrottle},
};

/// A fully opened secure link: the business record plus link metadata.
#[derive(Debug, Clone)]
pub struct OpenedLink {
    pub rfq: RfqRecord,
    pub link: SecureLinkMetadata,
}

#[derive(Debug, Error)]
pub enum AccessError {
    /// The address is temporarily banned after repeated failures.
    #[error("too many failed attempts")]
    Banned { retry_after_secs: u64 },

    /// The per-window request budget is spent.
    #[error("rate limit exceeded")]
    RateLimited {
        decision: RateLimitDecision,
        message: &'static str,
    },

    /// The capability itself did not resolve.
    #[error(transparent)]
    Link(#[from] LinkServiceError),

    /// The link resolved but the RFQ collaborator failed.
    #[error("rfq lookup failed")]
    Rfq(#[source] RfqsServiceError),
}

impl AccessError {
    /// HTTP status the out-of-scope routing layer should map this to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Banned { .. } | Self::RateLimited { .. } => 429,
            Self::Link(error) => error.status(),
            Self::Rfq(RfqsServiceError::NotFound) => 404,
            Self::Rfq(_) => 503,
        }
    }
}

/// Composes the abuse-mitigation gates around link resolution.
pub struct AccessGateway {
    throttle: IpThrottle,
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    links: Arc<dyn LinkService>,
    rfqs: Arc<dyn RfqsService>,
}

impl AccessGateway {
    #[must_use]
    pub fn new(
        throttle: IpThrottle,
        limiter: RateLimiter,
        links: Arc<dyn LinkService>,
        rfqs: Arc<dyn RfqsService>,
    ) -> Self {
        Self {
            throttle,
            limiter,
            policy: RateLimitPolicy::secure_links(),
            links,
            rfqs,
        }
    }

    /// Resolve `raw_token` for a request from `ip` and fetch its RFQ.
    ///
    /// # Errors
    ///
    /// `Banned` and `RateLimited` short-circuit before the token is looked
    /// at; `Link` carries every resolution failure; `Rfq` a collaborator
    /// fault after a successful resolution.
    pub async fn open_link(&self, raw_token: &str, ip: IpAddr) -> Result<OpenedLink, AccessError> {
        let now = Timestamp::now();

        if let Admission::Banned { retry_after_secs } = self.throttle.admit(ip, now) {
            return Err(AccessError::Banned { retry_after_secs });
        }

        let decision = self
            .limiter
            .try_consume(&self.policy, &ip.to_string(), now)
            .await;

        if !decision.allowed {
            return Err(AccessError::RateLimited {
                decision,
                message: self.policy.message,
            });
        }

        let resolved = match self.links.resolve(raw_token, ip).await {
            Ok(resolved) => {
                self.throttle.record_outcome(ip, true, now);
                resolved
            }
            Err(error) => {
                if let LinkServiceError::Store(cause) = &error {
                    tracing::error!(
                        error = cause as &dyn std::error::Error,
                        "link store unavailable during resolution"
                    );
                }

                self.throttle.record_outcome(ip, false, now);
                return Err(error.into());
            }
        };

        let rfq = self
            .rfqs
            .get_rfq(resolved.rfq_uuid)
            .await
            .map_err(AccessError::Rfq)?;

        Ok(OpenedLink {
            rfq,
            link: SecureLinkMetadata::from(&resolved.record),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use testresult::TestResult;

    use super::*;
    use crate::{
        domain::{
            links::{InMemoryLinkRepository, IssueLinkRequest, LinkSettings, LinksService},
            rfqs::{MockRfqsService, records::RfqUuid},
        },
        ratelimit::LocalCounterStore,
        test::sample_rfq,
        throttle::ThrottleConfig,
    };

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

    struct Fixture {
        gateway: AccessGateway,
        rfq_uuid: RfqUuid,
        links: Arc<LinksService<InMemoryLinkRepository>>,
    }

    fn fixture(limiter: RateLimiter) -> Fixture {
        let repository = Arc::new(InMemoryLinkRepository::new());
        let rfq_uuid = RfqUuid::new();
        repository.register_rfq(rfq_uuid);

        let links = Arc::new(LinksService::new(repository, LinkSettings::default()));

        let mut rfqs = MockRfqsService::new();
        rfqs.expect_get_rfq()
            .returning(|uuid| Ok(sample_rfq(uuid)));

        Fixture {
            gateway: AccessGateway::new(
                IpThrottle::new(ThrottleConfig::default()),
                limiter,
                Arc::clone(&links) as Arc<dyn LinkService>,
                Arc::new(rfqs),
            ),
            rfq_uuid,
            links,
        }
    }

    async fn issue_token(fixture: &Fixture) -> Result<String, LinkServiceError> {
        let issued = fixture
            .links
            .issue(fixture.rfq_uuid, IssueLinkRequest::default())
            .await?;

        Ok(issued.record.token.as_str().to_owned())
    }

    #[tokio::test]
    async fn valid_token_opens_the_rfq() -> TestResult {
        let fixture = fixture(RateLimiter::unbacked());
        let token = issue_token(&fixture).await?;

        let opened = fixture.gateway.open_link(&token, IP).await?;

        assert_eq!(opened.rfq.uuid, fixture.rfq_uuid);
        assert_eq!(opened.link.access_count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn repeated_failures_earn_a_ban() -> TestResult {
        let fixture = fixture(RateLimiter::unbacked());
        let missing = "e".repeat(64);

        for _ in 0..5 {
            let result = fixture.gateway.open_link(&missing, IP).await;
            assert!(matches!(result, Err(AccessError::Link(_))));
        }

        let result = fixture.gateway.open_link(&missing, IP).await;
        match result {
            Err(error @ AccessError::Banned { retry_after_secs }) => {
                assert!(retry_after_secs > 0);
                assert_eq!(error.status(), 429);
            }
            other => panic!("expected Banned, got {other:?}"),
        }

        // The ban gates valid tokens from that address too.
        let token = issue_token(&fixture).await?;
        assert!(matches!(
            fixture.gateway.open_link(&token, IP).await,
            Err(AccessError::Banned { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn success_resets_the_failure_streak() -> TestResult {
        let fixture = fixture(RateLimiter::unbacked());
        let missing = "e".repeat(64);
        let token = issue_token(&fixture).await?;

        for _ in 0..4 {
            let _failed = fixture.gateway.open_link(&missing, IP).await;
        }

        fixture.gateway.open_link(&token, IP).await?;

        // Streak restarted; four more failures stay under the threshold.
        for _ in 0..4 {
            let result = fixture.gateway.open_link(&missing, IP).await;
            assert!(
                matches!(result, Err(AccessError::Link(_))),
                "expected a link failure, got {result:?}"
            );
        }

        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_denies_with_429_and_reset_metadata() -> TestResult {
        let fixture = fixture(RateLimiter::new(Arc::new(LocalCounterStore::new())));
        let token = issue_token(&fixture).await?;

        // Secure link policy allows 20 per window.
        for _ in 0..20 {
            fixture.gateway.open_link(&token, IP).await?;
        }

        let result = fixture.gateway.open_link(&token, IP).await;
        match result {
            Err(error @ AccessError::RateLimited { decision, message }) => {
                assert_eq!(error.status(), 429);
                assert_eq!(decision.remaining, 0);
                assert!(decision.reset_at.is_some());
                assert!(message.contains("slow down"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn absent_shared_cache_never_produces_429() -> TestResult {
        let fixture = fixture(RateLimiter::unbacked());
        let token = issue_token(&fixture).await?;

        for _ in 0..50 {
            fixture.gateway.open_link(&token, IP).await?;
        }

        Ok(())
    }
}
