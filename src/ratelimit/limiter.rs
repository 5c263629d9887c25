//! Fixed-window rate limiter over a pluggable [`CounterStore`].
//!
//! Policy on a missing or failing backend is fail-open: the primary
//! function must not depend on an optional infrastructure component, so
//! requests pass unlimited rather than being rejected.

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use tracing::{debug, warn};

use crate::ratelimit::counter::CounterStore;

/// One named rate-limit policy.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Key namespace, e.g. `"rfq"` or `"secure"`.
    pub namespace: &'static str,

    /// Window length.
    pub window: SignedDuration,

    /// Maximum operations per window per key.
    pub limit: u64,

    /// User-facing denial message.
    pub message: &'static str,
}

impl RateLimitPolicy {
    /// RFQ form submissions.
    #[must_use]
    pub const fn rfq_submission() -> Self {
        Self {
            namespace: "rfq",
            window: SignedDuration::from_secs(60),
            limit: 5,
            message: "Too many RFQ submissions from this IP. Try again in a minute.",
        }
    }

    /// Secure link resolutions.
    #[must_use]
    pub const fn secure_links() -> Self {
        Self {
            namespace: "secure",
            window: SignedDuration::from_secs(60),
            limit: 20,
            message: "Too many secure link requests from this IP. Please slow down.",
        }
    }
}

/// Outcome of a rate-limit check, carrying the standard header values.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Option<Timestamp>,
}

impl RateLimitDecision {
    fn open(limit: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at: None,
        }
    }
}

/// Fixed-window rate limiter.
///
/// The counter increments even on denied requests; counters are never
/// rolled back, matching a plain fixed-window policy.
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A limiter with no backend; every check passes.
    #[must_use]
    pub fn unbacked() -> Self {
        Self { store: None }
    }

    /// Count one operation for `key` under `policy` and decide.
    pub async fn try_consume(
        &self,
        policy: &RateLimitPolicy,
        key: &str,
        now: Timestamp,
    ) -> RateLimitDecision {
        let Some(store) = &self.store else {
            return RateLimitDecision::open(policy.limit);
        };

        let namespaced = format!("rl:{}:{key}", policy.namespace);

        match store.increment(&namespaced, policy.window, now).await {
            Ok(counter) => {
                let allowed = counter.hits <= policy.limit;

                if !allowed {
                    debug!(
                        namespace = policy.namespace,
                        key, hits = counter.hits, "rate limit exceeded"
                    );
                }

                RateLimitDecision {
                    allowed,
                    limit: policy.limit,
                    remaining: policy.limit.saturating_sub(counter.hits),
                    reset_at: Some(counter.reset_at),
                }
            }
            Err(error) => {
                // Fail open: the counter backend is optional infrastructure.
                warn!(
                    namespace = policy.namespace,
                    key,
                    error = &error as &dyn std::error::Error,
                    "counter store unavailable; allowing request"
                );

                RateLimitDecision::open(policy.limit)
            }
        }
    }
}
