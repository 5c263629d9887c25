//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    access::AccessGateway,
    database,
    domain::{
        links::{LinkService, LinkSettings, LinksService, PgLinkRepository},
        rfqs::{PgRfqsService, RfqsService},
    },
    ratelimit::{CounterStore, CounterStoreError, RateLimiter, RedisCounterStore},
    throttle::{IpThrottle, ThrottleConfig},
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

/// Dependency-injected service container, constructed once at process start.
///
/// Holds every piece of process-wide shared mutable state (link store pool,
/// throttle map, counter store); nothing in the subsystem reaches for
/// ambient globals, so tests can build isolated instances.
#[derive(Clone)]
pub struct AppContext {
    pub links: Arc<dyn LinkService>,
    pub rfqs: Arc<dyn RfqsService>,
    pub access: Arc<AccessGateway>,
}

impl AppContext {
    /// Build application context from a database URL and an optional shared
    /// cache URL.
    ///
    /// A missing or unreachable cache is not fatal: rate limiting fails
    /// open and the rest of the application runs unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_urls(
        database_url: &str,
        cache_url: Option<&str>,
        settings: LinkSettings,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(database_url)
            .await
            .map_err(AppInitError::Database)?;

        let links: Arc<dyn LinkService> = Arc::new(LinksService::new(
            Arc::new(PgLinkRepository::new(pool.clone())),
            settings,
        ));
        let rfqs: Arc<dyn RfqsService> = Arc::new(PgRfqsService::new(pool));

        let limiter = match connect_counter_store(cache_url).await {
            Some(store) => RateLimiter::new(store),
            None => RateLimiter::unbacked(),
        };

        let access = Arc::new(AccessGateway::new(
            IpThrottle::new(ThrottleConfig::default()),
            limiter,
            Arc::clone(&links),
            Arc::clone(&rfqs),
        ));

        Ok(Self {
            links,
            rfqs,
            access,
        })
    }
}

async fn connect_counter_store(cache_url: Option<&str>) -> Option<Arc<dyn CounterStore>> {
    let url = cache_url?;

    match RedisCounterStore::connect(url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(CounterStoreError::Backend(error)) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "shared counter cache unavailable; rate limiting is disabled"
            );

            None
        }
    }
}
