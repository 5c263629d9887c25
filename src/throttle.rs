//! Per-IP failure throttling.
//!
//! Tracks consecutive failed requests per client address and imposes
//! temporary bans. Process-local by design; this is the outer gate in front
//! of every token-bearing request and is orthogonal to token validity.
//! Bans expire purely by wall-clock comparison at the next observation;
//! there is no background sweep.

use std::{
    net::IpAddr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use jiff::{SignedDuration, Timestamp};
use rustc_hash::FxHashMap;
use tracing::warn;

/// Throttle policy knobs.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Consecutive failures that trigger a ban.
    pub max_failures: u32,

    /// How long a ban lasts.
    pub ban_duration: SignedDuration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            ban_duration: SignedDuration::from_mins(10),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ThrottleEntry {
    failures: u32,
    banned_until: Option<Timestamp>,
}

impl ThrottleEntry {
    fn active_ban(&self, now: Timestamp) -> Option<Timestamp> {
        self.banned_until.filter(|until| *until > now)
    }

    /// Lazily reset an expired ban on observation.
    fn refresh(&mut self, now: Timestamp) {
        if self.banned_until.is_some_and(|until| until <= now) {
            self.banned_until = None;
            self.failures = 0;
        }
    }
}

/// Admission decision for a client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Banned { retry_after_secs: u64 },
}

const PURGE_THRESHOLD: usize = 4096;

/// Consecutive-failure tracker with temporary bans.
#[derive(Debug, Default)]
pub struct IpThrottle {
    config: ThrottleConfig,
    entries: Mutex<FxHashMap<IpAddr, ThrottleEntry>>,
}

impl IpThrottle {
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Gate a request from `ip` at `now`.
    pub fn admit(&self, ip: IpAddr, now: Timestamp) -> Admission {
        let mut entries = self.lock();

        // Sustained traffic from distinct addresses must not pin dead
        // entries forever.
        if entries.len() >= PURGE_THRESHOLD {
            entries.retain(|_, entry| entry.failures > 0 || entry.active_ban(now).is_some());
        }

        let entry = entries.entry(ip).or_default();

        entry.refresh(now);

        match entry.active_ban(now) {
            Some(until) => Admission::Banned {
                retry_after_secs: remaining_secs(until, now),
            },
            None => Admission::Allowed,
        }
    }

    /// Record the outcome of a request from `ip`.
    ///
    /// A success clears the failure streak. A failure while a ban is active
    /// is a no-op and does not extend the ban.
    pub fn record_outcome(&self, ip: IpAddr, success: bool, now: Timestamp) {
        let mut entries = self.lock();
        let entry = entries.entry(ip).or_default();

        entry.refresh(now);

        if success {
            // An active ban is never lifted early; only stale state clears.
            if entry.active_ban(now).is_none() {
                entry.failures = 0;
                entry.banned_until = None;
            }
            return;
        }

        if entry.active_ban(now).is_some() {
            return;
        }

        entry.failures += 1;

        if entry.failures >= self.config.max_failures {
            let until = now
                .saturating_add(self.config.ban_duration)
                .unwrap_or(Timestamp::MAX);

            entry.banned_until = Some(until);
            entry.failures = 0;
            warn!(%ip, "client address banned after repeated failures");
        }
    }

    /// Seconds remaining on an active ban, zero when not banned.
    #[must_use]
    pub fn ban_remaining_secs(&self, ip: IpAddr, now: Timestamp) -> u64 {
        let entries = self.lock();

        entries
            .get(&ip)
            .and_then(|entry| entry.active_ban(now))
            .map_or(0, |until| remaining_secs(until, now))
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<IpAddr, ThrottleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remaining whole seconds until `until`, rounded up.
fn remaining_secs(until: Timestamp, now: Timestamp) -> u64 {
    let millis = until.duration_since(now).as_millis();

    if millis <= 0 {
        return 0;
    }

    ((millis + 999) / 1000).unsigned_abs() as u64
}
