//! Shared application domain and persistence modules.

pub mod access;
pub mod context;
pub mod database;
pub mod domain;
pub mod ratelimit;
pub mod throttle;

#[cfg(test)]
mod test;

mod uuids;
