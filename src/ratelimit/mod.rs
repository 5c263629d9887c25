//! Fixed-window rate limiting over pluggable counter stores.

mod counter;
mod limiter;

pub use counter::*;
pub use limiter::*;
