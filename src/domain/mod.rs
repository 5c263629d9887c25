//! Domain modules.

pub mod links;
pub mod rfqs;
