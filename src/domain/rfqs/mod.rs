//! RFQ business records (external collaborator interface).

pub mod data;
mod errors;
pub mod records;
mod repository;
mod service;

pub use errors::*;
pub use service::*;
