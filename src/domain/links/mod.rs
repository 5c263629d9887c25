//! Secure link access control.

mod data;
mod errors;
mod records;
mod repository;
mod service;
mod token;

pub use data::*;
pub use errors::*;
pub use records::*;
pub use repository::*;
pub use service::*;
pub use token::*;
