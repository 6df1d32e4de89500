//! Common value types and errors shared across the csa cache crates.

pub mod error;
pub mod model;

pub use error::ServiceError;
pub use model::{Article, IdentityProvider, Language, License, MappingEntry, Service};
