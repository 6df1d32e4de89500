//! Read-through cache over the service registry.
//!
//! # Lifecycle
//!
//! 1. A lookup for an identity provider not seen before calls the directory
//!    synchronously and remembers the answer, even when it is empty.
//! 2. Every refresh cycle re-queries the directory for each identity provider
//!    seen so far and overwrites the remembered answers in place.
//! 3. Identity providers nobody asked about are never fetched, so refresh cost
//!    follows actual traffic rather than the size of the registry.
//!
//! An identity provider without linked services and one that was never
//! populated look the same to readers once a lookup has happened.

pub mod cache;

pub use cache::ProviderCache;
