//! Scheduled in-memory caches in front of slow backends.
//!
//! Three caches share one refresh mechanism ([`refresh`]):
//!
//! - [`ServicesCache`]: the whole service catalog per language, replaced
//!   wholesale every cycle.
//! - [`ProviderCache`]: linked service ids per identity provider, filled on
//!   first request and refreshed in the background afterwards.
//! - [`CrmCache`]: licenses over the institution × service cross product and
//!   one article per service, published together.

pub mod clients;
pub mod config;
pub mod crm;
pub mod error;
pub mod provider;
pub mod refresh;
pub mod services;
pub mod telemetry;

pub use crm::CrmCache;
pub use error::CacheError;
pub use provider::ProviderCache;
pub use refresh::RefreshSchedule;
pub use services::ServicesCache;
