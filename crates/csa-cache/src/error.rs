//! Errors surfaced to readers of the caches.

use common::{model::UnsupportedLanguage, ServiceError};
use thiserror::Error;

/// Errors returned by cache lookups.
///
/// Refresh failures never appear here: they are logged by the refresher and
/// the previous snapshot keeps being served.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The caller asked for a language the catalog is not published in.
    /// This is a caller bug, not a cache miss.
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),

    /// A read-through fill for `key` failed at the external collaborator.
    #[error("failed to load {key} from the directory")]
    Fill {
        key: String,
        #[source]
        source: ServiceError,
    },
}
