//! Common error types shared across crates.

use thiserror::Error;

/// Error returned by an external collaborator (CRM, directory, service catalog).
///
/// The cache layer never inspects the message; it either logs the error at the
/// refresh boundary or hands it back to the reader that triggered a fill.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The remote system could not be reached or timed out.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}
