//! Structured logging and optional span export.
//!
//! Logs are always written as JSON to stdout. When an OTLP endpoint is
//! configured, spans (including the per-cycle `cache_refresh` span) are also
//! exported over OTLP/gRPC.
//!
//! Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//! takes precedence when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
