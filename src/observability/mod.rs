//! OpenTelemetry-based observability with file-based trace export.
//!
//! Every module logs through `tracing`. Attach/detach, visibility, unit,
//! refresh and attribution operations open `debug` spans; backend dispatch
//! and arbitration decisions log at `trace`.
//!
//! # Architecture
//!
//! ```text
//! tracing spans → tracing-opentelemetry → OpenTelemetry SDK → JsonLinesExporter → file
//! ```
//!
//! # Configuration
//!
//! The filter comes from [`TraceConfig::level`] (default `"info"`), so the
//! `[trace]` table of the map options controls verbosity:
//!
//! ```rust
//! use mapweave::observability::{init_tracing, TraceConfig};
//!
//! init_tracing(&TraceConfig {
//!     level: Some("mapweave=debug".to_string()),
//!     file: None,
//! });
//!
//! tracing::debug!("tracing is now active");
//! ```
//!
//! # Modules
//!
//! - [`init`]: Subscriber setup
//! - `exporter`: JSON-lines span exporter and tracer provider (internal)

mod exporter;
pub mod init;

pub use init::{init_tracing, TraceConfig};
