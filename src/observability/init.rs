//! Tracing initialization and subscriber setup.

use super::exporter;
use opentelemetry::trace::TracerProvider as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "mapweave";

/// Tracing options, the `[trace]` table of the map options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Filter directive such as `debug` or `mapweave=trace`. Default: `"info"`.
    pub level: Option<String>,

    /// JSON-lines span file. Without it, events are logged to stderr.
    pub file: Option<PathBuf>,
}

/// Installs the global tracing subscriber.
///
/// With a trace file, spans go through an OpenTelemetry layer whose exporter
/// appends one JSON line per batch to the file; otherwise events are
/// formatted to stderr.
///
/// # Initialization Behavior
///
/// - Creates the trace file's directory if it doesn't exist
/// - Silently returns if the directory cannot be created
/// - Idempotent: only the first successful call installs a subscriber
///
/// # Examples
///
/// ```no_run
/// use mapweave::observability::{init_tracing, TraceConfig};
/// use std::path::PathBuf;
///
/// init_tracing(&TraceConfig {
///     level: Some("mapweave=debug".to_string()),
///     file: Some(PathBuf::from("/tmp/mapweave/spans.json")),
/// });
/// ```
pub fn init_tracing(config: &TraceConfig) {
    let level = config
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let Some(file) = config.file.clone() else {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(level))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
        return;
    };

    if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
        if std::fs::create_dir_all(dir).is_err() {
            return;
        }
    }

    let provider = exporter::tracer_provider(file, SERVICE_NAME);
    let tracer = provider.tracer(SERVICE_NAME);
    let otel_layer = OpenTelemetryLayer::new(tracer);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(otel_layer);

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritable_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        init_tracing(&TraceConfig {
            level: Some("debug".to_string()),
            file: Some(blocker.join("spans.json")),
        });
    }

    #[test]
    fn repeated_initialization_is_harmless() {
        let config = TraceConfig::default();
        init_tracing(&config);
        init_tracing(&config);
        tracing::debug!("still logging");
    }
}
