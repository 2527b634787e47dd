//! File-based OpenTelemetry span exporter.
//!
//! Each exported batch becomes one JSON line:
//!
//! ```json
//! {"service":"mapweave","spans":[{"name":"attach","traceId":"…","spanId":"…",
//!   "parentSpanId":"","startTimeUnixNano":"…","endTimeUnixNano":"…",
//!   "attributes":{"entity":"entity-3"}}]}
//! ```

use futures_util::future::BoxFuture;
use opentelemetry::trace::{SpanId, TraceError};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Appends span batches to a JSON-lines file.
pub(crate) struct JsonLinesExporter {
    path: PathBuf,
    service: String,
    /// Opened on first export.
    file: Mutex<Option<File>>,
    is_shutdown: AtomicBool,
}

impl JsonLinesExporter {
    /// An exporter appending to `path`, tagging each batch with `service`.
    /// The file is not touched until the first export.
    pub(crate) fn new(path: PathBuf, service: impl Into<String>) -> Self {
        Self {
            path,
            service: service.into(),
            file: Mutex::new(None),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Appends `line` and flushes, opening the file if needed.
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("Mutex poisoned: {e}")))?;
        if file.is_none() {
            *file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        let handle = file
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No file available"))?;
        writeln!(handle, "{line}")?;
        handle.flush()
    }

    fn format_batch(&self, batch: &[SpanData]) -> JsonValue {
        json!({
            "service": self.service,
            "spans": batch.iter().map(format_span).collect::<Vec<_>>(),
        })
    }
}

/// Nanoseconds since the epoch as a decimal string, `"0"` before it.
fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos()
        .to_string()
}

/// One span in OTLP-style field names. Root spans get an empty parent id.
fn format_span(span: &SpanData) -> JsonValue {
    let parent = if span.parent_span_id == SpanId::INVALID {
        String::new()
    } else {
        format!("{:016x}", span.parent_span_id)
    };
    json!({
        "name": span.name,
        "traceId": format!("{:032x}", span.span_context.trace_id()),
        "spanId": format!("{:016x}", span.span_context.span_id()),
        "parentSpanId": parent,
        "startTimeUnixNano": unix_nanos(span.start_time),
        "endTimeUnixNano": unix_nanos(span.end_time),
        "attributes": format_attributes(&span.attributes),
    })
}

fn format_attributes(attributes: &[KeyValue]) -> JsonValue {
    let map: JsonMap<String, JsonValue> = attributes
        .iter()
        .map(|kv| (kv.key.to_string(), format_value(&kv.value)))
        .collect();
    JsonValue::Object(map)
}

/// Scalar attributes map to JSON scalars; arrays are stringified.
fn format_value(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => json!(b),
        Value::I64(i) => json!(i),
        Value::F64(f) => json!(f),
        Value::String(s) => json!(s.as_str()),
        Value::Array(_) => json!(format!("{value:?}")),
    }
}

impl SpanExporter for JsonLinesExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(std::future::ready(Err(TraceError::from(
                "exporter is shut down",
            ))));
        }

        let line = self.format_batch(&batch).to_string();
        let result = self
            .write_line(&line)
            .map_err(|e| TraceError::from(e.to_string()));
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for JsonLinesExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesExporter")
            .field("path", &self.path)
            .field("is_shutdown", &self.is_shutdown)
            .finish_non_exhaustive()
    }
}

/// A tracer provider exporting every finished span to `path`.
pub(crate) fn tracer_provider(path: PathBuf, service: &str) -> TracerProvider {
    let resource = Resource::new(vec![KeyValue::new("service.name", service.to_string())]);
    let exporter = JsonLinesExporter::new(path, service);

    TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .with_simple_exporter(exporter)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_keep_their_json_type() {
        let attributes = format_attributes(&[
            KeyValue::new("event", "click"),
            KeyValue::new("handlers", 2_i64),
            KeyValue::new("claimed", true),
        ]);
        assert_eq!(attributes, json!({"event": "click", "handlers": 2, "claimed": true}));
    }

    #[test]
    fn write_line_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.json");
        let exporter = JsonLinesExporter::new(path.clone(), "test");
        exporter.write_line("{\"a\":1}").unwrap();
        exporter.write_line("{\"a\":2}").unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
