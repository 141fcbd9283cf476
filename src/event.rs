//! Event records forwarded to sinks.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field holding the (possibly multi-line) log text.
pub const FIELD_MESSAGE: &str = "message";
/// Field holding the declared input type.
pub const FIELD_TYPE: &str = "type";
/// Field holding the source file path.
pub const FIELD_PATH: &str = "path";
/// Field holding the shipping host name.
pub const FIELD_HOST: &str = "host";
/// Field holding the assembly time (RFC 3339, UTC).
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Static metadata of a tracked input, attached to every event it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSource {
    /// Canonical path of the tracked file.
    pub path: PathBuf,
    /// Declared type label.
    pub kind: String,
    /// Extra fields merged into events that lack them.
    pub extra_fields: Map<String, Value>,
}

impl EventSource {
    /// Create a source with no extra fields.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
            extra_fields: Map::new(),
        }
    }

    /// Attach extra fields.
    #[must_use]
    pub fn with_extra_fields(mut self, extra_fields: Map<String, Value>) -> Self {
        self.extra_fields = extra_fields;
        self
    }
}

/// One logical log event with its merged field set.
///
/// Provenance fields come first, in a fixed order, followed by any extra
/// fields that did not collide with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventRecord {
    fields: Map<String, Value>,
}

impl EventRecord {
    /// Build a record for `message` read from `source`, stamped with the current time.
    #[must_use]
    pub fn new(message: impl Into<String>, source: &EventSource, host: &str) -> Self {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut fields = Map::new();
        fields.insert(FIELD_MESSAGE.to_string(), Value::String(message.into()));
        fields.insert(FIELD_TYPE.to_string(), Value::String(source.kind.clone()));
        fields.insert(
            FIELD_PATH.to_string(),
            Value::String(source.path.display().to_string()),
        );
        fields.insert(FIELD_HOST.to_string(), Value::String(host.to_string()));
        fields.insert(FIELD_TIMESTAMP.to_string(), Value::String(timestamp));

        for (key, value) in &source.extra_fields {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Self { fields }
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The event text.
    #[must_use]
    pub fn message(&self) -> &str {
        self.str_field(FIELD_MESSAGE)
    }

    /// The declared input type.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.str_field(FIELD_TYPE)
    }

    /// The source file path.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        Path::new(self.str_field(FIELD_PATH))
    }

    /// The full ordered field set.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

/// Name of the local host, used for the `host` field.
#[cfg(unix)]
#[must_use]
pub fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Name of the local host, used for the `host` field.
#[cfg(not(unix))]
#[must_use]
pub fn local_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}
