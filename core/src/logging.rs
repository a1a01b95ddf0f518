// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Logging facilities.
//!
//! All code logs through the `log` facade.  This module configures `env_logger` as the backend
//! and offers a `Logger` abstraction for components that need to attach structured tags to their
//! messages, such as the request logger.  Tags are redacted before they are emitted so that
//! secrets that sneak into them do not end up in the logs.

use log::kv::{Key, Source};
use log::{Level, LevelFilter, Record};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Name of the key-value pair in log records that carries the JSON-encoded tags.
const TAGS_KEY: &str = "tags";

/// Replacement for the values of redacted fields.
const REDACTED: &str = "redacted";

/// Structured tags attached to a log message.
pub type Tags = Map<String, Value>;

/// Format of the log lines.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly lines such as `[INFO] message {"tag":"value"}`.
    #[default]
    Console,

    /// One JSON object per line.
    Json,
}

/// Deserializes a `LevelFilter` from its textual name.
fn deserialize_level<'de, D: serde::Deserializer<'de>>(d: D) -> Result<LevelFilter, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse::<LevelFilter>().map_err(serde::de::Error::custom)
}

/// Configuration options for logging.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingOptions {
    /// Format of the log lines.
    pub format: LogFormat,

    /// Minimum level of the messages to emit.
    #[serde(deserialize_with = "deserialize_level")]
    pub level: LevelFilter,

    /// Names of the tags whose values must never be logged.  Matching is case-insensitive and a
    /// tag matches if its name contains any of these.
    pub redact_fields: Vec<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Console,
            level: LevelFilter::Info,
            redact_fields: vec!["password".to_owned(), "secret".to_owned(), "token".to_owned()],
        }
    }
}

impl LoggingOptions {
    /// Creates a new set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_FORMAT`, `<prefix>_LEVEL` and
    /// `<prefix>_REDACT_FIELDS`, the latter being a comma-separated list.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let defaults = Self::default();

        let format = match crate::env::get_optional_var::<String>(prefix, "FORMAT")? {
            None => defaults.format,
            Some(raw) => match raw.as_str() {
                "console" => LogFormat::Console,
                "json" => LogFormat::Json,
                _ => return Err(format!("Invalid log format '{}'", raw)),
            },
        };

        let level = match crate::env::get_optional_var::<String>(prefix, "LEVEL")? {
            None => defaults.level,
            Some(raw) => {
                raw.parse::<LevelFilter>()
                    .map_err(|e| format!("Invalid log level '{}': {}", raw, e))?
            }
        };

        let redact_fields = match crate::env::get_optional_var::<String>(prefix, "REDACT_FIELDS")? {
            None => defaults.redact_fields,
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        };

        Ok(Self { format, level, redact_fields })
    }
}

/// Extracts the tags attached to `record`, if any.
fn record_tags(record: &Record) -> Option<Value> {
    let raw = record.key_values().get(Key::from(TAGS_KEY))?.to_string();
    serde_json::from_str(&raw).ok()
}

/// Formats `record` as a console line.
fn format_console(buf: &mut impl Write, record: &Record) -> std::io::Result<()> {
    match record_tags(record) {
        Some(tags) => writeln!(buf, "[{}] {} {}", record.level(), record.args(), tags),
        None => writeln!(buf, "[{}] {}", record.level(), record.args()),
    }
}

/// Formats `record` as a JSON line.
fn format_json(buf: &mut impl Write, record: &Record) -> std::io::Result<()> {
    let time = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    let line = serde_json::json!({
        "level": record.level().as_str(),
        "msg": record.args().to_string(),
        "target": record.target(),
        "time": time,
        "tags": record_tags(record).unwrap_or_else(|| Value::Object(Map::new())),
    });
    writeln!(buf, "{}", line)
}

/// Installs `env_logger` as the backend of the `log` facade.
///
/// The `RUST_LOG` environment variable, if set, refines the level in `opts`.
pub fn init(opts: &LoggingOptions) -> Result<(), String> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(opts.level);
    builder.parse_default_env();
    match opts.format {
        LogFormat::Console => builder.format(|buf, record| format_console(buf, record)),
        LogFormat::Json => builder.format(|buf, record| format_json(buf, record)),
    };
    builder.try_init().map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Returns a copy of `value` where the values of all object keys that match `fields` have been
/// replaced with a placeholder.
///
/// Objects and arrays are walked recursively.  A key matches if it contains, ignoring case, any
/// of the strings in `fields`.
pub fn redact_json(value: &Value, fields: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::with_capacity(map.len());
            for (key, value) in map {
                let lower_key = key.to_lowercase();
                if fields.iter().any(|f| lower_key.contains(&f.to_lowercase())) {
                    redacted.insert(key.clone(), Value::String(REDACTED.to_owned()));
                } else {
                    redacted.insert(key.clone(), redact_json(value, fields));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(values) => {
            Value::Array(values.iter().map(|v| redact_json(v, fields)).collect())
        }
        other => other.clone(),
    }
}

/// Merges two sets of tags, with the tags in `extra` taking precedence.
pub fn merge_tags(base: &Tags, extra: &Tags) -> Tags {
    let mut merged = base.clone();
    for (key, value) in extra {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Interface for loggers that attach structured tags to their messages.
pub trait Logger: Send + Sync {
    /// Returns a new logger that attaches `tags` to every message on top of the current tags.
    fn with_tags(&self, tags: Tags) -> Arc<dyn Logger>;

    /// Logs `msg` at `level` with an optional error that caused it.
    fn log(&self, level: Level, msg: &str, err: Option<&dyn std::error::Error>);

    /// Logs a debug message.
    fn debug(&self, msg: &str) {
        self.log(Level::Debug, msg, None)
    }

    /// Logs an informational message.
    fn info(&self, msg: &str) {
        self.log(Level::Info, msg, None)
    }

    /// Logs a warning with an optional error that caused it.
    fn warn(&self, msg: &str, err: Option<&dyn std::error::Error>) {
        self.log(Level::Warn, msg, err)
    }

    /// Logs an error with an optional error that caused it.
    fn error(&self, msg: &str, err: Option<&dyn std::error::Error>) {
        self.log(Level::Error, msg, err)
    }
}

/// A logger that forwards messages to the `log` facade.
#[derive(Clone)]
pub struct FacadeLogger {
    /// Target to use in the emitted records.
    target: &'static str,

    /// Tags attached to every message.
    tags: Tags,

    /// Fields to redact from the tags.
    redact_fields: Arc<Vec<String>>,
}

impl FacadeLogger {
    /// Creates a new logger that emits records for `target` and redacts `redact_fields`.
    pub fn new(target: &'static str, redact_fields: Vec<String>) -> Self {
        Self { target, tags: Tags::new(), redact_fields: Arc::from(redact_fields) }
    }
}

impl Logger for FacadeLogger {
    fn with_tags(&self, tags: Tags) -> Arc<dyn Logger> {
        Arc::new(Self {
            target: self.target,
            tags: merge_tags(&self.tags, &tags),
            redact_fields: self.redact_fields.clone(),
        })
    }

    fn log(&self, level: Level, msg: &str, err: Option<&dyn std::error::Error>) {
        let mut tags = self.tags.clone();
        if let Some(err) = err {
            tags.insert("error".to_owned(), Value::String(err.to_string()));
        }
        let tags = redact_json(&Value::Object(tags), &self.redact_fields).to_string();

        let kvs = (TAGS_KEY, tags.as_str());
        let logger = log::logger();
        logger.log(
            &Record::builder()
                .args(format_args!("{}", msg))
                .level(level)
                .target(self.target)
                .key_values(&kvs as &dyn Source)
                .build(),
        );
    }
}

/// Test utilities for logging.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::Mutex;

    /// A log message captured by the `RecorderLogger`.
    #[derive(Clone, Debug, PartialEq)]
    pub struct RecordedLog {
        /// Level of the message.
        pub level: Level,

        /// Tags attached to the message, without redaction.
        pub tags: Tags,

        /// The message itself.
        pub msg: String,

        /// Textual representation of the error attached to the message, if any.
        pub error: Option<String>,
    }

    /// A logger that keeps all messages in memory for later inspection.
    #[derive(Clone, Default)]
    pub struct RecorderLogger {
        /// Tags attached to every message.
        tags: Tags,

        /// Messages recorded so far, shared by all loggers derived from the same root.
        logs: Arc<Mutex<Vec<RecordedLog>>>,
    }

    impl RecorderLogger {
        /// Returns a copy of all messages recorded so far.
        pub fn logs(&self) -> Vec<RecordedLog> {
            self.logs.lock().unwrap().clone()
        }
    }

    impl Logger for RecorderLogger {
        fn with_tags(&self, tags: Tags) -> Arc<dyn Logger> {
            Arc::new(Self { tags: merge_tags(&self.tags, &tags), logs: self.logs.clone() })
        }

        fn log(&self, level: Level, msg: &str, err: Option<&dyn std::error::Error>) {
            self.logs.lock().unwrap().push(RecordedLog {
                level,
                tags: self.tags.clone(),
                msg: msg.to_owned(),
                error: err.map(|e| e.to_string()),
            });
        }
    }
}
