//! Data point messages exchanged with the transport
//!
//! Tuya devices report their state as a JSON object of `{"<code>": value}`
//! pairs. This module decodes such maps into a [`RobovacStatus`] through a
//! model's [`ModelRegistry`], and encodes validated writes back into wire
//! requests.

use crate::{
    error::{Result, RobovacError},
    registry::{CommandSpec, ModelRegistry},
    types::{Command, CommandValue, RobovacStatus, StringValue, ValueKind},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt::Write as _};
use tracing::{debug, warn};

/// Map of data point codes to raw values, as sent by the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DpsMessage {
    /// Raw values keyed by the decimal data point code
    #[serde(default)]
    pub dps: HashMap<String, Value>,
}

impl DpsMessage {
    /// Create a message from `(code, value)` pairs
    #[must_use]
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (u32, Value)>,
    {
        Self {
            dps: values
                .into_iter()
                .map(|(code, value)| (code.to_string(), value))
                .collect(),
        }
    }

    /// Entries with a numeric code, sorted by code
    ///
    /// Keys that are not decimal numbers are returned separately.
    #[must_use]
    pub fn entries(&self) -> (Vec<(u32, &Value)>, Vec<(&str, &Value)>) {
        let mut numeric = Vec::with_capacity(self.dps.len());
        let mut malformed = Vec::new();
        for (key, value) in &self.dps {
            match key.parse::<u32>() {
                Ok(code) => numeric.push((code, value)),
                Err(_) => malformed.push((key.as_str(), value)),
            }
        }
        numeric.sort_by_key(|(code, _)| *code);
        malformed.sort_by_key(|(key, _)| *key);
        (numeric, malformed)
    }
}

/// Write of a single data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    /// Data point code
    pub dps: u32,
    /// Raw value to write
    pub set: Value,
}

/// Events emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session established
    Connected,
    /// Session closed
    Disconnected,
    /// Unsolicited state push
    Data(DpsMessage),
    /// Partial refresh of some data points
    DpRefresh(DpsMessage),
    /// Transport level failure
    Error(String),
}

/// Outcome of decoding one dps map into a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Number of known codes that were decoded
    pub updated: usize,
    /// Commands whose stored value changed
    pub changed: Vec<Command>,
    /// String tokens missing from the model's tables
    pub unmapped: Vec<(Command, String)>,
    /// Codes the model does not know
    pub ignored: Vec<String>,
}

/// Decode a raw value according to its spec
///
/// Never fails: a value of the wrong JSON type is kept as
/// [`CommandValue::Unexpected`] and an unknown string token as
/// [`StringValue::Unmapped`]. Numbers must fit in an `i64`; fractions and
/// larger values are kept as [`CommandValue::Unexpected`] as well.
#[must_use]
pub fn decode_value(spec: &CommandSpec, raw: &Value) -> CommandValue {
    match (spec.kind, raw) {
        (ValueKind::Boolean, Value::Bool(value)) => CommandValue::Boolean(*value),
        (ValueKind::Number, Value::Number(number)) => number
            .as_i64()
            .map_or_else(|| unexpected(spec, raw), CommandValue::Number),
        (ValueKind::StringEnum, Value::String(token)) => {
            let mapped = spec
                .string_values
                .as_ref()
                .and_then(|table| table.decode(token));
            match mapped {
                Some(value) => CommandValue::Text(StringValue::Mapped(*value)),
                None => CommandValue::Text(StringValue::Unmapped(token.clone())),
            }
        }
        _ => unexpected(spec, raw),
    }
}

fn unexpected(spec: &CommandSpec, raw: &Value) -> CommandValue {
    warn!(
        "Unexpected value for {} (code {}): expected {}, got {}",
        spec.command, spec.code, spec.kind, raw
    );
    CommandValue::Unexpected(raw.clone())
}

/// Merge a dps map into a snapshot
///
/// Codes absent from the message keep their previous values, and codes the
/// model does not know are skipped.
pub fn ingest(
    registry: &ModelRegistry,
    status: &mut RobovacStatus,
    message: &DpsMessage,
) -> IngestReport {
    let mut report = IngestReport::default();
    let (numeric, malformed) = message.entries();

    for (key, _) in malformed {
        debug!("Ignoring non-numeric data point key '{}'", key);
        report.ignored.push(key.to_string());
    }

    for (code, raw) in numeric {
        let Some(spec) = registry.by_code(code) else {
            debug!("Ignoring unknown data point {} = {}", code, raw);
            report.ignored.push(code.to_string());
            continue;
        };

        let value = decode_value(spec, raw);
        if let CommandValue::Text(StringValue::Unmapped(token)) = &value {
            warn!(
                "Unmapped {} value '{}' for model {} (code {})",
                spec.command,
                token,
                registry.model_id(),
                code
            );
            report.unmapped.push((spec.command, token.clone()));
        }

        if status.set(spec.command, value) {
            report.changed.push(spec.command);
        }
        report.updated += 1;
    }

    report
}

/// Validate a value for a command and build the wire request
///
/// # Errors
///
/// - [`RobovacError::CommandNotSupported`] if the model lacks the command
/// - [`RobovacError::TypeMismatch`] if the value kind does not match the spec
/// - [`RobovacError::ValueNotSupported`] if a semantic value has no token
pub fn encode_set(
    registry: &ModelRegistry,
    command: Command,
    value: &CommandValue,
) -> Result<SetRequest> {
    let spec = registry
        .by_command(command)
        .ok_or_else(|| RobovacError::CommandNotSupported {
            command,
            model_id: registry.model_id().to_string(),
        })?;

    let raw = match (spec.kind, value) {
        (ValueKind::Boolean, CommandValue::Boolean(flag)) => Value::Bool(*flag),
        (ValueKind::Number, CommandValue::Number(number)) => Value::from(*number),
        (ValueKind::StringEnum, CommandValue::Text(text)) => {
            let token = match text {
                StringValue::Mapped(semantic) => spec
                    .string_values
                    .as_ref()
                    .and_then(|table| table.encode(semantic.id)),
                StringValue::Unmapped(_) => None,
            };
            let token = token.ok_or_else(|| RobovacError::ValueNotSupported {
                value: text.to_string(),
                command,
                model_id: registry.model_id().to_string(),
            })?;
            Value::String(token.to_string())
        }
        (expected, actual) => {
            return Err(RobovacError::TypeMismatch {
                command,
                expected,
                actual: actual.kind_name(),
            })
        }
    };

    Ok(SetRequest {
        dps: spec.code,
        set: raw,
    })
}

/// Human readable dump of a dps map for debug logs
#[must_use]
pub fn describe_dps(registry: &ModelRegistry, message: &DpsMessage) -> String {
    let (numeric, malformed) = message.entries();
    let mut known = String::new();
    let mut unknown = String::new();

    for (code, raw) in numeric {
        match registry.by_code(code) {
            Some(spec) => {
                let _ = writeln!(known, "  {code} ({}) = {}", spec.command, decode_value(spec, raw));
            }
            None => {
                let _ = writeln!(unknown, "  {code} = {raw}");
            }
        }
    }
    for (key, raw) in malformed {
        let _ = writeln!(unknown, "  {key} = {raw}");
    }

    format!(
        "{} ({}) status\nKnown codes:\n{known}Unknown codes:\n{unknown}",
        registry.model_name(),
        registry.model_id()
    )
}
