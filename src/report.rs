//! Final report representation and best-effort recovery of reports the
//! panel's text model cut off mid-object.
//!
//! The recovery is a bounded heuristic, not a JSON repair parser. It closes
//! the object after the last complete quoted-string field and gives up on
//! anything else, in which case the raw text is kept as a
//! [`Report::RawFallback`].

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Key under which the engine wraps free text it could not parse itself.
pub const RAW_RESPONSE_KEY: &str = "raw_response";

/// End of a complete quoted-string value followed by a field separator.
const FIELD_END_MARKER: &str = "\",";

// Fields every outward report carries.
pub const PRIMARY_DIAGNOSIS: &str = "primary_diagnosis";
pub const PANEL_AGREEMENT_SCORE: &str = "panel_agreement_score";
pub const ESCALATE_TO_HUMAN: &str = "escalate_to_human";
pub const ESCALATION_REASON: &str = "escalation_reason";

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Structured(Map<String, Value>),
    RawFallback(String),
}

/// How a report reached its final shape. Used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Engine already produced a structured object.
    Passthrough,
    /// Raw text was complete JSON.
    Parsed,
    /// Raw text was closed after its last complete field.
    Truncated,
    /// Nothing recoverable; raw text kept.
    Degraded,
}

impl RepairOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairOutcome::Passthrough => "passthrough",
            RepairOutcome::Parsed => "parsed",
            RepairOutcome::Truncated => "truncated",
            RepairOutcome::Degraded => "degraded",
        }
    }
}

impl Report {
    /// Classify the engine's `final_report` value.
    pub fn from_engine_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => match map.remove(RAW_RESPONSE_KEY) {
                Some(Value::String(raw)) => Report::RawFallback(raw),
                Some(other) => {
                    map.insert(RAW_RESPONSE_KEY.to_string(), other);
                    Report::Structured(map)
                }
                None => Report::Structured(map),
            },
            Value::String(raw) => Report::RawFallback(raw),
            other => Report::RawFallback(other.to_string()),
        }
    }

    /// Look up a report field, accepting the camelCase spelling as well.
    /// Raw fallbacks carry no fields.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Report::Structured(map) => map
                .get(key)
                .or_else(|| map.get(&snake_to_camel(key)))
                .filter(|v| !v.is_null()),
            Report::RawFallback(_) => None,
        }
    }

    pub fn is_raw_fallback(&self) -> bool {
        matches!(self, Report::RawFallback(_))
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn default_for(key: &str) -> Value {
    match key {
        ESCALATE_TO_HUMAN => Value::Bool(false),
        ESCALATION_REASON => Value::String(String::new()),
        _ => Value::String("N/A".to_string()),
    }
}

const REPORT_FIELDS: [&str; 4] = [
    PRIMARY_DIAGNOSIS,
    PANEL_AGREEMENT_SCORE,
    ESCALATE_TO_HUMAN,
    ESCALATION_REASON,
];

/// Canonical report key in either spelling.
fn is_report_key(key: &str) -> bool {
    REPORT_FIELDS
        .iter()
        .any(|field| key == *field || key == snake_to_camel(field))
}

/// Both variants serialize with the same logical fields; missing ones get
/// their defaults instead of being omitted.
impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Report::Structured(map) => {
                let mut out = serializer.serialize_map(None)?;
                for (k, v) in map {
                    if !is_report_key(k) {
                        out.serialize_entry(k, v)?;
                    }
                }
                for key in REPORT_FIELDS {
                    match self.field(key) {
                        Some(v) => out.serialize_entry(key, v)?,
                        None => out.serialize_entry(key, &default_for(key))?,
                    }
                }
                out.end()
            }
            Report::RawFallback(raw) => {
                let mut out = serializer.serialize_map(Some(REPORT_FIELDS.len() + 1))?;
                out.serialize_entry(RAW_RESPONSE_KEY, raw)?;
                for key in REPORT_FIELDS {
                    out.serialize_entry(key, &default_for(key))?;
                }
                out.end()
            }
        }
    }
}

/// Recover a structured report where possible. Never fails.
pub fn repair(report: Report) -> Report {
    repair_with_outcome(report).0
}

pub fn repair_with_outcome(report: Report) -> (Report, RepairOutcome) {
    let raw = match report {
        Report::Structured(map) => return (Report::Structured(map), RepairOutcome::Passthrough),
        Report::RawFallback(raw) => raw,
    };
    let text = raw.trim_end();

    if text.ends_with('}') {
        if let Some(map) = parse_object(text) {
            return (Report::Structured(map), RepairOutcome::Parsed);
        }
    }

    // Without a complete `",` field boundary nothing is recoverable.
    if !text.contains(FIELD_END_MARKER) {
        tracing::warn!(raw_len = raw.len(), "report text unrecoverable, keeping raw fallback");
        return (Report::RawFallback(raw), RepairOutcome::Degraded);
    }

    // A cut that lands right after a closing quote leaves a complete last field.
    if text.ends_with('"') {
        if let Some(map) = parse_object(&format!("{text}}}")) {
            return (Report::Structured(map), RepairOutcome::Truncated);
        }
    }

    // Otherwise drop the incomplete trailing field and close after the last
    // complete string field.
    if let Some(idx) = text.rfind(FIELD_END_MARKER).filter(|idx| *idx > 0) {
        let closed = format!("{}}}", &text[..=idx]);
        if let Some(map) = parse_object(&closed) {
            return (Report::Structured(map), RepairOutcome::Truncated);
        }
    }

    tracing::warn!(raw_len = raw.len(), "report text unrecoverable, keeping raw fallback");
    (Report::RawFallback(raw), RepairOutcome::Degraded)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
