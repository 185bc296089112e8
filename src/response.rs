//! Assembly of the fixed-shape success envelope.

use serde::Serialize;
use serde_json::Value;

use crate::normalize::Mode;
use crate::report::{
    Report, ESCALATE_TO_HUMAN, ESCALATION_REASON, PANEL_AGREEMENT_SCORE, PRIMARY_DIAGNOSIS,
};

/// Success envelope. Its key set is the same on every successful call,
/// whatever shape the engine's report arrived in.
#[derive(Debug, Serialize, Clone)]
pub struct ApiResponse {
    pub success: bool,
    pub mode: Mode,
    pub image_analyzed: bool,
    pub report: Report,
    pub trace: Vec<Value>,
    pub summary: Summary,
}

/// Flattened view of the report for clients that only render a headline.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Summary {
    pub diagnosis: Value,
    /// Agreement score as supplied (usually 0-100), `"N/A"` when absent.
    pub confidence: Value,
    pub escalate: bool,
    pub reason: String,
}

pub fn assemble(mode: Mode, image_analyzed: bool, report: Report, trace: Vec<Value>) -> ApiResponse {
    let summary = summarize(&report);
    ApiResponse {
        success: true,
        mode,
        image_analyzed,
        report,
        trace,
        summary,
    }
}

/// Read the headline fields defensively; absent or mistyped fields fall
/// back to defaults rather than failing.
pub fn summarize(report: &Report) -> Summary {
    let na = || Value::String("N/A".to_string());
    Summary {
        diagnosis: report.field(PRIMARY_DIAGNOSIS).cloned().unwrap_or_else(na),
        confidence: report
            .field(PANEL_AGREEMENT_SCORE)
            .cloned()
            .unwrap_or_else(na),
        escalate: report
            .field(ESCALATE_TO_HUMAN)
            .and_then(as_flag)
            .unwrap_or(false),
        reason: report
            .field(ESCALATION_REASON)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
