//! Call boundary to the external diagnostic panel engine.
//!
//! The engine is an opaque collaborator: it receives the normalized notes
//! and optional raster and returns a final report plus the panel trace.
//! A single engine handle is built at startup by [`initialize`] and shared
//! read-only by every request through [`AnalysisGateway`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::Deserialize;

use crate::error::AnalyzeError;
use crate::normalize::ClinicalRequest;
use crate::report::Report;

pub mod http;

pub use self::http::HttpPanelEngine;

/// Output of one engine run. `panel_trace` is order-significant and passed
/// to the client untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub final_report: Report,
    pub panel_trace: Vec<serde_json::Value>,
}

/// Wire form of the engine's answer before the report is classified.
#[derive(Debug, Deserialize)]
struct EngineOutput {
    final_report: serde_json::Value,
    #[serde(default)]
    panel_trace: Vec<serde_json::Value>,
}

impl AnalysisResult {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let out: EngineOutput = serde_json::from_value(value)?;
        Ok(Self {
            final_report: Report::from_engine_value(out.final_report),
            panel_trace: out.panel_trace,
        })
    }
}

/// A failed engine run, carrying the failure's classification name and
/// message. The message may contain sensitive detail and is only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineFailure {
    pub kind: String,
    pub message: String,
}

impl EngineFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            kind: if kind.trim().is_empty() {
                "EngineError".to_string()
            } else {
                kind
            },
            message: message.into(),
        }
    }
}

/// Interface consumed from the panel engine. Implementations must tolerate
/// concurrent `run` calls; no per-request state may live on `self`.
#[async_trait::async_trait]
pub trait PanelEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine was initialized with a usable credential.
    fn is_ready(&self) -> bool {
        true
    }

    async fn run(
        &self,
        image: Option<&RgbImage>,
        notes: &str,
    ) -> Result<AnalysisResult, EngineFailure>;
}

/// Stand-in engine used when no credential was provided at startup. The
/// service keeps running but every analysis fails.
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl PanelEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn run(
        &self,
        _image: Option<&RgbImage>,
        _notes: &str,
    ) -> Result<AnalysisResult, EngineFailure> {
        Err(EngineFailure::new("EngineNotInitialized", self.reason.clone()))
    }
}

/// Build the process-wide engine handle. Called once at startup.
pub fn initialize(credential: Option<&str>, url: Option<&str>) -> Arc<dyn PanelEngine> {
    let Some(credential) = credential else {
        tracing::warn!("HF_TOKEN not set; panel engine unavailable, /analyze will fail");
        return Arc::new(UnavailableEngine::new("engine credential not configured"));
    };
    let Some(url) = url else {
        tracing::warn!("MEDPANEL_ENGINE_URL not set; panel engine unavailable, /analyze will fail");
        return Arc::new(UnavailableEngine::new("engine url not configured"));
    };
    match HttpPanelEngine::new(url, credential) {
        Ok(engine) => {
            tracing::info!(engine = %url, "panel engine initialized");
            Arc::new(engine)
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to build panel engine client");
            Arc::new(UnavailableEngine::new(format!("engine client init failed: {err}")))
        }
    }
}

/// Forwards normalized requests to the engine under a bounded duration.
/// Failures are surfaced, never swallowed, and never retried.
#[derive(Clone)]
pub struct AnalysisGateway {
    engine: Arc<dyn PanelEngine>,
    timeout: Duration,
}

impl AnalysisGateway {
    pub fn new(engine: Arc<dyn PanelEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    pub async fn run(&self, request: &ClinicalRequest) -> Result<AnalysisResult, AnalyzeError> {
        let start = Instant::now();
        let call = self.engine.run(request.image.as_ref(), &request.notes);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome.map_err(AnalyzeError::from),
            Err(_) => Err(AnalyzeError::EngineTimeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        };
        tracing::debug!(
            engine = %self.engine.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "engine call finished"
        );
        result
    }
}
