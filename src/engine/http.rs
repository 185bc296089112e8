use base64::Engine as _;
use image::{DynamicImage, ImageOutputFormat, RgbImage};

use super::{AnalysisResult, EngineFailure, PanelEngine};

/// HttpPanelEngine forwards each analysis to a remote panel service as a
/// JSON POST and reads back `{ final_report, panel_trace }`.
pub struct HttpPanelEngine {
    url: String,
    credential: String,
    client: reqwest::Client,
}

impl HttpPanelEngine {
    /// The client carries no timeout of its own; the gateway bounds each call.
    pub fn new(url: &str, credential: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            url: url.to_string(),
            credential: credential.to_string(),
            client,
        })
    }

    fn render_body(
        &self,
        image: Option<&RgbImage>,
        notes: &str,
    ) -> Result<serde_json::Value, EngineFailure> {
        let image = match image {
            Some(img) => Some(encode_png_base64(img)?),
            None => None,
        };
        Ok(serde_json::json!({
            "notes": notes,
            "image": image,
        }))
    }
}

/// Re-encode the decoded raster losslessly so the engine always receives
/// a single well-formed format regardless of what the client uploaded.
fn encode_png_base64(img: &RgbImage) -> Result<String, EngineFailure> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| EngineFailure::new("ImageEncodeError", e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}

#[async_trait::async_trait]
impl PanelEngine for HttpPanelEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn run(
        &self,
        image: Option<&RgbImage>,
        notes: &str,
    ) -> Result<AnalysisResult, EngineFailure> {
        let body = self.render_body(image, notes)?;
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(engine = %self.url, error = ?err, "engine network error");
                EngineFailure::new("NetworkError", err.to_string())
            })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|err| {
            tracing::warn!(engine = %self.url, error = ?err, "engine read error");
            EngineFailure::new("ReadError", err.to_string())
        })?;
        if !status.is_success() {
            return Err(EngineFailure::new(
                "HttpStatus",
                format!("engine responded with status {}", status.as_u16()),
            ));
        }
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|err| EngineFailure::new("ParseError", err.to_string()))?;
        AnalysisResult::from_json(json)
            .map_err(|err| EngineFailure::new("ParseError", err.to_string()))
    }
}
