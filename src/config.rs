use std::env;

use anyhow::{anyhow, Result};

use crate::normalize::DEFAULT_MAX_IMAGE_PIXELS;

/// Default bound on a single panel engine call. Model deliberation across
/// the full panel routinely takes tens of seconds.
const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 120_000;
/// Data-URL images are inflated by base64, so the body limit sits well
/// above axum's 2 MiB default.
const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_PORT: u16 = 10_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential handed to the engine at initialization (`HF_TOKEN`).
    pub engine_credential: Option<String>,
    pub engine_url: Option<String>,
    pub engine_timeout_ms: u64,
    pub max_request_bytes: usize,
    /// Decoded images larger than this many pixels are rejected.
    pub max_image_pixels: u64,
    pub cors_origin: String,
    pub log_reports: bool,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_credential: None,
            engine_url: None,
            engine_timeout_ms: DEFAULT_ENGINE_TIMEOUT_MS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            cors_origin: "*".to_string(),
            log_reports: false,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let engine_credential = parse_optional_string("HF_TOKEN");
        let engine_url = parse_optional_string("MEDPANEL_ENGINE_URL");

        let engine_timeout_ms = parse_optional_u64("MEDPANEL_ENGINE_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_ENGINE_TIMEOUT_MS);
        if engine_timeout_ms == 0 {
            return Err(anyhow!("MEDPANEL_ENGINE_TIMEOUT_MS must be greater than zero"));
        }
        let max_request_bytes = parse_optional_u64("MEDPANEL_MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        let max_image_pixels = parse_optional_u64("MEDPANEL_MAX_IMAGE_PIXELS")?
            .unwrap_or(DEFAULT_MAX_IMAGE_PIXELS);
        let cors_origin =
            parse_optional_string("MEDPANEL_CORS_ORIGIN").unwrap_or_else(|| "*".to_string());
        let log_reports = parse_bool_env("MEDPANEL_LOG_REPORTS")?.unwrap_or(false);
        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p)
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| anyhow!("PORT must be between 1 and 65535"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            engine_credential,
            engine_url,
            engine_timeout_ms,
            max_request_bytes,
            max_image_pixels,
            cors_origin,
            log_reports,
            port,
        })
    }
}

fn parse_optional_string(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
