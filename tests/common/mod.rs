#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use medpanel::{app, build_state, AnalysisResult, AppConfig, EngineFailure, PanelEngine};
use tower::ServiceExt; // for oneshot

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

type Responder = dyn Fn(Option<&RgbImage>, &str) -> Result<AnalysisResult, EngineFailure> + Send + Sync;

/// Scriptable engine that counts its invocations.
pub struct FakeEngine {
    calls: AtomicUsize,
    last_image_dims: Mutex<Option<(u32, u32)>>,
    delay: Option<Duration>,
    respond: Box<Responder>,
}

impl FakeEngine {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(Option<&RgbImage>, &str) -> Result<AnalysisResult, EngineFailure> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            last_image_dims: Mutex::new(None),
            delay: None,
            respond: Box::new(respond),
        }
    }

    /// Always answer with the given engine output JSON.
    pub fn answering(output: serde_json::Value) -> Self {
        Self::new(move |_, _| {
            Ok(AnalysisResult::from_json(output.clone()).expect("fixture is valid engine output"))
        })
    }

    pub fn failing(kind: &str, message: &str) -> Self {
        let failure = EngineFailure::new(kind, message);
        Self::new(move |_, _| Err(failure.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_image_dims(&self) -> Option<(u32, u32)> {
        *self.last_image_dims.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl PanelEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(
        &self,
        image: Option<&RgbImage>,
        notes: &str,
    ) -> Result<AnalysisResult, EngineFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image_dims.lock().unwrap() = image.map(|img| img.dimensions());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(image, notes)
    }
}

pub fn router_with(engine: Arc<FakeEngine>) -> Router {
    router_with_config(engine, AppConfig::default())
}

pub fn router_with_config(engine: Arc<FakeEngine>, config: AppConfig) -> Router {
    app(build_state(&config, engine))
}

pub fn png_base64(width: u32, height: u32) -> String {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 80])))
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf)
}

pub fn png_data_url(width: u32, height: u32) -> String {
    format!("data:image/png;base64,{}", png_base64(width, height))
}

pub async fn post_json(app: Router, uri: &str, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, req).await
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// PNG whose IHDR declares `width` x `height` but which carries no pixel
/// data. Decoding it naively would allocate the full raster.
pub fn png_header_base64(width: u32, height: u32) -> String {
    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in bytes {
            crc ^= u32::from(b);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let start = out.len();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let crc = crc32(&out[start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    chunk(&mut png, b"IHDR", &ihdr);
    chunk(&mut png, b"IDAT", &[]);
    chunk(&mut png, b"IEND", &[]);
    base64::engine::general_purpose::STANDARD.encode(png)
}
