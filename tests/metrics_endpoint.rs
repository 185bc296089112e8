#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::FakeEngine;
use medpanel::{app, build_state, AppConfig};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;

// Basic smoke test for /metrics after a mix of outcomes.
#[tokio::test]
async fn metrics_reflect_outcomes() {
    let engine = Arc::new(FakeEngine::answering(json!({
        "final_report": {"raw_response": "not json at all"},
        "panel_trace": []
    })));
    let state = build_state(&AppConfig::default(), engine);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let _h = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let analyze_url = format!("http://{}/analyze", addr);
    for body in [
        json!({"notes": "ping"}),
        json!({"notes": "ping"}),
        json!({"notes": "   "}),
        json!({"notes": "ping", "image": "%%%"}),
    ] {
        let _ = Client::new()
            .post(&analyze_url)
            .json(&body)
            .send()
            .await
            .unwrap();
    }

    let metrics_url = format!("http://{}/metrics", addr);
    let resp = Client::new().get(&metrics_url).send().await.unwrap();
    assert!(resp.status().is_success());
    let text = resp.text().await.unwrap();
    assert!(text.contains("medpanel_requests_total 4"));
    assert!(text.contains("medpanel_reports_total{outcome=\"degraded\"} 2"));
    assert!(text.contains("medpanel_errors_total{kind=\"ValidationError\"} 1"));
    assert!(text.contains("medpanel_errors_total{kind=\"ImageDecodeError\"} 1"));
    assert!(text.contains("medpanel_request_latency_ms_bucket{le=\"+Inf\"} 4"));
    assert_eq!(
        text.matches("# HELP medpanel_request_latency_ms").count(),
        1,
        "latency HELP line should appear exactly once"
    );
    assert!(text.contains("medpanel_process_start_time_seconds"));
    assert!(text.contains("medpanel_process_uptime_seconds"));
}

#[tokio::test]
async fn info_and_health_endpoints() {
    let engine = Arc::new(FakeEngine::answering(json!({"final_report": {}})));
    let state = build_state(&AppConfig::default(), engine);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let _h = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let info: serde_json::Value = Client::new()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["service"], json!("MedPanel API"));
    assert_eq!(info["endpoints"]["analyze"], json!("/analyze (POST)"));

    let health: serde_json::Value = Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], json!("healthy"));
    assert_eq!(health["engine"], json!("fake"));
    assert_eq!(health["engine_ready"], json!(true));
    assert!(health["started_at"].as_str().is_some());
}
