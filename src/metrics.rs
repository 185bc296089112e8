//! In-process counters for the analyze path, exposed in Prometheus text
//! format by `/metrics`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::report::RepairOutcome;

/// Fixed histogram bucket upper bounds in ms. Engine calls are slow, so the
/// range reaches two minutes.
const LATENCY_BUCKETS_MS: [u64; 12] = [
    10, 50, 100, 250, 500, 1000, 2500, 5000, 10_000, 30_000, 60_000, 120_000,
];

/// Error kinds with their own counter; everything else lands in `other`.
const ERROR_KINDS: [&str; 5] = [
    "ValidationError",
    "InvalidBody",
    "ImageDecodeError",
    "PayloadTooLarge",
    "EngineTimeout",
];

pub struct Metrics {
    requests_total: AtomicU64,
    reports_passthrough: AtomicU64,
    reports_parsed: AtomicU64,
    reports_truncated: AtomicU64,
    reports_degraded: AtomicU64,
    errors: [AtomicU64; ERROR_KINDS.len()],
    errors_engine: AtomicU64,
    hist_counts: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let start_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            requests_total: AtomicU64::new(0),
            reports_passthrough: AtomicU64::new(0),
            reports_parsed: AtomicU64::new(0),
            reports_truncated: AtomicU64::new(0),
            reports_degraded: AtomicU64::new(0),
            errors: Default::default(),
            errors_engine: AtomicU64::new(0),
            hist_counts: Default::default(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_epoch: start_time.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.hist_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        // find first bucket >= value
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if latency_ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn record_report(&self, outcome: RepairOutcome) {
        let counter = match outcome {
            RepairOutcome::Passthrough => &self.reports_passthrough,
            RepairOutcome::Parsed => &self.reports_parsed,
            RepairOutcome::Truncated => &self.reports_truncated,
            RepairOutcome::Degraded => &self.reports_degraded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: &str) {
        match ERROR_KINDS.iter().position(|k| *k == kind) {
            Some(idx) => self.errors[idx].fetch_add(1, Ordering::Relaxed),
            None => self.errors_engine.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        writeln!(
            &mut buf,
            "# HELP medpanel_requests_total Total analyze requests handled\n# TYPE medpanel_requests_total counter"
        )
        .ok();
        writeln!(&mut buf, "medpanel_requests_total {}", self.requests_total()).ok();

        writeln!(
            &mut buf,
            "# HELP medpanel_reports_total Successful reports by repair outcome\n# TYPE medpanel_reports_total counter"
        )
        .ok();
        for (outcome, counter) in [
            (RepairOutcome::Passthrough, &self.reports_passthrough),
            (RepairOutcome::Parsed, &self.reports_parsed),
            (RepairOutcome::Truncated, &self.reports_truncated),
            (RepairOutcome::Degraded, &self.reports_degraded),
        ] {
            writeln!(
                &mut buf,
                "medpanel_reports_total{{outcome=\"{}\"}} {}",
                outcome.as_str(),
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP medpanel_errors_total Failed requests by error kind\n# TYPE medpanel_errors_total counter"
        )
        .ok();
        for (kind, counter) in ERROR_KINDS.iter().zip(self.errors.iter()) {
            writeln!(
                &mut buf,
                "medpanel_errors_total{{kind=\"{}\"}} {}",
                kind,
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "medpanel_errors_total{{kind=\"EngineError\"}} {}",
            self.errors_engine.load(Ordering::Relaxed)
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP medpanel_request_latency_ms Analyze latency histogram milliseconds\n# TYPE medpanel_request_latency_ms histogram"
        )
        .ok();
        let count = self.hist_count.load(Ordering::Relaxed);
        let mut cumulative: u64 = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "medpanel_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "medpanel_request_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "medpanel_request_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "medpanel_request_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP medpanel_build_info Build information\n# TYPE medpanel_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "medpanel_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP medpanel_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE medpanel_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "medpanel_process_start_time_seconds {}",
            self.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP medpanel_process_uptime_seconds Process uptime seconds\n# TYPE medpanel_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "medpanel_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}
