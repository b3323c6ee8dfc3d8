use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    text_submissions_total: AtomicU64,
    complaint_intents_total: AtomicU64,
    image_classifications_total: AtomicU64,
    image_rejections_total: AtomicU64,
    unknown_bin_total: AtomicU64,
    complaints_filed_total: AtomicU64,
    total_latency_millis: AtomicU64,
    latency_samples: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub text_submissions_total: u64,
    pub complaint_intents_total: u64,
    pub image_classifications_total: u64,
    pub image_rejections_total: u64,
    pub unknown_bin_total: u64,
    pub complaints_filed_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sanitation_requests_total").increment(1);
    }

    pub fn record_text_submission(&self, complaint_intent: bool) {
        self.text_submissions_total.fetch_add(1, Ordering::Relaxed);
        if complaint_intent {
            self.complaint_intents_total.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!(
            "sanitation_text_submissions_total",
            "complaint_intent" => if complaint_intent { "true" } else { "false" }
        )
        .increment(1);
    }

    pub fn record_classification(&self, bin_known: bool) {
        self.image_classifications_total
            .fetch_add(1, Ordering::Relaxed);
        if !bin_known {
            self.unknown_bin_total.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!("sanitation_image_classifications_total").increment(1);
    }

    pub fn inc_image_rejection(&self) {
        self.image_rejections_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sanitation_image_rejections_total").increment(1);
    }

    pub fn inc_complaint_filed(&self) {
        self.complaints_filed_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sanitation_complaints_filed_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);
        let samples = self.latency_samples.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            text_submissions_total: self.text_submissions_total.load(Ordering::Relaxed),
            complaint_intents_total: self.complaint_intents_total.load(Ordering::Relaxed),
            image_classifications_total: self.image_classifications_total.load(Ordering::Relaxed),
            image_rejections_total: self.image_rejections_total.load(Ordering::Relaxed),
            unknown_bin_total: self.unknown_bin_total.load(Ordering::Relaxed),
            complaints_filed_total: self.complaints_filed_total.load(Ordering::Relaxed),
            avg_latency_millis: if samples == 0 {
                0.0
            } else {
                latency as f64 / samples as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,sanitation_api=info,sanitation_desk=info,sanitation_ml=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_counts_events() {
        let metrics = AppMetrics::default();
        metrics.inc_request();
        metrics.inc_request();
        metrics.record_text_submission(true);
        metrics.record_text_submission(false);
        metrics.record_classification(false);
        metrics.inc_complaint_filed();
        metrics.observe_latency(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.text_submissions_total, 2);
        assert_eq!(snapshot.complaint_intents_total, 1);
        assert_eq!(snapshot.image_classifications_total, 1);
        assert_eq!(snapshot.unknown_bin_total, 1);
        assert_eq!(snapshot.complaints_filed_total, 1);
        assert_eq!(snapshot.avg_latency_millis, 30.0);
    }

    #[test]
    fn average_latency_ignores_unobserved_requests() {
        let metrics = AppMetrics::default();
        for _ in 0..4 {
            metrics.inc_request();
        }
        metrics.observe_latency(Duration::from_millis(10));
        metrics.observe_latency(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 4);
        assert_eq!(snapshot.avg_latency_millis, 20.0);
        assert_eq!(AppMetrics::default().snapshot().avg_latency_millis, 0.0);
    }
}
