use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Result of a single protocol exchange, as seen by the metrics collector.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub label: String,
    /// `0` when the transport failed before a status was received.
    pub status: u16,
    pub elapsed: Duration,
    pub success: bool,
}

impl Outcome {
    /// Default classification: only a 200 counts as success.
    pub fn classify(label: impl Into<String>, status: u16, elapsed: Duration) -> Self {
        Self {
            label: label.into(),
            status,
            elapsed,
            success: status == 200,
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, outcome: &Outcome);
}

pub struct MetricsHub {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl MetricsHub {
    pub fn new() -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new("load_requests_total", "Requests issued by simulated sessions"),
            &["label", "status", "result"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("load_request_duration_seconds", "Request latency per endpoint"),
            &["label"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(MetricsHub {
            registry,
            requests,
            latency,
        })
    }

    pub fn get_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Total number of recorded outcomes with the given label and result.
    pub fn count(&self, label: &str, success: bool) -> u64 {
        let result = if success { "success" } else { "failure" };

        self.get_metrics()
            .iter()
            .filter(|family| family.get_name() == "load_requests_total")
            .flat_map(|family| family.get_metric())
            .filter(|metric| {
                let labels = metric.get_label();
                let has = |name: &str, value: &str| {
                    labels
                        .iter()
                        .any(|l| l.get_name() == name && l.get_value() == value)
                };
                has("label", label) && has("result", result)
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.get_metrics(), &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Reporter for MetricsHub {
    fn report(&self, outcome: &Outcome) {
        let status = outcome.status.to_string();
        let result = if outcome.success { "success" } else { "failure" };

        self.requests
            .with_label_values(&[outcome.label.as_str(), status.as_str(), result])
            .inc();
        self.latency
            .with_label_values(&[outcome.label.as_str()])
            .observe(outcome.elapsed.as_secs_f64());
    }
}
