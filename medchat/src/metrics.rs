use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::models::{ReadinessStatus, RetrievalResult};

/// Counters for the chat service, registered on a registry owned by the app.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    retrievals: IntCounterVec,
    status_checks: IntCounterVec,
    chat_requests: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let retrievals = IntCounterVec::new(
            Opts::new(
                "medchat_retrievals_total",
                "Knowledge base lookups by backend and outcome",
            ),
            &["backend", "outcome"],
        )?;
        let status_checks = IntCounterVec::new(
            Opts::new(
                "medchat_status_checks_total",
                "Knowledge base readiness checks by result",
            ),
            &["ready"],
        )?;
        let chat_requests =
            IntCounter::new("medchat_chat_requests_total", "Chat requests accepted")?;

        registry.register(Box::new(retrievals.clone()))?;
        registry.register(Box::new(status_checks.clone()))?;
        registry.register(Box::new(chat_requests.clone()))?;

        Ok(Self {
            registry,
            retrievals,
            status_checks,
            chat_requests,
        })
    }

    pub fn record_retrieval(&self, backend: &str, result: &RetrievalResult) {
        self.retrievals
            .with_label_values(&[backend, result.outcome.as_str()])
            .inc();
    }

    pub fn record_status(&self, status: &ReadinessStatus) {
        let label = if status.ready { "true" } else { "false" };
        self.status_checks.with_label_values(&[label]).inc();
    }

    pub fn record_chat(&self) {
        self.chat_requests.inc();
    }

    pub fn encode(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}
