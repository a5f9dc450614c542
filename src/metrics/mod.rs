use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// ============================================================================
// Metrics Module - Prometheus metrics for the fulfillment engine
// ============================================================================
//
// Covers:
// - Item transitions committed / rejected
// - Preparer claims per kitchen role
// - Stock ledger attempts, exhaustion and failures
// - Notification delivery and breaker state
//
// `render` produces the text exposition format; serving it over HTTP is
// left to the embedding application.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub transitions_total: IntCounterVec,
    pub transitions_rejected: IntCounterVec,
    pub claims_total: IntCounterVec,

    pub ledger_attempts_total: IntCounterVec,
    pub ledger_exhausted_total: IntCounterVec,
    pub ledger_failures_total: IntCounterVec,

    pub notifications_published: IntCounter,
    pub notifications_failed: IntCounter,
    pub notifier_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Committed order/item transitions"),
            &["role", "target"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let transitions_rejected = IntCounterVec::new(
            Opts::new("order_transitions_rejected_total", "Rejected transition requests"),
            &["reason"],
        )?;
        registry.register(Box::new(transitions_rejected.clone()))?;

        let claims_total = IntCounterVec::new(
            Opts::new("order_claims_total", "Orders claimed by a preparer"),
            &["role"],
        )?;
        registry.register(Box::new(claims_total.clone()))?;

        let ledger_attempts_total = IntCounterVec::new(
            Opts::new("stock_ledger_attempts_total", "Stock mutation attempts, retries included"),
            &["operation"],
        )?;
        registry.register(Box::new(ledger_attempts_total.clone()))?;

        let ledger_exhausted_total = IntCounterVec::new(
            Opts::new("stock_ledger_exhausted_total", "Stock mutations that ran out of retries"),
            &["operation"],
        )?;
        registry.register(Box::new(ledger_exhausted_total.clone()))?;

        let ledger_failures_total = IntCounterVec::new(
            Opts::new("stock_ledger_failures_total", "Stock mutations that failed"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(ledger_failures_total.clone()))?;

        let notifications_published = IntCounter::new(
            "notifications_published_total",
            "Notices handed to the push channel",
        )?;
        registry.register(Box::new(notifications_published.clone()))?;

        let notifications_failed = IntCounter::new(
            "notifications_failed_total",
            "Notices dropped because delivery failed or the breaker was open",
        )?;
        registry.register(Box::new(notifications_failed.clone()))?;

        let notifier_breaker_state = IntGauge::new(
            "notifier_breaker_state",
            "Notification breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(notifier_breaker_state.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            transitions_rejected,
            claims_total,
            ledger_attempts_total,
            ledger_exhausted_total,
            ledger_failures_total,
            notifications_published,
            notifications_failed,
            notifier_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, role: &str, target: &str) {
        self.transitions_total.with_label_values(&[role, target]).inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.transitions_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_claim(&self, role: &str) {
        self.claims_total.with_label_values(&[role]).inc();
    }

    pub fn record_ledger_attempt(&self, operation: &str) {
        self.ledger_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_ledger_failure(&self, operation: &str, reason: &str) {
        self.ledger_failures_total.with_label_values(&[operation, reason]).inc();
        if reason == "concurrency_exhausted" {
            self.ledger_exhausted_total.with_label_values(&[operation]).inc();
        }
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
