use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref WATCH_EVENTS_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_dispatched", "Subscriber events handed to listeners"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref LOCK_ACQUISITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("lock_acquisitions", "Lock acquisition attempts by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref SESSION_STATE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("session_state_transitions", "Connection state changes observed"),
        &["state"]
    )
    .expect("metric can not be created");

    pub static ref LOCK_WAITERS: IntGauge =
        IntGauge::new("lock_waiters", "Lock acquirers currently queued")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(WATCH_EVENTS_DISPATCHED.clone()),
        Box::new(LOCK_ACQUISITIONS.clone()),
        Box::new(SESSION_STATE_TRANSITIONS.clone()),
        Box::new(LOCK_WAITERS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("metric collector can not be registered: {:?}", e);
        }
    }
}

/// Render all coordination metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
