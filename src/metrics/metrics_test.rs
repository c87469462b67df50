use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("dcoord".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    LOCK_ACQUISITIONS.with_label_values(&["granted"]).inc();
    WATCH_EVENTS_DISPATCHED.with_label_values(&["created"]).inc();
    SESSION_STATE_TRANSITIONS.with_label_values(&["expired"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"dcoord_lock_acquisitions"),
        "Missing dcoord_lock_acquisitions"
    );
    assert!(metric_names.contains(&"dcoord_watch_events_dispatched"));
    assert!(metric_names.contains(&"dcoord_session_state_transitions"));
}

#[test]
fn test_counter_increment() {
    LOCK_ACQUISITIONS.with_label_values(&["reentrant_sample"]).reset();

    LOCK_ACQUISITIONS.with_label_values(&["reentrant_sample"]).inc();
    LOCK_ACQUISITIONS.with_label_values(&["reentrant_sample"]).inc();

    let value = LOCK_ACQUISITIONS.with_label_values(&["reentrant_sample"]).get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

#[test]
fn test_gather_metrics_renders_text() {
    SESSION_STATE_TRANSITIONS.with_label_values(&["connected"]).inc();
    let text = gather_metrics();
    assert!(text.contains("session_state_transitions"));
}
