//! Integration tests for runtime kill-switch behavior.

use std::sync::Arc;

use flowlens_app::{
    CAPTURE_ENABLED_ENV, GatedCaptureAdapter, capture_enabled_from, capture_enabled_from_env,
};
use flowlens_capture::{CaptureAdapter, CaptureError, SyntheticCaptureAdapter};

#[test]
fn kill_switch_behavior_tests_parses_switch_values() {
    assert!(capture_enabled_from(None));
    assert!(capture_enabled_from(Some("1")));
    assert!(capture_enabled_from(Some("yes")));
    assert!(!capture_enabled_from(Some("0")));
    assert!(!capture_enabled_from(Some(" FALSE ")));
    assert!(!capture_enabled_from(Some("Off")));
}

// Every env mutation lives in this one test so parallel tests never observe
// a half-set switch.
#[tokio::test]
async fn kill_switch_behavior_tests_gates_acquisition_from_env() {
    let synthetic = Arc::new(SyntheticCaptureAdapter::new());
    let gated = GatedCaptureAdapter::new(synthetic.clone());

    // Safety:
    // - Integration tests mutate process env only in this test body.
    // - We reset the variable before returning.
    unsafe { std::env::set_var(CAPTURE_ENABLED_ENV, "false") };
    assert!(!capture_enabled_from_env());
    let blocked = gated.acquire().await;
    assert!(matches!(blocked, Err(CaptureError::PolicyBlocked)));
    assert!(synthetic.acquired_sources().is_empty());

    // Safety: see rationale above.
    unsafe { std::env::set_var(CAPTURE_ENABLED_ENV, "true") };
    assert!(capture_enabled_from_env());
    let source = gated.acquire().await.expect("capture should be allowed");
    assert_eq!(synthetic.acquired_sources().len(), 1);
    source.release();

    // Safety: see rationale above.
    unsafe { std::env::remove_var(CAPTURE_ENABLED_ENV) };
}
