//! Integration tests for full session reset.

mod common;

use common::{Harness, StubGateway, suggestion};
use flowlens_session::{PipelineOutcome, SessionError, SessionState};

#[tokio::test]
async fn reset_tests_clears_everything_and_releases_the_source() {
    let harness = Harness::new(StubGateway::new());
    harness.suggesting_with(vec![suggestion("a", 70)]).await;
    harness.controller.set_auto_scan(true).await;

    harness.controller.reset().await;

    let snapshot = harness.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.suggestions.is_empty());
    assert!(snapshot.selected_guide.is_none());
    assert!(snapshot.last_snapshot.is_none());
    assert!(snapshot.last_error.is_none());
    assert!(!snapshot.auto_scan_enabled);
    assert!(!snapshot.paused);
    assert!(harness.capture.acquired_sources()[0].is_released());
}

#[tokio::test]
async fn reset_tests_discards_outstanding_manual_scan() {
    let harness = Harness::new(StubGateway::gated());
    harness
        .controller
        .start_capture(false)
        .await
        .expect("capture should start");
    harness.gateway.push_analysis(Ok(vec![suggestion("late", 90)]));

    let controller = harness.controller.clone();
    let manual = tokio::spawn(async move { controller.request_scan().await });
    harness.gateway.wait_for_entered(1).await;
    harness.controller.reset().await;

    assert!(harness.snapshot().analysis_in_flight);
    assert!(matches!(
        harness.controller.start_capture(false).await,
        Ok(())
    ));
    assert!(matches!(
        harness.controller.request_scan().await,
        Err(SessionError::Busy)
    ));

    harness.gateway.release(1);
    let outcome = manual
        .await
        .expect("scan task should finish")
        .expect("scan should run");

    assert_eq!(outcome, PipelineOutcome::Discarded);
    let snapshot = harness.snapshot();
    assert_eq!(snapshot.state, SessionState::Capturing);
    assert!(snapshot.suggestions.is_empty());
    assert!(!snapshot.analysis_in_flight);
    assert!(harness.gateway.elaborated().is_empty());
}
