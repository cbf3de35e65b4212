//! Integration tests for the one-pipeline-at-a-time rule.

mod common;

use common::{Harness, StubGateway, suggestion};
use flowlens_session::{PipelineOutcome, SessionError, SessionState};

#[tokio::test]
async fn in_flight_exclusion_tests_drops_requests_while_manual_scan_is_outstanding() {
    let harness = Harness::new(StubGateway::gated());
    harness
        .controller
        .start_capture(true)
        .await
        .expect("capture should start");

    let controller = harness.controller.clone();
    let manual = tokio::spawn(async move { controller.request_scan().await });
    harness.gateway.wait_for_entered(1).await;

    assert!(harness.snapshot().analysis_in_flight);
    assert!(matches!(
        harness.controller.auto_scan_tick(),
        Err(SessionError::Busy)
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
    assert_eq!(outcome, PipelineOutcome::Suggestions(0));
    assert_eq!(harness.gateway.analyze_calls(), 1);
    assert_eq!(harness.gateway.overlaps(), 0);
    assert!(!harness.snapshot().analysis_in_flight);
}

#[tokio::test]
async fn in_flight_exclusion_tests_rejects_selection_during_auto_scan() {
    let harness = Harness::new(StubGateway::gated());
    harness
        .controller
        .start_capture(false)
        .await
        .expect("capture should start");

    harness.gateway.push_analysis(Ok(vec![suggestion("a", 80)]));
    harness.gateway.push_guide(Err("model unavailable"));
    let controller = harness.controller.clone();
    let manual = tokio::spawn(async move { controller.request_scan().await });
    harness.gateway.release(2);
    manual
        .await
        .expect("scan task should finish")
        .expect("scan should run");
    assert_eq!(harness.state(), SessionState::Suggesting);

    harness.controller.set_auto_scan(true).await;
    let auto = harness
        .controller
        .auto_scan_tick()
        .expect("tick should start a scan");
    harness.gateway.wait_for_entered(3).await;
    assert!(harness.snapshot().auto_scan_in_progress);

    assert!(matches!(
        harness.controller.select_suggestion("a").await,
        Err(SessionError::Busy)
    ));
    assert_eq!(harness.state(), SessionState::Suggesting);

    harness.gateway.release(1);
    auto.await.expect("auto scan should finish");
    assert_eq!(harness.gateway.overlaps(), 0);
    assert!(!harness.snapshot().auto_scan_in_progress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_exclusion_tests_never_overlaps_under_racing_requests() {
    let harness = Harness::new(StubGateway::new());
    harness
        .controller
        .start_capture(true)
        .await
        .expect("capture should start");

    let mut tasks = Vec::new();
    for round in 0..40 {
        if round % 3 == 0 {
            harness.gateway.push_analysis(Ok(vec![suggestion("x", 60)]));
        }
        if let Ok(handle) = harness.controller.auto_scan_tick() {
            tasks.push(tokio::spawn(async move {
                let _ = handle.await;
            }));
        }
        let controller = harness.controller.clone();
        tasks.push(tokio::spawn(async move {
            let _ = controller.request_scan().await;
        }));
        let controller = harness.controller.clone();
        tasks.push(tokio::spawn(async move {
            let _ = controller.back().await;
            let _ = controller.select_suggestion("x").await;
        }));
        tokio::task::yield_now().await;
    }

    for task in tasks {
        task.await.expect("task should finish");
    }
    assert!(harness.gateway.analyze_calls() > 0);
    assert_eq!(harness.gateway.overlaps(), 0);
    assert!(!harness.snapshot().analysis_in_flight);
}
