//! Shared fixtures for session integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowlens_capture::{CaptureAdapter, CaptureError, CaptureSource, SyntheticCaptureAdapter};
use flowlens_core::{Guide, HistoryRecord, ImageEncoding, Step, Suggestion};
use flowlens_history::{HistoryError, HistoryStore, InMemoryHistory};
use flowlens_inference::{InferenceError, InferenceGateway};
use flowlens_session::{SessionConfig, SessionController, SessionSnapshot, SessionState};
use tokio::sync::{Semaphore, watch};

/// Scripted gateway that can hold calls open and records reentrancy.
pub struct StubGateway {
    analyses: Mutex<VecDeque<Result<Vec<Suggestion>, String>>>,
    guides: Mutex<VecDeque<Result<Guide, String>>>,
    gate: Option<Semaphore>,
    active: AtomicBool,
    overlaps: AtomicUsize,
    analyze_calls: AtomicUsize,
    elaborated: Mutex<Vec<String>>,
    entered: watch::Sender<usize>,
}

impl StubGateway {
    /// Gateway that answers immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Gateway whose calls wait for [`StubGateway::release`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        let (entered, _) = watch::channel(0);
        Self {
            analyses: Mutex::new(VecDeque::new()),
            guides: Mutex::new(VecDeque::new()),
            gate,
            active: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            elaborated: Mutex::new(Vec::new()),
            entered,
        }
    }

    /// Queues the next analyze answer.
    pub fn push_analysis(&self, result: Result<Vec<Suggestion>, &str>) {
        self.analyses
            .lock()
            .expect("script lock should work")
            .push_back(result.map_err(str::to_string));
    }

    /// Queues the next elaborate answer.
    pub fn push_guide(&self, result: Result<Guide, &str>) {
        self.guides
            .lock()
            .expect("script lock should work")
            .push_back(result.map_err(str::to_string));
    }

    /// Lets `calls` held calls finish.
    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    /// Waits until at least `calls` gateway calls have started.
    pub async fn wait_for_entered(&self, calls: usize) {
        let mut receiver = self.entered.subscribe();
        tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(|seen| *seen >= calls))
            .await
            .expect("gateway call should start")
            .expect("gateway should stay alive");
    }

    /// Number of calls that started while another was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Number of analyze calls.
    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    /// Suggestion ids passed to elaborate, in call order.
    pub fn elaborated(&self) -> Vec<String> {
        self.elaborated.lock().expect("log lock should work").clone()
    }

    async fn enter(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.entered.send_modify(|seen| *seen += 1);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate should stay open")
                .forget();
        }
    }

    fn leave(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl InferenceGateway for StubGateway {
    async fn analyze(&self, _image: &ImageEncoding) -> Result<Vec<Suggestion>, InferenceError> {
        self.enter().await;
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .analyses
            .lock()
            .expect("script lock should work")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        self.leave();
        next.map_err(InferenceError::Transport)
    }

    async fn elaborate(
        &self,
        suggestion: &Suggestion,
        _image: &ImageEncoding,
    ) -> Result<Guide, InferenceError> {
        self.enter().await;
        self.elaborated
            .lock()
            .expect("log lock should work")
            .push(suggestion.id.clone());
        let next = self
            .guides
            .lock()
            .expect("script lock should work")
            .pop_front()
            .unwrap_or_else(|| Ok(guide_for(&suggestion.id)));
        self.leave();
        next.map_err(InferenceError::Transport)
    }
}

/// Capture adapter whose acquisitions wait for [`GatedCapture::release`].
pub struct GatedCapture {
    inner: SyntheticCaptureAdapter,
    gate: Semaphore,
    entered: watch::Sender<usize>,
}

impl GatedCapture {
    pub fn new() -> Arc<Self> {
        let (entered, _) = watch::channel(0);
        Arc::new(Self {
            inner: SyntheticCaptureAdapter::new(),
            gate: Semaphore::new(0),
            entered,
        })
    }

    /// Lets one held acquisition finish.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Waits until an acquisition has started.
    pub async fn wait_for_entered(&self) {
        let mut receiver = self.entered.subscribe();
        tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(|seen| *seen >= 1))
            .await
            .expect("acquisition should start")
            .expect("capture should stay alive");
    }
}

#[async_trait]
impl CaptureAdapter for GatedCapture {
    async fn acquire(&self) -> Result<CaptureSource, CaptureError> {
        self.entered.send_modify(|seen| *seen += 1);
        self.gate
            .acquire()
            .await
            .expect("gate should stay open")
            .forget();
        self.inner.acquire().await
    }
}

/// History store whose writes always fail.
pub struct FailingHistory {
    saves: AtomicUsize,
}

impl FailingHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            saves: AtomicUsize::new(0),
        })
    }

    /// Number of save attempts.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn save(&self, _guide: &Guide) -> Result<HistoryRecord, HistoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(HistoryError::Io(std::io::Error::other("disk full")))
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        Err(HistoryError::Io(std::io::Error::other("disk full")))
    }
}

/// Controller over arbitrary collaborators with the default period.
pub fn controller_with(
    capture: Arc<dyn CaptureAdapter>,
    gateway: Arc<StubGateway>,
    history: Arc<dyn HistoryStore>,
) -> SessionController {
    SessionController::new(SessionConfig::default(), capture, gateway, history)
}

/// Controller wired to synthetic capture, the stub gateway, and volatile
/// history.
pub struct Harness {
    pub controller: SessionController,
    pub capture: Arc<SyntheticCaptureAdapter>,
    pub gateway: Arc<StubGateway>,
    pub history: Arc<InMemoryHistory>,
}

impl Harness {
    pub fn new(gateway: Arc<StubGateway>) -> Self {
        Self::with_interval(gateway, Duration::from_secs(5))
    }

    pub fn with_interval(gateway: Arc<StubGateway>, interval: Duration) -> Self {
        let capture = Arc::new(SyntheticCaptureAdapter::new());
        let history = Arc::new(InMemoryHistory::new());
        let controller = SessionController::new(
            SessionConfig {
                auto_scan_interval: interval,
            },
            capture.clone(),
            gateway.clone(),
            history.clone(),
        );
        Self {
            controller,
            capture,
            gateway,
            history,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.controller.snapshot().state
    }

    /// Starts capture and lands in `Suggesting` with `suggestions` on
    /// display, without generating a guide.
    pub async fn suggesting_with(&self, suggestions: Vec<Suggestion>) {
        self.controller
            .start_capture(false)
            .await
            .expect("capture should start");
        if !suggestions.is_empty() {
            self.gateway.push_guide(Err("not now"));
        }
        self.gateway.push_analysis(Ok(suggestions));
        self.controller
            .request_scan()
            .await
            .expect("scan should run");
        assert_eq!(self.state(), SessionState::Suggesting);
    }
}

/// Waits until a published snapshot satisfies `check`.
pub async fn wait_until(
    controller: &SessionController,
    check: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut receiver = controller.subscribe();
    let seen = tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(check))
        .await
        .expect("session should reach the expected snapshot")
        .expect("controller should stay alive");
    seen.clone()
}

pub fn suggestion(id: &str, score: u8) -> Suggestion {
    Suggestion {
        id: id.to_string(),
        title: format!("Automate {id}"),
        estimated_time_savings: "10 minutes per day".to_string(),
        tools: vec!["Zapier".to_string()],
        description: format!("Repetitive work around {id}"),
        relevance_score: score,
    }
}

pub fn guide_for(suggestion_id: &str) -> Guide {
    Guide {
        suggestion_id: String::new(),
        title: format!("Guide for {suggestion_id}"),
        prerequisites: vec![],
        steps: vec![Step {
            step_number: 1,
            instruction: "Open the workflow editor".to_string(),
            selector_description: None,
            code_snippet: None,
            tip: None,
        }],
    }
}
