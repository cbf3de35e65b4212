//! Async orchestration around [`Session`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flowlens_capture::{CaptureAdapter, CaptureSource, FrameSnapshotter};
use flowlens_core::{Guide, HistoryRecord};
use flowlens_history::HistoryStore;
use flowlens_inference::InferenceGateway;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::SessionError;
use crate::scheduler::AutoScanScheduler;
use crate::state::{
    AcquireOutcome, AnalysisOutcome, ElaborationOutcome, ElaborationTicket, PipelineFailure,
    ScanMode, ScanTicket, Session, SessionSnapshot,
};

/// Controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period of the auto-scan scheduler.
    pub auto_scan_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_scan_interval: Duration::from_secs(5),
        }
    }
}

/// How one analyze/elaborate pipeline ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Suggestions were stored; carries how many the gateway returned.
    Suggestions(usize),
    /// A guide was generated and selected.
    Guide(Guide),
    /// A step failed; the failure was recorded or swallowed.
    Failed,
    /// The result arrived after the session moved on and was dropped.
    Discarded,
}

/// Clonable handle to the one live session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController").finish_non_exhaustive()
    }
}

struct Inner {
    session: Mutex<Session>,
    scheduler: Mutex<AutoScanScheduler>,
    updates: watch::Sender<SessionSnapshot>,
    capture: Arc<dyn CaptureAdapter>,
    gateway: Arc<dyn InferenceGateway>,
    history: Arc<dyn HistoryStore>,
    snapshotter: FrameSnapshotter,
}

impl SessionController {
    /// Creates an idle controller.
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn CaptureAdapter>,
        gateway: Arc<dyn InferenceGateway>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let session = Session::new();
        let (updates, _) = watch::channel(session.snapshot());
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                scheduler: Mutex::new(AutoScanScheduler::new(config.auto_scan_interval)),
                updates,
                capture,
                gateway,
                history,
                snapshotter: FrameSnapshotter::new(),
            }),
        }
    }

    /// Subscribes to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Returns the latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    /// Acquires a capture source and enters `Capturing`.
    ///
    /// # Errors
    /// Returns [`SessionError::Capture`] when acquisition fails (the
    /// user-facing message is also stored in the snapshot) and the
    /// [`Session::begin_acquire`] errors when capture cannot start now.
    pub async fn start_capture(&self, auto_scan: bool) -> Result<(), SessionError> {
        let generation = self.commit(Session::begin_acquire)?;

        // Acquisition runs detached so a dropped caller cannot leave the
        // session stuck in "acquiring".
        let controller = self.clone();
        let acquisition = tokio::spawn(async move {
            let result = controller.inner.capture.acquire().await;
            controller.commit(|session| session.finish_acquire(generation, result, auto_scan))
        });

        match acquisition.await {
            Ok(AcquireOutcome::Started(source)) => {
                tracing::info!(
                    source_id = source.id(),
                    source = source.label(),
                    auto_scan,
                    "capture started"
                );
                self.watch_termination(&source);
                Ok(())
            }
            Ok(AcquireOutcome::Failed(error)) => {
                tracing::warn!(%error, "capture acquisition failed");
                Err(SessionError::Capture(error))
            }
            Ok(AcquireOutcome::Discarded) => {
                tracing::debug!("acquisition finished after reset; source released");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, "acquisition task did not complete");
                Err(SessionError::Capture(flowlens_capture::CaptureError::Unknown(
                    error.to_string(),
                )))
            }
        }
    }

    /// Runs a blocking manual scan: snapshot, analyze, and elaborate the
    /// top suggestion.
    ///
    /// # Errors
    /// Returns [`SessionError::Busy`] while another pipeline is outstanding
    /// and the other [`Session::begin_scan`] errors when no scan is possible.
    pub async fn request_scan(&self) -> Result<PipelineOutcome, SessionError> {
        let ticket = self.commit(|session| session.begin_scan(ScanMode::Manual))?;
        tracing::info!("manual scan started");
        Ok(self.finish(self.spawn_scan(ticket)).await)
    }

    /// Runs one auto-scan tick now, as the scheduler would.
    ///
    /// # Errors
    /// Returns the [`Session::begin_scan`] rejection when the tick is
    /// dropped.
    pub fn auto_scan_tick(&self) -> Result<JoinHandle<PipelineOutcome>, SessionError> {
        let ticket = self.commit(|session| session.begin_scan(ScanMode::Auto))?;
        Ok(self.spawn_scan(ticket))
    }

    /// Flips the auto-scan toggle.
    pub async fn set_auto_scan(&self, enabled: bool) {
        self.commit(|session| session.set_auto_scan(enabled));
        tracing::info!(enabled, "auto-scan toggled");
    }

    /// Generates a guide for a displayed suggestion.
    ///
    /// # Errors
    /// Returns the [`Session::begin_elaborate`] rejection.
    pub async fn select_suggestion(&self, suggestion_id: &str) -> Result<PipelineOutcome, SessionError> {
        let ticket = self.commit(|session| session.begin_elaborate(suggestion_id))?;
        tracing::info!(suggestion_id, "guide generation started");

        let controller = self.clone();
        let handle = tokio::spawn(async move { controller.run_elaboration(ticket).await });
        Ok(self.finish(handle).await)
    }

    /// Leaves the guide view.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] outside `ViewingGuide`.
    pub async fn back(&self) -> Result<(), SessionError> {
        self.commit(Session::back)
    }

    /// Opens history.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] when already open.
    pub async fn open_history(&self) -> Result<(), SessionError> {
        self.commit(Session::open_history)
    }

    /// Closes history.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] when not open.
    pub async fn close_history(&self) -> Result<(), SessionError> {
        self.commit(Session::close_history)
    }

    /// Lists stored guides as returned by the store.
    ///
    /// # Errors
    /// Returns [`SessionError::History`] when the store cannot be read.
    pub async fn history(&self) -> Result<Vec<HistoryRecord>, SessionError> {
        Ok(self.inner.history.list().await?)
    }

    /// Shows a stored guide.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownHistoryRecord`] for a missing id and
    /// [`SessionError::InvalidTransition`] when history is not open.
    pub async fn open_history_record(&self, record_id: &str) -> Result<(), SessionError> {
        let record = self
            .inner
            .history
            .list()
            .await?
            .into_iter()
            .find(|record| record.id == record_id)
            .ok_or_else(|| SessionError::UnknownHistoryRecord(record_id.to_string()))?;

        self.commit(|session| session.view_history_guide(record.guide))
    }

    /// Deletes every stored guide.
    ///
    /// # Errors
    /// Returns [`SessionError::History`] when the store cannot be emptied.
    pub async fn clear_history(&self) -> Result<(), SessionError> {
        self.inner.history.clear().await?;
        tracing::info!("history cleared");
        Ok(())
    }

    /// Releases the live source.
    ///
    /// # Returns
    /// `false` when no source was held.
    pub async fn stop_capture(&self) -> bool {
        let stopped = self.commit(Session::stop_capture);
        if stopped {
            tracing::info!("capture stopped");
        }
        stopped
    }

    /// Returns to a clean `Idle` session.
    pub async fn reset(&self) {
        self.commit(Session::reset);
        tracing::info!("session reset");
    }

    fn spawn_scan(&self, ticket: ScanTicket) -> JoinHandle<PipelineOutcome> {
        let controller = self.clone();
        tokio::spawn(async move { controller.run_scan(ticket).await })
    }

    async fn finish(&self, handle: JoinHandle<PipelineOutcome>) -> PipelineOutcome {
        match handle.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(%error, "pipeline task did not complete");
                PipelineOutcome::Failed
            }
        }
    }

    async fn run_scan(&self, ticket: ScanTicket) -> PipelineOutcome {
        let source = ticket.source.clone();
        let snapshotter = self.inner.snapshotter;
        let captured = tokio::task::spawn_blocking(move || snapshotter.capture(&source)).await;

        let image = match captured {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(error)) => return self.fail_scan(&ticket, PipelineFailure::new(error)),
            Err(error) => return self.fail_scan(&ticket, PipelineFailure::new(error)),
        };
        self.commit(|session| session.record_snapshot(&ticket, image.clone()));

        let result = self
            .inner
            .gateway
            .analyze(&image)
            .await
            .map_err(PipelineFailure::new);
        let found = match &result {
            Ok(suggestions) => suggestions.len(),
            Err(failure) => {
                log_scan_failure(ticket.mode, failure);
                0
            }
        };
        let failed = result.is_err();

        match self.commit(|session| session.settle_analysis(&ticket, Some(image), result)) {
            AnalysisOutcome::Applied if failed => PipelineOutcome::Failed,
            AnalysisOutcome::Applied => {
                tracing::info!(mode = ?ticket.mode, found, "analysis applied");
                PipelineOutcome::Suggestions(found)
            }
            AnalysisOutcome::Elaborate(next) => {
                tracing::info!(
                    suggestion_id = %next.suggestion.id,
                    found,
                    "elaborating top suggestion"
                );
                self.run_elaboration(next).await
            }
            AnalysisOutcome::Discarded => {
                tracing::debug!(mode = ?ticket.mode, "stale analysis result discarded");
                PipelineOutcome::Discarded
            }
        }
    }

    fn fail_scan(&self, ticket: &ScanTicket, failure: PipelineFailure) -> PipelineOutcome {
        log_scan_failure(ticket.mode, &failure);
        match self.commit(|session| session.settle_analysis(ticket, None, Err(failure))) {
            AnalysisOutcome::Discarded => PipelineOutcome::Discarded,
            _ => PipelineOutcome::Failed,
        }
    }

    async fn run_elaboration(&self, ticket: ElaborationTicket) -> PipelineOutcome {
        let result = match self
            .inner
            .gateway
            .elaborate(&ticket.suggestion, &ticket.image)
            .await
        {
            Ok(mut guide) => {
                guide.suggestion_id = ticket.suggestion.id.clone();
                if let Err(issue) = guide.check_step_numbering() {
                    tracing::warn!(
                        suggestion_id = %guide.suggestion_id,
                        %issue,
                        "guide steps are not numbered contiguously"
                    );
                }
                Ok(guide)
            }
            Err(error) => {
                tracing::warn!(suggestion_id = %ticket.suggestion.id, %error, "guide generation failed");
                Err(PipelineFailure::new(error))
            }
        };

        match self.commit(|session| session.settle_elaboration(result)) {
            ElaborationOutcome::Applied(guide) => {
                self.persist(&guide).await;
                PipelineOutcome::Guide(guide)
            }
            ElaborationOutcome::Failed => PipelineOutcome::Failed,
            ElaborationOutcome::Discarded => {
                tracing::debug!("stale guide discarded");
                PipelineOutcome::Discarded
            }
        }
    }

    async fn persist(&self, guide: &Guide) {
        match self.inner.history.save(guide).await {
            Ok(record) => tracing::info!(record_id = %record.id, "guide saved to history"),
            Err(error) => tracing::warn!(%error, "guide could not be saved to history"),
        }
    }

    fn watch_termination(&self, source: &CaptureSource) {
        let Some(signal) = source.subscribe_termination() else {
            return;
        };
        let source_id = source.id();
        let weak = Arc::downgrade(&self.inner);

        // The task resolves the controller when the signal fires, so it
        // always runs the current stop logic.
        tokio::spawn(async move {
            let Some(reason) = signal.ended().await else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let controller = SessionController { inner };
            if controller.commit(|session| session.handle_source_ended(source_id)) {
                tracing::info!(source_id, %reason, "capture ended outside the app");
            }
        });
    }

    /// Applies one transition, then publishes and re-syncs the scheduler
    /// while still holding the session lock so updates stay ordered.
    fn commit<R>(&self, transition: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = lock(&self.inner.session);
        let result = transition(&mut session);

        let next = session.snapshot();
        self.inner.updates.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        let weak = Arc::downgrade(&self.inner);
        lock(&self.inner.scheduler).sync(session.scheduler_key(), move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let controller = SessionController { inner };
            if let Err(error) = controller.auto_scan_tick() {
                tracing::debug!(%error, "auto-scan tick skipped");
            }
            true
        });

        result
    }
}

fn log_scan_failure(mode: ScanMode, failure: &PipelineFailure) {
    match mode {
        ScanMode::Manual => tracing::warn!(detail = %failure.detail, "manual analysis failed"),
        ScanMode::Auto => tracing::debug!(detail = %failure.detail, "auto analysis failed"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
