//! Pure session state and its transition functions.
//!
//! Nothing here awaits or spawns. The controller wraps [`Session`] in a lock,
//! calls one transition per event, and runs the slow work (snapshot, gateway,
//! persistence) between transitions.

use std::sync::Arc;

use flowlens_capture::{CaptureError, CaptureSource};
use flowlens_core::{Guide, ImageEncoding, Suggestion, sort_by_relevance};

use crate::SessionError;

/// User-facing message for a failed manual analysis.
pub const ANALYSIS_FAILED_MESSAGE: &str =
    "Could not analyze your screen. Check your connection and try scanning again.";

/// User-facing message for a failed guide generation.
pub const GUIDE_FAILED_MESSAGE: &str =
    "Could not generate a guide for this suggestion. Pick it again to retry.";

/// Session states. Exactly one is current at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing captured.
    #[default]
    Idle,
    /// A source is live and no blocking work is running.
    Capturing,
    /// A manual analysis is outstanding.
    Analyzing,
    /// Suggestions are on display.
    Suggesting,
    /// A guide is being generated.
    GeneratingGuide,
    /// A guide is on display.
    ViewingGuide,
    /// History is on display.
    History,
}

impl SessionState {
    /// States in which the auto-scan scheduler may fire.
    pub fn accepts_auto_scan(self) -> bool {
        matches!(self, Self::Capturing | Self::Suggesting)
    }
}

/// How a scan was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// User-initiated and blocking.
    Manual,
    /// Scheduler-initiated and non-blocking.
    Auto,
}

/// Gateway pipeline currently holding the in-flight flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Snapshot plus analyze, and for manual scans the follow-up elaborate.
    Scan(ScanMode),
    /// Elaborate for a suggestion the user picked.
    Elaborate,
}

/// Permission to run one scan pipeline, handed out by [`Session::begin_scan`].
#[derive(Debug, Clone)]
pub struct ScanTicket {
    /// Requested mode.
    pub mode: ScanMode,
    /// Capture generation at the time the scan began.
    pub generation: u64,
    /// Source to snapshot.
    pub source: CaptureSource,
}

/// Permission to run one elaborate call.
#[derive(Debug, Clone)]
pub struct ElaborationTicket {
    /// Suggestion to elaborate.
    pub suggestion: Suggestion,
    /// Image the suggestion was found in.
    pub image: Arc<ImageEncoding>,
}

/// Failure of one pipeline step, kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    /// Internal description; never shown to the user.
    pub detail: String,
}

impl PipelineFailure {
    /// Wraps any displayable error.
    pub fn new(detail: impl ToString) -> Self {
        Self {
            detail: detail.to_string(),
        }
    }
}

/// What happened to an acquisition result.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// Source stored; capture is live.
    Started(CaptureSource),
    /// Acquisition failed; the user-facing message was recorded.
    Failed(CaptureError),
    /// Session was reset while acquiring; the source was released.
    Discarded,
}

/// What happened to an analysis result.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// Result stored; nothing else to do.
    Applied,
    /// Manual scan found suggestions; elaborate the top one next.
    Elaborate(ElaborationTicket),
    /// Result arrived after the session moved on.
    Discarded,
}

/// What happened to an elaboration result.
#[derive(Debug, Clone, PartialEq)]
pub enum ElaborationOutcome {
    /// Guide selected for viewing; persist it.
    Applied(Guide),
    /// Failure recorded; suggestions stay selectable.
    Failed,
    /// Result arrived after the session moved on.
    Discarded,
}

/// Immutable view of the session published after every transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// State restored when history closes.
    pub prior_state: Option<SessionState>,
    /// Label of the live source, if any.
    pub source_label: Option<String>,
    /// Whether the auto-scan toggle is on.
    pub auto_scan_enabled: bool,
    /// Whether any gateway pipeline is outstanding.
    pub analysis_in_flight: bool,
    /// Whether a non-blocking auto-scan is outstanding.
    pub auto_scan_in_progress: bool,
    /// Last snapshot is shown but no source is live.
    pub paused: bool,
    /// Most recent snapshot.
    pub last_snapshot: Option<Arc<ImageEncoding>>,
    /// Suggestions, relevance-descending.
    pub suggestions: Vec<Suggestion>,
    /// Guide on display.
    pub selected_guide: Option<Guide>,
    /// User-facing error message.
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Returns `true` while a capture source is held.
    pub fn is_capturing(&self) -> bool {
        self.source_label.is_some()
    }
}

/// The single session entity.
///
/// Invariants held by every transition:
/// - `source` is present iff capture is live.
/// - `in_flight` is set by `begin_*` and cleared only by the matching
///   `settle_*`, so at most one gateway pipeline runs at a time.
/// - `generation` changes on start, stop, and reset; results tagged with an
///   older generation are stale.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    prior_state: Option<SessionState>,
    source: Option<CaptureSource>,
    auto_scan_enabled: bool,
    in_flight: Option<Pipeline>,
    acquiring: bool,
    generation: u64,
    last_snapshot: Option<Arc<ImageEncoding>>,
    suggestions: Vec<Suggestion>,
    selected_guide: Option<Guide>,
    last_error: Option<String>,
}

impl Session {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The state results are applied against: the current state, or the
    /// remembered one while history is open.
    pub fn flow_state(&self) -> SessionState {
        match (self.state, self.prior_state) {
            (SessionState::History, Some(prior)) => prior,
            (state, _) => state,
        }
    }

    /// Pipeline holding the in-flight flag.
    pub fn in_flight(&self) -> Option<Pipeline> {
        self.in_flight
    }

    /// Current capture generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Live source, if any.
    pub fn source(&self) -> Option<&CaptureSource> {
        self.source.as_ref()
    }

    /// Builds the published view.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            prior_state: self.prior_state,
            source_label: self.source.as_ref().map(|source| source.label().to_string()),
            auto_scan_enabled: self.auto_scan_enabled,
            analysis_in_flight: self.in_flight.is_some(),
            auto_scan_in_progress: self.in_flight == Some(Pipeline::Scan(ScanMode::Auto)),
            paused: self.source.is_none() && self.last_snapshot.is_some(),
            last_snapshot: self.last_snapshot.clone(),
            suggestions: self.suggestions.clone(),
            selected_guide: self.selected_guide.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Returns the id of the source the scheduler should run for, or `None`
    /// when it must be disarmed.
    pub fn scheduler_key(&self) -> Option<u64> {
        if !self.auto_scan_enabled || !self.state.accepts_auto_scan() {
            return None;
        }
        self.source.as_ref().map(CaptureSource::id)
    }

    /// Starts a capture attempt and clears the last error.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyCapturing`] while a source is held or
    /// being acquired, and [`SessionError::InvalidTransition`] outside
    /// `Idle` and `Suggesting`.
    pub fn begin_acquire(&mut self) -> Result<u64, SessionError> {
        if self.source.is_some() || self.acquiring {
            return Err(SessionError::AlreadyCapturing);
        }
        if !matches!(self.state, SessionState::Idle | SessionState::Suggesting) {
            return Err(self.invalid("start capture"));
        }

        self.acquiring = true;
        self.last_error = None;
        Ok(self.generation)
    }

    /// Applies an acquisition result started at `generation`.
    ///
    /// A new source moves `Idle` and `Suggesting` (directly or behind open
    /// history) to `Capturing`. Guide states keep their state and just gain
    /// the source.
    pub fn finish_acquire(
        &mut self,
        generation: u64,
        result: Result<CaptureSource, CaptureError>,
        auto_scan: bool,
    ) -> AcquireOutcome {
        self.acquiring = false;

        if generation != self.generation {
            if let Ok(source) = result {
                source.release();
            }
            return AcquireOutcome::Discarded;
        }

        match result {
            Ok(source) => {
                self.generation += 1;
                self.source = Some(source.clone());
                self.auto_scan_enabled = auto_scan;
                // A guide opened while acquiring stays on screen; the source
                // is live once the user leaves it.
                if matches!(self.flow_state(), SessionState::Idle | SessionState::Suggesting) {
                    self.set_flow_state(SessionState::Capturing);
                }
                AcquireOutcome::Started(source)
            }
            Err(error) => {
                self.last_error = Some(error.user_message().to_string());
                AcquireOutcome::Failed(error)
            }
        }
    }

    /// Claims the in-flight flag for a scan.
    ///
    /// Manual scans move the session to `Analyzing`; auto scans leave the
    /// state untouched.
    ///
    /// # Errors
    /// Returns [`SessionError::Busy`] while another pipeline is outstanding,
    /// [`SessionError::NoSource`] without a live source,
    /// [`SessionError::AutoScanDisabled`] for an auto scan with the toggle off,
    /// and [`SessionError::InvalidTransition`] outside `Capturing` and
    /// `Suggesting`.
    pub fn begin_scan(&mut self, mode: ScanMode) -> Result<ScanTicket, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        let Some(source) = self.source.clone() else {
            return Err(SessionError::NoSource);
        };
        if mode == ScanMode::Auto && !self.auto_scan_enabled {
            return Err(SessionError::AutoScanDisabled);
        }
        if !self.state.accepts_auto_scan() {
            return Err(self.invalid("scan"));
        }

        if mode == ScanMode::Manual {
            self.state = SessionState::Analyzing;
        }
        self.in_flight = Some(Pipeline::Scan(mode));
        Ok(ScanTicket {
            mode,
            generation: self.generation,
            source,
        })
    }

    /// Returns `true` while results for `ticket` may still be applied.
    pub fn scan_is_current(&self, ticket: &ScanTicket) -> bool {
        match ticket.mode {
            ScanMode::Manual => self.flow_state() == SessionState::Analyzing,
            ScanMode::Auto => {
                ticket.generation == self.generation && self.state.accepts_auto_scan()
            }
        }
    }

    /// Stores a fresh snapshot unless the scan is stale.
    pub fn record_snapshot(&mut self, ticket: &ScanTicket, image: Arc<ImageEncoding>) -> bool {
        if !self.scan_is_current(ticket) {
            return false;
        }
        self.last_snapshot = Some(image);
        true
    }

    /// Settles a scan's analysis step and clears the flag.
    ///
    /// A manual scan that found suggestions keeps the flag and returns an
    /// [`ElaborationTicket`] for the top-ranked one.
    pub fn settle_analysis(
        &mut self,
        ticket: &ScanTicket,
        image: Option<Arc<ImageEncoding>>,
        result: Result<Vec<Suggestion>, PipelineFailure>,
    ) -> AnalysisOutcome {
        self.in_flight = None;
        if !self.scan_is_current(ticket) {
            return AnalysisOutcome::Discarded;
        }
        let result = result.map(|mut suggestions| {
            sort_by_relevance(&mut suggestions);
            suggestions
        });

        match (ticket.mode, result) {
            (ScanMode::Manual, Ok(suggestions)) => {
                self.last_error = None;
                let top = suggestions.first().cloned();
                self.suggestions = suggestions;
                match (top, image) {
                    (Some(suggestion), Some(image)) => {
                        self.in_flight = Some(Pipeline::Elaborate);
                        self.set_flow_state(SessionState::GeneratingGuide);
                        AnalysisOutcome::Elaborate(ElaborationTicket { suggestion, image })
                    }
                    _ => {
                        self.set_flow_state(SessionState::Suggesting);
                        AnalysisOutcome::Applied
                    }
                }
            }
            (ScanMode::Manual, Err(_)) => {
                self.last_error = Some(ANALYSIS_FAILED_MESSAGE.to_string());
                self.set_flow_state(SessionState::Capturing);
                AnalysisOutcome::Applied
            }
            (ScanMode::Auto, Ok(suggestions)) => {
                if !suggestions.is_empty() {
                    self.suggestions = suggestions;
                }
                AnalysisOutcome::Applied
            }
            (ScanMode::Auto, Err(_)) => AnalysisOutcome::Applied,
        }
    }

    /// Claims the in-flight flag to elaborate a displayed suggestion.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] outside `Suggesting`,
    /// [`SessionError::Busy`] while a pipeline is outstanding,
    /// [`SessionError::UnknownSuggestion`] for an id not on display, and
    /// [`SessionError::NoSnapshot`] before any snapshot was taken.
    pub fn begin_elaborate(&mut self, suggestion_id: &str) -> Result<ElaborationTicket, SessionError> {
        if self.state != SessionState::Suggesting {
            return Err(self.invalid("select suggestion"));
        }
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        let suggestion = self
            .suggestions
            .iter()
            .find(|suggestion| suggestion.id == suggestion_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSuggestion(suggestion_id.to_string()))?;
        let image = self.last_snapshot.clone().ok_or(SessionError::NoSnapshot)?;

        self.in_flight = Some(Pipeline::Elaborate);
        self.state = SessionState::GeneratingGuide;
        Ok(ElaborationTicket { suggestion, image })
    }

    /// Settles an elaborate call and clears the flag.
    pub fn settle_elaboration(&mut self, result: Result<Guide, PipelineFailure>) -> ElaborationOutcome {
        self.in_flight = None;
        if self.flow_state() != SessionState::GeneratingGuide {
            return ElaborationOutcome::Discarded;
        }

        match result {
            Ok(guide) => {
                self.last_error = None;
                self.selected_guide = Some(guide.clone());
                self.set_flow_state(SessionState::ViewingGuide);
                ElaborationOutcome::Applied(guide)
            }
            Err(_) => {
                self.last_error = Some(GUIDE_FAILED_MESSAGE.to_string());
                self.set_flow_state(SessionState::Suggesting);
                ElaborationOutcome::Failed
            }
        }
    }

    /// Releases the live source and turns auto-scan off.
    ///
    /// Active states land in `Suggesting` when there is something to show and
    /// in `Idle` otherwise. Guide states keep their state. While history is
    /// open, the remembered state is rewritten instead.
    ///
    /// # Returns
    /// `false` when no source was held; nothing changes in that case.
    pub fn stop_capture(&mut self) -> bool {
        let Some(source) = self.source.take() else {
            return false;
        };
        source.release();
        self.auto_scan_enabled = false;
        self.generation += 1;

        match self.state {
            SessionState::Capturing | SessionState::Analyzing | SessionState::Suggesting => {
                self.state = self.landing_state(false);
            }
            SessionState::History => {
                self.prior_state = match self.prior_state {
                    Some(
                        SessionState::Capturing
                        | SessionState::Analyzing
                        | SessionState::Suggesting,
                    ) => Some(self.landing_state(true)),
                    other => other,
                };
            }
            SessionState::Idle | SessionState::GeneratingGuide | SessionState::ViewingGuide => {}
        }
        true
    }

    /// Handles an external end of source `source_id`.
    ///
    /// Stale notifications (for a source already released or replaced) are
    /// ignored.
    pub fn handle_source_ended(&mut self, source_id: u64) -> bool {
        match &self.source {
            Some(source) if source.id() == source_id => self.stop_capture(),
            _ => false,
        }
    }

    /// Leaves a guide for the suggestion list.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] outside `ViewingGuide`.
    pub fn back(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::ViewingGuide {
            return Err(self.invalid("back"));
        }
        self.selected_guide = None;
        self.state = SessionState::Suggesting;
        Ok(())
    }

    /// Opens history, remembering the current state.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] when history is already open.
    pub fn open_history(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::History {
            return Err(self.invalid("open history"));
        }
        self.prior_state = Some(self.state);
        self.state = SessionState::History;
        Ok(())
    }

    /// Closes history and restores the remembered state.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] when history is not open.
    pub fn close_history(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::History {
            return Err(self.invalid("close history"));
        }
        self.state = match self.prior_state.take() {
            Some(SessionState::History) | None => SessionState::Idle,
            Some(prior) => prior,
        };
        Ok(())
    }

    /// Shows a guide picked from history.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] when history is not open.
    pub fn view_history_guide(&mut self, guide: Guide) -> Result<(), SessionError> {
        if self.state != SessionState::History {
            return Err(self.invalid("open history record"));
        }
        self.prior_state = None;
        self.selected_guide = Some(guide);
        self.state = SessionState::ViewingGuide;
        Ok(())
    }

    /// Flips the auto-scan toggle.
    pub fn set_auto_scan(&mut self, enabled: bool) {
        self.auto_scan_enabled = enabled;
    }

    /// Returns to a clean `Idle` session.
    ///
    /// An outstanding pipeline keeps the in-flight flag until it settles; its
    /// result is then discarded.
    pub fn reset(&mut self) {
        if let Some(source) = self.source.take() {
            source.release();
        }
        self.generation += 1;
        self.auto_scan_enabled = false;
        self.suggestions.clear();
        self.selected_guide = None;
        self.last_snapshot = None;
        self.last_error = None;
        self.prior_state = None;
        self.state = SessionState::Idle;
    }

    fn set_flow_state(&mut self, next: SessionState) {
        if self.state == SessionState::History {
            self.prior_state = Some(next);
        } else {
            self.state = next;
        }
    }

    fn landing_state(&self, history_open: bool) -> SessionState {
        if history_open || !self.suggestions.is_empty() || self.selected_guide.is_some() {
            SessionState::Suggesting
        } else {
            SessionState::Idle
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}
