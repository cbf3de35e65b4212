#![warn(missing_docs)]
//! # flowlens-session
//!
//! ## Purpose
//! Owns the session state machine and orchestrates capture, analysis, guide
//! generation, and history around it.
//!
//! ## Responsibilities
//! - Keep one [`Session`] whose transitions enforce the state invariants.
//! - Allow at most one analyze/elaborate pipeline at a time and drop
//!   requests that arrive while one is outstanding.
//! - Run the auto-scan scheduler only while auto-scan is on, a source is
//!   live, and the state is `Capturing` or `Suggesting`.
//! - Discard results that arrive after the session moved on.
//! - Publish a [`SessionSnapshot`] after every transition.
//!
//! ## Data flow
//! Presentation intent -> [`SessionController`] transition -> snapshot and
//! gateway calls on spawned tasks -> settle transition -> published snapshot.
//!
//! ## Ownership and lifetimes
//! The controller is a cheap clonable handle. Background tasks hold weak or
//! short-lived strong references, so dropping every handle stops the
//! scheduler.
//!
//! ## Error model
//! Rejected intents return [`SessionError`]. Pipeline failures never surface
//! as errors: they become user-facing messages in the snapshot or are logged
//! and swallowed (auto-scan, persistence).

mod controller;
mod scheduler;
mod state;

use flowlens_capture::CaptureError;
use flowlens_history::HistoryError;
use thiserror::Error;

pub use controller::{PipelineOutcome, SessionConfig, SessionController};
pub use state::{
    ANALYSIS_FAILED_MESSAGE, AcquireOutcome, AnalysisOutcome, ElaborationOutcome,
    ElaborationTicket, GUIDE_FAILED_MESSAGE, Pipeline, PipelineFailure, ScanMode, ScanTicket,
    Session, SessionSnapshot, SessionState,
};

/// Reasons an intent is rejected.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Intent is not valid in the current state.
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        /// State at the time of the intent.
        state: SessionState,
        /// Rejected intent.
        action: &'static str,
    },
    /// A source is already held or being acquired.
    #[error("capture is already active")]
    AlreadyCapturing,
    /// Acquisition failed.
    #[error("capture could not start: {0}")]
    Capture(CaptureError),
    /// Another analyze/elaborate pipeline is outstanding.
    #[error("an analysis is already in progress")]
    Busy,
    /// No capture source is held.
    #[error("no capture source is active")]
    NoSource,
    /// Auto scan requested with the toggle off.
    #[error("auto-scan is disabled")]
    AutoScanDisabled,
    /// No snapshot exists to elaborate against.
    #[error("no snapshot is available")]
    NoSnapshot,
    /// Suggestion id is not on display.
    #[error("unknown suggestion `{0}`")]
    UnknownSuggestion(String),
    /// History record id does not exist.
    #[error("unknown history record `{0}`")]
    UnknownHistoryRecord(String),
    /// History store failure.
    #[error("history error: {0}")]
    History(#[from] HistoryError),
}
