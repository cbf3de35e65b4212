#![warn(missing_docs)]
//! # flowlens-capture
//!
//! ## Purpose
//! Wraps platform screen capture behind an acquire/release source handle and
//! turns live sources into still-image snapshots.
//!
//! ## Responsibilities
//! - Define a backend-agnostic [`CaptureAdapter`] and [`FrameGrabber`] pair.
//! - Own the lifecycle of one [`CaptureSource`]: idempotent release and a
//!   one-shot termination notification for externally stopped sources.
//! - Encode the current frame of a source as base64 PNG via
//!   [`FrameSnapshotter`].
//! - Expose real display capture on supported platforms and deterministic
//!   synthetic capture for CI and unit tests.
//!
//! ## Data flow
//! Controller calls [`CaptureAdapter::acquire`] -> holds the [`CaptureSource`]
//! -> [`FrameSnapshotter::capture`] grabs a [`flowlens_core::Frame`] and emits
//! an [`flowlens_core::ImageEncoding`] -> the encoding travels to inference.
//!
//! ## Ownership and lifetimes
//! `CaptureSource` is a cheap clonable handle over shared state. Snapshots are
//! owned copies, so pending analysis never touches a released source.
//!
//! ## Error model
//! Acquisition failures use the user-facing taxonomy
//! (`PermissionDenied`, `PolicyBlocked`, `Unsupported`, `Unknown`); runtime
//! failures use the remaining [`CaptureError`] variants.
//!
//! ## Security and privacy notes
//! Frame bytes are never persisted or logged by this crate.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine as _;
use flowlens_core::{Frame, ImageEncoding};
use thiserror::Error;
use tokio::sync::oneshot;

/// Mime type of every snapshot produced by [`FrameSnapshotter`].
pub const SNAPSHOT_MIME: &str = "image/png";

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Produces raw frames for one live source.
pub trait FrameGrabber: Send + Sync {
    /// Grabs the current frame at the source's present dimensions.
    ///
    /// # Errors
    /// Returns [`CaptureError::SourceLost`] when the underlying surface has
    /// gone away, or [`CaptureError::Backend`] for transient failures.
    fn grab(&self, captured_at_ms: u64) -> Result<Frame, CaptureError>;
}

/// Acquires live capture sources from the platform.
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Acquires a new live source.
    ///
    /// # Errors
    /// Returns one of the acquisition variants of [`CaptureError`].
    async fn acquire(&self) -> Result<CaptureSource, CaptureError>;
}

/// Handle to one acquired live source.
///
/// Clones share state: releasing any clone releases the source.
#[derive(Clone)]
pub struct CaptureSource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    id: u64,
    label: String,
    grabber: Box<dyn FrameGrabber>,
    released: AtomicBool,
    ended_tx: Mutex<Option<oneshot::Sender<String>>>,
    ended_rx: Mutex<Option<oneshot::Receiver<String>>>,
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("released", &self.is_released())
            .finish()
    }
}

impl CaptureSource {
    /// Wraps a frame grabber in a fresh live source.
    pub fn new(label: impl Into<String>, grabber: impl FrameGrabber + 'static) -> Self {
        let (ended_tx, ended_rx) = oneshot::channel();
        Self {
            inner: Arc::new(SourceInner {
                id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                grabber: Box::new(grabber),
                released: AtomicBool::new(false),
                ended_tx: Mutex::new(Some(ended_tx)),
                ended_rx: Mutex::new(Some(ended_rx)),
            }),
        }
    }

    /// Process-unique source id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Human-readable source label.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Returns `true` once the source was released or ended externally.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Takes the termination notification for this source.
    ///
    /// Only the first call returns `Some`; the notification fires at most
    /// once and never after [`CaptureSource::release`].
    pub fn subscribe_termination(&self) -> Option<TerminationSignal> {
        lock_slot(&self.inner.ended_rx)
            .take()
            .map(|receiver| TerminationSignal { receiver })
    }

    /// Releases the source.
    ///
    /// # Returns
    /// `true` when this call performed the release; `false` when the source
    /// was already released or ended, in which case the call is a no-op.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Dropping the sender closes the channel without firing it.
        drop(lock_slot(&self.inner.ended_tx).take());
        tracing::debug!(source_id = self.inner.id, "capture source released");
        true
    }

    /// Marks the source as ended by something outside the application, such
    /// as the user revoking sharing from OS chrome.
    ///
    /// # Returns
    /// `true` when the notification was delivered; `false` after release.
    pub fn signal_ended(&self, reason: impl Into<String>) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        let reason = reason.into();
        tracing::info!(source_id = self.inner.id, %reason, "capture source ended externally");
        if let Some(sender) = lock_slot(&self.inner.ended_tx).take() {
            let _ = sender.send(reason);
        }
        true
    }

    /// Grabs the current frame.
    ///
    /// # Errors
    /// Returns [`CaptureError::Released`] after release. A
    /// [`CaptureError::SourceLost`] from the grabber also ends the source.
    pub fn grab_frame(&self) -> Result<Frame, CaptureError> {
        if self.is_released() {
            return Err(CaptureError::Released);
        }

        match self.inner.grabber.grab(now_ms()) {
            Err(CaptureError::SourceLost(reason)) => {
                self.signal_ended(reason.clone());
                Err(CaptureError::SourceLost(reason))
            }
            other => other,
        }
    }
}

/// One-shot receiver for external termination of a [`CaptureSource`].
#[derive(Debug)]
pub struct TerminationSignal {
    receiver: oneshot::Receiver<String>,
}

impl TerminationSignal {
    /// Waits for termination.
    ///
    /// # Returns
    /// `Some(reason)` when the source ended externally, `None` when it was
    /// released first and will therefore never fire.
    pub async fn ended(self) -> Option<String> {
        self.receiver.await.ok()
    }
}

/// Encodes the current frame of a source as a still image.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSnapshotter;

impl FrameSnapshotter {
    /// Creates a snapshotter.
    pub fn new() -> Self {
        Self
    }

    /// Captures one PNG snapshot at the source's current dimensions.
    ///
    /// # Errors
    /// Returns [`CaptureError::Released`] for a released source and
    /// [`CaptureError::Encoding`] when PNG or base64 encoding fails.
    pub fn capture(&self, source: &CaptureSource) -> Result<ImageEncoding, CaptureError> {
        let frame = source.grab_frame()?;
        let png = encode_png(&frame)?;
        let payload = base64::engine::general_purpose::STANDARD.encode(png);
        ImageEncoding::from_base64(SNAPSHOT_MIME, &payload)
            .map_err(|error| CaptureError::Encoding(error.to_string()))
    }
}

/// Encodes an RGBA frame as PNG bytes.
///
/// # Errors
/// Returns [`CaptureError::Encoding`] on buffer or codec failure.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, CaptureError> {
    let buffer = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| CaptureError::Encoding("frame buffer does not match geometry".to_string()))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|error| CaptureError::Encoding(format!("png encoding failed: {error}")))?;
    Ok(png)
}

/// Real display capture for supported desktop targets.
///
/// # Notes
/// Windows only. Other targets report [`CaptureError::Unsupported`] so the
/// session surfaces a precise message instead of a generic failure.
#[derive(Debug, Clone, Default)]
pub struct ScreenCaptureAdapter {
    display_index: usize,
}

impl ScreenCaptureAdapter {
    /// Creates an adapter capturing the display at `display_index`.
    pub fn new(display_index: usize) -> Self {
        Self { display_index }
    }
}

#[async_trait]
impl CaptureAdapter for ScreenCaptureAdapter {
    async fn acquire(&self) -> Result<CaptureSource, CaptureError> {
        #[cfg(windows)]
        {
            use screenshots::Screen;

            let screens = Screen::all()
                .map_err(|error| CaptureError::Unknown(format!("screen enumeration failed: {error}")))?;
            if screens.is_empty() {
                return Err(CaptureError::Unsupported);
            }

            let screen = screens.get(self.display_index).ok_or_else(|| {
                CaptureError::Unknown(format!("display {} is not available", self.display_index))
            })?;

            // Probe once so permission problems surface at acquisition time.
            if let Err(error) = screen.capture() {
                let message = error.to_string();
                if message.to_ascii_lowercase().contains("denied") {
                    return Err(CaptureError::PermissionDenied);
                }
                return Err(CaptureError::Unknown(message));
            }

            let grabber = ScreenGrabber {
                index: self.display_index,
            };
            Ok(CaptureSource::new(
                format!("Display {}", self.display_index + 1),
                grabber,
            ))
        }

        #[cfg(not(windows))]
        {
            let _ = self.display_index;
            Err(CaptureError::Unsupported)
        }
    }
}

#[cfg(windows)]
struct ScreenGrabber {
    index: usize,
}

#[cfg(windows)]
impl FrameGrabber for ScreenGrabber {
    fn grab(&self, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        use screenshots::Screen;

        let screens = Screen::all()
            .map_err(|error| CaptureError::Backend(format!("screen refresh failed: {error}")))?;
        let screen = screens.get(self.index).ok_or_else(|| {
            CaptureError::SourceLost(format!("display {} was disconnected", self.index))
        })?;

        let captured = screen
            .capture()
            .map_err(|error| CaptureError::Backend(format!("screen capture failed: {error}")))?;
        let width = captured.width();
        let height = captured.height();
        let rgba = captured.into_raw();

        Frame::new(width, height, captured_at_ms, rgba)
            .map_err(|error| CaptureError::Backend(error.to_string()))
    }
}

/// Deterministic synthetic display with resizable geometry.
///
/// Clones share geometry, so tests can resize a display while a source built
/// from it is live.
#[derive(Debug, Clone)]
pub struct SyntheticDisplay {
    geometry: Arc<Mutex<(u32, u32)>>,
    sequence: Arc<Mutex<u64>>,
}

impl SyntheticDisplay {
    /// Creates a synthetic display of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry: Arc::new(Mutex::new((width, height))),
            sequence: Arc::new(Mutex::new(0)),
        }
    }

    /// Changes the geometry reported by subsequent grabs.
    pub fn resize(&self, width: u32, height: u32) {
        *lock_slot(&self.geometry) = (width, height);
    }
}

impl FrameGrabber for SyntheticDisplay {
    fn grab(&self, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        let (width, height) = *lock_slot(&self.geometry);

        let mut sequence = lock_slot(&self.sequence);
        *sequence += 1;

        let byte = (*sequence % 255) as u8;
        let rgba_len = (width as usize) * (height as usize) * 4;
        Frame::new(width, height, captured_at_ms, vec![byte; rgba_len])
            .map_err(|error| CaptureError::Backend(error.to_string()))
    }
}

/// Deterministic capture adapter for tests and CI.
#[derive(Debug)]
pub struct SyntheticCaptureAdapter {
    display: SyntheticDisplay,
    next_failure: Mutex<Option<CaptureError>>,
    acquired: Mutex<Vec<CaptureSource>>,
}

impl SyntheticCaptureAdapter {
    /// Creates an adapter backed by one 4x4 synthetic display.
    pub fn new() -> Self {
        Self::with_display(SyntheticDisplay::new(4, 4))
    }

    /// Creates an adapter backed by a caller-provided display.
    pub fn with_display(display: SyntheticDisplay) -> Self {
        Self {
            display,
            next_failure: Mutex::new(None),
            acquired: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next acquisition fail with `error`.
    pub fn fail_next_with(&self, error: CaptureError) {
        *lock_slot(&self.next_failure) = Some(error);
    }

    /// Returns the display shared by every source this adapter hands out.
    pub fn display(&self) -> SyntheticDisplay {
        self.display.clone()
    }

    /// Returns every source acquired so far, oldest first.
    pub fn acquired_sources(&self) -> Vec<CaptureSource> {
        lock_slot(&self.acquired).clone()
    }
}

impl Default for SyntheticCaptureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureAdapter for SyntheticCaptureAdapter {
    async fn acquire(&self) -> Result<CaptureSource, CaptureError> {
        if let Some(error) = lock_slot(&self.next_failure).take() {
            return Err(error);
        }

        let source = CaptureSource::new("Synthetic Display", self.display.clone());
        lock_slot(&self.acquired).push(source.clone());
        Ok(source)
    }
}

/// Capture layer error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user or OS refused screen-sharing permission.
    #[error("screen capture permission denied")]
    PermissionDenied,
    /// A system or administrator policy blocks screen capture.
    #[error("screen capture blocked by policy")]
    PolicyBlocked,
    /// The platform offers no usable capture surface.
    #[error("screen capture is not supported on this platform")]
    Unsupported,
    /// Acquisition failed for an unclassified reason.
    #[error("screen capture failed: {0}")]
    Unknown(String),
    /// Operation on a source that was already released.
    #[error("capture source already released")]
    Released,
    /// The underlying surface went away while the source was live.
    #[error("capture source lost: {0}")]
    SourceLost(String),
    /// Frame could not be encoded as a still image.
    #[error("snapshot encoding failed: {0}")]
    Encoding(String),
    /// Backend runtime failure.
    #[error("capture backend failure: {0}")]
    Backend(String),
}

impl CaptureError {
    /// Returns the message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => {
                "Screen sharing permission was denied. Allow screen capture and try again."
            }
            CaptureError::PolicyBlocked => {
                "Screen capture is blocked by a system or administrator policy."
            }
            CaptureError::Unsupported => "Screen capture is not supported on this system.",
            _ => "Could not start screen capture. Please try again.",
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn lock_slot<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
