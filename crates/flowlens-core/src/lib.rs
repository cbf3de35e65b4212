#![warn(missing_docs)]
//! # flowlens-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `flowlens` workspace.
//!
//! ## Responsibilities
//! - Represent raw captured frames and their still-image encodings.
//! - Represent automation suggestions, generated guides, and history records.
//! - Provide relevance ordering and step-numbering checks for model output.
//!
//! ## Data flow
//! Capture code emits [`Frame`] values, the snapshotter turns them into an
//! [`ImageEncoding`], the inference gateway returns [`Suggestion`] and
//! [`Guide`] values, and the history store wraps guides in [`HistoryRecord`].
//!
//! ## Ownership and lifetimes
//! Every value owns its buffers and strings. A snapshot is copied into each
//! pipeline stage, so no stage ever borrows from a live capture source.
//!
//! ## Error model
//! Shape and contract violations return [`CoreError`] variants.
//!
//! ## Example
//! ```rust
//! use flowlens_core::ImageEncoding;
//!
//! let image = ImageEncoding::new("data:image/png;base64,iVBORw0KGgo=").unwrap();
//! assert_eq!(image.payload(), "iVBORw0KGgo=");
//! assert_eq!(image.mime_type(), "image/png");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mime type assumed when an encoding carries no data-URL tag.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Lowest relevance score the analysis contract allows.
pub const MIN_RELEVANCE_SCORE: u8 = 1;

/// Highest relevance score the analysis contract allows.
pub const MAX_RELEVANCE_SCORE: u8 = 100;

/// One raw frame grabbed from a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Grab time in Unix epoch milliseconds.
    pub captured_at_ms: u64,
    /// Raw RGBA pixel buffer (`width * height * 4` bytes).
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Constructs a validated frame.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFrameShape`] when the pixel buffer length is
    /// not exactly `width * height * 4`, and [`CoreError::EmptyFrame`] when
    /// either dimension is zero.
    pub fn new(
        width: u32,
        height: u32,
        captured_at_ms: u64,
        rgba: Vec<u8>,
    ) -> Result<Self, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::EmptyFrame);
        }

        let expected_len = required_rgba_len(width, height)?;
        if rgba.len() != expected_len {
            return Err(CoreError::InvalidFrameShape {
                expected: expected_len,
                actual: rgba.len(),
            });
        }

        Ok(Self {
            width,
            height,
            captured_at_ms,
            rgba,
        })
    }
}

/// Still-image encoding in base64 text form, optionally data-URL tagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageEncoding {
    encoded: String,
}

impl ImageEncoding {
    /// Wraps an existing base64 or data-URL string.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyImage`] when the base64 payload is blank.
    pub fn new(encoded: impl Into<String>) -> Result<Self, CoreError> {
        let encoded = encoded.into();
        let image = Self { encoded };
        if image.payload().trim().is_empty() {
            return Err(CoreError::EmptyImage);
        }
        Ok(image)
    }

    /// Builds a `data:<mime>;base64,` tagged encoding from a raw base64 payload.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyImage`] when `base64_payload` is blank.
    pub fn from_base64(mime_type: &str, base64_payload: &str) -> Result<Self, CoreError> {
        Self::new(format!("data:{mime_type};base64,{base64_payload}"))
    }

    /// Returns the full stored text, tag included.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Returns the base64 payload with any data-URL scheme tag stripped.
    pub fn payload(&self) -> &str {
        match self.split_data_url() {
            Some((_, payload)) => payload,
            None => &self.encoded,
        }
    }

    /// Returns the mime type from the data-URL tag, or [`DEFAULT_IMAGE_MIME`].
    pub fn mime_type(&self) -> &str {
        match self.split_data_url() {
            Some((mime, _)) if !mime.is_empty() => mime,
            _ => DEFAULT_IMAGE_MIME,
        }
    }

    /// Returns the payload size in bytes of base64 text.
    pub fn payload_len(&self) -> usize {
        self.payload().len()
    }

    fn split_data_url(&self) -> Option<(&str, &str)> {
        let rest = self.encoded.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64").unwrap_or(header);
        Some((mime, payload))
    }
}

/// One candidate automation opportunity returned by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Identifier, unique within one analysis batch.
    pub id: String,
    /// Short name of the workflow to automate.
    pub title: String,
    /// Free-text estimate of the time the automation saves.
    pub estimated_time_savings: String,
    /// Tools the automation would use, in suggested order.
    pub tools: Vec<String>,
    /// Longer description of the opportunity.
    pub description: String,
    /// Relevance score in `[1, 100]` (see [`MIN_RELEVANCE_SCORE`]).
    pub relevance_score: u8,
}

/// Orders suggestions by descending relevance.
///
/// The sort is stable, so equally scored suggestions keep the order the
/// model returned them in.
pub fn sort_by_relevance(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|left, right| right.relevance_score.cmp(&left.relevance_score));
}

/// One numbered instruction inside a [`Guide`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 1-based position of the step.
    pub step_number: u32,
    /// What the user should do.
    pub instruction: String,
    /// Visual pointer to the on-screen element involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_description: Option<String>,
    /// Code the user can paste for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    /// Contextual note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

/// Structured, numbered how-to derived from one suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    /// Back-reference to the suggestion the guide was elaborated from.
    #[serde(default)]
    pub suggestion_id: String,
    /// Guide title.
    pub title: String,
    /// Things the user needs before starting.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Ordered steps, numbered from 1.
    pub steps: Vec<Step>,
}

impl Guide {
    /// Checks that step numbers run 1, 2, 3, ... in list order.
    ///
    /// The guide is never rewritten; callers decide what to do with the report.
    ///
    /// # Errors
    /// Returns [`CoreError::StepNumbering`] for the first step whose number
    /// does not match its position.
    pub fn check_step_numbering(&self) -> Result<(), CoreError> {
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.step_number != expected {
                return Err(CoreError::StepNumbering {
                    position: index,
                    expected,
                    actual: step.step_number,
                });
            }
        }
        Ok(())
    }
}

/// Persisted guide with identity and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Unique record id.
    pub id: String,
    /// Owned copy of the guide.
    pub guide: Guide,
    /// Creation instant in Unix epoch milliseconds.
    pub timestamp_ms: u64,
}

/// Error type for core validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Frame buffer shape does not match declared geometry.
    #[error("invalid frame shape: expected {expected} bytes, got {actual}")]
    InvalidFrameShape {
        /// Expected RGBA byte count.
        expected: usize,
        /// Actual RGBA byte count.
        actual: usize,
    },
    /// Frame has a zero dimension.
    #[error("frame has zero width or height")]
    EmptyFrame,
    /// Frame dimensions overflow addressable memory.
    #[error("frame dimensions overflow")]
    DimensionOverflow,
    /// Image encoding carries no payload.
    #[error("image encoding is empty")]
    EmptyImage,
    /// Guide steps are not numbered contiguously from 1.
    #[error("step at position {position} is numbered {actual}, expected {expected}")]
    StepNumbering {
        /// Zero-based index of the offending step.
        position: usize,
        /// Number the step should carry.
        expected: u32,
        /// Number the step actually carries.
        actual: u32,
    },
}

fn required_rgba_len(width: u32, height: u32) -> Result<usize, CoreError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(CoreError::DimensionOverflow)
}
