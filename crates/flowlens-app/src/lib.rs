#![warn(missing_docs)]
//! # flowlens-app
//!
//! ## Purpose
//! Wires configuration, logging, and the concrete collaborators into a
//! running [`SessionController`].
//!
//! ## Responsibilities
//! - Resolve [`AppConfig`] from flags and environment variables.
//! - Install the `tracing` subscriber.
//! - Enforce HTTPS endpoints and the capture kill switch.
//! - Build the controller from screen capture, the HTTP gateway, and the
//!   JSON history file.
//!
//! ## Data flow
//! Flags/env -> [`AppConfig`] -> [`build_controller`] -> terminal driver in
//! `main.rs`.
//!
//! ## Error model
//! Startup failures are wrapped in [`AppError`]; once running, the session
//! reports failures through its snapshots.
//!
//! ## Security and privacy notes
//! - The API key is only handed to the HTTP transport and never logged.
//! - [`redact_sensitive`] strips credential markers from loggable text.
//! - `FLOWLENS_CAPTURE_ENABLED=0|false|off` blocks every acquisition.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use flowlens_capture::{
    CaptureAdapter, CaptureError, CaptureSource, ScreenCaptureAdapter, SyntheticCaptureAdapter,
};
use flowlens_history::{DEFAULT_CAPACITY, HistoryError, JsonFileHistory};
use flowlens_inference::{GatewayClient, HttpTransport, HttpTransportConfig, InferenceError};
use flowlens_session::{SessionConfig, SessionController, SessionError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Build-time application version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("FLOWLENS_VERSION");

/// Env var holding the capture kill switch.
pub const CAPTURE_ENABLED_ENV: &str = "FLOWLENS_CAPTURE_ENABLED";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "flowlens=info";

/// Runtime configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "flowlens")]
#[command(about = "Watches your screen and suggests automations with step-by-step guides")]
#[command(version = APP_VERSION)]
pub struct AppConfig {
    /// API key for the inference service.
    #[arg(long, env = "FLOWLENS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Inference service base URL; must be HTTPS.
    #[arg(
        long,
        env = "FLOWLENS_ENDPOINT",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub endpoint: String,

    /// Vision model identifier.
    #[arg(long, env = "FLOWLENS_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    /// Seconds between background scans.
    #[arg(long, env = "FLOWLENS_AUTO_SCAN_SECS", default_value_t = 5)]
    pub auto_scan_secs: u64,

    /// JSON file holding saved guides.
    #[arg(long, env = "FLOWLENS_HISTORY_PATH", default_value = "flowlens-history.json")]
    pub history_path: PathBuf,

    /// Per-request timeout for inference calls.
    #[arg(long, env = "FLOWLENS_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Index of the display to capture.
    #[arg(long, env = "FLOWLENS_DISPLAY", default_value_t = 0)]
    pub display: usize,

    /// Capture a synthetic test pattern instead of a real display.
    #[arg(long, env = "FLOWLENS_SYNTHETIC_CAPTURE")]
    pub synthetic_capture: bool,
}

impl AppConfig {
    /// Checks values that clap cannot check on its own.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for a non-HTTPS endpoint, a missing API
    /// key, or zero periods.
    pub fn validate(&self) -> Result<(), AppError> {
        if !is_https_endpoint(&self.endpoint) {
            return Err(AppError::Config(format!(
                "endpoint must be an https url: {}",
                redact_sensitive(&self.endpoint)
            )));
        }
        if self.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
            return Err(AppError::Config(
                "an API key is required (--api-key or FLOWLENS_API_KEY)".to_string(),
            ));
        }
        if self.auto_scan_secs == 0 {
            return Err(AppError::Config("auto-scan period must be at least 1 second".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request timeout must be at least 1 second".to_string()));
        }
        Ok(())
    }

    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            auto_scan_interval: Duration::from_secs(self.auto_scan_secs),
        }
    }
}

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs the global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. Calling this twice is
/// harmless.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns `true` when `endpoint` parses as an HTTPS URL.
pub fn is_https_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint)
        .map(|url| url.scheme() == "https")
        .unwrap_or(false)
}

const SECRET_MARKERS: [&str; 7] = [
    "api-key",
    "api_key",
    "key=",
    "token",
    "authorization",
    "bearer",
    "password",
];

/// Redacts everything from the first credential marker onwards.
pub fn redact_sensitive(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let first = SECRET_MARKERS
        .iter()
        .filter_map(|marker| lower.find(marker).map(|position| (position, *marker)))
        .min_by_key(|(position, _)| *position);

    match first {
        Some((position, marker)) => {
            let name = &input[position..position + marker.trim_end_matches('=').len()];
            format!("{}{name}=<redacted>", &input[..position])
        }
        None => input.to_string(),
    }
}

/// Interprets a kill-switch value.
///
/// Unset or any value other than `0`, `false`, `off` (case-insensitive)
/// leaves capture enabled.
pub fn capture_enabled_from(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !matches!(normalized.as_str(), "0" | "false" | "off")
        }
        None => true,
    }
}

/// Reads the kill switch from [`CAPTURE_ENABLED_ENV`].
pub fn capture_enabled_from_env() -> bool {
    capture_enabled_from(std::env::var(CAPTURE_ENABLED_ENV).ok().as_deref())
}

/// Capture adapter that refuses acquisition while the kill switch is off.
///
/// The switch is read on every acquisition, so flipping the variable takes
/// effect without a restart.
pub struct GatedCaptureAdapter {
    inner: Arc<dyn CaptureAdapter>,
}

impl GatedCaptureAdapter {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn CaptureAdapter>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CaptureAdapter for GatedCaptureAdapter {
    async fn acquire(&self) -> Result<CaptureSource, CaptureError> {
        if !capture_enabled_from_env() {
            tracing::warn!(env = CAPTURE_ENABLED_ENV, "capture blocked by kill switch");
            return Err(CaptureError::PolicyBlocked);
        }
        self.inner.acquire().await
    }
}

/// Builds the controller from validated config.
///
/// # Errors
/// Returns [`AppError`] when the config is invalid, the transport cannot be
/// built, or the history file cannot be opened.
pub fn build_controller(config: &AppConfig) -> Result<SessionController, AppError> {
    config.validate()?;

    let capture: Arc<dyn CaptureAdapter> = if config.synthetic_capture {
        Arc::new(SyntheticCaptureAdapter::new())
    } else {
        Arc::new(ScreenCaptureAdapter::new(config.display))
    };
    let capture = Arc::new(GatedCaptureAdapter::new(capture));

    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: config.endpoint.clone(),
        model: config.model.clone(),
        api_key: config.api_key.clone().unwrap_or_default(),
        timeout: Duration::from_secs(config.request_timeout_secs),
    })?;
    let gateway = Arc::new(GatewayClient::new(Arc::new(transport)));

    let history = Arc::new(JsonFileHistory::open(&config.history_path, DEFAULT_CAPACITY)?);

    tracing::info!(
        version = APP_VERSION,
        model = %config.model,
        history = %config.history_path.display(),
        auto_scan_secs = config.auto_scan_secs,
        synthetic_capture = config.synthetic_capture,
        "flowlens configured"
    );
    Ok(SessionController::new(
        config.session_config(),
        capture,
        gateway,
        history,
    ))
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Inference transport could not be built.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
    /// History file could not be opened.
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    /// Session rejected an intent.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// Terminal I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
