//! Typed failures shared across the scraping core

use std::time::Duration;

use thiserror::Error;

/// Failures raised by the browsable-session capability.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No element on the current page matched the locator.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A bounded wait elapsed without the condition becoming true.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    /// The page returned something unusable from injected JavaScript.
    #[error("script error: {0}")]
    Script(String),

    /// The session was already released.
    #[error("session is closed")]
    Closed,

    #[error("webdriver error: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),

    #[error("webdriver connection error: {0}")]
    Connect(#[from] fantoccini::error::NewSessionError),
}

impl SessionError {
    /// True for the failures that per-field extraction guards absorb into a
    /// null value instead of propagating.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            SessionError::ElementNotFound(_) | SessionError::Timeout(..)
        )
    }
}

/// Failures for one unit of scraping work (one record or one search).
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The input URL does not carry a `/vehicle/<id>` segment. Raised before
    /// any navigation happens.
    #[error("url does not match the vehicle listing shape: {0}")]
    InvalidUrl(String),

    /// The site reported itself unavailable. Not retried in-process; the
    /// caller decides on backoff.
    #[error("site reported itself unavailable")]
    PageUnavailable,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ScrapeError {
    /// Whether the session that produced this error should be considered
    /// unusable. `InvalidUrl` fires before navigation, so the session is
    /// still good; everything else voids it.
    pub fn voids_session(&self) -> bool {
        !matches!(self, ScrapeError::InvalidUrl(_))
    }
}
