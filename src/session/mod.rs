//! The browsable-session capability the core is written against.
//!
//! The core never talks to a browser directly; everything goes through
//! [`Session`], which a WebDriver-backed implementation (or a test mock)
//! provides. Each session has exactly one logical owner at a time, and
//! whoever owns it is responsible for calling [`Session::close`] on every
//! exit path.

mod webdriver;

#[cfg(test)]
pub mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;

pub use webdriver::WebDriverSession;

/// How long [`Session::wait_for_visible`] sleeps between polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A locator for elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Css(String),
    XPath(String),
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Css(s) => write!(f, "css `{s}`"),
            Target::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// Snapshot of a matched element: its visible text plus the two attributes
/// this crate ever reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub text: String,
    pub href: Option<String>,
    pub src: Option<String>,
}

#[async_trait]
pub trait Session: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    async fn current_location(&mut self) -> Result<String, SessionError>;

    /// Raw source of the current page.
    async fn page_content(&mut self) -> Result<String, SessionError>;

    async fn find_element(&mut self, target: &Target) -> Result<Element, SessionError>;

    async fn find_elements(&mut self, target: &Target) -> Result<Vec<Element>, SessionError>;

    async fn click(&mut self, target: &Target) -> Result<(), SessionError>;

    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError>;

    /// Release the underlying browser. Further calls fail with
    /// [`SessionError::Closed`].
    async fn close(&mut self) -> Result<(), SessionError>;

    /// Poll for an element until it appears or `timeout` elapses. Every wait
    /// in this crate is bounded; there is no unbounded variant.
    async fn wait_for_visible(
        &mut self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Element, SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.find_element(target).await {
                Ok(element) => return Ok(element),
                Err(SessionError::ElementNotFound(_)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(SessionError::Timeout(timeout, target.to_string()));
                    }
                    tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
