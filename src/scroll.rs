//! Convergent scrolling for lazily-loaded pages and panels.
//!
//! Dynamically-loaded lists append content on scroll events with
//! unpredictable timing, so a single wait-then-read is unreliable. The
//! controller instead samples repeatedly: advance the scroll position a
//! fixed step, let the page settle, re-run the extraction, and stop once the
//! extracted set has plateaued for long enough or the step budget runs out.
//! Budget exhaustion is a soft outcome, not an error: whatever was collected
//! is returned.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, trace};

use crate::error::SessionError;
use crate::session::{Session, Target};

const PAGE_METRICS_SCRIPT: &str =
    "return [window.scrollY, document.documentElement.scrollHeight, window.innerHeight];";

const PAGE_SCROLL_SCRIPT: &str = "window.scrollBy(0, arguments[0]);";

const PANEL_SCROLL_CSS_SCRIPT: &str =
    "const el = document.querySelector(arguments[0]); if (el) { el.scrollTop += arguments[1]; }";

const PANEL_SCROLL_XPATH_SCRIPT: &str = "const el = document.evaluate(arguments[0], document, \
     null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; \
     if (el) { el.scrollTop += arguments[1]; }";

/// Tunables for one scroll run.
#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    pub step_px: u32,
    pub max_steps: u32,
    /// Consecutive no-growth observations required to declare convergence.
    pub stability_threshold: u32,
    /// Pause after each step so asynchronous content can render.
    pub settle_delay: Duration,
}

/// What to drive: the viewport itself or a scrollable sub-panel.
///
/// The page flavor can read a percentage progress metric from viewport
/// scripts; a modal panel exposes no total, so the panel flavor just
/// accumulates `scrollTop`. Termination logic is shared.
#[derive(Debug, Clone)]
pub enum ScrollTarget {
    Page,
    Panel(Target),
}

/// A re-runnable extraction sampled between scroll advances.
#[async_trait]
pub trait SetExtractor: Send {
    type Item: Send;

    async fn extract(
        &mut self,
        session: &mut dyn Session,
    ) -> Result<Vec<Self::Item>, SessionError>;
}

#[derive(Debug)]
pub struct ScrollOutcome<T> {
    pub items: Vec<T>,
    /// Scroll advances actually performed.
    pub steps: u32,
    /// False when the step budget ran out before the set stabilized.
    pub converged: bool,
}

enum PageProgress {
    /// Content already fits the viewport; the scroll range is zero and there
    /// is nothing to advance through.
    FullyVisible,
    Percent(f64),
}

async fn page_progress(session: &mut dyn Session) -> Result<PageProgress, SessionError> {
    let value = session.execute_script(PAGE_METRICS_SCRIPT, Vec::new()).await?;
    let metrics: Vec<f64> = serde_json::from_value(value)
        .map_err(|e| SessionError::Script(format!("bad page metrics: {e}")))?;
    let [scroll_top, scroll_height, client_height] = metrics[..] else {
        return Err(SessionError::Script(
            "expected three page metrics".to_string(),
        ));
    };

    let range = scroll_height - client_height;
    if range <= 0.0 {
        return Ok(PageProgress::FullyVisible);
    }
    Ok(PageProgress::Percent((scroll_top / range) * 100.0))
}

async fn advance(
    session: &mut dyn Session,
    target: &ScrollTarget,
    step_px: u32,
) -> Result<(), SessionError> {
    match target {
        ScrollTarget::Page => {
            session
                .execute_script(PAGE_SCROLL_SCRIPT, vec![json!(step_px)])
                .await?;
        }
        ScrollTarget::Panel(Target::Css(selector)) => {
            session
                .execute_script(PANEL_SCROLL_CSS_SCRIPT, vec![json!(selector), json!(step_px)])
                .await?;
        }
        ScrollTarget::Panel(Target::XPath(expression)) => {
            session
                .execute_script(
                    PANEL_SCROLL_XPATH_SCRIPT,
                    vec![json!(expression), json!(step_px)],
                )
                .await?;
        }
    }
    Ok(())
}

/// Bounded wait for the page to grow a scrollbar. Returns false when none
/// appears within `timeout`; for a results page that usually means a
/// degenerate or empty result list, which is diagnostic rather than fatal.
pub async fn wait_for_scrollbar(
    session: &mut dyn Session,
    timeout: Duration,
) -> Result<bool, SessionError> {
    const POLL: Duration = Duration::from_millis(250);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match page_progress(session).await? {
            PageProgress::Percent(_) => return Ok(true),
            PageProgress::FullyVisible => {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(false);
                }
                tokio::time::sleep(POLL.min(timeout)).await;
            }
        }
    }
}

/// Drive `target` until the extracted set stops growing or the budget runs
/// out.
///
/// One extraction happens up front, then one after every advance. The
/// plateau streak counts consecutive reads without growth, starting over
/// whenever the set grows; once it reaches `stability_threshold` the run is
/// converged. A page whose content already fits the viewport converges
/// immediately after the first extraction, and the page flavor also stops
/// as soon as the viewport reports the bottom of its scroll range. A panel
/// exposes no such metric and relies on the plateau alone.
pub async fn scroll_until_stable<E>(
    session: &mut dyn Session,
    target: &ScrollTarget,
    policy: &ScrollPolicy,
    extractor: &mut E,
) -> Result<ScrollOutcome<E::Item>, SessionError>
where
    E: SetExtractor,
{
    let mut items = extractor.extract(session).await?;

    if matches!(target, ScrollTarget::Page)
        && matches!(page_progress(session).await?, PageProgress::FullyVisible)
    {
        debug!("content already fully visible; nothing to scroll");
        return Ok(ScrollOutcome {
            items,
            steps: 0,
            converged: true,
        });
    }

    let mut streak: u32 = 1;
    let mut steps: u32 = 0;
    let mut bottomed = false;

    while !bottomed && streak < policy.stability_threshold && steps < policy.max_steps {
        advance(session, target, policy.step_px).await?;
        tokio::time::sleep(policy.settle_delay).await;
        steps += 1;

        let next = extractor.extract(session).await?;
        if next.len() > items.len() {
            streak = 1;
        } else {
            streak += 1;
        }
        items = next;

        trace!(
            steps,
            streak,
            size = items.len(),
            "scroll sample"
        );

        // Lazy loading grows the page under us, so hitting 100% only holds
        // until the next batch of content lands; a reading at the bottom is
        // still a reading of a fully materialized page.
        if matches!(target, ScrollTarget::Page) {
            bottomed = match page_progress(session).await? {
                PageProgress::FullyVisible => true,
                PageProgress::Percent(pct) => pct >= 100.0,
            };
        }
    }

    let converged = bottomed || streak >= policy.stability_threshold;
    if bottomed {
        debug!(steps, size = items.len(), "reached the bottom of the page");
    } else if converged {
        debug!(steps, size = items.len(), "scroll converged");
    } else {
        debug!(steps, size = items.len(), "scroll budget exhausted");
    }

    Ok(ScrollOutcome {
        items,
        steps,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::session::mock::MockSession;

    /// Returns sets of scripted sizes, one per extraction call, repeating
    /// the last size once the script runs out.
    struct ScriptedExtractor {
        sizes: Vec<usize>,
        calls: usize,
    }

    impl ScriptedExtractor {
        fn new(sizes: &[usize]) -> Self {
            Self {
                sizes: sizes.to_vec(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl SetExtractor for ScriptedExtractor {
        type Item = usize;

        async fn extract(
            &mut self,
            _session: &mut dyn Session,
        ) -> Result<Vec<usize>, SessionError> {
            let size = self
                .sizes
                .get(self.calls)
                .or(self.sizes.last())
                .copied()
                .unwrap_or(0);
            self.calls += 1;
            Ok(vec![0; size])
        }
    }

    /// Extracted set that grows by one element on every call, forever.
    struct GrowingExtractor {
        calls: usize,
    }

    #[async_trait]
    impl SetExtractor for GrowingExtractor {
        type Item = usize;

        async fn extract(
            &mut self,
            _session: &mut dyn Session,
        ) -> Result<Vec<usize>, SessionError> {
            self.calls += 1;
            Ok(vec![0; self.calls])
        }
    }

    fn fast_policy(max_steps: u32, stability_threshold: u32) -> ScrollPolicy {
        ScrollPolicy {
            step_px: 500,
            max_steps,
            stability_threshold,
            settle_delay: Duration::ZERO,
        }
    }

    fn panel() -> ScrollTarget {
        ScrollTarget::Panel(Target::css("div[data-cmp='modalScrollPanel']"))
    }

    #[tokio::test]
    async fn converges_once_the_set_plateaus() {
        let mut session = MockSession::new();
        let mut extractor = ScriptedExtractor::new(&[3, 5, 5, 5, 5, 5]);

        let outcome = scroll_until_stable(&mut session, &panel(), &fast_policy(100, 5), &mut extractor)
            .await
            .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.items.len(), 5);
        assert_eq!(extractor.calls, 6);
    }

    #[tokio::test]
    async fn stops_at_the_step_budget_when_content_keeps_growing() {
        let mut session = MockSession::new();
        let mut extractor = GrowingExtractor { calls: 0 };

        let outcome = scroll_until_stable(&mut session, &panel(), &fast_policy(100, 5), &mut extractor)
            .await
            .unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.steps, 100);
        assert_eq!(outcome.items.len(), 101);
    }

    #[tokio::test]
    async fn page_flavor_stops_at_the_bottom_before_the_plateau() {
        // First metrics read is at the top; every later read reports the
        // scroll position at the end of the range. The set is still growing,
        // so termination can only come from the bottom check.
        let mut reads = 0u32;
        let mut session = MockSession::new().with_script_handler(move |script, _args| {
            if script.contains("scrollHeight") {
                reads += 1;
                if reads == 1 {
                    json!([0.0, 2000.0, 800.0])
                } else {
                    json!([1200.0, 2000.0, 800.0])
                }
            } else {
                Value::Null
            }
        });
        let mut extractor = GrowingExtractor { calls: 0 };

        let outcome = scroll_until_stable(
            &mut session,
            &ScrollTarget::Page,
            &fast_policy(100, 5),
            &mut extractor,
        )
        .await
        .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.steps, 1);
        assert_eq!(extractor.calls, 2);
    }

    #[tokio::test]
    async fn page_with_no_overflow_converges_immediately() {
        // scrollHeight == innerHeight: the scroll range is zero, so the
        // percentage metric must not be computed at all.
        let mut session = MockSession::new().with_script_handler(|script, _args| {
            if script.contains("scrollHeight") {
                json!([0.0, 800.0, 800.0])
            } else {
                Value::Null
            }
        });
        let mut extractor = ScriptedExtractor::new(&[4]);

        let outcome = scroll_until_stable(
            &mut session,
            &ScrollTarget::Page,
            &fast_policy(100, 5),
            &mut extractor,
        )
        .await
        .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.items.len(), 4);
        assert_eq!(extractor.calls, 1);
    }

    #[tokio::test]
    async fn scrollbar_wait_reports_absence_without_failing() {
        let mut session = MockSession::new().with_script_handler(|script, _args| {
            if script.contains("scrollHeight") {
                json!([0.0, 600.0, 800.0])
            } else {
                Value::Null
            }
        });

        let found = wait_for_scrollbar(&mut session, Duration::ZERO).await.unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn scrollbar_wait_detects_overflow() {
        let mut session = MockSession::new().with_script_handler(|script, _args| {
            if script.contains("scrollHeight") {
                json!([0.0, 4000.0, 800.0])
            } else {
                Value::Null
            }
        });

        let found = wait_for_scrollbar(&mut session, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(found);
    }
}
