//! Field-level extraction: listing links, image URLs, and the text
//! normalization helpers shared by the orchestrators.

pub mod images;
pub mod links;
pub mod text;

use crate::error::{ScrapeError, SessionError};
use crate::session::{Session, Target};

/// Marker the site renders when it is rate-limiting or the listing is gone.
const UNAVAILABLE_MARKER: &str = "site is currently unavailable";

/// Shared precondition: abort the current unit of work when the site signals
/// unavailability. The caller decides on backoff; nothing is retried here.
pub async fn ensure_page_available(session: &mut dyn Session) -> Result<(), ScrapeError> {
    let content = session.page_content().await?;
    if content.contains(UNAVAILABLE_MARKER) {
        return Err(ScrapeError::PageUnavailable);
    }
    Ok(())
}

/// Per-field guard: absence (missing element, timed-out wait) becomes a null
/// field; anything else propagates and aborts the whole attempt.
pub(crate) async fn optional_text(
    session: &mut dyn Session,
    target: &Target,
) -> Result<Option<String>, SessionError> {
    match session.find_element(target).await {
        Ok(element) => Ok(Some(element.text)),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}
