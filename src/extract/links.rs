//! Listing-link extraction from a search-results page.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::SessionError;
use crate::models::ListingLink;
use crate::scroll::SetExtractor;
use crate::session::{Session, Target};

/// Href prefix every vehicle listing anchor carries.
pub const LISTING_HREF_PREFIX: &str = "/cars-for-sale/vehicle/";

pub fn listing_anchor_target() -> Target {
    Target::xpath(format!(
        "//a[starts-with(@href, \"{LISTING_HREF_PREFIX}\")]"
    ))
}

/// Pull (label, href) pairs for every listing anchor currently on the page.
///
/// Waits up to `wait_timeout` for the first anchor to appear; a timeout
/// yields an empty sequence rather than an error, since a search legitimately
/// may have zero results. Relative hrefs are resolved against the page the
/// session is on; beyond that, validation belongs to the record assembler.
pub async fn extract_listing_links(
    session: &mut dyn Session,
    wait_timeout: Duration,
) -> Result<Vec<ListingLink>, SessionError> {
    let target = listing_anchor_target();

    match session.wait_for_visible(&target, wait_timeout).await {
        Ok(_) => {}
        Err(e) if e.is_absence() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let base = session.current_location().await?;
    let elements = session.find_elements(&target).await?;
    Ok(elements
        .into_iter()
        .filter_map(|element| {
            element.href.map(|href| ListingLink {
                label: element.text,
                url: absolutize(&base, href),
            })
        })
        .collect())
}

/// Listing anchors carry site-relative hrefs in the markup, and a session
/// backend that reports the attribute literally hands those through
/// unresolved. Downstream canonicalization only accepts absolute URLs, so
/// resolve here; an unresolvable base leaves the href untouched.
fn absolutize(base: &str, href: String) -> String {
    if !href.starts_with('/') {
        return href;
    }
    match Url::parse(base).and_then(|base| base.join(&href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href,
    }
}

/// Extractor the scroll controller re-runs while the results page loads more
/// listings. Only the first call pays the visibility wait; later samples
/// read whatever is present.
pub struct ListingLinkExtractor {
    wait_timeout: Duration,
    waited: bool,
}

impl ListingLinkExtractor {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            waited: false,
        }
    }
}

#[async_trait]
impl SetExtractor for ListingLinkExtractor {
    type Item = ListingLink;

    async fn extract(
        &mut self,
        session: &mut dyn Session,
    ) -> Result<Vec<ListingLink>, SessionError> {
        let timeout = if self.waited {
            Duration::ZERO
        } else {
            self.wait_timeout
        };
        self.waited = true;
        extract_listing_links(session, timeout).await
    }
}
