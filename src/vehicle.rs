//! Assembles one [`VehicleRecord`] from a listing page.
//!
//! Every field is extracted independently: listing layouts vary across
//! dealer templates and certified/used variants, so a missing price block
//! must not cost us the VIN or the photos. Partial data always beats no
//! data here. Only navigation-level failures (bad URL, unavailable page,
//! a broken session) abort the attempt.

use tracing::{debug, info};

use crate::config::{HeaderImagePolicy, ScrapeConfig};
use crate::error::{ScrapeError, SessionError};
use crate::extract::images::{GalleryImageExtractor, parse_image_reference};
use crate::extract::text::{
    canonicalize_vehicle_url, flatten_lines, last_flattened_segment, normalize_vin,
    vehicle_id_from_url,
};
use crate::extract::{ensure_page_available, optional_text};
use crate::models::{ImageReference, VehicleRecord};
use crate::scroll::{ScrollTarget, scroll_until_stable};
use crate::session::{Session, Target};

const HEADING_SELECTOR: &str = "h1[data-cmp=\"heading\"]#vehicle-details-heading";
const PRICE_SELECTOR: &str = "[data-cmp=\"listingPrice\"]";
const VIN_SELECTOR: &str = "span.display-block.display-sm-inline-block";
const DETAILS_SELECTOR: &str = "ul[data-cmp=\"listColumns\"].list.columns.columns-1";
const NARRATIVE_SELECTOR: &str = "[data-cmp=\"seeMore\"]";
const HEADER_IMAGE_SELECTOR: &str = "[data-cmp=\"responsiveImage\"]";
const VIEW_ALL_MEDIA_XPATH: &str = "//p[normalize-space(text())='View All Media']";
const MODAL_PANEL_SELECTOR: &str = "div[data-cmp='modalScrollPanel']";

/// Visit one listing page and build its record.
///
/// The session is borrowed, not owned: the caller releases it. When this
/// returns an error for which [`ScrapeError::voids_session`] is true, the
/// caller must not reuse the session. Whether the record is worth
/// persisting (it has at least one image) is the orchestrator's call, not
/// ours.
pub async fn assemble_vehicle_record(
    session: &mut dyn Session,
    config: &ScrapeConfig,
    raw_url: &str,
) -> Result<VehicleRecord, ScrapeError> {
    let canonical_url = canonicalize_vehicle_url(raw_url)
        .ok_or_else(|| ScrapeError::InvalidUrl(raw_url.to_string()))?;
    let vehicle_id = vehicle_id_from_url(&canonical_url).to_string();

    session.navigate(&canonical_url).await?;
    info!("vehicle page [{canonical_url}] opened");

    // Availability first: an unavailable page never renders the heading,
    // and the bounded waits below must not be spent finding that out.
    ensure_page_available(session).await?;

    // The heading is the anchor field: give the page its full wait here so
    // the cheap direct lookups below run against a rendered page.
    let year_make_model = waited_text(session, &Target::css(HEADING_SELECTOR), config).await?;

    let list_price = optional_text(session, &Target::css(PRICE_SELECTOR))
        .await?
        .map(|text| last_flattened_segment(&flatten_lines(&text)));
    let vin = optional_text(session, &Target::css(VIN_SELECTOR))
        .await?
        .and_then(|text| normalize_vin(&text));
    let listing_details = optional_text(session, &Target::css(DETAILS_SELECTOR))
        .await?
        .map(|text| flatten_lines(&text));
    let listing_narrative = optional_text(session, &Target::css(NARRATIVE_SELECTOR))
        .await?
        .map(|text| flatten_lines(&text));
    let header_image_url = header_image(session).await?;

    let gallery = open_gallery_and_collect(session, config).await?;
    debug!("gallery yielded {} images", gallery.len());

    let mut image_urls: Vec<String> = gallery.iter().map(|r| r.url.clone()).collect();
    if let Some(header_url) = header_image_url {
        if keep_header_image(&header_url, &gallery, config.header_image_policy) {
            image_urls.push(header_url);
        }
    }
    info!("found {} images for vehicle {vehicle_id}", image_urls.len());

    Ok(VehicleRecord {
        vehicle_id,
        canonical_url,
        vin,
        year_make_model,
        list_price,
        listing_details,
        listing_narrative,
        image_urls,
    })
}

async fn waited_text(
    session: &mut dyn Session,
    target: &Target,
    config: &ScrapeConfig,
) -> Result<Option<String>, SessionError> {
    match session.wait_for_visible(target, config.wait_timeout).await {
        Ok(element) => Ok(Some(element.text)),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn header_image(session: &mut dyn Session) -> Result<Option<String>, SessionError> {
    match session
        .find_element(&Target::css(HEADER_IMAGE_SELECTOR))
        .await
    {
        Ok(element) => Ok(element.src),
        Err(e) if e.is_absence() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Click the gallery-opening control and drive the modal panel until the
/// image set stabilizes. A control or panel that never materializes is a
/// silent fallback to an empty gallery, not an error.
async fn open_gallery_and_collect(
    session: &mut dyn Session,
    config: &ScrapeConfig,
) -> Result<Vec<ImageReference>, SessionError> {
    let control = Target::xpath(VIEW_ALL_MEDIA_XPATH);
    match session.wait_for_visible(&control, config.wait_timeout).await {
        Ok(_) => {}
        Err(e) if e.is_absence() => {
            debug!("no gallery control on this listing");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    }
    match session.click(&control).await {
        Ok(()) => {}
        Err(e) if e.is_absence() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let panel = Target::css(MODAL_PANEL_SELECTOR);
    match session.wait_for_visible(&panel, config.wait_timeout).await {
        Ok(_) => {}
        Err(e) if e.is_absence() => {
            debug!("gallery panel never appeared");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    }

    let mut extractor = GalleryImageExtractor::new(&config.image_host_prefix);
    let outcome = scroll_until_stable(
        session,
        &ScrollTarget::Panel(panel),
        &config.scroll_policy(),
        &mut extractor,
    )
    .await?;
    Ok(outcome.items)
}

/// The header image may duplicate a gallery entry at another size; whether
/// that redundancy is kept is a policy choice, not a fixed behavior.
fn keep_header_image(
    header_url: &str,
    gallery: &[ImageReference],
    policy: HeaderImagePolicy,
) -> bool {
    match policy {
        HeaderImagePolicy::Append => true,
        HeaderImagePolicy::DedupeByIdentity => parse_image_reference(header_url)
            .map(|header| {
                !gallery
                    .iter()
                    .any(|entry| entry.identity_key == header.identity_key)
            })
            .unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::session::Element;
    use crate::session::mock::MockSession;

    fn test_config() -> ScrapeConfig {
        ScrapeConfig {
            wait_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
            stability_threshold: 2,
            max_scroll_steps: 5,
            ..ScrapeConfig::default()
        }
    }

    fn heading() -> Target {
        Target::css(HEADING_SELECTOR)
    }

    #[tokio::test]
    async fn invalid_url_fails_before_any_navigation() {
        let mut session = MockSession::new();
        let result =
            assemble_vehicle_record(&mut session, &test_config(), "https://example.com/other")
                .await;

        assert!(matches!(result, Err(ScrapeError::InvalidUrl(_))));
        assert!(session.visited.is_empty());
        assert!(!result.unwrap_err().voids_session());
    }

    #[tokio::test]
    async fn unavailable_page_aborts() {
        let mut session = MockSession::new().with_page("the site is currently unavailable");
        let result = assemble_vehicle_record(
            &mut session,
            &test_config(),
            "https://www.autotrader.com/cars-for-sale/vehicle/737243275?zip=92101",
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ScrapeError::PageUnavailable));
        assert!(err.voids_session());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_page_consumes_no_bounded_waits() {
        // With paused time, the clock only advances when something sleeps.
        // The abort must come straight from the availability check, before
        // any element wait gets a chance to poll out its timeout.
        let mut session = MockSession::new().with_page("the site is currently unavailable");
        let config = ScrapeConfig {
            wait_timeout: Duration::from_secs(10),
            ..test_config()
        };

        let started = tokio::time::Instant::now();
        let err = assemble_vehicle_record(
            &mut session,
            &config,
            "https://www.autotrader.com/cars-for-sale/vehicle/737243275",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScrapeError::PageUnavailable));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn partial_fields_still_yield_a_record() {
        // Price and VIN are missing; narrative and images are present. The
        // record must carry the latter with nulls for the former.
        let page = "\
            https://images.autotrader.com/scaler/500/a/abc123.jpg \
            https://images.autotrader.com/scaler/100/a/abc123.jpg";
        let mut session = MockSession::new()
            .with_page(page)
            .with_text_element(&heading(), "Certified 2021 Porsche Taycan")
            .with_text_element(&Target::css(NARRATIVE_SELECTOR), "One owner.\nClean title.")
            .with_element(
                &Target::css(HEADER_IMAGE_SELECTOR),
                Element {
                    text: String::new(),
                    href: None,
                    src: Some(
                        "https://images.autotrader.com/scaler/500/a/hdr.jpg".to_string(),
                    ),
                },
            );

        let record = assemble_vehicle_record(
            &mut session,
            &test_config(),
            "https://www.autotrader.com/cars-for-sale/vehicle/737243275?zip=92101",
        )
        .await
        .unwrap();

        assert_eq!(record.vehicle_id, "737243275");
        assert_eq!(record.vin, None);
        assert_eq!(record.list_price, None);
        assert_eq!(
            record.listing_narrative.as_deref(),
            Some("One owner.^Clean title.")
        );
        // No gallery control on this listing, so the image set falls back
        // to the header image alone.
        assert_eq!(
            record.image_urls,
            vec!["https://images.autotrader.com/scaler/500/a/hdr.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn gallery_images_are_collected_through_the_modal() {
        let page = "\
            https://images.autotrader.com/scaler/500/a/abc123.jpg \
            https://images.autotrader.com/scaler/100/a/abc123.jpg \
            https://images.autotrader.com/scaler/500/a/def456.jpg";
        let mut session = MockSession::new()
            .with_page(page)
            .with_text_element(&heading(), "Used 2022 Porsche Taycan")
            .with_text_element(&Target::xpath(VIEW_ALL_MEDIA_XPATH), "View All Media")
            .with_text_element(&Target::css(MODAL_PANEL_SELECTOR), "");

        let record = assemble_vehicle_record(
            &mut session,
            &test_config(),
            "https://www.autotrader.com/cars-for-sale/vehicle/736665996",
        )
        .await
        .unwrap();

        assert_eq!(record.image_urls.len(), 2);
        assert!(
            record
                .image_urls
                .iter()
                .all(|url| url.contains("/scaler/500/"))
        );
        assert_eq!(session.clicks.len(), 1);
    }

    #[tokio::test]
    async fn header_image_policy_controls_duplicates() {
        let gallery = vec![ImageReference {
            url: "https://images.autotrader.com/scaler/500/a/abc123.jpg".to_string(),
            identity_key: "abc123".to_string(),
            resolution_hint: 500,
        }];
        let header = "https://images.autotrader.com/scaler/100/a/abc123.jpg";

        assert!(keep_header_image(header, &gallery, HeaderImagePolicy::Append));
        assert!(!keep_header_image(
            header,
            &gallery,
            HeaderImagePolicy::DedupeByIdentity
        ));

        let fresh = "https://images.autotrader.com/scaler/100/a/zzz999.jpg";
        assert!(keep_header_image(
            fresh,
            &gallery,
            HeaderImagePolicy::DedupeByIdentity
        ));
    }
}
