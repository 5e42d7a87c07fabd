//! One make/model search: navigate, scroll the results to the bottom,
//! extract and deduplicate listing links, and reconcile against the
//! page-reported total.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::{ScrapeError, SessionError};
use crate::extract::ensure_page_available;
use crate::extract::links::ListingLinkExtractor;
use crate::extract::text::parse_result_count;
use crate::geo::GeographyTable;
use crate::models::{ListingLink, Locality, SearchResultSet, SearchSpec};
use crate::scroll::{ScrollTarget, scroll_until_stable, wait_for_scrollbar};
use crate::session::{Session, Target};

const RESULTS_COUNT_SELECTOR: &str = "[data-cmp=\"resultsCount\"]";

/// The search URL is assembled from path segments and query parameters; a
/// radius of 0 means nationwide.
pub fn build_search_url(base_url: &str, spec: &SearchSpec, locality: &Locality) -> String {
    format!(
        "{base_url}/cars-for-sale/{make}/{model}/{slug}?firstRecord={first}&searchRadius={radius}&sortBy={sort}&zip={zip}",
        make = urlencoding::encode(&spec.make),
        model = urlencoding::encode(&spec.model),
        slug = urlencoding::encode(&locality.city_state_slug),
        first = spec.first_record,
        radius = spec.search_radius,
        sort = urlencoding::encode(&spec.sort_order),
        zip = urlencoding::encode(&locality.zip),
    )
}

/// Run one search against a borrowed session.
///
/// The result set is emitted even when it is incomplete: a shortfall
/// against the page-reported total is logged, never an error. Only an
/// unavailable page or a broken session aborts.
pub async fn run_search(
    session: &mut dyn Session,
    config: &ScrapeConfig,
    spec: &SearchSpec,
    geo: &GeographyTable,
) -> Result<SearchResultSet, ScrapeError> {
    let locality = match &spec.location {
        Some(locality) => locality.clone(),
        None => {
            let picked = geo.random().clone();
            info!(
                "no location given; picked {} at random",
                picked.city_state_slug
            );
            picked
        }
    };

    let url = build_search_url(&config.base_url, spec, &locality);
    info!("search [{url}] opened");
    session.navigate(&url).await?;

    ensure_page_available(session).await?;

    if !wait_for_scrollbar(session, config.wait_timeout).await? {
        debug!("no scrollbar within {:?}; results page may be empty", config.wait_timeout);
    }

    let mut extractor = ListingLinkExtractor::new(config.wait_timeout);
    let outcome = scroll_until_stable(
        session,
        &ScrollTarget::Page,
        &config.scroll_policy(),
        &mut extractor,
    )
    .await?;

    // Final dedup key is the raw URL string.
    let mut seen = HashSet::new();
    let listings: Vec<ListingLink> = outcome
        .items
        .into_iter()
        .filter(|listing| seen.insert(listing.url.clone()))
        .collect();

    let expected_count = read_result_count(session).await?;
    let actual_count = listings.len();

    let results = SearchResultSet {
        search_url: session.current_location().await.map_err(ScrapeError::Session)?,
        timestamp: Utc::now(),
        make: spec.make.clone(),
        model: spec.model.clone(),
        search_metadata: serde_json::to_string(spec).unwrap_or_default(),
        listings,
        expected_count,
        actual_count,
    };

    match results.shortfall() {
        Some(missing) => warn!(
            "found {actual_count} / {expected_count} listings; {missing} are missing"
        ),
        None => info!("found {actual_count} / {expected_count} listings"),
    }

    Ok(results)
}

async fn read_result_count(session: &mut dyn Session) -> Result<i64, SessionError> {
    match session
        .find_element(&Target::css(RESULTS_COUNT_SELECTOR))
        .await
    {
        Ok(element) => Ok(parse_result_count(&element.text)),
        Err(e) if e.is_absence() => Ok(-1),
        Err(e) => Err(e),
    }
}
