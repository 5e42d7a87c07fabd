//! Top-level façade: owns the config, the CSV store, and the geography
//! table, and manages one browser session per unit of work.
//!
//! Session ownership is explicit. The plain methods create a session, run
//! one unit of work, and release the session on every exit path. The
//! `*_with` variants borrow a caller-owned session and never close it; on
//! failure the caller should consult [`ScrapeError::voids_session`] before
//! reusing it.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::geo::GeographyTable;
use crate::models::{SearchResultSet, SearchSpec, VehicleRecord};
use crate::output::CsvStore;
use crate::search;
use crate::session::{Session, WebDriverSession};
use crate::vehicle;

pub struct Harvester {
    config: ScrapeConfig,
    store: CsvStore,
    geo: GeographyTable,
}

impl Harvester {
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let store = CsvStore::new(&config.output_dir);
        store.ensure_dir()?;

        let geo = match &config.geography_csv {
            Some(path) => GeographyTable::load(path)?,
            None => GeographyTable::builtin(),
        };

        Ok(Self { config, store, geo })
    }

    /// Run one search with a session created and released inside this call.
    pub async fn run_search(&self, spec: &SearchSpec) -> Result<SearchResultSet> {
        let mut session = self.open_session().await?;
        let result = self.run_search_with(&mut session, spec).await;
        release(&mut session).await;
        result
    }

    /// Run one search against a borrowed session the caller owns.
    pub async fn run_search_with(
        &self,
        session: &mut dyn Session,
        spec: &SearchSpec,
    ) -> Result<SearchResultSet> {
        let results = search::run_search(session, &self.config, spec, &self.geo)
            .await
            .map_err(anyhow::Error::from)?;
        self.store
            .write_search_results(&results)
            .context("failed to persist search results")?;
        Ok(results)
    }

    /// Capture one vehicle page with a session created and released inside
    /// this call. Returns `None` when the record came back without a single
    /// image; such records are not worth persisting.
    pub async fn capture_vehicle(&self, raw_url: &str) -> Result<Option<VehicleRecord>> {
        let mut session = self.open_session().await?;
        let result = self.capture_vehicle_with(&mut session, raw_url).await;
        release(&mut session).await;
        result
    }

    /// Capture one vehicle page against a borrowed session the caller owns.
    pub async fn capture_vehicle_with(
        &self,
        session: &mut dyn Session,
        raw_url: &str,
    ) -> Result<Option<VehicleRecord>> {
        let record = vehicle::assemble_vehicle_record(session, &self.config, raw_url)
            .await
            .map_err(anyhow::Error::from)?;

        if record.image_urls.is_empty() {
            info!("no images for vehicle {}; not persisting", record.vehicle_id);
            return Ok(None);
        }

        self.store
            .write_vehicle_record(&record)
            .context("failed to persist vehicle record")?;
        Ok(Some(record))
    }

    /// Run every search in the roster, then capture each discovered listing.
    /// A failed unit of work is logged and skipped; it never blocks the
    /// independent units that follow.
    pub async fn run_sweep(&self, roster: &[SearchSpec]) -> Result<()> {
        for spec in roster {
            let results = match self.run_search(spec).await {
                Ok(results) => results,
                Err(e) => {
                    error!("search {}/{} failed: {e:#}", spec.make, spec.model);
                    continue;
                }
            };

            for listing in &results.listings {
                match self.capture_vehicle(&listing.url).await {
                    Ok(Some(record)) => {
                        debug!("captured vehicle {}", record.vehicle_id);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(scrape_err) = e.downcast_ref::<ScrapeError>() {
                            if matches!(scrape_err, ScrapeError::InvalidUrl(_)) {
                                debug!("skipping non-listing url {}", listing.url);
                                continue;
                            }
                        }
                        warn!("vehicle capture failed for {}: {e:#}", listing.url);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    async fn open_session(&self) -> Result<WebDriverSession> {
        WebDriverSession::connect(&self.config.webdriver_url, self.config.headless)
            .await
            .context("failed to open a webdriver session")
    }
}

async fn release(session: &mut WebDriverSession) {
    if let Err(e) = session.close().await {
        warn!("failed to close session cleanly: {e}");
    }
}

/// The makes and models swept by default, mirroring the body-style mix the
/// downstream classifier trains on.
pub fn default_roster() -> Vec<SearchSpec> {
    [
        ("bmw", "3-series"),
        ("bmw", "x5"),
        ("ford", "f150"),
        ("ford", "explorer"),
        ("honda", "accord"),
        ("honda", "civic"),
        ("honda", "odyssey"),
        ("toyota", "camry"),
        ("toyota", "tacoma"),
        ("toyota", "corolla"),
    ]
    .into_iter()
    .map(|(make, model)| SearchSpec::new(make, model))
    .collect()
}
