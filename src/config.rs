//! Runtime configuration. Every tunable lives here and is passed explicitly
//! into the orchestrators; there is no process-wide mutable state.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::scroll::ScrollPolicy;

/// What to do with the header image relative to the deduplicated gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderImagePolicy {
    /// Append the header image even when the gallery already holds the same
    /// photo at another size.
    #[default]
    Append,
    /// Skip the header image when its identity key already appears in the
    /// gallery.
    DedupeByIdentity,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// WebDriver endpoint, e.g. a local chromedriver.
    pub webdriver_url: String,
    pub headless: bool,
    /// Root of the listing site.
    pub base_url: String,
    /// Prefix identifying image-host URLs in raw page text.
    pub image_host_prefix: String,
    /// Upper bound for every condition-polling wait.
    pub wait_timeout: Duration,
    /// Per-step delay that lets lazily-loaded content render.
    pub settle_delay: Duration,
    pub scroll_step_px: u32,
    pub max_scroll_steps: u32,
    /// Consecutive no-growth observations required to declare convergence.
    pub stability_threshold: u32,
    pub header_image_policy: HeaderImagePolicy,
    /// Directory that receives one CSV per batch.
    pub output_dir: PathBuf,
    /// Optional zip-code table; a small built-in table is used when absent.
    pub geography_csv: Option<PathBuf>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            base_url: "https://www.autotrader.com".to_string(),
            image_host_prefix: "https://images.autotrader.com/".to_string(),
            wait_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(200),
            scroll_step_px: 500,
            max_scroll_steps: 100,
            stability_threshold: 5,
            header_image_policy: HeaderImagePolicy::default(),
            output_dir: PathBuf::from("data/vehicle_metadata"),
            geography_csv: None,
        }
    }
}

impl ScrapeConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset. `.env` files are honored by the caller via `dotenvy`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("AUTOHARVEST_WEBDRIVER_URL") {
            config.webdriver_url = url;
        }
        if let Ok(headless) = env::var("AUTOHARVEST_HEADLESS") {
            config.headless = headless
                .parse()
                .context("AUTOHARVEST_HEADLESS must be true or false")?;
        }
        if let Ok(dir) = env::var("AUTOHARVEST_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("AUTOHARVEST_GEO_CSV") {
            config.geography_csv = Some(PathBuf::from(path));
        }
        if let Ok(secs) = env::var("AUTOHARVEST_WAIT_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .context("AUTOHARVEST_WAIT_TIMEOUT_SECS must be an integer")?;
            config.wait_timeout = Duration::from_secs(secs);
        }
        if let Ok(millis) = env::var("AUTOHARVEST_SETTLE_DELAY_MS") {
            let millis: u64 = millis
                .parse()
                .context("AUTOHARVEST_SETTLE_DELAY_MS must be an integer")?;
            config.settle_delay = Duration::from_millis(millis);
        }
        if let Ok(policy) = env::var("AUTOHARVEST_HEADER_IMAGE_POLICY") {
            config.header_image_policy = match policy.as_str() {
                "append" => HeaderImagePolicy::Append,
                "dedupe" => HeaderImagePolicy::DedupeByIdentity,
                other => anyhow::bail!(
                    "AUTOHARVEST_HEADER_IMAGE_POLICY must be `append` or `dedupe`, got `{other}`"
                ),
            };
        }

        Ok(config)
    }

    pub fn scroll_policy(&self) -> ScrollPolicy {
        ScrollPolicy {
            step_px: self.scroll_step_px,
            max_steps: self.max_scroll_steps,
            stability_threshold: self.stability_threshold,
            settle_delay: self.settle_delay,
        }
    }
}
