//! Reference geography table: postal code to locality slug. Used only when
//! a search spec carries no explicit location.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::models::Locality;

/// Row shape of a simplemaps-style uszips CSV.
#[derive(Debug, Deserialize)]
struct ZipRow {
    zip: String,
    city: String,
    state_id: String,
}

#[derive(Debug, Clone)]
pub struct GeographyTable {
    localities: Vec<Locality>,
}

impl GeographyTable {
    /// Load a zip-code CSV. Zips are left-padded to five digits and the
    /// city/state pair becomes the lowercase slug the search URL wants,
    /// e.g. `San Diego` / `CA` -> `san-diego-ca`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open geography table {}", path.display()))?;

        let mut localities = Vec::new();
        for row in reader.deserialize::<ZipRow>() {
            let row = row.context("malformed geography row")?;
            localities.push(Locality {
                zip: format!("{:0>5}", row.zip),
                city_state_slug: format!(
                    "{}-{}",
                    row.city.to_lowercase().replace(' ', "-"),
                    row.state_id.to_lowercase()
                ),
            });
        }
        ensure!(
            !localities.is_empty(),
            "geography table {} has no rows",
            path.display()
        );

        info!("loaded {} localities from {}", localities.len(), path.display());
        Ok(Self { localities })
    }

    /// Small built-in table for running without an external zip file.
    pub fn builtin() -> Self {
        let localities = [
            ("92101", "san-diego-ca"),
            ("92604", "irvine-ca"),
            ("77038", "houston-tx"),
            ("60601", "chicago-il"),
            ("10001", "new-york-ny"),
            ("30301", "atlanta-ga"),
            ("98101", "seattle-wa"),
            ("80201", "denver-co"),
        ]
        .into_iter()
        .map(|(zip, slug)| Locality::new(zip, slug))
        .collect();
        Self { localities }
    }

    pub fn len(&self) -> usize {
        self.localities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.localities.is_empty()
    }

    /// Uniformly random locality.
    pub fn random(&self) -> &Locality {
        let index = rand::rng().random_range(0..self.localities.len());
        &self.localities[index]
    }
}
