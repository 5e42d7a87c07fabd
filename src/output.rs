//! CSV persistence: one file per batch, plus the compile utilities that
//! merge many batch files into a single table.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use csv::{QuoteStyle, StringRecord, WriterBuilder};
use regex::Regex;
use tracing::{info, warn};

use crate::extract::text::{canonicalize_vehicle_url, vehicle_id_from_url};
use crate::models::{SearchResultSet, VehicleRecord};

const VEHICLE_COLUMNS: &[&str] = &[
    "vehicle_image_url",
    "vehicle_id",
    "url",
    "vin",
    "year_make_model",
    "list_price",
    "listing_details",
    "listing_narrative",
];

const SEARCH_COLUMNS: &[&str] = &[
    "listing_header",
    "url",
    "search_url",
    "make",
    "model",
    "search_timestamp",
    "search_metadata",
];

fn search_batch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^search_results_.*\.csv$").expect("valid batch pattern"))
}

fn vehicle_batch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+\.csv$").expect("valid batch pattern"))
}

/// Row-oriented store: every batch becomes one quoted CSV file under `dir`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create output dir {}", self.dir.display()))
    }

    /// Write one vehicle record, flattened to one row per image URL.
    /// Repeated image URLs collapse to a single row.
    pub fn write_vehicle_record(&self, record: &VehicleRecord) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.csv", record.vehicle_id));
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        writer.write_record(VEHICLE_COLUMNS)?;
        let mut seen = HashSet::new();
        for image_url in &record.image_urls {
            if !seen.insert(image_url.as_str()) {
                continue;
            }
            writer.write_record([
                image_url.as_str(),
                &record.vehicle_id,
                &record.canonical_url,
                record.vin.as_deref().unwrap_or_default(),
                record.year_make_model.as_deref().unwrap_or_default(),
                record.list_price.as_deref().unwrap_or_default(),
                record.listing_details.as_deref().unwrap_or_default(),
                record.listing_narrative.as_deref().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;

        info!("saved {} image rows to {}", seen.len(), path.display());
        Ok(path)
    }

    /// Write one search result set, one row per listing link.
    pub fn write_search_results(&self, results: &SearchResultSet) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            "search_results_{}_{}_{}.csv",
            results.make,
            results.model,
            results.timestamp.timestamp()
        ));
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let timestamp = results.timestamp.timestamp().to_string();
        writer.write_record(SEARCH_COLUMNS)?;
        for listing in &results.listings {
            writer.write_record([
                listing.label.as_str(),
                &listing.url,
                &results.search_url,
                &results.make,
                &results.model,
                &timestamp,
                &results.search_metadata,
            ])?;
        }
        writer.flush()?;

        info!(
            "saved {} listings to {}",
            results.listings.len(),
            path.display()
        );
        Ok(path)
    }

    /// Merge every `search_results_*.csv` batch into one table at `out`,
    /// adding the source filename plus the canonical URL and vehicle id
    /// derived from each raw listing URL. Files with the wrong columns are
    /// skipped with a warning. Returns the number of rows written.
    pub fn compile_search_results(&self, out: &Path) -> Result<usize> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(out)
            .with_context(|| format!("failed to create {}", out.display()))?;

        let mut header: Vec<&str> = SEARCH_COLUMNS.to_vec();
        header.extend(["filename", "url_clean", "vehicle_id"]);
        writer.write_record(&header)?;

        let mut rows = 0usize;
        for (filename, path) in self.batch_files(search_batch_regex())? {
            let Some(columns) = Self::column_indices(&path, SEARCH_COLUMNS)? else {
                warn!("file {filename} has wrong columns, skipping");
                continue;
            };
            let mut reader = csv::Reader::from_path(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            for record in reader.records() {
                let record = record?;
                let mut row = Self::project(&record, &columns);
                let raw_url = row.get(1).cloned().unwrap_or_default();
                let url_clean = canonicalize_vehicle_url(&raw_url);
                let vehicle_id = url_clean
                    .as_deref()
                    .map(|url| vehicle_id_from_url(url).to_string());
                row.push(filename.clone());
                row.push(url_clean.unwrap_or_default());
                row.push(vehicle_id.unwrap_or_default());
                writer.write_record(&row)?;
                rows += 1;
            }
        }
        writer.flush()?;

        info!("compiled {rows} search rows into {}", out.display());
        Ok(rows)
    }

    /// Merge every per-vehicle `<id>.csv` batch into one table at `out`,
    /// adding the source filename. Returns the number of rows written.
    pub fn compile_image_urls(&self, out: &Path) -> Result<usize> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(out)
            .with_context(|| format!("failed to create {}", out.display()))?;

        let mut header: Vec<&str> = VEHICLE_COLUMNS.to_vec();
        header.push("filename");
        writer.write_record(&header)?;

        let mut rows = 0usize;
        for (filename, path) in self.batch_files(vehicle_batch_regex())? {
            let Some(columns) = Self::column_indices(&path, VEHICLE_COLUMNS)? else {
                warn!("file {filename} has wrong columns, skipping");
                continue;
            };
            let mut reader = csv::Reader::from_path(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            for record in reader.records() {
                let record = record?;
                let mut row = Self::project(&record, &columns);
                row.push(filename.clone());
                writer.write_record(&row)?;
                rows += 1;
            }
        }
        writer.flush()?;

        info!("compiled {rows} image rows into {}", out.display());
        Ok(rows)
    }

    /// Batch files in the store whose names match `pattern`, sorted by name
    /// so compilation output is reproducible.
    fn batch_files(&self, pattern: &Regex) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read output dir {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if pattern.is_match(&filename) {
                files.push((filename, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Positions of `required` columns in the file's header, or `None` when
    /// any of them is missing.
    fn column_indices(path: &Path, required: &[&str]) -> Result<Option<Vec<usize>>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let headers = reader.headers()?.clone();
        let indices: Option<Vec<usize>> = required
            .iter()
            .map(|column| headers.iter().position(|h| h == *column))
            .collect();
        Ok(indices)
    }

    fn project(record: &StringRecord, columns: &[usize]) -> Vec<String> {
        columns
            .iter()
            .map(|&index| record.get(index).unwrap_or_default().to_string())
            .collect()
    }
}
