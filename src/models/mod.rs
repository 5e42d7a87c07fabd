//! Value objects handed between the extractors, orchestrators, and the
//! persistence layer. All of these are plain data with no shared state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One anchor pulled from a search-results page. The URL is raw and may
/// still carry tracking query parameters; deduplication and canonicalization
/// happen downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLink {
    pub label: String,
    pub url: String,
}

/// An image URL together with the identity data used to recognize that two
/// differently-sized URLs refer to the same photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
    /// Filename stem of the URL, without its size/format suffix.
    pub identity_key: String,
    /// Numeric scaler segment from the URL path; larger means higher
    /// resolution. Zero when the URL carries no size token.
    pub resolution_hint: u32,
}

/// Everything captured from a single vehicle listing page. Constructed once
/// per successful visit and immutable afterwards. Fields other than the id,
/// URL, and images are null when their extraction failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vehicle_id: String,
    pub canonical_url: String,
    pub vin: Option<String>,
    pub year_make_model: Option<String>,
    pub list_price: Option<String>,
    pub listing_details: Option<String>,
    pub listing_narrative: Option<String>,
    pub image_urls: Vec<String>,
}

/// The outcome of one make/model search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultSet {
    pub search_url: String,
    pub timestamp: DateTime<Utc>,
    pub make: String,
    pub model: String,
    pub search_metadata: String,
    pub listings: Vec<ListingLink>,
    /// Page-reported total; -1 when the count could not be parsed.
    pub expected_count: i64,
    pub actual_count: usize,
}

impl SearchResultSet {
    /// Listings the page claimed to have but we never extracted. `None` when
    /// the reported count is unknown or nothing is missing. A shortfall is
    /// logged, never an error: the result set is incomplete but usable.
    pub fn shortfall(&self) -> Option<i64> {
        if self.expected_count < 0 {
            return None;
        }
        let missing = self.expected_count - self.actual_count as i64;
        (missing > 0).then_some(missing)
    }
}

/// A postal code and the city-state slug the listing site uses in search
/// paths, e.g. `92101` / `san-diego-ca`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    pub zip: String,
    pub city_state_slug: String,
}

impl Locality {
    pub fn new(zip: impl Into<String>, city_state_slug: impl Into<String>) -> Self {
        Self {
            zip: zip.into(),
            city_state_slug: city_state_slug.into(),
        }
    }
}

/// Parameters for one search. When `location` is absent the orchestrator
/// picks a uniformly random row from the reference geography table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpec {
    pub make: String,
    pub model: String,
    pub location: Option<Locality>,
    /// Pagination offset into the result list.
    pub first_record: u32,
    /// Search radius in miles; 0 means nationwide.
    pub search_radius: u32,
    pub sort_order: String,
}

impl SearchSpec {
    pub fn new(make: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
            location: None,
            first_record: 0,
            search_radius: 0,
            sort_order: "distanceASC".to_string(),
        }
    }

    pub fn with_location(mut self, location: Locality) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_first_record(mut self, first_record: u32) -> Self {
        self.first_record = first_record;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_flags_missing_listings() {
        let results = SearchResultSet {
            search_url: "https://example.com/search".to_string(),
            timestamp: Utc::now(),
            make: "ford".to_string(),
            model: "f150".to_string(),
            search_metadata: String::new(),
            listings: Vec::new(),
            expected_count: 25,
            actual_count: 20,
        };
        assert_eq!(results.shortfall(), Some(5));
    }

    #[test]
    fn shortfall_is_none_when_count_unknown_or_met() {
        let mut results = SearchResultSet {
            search_url: String::new(),
            timestamp: Utc::now(),
            make: String::new(),
            model: String::new(),
            search_metadata: String::new(),
            listings: Vec::new(),
            expected_count: -1,
            actual_count: 20,
        };
        assert_eq!(results.shortfall(), None);

        results.expected_count = 20;
        assert_eq!(results.shortfall(), None);
    }
}
