//! Browser-driven harvesting of car-listing search results and per-vehicle
//! metadata, built around a convergent scrolling core that fully
//! materializes lazily-loaded pages before extraction.

pub mod config;
pub mod error;
pub mod extract;
pub mod geo;
pub mod harvester;
pub mod models;
pub mod output;
pub mod scroll;
pub mod search;
pub mod session;
pub mod vehicle;
