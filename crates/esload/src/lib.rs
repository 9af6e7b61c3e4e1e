//! Bulk loader for CSV and newline-delimited JSON files into Elasticsearch.
//!
//! The pipeline parses the input into raw records, assigns each record a
//! document id (from a designated field or a monotonic counter), groups the
//! documents into bounded batches and writes them through the store's bulk
//! endpoint, accumulating a [`loader::LoadSummary`] across partial failures.

pub mod cli;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod pipeline;
pub mod store;
