use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueHint};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "esload",
    version,
    author,
    about = "Load a CSV or newline-delimited JSON file into an Elasticsearch index"
)]
pub struct Cli {
    /// Path to the input file. Must end with `.csv`, `.json` or `.log`.
    #[arg(value_hint = ValueHint::FilePath)]
    pub input_file: PathBuf,
    /// Name of the index in which to index the documents.
    pub index_name: String,
    /// Hostname and port (or full URL) of an Elasticsearch node.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,
    /// Field holding the unique id of each record. A reserved `_id` field in
    /// the input is dropped unless named here.
    #[arg(long, value_name = "FIELD")]
    pub id_field: Option<String>,
    /// First counter value when no id field is given.
    #[arg(long, default_value_t = 1)]
    pub id_start_from: u64,
    /// Delete and re-create the index before loading.
    #[arg(long, action = ArgAction::SetTrue)]
    pub delete_index_first: bool,
    /// Documents per bulk request.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<NonZeroUsize>,
    /// Concurrent bulk requests in flight (>= 1).
    #[arg(long, value_name = "N")]
    pub workers: Option<NonZeroUsize>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
