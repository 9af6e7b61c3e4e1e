use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::{filter::LevelFilter, fmt};

use esload::cli::Cli;
use esload::config::{self, LoadConfig};
use esload::error::AppError;
use esload::loader::{run_load, LoadSummary};
use esload::store::ElasticClient;

const MAX_PRINTED_ERRORS: usize = 10;

const EXIT_ABORTED: i32 = 1;
const EXIT_PARTIAL: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(determine_log_level(&cli));

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            EXIT_ABORTED
        }
    };
    process::exit(code);
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<i32, AppError> {
    let defaults = config::load()?;
    let config = LoadConfig::resolve(&cli, &defaults)?;
    let store = Arc::new(ElasticClient::new(&config.host, config.request_timeout)?);

    let started = Instant::now();
    let summary = run_load(&config, store).await?;
    print_summary(&config, &summary, started.elapsed());

    Ok(if summary.fully_successful() {
        0
    } else {
        EXIT_PARTIAL
    })
}

fn print_summary(config: &LoadConfig, summary: &LoadSummary, elapsed: Duration) {
    println!("========================================");
    println!(
        "Dataset from {} loaded into `{}` at {}",
        config.input_file.display(),
        config.index_name,
        config.host
    );
    println!("Execution took {:.2} seconds.", elapsed.as_secs_f64());
    println!(
        "Records read: {}, skipped: {}.",
        summary.records_read(),
        summary.skipped_records
    );
    println!(
        "Documents attempted: {}, loaded: {}, failed: {}.",
        summary.attempted, summary.succeeded, summary.failed
    );

    for failure in summary.record_failures.iter().take(MAX_PRINTED_ERRORS) {
        println!("  skipped record: {}", failure.reason);
    }
    let printed = summary.record_failures.len().min(MAX_PRINTED_ERRORS);
    let budget = MAX_PRINTED_ERRORS - printed;
    for failure in summary.doc_failures.iter().take(budget) {
        println!("  failed document `{}`: {}", failure.id, failure.reason);
    }

    let total_errors = summary.record_failures.len() + summary.doc_failures.len();
    let shown = printed + summary.doc_failures.len().min(budget);
    if total_errors > shown {
        println!("  ... and {} more errors.", total_errors - shown);
    }
    println!("========================================");
}
