//! Configuration loading and CLI overlay.
//!
//! Defaults come from an optional config file and `ESLOAD__*` environment
//! variables; CLI flags take final precedence. The result is one read-only
//! [`LoadConfig`] handed to the load pipeline.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;

const CONFIG_FILE: &str = "config/esload";

pub const DEFAULT_HOST: &str = "localhost:9200";
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
    #[error("load.batch_size must be >= 1")]
    ZeroBatchSize,
    #[error("load.workers must be >= 1")]
    ZeroWorkers,
}

/// Defaults merged from the config file and environment.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub load: LoadDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub request_timeout_secs: u64,
    pub retry_attempts: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadDefaults {
    pub batch_size: usize,
    pub workers: usize,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let builder = Config::builder()
        .set_default("store.host", DEFAULT_HOST)?
        .set_default("store.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
        .set_default("store.retry_attempts", DEFAULT_RETRY_ATTEMPTS as i64)?
        .set_default("load.batch_size", DEFAULT_BATCH_SIZE as i64)?
        .set_default("load.workers", DEFAULT_WORKERS as i64)?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("ESLOAD").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

/// Fully resolved, read-only configuration for one load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub input_file: PathBuf,
    pub index_name: String,
    pub host: String,
    pub id_field: Option<String>,
    pub id_start_from: u64,
    pub delete_index_first: bool,
    pub batch_size: NonZeroUsize,
    pub workers: NonZeroUsize,
    pub request_timeout: Duration,
    pub retry_attempts: usize,
}

impl LoadConfig {
    /// Overlay CLI arguments on top of file/env defaults. CLI wins.
    pub fn resolve(cli: &Cli, defaults: &AppConfig) -> Result<Self, AppConfigError> {
        let batch_size = match cli.batch_size {
            Some(size) => size,
            None => NonZeroUsize::new(defaults.load.batch_size)
                .ok_or(AppConfigError::ZeroBatchSize)?,
        };
        let workers = match cli.workers {
            Some(workers) => workers,
            None => NonZeroUsize::new(defaults.load.workers).ok_or(AppConfigError::ZeroWorkers)?,
        };

        let host = cli
            .host
            .as_deref()
            .unwrap_or(defaults.store.host.as_str());

        Ok(Self {
            input_file: cli.input_file.clone(),
            index_name: cli.index_name.clone(),
            host: normalize_host(host),
            id_field: cli.id_field.clone(),
            id_start_from: cli.id_start_from,
            delete_index_first: cli.delete_index_first,
            batch_size,
            workers,
            request_timeout: Duration::from_secs(defaults.store.request_timeout_secs),
            retry_attempts: defaults.store.retry_attempts,
        })
    }
}

/// Bare `host:port` strings get an `http://` scheme so they parse as URLs.
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
