//! Application-level error type shared by the binary and the load pipeline.

use thiserror::Error;

use crate::config::AppConfigError;
use crate::loader::LoadError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Load(#[from] LoadError),
}
