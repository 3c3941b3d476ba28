use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::datasource::DataSourceError;
use crate::messaging::DispatchError;
use crate::orchestration::PollError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl AppError {
    /// Startup errors the operator has to fix before a restart can help.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Poll(PollError::FlightNotFound(_))
        )
    }
}
