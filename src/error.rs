use crate::config::ConfigError;
use thiserror::Error;

/// Errors raised while assembling an [`AppContext`](crate::AppContext):
/// configuration failures from the resolver, or a context built without one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("application context requires a configuration resolver")]
    MissingResolver,
}
