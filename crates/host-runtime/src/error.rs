use thiserror::Error;

use crate::adapter::AdapterError;
use crate::configstream::ConfigStreamError;
use crate::dispatcher::DispatchError;

/// Crate-wide error type. Each variant wraps a component-scoped error so
/// callers can match at whichever granularity they need, while `?` still
/// composes across component boundaries.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    ConfigStream(#[from] ConfigStreamError),

    #[error("configuration error: {0}")]
    Config(#[from] host_config::HostConfigError),

    #[error("implementation '{0}' could not be resolved at startup")]
    UnresolvableImplementation(String),

    #[error("registration of identifier '{0}' failed during startup: {1}")]
    RegistrationFailed(String, String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
