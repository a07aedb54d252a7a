use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown check type, unparsable target or invalid durations.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to list check configurations: {0}")]
    Settings(#[source] BoxError),

    #[error("Failed to publish check result: {0}")]
    Publish(#[source] BoxError),

    #[error("Worker pool is closed")]
    WorkerPoolClosed,

    #[error("Check execution panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
