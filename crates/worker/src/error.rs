use fetchline_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Artifact could not be issued: {0}")]
    Issuer(String),
}

impl WorkerError {
    /// The job was removed while work was in flight.
    pub fn is_vanished(&self) -> bool {
        matches!(self, WorkerError::Core(CoreError::NotFound { .. }))
    }
}
