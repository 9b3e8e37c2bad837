#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing job, the most common not-found case.
    pub fn job_not_found(id: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }
}
