#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Not authorized to write channel {channel}")]
    Unauthorized { channel: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
