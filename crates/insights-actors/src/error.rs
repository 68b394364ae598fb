use thiserror::Error;

/// Failures of the actor runtime itself, as opposed to an actor operation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The activation died before replying, usually because `activate` failed.
    #[error("actor {kind}/{key} is unavailable")]
    Unavailable { kind: &'static str, key: String },

    /// An operation that only makes sense on an existing record hit an empty key.
    #[error("{kind}/{key} does not exist")]
    NotFound { kind: &'static str, key: String },

    /// The registry stored for an actor type holds activations of another type.
    #[error("registry for {kind} holds a different actor type")]
    RegistryMismatch { kind: &'static str },
}

/// Reasons an ingested event is refused.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing api key")]
    MissingApiKey,

    #[error("invalid api key for application {0}")]
    InvalidApiKey(String),

    #[error("origin {origin} is not allowed for application {application_id}")]
    OriginNotAllowed {
        application_id: String,
        origin: String,
    },

    #[error("invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}
