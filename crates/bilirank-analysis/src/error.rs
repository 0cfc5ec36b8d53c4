use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("model response has no choices")]
    EmptyChoices,

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A merged-batch reply parsed as JSON but had no `results` array.
    #[error("batch response has no results")]
    MissingResults,

    #[error("brand alias table {path}: {reason}")]
    Aliases { path: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}
