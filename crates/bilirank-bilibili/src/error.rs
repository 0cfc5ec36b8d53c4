use thiserror::Error;

#[derive(Debug, Error)]
pub enum BilibiliError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope carried a non-zero `code`, regardless of HTTP status.
    #[error("platform error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("response for {context} has no data")]
    MissingData { context: String },

    #[error("throttled with HTTP {status} from {url}")]
    Throttled { status: u16, url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid video id: {0}")]
    InvalidBvid(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("WBI key refresh failed: {0}")]
    WbiKeys(String),

    #[error("cancelled")]
    Cancelled,
}
