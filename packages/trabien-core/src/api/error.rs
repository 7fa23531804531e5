use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure surfaced by the request gateway.
///
/// Every request either resolves to a decoded payload or to exactly one of
/// these variants; nothing is swallowed inside the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The network call itself could not complete (DNS, connection refused,
    /// timeout), or the response body could not be read.
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status. `message` is the
    /// `error`/`message` field of the JSON body when present, otherwise a
    /// message synthesized from the status code and status text.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// A successful status carried a body that is not valid JSON. Kept
    /// distinct so a malformed success is never mistaken for an empty one.
    #[error("invalid response body from {endpoint}")]
    InvalidBody {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be serialized to JSON.
    #[error("failed to encode request body for {endpoint}")]
    Encode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// HTTP status of the failure, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this failure is an authorization rejection (401).
    pub fn is_auth_error(&self) -> bool {
        self.status() == Some(401)
    }
}
