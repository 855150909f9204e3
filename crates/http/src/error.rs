//! Simulation errors

use http::StatusCode;

/// Type alias for a [`Result`]s with [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors returned while simulating a response.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A numeric or duration query parameter could not be parsed.
    #[error("malformed parameter `{name}` ({value:?}): {reason}")]
    MalformedParameter {
        /// The parameter name
        name: String,
        /// The raw value received
        value: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The requested content file could not be opened.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The request body is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Any other failure, e.g. a template that cannot be rendered.
    #[error(transparent)]
    Unrecoverable(#[from] anyhow::Error),
}

impl SimError {
    /// Creates a [`SimError::MalformedParameter`].
    pub fn malformed(name: &str, value: &str, reason: impl ToString) -> Self {
        Self::MalformedParameter {
            name: name.to_owned(),
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// The status code a client observes for this error.
    ///
    /// Malformed parameters surface as 500 rather than 400; existing test
    /// harnesses rely on that.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedParameter { .. } | Self::Unrecoverable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}
