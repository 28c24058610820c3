//! Client error type.
//!
//! Only conditions that must stop a run are errors. Everything a caller can
//! work around (404, 409, timeouts, a latched source) is `Ok(None)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    pub fn unexpected(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_endpoint() {
        let err = ClientError::unexpected("api/v3/catalog/", "expected an object");
        assert_eq!(
            err.to_string(),
            "unexpected response from api/v3/catalog/: expected an object"
        );
        assert_eq!(
            ClientError::Authentication("HTTP 401".into()).to_string(),
            "authentication failed: HTTP 401"
        );
    }
}
