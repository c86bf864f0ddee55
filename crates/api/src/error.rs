//! Error types for request orchestration.

/// Errors raised by an [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors produced while registering or invoking operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("operation {0} is already registered")]
    DuplicateOperation(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("missing path parameter :{param} in {path}")]
    MissingPathParam { param: String, path: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError::MissingPathParam {
            param: "id".into(),
            path: "/users/:id".into(),
        };
        assert_eq!(err.to_string(), "missing path parameter :id in /users/:id");

        let err: ApiError = TransportError::Http("connection refused".into()).into();
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }
}
