/// Error type shared by the translation, transport and relay layers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

impl ErrorCategory {
    /// OpenAI `error.type` and `error.code` for this category.
    fn openai_type_and_code(self) -> (&'static str, &'static str) {
        match self {
            ErrorCategory::InvalidRequest => ("invalid_request_error", "invalid_request"),
            ErrorCategory::Authentication => ("authentication_error", "invalid_api_key"),
            ErrorCategory::Permission => ("permission_error", "permission_denied"),
            ErrorCategory::RateLimit => ("rate_limit_error", "rate_limit_exceeded"),
            ErrorCategory::ServerError | ErrorCategory::Unknown => ("server_error", "server_error"),
        }
    }
}

/// Map a backend HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::Auth(_) => ErrorCategory::Authentication,
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
            RelayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http_status_for_category(self.category())
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error as `(status_code, OpenAI-style JSON body)`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let (error_type, code) = cat.openai_type_and_code();
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": error_type,
            "code": code,
            "param": null,
        }
    });
    (http_status_for_category(cat), body)
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
