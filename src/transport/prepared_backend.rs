use crate::config::{BackendConfig, ConfigError};

/// Backend endpoint and fixed header set, computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedBackend {
    url: url::Url,
    static_headers: http::HeaderMap,
    has_credential: bool,
}

impl PreparedBackend {
    /// Parse the backend URL and build the static request headers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the URL or any header value is
    /// invalid.
    pub fn new(backend: &BackendConfig) -> Result<Self, ConfigError> {
        let url = url::Url::parse(&backend.url)
            .map_err(|e| ConfigError::Validation(format!("Invalid backend URL: {e}")))?;
        let (static_headers, has_credential) = Self::build_backend_headers(backend)?;
        Ok(Self {
            url,
            static_headers,
            has_credential,
        })
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    #[must_use]
    pub fn static_headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }

    /// Whether a bearer credential for the backend is configured.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.has_credential
    }

    fn build_backend_headers(
        backend: &BackendConfig,
    ) -> Result<(http::HeaderMap, bool), ConfigError> {
        fn header_value(field: &str, value: &str) -> Result<http::HeaderValue, ConfigError> {
            http::HeaderValue::from_str(value).map_err(|_| {
                ConfigError::Validation(format!("backend.{field} is not a valid header value"))
            })
        }

        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::ACCEPT, http::HeaderValue::from_static("*/*"));
        headers.insert(
            http::header::ACCEPT_LANGUAGE,
            header_value("accept_language", &backend.accept_language)?,
        );
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        headers.insert(http::header::ORIGIN, header_value("origin", &backend.origin)?);
        headers.insert(
            http::header::USER_AGENT,
            header_value("user_agent", &backend.user_agent)?,
        );

        let token = backend.auth_token.trim();
        let has_credential = !token.is_empty();
        if has_credential {
            let mut value = header_value("auth_token", &format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(http::header::AUTHORIZATION, value);
        }

        Ok((headers, has_credential))
    }
}
