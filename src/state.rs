use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::api::models::build_models_response_body;
use crate::auth::{authenticate, build_allowed_key_set, AllowedClientKeys};
use crate::config::{AppConfig, ConfigError};
use crate::error::RelayError;
use crate::protocol::sider::encoder::RequestTranslator;
use crate::transport::{HttpTransport, PreparedBackend};

/// Shared application state accessible to all handlers.
///
/// Everything here is built once at startup and read-only afterwards.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub backend: PreparedBackend,
    pub translator: RequestTranslator,
    allowed_client_keys: AllowedClientKeys,
    models_response_body: Bytes,
    request_seq: AtomicU64,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        backend: PreparedBackend,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        let translator = RequestTranslator::new(&config.backend);
        let models_response_body = build_models_response_body(&config.models);
        Self {
            config,
            transport,
            backend,
            translator,
            allowed_client_keys,
            models_response_body,
            request_seq: AtomicU64::new(1),
        }
    }

    /// Build the transport, prepared backend and key index from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the backend URL or headers are
    /// invalid.
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(&config.server, &config.backend);
        let backend = PreparedBackend::new(&config.backend)?;
        let allowed_client_keys = build_allowed_key_set(&config);
        Ok(Self::new(config, transport, backend, allowed_client_keys))
    }

    /// Authenticate a caller against the configured client keys.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Auth`] when the caller is rejected.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), RelayError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }

    /// Monotonic per-process request number used in log spans.
    pub fn next_request_seq(&self) -> u64 {
        self.request_seq.fetch_add(1, Ordering::Relaxed)
    }
}
