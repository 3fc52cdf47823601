use std::collections::HashSet;

use crate::protocol::sider::OVERLAY_FIELDS;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_backend_config(config)?;
    validate_client_auth(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.stream_idle_timeout == 0 {
        return Err(validation_err(
            "server.stream_idle_timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_backend_config(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    let parsed = url::Url::parse(&backend.url)
        .map_err(|err| validation_err(format!("backend.url is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "backend.url must start with http:// or https://",
        ));
    }
    if backend.default_model.trim().is_empty() {
        return Err(validation_err("backend.default_model cannot be empty"));
    }
    if backend.default_prompt.is_empty() {
        return Err(validation_err("backend.default_prompt cannot be empty"));
    }
    validate_socks_proxy(backend.socks_proxy_url().as_deref())?;

    for field in OVERLAY_FIELDS {
        if backend.template.extra.contains_key(field) {
            return Err(validation_err(format!(
                "backend.template cannot set '{field}'; it is filled per request"
            )));
        }
    }
    Ok(())
}

fn validate_socks_proxy(proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy else {
        return Ok(());
    };
    let parsed = url::Url::parse(proxy).map_err(|err| {
        validation_err(format!(
            "backend.socks_proxy is not a valid address: {err}"
        ))
    })?;
    if !matches!(parsed.scheme(), "socks5" | "socks5h") {
        return Err(validation_err(
            "backend.socks_proxy must be host:port or use socks5:// or socks5h://",
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) || parsed.port().is_none() {
        return Err(validation_err(
            "backend.socks_proxy must include a host and a port",
        ));
    }
    Ok(())
}

fn validate_client_auth(config: &AppConfig) -> Result<(), ConfigError> {
    let auth = &config.client_authentication;
    if !auth.enabled {
        return Ok(());
    }
    if auth.allowed_keys.is_empty() {
        return Err(validation_err(
            "client_authentication.allowed_keys cannot be empty when enabled",
        ));
    }
    for key in &auth.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err(
                "client_authentication.allowed_keys contains an empty key",
            ));
        }
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for model in &config.models {
        if model.trim().is_empty() {
            return Err(validation_err("models: model id cannot be empty"));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!("models: duplicate entry '{model}'")));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
