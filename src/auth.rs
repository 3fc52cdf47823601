use crate::config::AppConfig;
use crate::error::RelayError;
use http::header::AUTHORIZATION;
use rustc_hash::FxHashSet;

/// Compact key index used in hot-path authentication.
#[derive(Debug)]
pub enum AllowedClientKeys {
    /// Client authentication is switched off; every request passes.
    Disabled,
    /// Enabled without any usable key; every request is rejected.
    Empty,
    Single(Box<str>),
    Multiple(FxHashSet<String>),
}

/// Extract the token from `Authorization: <scheme> <token>`.
///
/// The scheme must be `bearer` in any letter case and the header must hold
/// exactly two space-separated parts.
///
/// # Errors
///
/// Returns `RelayError::Auth` when the header is missing or malformed.
pub fn extract_bearer_token(headers: &http::HeaderMap) -> Result<&str, RelayError> {
    let value = headers
        .get(AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Auth("Authorization header is required".to_string()))?;

    let invalid = || RelayError::Auth("Invalid authorization token".to_string());
    let value = value.to_str().map_err(|_| invalid())?;
    let (scheme, token) = value.split_once(' ').ok_or_else(invalid)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(invalid());
    }
    Ok(token)
}

/// Authenticate an incoming request against pre-indexed `allowed_keys`.
///
/// # Errors
///
/// Returns `RelayError::Auth` when the token is missing, malformed or unknown.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), RelayError> {
    let accepted = match allowed_keys {
        AllowedClientKeys::Disabled => return Ok(()),
        AllowedClientKeys::Empty => {
            return Err(RelayError::Auth(
                "Authentication token not configured".to_string(),
            ))
        }
        AllowedClientKeys::Single(key) => extract_bearer_token(headers)? == key.as_ref(),
        AllowedClientKeys::Multiple(allowed_set) => {
            allowed_set.contains(extract_bearer_token(headers)?)
        }
    };

    if accepted {
        Ok(())
    } else {
        Err(RelayError::Auth("Invalid authorization token".to_string()))
    }
}

/// Build a hash-set index for allowed client keys.
#[must_use]
pub fn build_allowed_key_set(config: &AppConfig) -> AllowedClientKeys {
    if !config.client_authentication.enabled {
        return AllowedClientKeys::Disabled;
    }

    let mut allowed_set: FxHashSet<String> = config
        .client_authentication
        .allowed_keys
        .iter()
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect();

    match allowed_set.len() {
        0 => AllowedClientKeys::Empty,
        1 => match allowed_set.drain().next() {
            Some(single_key) => AllowedClientKeys::Single(single_key.into_boxed_str()),
            None => AllowedClientKeys::Empty,
        },
        _ => AllowedClientKeys::Multiple(allowed_set),
    }
}
