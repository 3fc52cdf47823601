pub mod validation;

use serde::{Deserialize, Serialize};

use crate::protocol::sider::BackendTemplate;

use self::validation::validate_config;

/// Config file read when `SIDER_RELAY_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "SIDER_RELAY_CONFIG";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Listener and request handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix for every route, e.g. `/hf`.
    #[serde(default)]
    pub base_path: String,
    /// Total timeout in seconds for non-streaming backend calls.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Longest gap in seconds between two backend reads while streaming.
    #[serde(default = "default_timeout")]
    pub stream_idle_timeout: u64,
    /// Ignore the caller's `stream` flag and always answer buffered.
    #[serde(default)]
    pub force_non_stream: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7055
}
fn default_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: String::new(),
            timeout: default_timeout(),
            stream_idle_timeout: default_timeout(),
            force_non_stream: false,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Sider backend settings: endpoint, client identity and request template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Bearer credential sent to the backend.
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    /// `host:port` or `socks5://host:port`; direct connection when unset.
    #[serde(default)]
    pub socks_proxy: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_prompt")]
    pub default_prompt: String,
    #[serde(default)]
    pub template: BackendTemplate,
}

fn default_backend_url() -> String {
    "https://api2.sider.ai/api/v3/completion/text".to_string()
}
fn default_origin() -> String {
    "chrome-extension://dhoenijjpgpeimemopealfcbiecgceod".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0"
        .to_string()
}
fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_prompt() -> String {
    "你好".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            auth_token: String::new(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            socks_proxy: None,
            default_model: default_model(),
            default_prompt: default_prompt(),
            template: BackendTemplate::default(),
        }
    }
}

impl BackendConfig {
    /// SOCKS proxy as a URL; a bare `host:port` gets the `socks5://` scheme.
    #[must_use]
    pub fn socks_proxy_url(&self) -> Option<String> {
        let proxy = self.socks_proxy.as_deref()?.trim();
        if proxy.contains("://") {
            Some(proxy.to_string())
        } else {
            Some(format!("socks5://{proxy}"))
        }
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_models() -> Vec<String> {
    [
        "gpt-4o",
        "claude-3.5-sonnet",
        "deepseek-reasoner",
        "o3-mini",
        "o1",
        "llama-3.1-405b",
        "gemini-2.0-pro",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    /// Model ids advertised by `GET /v1/models`.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            client_authentication: ClientAuthConfig::default(),
            models: default_models(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Read a config file. A missing or empty file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file exists but cannot be read and
/// [`ConfigError::Yaml`] when parsing fails.
pub fn read_config_file(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(e) => return Err(e.into()),
    };
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(&contents)?)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// Apply environment overrides on top of a parsed config.
///
/// `lookup` returns the value of an environment variable; blank values count
/// as unset.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when `LISTEN_ADDR` is not `host:port`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("SIDER_AUTH_TOKEN").or_else(|| get("SIDER_AUTHORIZATION_KEY")) {
        config.backend.auth_token = token.trim().to_string();
    }
    if let Some(token) = get("AUTH_TOKEN") {
        config.client_authentication.enabled = true;
        config.client_authentication.allowed_keys = vec![token.trim().to_string()];
    }
    if let Some(flag) = get("USE_SOCKS") {
        if is_truthy(&flag) {
            let proxy = get("SOCKS_PROXY")
                .or_else(|| config.backend.socks_proxy.clone())
                .unwrap_or_else(|| "127.0.0.1:1080".to_string());
            config.backend.socks_proxy = Some(proxy.trim().to_string());
        } else {
            config.backend.socks_proxy = None;
        }
    }
    if let Some(addr) = get("LISTEN_ADDR") {
        let addr = addr.trim();
        let (host, port) = addr
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            .ok_or_else(|| {
                ConfigError::Validation(format!("LISTEN_ADDR must be host:port, got '{addr}'"))
            })?;
        config.server.host = host.trim_matches(['[', ']']).to_string();
        config.server.port = port;
    }
    if get("VERCEL").is_some() {
        config.server.force_non_stream = true;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.features.log_level = level.trim().to_string();
    }
    Ok(())
}

/// Load configuration from a YAML file, apply process environment overrides
/// and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_example_config() {
        let config = load_config_with_env("config.example.yaml", env(&[]));
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 7055);
        assert_eq!(config.server.base_path, "");
        assert_eq!(config.backend.default_model, "gpt-4o");
        assert_eq!(config.backend.template.app_name, "ChitChat_Edge_Ext");
        assert_eq!(config.models.len(), 7);
        assert!(config.client_authentication.enabled);
        assert_eq!(config.client_authentication.allowed_keys.len(), 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config_with_env("does-not-exist.yaml", env(&[])).unwrap();
        assert_eq!(config.server.listen_addr(), "127.0.0.1:7055");
        assert_eq!(
            config.backend.url,
            "https://api2.sider.ai/api/v3/completion/text"
        );
        assert_eq!(config.backend.default_prompt, "你好");
        assert_eq!(config.server.timeout, 60);
        assert!(!config.client_authentication.enabled);
        assert!(config.backend.socks_proxy.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_section_defaults() {
        let config: AppConfig = serde_yaml::from_str(
            "server:\n  port: 9000\nbackend:\n  template:\n    app_version: \"5.0.0\"\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backend.template.app_version, "5.0.0");
        assert_eq!(config.backend.template.from, "chat");
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("SIDER_AUTH_TOKEN", "sider-secret"),
                ("AUTH_TOKEN", "client-secret"),
                ("USE_SOCKS", "true"),
                ("LISTEN_ADDR", "0.0.0.0:8080"),
                ("VERCEL", "1"),
                ("LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(config.backend.auth_token, "sider-secret");
        assert!(config.client_authentication.enabled);
        assert_eq!(config.client_authentication.allowed_keys, ["client-secret"]);
        assert_eq!(config.backend.socks_proxy.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(
            config.backend.socks_proxy_url().as_deref(),
            Some("socks5://127.0.0.1:1080")
        );
        assert_eq!(config.server.listen_addr(), "0.0.0.0:8080");
        assert!(config.server.force_non_stream);
        assert_eq!(config.features.log_level, "debug");
    }

    #[test]
    fn test_authorization_key_alias_and_socks_address() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("SIDER_AUTHORIZATION_KEY", "alias-secret"),
                ("USE_SOCKS", "1"),
                ("SOCKS_PROXY", "10.0.0.2:9050"),
            ]),
        )
        .unwrap();
        assert_eq!(config.backend.auth_token, "alias-secret");
        assert_eq!(config.backend.socks_proxy.as_deref(), Some("10.0.0.2:9050"));
    }

    #[test]
    fn test_use_socks_false_disables_proxy() {
        let mut config = AppConfig::default();
        config.backend.socks_proxy = Some("127.0.0.1:1080".into());
        apply_env_overrides(&mut config, env(&[("USE_SOCKS", "0")])).unwrap();
        assert!(config.backend.socks_proxy.is_none());
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, env(&[("AUTH_TOKEN", "  "), ("VERCEL", "")])).unwrap();
        assert!(!config.client_authentication.enabled);
        assert!(!config.server.force_non_stream);
    }

    #[test]
    fn test_bad_listen_addr_is_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("LISTEN_ADDR", "localhost")]));
        assert!(matches!(err, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_socks_url_kept_when_scheme_given() {
        let backend = BackendConfig {
            socks_proxy: Some("socks5h://proxy:1080".into()),
            ..BackendConfig::default()
        };
        assert_eq!(
            backend.socks_proxy_url().as_deref(),
            Some("socks5h://proxy:1080")
        );
    }
}
