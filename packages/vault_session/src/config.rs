use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

use crate::error::{VaultError, VaultResult};

/// Environment variable prefix shared by every vault setting
pub const ENV_PREFIX: &str = "VAULT_";

/// Connection and layout settings for the secrets store.
///
/// Built once at process start and handed to whatever needs it; there is no
/// process-wide instance.
#[derive(Debug, Deserialize)]
pub struct VaultSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(deserialize_with = "deserialize_token")]
    pub token: SecretString,
    /// Mount point of the KV-v2 engine holding user API keys
    #[serde(default = "default_api_keys_mount_point")]
    pub api_keys_mount_point: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_url() -> String {
    "http://localhost:8200".to_string()
}

fn default_api_keys_mount_point() -> String {
    "api-keys".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl VaultSettings {
    /// Settings with defaults for everything except the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: default_url(),
            token: SecretString::from(token.into()),
            api_keys_mount_point: default_api_keys_mount_point(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    /// Load from `VAULT_URL`, `VAULT_TOKEN`, `VAULT_API_KEYS_MOUNT_POINT`
    /// and `VAULT_TIMEOUT_SECONDS`.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup, e.g. a map in tests
    pub fn from_lookup<F>(lookup: F) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
        };

        let token = var("TOKEN").ok_or_else(|| {
            VaultError::Configuration(format!("{ENV_PREFIX}TOKEN must be set"))
        })?;

        let mut settings = Self::new(token);
        if let Some(url) = var("URL") {
            settings.url = url;
        }
        if let Some(mount_point) = var("API_KEYS_MOUNT_POINT") {
            settings.api_keys_mount_point = mount_point;
        }
        if let Some(raw) = var("TIMEOUT_SECONDS") {
            settings.timeout_seconds = raw.trim().parse().map_err(|_| {
                VaultError::Configuration(format!(
                    "{ENV_PREFIX}TIMEOUT_SECONDS is not a number: {raw}"
                ))
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(VaultError::Configuration("vault token is empty".to_string()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(VaultError::Configuration(format!(
                "vault url must use http:// or https://: {}",
                self.url
            )));
        }
        if self.api_keys_mount_point.trim_matches('/').is_empty() {
            return Err(VaultError::Configuration(
                "api keys mount point is empty".to_string(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(VaultError::Configuration(
                "timeout must be at least one second".to_string(),
            ));
        }
        if self.url.starts_with("http://") && !is_loopback(&self.url) {
            warn!(url = %self.url, "Vault url is not TLS protected");
        }
        Ok(())
    }

    /// Base url without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn is_loopback(url: &str) -> bool {
    let authority = url
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    let host = match authority.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
        None => authority.split(':').next().unwrap_or_default(),
    };
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let settings = VaultSettings::from_lookup(lookup(&[("VAULT_TOKEN", "root")])).unwrap();
        assert_eq!(settings.url, "http://localhost:8200");
        assert_eq!(settings.api_keys_mount_point, "api-keys");
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.token.expose_secret(), "root");
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let err = VaultSettings::from_lookup(lookup(&[("VAULT_URL", "http://vault:8200")]))
            .unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[test]
    fn overrides_and_validation() {
        let settings = VaultSettings::from_lookup(lookup(&[
            ("VAULT_TOKEN", "t"),
            ("VAULT_URL", "https://vault.internal:8200/"),
            ("VAULT_API_KEYS_MOUNT_POINT", "keys"),
            ("VAULT_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();
        assert_eq!(settings.base_url(), "https://vault.internal:8200");
        assert_eq!(settings.api_keys_mount_point, "keys");
        assert_eq!(settings.timeout_seconds, 5);

        let bad_scheme =
            VaultSettings::from_lookup(lookup(&[("VAULT_TOKEN", "t"), ("VAULT_URL", "ftp://x")]));
        assert!(bad_scheme.is_err());

        let bad_timeout = VaultSettings::from_lookup(lookup(&[
            ("VAULT_TOKEN", "t"),
            ("VAULT_TIMEOUT_SECONDS", "soon"),
        ]));
        assert!(bad_timeout.is_err());
    }

    #[test]
    fn deserializes_from_an_embedding_config() {
        let settings: VaultSettings =
            serde_json::from_str(r#"{"token": "s.abc", "api_keys_mount_point": "keys"}"#).unwrap();
        assert_eq!(settings.url, "http://localhost:8200");
        assert_eq!(settings.api_keys_mount_point, "keys");
        assert_eq!(settings.token.expose_secret(), "s.abc");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn loopback_hosts_are_recognized() {
        assert!(is_loopback("http://localhost:8200"));
        assert!(is_loopback("http://127.0.0.1:8200/"));
        assert!(is_loopback("http://127.0.0.2"));
        assert!(is_loopback("http://[::1]:8200"));
        assert!(!is_loopback("http://vault.internal:8200"));
        assert!(!is_loopback("http://[2001:db8::1]:8200"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let settings = VaultSettings::new("super-secret-token");
        assert!(!format!("{settings:?}").contains("super-secret-token"));
    }
}
