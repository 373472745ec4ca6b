//! HashiCorp Vault REST client for KV version 2 engines.
//!
//! Uses `reqwest::blocking`; every call is expected to run on a blocking
//! thread (see [`super::offload`]). The inner HTTP client is created in
//! [`HttpSecretsEngine::connect`] and dropped in [`SecretsClient::close`], so
//! each unit of work gets its own connection pool.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::debug;

use super::{SecretData, SecretsClient, SecretsEngine};
use crate::config::VaultSettings;
use crate::error::{VaultError, VaultResult};

const TOKEN_HEADER: &str = "X-Vault-Token";
const MERGE_PATCH: &str = "application/merge-patch+json";

/// Builds one [`HttpSecretsClient`] per unit of work
#[derive(Debug, Clone)]
pub struct HttpSecretsEngine {
    settings: Arc<VaultSettings>,
}

impl HttpSecretsEngine {
    pub fn new(settings: VaultSettings) -> VaultResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    fn user_agent() -> String {
        format!("vault_session/{}", env!("CARGO_PKG_VERSION"))
    }
}

impl SecretsEngine for HttpSecretsEngine {
    type Client = HttpSecretsClient;

    fn connect(&self) -> VaultResult<HttpSecretsClient> {
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(self.settings.timeout())
            .build()
            .map_err(VaultError::Network)?;

        debug!(url = %self.settings.base_url(), "Opened Vault HTTP session");
        Ok(HttpSecretsClient {
            http: Mutex::new(Some(http)),
            settings: Arc::clone(&self.settings),
        })
    }
}

/// Vault REST API client bound to one HTTP session
#[derive(Debug)]
pub struct HttpSecretsClient {
    http: Mutex<Option<Client>>,
    settings: Arc<VaultSettings>,
}

impl HttpSecretsClient {
    fn http(&self) -> VaultResult<Client> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(VaultError::SessionClosed)
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/v1/{}", self.settings.base_url(), tail)
    }

    fn kv_data_url(&self, path: &str, mount_point: &str) -> String {
        self.url(&format!(
            "{}/data/{}",
            encode_vault_path(mount_point.trim_matches('/')),
            encode_vault_path(path.trim_matches('/'))
        ))
    }

    fn send(&self, request: RequestBuilder, target: &str) -> VaultResult<Response> {
        let response = request
            .header(TOKEN_HEADER, self.settings.token.expose_secret())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(VaultError::Network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| target.to_string());
        Err(VaultError::from_status(status.as_u16(), message))
    }

    fn write(&self, request: RequestBuilder, secret: &SecretData, target: &str) -> VaultResult<()> {
        let body = serde_json::to_vec(&json!({ "data": secret }))?;
        self.send(request.body(body), target)?;
        Ok(())
    }
}

impl SecretsClient for HttpSecretsClient {
    fn read_secret(&self, path: &str, mount_point: &str) -> VaultResult<SecretData> {
        let target = secret_target(mount_point, path);
        let response = self.send(self.http()?.get(self.kv_data_url(path, mount_point)), &target)?;
        let body: Value = response.json().map_err(VaultError::Network)?;
        Ok(extract_secret_data(&body))
    }

    fn patch_secret(&self, path: &str, secret: &SecretData, mount_point: &str) -> VaultResult<()> {
        let request = self
            .http()?
            .patch(self.kv_data_url(path, mount_point))
            .header(CONTENT_TYPE, MERGE_PATCH);
        self.write(request, secret, &secret_target(mount_point, path))
    }

    fn create_or_update_secret(
        &self,
        path: &str,
        secret: &SecretData,
        mount_point: &str,
    ) -> VaultResult<()> {
        let request = self
            .http()?
            .post(self.kv_data_url(path, mount_point))
            .header(CONTENT_TYPE, "application/json");
        self.write(request, secret, &secret_target(mount_point, path))
    }

    fn list_mounted_secrets_engines(&self) -> VaultResult<Vec<String>> {
        let response = self.send(self.http()?.get(self.url("sys/mounts")), "sys/mounts")?;
        let body: Value = response.json().map_err(VaultError::Network)?;
        Ok(extract_mounts(&body))
    }

    fn enable_kv_engine(&self, mount_point: &str, description: &str) -> VaultResult<()> {
        let mount = mount_point.trim_matches('/');
        let body = serde_json::to_vec(&json!({
            "type": "kv",
            "description": description,
            "options": { "version": "2" },
        }))?;
        let request = self
            .http()?
            .post(self.url(&format!("sys/mounts/{}", encode_vault_path(mount))))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(request, &format!("sys/mounts/{mount}"))?;
        Ok(())
    }

    fn close(&self) {
        if self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!(url = %self.settings.base_url(), "Closed Vault HTTP session");
        }
    }
}

fn secret_target(mount_point: &str, path: &str) -> String {
    format!("{}/{}", mount_point.trim_matches('/'), path.trim_matches('/'))
}

/// Percent-encode a single URL path component.
fn percent_encode_component(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Percent-encode each segment of a slash-delimited Vault path.
fn encode_vault_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// `{"errors": ["..."]}` as one line, if the body carries any
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let errors: Vec<&str> = value
        .get("errors")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

/// KV v2 read payload: `{"data": {"data": {...}, "metadata": {...}}}`.
/// Values are kept verbatim; a deleted version (`"data": null`) reads as empty.
fn extract_secret_data(body: &Value) -> SecretData {
    body.get("data")
        .and_then(|v| v.get("data"))
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Mount table keys. Newer servers nest them under `data`, older ones only
/// at the top level.
fn extract_mounts(body: &Value) -> Vec<String> {
    let table = body
        .get("data")
        .filter(|v| v.is_object())
        .unwrap_or(body);
    table
        .as_object()
        .map(|mounts| {
            mounts
                .keys()
                .filter(|key| key.ends_with('/'))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
