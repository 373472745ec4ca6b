//! User API keys kept in the secrets store.
//!
//! Each user owns one bundle at `<api keys mount>/<user id>`; bundle keys are
//! API key ids and values are the raw API keys.

use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::client::{SecretData, SecretsClient};
use crate::config::VaultSettings;
use crate::error::{VaultError, VaultResult};
use crate::session::VaultSession;

const CREATE_API_KEY_FIRST: &str =
    "Before you can use this feature, you need to create an API key first.";

/// Freshly issued key, the only time its raw value leaves the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedApiKey {
    pub api_key_id: String,
    pub api_key: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserApiKey {
    pub api_key_id: String,
    /// `None` when the store has no value for a known id
    pub api_key_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiKeyVaultRepository {
    mount_point: String,
}

impl ApiKeyVaultRepository {
    pub fn new(settings: &VaultSettings) -> Self {
        Self::with_mount_point(settings.api_keys_mount_point.clone())
    }

    pub fn with_mount_point(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// All stored keys of `user_id`, keyed by API key id
    pub async fn get_user_api_keys<C: SecretsClient>(
        &self,
        session: &VaultSession<C>,
        user_id: Uuid,
    ) -> VaultResult<SecretData> {
        session
            .read_secret(&user_id.to_string(), &self.mount_point)
            .await
    }

    /// Queue storing `api_key` under `api_key_id`; written on the session's commit.
    pub fn add_api_key<C: SecretsClient>(
        &self,
        session: &mut VaultSession<C>,
        user_id: Uuid,
        api_key_id: &str,
        api_key: Uuid,
    ) {
        session.create_or_patch(
            user_id.to_string(),
            api_key_id,
            api_key.to_string(),
            self.mount_point.as_str(),
        );
    }

    /// Generate a key for `user_id`, store it and commit the session.
    pub async fn issue_api_key<C: SecretsClient>(
        &self,
        session: &mut VaultSession<C>,
        user_id: Uuid,
    ) -> VaultResult<IssuedApiKey> {
        let issued = IssuedApiKey {
            api_key_id: Uuid::new_v4().to_string(),
            api_key: Uuid::now_v7(),
        };
        self.add_api_key(session, user_id, &issued.api_key_id, issued.api_key);
        session.commit().await?;
        info!(user_id = %user_id, api_key_id = %issued.api_key_id, "API key issued");
        Ok(issued)
    }

    /// Pair every known key id with its stored value.
    pub async fn resolve_api_keys<C: SecretsClient>(
        &self,
        session: &VaultSession<C>,
        user_id: Uuid,
        api_key_ids: &[String],
    ) -> VaultResult<Vec<UserApiKey>> {
        if api_key_ids.is_empty() {
            return Err(VaultError::InvalidRequest(CREATE_API_KEY_FIRST.to_string()));
        }

        let stored = self.get_user_api_keys(session, user_id).await?;
        Ok(api_key_ids
            .iter()
            .map(|id| UserApiKey {
                api_key_id: id.clone(),
                api_key_value: stored.get(id).map(api_key_text),
            })
            .collect())
    }
}

fn api_key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
