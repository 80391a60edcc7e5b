//! Propagation of mapped roles to the external IAM system.
//!
//! The pipeline treats this collaborator as fire-and-forget: a failed sync
//! is logged and the locally computed permissions stand. Implementations
//! are additive-only: they may grant, never revoke.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::KeycloakConfig;
use crate::types::TargetRole;

/// Errors surfaced by an IAM sync attempt.
///
/// "User not found" and "client not found" are deliberately not errors:
/// the launchpad may assert users the IAM realm has never seen, and that
/// must not disturb request handling.
#[derive(Debug)]
pub enum SyncError {
    /// Network-level failure reaching the IAM endpoint.
    Transport(String),
    /// The IAM endpoint answered with a non-success status.
    Endpoint(String),
    /// The IAM endpoint answered with a body we could not interpret.
    MalformedResponse(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "IAM transport error: {}", msg),
            Self::Endpoint(msg) => write!(f, "IAM endpoint error: {}", msg),
            Self::MalformedResponse(msg) => write!(f, "IAM response error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// External identity/access-management collaborator.
#[async_trait]
pub trait IdentityProviderSync: Send + Sync {
    /// Grant the given target roles to the user in the IAM system.
    ///
    /// Must be a no-op for an empty role set, must never remove existing
    /// grants, and must tolerate an unknown username or client by logging
    /// and returning `Ok`.
    async fn apply_roles(
        &self,
        username: &str,
        target_roles: &HashSet<TargetRole>,
    ) -> Result<(), SyncError>;

    /// Implementation name for logging and the health surface.
    fn provider_name(&self) -> &'static str;
}

/// No-op sync for deployments without an IAM endpoint configured.
///
/// Logs what would have been granted, at debug level.
#[derive(Default)]
pub struct LoggingSync;

#[async_trait]
impl IdentityProviderSync for LoggingSync {
    async fn apply_roles(
        &self,
        username: &str,
        target_roles: &HashSet<TargetRole>,
    ) -> Result<(), SyncError> {
        debug!(user = username, roles = ?target_roles, "IAM sync disabled, roles not propagated");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "logging"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct KeycloakUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct KeycloakClient {
    id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct KeycloakRole {
    id: String,
    name: String,
}

/// Keycloak admin-REST implementation of [`IdentityProviderSync`].
///
/// Grants client roles to the user via the admin API:
/// client-credentials token → user lookup → client lookup → role lookup →
/// additive role-mapping POST.
pub struct KeycloakSync {
    http: reqwest::Client,
    config: KeycloakConfig,
}

impl KeycloakSync {
    pub fn new(config: KeycloakConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Reduce the requested target roles to bare role names for the
    /// configured client: compound roles must carry the client's tenant,
    /// plain roles are taken as-is.
    fn role_names_for_client(&self, target_roles: &HashSet<TargetRole>) -> Vec<String> {
        let mut names: Vec<String> = target_roles
            .iter()
            .filter_map(|role| match role.split_tenant() {
                Some((tenant, name)) if tenant == self.config.client_id => {
                    Some(name.to_string())
                }
                Some(_) => None,
                None => Some(role.as_str().to_string()),
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    async fn admin_token(&self) -> Result<String, SyncError> {
        let token_url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.config.url, self.config.realm
        );

        let response = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.admin_client_id.as_str()),
                ("client_secret", self.config.admin_client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Endpoint(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn find_user(&self, token: &str, username: &str) -> Result<Option<KeycloakUser>, SyncError> {
        let url = format!(
            "{}/admin/realms/{}/users",
            self.config.url, self.config.realm
        );

        let response = self
            .http
            .get(&url)
            .query(&[("username", username), ("exact", "true")])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Endpoint(format!(
                "user lookup returned {}",
                response.status()
            )));
        }

        let users: Vec<KeycloakUser> = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        Ok(users.into_iter().next())
    }

    async fn find_client(&self, token: &str) -> Result<Option<KeycloakClient>, SyncError> {
        let url = format!(
            "{}/admin/realms/{}/clients",
            self.config.url, self.config.realm
        );

        let response = self
            .http
            .get(&url)
            .query(&[("clientId", self.config.client_id.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Endpoint(format!(
                "client lookup returned {}",
                response.status()
            )));
        }

        let clients: Vec<KeycloakClient> = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        Ok(clients.into_iter().next())
    }

    async fn client_roles(
        &self,
        token: &str,
        client_uuid: &str,
    ) -> Result<Vec<KeycloakRole>, SyncError> {
        let url = format!(
            "{}/admin/realms/{}/clients/{}/roles",
            self.config.url, self.config.realm, client_uuid
        );

        let response = self.http.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::Endpoint(format!(
                "role listing returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))
    }

    async fn assign_roles(
        &self,
        token: &str,
        user_id: &str,
        client_uuid: &str,
        roles: &[KeycloakRole],
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/admin/realms/{}/users/{}/role-mappings/clients/{}",
            self.config.url, self.config.realm, user_id, client_uuid
        );

        // POST is additive in the Keycloak role-mapping API; existing
        // grants stay untouched.
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(roles)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Endpoint(format!(
                "role assignment returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl IdentityProviderSync for KeycloakSync {
    async fn apply_roles(
        &self,
        username: &str,
        target_roles: &HashSet<TargetRole>,
    ) -> Result<(), SyncError> {
        if target_roles.is_empty() {
            debug!(user = username, "no target roles to apply");
            return Ok(());
        }

        let role_names = self.role_names_for_client(target_roles);
        if role_names.is_empty() {
            debug!(
                user = username,
                client = %self.config.client_id,
                "no roles scoped to this client"
            );
            return Ok(());
        }

        info!(user = username, roles = ?role_names, "applying roles in Keycloak");

        let token = self.admin_token().await?;

        let Some(user) = self.find_user(&token, username).await? else {
            warn!(
                user = username,
                realm = %self.config.realm,
                "user not found in realm, skipping role sync"
            );
            return Ok(());
        };

        let Some(client) = self.find_client(&token).await? else {
            warn!(
                client = %self.config.client_id,
                realm = %self.config.realm,
                "client not found in realm, skipping role sync"
            );
            return Ok(());
        };

        let all_roles = self.client_roles(&token, &client.id).await?;
        let to_assign: Vec<KeycloakRole> = all_roles
            .into_iter()
            .filter(|r| role_names.iter().any(|n| n == &r.name))
            .collect();

        if to_assign.is_empty() {
            warn!(
                user = username,
                roles = ?role_names,
                client = %self.config.client_id,
                "none of the requested roles exist on the client"
            );
            return Ok(());
        }

        self.assign_roles(&token, &user.id, &client.id, &to_assign)
            .await?;

        info!(user = username, count = to_assign.len(), "roles applied");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "keycloak"
    }
}
