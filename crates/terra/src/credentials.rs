//! End-user and impersonated-identity credentials
//!
//! Expiry is checked lazily at the moment a token is requested. Refreshing an
//! end-user token goes through a [`TokenRefresher`]; impersonated credentials
//! are fetched from the identity service and cached per (identity, workspace).

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use terra_core::files::{read_json, write_json};
use terra_core::{Paths, Result, TerraError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{
    Credential, Identity, ImpersonatedCredential, Server, UserCredential, Workspace,
};
use crate::retry::{RemoteError, RetryingClient};
use crate::service::IdentityApi;

/// Exchanges a refresh token for a new access token
pub trait TokenRefresher {
    fn refresh(&self, refresh_token: &str) -> std::result::Result<Credential, RemoteError>;
}

/// `refresh_token` grant against the server's OAuth token endpoint
pub struct OAuthRefresher {
    client: reqwest::blocking::Client,
    server: String,
    token_uri: String,
    client_id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl OAuthRefresher {
    pub fn new(server: &Server, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TerraError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            server: server.name.clone(),
            token_uri: server.oauth_token_uri.clone(),
            client_id: server.oauth_client_id.clone(),
            client_secret: server.oauth_client_secret.clone(),
        })
    }
}

impl TokenRefresher for OAuthRefresher {
    fn refresh(&self, refresh_token: &str) -> std::result::Result<Credential, RemoteError> {
        if self.client_id.is_empty() {
            return Err(RemoteError::local(format!(
                "Server {} has no OAuth client id; run `terra server set --name {} \
                 --oauth-client-id <ID>` to configure one",
                self.server, self.server
            )));
        }
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.token_uri)
            .form(&form)
            .send()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RemoteError::http(status.as_u16(), body));
        }
        let token: TokenResponse = response.json().map_err(|e| {
            RemoteError::http(status.as_u16(), format!("Invalid token response: {}", e))
        })?;
        Ok(Credential::new(
            token.access_token,
            Utc::now() + chrono::Duration::seconds(token.expires_in),
        ))
    }
}

pub struct CredentialStore {
    paths: Paths,
    identity_api: Rc<dyn IdentityApi>,
    refresher: Rc<dyn TokenRefresher>,
    retry: RetryingClient,
    users: HashMap<String, UserCredential>,
    impersonated: HashMap<(String, Uuid), ImpersonatedCredential>,
}

impl CredentialStore {
    pub fn new(
        paths: Paths,
        identity_api: Rc<dyn IdentityApi>,
        refresher: Rc<dyn TokenRefresher>,
        retry: RetryingClient,
    ) -> Self {
        Self {
            paths,
            identity_api,
            refresher,
            retry,
            users: HashMap::new(),
            impersonated: HashMap::new(),
        }
    }

    /// Persist a credential obtained by an external login flow
    pub fn store_user_credential(
        &mut self,
        identity_key: &str,
        credential: UserCredential,
    ) -> Result<()> {
        write_json(&self.paths.user_credential_file(identity_key), &credential, true)?;
        self.users.insert(identity_key.to_string(), credential);
        Ok(())
    }

    fn load_user_credential(&mut self, identity: &Identity) -> Result<UserCredential> {
        if let Some(credential) = self.users.get(&identity.key) {
            return Ok(credential.clone());
        }
        let credential: UserCredential = read_json(&self.paths.user_credential_file(&identity.key))?
            .ok_or_else(|| {
                TerraError::AuthExpired(format!("no stored credentials for {}", identity.email))
            })?;
        self.users.insert(identity.key.clone(), credential.clone());
        Ok(credential)
    }

    /// A non-expired access token for the end user, refreshing if needed
    pub fn get_user_token(&mut self, identity: &Identity) -> Result<String> {
        let credential = self.load_user_credential(identity)?;
        if !credential.token.is_expired() {
            return Ok(credential.token.access_token);
        }

        let refresh_token = credential.refresh_token.ok_or_else(|| {
            TerraError::AuthExpired(format!(
                "login for {} expired and cannot be refreshed",
                identity.email
            ))
        })?;

        debug!(identity = %identity.key, "Refreshing user token");
        let refresher = Rc::clone(&self.refresher);
        let token = self
            .retry
            .call("refresh access token", || refresher.refresh(&refresh_token))
            .map_err(|e| match e {
                passed @ (TerraError::RemoteUnavailable { .. } | TerraError::UserActionable(_)) => {
                    passed
                }
                other => TerraError::AuthExpired(other.to_string()),
            })?;

        let access_token = token.access_token.clone();
        self.store_user_credential(
            &identity.key,
            UserCredential {
                token,
                refresh_token: Some(refresh_token),
            },
        )?;
        Ok(access_token)
    }

    fn impersonated_credential(
        &mut self,
        identity: &Identity,
        workspace: &Workspace,
    ) -> Result<&ImpersonatedCredential> {
        let cache_key = (identity.key.clone(), workspace.id);
        let fresh = self
            .impersonated
            .get(&cache_key)
            .map(|c| !c.token.is_expired())
            .unwrap_or(false);

        if !fresh {
            let project_id = workspace.required_project_id()?.to_string();
            let user_token = self.get_user_token(identity)?;
            let api = Rc::clone(&self.identity_api);
            let what = format!(
                "Impersonated credential for workspace {}",
                workspace.user_facing_id
            );
            let credential = self
                .retry
                .call(&what, || api.get_impersonated_credential(&user_token, &project_id))?;

            let key_file = self.key_file_path(identity, workspace);
            write_json(&key_file, &credential.key, true)?;
            info!(
                workspace = %workspace.user_facing_id,
                email = %credential.email,
                "Fetched impersonated credential"
            );
            self.impersonated.insert(cache_key.clone(), credential);
        }

        self.impersonated
            .get(&cache_key)
            .ok_or_else(|| TerraError::Internal("impersonated credential cache miss".to_string()))
    }

    /// Token of the workspace-scoped impersonated identity
    pub fn get_impersonated_token(
        &mut self,
        identity: &Identity,
        workspace: &Workspace,
    ) -> Result<String> {
        Ok(self
            .impersonated_credential(identity, workspace)?
            .token
            .access_token
            .clone())
    }

    fn key_file_path(&self, identity: &Identity, workspace: &Workspace) -> PathBuf {
        self.paths
            .impersonated_key_file(&identity.key, &workspace.id.to_string())
    }

    /// Location of the impersonated identity's key material, fetched first if absent
    pub fn impersonated_key_file(
        &mut self,
        identity: &Identity,
        workspace: &Workspace,
    ) -> Result<PathBuf> {
        let path = self.key_file_path(identity, workspace);
        if !path.exists() {
            self.impersonated_credential(identity, workspace)?;
        }
        Ok(path)
    }

    /// Drop impersonated credentials for one workspace, or with no workspace
    /// every credential the identity holds, including its own login.
    pub fn invalidate(&mut self, identity: &Identity, workspace: Option<&Workspace>) -> Result<()> {
        match workspace {
            Some(workspace) => {
                self.impersonated
                    .remove(&(identity.key.clone(), workspace.id));
                remove_if_exists(&self.key_file_path(identity, workspace))?;
                debug!(
                    workspace = %workspace.user_facing_id,
                    "Invalidated impersonated credential"
                );
            }
            None => {
                self.impersonated.retain(|(key, _), _| key != &identity.key);
                self.users.remove(&identity.key);

                let dir = self.paths.identity_dir(&identity.key);
                if dir.exists() {
                    let identity_file = self.paths.identity_file(&identity.key);
                    for entry in fs::read_dir(&dir)? {
                        let path = entry?.path();
                        if path.is_file() && path != identity_file {
                            fs::remove_file(&path)?;
                        }
                    }
                }
                info!(email = %identity.email, "Invalidated all credentials");
            }
        }
        Ok(())
    }
}

fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
