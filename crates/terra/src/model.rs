//! Plain records shared across the CLI
//!
//! Workspaces, identities, credentials and the server selection. These are
//! immutable snapshots; nothing here talks to a remote service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use terra_core::TerraError;
use uuid::Uuid;

/// Cloud platform backing a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudPlatform {
    Gcp,
    Azure,
}

impl std::fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gcp => write!(f, "GCP"),
            Self::Azure => write!(f, "AZURE"),
        }
    }
}

/// A workspace snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    /// Human readable slug, mutable
    pub user_facing_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cloud_platform: CloudPlatform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Workspace {
    /// The cloud project, or a user-actionable error for project-less workspaces
    pub fn required_project_id(&self) -> Result<&str, TerraError> {
        self.project_id.as_deref().ok_or_else(|| {
            TerraError::UserActionable(format!(
                "No GCP project available in workspace {}",
                self.user_facing_id
            ))
        })
    }
}

/// Parameters for creating a workspace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspace {
    pub user_facing_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cloud_platform: CloudPlatform,
}

/// Mutable workspace properties, `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_facing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Workspace roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IamRole {
    Reader,
    Writer,
    Owner,
}

impl IamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "READER",
            Self::Writer => "WRITER",
            Self::Owner => "OWNER",
        }
    }
}

/// Members holding a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: IamRole,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Policies on an identity-service group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    Member,
    Admin,
}

impl GroupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

/// A group the current user belongs to, with the policy they hold on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_name: String,
    pub group_email: String,
    pub role: GroupPolicy,
}

/// A bearer token and its expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Expired at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// End-user login credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredential {
    #[serde(flatten)]
    pub token: Credential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Workspace-scoped impersonated identity (the user's service identity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonatedCredential {
    pub email: String,
    /// Key material handed to tools, written verbatim to disk
    pub key: serde_json::Value,
    pub token: Credential,
}

/// What the identity service knows about a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_subject_id: String,
    pub user_email: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// A logged-in identity. Tokens are held by the credential store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Locally generated key, stable across token refreshes
    pub key: String,
    pub subject_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_group_email: Option<String>,
}

/// The remote deployment commands talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub workspace_manager_uri: String,
    pub identity_uri: String,
    pub oauth_token_uri: String,
    #[serde(default)]
    pub oauth_client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_secret: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            name: "broad-dev".to_string(),
            description: "Terra development deployment".to_string(),
            workspace_manager_uri: "https://workspace.dsde-dev.broadinstitute.org".to_string(),
            identity_uri: "https://sam.dsde-dev.broadinstitute.org".to_string(),
            oauth_token_uri: "https://oauth2.googleapis.com/token".to_string(),
            oauth_client_id: String::new(),
            oauth_client_secret: None,
        }
    }
}
