//! Workspace operations against the workspace service

use std::sync::OnceLock;

use regex::Regex;
use terra_core::{Result, TerraError};
use tracing::info;
use uuid::Uuid;

use crate::model::{CreateWorkspace, IamRole, RoleBinding, Workspace, WorkspaceUpdate};
use crate::retry::{Recovery, RemoteError, RetryingClient};
use crate::service::{IdentityApi, WorkspaceApi};

fn user_facing_id_regex() -> &'static Regex {
    static ID: OnceLock<Regex> = OnceLock::new();
    ID.get_or_init(|| {
        Regex::new(r"^[a-z0-9][-_a-z0-9]{2,62}$").expect("user facing id regex must compile")
    })
}

/// Lowercase letters, digits, dashes and underscores; 3 to 63 characters
pub fn validate_user_facing_id(id: &str) -> Result<()> {
    if user_facing_id_regex().is_match(id) {
        Ok(())
    } else {
        Err(TerraError::InvalidInput(format!(
            "Invalid workspace id '{}': use 3-63 lowercase letters, numbers, dashes or underscores",
            id
        )))
    }
}

pub struct WorkspaceManager<'a> {
    api: &'a dyn WorkspaceApi,
    identity: &'a dyn IdentityApi,
    retry: &'a RetryingClient,
    token: &'a str,
}

impl<'a> WorkspaceManager<'a> {
    pub fn new(
        api: &'a dyn WorkspaceApi,
        identity: &'a dyn IdentityApi,
        retry: &'a RetryingClient,
        token: &'a str,
    ) -> Self {
        Self {
            api,
            identity,
            retry,
            token,
        }
    }

    pub fn create(&self, request: &CreateWorkspace) -> Result<Workspace> {
        validate_user_facing_id(&request.user_facing_id)?;
        let what = format!("Workspace {}", request.user_facing_id);
        let workspace = self
            .retry
            .call(&what, || self.api.create_workspace(self.token, request))?;
        info!(workspace = %workspace.user_facing_id, id = %workspace.id, "Created workspace");
        Ok(workspace)
    }

    /// Look up by UUID, or by user-facing id for anything else
    pub fn get(&self, id: &str) -> Result<Workspace> {
        let what = format!("Workspace {}", id);
        match Uuid::parse_str(id) {
            Ok(uuid) => self
                .retry
                .call(&what, || self.api.get_workspace(self.token, uuid)),
            Err(_) => self.retry.call(&what, || {
                self.api.get_workspace_by_user_facing_id(self.token, id)
            }),
        }
    }

    /// Workspaces the user can read, one page at a time
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<Workspace>> {
        self.retry
            .call("Workspaces", || self.api.list_workspaces(self.token, offset, limit))
    }

    /// Fetch the latest snapshot of a workspace
    pub fn refresh(&self, workspace: &Workspace) -> Result<Workspace> {
        let what = format!("Workspace {}", workspace.user_facing_id);
        self.retry
            .call(&what, || self.api.get_workspace(self.token, workspace.id))
    }

    pub fn update(&self, workspace: &Workspace, update: &WorkspaceUpdate) -> Result<Workspace> {
        if let Some(id) = &update.user_facing_id {
            validate_user_facing_id(id)?;
        }
        let what = format!("Workspace {}", workspace.user_facing_id);
        let updated = self.retry.call(&what, || {
            self.api.update_workspace(self.token, workspace.id, update)
        })?;
        info!(workspace = %updated.user_facing_id, "Updated workspace");
        Ok(updated)
    }

    pub fn delete(&self, workspace: &Workspace) -> Result<()> {
        let what = format!("Workspace {}", workspace.user_facing_id);
        self.retry
            .call(&what, || self.api.delete_workspace(self.token, workspace.id))?;
        info!(workspace = %workspace.user_facing_id, "Deleted workspace");
        Ok(())
    }

    pub fn list_users(&self, workspace: &Workspace) -> Result<Vec<RoleBinding>> {
        let what = format!("Users of workspace {}", workspace.user_facing_id);
        self.retry
            .call(&what, || self.api.list_users(self.token, workspace.id))
    }

    /// Grant a role; a user unknown to the identity service is invited once
    /// and the grant retried.
    pub fn grant_role(
        &self,
        workspace: &Workspace,
        role: IamRole,
        email: &str,
    ) -> Result<Recovery<()>> {
        let what = format!("Grant {} on workspace {}", role.as_str(), workspace.user_facing_id);
        let outcome = self.retry.call_with_recovery(
            &what,
            || self.api.grant_role(self.token, workspace.id, role, email),
            RemoteError::is_bad_request,
            || {
                info!(email, "Inviting user");
                self.retry
                    .call("invite user", || self.identity.invite_user(self.token, email))
            },
        )?;
        info!(workspace = %workspace.user_facing_id, email, role = role.as_str(), "Granted role");
        Ok(outcome)
    }

    pub fn remove_role(&self, workspace: &Workspace, role: IamRole, email: &str) -> Result<()> {
        let what = format!(
            "{} role of {} on workspace {}",
            role.as_str(),
            email,
            workspace.user_facing_id
        );
        self.retry.call(&what, || {
            self.api.remove_role(self.token, workspace.id, role, email)
        })?;
        info!(workspace = %workspace.user_facing_id, email, role = role.as_str(), "Removed role");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CloudPlatform;
    use crate::retry::RetryPolicy;
    use crate::testing::{FakeIdentityApi, FakeWorkspaceApi, Fakes};

    fn retry() -> RetryingClient {
        RetryingClient::new(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_get_by_uuid_or_user_facing_id() {
        let api = FakeWorkspaceApi::default();
        let identity = FakeIdentityApi::default();
        let retry = retry();
        let w1 = api.add_workspace("w1-data");

        let manager = WorkspaceManager::new(&api, &identity, &retry, "token");
        assert_eq!(manager.get(&w1.id.to_string()).unwrap(), w1);
        assert_eq!(manager.get("w1-data").unwrap(), w1);

        let err = manager.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "Workspace nope not found");
    }

    #[test]
    fn test_create_validates_user_facing_id() {
        let api = FakeWorkspaceApi::default();
        let identity = FakeIdentityApi::default();
        let retry = retry();
        let manager = WorkspaceManager::new(&api, &identity, &retry, "token");

        let request = CreateWorkspace {
            user_facing_id: "Bad Id".to_string(),
            name: None,
            description: None,
            cloud_platform: CloudPlatform::Gcp,
        };
        assert!(matches!(manager.create(&request), Err(TerraError::InvalidInput(_))));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_create_retries_transient_failures() {
        let api = FakeWorkspaceApi::default();
        let identity = FakeIdentityApi::default();
        let retry = retry();
        api.fail_next(2);

        let manager = WorkspaceManager::new(&api, &identity, &retry, "token");
        let request = CreateWorkspace {
            user_facing_id: "fresh-ws".to_string(),
            name: Some("Fresh".to_string()),
            description: None,
            cloud_platform: CloudPlatform::Gcp,
        };
        let created = manager.create(&request).unwrap();
        assert_eq!(created.user_facing_id, "fresh-ws");
        assert_eq!(api.calls().len(), 3);
    }

    #[test]
    fn test_grant_role_invites_unknown_user() {
        let fakes = Fakes::new();
        let (api, identity) = (fakes.workspace.as_ref(), fakes.identity.as_ref());
        let retry = retry();
        let w1 = api.add_workspace("w1");

        let manager = WorkspaceManager::new(api, identity, &retry, "token");
        let outcome = manager
            .grant_role(&w1, IamRole::Writer, "friend@example.org")
            .unwrap();

        assert!(outcome.was_recovered());
        assert_eq!(identity.invites(), vec!["friend@example.org".to_string()]);
        let users = manager.list_users(&w1).unwrap();
        assert_eq!(users[0].role, IamRole::Writer);
        assert_eq!(users[0].members, vec!["friend@example.org".to_string()]);
    }

    #[test]
    fn test_remove_role() {
        let fakes = Fakes::new();
        let (api, identity) = (fakes.workspace.as_ref(), fakes.identity.as_ref());
        let retry = retry();
        let w1 = api.add_workspace("w1");

        let manager = WorkspaceManager::new(api, identity, &retry, "token");
        manager
            .grant_role(&w1, IamRole::Reader, "friend@example.org")
            .unwrap();
        manager
            .remove_role(&w1, IamRole::Reader, "friend@example.org")
            .unwrap();
        assert!(manager.list_users(&w1).unwrap()[0].members.is_empty());

        let err = manager
            .remove_role(&w1, IamRole::Reader, "friend@example.org")
            .unwrap_err();
        assert!(matches!(err, TerraError::NotFound(_)));
    }

    #[test]
    fn test_list_pages() {
        let api = FakeWorkspaceApi::default();
        let identity = FakeIdentityApi::default();
        let retry = retry();
        for id in ["ws-a", "ws-b", "ws-c"] {
            api.add_workspace(id);
        }

        let manager = WorkspaceManager::new(&api, &identity, &retry, "token");
        let second: Vec<String> = manager
            .list(1, 10)
            .unwrap()
            .into_iter()
            .map(|w| w.user_facing_id)
            .collect();
        assert_eq!(second, vec!["ws-b".to_string(), "ws-c".to_string()]);
    }

    #[test]
    fn test_user_facing_id_rules() {
        assert!(validate_user_facing_id("my-ws_1").is_ok());
        assert!(validate_user_facing_id("ab").is_err());
        assert!(validate_user_facing_id("-leading").is_err());
        assert!(validate_user_facing_id("UPPER").is_err());
    }
}
