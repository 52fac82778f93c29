//! Remote collaborators
//!
//! The traits here are the only way the rest of the crate talks to the
//! outside world. Implementations return raw [`RemoteError`]s; retry and
//! taxonomy mapping happen in [`crate::retry`].

pub mod cloud;
pub mod http;
pub mod identity;
pub mod workspace;

use uuid::Uuid;

use crate::model::{
    CreateWorkspace, Group, GroupPolicy, IamRole, ImpersonatedCredential, RoleBinding, UserInfo,
    Workspace, WorkspaceUpdate,
};
use crate::resource::{Resource, ResourceRequest};
use crate::retry::RemoteError;

pub use cloud::HttpCloudApi;
pub use identity::HttpIdentityApi;
pub use workspace::HttpWorkspaceApi;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The workspace/resource service
pub trait WorkspaceApi {
    fn create_workspace(&self, token: &str, request: &CreateWorkspace) -> RemoteResult<Workspace>;
    fn get_workspace(&self, token: &str, id: Uuid) -> RemoteResult<Workspace>;
    fn get_workspace_by_user_facing_id(
        &self,
        token: &str,
        user_facing_id: &str,
    ) -> RemoteResult<Workspace>;
    /// One page of the workspaces the caller can read
    fn list_workspaces(&self, token: &str, offset: usize, limit: usize)
        -> RemoteResult<Vec<Workspace>>;
    fn update_workspace(
        &self,
        token: &str,
        id: Uuid,
        update: &WorkspaceUpdate,
    ) -> RemoteResult<Workspace>;
    fn delete_workspace(&self, token: &str, id: Uuid) -> RemoteResult<()>;

    /// One page of resources, ordered by the service
    fn list_resources(
        &self,
        token: &str,
        workspace_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Resource>>;
    fn create_referenced(
        &self,
        token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource>;
    /// Provisions the backing cloud object as well
    fn create_controlled(
        &self,
        token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource>;
    fn delete_referenced(&self, token: &str, workspace_id: Uuid, resource: &Resource)
        -> RemoteResult<()>;
    /// Deprovisions the backing cloud object as well
    fn delete_controlled(&self, token: &str, workspace_id: Uuid, resource: &Resource)
        -> RemoteResult<()>;

    fn list_users(&self, token: &str, workspace_id: Uuid) -> RemoteResult<Vec<RoleBinding>>;
    fn grant_role(&self, token: &str, workspace_id: Uuid, role: IamRole, email: &str)
        -> RemoteResult<()>;
    fn remove_role(&self, token: &str, workspace_id: Uuid, role: IamRole, email: &str)
        -> RemoteResult<()>;
}

/// The identity service
pub trait IdentityApi {
    /// Who the token belongs to; 404 for users that never registered
    fn get_token_info(&self, token: &str) -> RemoteResult<UserInfo>;
    fn register_user(&self, token: &str) -> RemoteResult<UserInfo>;
    fn get_proxy_group_email(&self, token: &str, email: &str) -> RemoteResult<String>;
    /// Key material and a token for the user's service identity in a project
    fn get_impersonated_credential(
        &self,
        token: &str,
        project_id: &str,
    ) -> RemoteResult<ImpersonatedCredential>;
    fn invite_user(&self, token: &str, email: &str) -> RemoteResult<()>;

    /// Groups the caller belongs to
    fn list_groups(&self, token: &str) -> RemoteResult<Vec<Group>>;
    fn create_group(&self, token: &str, name: &str) -> RemoteResult<()>;
    fn delete_group(&self, token: &str, name: &str) -> RemoteResult<()>;
    fn get_group_email(&self, token: &str, name: &str) -> RemoteResult<String>;
    fn list_group_members(&self, token: &str, name: &str, policy: GroupPolicy)
        -> RemoteResult<Vec<String>>;
    fn add_group_member(&self, token: &str, name: &str, policy: GroupPolicy, email: &str)
        -> RemoteResult<()>;
    fn remove_group_member(&self, token: &str, name: &str, policy: GroupPolicy, email: &str)
        -> RemoteResult<()>;
}

/// Cloud providers backing referenced resources
pub trait CloudApi {
    /// `Ok(false)` when the provider refuses access
    fn can_read(&self, token: &str, resource: &Resource) -> RemoteResult<bool>;
}
