//! In-memory stand-ins for the remote services

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::credentials::TokenRefresher;
use crate::model::{
    CloudPlatform, CreateWorkspace, Credential, Group, GroupPolicy, IamRole, Identity,
    ImpersonatedCredential, RoleBinding, UserInfo, Workspace, WorkspaceUpdate,
};
use crate::resource::{CloningPolicy, Resource, ResourceKind, ResourceRequest, Stewardship};
use crate::retry::RemoteError;
use crate::service::{CloudApi, IdentityApi, RemoteResult, WorkspaceApi};

/// Emails known to the identity service, shared between fakes
pub type Directory = Rc<RefCell<HashSet<String>>>;

pub const USER_EMAIL: &str = "user@example.org";

pub fn identity(key: &str) -> Identity {
    Identity {
        key: key.to_string(),
        subject_id: "subject-1".to_string(),
        email: USER_EMAIL.to_string(),
        proxy_group_email: Some("PROXY_subject-1@example.org".to_string()),
    }
}

pub fn bucket_kind(name: &str) -> ResourceKind {
    ResourceKind::GcsBucket {
        bucket_name: format!("bucket-{}", name.to_lowercase()),
    }
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::http(404, format!("{} does not exist", what))
}

#[derive(Default)]
pub struct FakeWorkspaceApi {
    workspaces: RefCell<Vec<Workspace>>,
    resources: RefCell<HashMap<Uuid, Vec<Resource>>>,
    bindings: RefCell<HashMap<Uuid, Vec<RoleBinding>>>,
    calls: RefCell<Vec<String>>,
    directory: Directory,
    transient_failures: Cell<u32>,
    reject_workspace_create: Cell<bool>,
    rejected_resources: RefCell<HashSet<String>>,
}

impl FakeWorkspaceApi {
    pub fn with_directory(directory: Directory) -> Self {
        Self {
            directory,
            ..Default::default()
        }
    }

    pub fn add_workspace(&self, user_facing_id: &str) -> Workspace {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            user_facing_id: user_facing_id.to_string(),
            name: None,
            description: None,
            cloud_platform: CloudPlatform::Gcp,
            project_id: Some(format!("proj-{}", user_facing_id)),
        };
        self.workspaces.borrow_mut().push(workspace.clone());
        workspace
    }

    pub fn add_resource(
        &self,
        workspace: &Workspace,
        name: &str,
        stewardship: Stewardship,
        cloning_policy: CloningPolicy,
        kind: ResourceKind,
    ) -> Resource {
        let resource = Resource {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            stewardship,
            cloning_policy,
            kind,
        };
        self.resources
            .borrow_mut()
            .entry(workspace.id)
            .or_default()
            .push(resource.clone());
        resource
    }

    pub fn resources_of(&self, workspace_id: Uuid) -> Vec<Resource> {
        self.resources
            .borrow()
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn workspace(&self, id: Uuid) -> Option<Workspace> {
        self.workspaces.borrow().iter().find(|w| w.id == id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// The next `n` calls fail with 503
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.set(n);
    }

    pub fn reject_workspace_create(&self) {
        self.reject_workspace_create.set(true);
    }

    /// Creating a resource with this name fails
    pub fn reject_resource(&self, name: &str) {
        self.rejected_resources.borrow_mut().insert(name.to_string());
    }

    fn record(&self, call: String) -> RemoteResult<()> {
        self.calls.borrow_mut().push(call);
        let remaining = self.transient_failures.get();
        if remaining > 0 {
            self.transient_failures.set(remaining - 1);
            return Err(RemoteError::http(503, "service unavailable"));
        }
        Ok(())
    }

    fn create_resource(
        &self,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource> {
        if self.rejected_resources.borrow().contains(&request.name) {
            return Err(RemoteError::http(409, format!("cannot create {}", request.name)));
        }
        if self.workspace(workspace_id).is_none() {
            return Err(not_found("workspace"));
        }
        let resource = Resource {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            stewardship: request.stewardship,
            cloning_policy: request.cloning_policy,
            kind: request.kind.clone(),
        };
        self.resources
            .borrow_mut()
            .entry(workspace_id)
            .or_default()
            .push(resource.clone());
        Ok(resource)
    }

    fn remove_resource(&self, workspace_id: Uuid, resource: &Resource) -> RemoteResult<()> {
        let mut all = self.resources.borrow_mut();
        let list = all.entry(workspace_id).or_default();
        let before = list.len();
        list.retain(|r| r.id != resource.id);
        if list.len() == before {
            return Err(not_found("resource"));
        }
        Ok(())
    }
}

impl WorkspaceApi for FakeWorkspaceApi {
    fn create_workspace(&self, _token: &str, request: &CreateWorkspace) -> RemoteResult<Workspace> {
        self.record(format!("create_workspace {}", request.user_facing_id))?;
        if self.reject_workspace_create.get() {
            return Err(RemoteError::http(409, "workspace already exists"));
        }
        let mut workspace = self.add_workspace(&request.user_facing_id);
        workspace.name = request.name.clone();
        workspace.description = request.description.clone();
        workspace.cloud_platform = request.cloud_platform;
        let mut all = self.workspaces.borrow_mut();
        if let Some(stored) = all.iter_mut().find(|w| w.id == workspace.id) {
            *stored = workspace.clone();
        }
        Ok(workspace)
    }

    fn get_workspace(&self, _token: &str, id: Uuid) -> RemoteResult<Workspace> {
        self.record(format!("get_workspace {}", id))?;
        self.workspace(id).ok_or_else(|| not_found("workspace"))
    }

    fn get_workspace_by_user_facing_id(
        &self,
        _token: &str,
        user_facing_id: &str,
    ) -> RemoteResult<Workspace> {
        self.record(format!("get_workspace_by_user_facing_id {}", user_facing_id))?;
        self.workspaces
            .borrow()
            .iter()
            .find(|w| w.user_facing_id == user_facing_id)
            .cloned()
            .ok_or_else(|| not_found("workspace"))
    }

    fn list_workspaces(
        &self,
        _token: &str,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Workspace>> {
        self.record(format!("list_workspaces {}", offset))?;
        Ok(self
            .workspaces
            .borrow()
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_workspace(
        &self,
        _token: &str,
        id: Uuid,
        update: &WorkspaceUpdate,
    ) -> RemoteResult<Workspace> {
        self.record(format!("update_workspace {}", id))?;
        let mut all = self.workspaces.borrow_mut();
        let workspace = all
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| not_found("workspace"))?;
        if let Some(ufid) = &update.user_facing_id {
            workspace.user_facing_id = ufid.clone();
        }
        if let Some(name) = &update.name {
            workspace.name = Some(name.clone());
        }
        if let Some(description) = &update.description {
            workspace.description = Some(description.clone());
        }
        Ok(workspace.clone())
    }

    fn delete_workspace(&self, _token: &str, id: Uuid) -> RemoteResult<()> {
        self.record(format!("delete_workspace {}", id))?;
        let mut all = self.workspaces.borrow_mut();
        let before = all.len();
        all.retain(|w| w.id != id);
        if all.len() == before {
            return Err(not_found("workspace"));
        }
        self.resources.borrow_mut().remove(&id);
        Ok(())
    }

    fn list_resources(
        &self,
        _token: &str,
        workspace_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Resource>> {
        self.record(format!("list_resources {}", offset))?;
        Ok(self
            .resources_of(workspace_id)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn create_referenced(
        &self,
        _token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource> {
        self.record(format!("create_referenced {}", request.name))?;
        self.create_resource(workspace_id, request)
    }

    fn create_controlled(
        &self,
        _token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource> {
        self.record(format!("create_controlled {}", request.name))?;
        self.create_resource(workspace_id, request)
    }

    fn delete_referenced(
        &self,
        _token: &str,
        workspace_id: Uuid,
        resource: &Resource,
    ) -> RemoteResult<()> {
        self.record(format!("delete_referenced {}", resource.name))?;
        self.remove_resource(workspace_id, resource)
    }

    fn delete_controlled(
        &self,
        _token: &str,
        workspace_id: Uuid,
        resource: &Resource,
    ) -> RemoteResult<()> {
        self.record(format!("delete_controlled {}", resource.name))?;
        self.remove_resource(workspace_id, resource)
    }

    fn list_users(&self, _token: &str, workspace_id: Uuid) -> RemoteResult<Vec<RoleBinding>> {
        self.record(format!("list_users {}", workspace_id))?;
        Ok(self
            .bindings
            .borrow()
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    fn grant_role(
        &self,
        _token: &str,
        workspace_id: Uuid,
        role: IamRole,
        email: &str,
    ) -> RemoteResult<()> {
        self.record(format!("grant_role {} {}", role.as_str(), email))?;
        if !self.directory.borrow().contains(email) {
            return Err(RemoteError::http(400, format!("{} is not a registered user", email)));
        }
        let mut bindings = self.bindings.borrow_mut();
        let list = bindings.entry(workspace_id).or_default();
        match list.iter_mut().find(|b| b.role == role) {
            Some(binding) => binding.members.push(email.to_string()),
            None => list.push(RoleBinding {
                role,
                members: vec![email.to_string()],
            }),
        }
        Ok(())
    }

    fn remove_role(
        &self,
        _token: &str,
        workspace_id: Uuid,
        role: IamRole,
        email: &str,
    ) -> RemoteResult<()> {
        self.record(format!("remove_role {} {}", role.as_str(), email))?;
        let mut bindings = self.bindings.borrow_mut();
        let binding = bindings
            .get_mut(&workspace_id)
            .and_then(|list| list.iter_mut().find(|b| b.role == role))
            .filter(|b| b.members.iter().any(|m| m == email))
            .ok_or_else(|| not_found("role binding"))?;
        binding.members.retain(|m| m != email);
        Ok(())
    }
}

pub struct FakeIdentityApi {
    registered: Cell<bool>,
    registrations: Cell<u32>,
    impersonated_fetches: Cell<u32>,
    invites: RefCell<Vec<String>>,
    directory: Directory,
    /// Group name to (policy, email) entries
    groups: RefCell<BTreeMap<String, Vec<(GroupPolicy, String)>>>,
}

impl Default for FakeIdentityApi {
    fn default() -> Self {
        Self::with_directory(Directory::default())
    }
}

impl FakeIdentityApi {
    pub fn with_directory(directory: Directory) -> Self {
        Self {
            registered: Cell::new(false),
            registrations: Cell::new(0),
            impersonated_fetches: Cell::new(0),
            invites: RefCell::new(Vec::new()),
            directory,
            groups: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn registrations(&self) -> u32 {
        self.registrations.get()
    }

    pub fn impersonated_fetches(&self) -> u32 {
        self.impersonated_fetches.get()
    }

    pub fn invites(&self) -> Vec<String> {
        self.invites.borrow().clone()
    }

    fn user_info(&self) -> UserInfo {
        UserInfo {
            user_subject_id: "subject-1".to_string(),
            user_email: USER_EMAIL.to_string(),
            enabled: true,
        }
    }
}

impl IdentityApi for FakeIdentityApi {
    fn get_token_info(&self, _token: &str) -> RemoteResult<UserInfo> {
        if self.registered.get() {
            Ok(self.user_info())
        } else {
            Err(not_found("user"))
        }
    }

    fn register_user(&self, _token: &str) -> RemoteResult<UserInfo> {
        self.registered.set(true);
        self.registrations.set(self.registrations.get() + 1);
        self.directory.borrow_mut().insert(USER_EMAIL.to_string());
        Ok(self.user_info())
    }

    fn get_proxy_group_email(&self, _token: &str, _email: &str) -> RemoteResult<String> {
        Ok("PROXY_subject-1@example.org".to_string())
    }

    fn get_impersonated_credential(
        &self,
        _token: &str,
        project_id: &str,
    ) -> RemoteResult<ImpersonatedCredential> {
        let n = self.impersonated_fetches.get() + 1;
        self.impersonated_fetches.set(n);
        Ok(ImpersonatedCredential {
            email: format!("pet-subject-1@{}.iam.example.org", project_id),
            key: serde_json::json!({
                "type": "service_account",
                "project_id": project_id,
                "private_key_id": format!("key-{}", n),
            }),
            token: Credential::new(format!("pet-token-{}", n), Utc::now() + Duration::hours(1)),
        })
    }

    fn invite_user(&self, _token: &str, email: &str) -> RemoteResult<()> {
        self.invites.borrow_mut().push(email.to_string());
        self.directory.borrow_mut().insert(email.to_string());
        Ok(())
    }

    fn list_groups(&self, _token: &str) -> RemoteResult<Vec<Group>> {
        let groups = self.groups.borrow();
        Ok(groups
            .iter()
            .filter_map(|(name, entries)| {
                let mine: Vec<GroupPolicy> = entries
                    .iter()
                    .filter(|(_, email)| email == USER_EMAIL)
                    .map(|(policy, _)| *policy)
                    .collect();
                let role = if mine.contains(&GroupPolicy::Admin) {
                    GroupPolicy::Admin
                } else if mine.contains(&GroupPolicy::Member) {
                    GroupPolicy::Member
                } else {
                    return None;
                };
                Some(Group {
                    group_name: name.clone(),
                    group_email: group_email(name),
                    role,
                })
            })
            .collect())
    }

    fn create_group(&self, _token: &str, name: &str) -> RemoteResult<()> {
        let mut groups = self.groups.borrow_mut();
        if groups.contains_key(name) {
            return Err(RemoteError::http(409, format!("group {} already exists", name)));
        }
        groups.insert(
            name.to_string(),
            vec![(GroupPolicy::Admin, USER_EMAIL.to_string())],
        );
        Ok(())
    }

    fn delete_group(&self, _token: &str, name: &str) -> RemoteResult<()> {
        self.groups
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("group"))
    }

    fn get_group_email(&self, _token: &str, name: &str) -> RemoteResult<String> {
        if self.groups.borrow().contains_key(name) {
            Ok(group_email(name))
        } else {
            Err(not_found("group"))
        }
    }

    fn list_group_members(
        &self,
        _token: &str,
        name: &str,
        policy: GroupPolicy,
    ) -> RemoteResult<Vec<String>> {
        let groups = self.groups.borrow();
        let entries = groups.get(name).ok_or_else(|| not_found("group"))?;
        Ok(entries
            .iter()
            .filter(|(p, _)| *p == policy)
            .map(|(_, email)| email.clone())
            .collect())
    }

    fn add_group_member(
        &self,
        _token: &str,
        name: &str,
        policy: GroupPolicy,
        email: &str,
    ) -> RemoteResult<()> {
        let mut groups = self.groups.borrow_mut();
        let entries = groups.get_mut(name).ok_or_else(|| not_found("group"))?;
        if !entries.iter().any(|(p, e)| *p == policy && e == email) {
            entries.push((policy, email.to_string()));
        }
        Ok(())
    }

    fn remove_group_member(
        &self,
        _token: &str,
        name: &str,
        policy: GroupPolicy,
        email: &str,
    ) -> RemoteResult<()> {
        let mut groups = self.groups.borrow_mut();
        let entries = groups.get_mut(name).ok_or_else(|| not_found("group"))?;
        let before = entries.len();
        entries.retain(|(p, e)| !(*p == policy && e == email));
        if entries.len() == before {
            return Err(not_found("group member"));
        }
        Ok(())
    }
}

fn group_email(name: &str) -> String {
    format!("{}@groups.example.org", name)
}

/// Grants read access to resources by name
#[derive(Default)]
pub struct FakeCloudApi {
    readable: RefCell<HashSet<String>>,
}

impl FakeCloudApi {
    pub fn allow(&self, resource_name: &str) {
        self.readable.borrow_mut().insert(resource_name.to_string());
    }
}

impl CloudApi for FakeCloudApi {
    fn can_read(&self, _token: &str, resource: &Resource) -> RemoteResult<bool> {
        Ok(self.readable.borrow().contains(&resource.name))
    }
}

#[derive(Default)]
pub struct FakeRefresher {
    refreshes: Cell<u32>,
    reject: bool,
}

impl FakeRefresher {
    pub fn rejecting() -> Self {
        Self {
            refreshes: Cell::new(0),
            reject: true,
        }
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.get()
    }
}

impl TokenRefresher for FakeRefresher {
    fn refresh(&self, _refresh_token: &str) -> RemoteResult<Credential> {
        let n = self.refreshes.get() + 1;
        self.refreshes.set(n);
        if self.reject {
            return Err(RemoteError::http(400, "invalid_grant"));
        }
        Ok(Credential::new(format!("refreshed-{}", n), Utc::now() + Duration::hours(1)))
    }
}

/// One set of fakes sharing a user directory
pub struct Fakes {
    pub workspace: Rc<FakeWorkspaceApi>,
    pub identity: Rc<FakeIdentityApi>,
    pub cloud: Rc<FakeCloudApi>,
    pub refresher: Rc<FakeRefresher>,
}

impl Fakes {
    pub fn new() -> Self {
        let directory = Directory::default();
        Self {
            workspace: Rc::new(FakeWorkspaceApi::with_directory(directory.clone())),
            identity: Rc::new(FakeIdentityApi::with_directory(directory)),
            cloud: Rc::new(FakeCloudApi::default()),
            refresher: Rc::new(FakeRefresher::default()),
        }
    }

    pub fn services(&self) -> crate::session::Services {
        crate::session::Services {
            workspace: self.workspace.clone(),
            identity: self.identity.clone(),
            cloud: self.cloud.clone(),
            refresher: self.refresher.clone(),
        }
    }
}
