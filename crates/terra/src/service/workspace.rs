//! HTTP client for the workspace service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::http::HttpTransport;
use super::{RemoteResult, WorkspaceApi};
use crate::model::{CreateWorkspace, IamRole, RoleBinding, Workspace, WorkspaceUpdate};
use crate::resource::{Resource, ResourceRequest};

const BASE: [&str; 3] = ["api", "workspaces", "v1"];

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceList {
    #[serde(default)]
    workspaces: Vec<Workspace>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantRoleBody<'a> {
    member_email: &'a str,
}

pub struct HttpWorkspaceApi {
    http: HttpTransport,
}

impl HttpWorkspaceApi {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

/// `api/workspaces/v1` followed by `rest`
fn path<'a>(rest: &[&'a str]) -> Vec<&'a str> {
    BASE.iter().copied().chain(rest.iter().copied()).collect()
}

fn page(offset: usize, limit: usize) -> [(&'static str, usize); 2] {
    [("offset", offset), ("limit", limit)]
}

impl WorkspaceApi for HttpWorkspaceApi {
    fn create_workspace(&self, token: &str, request: &CreateWorkspace) -> RemoteResult<Workspace> {
        self.http.post(token, &BASE, request)
    }

    fn get_workspace(&self, token: &str, id: Uuid) -> RemoteResult<Workspace> {
        let id = id.to_string();
        self.http.get(token, &path(&[&id]))
    }

    fn get_workspace_by_user_facing_id(
        &self,
        token: &str,
        user_facing_id: &str,
    ) -> RemoteResult<Workspace> {
        self.http
            .get(token, &path(&["workspaceByUserFacingId", user_facing_id]))
    }

    fn list_workspaces(
        &self,
        token: &str,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Workspace>> {
        let list: WorkspaceList = self.http.get_query(token, &BASE, &page(offset, limit))?;
        Ok(list.workspaces)
    }

    fn update_workspace(
        &self,
        token: &str,
        id: Uuid,
        update: &WorkspaceUpdate,
    ) -> RemoteResult<Workspace> {
        let id = id.to_string();
        self.http.patch(token, &path(&[&id]), update)
    }

    fn delete_workspace(&self, token: &str, id: Uuid) -> RemoteResult<()> {
        let id = id.to_string();
        self.http.delete(token, &path(&[&id]))
    }

    fn list_resources(
        &self,
        token: &str,
        workspace_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> RemoteResult<Vec<Resource>> {
        let id = workspace_id.to_string();
        let list: ResourceList = self
            .http
            .get_query(token, &path(&[&id, "resources"]), &page(offset, limit))?;
        Ok(list.resources)
    }

    fn create_referenced(
        &self,
        token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource> {
        let id = workspace_id.to_string();
        self.http
            .post(token, &path(&[&id, "resources", "referenced"]), request)
    }

    fn create_controlled(
        &self,
        token: &str,
        workspace_id: Uuid,
        request: &ResourceRequest,
    ) -> RemoteResult<Resource> {
        let id = workspace_id.to_string();
        self.http
            .post(token, &path(&[&id, "resources", "controlled"]), request)
    }

    fn delete_referenced(
        &self,
        token: &str,
        workspace_id: Uuid,
        resource: &Resource,
    ) -> RemoteResult<()> {
        let (id, resource_id) = (workspace_id.to_string(), resource.id.to_string());
        self.http.delete(
            token,
            &path(&[&id, "resources", "referenced", &resource_id]),
        )
    }

    fn delete_controlled(
        &self,
        token: &str,
        workspace_id: Uuid,
        resource: &Resource,
    ) -> RemoteResult<()> {
        let (id, resource_id) = (workspace_id.to_string(), resource.id.to_string());
        self.http.delete(
            token,
            &path(&[&id, "resources", "controlled", &resource_id]),
        )
    }

    fn list_users(&self, token: &str, workspace_id: Uuid) -> RemoteResult<Vec<RoleBinding>> {
        let id = workspace_id.to_string();
        self.http.get(token, &path(&[&id, "roles"]))
    }

    fn grant_role(
        &self,
        token: &str,
        workspace_id: Uuid,
        role: IamRole,
        email: &str,
    ) -> RemoteResult<()> {
        let id = workspace_id.to_string();
        self.http.post_empty(
            token,
            &path(&[&id, "roles", role.as_str(), "members"]),
            &GrantRoleBody { member_email: email },
        )
    }

    fn remove_role(
        &self,
        token: &str,
        workspace_id: Uuid,
        role: IamRole,
        email: &str,
    ) -> RemoteResult<()> {
        let id = workspace_id.to_string();
        self.http
            .delete(token, &path(&[&id, "roles", role.as_str(), "members", email]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_rooted_and_encoded() {
        assert_eq!(path(&[]), vec!["api", "workspaces", "v1"]);

        let http = HttpTransport::new(
            "https://workspace.example.org",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let url = http.url(&path(&["workspaceByUserFacingId", "my ws/1"]));
        assert_eq!(
            url.path(),
            "/api/workspaces/v1/workspaceByUserFacingId/my%20ws%2F1"
        );
    }
}
