//! Typed view over a workspace's resources
//!
//! The registry borrows its collaborators for the duration of one command and
//! only ever observes the workspace snapshot it is handed.

use terra_core::{Result, TerraError};
use tracing::{debug, info};

use crate::model::Workspace;
use crate::resource::{Resource, ResourceKind, ResourceRequest, Stewardship};
use crate::retry::RetryingClient;
use crate::service::{CloudApi, WorkspaceApi};

/// Resources requested per list call
pub const PAGE_SIZE: usize = 100;

pub struct ResourceRegistry<'a> {
    api: &'a dyn WorkspaceApi,
    cloud: &'a dyn CloudApi,
    retry: &'a RetryingClient,
    token: &'a str,
    limit: usize,
}

impl<'a> ResourceRegistry<'a> {
    pub fn new(
        api: &'a dyn WorkspaceApi,
        cloud: &'a dyn CloudApi,
        retry: &'a RetryingClient,
        token: &'a str,
        limit: usize,
    ) -> Self {
        Self {
            api,
            cloud,
            retry,
            token,
            limit,
        }
    }

    /// All resources in the workspace. Fails rather than truncating when the
    /// workspace holds more than the configured limit.
    pub fn list(&self, workspace: &Workspace) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.retry.call("list resources", || {
                self.api
                    .list_resources(self.token, workspace.id, offset, PAGE_SIZE)
            })?;
            let fetched = page.len();
            resources.extend(page);

            if resources.len() > self.limit {
                return Err(TerraError::ResourceLimitExceeded {
                    total: resources.len(),
                    limit: self.limit,
                });
            }
            if fetched < PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        debug!(workspace = %workspace.user_facing_id, count = resources.len(), "Listed resources");
        Ok(resources)
    }

    pub fn describe(&self, workspace: &Workspace, name: &str) -> Result<Resource> {
        self.list(workspace)?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| TerraError::NotFound(format!("Resource {}", name)))
    }

    pub fn resolve(&self, resource: &Resource) -> String {
        resource.resolve()
    }

    /// Whether `cloud_token` can read the object behind a referenced
    /// resource. Unreadable objects are reported as access denied.
    pub fn check_access(&self, resource: &Resource, cloud_token: &str) -> Result<bool> {
        if resource.stewardship != Stewardship::Referenced {
            return Err(TerraError::WrongStewardshipType {
                name: resource.name.clone(),
                actual: resource.stewardship.to_string(),
                expected: Stewardship::Referenced.to_string(),
            });
        }
        if let ResourceKind::AiNotebook { .. } = resource.kind {
            return Err(TerraError::UserActionable(format!(
                "Checking access is not supported for {} resources",
                resource.kind.type_name()
            )));
        }

        let what = format!("Resource {}", resource.name);
        let readable = self
            .retry
            .call(&what, || self.cloud.can_read(cloud_token, resource))?;
        if !readable {
            return Err(TerraError::AccessDenied(format!(
                "cannot read {} ({})",
                resource.name,
                resource.resolve()
            )));
        }
        Ok(true)
    }

    /// Controlled resources deprovision their cloud object; referenced ones
    /// only drop the link. Deleting a missing resource is `NotFound`.
    pub fn delete(&self, workspace: &Workspace, resource: &Resource) -> Result<()> {
        let what = format!("Resource {}", resource.name);
        match resource.stewardship {
            Stewardship::Controlled => self.retry.call(&what, || {
                self.api
                    .delete_controlled(self.token, workspace.id, resource)
            })?,
            Stewardship::Referenced => self.retry.call(&what, || {
                self.api
                    .delete_referenced(self.token, workspace.id, resource)
            })?,
        }
        info!(
            workspace = %workspace.user_facing_id,
            resource = %resource.name,
            stewardship = %resource.stewardship,
            "Deleted resource"
        );
        Ok(())
    }

    /// Link an existing cloud object into the workspace
    pub fn add_referenced(
        &self,
        workspace: &Workspace,
        request: &ResourceRequest,
    ) -> Result<Resource> {
        self.create_checked(workspace, request, Stewardship::Referenced)
    }

    /// Provision a new cloud object owned by the workspace
    pub fn create_controlled(
        &self,
        workspace: &Workspace,
        request: &ResourceRequest,
    ) -> Result<Resource> {
        self.create_checked(workspace, request, Stewardship::Controlled)
    }

    fn create_checked(
        &self,
        workspace: &Workspace,
        request: &ResourceRequest,
        stewardship: Stewardship,
    ) -> Result<Resource> {
        if request.stewardship != stewardship {
            return Err(TerraError::InvalidInput(format!(
                "Expected a {} resource request, got {}",
                stewardship, request.stewardship
            )));
        }
        request.validate()?;

        let key = crate::resource::env_key(&request.name);
        if let Some(existing) = self
            .list(workspace)?
            .into_iter()
            .find(|r| r.env_key() == key)
        {
            return Err(TerraError::InvalidInput(format!(
                "Resource name {} conflicts with existing resource {}",
                request.name, existing.name
            )));
        }
        self.submit(workspace, request)
    }

    /// Create without the uniqueness check, for freshly created workspaces
    pub(crate) fn submit(
        &self,
        workspace: &Workspace,
        request: &ResourceRequest,
    ) -> Result<Resource> {
        request.validate()?;
        let what = format!("Resource {}", request.name);
        let resource = match request.stewardship {
            Stewardship::Controlled => self.retry.call(&what, || {
                self.api
                    .create_controlled(self.token, workspace.id, request)
            })?,
            Stewardship::Referenced => self.retry.call(&what, || {
                self.api
                    .create_referenced(self.token, workspace.id, request)
            })?,
        };
        info!(
            workspace = %workspace.user_facing_id,
            resource = %resource.name,
            kind = resource.kind.type_name(),
            "Created resource"
        );
        Ok(resource)
    }
}
