//! Workspace duplication
//!
//! Source resources are listed first, then the destination workspace is
//! created, then each resource is handled on its own according to its cloning
//! policy. A failure while handling one resource is recorded in its outcome
//! and does not stop the others.

use serde::Serialize;
use terra_core::{Result, TerraError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{CreateWorkspace, Workspace};
use crate::registry::ResourceRegistry;
use crate::resource::{CloningPolicy, Resource, ResourceKind, ResourceRequest, Stewardship};
use crate::workspace::WorkspaceManager;

/// Bucket names are limited to 63 characters
const MAX_BUCKET_NAME: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloneResult {
    Succeeded,
    Skipped,
    Failed,
}

/// What happened to one source resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub source: Resource,
    pub destination: Option<Resource>,
    pub result: CloneResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CloneOutcome {
    fn skipped(source: Resource) -> Self {
        Self {
            source,
            destination: None,
            result: CloneResult::Skipped,
            error: None,
        }
    }
}

/// Properties of the destination workspace
#[derive(Debug, Clone, Default)]
pub struct DuplicateRequest {
    pub user_facing_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatedWorkspace {
    pub source: Workspace,
    pub destination: Workspace,
    pub resources: Vec<CloneOutcome>,
}

impl DuplicatedWorkspace {
    pub fn count(&self, result: CloneResult) -> usize {
        self.resources.iter().filter(|o| o.result == result).count()
    }
}

pub struct CloneOrchestrator<'a> {
    registry: &'a ResourceRegistry<'a>,
    workspaces: &'a WorkspaceManager<'a>,
}

impl<'a> CloneOrchestrator<'a> {
    pub fn new(registry: &'a ResourceRegistry<'a>, workspaces: &'a WorkspaceManager<'a>) -> Self {
        Self {
            registry,
            workspaces,
        }
    }

    pub fn duplicate(
        &self,
        source: &Workspace,
        request: &DuplicateRequest,
    ) -> Result<DuplicatedWorkspace> {
        let resources = self.registry.list(source)?;

        let destination = self.workspaces.create(&CreateWorkspace {
            user_facing_id: request.user_facing_id.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            cloud_platform: source.cloud_platform,
        })?;

        let outcomes: Vec<CloneOutcome> = resources
            .into_iter()
            .map(|resource| self.clone_resource(&destination, resource))
            .collect();

        let duplicated = DuplicatedWorkspace {
            source: source.clone(),
            destination,
            resources: outcomes,
        };
        info!(
            source = %duplicated.source.user_facing_id,
            destination = %duplicated.destination.user_facing_id,
            succeeded = duplicated.count(CloneResult::Succeeded),
            skipped = duplicated.count(CloneResult::Skipped),
            failed = duplicated.count(CloneResult::Failed),
            "Duplicated workspace"
        );
        Ok(duplicated)
    }

    fn clone_resource(&self, destination: &Workspace, source: Resource) -> CloneOutcome {
        let created = match source.cloning_policy {
            CloningPolicy::CopyNothing => return CloneOutcome::skipped(source),
            CloningPolicy::CopyReference | CloningPolicy::Reference => {
                self.copy_reference(destination, &source)
            }
            CloningPolicy::CopyResource => self.copy_resource(destination, &source),
        };

        match created {
            Ok(resource) => CloneOutcome {
                source,
                destination: Some(resource),
                result: CloneResult::Succeeded,
                error: None,
            },
            Err(e) => {
                warn!(resource = %source.name, error = %e, "Failed to clone resource");
                CloneOutcome {
                    source,
                    destination: None,
                    result: CloneResult::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// A referenced resource pointing at the same cloud object
    fn copy_reference(&self, destination: &Workspace, source: &Resource) -> Result<Resource> {
        let request = ResourceRequest {
            name: source.name.clone(),
            description: source.description.clone(),
            stewardship: Stewardship::Referenced,
            cloning_policy: source.cloning_policy,
            kind: source.kind.clone(),
        };
        self.registry.submit(destination, &request)
    }

    /// A new cloud object owned by the destination workspace
    fn copy_resource(&self, destination: &Workspace, source: &Resource) -> Result<Resource> {
        if !source.is_controlled() {
            return Err(TerraError::InvalidInput(format!(
                "{} is a referenced resource and cannot be copied",
                source.name
            )));
        }
        let kind = match &source.kind {
            ResourceKind::GcsBucket { bucket_name } => ResourceKind::GcsBucket {
                bucket_name: fresh_bucket_name(bucket_name),
            },
            ResourceKind::BqDataset { dataset_id, .. } => ResourceKind::BqDataset {
                project_id: destination.required_project_id()?.to_string(),
                dataset_id: dataset_id.clone(),
            },
            other => {
                return Err(TerraError::InvalidInput(format!(
                    "{} resources cannot be copied",
                    other.type_name()
                )))
            }
        };
        let request = ResourceRequest {
            name: source.name.clone(),
            description: source.description.clone(),
            stewardship: Stewardship::Controlled,
            cloning_policy: source.cloning_policy,
            kind,
        };
        self.registry.submit(destination, &request)
    }
}

/// Source bucket name plus a random suffix, kept within the length limit
fn fresh_bucket_name(source: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];
    let max_base = MAX_BUCKET_NAME - suffix.len() - 1;
    let base: String = source.to_lowercase().chars().take(max_base).collect();
    format!("{}-{}", base.trim_end_matches('-'), suffix)
}
