//! Environment for launched tools
//!
//! Every resource is exported as `TERRA_<NAME>`, plus the cloud project and
//! the location of the impersonated identity's key file. Collisions with
//! caller-supplied variables are detected before anything is launched.

use std::collections::BTreeMap;

use terra_core::{Result, TerraError};
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::model::{Identity, Workspace};
use crate::registry::ResourceRegistry;
use crate::resource::Resource;

pub type EnvMap = BTreeMap<String, String>;

pub const GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Merge derived variables into `extra`. Any derived key already present in
/// `extra`, or derived twice, is a collision and nothing is merged.
pub fn assemble(resources: &[Resource], platform: &EnvMap, extra: &EnvMap) -> Result<EnvMap> {
    let mut derived = EnvMap::new();
    for resource in resources {
        let key = resource.env_key();
        if derived.insert(key.clone(), resource.resolve()).is_some() {
            return Err(TerraError::EnvironmentCollision(key));
        }
    }
    for (key, value) in platform {
        if derived.insert(key.clone(), value.clone()).is_some() {
            return Err(TerraError::EnvironmentCollision(key.clone()));
        }
    }
    if let Some(key) = derived.keys().find(|k| extra.contains_key(*k)) {
        return Err(TerraError::EnvironmentCollision(key.clone()));
    }

    let mut env = extra.clone();
    env.extend(derived);
    Ok(env)
}

pub struct CommandEnvironmentBuilder<'a> {
    registry: &'a ResourceRegistry<'a>,
    credentials: &'a mut CredentialStore,
}

impl<'a> CommandEnvironmentBuilder<'a> {
    pub fn new(registry: &'a ResourceRegistry<'a>, credentials: &'a mut CredentialStore) -> Self {
        Self {
            registry,
            credentials,
        }
    }

    pub fn build(
        &mut self,
        workspace: &Workspace,
        identity: &Identity,
        extra: &EnvMap,
    ) -> Result<EnvMap> {
        let resources = self.registry.list(workspace)?;

        // Fail on collisions before fetching any credential
        let placeholders: EnvMap = [GOOGLE_CLOUD_PROJECT, GOOGLE_APPLICATION_CREDENTIALS]
            .into_iter()
            .map(|k| (k.to_string(), String::new()))
            .collect();
        assemble(&resources, &placeholders, extra)?;

        let project_id = workspace.required_project_id()?.to_string();
        let key_file = self.credentials.impersonated_key_file(identity, workspace)?;

        let mut platform = EnvMap::new();
        platform.insert(GOOGLE_CLOUD_PROJECT.to_string(), project_id);
        platform.insert(
            GOOGLE_APPLICATION_CREDENTIALS.to_string(),
            key_file.display().to_string(),
        );

        let env = assemble(&resources, &platform, extra)?;
        debug!(
            workspace = %workspace.user_facing_id,
            resources = resources.len(),
            "Built command environment"
        );
        Ok(env)
    }
}
