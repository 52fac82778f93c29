//! Identity-service groups
//!
//! Groups are managed by the identity service and can be granted roles like
//! any user. Their members inherit whatever the group holds.

use std::sync::OnceLock;

use regex::Regex;
use terra_core::{Result, TerraError};
use tracing::info;

use crate::model::{Group, GroupPolicy};
use crate::retry::RetryingClient;
use crate::service::IdentityApi;

fn group_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{1,60}$").expect("group name regex must compile")
    })
}

pub fn validate_group_name(name: &str) -> Result<()> {
    if group_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(TerraError::InvalidInput(format!(
            "Invalid group name '{}': use up to 60 letters, numbers, dashes or underscores",
            name
        )))
    }
}

/// A group together with its email address
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDescription {
    pub name: String,
    pub email: String,
}

pub struct GroupManager<'a> {
    api: &'a dyn IdentityApi,
    retry: &'a RetryingClient,
    token: &'a str,
}

impl<'a> GroupManager<'a> {
    pub fn new(api: &'a dyn IdentityApi, retry: &'a RetryingClient, token: &'a str) -> Self {
        Self { api, retry, token }
    }

    pub fn list(&self) -> Result<Vec<Group>> {
        self.retry.call("Groups", || self.api.list_groups(self.token))
    }

    /// Create a group; the caller becomes its admin
    pub fn create(&self, name: &str) -> Result<GroupDescription> {
        validate_group_name(name)?;
        let what = format!("Group {}", name);
        self.retry
            .call(&what, || self.api.create_group(self.token, name))?;
        info!(group = name, "Created group");
        self.describe(name)
    }

    pub fn describe(&self, name: &str) -> Result<GroupDescription> {
        let what = format!("Group {}", name);
        let email = self
            .retry
            .call(&what, || self.api.get_group_email(self.token, name))?;
        Ok(GroupDescription {
            name: name.to_string(),
            email,
        })
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let what = format!("Group {}", name);
        self.retry
            .call(&what, || self.api.delete_group(self.token, name))?;
        info!(group = name, "Deleted group");
        Ok(())
    }

    pub fn list_members(&self, name: &str, policy: GroupPolicy) -> Result<Vec<String>> {
        let what = format!("Group {}", name);
        self.retry.call(&what, || {
            self.api.list_group_members(self.token, name, policy)
        })
    }

    pub fn add_member(&self, name: &str, policy: GroupPolicy, email: &str) -> Result<()> {
        let what = format!("Group {}", name);
        self.retry.call(&what, || {
            self.api.add_group_member(self.token, name, policy, email)
        })?;
        info!(group = name, email, policy = policy.as_str(), "Added group member");
        Ok(())
    }

    pub fn remove_member(&self, name: &str, policy: GroupPolicy, email: &str) -> Result<()> {
        let what = format!("{} {} of group {}", policy.as_str(), email, name);
        self.retry.call(&what, || {
            self.api.remove_group_member(self.token, name, policy, email)
        })?;
        info!(group = name, email, policy = policy.as_str(), "Removed group member");
        Ok(())
    }
}
