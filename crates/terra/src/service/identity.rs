//! HTTP client for the identity service

use serde::Deserialize;
use serde_json::json;

use super::http::HttpTransport;
use super::{IdentityApi, RemoteResult};
use crate::model::{Group, GroupPolicy, ImpersonatedCredential, UserInfo};

const GROUPS: [&str; 3] = ["api", "groups", "v1"];

#[derive(Debug, Deserialize)]
struct RegistrationStatus {
    #[serde(rename = "userInfo")]
    user_info: UserInfo,
}

pub struct HttpIdentityApi {
    http: HttpTransport,
}

impl HttpIdentityApi {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

/// `api/groups/v1` followed by `rest`
fn group_path<'a>(rest: &[&'a str]) -> Vec<&'a str> {
    GROUPS.iter().copied().chain(rest.iter().copied()).collect()
}

impl IdentityApi for HttpIdentityApi {
    fn get_token_info(&self, token: &str) -> RemoteResult<UserInfo> {
        self.http
            .get(token, &["register", "user", "v2", "self", "info"])
    }

    fn register_user(&self, token: &str) -> RemoteResult<UserInfo> {
        let status: RegistrationStatus = self
            .http
            .post(token, &["register", "user", "v2", "self"], &json!({}))?;
        Ok(status.user_info)
    }

    fn get_proxy_group_email(&self, token: &str, email: &str) -> RemoteResult<String> {
        self.http
            .get(token, &["api", "google", "v1", "user", "proxyGroup", email])
    }

    fn get_impersonated_credential(
        &self,
        token: &str,
        project_id: &str,
    ) -> RemoteResult<ImpersonatedCredential> {
        self.http.get(
            token,
            &["api", "google", "v1", "user", "petServiceAccount", project_id, "key"],
        )
    }

    fn invite_user(&self, token: &str, email: &str) -> RemoteResult<()> {
        self.http
            .post_empty(token, &["api", "users", "v1", "invite", email], &json!({}))
    }

    fn list_groups(&self, token: &str) -> RemoteResult<Vec<Group>> {
        self.http.get(token, &GROUPS)
    }

    fn create_group(&self, token: &str, name: &str) -> RemoteResult<()> {
        self.http.post_empty(token, &group_path(&[name]), &json!({}))
    }

    fn delete_group(&self, token: &str, name: &str) -> RemoteResult<()> {
        self.http.delete(token, &group_path(&[name]))
    }

    fn get_group_email(&self, token: &str, name: &str) -> RemoteResult<String> {
        self.http.get(token, &group_path(&[name]))
    }

    fn list_group_members(
        &self,
        token: &str,
        name: &str,
        policy: GroupPolicy,
    ) -> RemoteResult<Vec<String>> {
        self.http.get(token, &group_path(&[name, policy.as_str()]))
    }

    fn add_group_member(
        &self,
        token: &str,
        name: &str,
        policy: GroupPolicy,
        email: &str,
    ) -> RemoteResult<()> {
        self.http
            .put_empty(token, &group_path(&[name, policy.as_str(), email]))
    }

    fn remove_group_member(
        &self,
        token: &str,
        name: &str,
        policy: GroupPolicy,
        email: &str,
    ) -> RemoteResult<()> {
        self.http
            .delete(token, &group_path(&[name, policy.as_str(), email]))
    }
}
