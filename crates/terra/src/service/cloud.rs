//! Read-access checks against the cloud providers behind referenced resources

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;
use which::which_in;

use super::http::HttpTransport;
use super::{CloudApi, RemoteResult};
use crate::resource::{Resource, ResourceKind};
use crate::retry::RemoteError;

pub const STORAGE_URL: &str = "https://storage.googleapis.com";
pub const BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

/// stderr fragments git prints when the remote refuses the caller
const GIT_DENIED: &[&str] = &[
    "authentication failed",
    "permission denied",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "repository not found",
    "access denied",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
];

pub struct HttpCloudApi {
    storage: HttpTransport,
    bigquery: HttpTransport,
}

impl HttpCloudApi {
    pub fn new(storage: HttpTransport, bigquery: HttpTransport) -> Self {
        Self { storage, bigquery }
    }

    fn can_get(&self, http: &HttpTransport, token: &str, segments: &[&str]) -> RemoteResult<bool> {
        let query: [(&str, &str); 0] = [];
        let status = http.get_status(token, segments, &query)?;
        readable_status(status, &segments.join("/"))
    }
}

/// 2xx is readable, 401/403 is refused; anything else is an error
fn readable_status(status: u16, path: &str) -> RemoteResult<bool> {
    match status {
        200..=299 => Ok(true),
        401 | 403 => Ok(false),
        status => Err(RemoteError::http(status, format!("GET {}", path))),
    }
}

impl CloudApi for HttpCloudApi {
    fn can_read(&self, token: &str, resource: &Resource) -> RemoteResult<bool> {
        match &resource.kind {
            ResourceKind::GcsBucket { bucket_name } => {
                let segments = ["storage", "v1", "b", bucket_name.as_str(), "o"];
                let status = self
                    .storage
                    .get_status(token, &segments, &[("maxResults", "1")])?;
                readable_status(status, &segments.join("/"))
            }
            ResourceKind::GcsObject {
                bucket_name,
                object_name,
            } => self.can_get(
                &self.storage,
                token,
                &["storage", "v1", "b", bucket_name.as_str(), "o", object_name.as_str()],
            ),
            ResourceKind::BqDataset {
                project_id,
                dataset_id,
            } => self.can_get(
                &self.bigquery,
                token,
                &[
                    "bigquery",
                    "v2",
                    "projects",
                    project_id.as_str(),
                    "datasets",
                    dataset_id.as_str(),
                ],
            ),
            ResourceKind::BqTable {
                project_id,
                dataset_id,
                table_id,
            } => self.can_get(
                &self.bigquery,
                token,
                &[
                    "bigquery",
                    "v2",
                    "projects",
                    project_id.as_str(),
                    "datasets",
                    dataset_id.as_str(),
                    "tables",
                    table_id.as_str(),
                ],
            ),
            ResourceKind::GitRepo { git_repo_url } => {
                git_ls_remote(&find_git(std::env::var_os("PATH"))?, git_repo_url)
            }
            ResourceKind::AiNotebook { .. } => Err(RemoteError::local(
                "Access checks are not supported for AI notebooks",
            )),
        }
    }
}

/// Locate `git` on `search_path`
fn find_git(search_path: Option<OsString>) -> RemoteResult<PathBuf> {
    which_in("git", search_path, ".").map_err(|_| {
        RemoteError::local("git not found on PATH; install git to check access to git repositories")
    })
}

/// A repository is readable when `git ls-remote` lists it without prompting.
/// An empty repository lists nothing and still counts as readable.
fn git_ls_remote(git: &Path, url: &str) -> RemoteResult<bool> {
    debug!(url, "git ls-remote");
    let output = Command::new(git)
        .args(["ls-remote", "--", url])
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| RemoteError::local(format!("Failed to run git: {}", e)))?;
    classify_ls_remote(output.status.code(), &String::from_utf8_lossy(&output.stderr))
}

fn classify_ls_remote(code: Option<i32>, stderr: &str) -> RemoteResult<bool> {
    if code == Some(0) {
        return Ok(true);
    }
    let lowered = stderr.to_lowercase();
    if GIT_DENIED.iter().any(|marker| lowered.contains(marker)) {
        return Ok(false);
    }
    let message = stderr.trim();
    Err(RemoteError::transport(if message.is_empty() {
        format!("git ls-remote exited with {:?}", code)
    } else {
        message.to_string()
    }))
}
