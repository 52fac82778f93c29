//! Server catalog
//!
//! A server is one deployment of the workspace and identity services. The
//! catalog holds the built-in deployments plus any user-defined ones found as
//! `servers/<name>.json` in the context directory. A user-defined file with a
//! built-in name replaces the built-in entry.

use std::collections::BTreeMap;
use std::fs;

use terra_core::files::read_json;
use terra_core::{Paths, Result, TerraError};
use tracing::{debug, warn};

use crate::model::Server;

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn broad(env: &str, description: &str) -> Server {
    Server {
        name: format!("broad-{}", env),
        description: description.to_string(),
        workspace_manager_uri: format!("https://workspace.dsde-{}.broadinstitute.org", env),
        identity_uri: format!("https://sam.dsde-{}.broadinstitute.org", env),
        oauth_token_uri: GOOGLE_TOKEN_URI.to_string(),
        oauth_client_id: String::new(),
        oauth_client_secret: None,
    }
}

/// Deployments known without any configuration
pub fn builtin() -> Vec<Server> {
    vec![
        Server::default(),
        broad("alpha", "Terra alpha deployment"),
        broad("staging", "Terra staging deployment"),
    ]
}

pub struct ServerCatalog {
    servers: BTreeMap<String, Server>,
}

impl ServerCatalog {
    /// Built-in servers overlaid with the definitions under `paths.servers_dir()`.
    /// Unreadable files are skipped with a warning.
    pub fn load(paths: &Paths) -> Result<Self> {
        let mut servers: BTreeMap<String, Server> = builtin()
            .into_iter()
            .map(|server| (server.name.clone(), server))
            .collect();

        let dir = paths.servers_dir();
        if !dir.exists() {
            return Ok(Self { servers });
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Server>(&path) {
                Ok(Some(server)) => {
                    debug!(server = %server.name, path = %path.display(), "Loaded server");
                    servers.insert(server.name.clone(), server);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping server file"),
            }
        }
        Ok(Self { servers })
    }

    /// All servers, ordered by name
    pub fn list(&self) -> Vec<&Server> {
        self.servers.values().collect()
    }

    pub fn find(&self, name: &str) -> Result<Server> {
        self.servers.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.servers.keys().map(String::as_str).collect();
            TerraError::InvalidInput(format!(
                "Unknown server '{}'. Available: {}",
                name,
                known.join(", ")
            ))
        })
    }
}

/// OAuth client settings given alongside `server set`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl OAuthClient {
    /// Apply to `server`, keeping fields that were not given
    pub fn apply(&self, server: &mut Server) {
        if let Some(id) = &self.client_id {
            server.oauth_client_id = id.clone();
        }
        if let Some(secret) = &self.client_secret {
            server.oauth_client_secret = Some(secret.clone());
        }
    }
}
