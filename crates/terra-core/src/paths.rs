//! Standard paths used by the Terra CLI

use std::path::{Path, PathBuf};

/// Environment variable that relocates the whole context directory
pub const CONTEXT_DIR_ENV: &str = "TERRA_CONTEXT_DIR";

const CONTEXT_FILENAME: &str = "context.json";
const CONFIG_FILENAME: &str = "config.yaml";
const CREDENTIALS_DIRNAME: &str = "credentials";
const SERVERS_DIRNAME: &str = "servers";

/// Standard Terra paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Context directory (~/.terra)
    pub root: PathBuf,
    /// Per-identity credential material (~/.terra/credentials)
    pub credentials: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        if let Some(dir) = std::env::var_os(CONTEXT_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self::at(Path::new(&dir));
        }

        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".terra");
        Self::at(&root)
    }

    /// Paths rooted at an explicit context directory
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            credentials: root.join(CREDENTIALS_DIRNAME),
        }
    }

    /// The persisted context (server, identity key, current workspace)
    pub fn context_file(&self) -> PathBuf {
        self.root.join(CONTEXT_FILENAME)
    }

    /// The CLI configuration file
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    /// User-defined server definitions, one JSON file per server
    pub fn servers_dir(&self) -> PathBuf {
        self.root.join(SERVERS_DIRNAME)
    }

    /// Directory holding everything that belongs to one identity
    pub fn identity_dir(&self, identity_key: &str) -> PathBuf {
        self.credentials.join(identity_key)
    }

    pub fn identity_file(&self, identity_key: &str) -> PathBuf {
        self.identity_dir(identity_key).join("identity.json")
    }

    pub fn user_credential_file(&self, identity_key: &str) -> PathBuf {
        self.identity_dir(identity_key).join("user.json")
    }

    /// Impersonated-identity key material, one file per (identity, workspace)
    pub fn impersonated_key_file(&self, identity_key: &str, workspace_id: &str) -> PathBuf {
        self.identity_dir(identity_key)
            .join(format!("{}.json", workspace_id))
    }
}
