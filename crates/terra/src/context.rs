//! Persisted local context
//!
//! `context.json` records the selected server, the logged-in identity key and
//! the current workspace. Identity records live beside it under
//! `credentials/<key>/identity.json`. There is no cross-process locking; the
//! last save wins, and every save replaces the file atomically.

use std::fs;

use serde::{Deserialize, Serialize};
use terra_core::files::{read_json, write_json};
use terra_core::{Paths, Result, TerraError};
use tracing::{debug, warn};

use crate::model::{Identity, Server, Workspace};

/// On-disk projection of the current selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedContext {
    #[serde(default)]
    pub server: Server,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
}

/// The context one command runs against. An overriding workspace replaces the
/// persisted one for this command only; `ContextStore::save` does not accept
/// this type.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
    persisted: PersistedContext,
    override_workspace: Option<Workspace>,
}

impl CommandContext {
    /// No override: the command sees the persisted context as-is
    pub fn current(persisted: PersistedContext) -> Self {
        Self {
            persisted,
            override_workspace: None,
        }
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.override_workspace
            .as_ref()
            .or(self.persisted.workspace.as_ref())
    }

    pub fn require_workspace(&self) -> Result<&Workspace> {
        self.workspace().ok_or_else(|| {
            TerraError::UserActionable(
                "No current workspace. Run `terra workspace set` or pass --workspace".to_string(),
            )
        })
    }

    pub fn is_overridden(&self) -> bool {
        self.override_workspace.is_some()
    }

    pub fn server(&self) -> &Server {
        &self.persisted.server
    }

    pub fn user_key(&self) -> Option<&str> {
        self.persisted.user_key.as_deref()
    }

    /// The persisted context underneath any override
    pub fn persisted(&self) -> &PersistedContext {
        &self.persisted
    }

    /// Whether `workspace` is the persisted current workspace
    pub fn is_persisted_workspace(&self, workspace: &Workspace) -> bool {
        self.persisted
            .workspace
            .as_ref()
            .map(|w| w.id == workspace.id)
            .unwrap_or(false)
    }

    pub(crate) fn refresh_persisted(&mut self, persisted: PersistedContext) {
        self.persisted = persisted;
    }
}

pub struct ContextStore {
    paths: Paths,
}

impl ContextStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Load the context, writing defaults on first use. A corrupt file is
    /// reported and replaced by defaults.
    pub fn load(&self) -> Result<PersistedContext> {
        let path = self.paths.context_file();
        match read_json::<PersistedContext>(&path) {
            Ok(Some(context)) => Ok(context),
            Ok(None) => {
                debug!(path = %path.display(), "Creating default context");
                let context = PersistedContext::default();
                self.save(&context)?;
                Ok(context)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable context file");
                Ok(PersistedContext::default())
            }
        }
    }

    pub fn save(&self, context: &PersistedContext) -> Result<()> {
        write_json(&self.paths.context_file(), context, false)
    }

    /// Re-load, mutate and save in one step
    pub fn update<F>(&self, mutate: F) -> Result<PersistedContext>
    where
        F: FnOnce(&mut PersistedContext),
    {
        let mut context = self.load()?;
        mutate(&mut context);
        self.save(&context)?;
        Ok(context)
    }

    /// A transient copy of `context` with `workspace` as current
    pub fn with_override(&self, context: PersistedContext, workspace: Workspace) -> CommandContext {
        CommandContext {
            persisted: context,
            override_workspace: Some(workspace),
        }
    }

    pub fn load_identity(&self, key: &str) -> Result<Option<Identity>> {
        read_json(&self.paths.identity_file(key))
    }

    pub fn save_identity(&self, identity: &Identity) -> Result<()> {
        write_json(&self.paths.identity_file(&identity.key), identity, true)
    }

    /// Remove the identity record, and its directory once empty
    pub fn remove_identity(&self, key: &str) -> Result<()> {
        let file = self.paths.identity_file(key);
        if file.exists() {
            fs::remove_file(&file)?;
        }
        let dir = self.paths.identity_dir(key);
        if dir.exists() && fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{identity, FakeWorkspaceApi};
    use tempfile::tempdir;

    #[test]
    fn test_first_load_creates_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = ContextStore::new(Paths::at(dir.path()));

        let context = store.load()?;
        assert_eq!(context, PersistedContext::default());
        assert!(store.paths().context_file().exists());
        Ok(())
    }

    #[test]
    fn test_update_persists() -> Result<()> {
        let dir = tempdir()?;
        let store = ContextStore::new(Paths::at(dir.path()));
        let w1 = FakeWorkspaceApi::default().add_workspace("w1");

        store.update(|c| {
            c.user_key = Some("k1".to_string());
            c.workspace = Some(w1.clone());
        })?;

        let reloaded = ContextStore::new(Paths::at(dir.path())).load()?;
        assert_eq!(reloaded.user_key.as_deref(), Some("k1"));
        assert_eq!(reloaded.workspace, Some(w1));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = ContextStore::new(Paths::at(dir.path()));
        fs::write(store.paths().context_file(), "{ not json")?;

        assert_eq!(store.load()?, PersistedContext::default());
        Ok(())
    }

    #[test]
    fn test_override_is_not_persisted() -> Result<()> {
        let dir = tempdir()?;
        let store = ContextStore::new(Paths::at(dir.path()));
        let fake = FakeWorkspaceApi::default();
        let w1 = fake.add_workspace("w1");
        let w2 = fake.add_workspace("w2");

        let persisted = store.update(|c| c.workspace = Some(w1.clone()))?;
        let command = store.with_override(persisted, w2.clone());
        assert_eq!(command.workspace(), Some(&w2));
        assert!(command.is_overridden());
        assert!(!command.is_persisted_workspace(&w2));

        assert_eq!(store.load()?.workspace, Some(w1));
        Ok(())
    }

    #[test]
    fn test_require_workspace_without_selection() {
        let command = CommandContext::current(PersistedContext::default());
        assert!(matches!(
            command.require_workspace(),
            Err(TerraError::UserActionable(_))
        ));
    }

    #[test]
    fn test_identity_records() -> Result<()> {
        let dir = tempdir()?;
        let store = ContextStore::new(Paths::at(dir.path()));
        let me = identity("k1");

        store.save_identity(&me)?;
        assert_eq!(store.load_identity("k1")?, Some(me));

        store.remove_identity("k1")?;
        assert_eq!(store.load_identity("k1")?, None);
        assert!(!store.paths().identity_dir("k1").exists());
        Ok(())
    }
}
