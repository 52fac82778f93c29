//! One command invocation
//!
//! A [`Session`] loads the persisted context (optionally overridden with a
//! workspace for this command only), wires the stores and remote clients
//! together, and routes every context mutation back through the
//! [`ContextStore`]. Call [`Session::close`] when the command is done.

use std::rc::Rc;

use serde::Serialize;
use terra_core::{CliConfig, Paths, Result, TerraError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clone::{CloneOrchestrator, DuplicateRequest, DuplicatedWorkspace};
use crate::context::{CommandContext, ContextStore};
use crate::credentials::{CredentialStore, OAuthRefresher, TokenRefresher};
use crate::env::{CommandEnvironmentBuilder, EnvMap};
use crate::groups::{GroupDescription, GroupManager};
use crate::model::{
    CreateWorkspace, Group, GroupPolicy, IamRole, Identity, RoleBinding, Server, UserCredential,
    Workspace, WorkspaceUpdate,
};
use crate::registry::ResourceRegistry;
use crate::resource::{ResolveOptions, Resource, ResourceRequest};
use crate::retry::{Recovery, RemoteError, RetryPolicy, RetryingClient};
use crate::runner::{self, CommandRunner};
use crate::server::{OAuthClient, ServerCatalog};
use crate::service::cloud::{BIGQUERY_URL, STORAGE_URL};
use crate::service::http::HttpTransport;
use crate::service::{
    CloudApi, HttpCloudApi, HttpIdentityApi, HttpWorkspaceApi, IdentityApi, WorkspaceApi,
};
use crate::workspace::WorkspaceManager;

/// Remote collaborators used by a session
pub struct Services {
    pub workspace: Rc<dyn WorkspaceApi>,
    pub identity: Rc<dyn IdentityApi>,
    pub cloud: Rc<dyn CloudApi>,
    pub refresher: Rc<dyn TokenRefresher>,
}

impl Services {
    /// HTTP clients for the given server
    pub fn http(server: &Server, config: &CliConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        Ok(Self {
            workspace: Rc::new(HttpWorkspaceApi::new(HttpTransport::new(
                &server.workspace_manager_uri,
                timeout,
            )?)),
            identity: Rc::new(HttpIdentityApi::new(HttpTransport::new(
                &server.identity_uri,
                timeout,
            )?)),
            cloud: Rc::new(HttpCloudApi::new(
                HttpTransport::new(STORAGE_URL, timeout)?,
                HttpTransport::new(BIGQUERY_URL, timeout)?,
            )),
            refresher: Rc::new(OAuthRefresher::new(server, timeout)?),
        })
    }
}

/// Output of `auth status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub server: String,
    pub identity: Option<Identity>,
    pub logged_in: bool,
    pub workspace: Option<Workspace>,
}

pub struct Session {
    config: CliConfig,
    contexts: ContextStore,
    context: CommandContext,
    services: Services,
    retry: RetryingClient,
    credentials: CredentialStore,
}

impl Session {
    /// Open a session against the server recorded in the persisted context
    pub fn connect(
        paths: Paths,
        config: CliConfig,
        workspace_override: Option<&str>,
    ) -> Result<Self> {
        let server = ContextStore::new(paths.clone()).load()?.server;
        let services = Services::http(&server, &config)?;
        Self::open(paths, config, services, workspace_override)
    }

    pub fn open(
        paths: Paths,
        config: CliConfig,
        services: Services,
        workspace_override: Option<&str>,
    ) -> Result<Self> {
        let contexts = ContextStore::new(paths.clone());
        let persisted = contexts.load()?;
        let retry = RetryingClient::new(RetryPolicy::from(&config.retry));
        let credentials = CredentialStore::new(
            paths,
            Rc::clone(&services.identity),
            Rc::clone(&services.refresher),
            retry.clone(),
        );

        let mut session = Self {
            config,
            contexts,
            context: CommandContext::current(persisted.clone()),
            services,
            retry,
            credentials,
        };

        if let Some(id) = workspace_override {
            let workspace = session.with_manager(|m| m.get(id))?;
            info!(
                workspace = %workspace.user_facing_id,
                "Using workspace for this command only"
            );
            session.context = session.contexts.with_override(persisted, workspace);
        }
        Ok(session)
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// The logged-in identity
    pub fn identity(&self) -> Result<Identity> {
        let key = self.context.user_key().ok_or_else(not_logged_in)?;
        self.contexts.load_identity(key)?.ok_or_else(not_logged_in)
    }

    fn user_token(&mut self) -> Result<(Identity, String)> {
        let identity = self.identity()?;
        let token = self.credentials.get_user_token(&identity)?;
        Ok((identity, token))
    }

    fn with_manager<T>(
        &mut self,
        f: impl FnOnce(&WorkspaceManager<'_>) -> Result<T>,
    ) -> Result<T> {
        let (_, token) = self.user_token()?;
        let manager = WorkspaceManager::new(
            self.services.workspace.as_ref(),
            self.services.identity.as_ref(),
            &self.retry,
            &token,
        );
        f(&manager)
    }

    fn with_registry<T>(
        &mut self,
        f: impl FnOnce(&ResourceRegistry<'_>, &Workspace) -> Result<T>,
    ) -> Result<T> {
        let workspace = self.context.require_workspace()?.clone();
        let (_, token) = self.user_token()?;
        let registry = ResourceRegistry::new(
            self.services.workspace.as_ref(),
            self.services.cloud.as_ref(),
            &self.retry,
            &token,
            self.config.resource_limit,
        );
        f(&registry, &workspace)
    }

    fn with_groups<T>(&mut self, f: impl FnOnce(&GroupManager<'_>) -> Result<T>) -> Result<T> {
        let (_, token) = self.user_token()?;
        let groups = GroupManager::new(self.services.identity.as_ref(), &self.retry, &token);
        f(&groups)
    }

    fn save_persisted(
        &mut self,
        mutate: impl FnOnce(&mut crate::context::PersistedContext),
    ) -> Result<()> {
        let persisted = self.contexts.update(mutate)?;
        self.context.refresh_persisted(persisted);
        Ok(())
    }

    // ---- auth ----

    /// Record a credential obtained by an external login flow. Users unknown
    /// to the identity service are registered once.
    pub fn login(&mut self, credential: UserCredential) -> Result<Identity> {
        if self.context.user_key().is_some() {
            self.logout()?;
        }

        let token = credential.token.access_token.clone();
        let api = Rc::clone(&self.services.identity);
        let retry = &self.retry;
        let lookup = retry.call_with_recovery(
            "User",
            || api.get_token_info(&token),
            RemoteError::is_not_found,
            || {
                info!("Registering new user");
                retry.call("register user", || api.register_user(&token)).map(|_| ())
            },
        )?;
        let registered = lookup.was_recovered();
        let user = lookup.into_inner();
        if !user.enabled {
            return Err(TerraError::UserActionable(format!(
                "User {} is disabled",
                user.user_email
            )));
        }

        let proxy_group_email = retry.call("Proxy group", || {
            api.get_proxy_group_email(&token, &user.user_email)
        })?;

        let identity = Identity {
            key: Uuid::new_v4().simple().to_string(),
            subject_id: user.user_subject_id,
            email: user.user_email,
            proxy_group_email: Some(proxy_group_email),
        };
        self.credentials
            .store_user_credential(&identity.key, credential)?;
        self.contexts.save_identity(&identity)?;
        let key = identity.key.clone();
        self.save_persisted(|c| c.user_key = Some(key))?;

        info!(email = %identity.email, registered, "Logged in");
        Ok(identity)
    }

    /// Drop every credential of the current identity and forget it
    pub fn logout(&mut self) -> Result<Option<Identity>> {
        let key = match self.context.user_key() {
            Some(key) => key.to_string(),
            None => return Ok(None),
        };
        let identity = self.contexts.load_identity(&key)?;
        if let Some(identity) = &identity {
            self.credentials.invalidate(identity, None)?;
        }
        self.contexts.remove_identity(&key)?;
        self.save_persisted(|c| c.user_key = None)?;
        info!("Logged out");
        Ok(identity)
    }

    pub fn status(&mut self) -> Result<AuthStatus> {
        let identity = match self.context.user_key() {
            Some(key) => self.contexts.load_identity(key)?,
            None => None,
        };
        let logged_in = match &identity {
            Some(identity) => match self.credentials.get_user_token(identity) {
                Ok(_) => true,
                Err(TerraError::AuthExpired(_)) => false,
                Err(e) => return Err(e),
            },
            None => false,
        };
        Ok(AuthStatus {
            server: self.context.server().name.clone(),
            identity,
            logged_in,
            workspace: self.context.workspace().cloned(),
        })
    }

    // ---- servers ----

    pub fn servers(&self) -> Result<ServerCatalog> {
        ServerCatalog::load(self.contexts.paths())
    }

    /// Select the server later commands connect to. Moving to a different
    /// server logs out and clears the current workspace, since neither exists
    /// there.
    pub fn set_server(&mut self, name: &str, oauth: &OAuthClient) -> Result<Server> {
        let mut server = self.servers()?.find(name)?;
        if server.name == self.context.server().name {
            // keep client settings recorded earlier for the same server
            server.oauth_client_id = self.context.server().oauth_client_id.clone();
            server.oauth_client_secret = self.context.server().oauth_client_secret.clone();
        }
        oauth.apply(&mut server);
        Services::http(&server, &self.config)?;

        let changed = server.name != self.context.server().name;
        if changed {
            self.logout()?;
        }
        let selected = server.clone();
        self.save_persisted(|c| {
            c.server = selected;
            if changed {
                c.workspace = None;
            }
        })?;
        info!(server = %server.name, changed, "Selected server");
        Ok(server)
    }

    // ---- workspaces ----

    pub fn current_workspace(&self) -> Result<Workspace> {
        self.context.require_workspace().cloned()
    }

    /// Make `workspace` the persisted current one, dropping the impersonated
    /// credential of the previous one
    fn switch_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        let identity = self.identity()?;
        if let Some(previous) = self.context.persisted().workspace.clone() {
            if previous.id != workspace.id {
                self.credentials.invalidate(&identity, Some(&previous))?;
            }
        }
        let current = workspace.clone();
        self.save_persisted(|c| c.workspace = Some(current))?;
        info!(workspace = %workspace.user_facing_id, "Switched workspace");
        Ok(())
    }

    /// Workspaces the user can read, one page at a time
    pub fn list_workspaces(&mut self, offset: usize, limit: usize) -> Result<Vec<Workspace>> {
        self.with_manager(|m| m.list(offset, limit))
    }

    pub fn create_workspace(&mut self, request: &CreateWorkspace) -> Result<Workspace> {
        let workspace = self.with_manager(|m| m.create(request))?;
        self.switch_workspace(&workspace)?;
        Ok(workspace)
    }

    /// Select a workspace by UUID or user-facing id
    pub fn set_workspace(&mut self, id: &str) -> Result<Workspace> {
        let workspace = self.with_manager(|m| m.get(id))?;
        self.switch_workspace(&workspace)?;
        Ok(workspace)
    }

    /// Latest snapshot of the current workspace; the persisted copy is
    /// refreshed when it is the same workspace
    pub fn describe_workspace(&mut self) -> Result<Workspace> {
        let workspace = self.current_workspace()?;
        let fresh = self.with_manager(|m| m.refresh(&workspace))?;
        self.store_if_persisted(&fresh)?;
        Ok(fresh)
    }

    pub fn update_workspace(&mut self, update: &WorkspaceUpdate) -> Result<Workspace> {
        let workspace = self.current_workspace()?;
        let updated = self.with_manager(|m| m.update(&workspace, update))?;
        self.store_if_persisted(&updated)?;
        Ok(updated)
    }

    fn store_if_persisted(&mut self, workspace: &Workspace) -> Result<()> {
        if self.context.is_persisted_workspace(workspace) {
            let current = workspace.clone();
            self.save_persisted(|c| c.workspace = Some(current))?;
        }
        Ok(())
    }

    pub fn delete_workspace(&mut self) -> Result<Workspace> {
        let workspace = self.current_workspace()?;
        self.with_manager(|m| m.delete(&workspace))?;

        let identity = self.identity()?;
        self.credentials.invalidate(&identity, Some(&workspace))?;
        if self.context.is_persisted_workspace(&workspace) {
            self.save_persisted(|c| c.workspace = None)?;
        }
        Ok(workspace)
    }

    pub fn list_users(&mut self) -> Result<Vec<RoleBinding>> {
        let workspace = self.current_workspace()?;
        self.with_manager(|m| m.list_users(&workspace))
    }

    pub fn grant_role(&mut self, role: IamRole, email: &str) -> Result<Recovery<()>> {
        let workspace = self.current_workspace()?;
        self.with_manager(|m| m.grant_role(&workspace, role, email))
    }

    pub fn remove_user(&mut self, role: IamRole, email: &str) -> Result<()> {
        let workspace = self.current_workspace()?;
        self.with_manager(|m| m.remove_role(&workspace, role, email))
    }

    /// Duplicate the current workspace. The persisted selection is unchanged.
    pub fn duplicate_workspace(
        &mut self,
        request: &DuplicateRequest,
    ) -> Result<DuplicatedWorkspace> {
        let source = self.current_workspace()?;
        let (_, token) = self.user_token()?;
        let registry = ResourceRegistry::new(
            self.services.workspace.as_ref(),
            self.services.cloud.as_ref(),
            &self.retry,
            &token,
            self.config.resource_limit,
        );
        let manager = WorkspaceManager::new(
            self.services.workspace.as_ref(),
            self.services.identity.as_ref(),
            &self.retry,
            &token,
        );
        CloneOrchestrator::new(&registry, &manager).duplicate(&source, request)
    }

    // ---- groups ----

    pub fn list_groups(&mut self) -> Result<Vec<Group>> {
        self.with_groups(|g| g.list())
    }

    pub fn create_group(&mut self, name: &str) -> Result<GroupDescription> {
        self.with_groups(|g| g.create(name))
    }

    pub fn describe_group(&mut self, name: &str) -> Result<GroupDescription> {
        self.with_groups(|g| g.describe(name))
    }

    pub fn delete_group(&mut self, name: &str) -> Result<()> {
        self.with_groups(|g| g.delete(name))
    }

    pub fn list_group_members(&mut self, name: &str, policy: GroupPolicy) -> Result<Vec<String>> {
        self.with_groups(|g| g.list_members(name, policy))
    }

    pub fn add_group_member(&mut self, name: &str, policy: GroupPolicy, email: &str) -> Result<()> {
        self.with_groups(|g| g.add_member(name, policy, email))
    }

    pub fn remove_group_member(
        &mut self,
        name: &str,
        policy: GroupPolicy,
        email: &str,
    ) -> Result<()> {
        self.with_groups(|g| g.remove_member(name, policy, email))
    }

    // ---- resources ----

    pub fn list_resources(&mut self) -> Result<Vec<Resource>> {
        self.with_registry(|r, ws| r.list(ws))
    }

    pub fn describe_resource(&mut self, name: &str) -> Result<Resource> {
        self.with_registry(|r, ws| r.describe(ws, name))
    }

    pub fn resolve_resource(&mut self, name: &str, options: &ResolveOptions) -> Result<String> {
        let resource = self.describe_resource(name)?;
        Ok(resource.resolve_with(options))
    }

    /// Whether the impersonated identity can read a referenced resource
    pub fn check_access(&mut self, name: &str) -> Result<bool> {
        let workspace = self.current_workspace()?;
        let (identity, token) = self.user_token()?;
        let registry = ResourceRegistry::new(
            self.services.workspace.as_ref(),
            self.services.cloud.as_ref(),
            &self.retry,
            &token,
            self.config.resource_limit,
        );
        let resource = registry.describe(&workspace, name)?;
        let cloud_token = if resource.is_controlled() {
            // rejected by the registry before any token is used
            String::new()
        } else {
            self.credentials
                .get_impersonated_token(&identity, &workspace)?
        };
        registry.check_access(&resource, &cloud_token)
    }

    pub fn delete_resource(&mut self, name: &str) -> Result<Resource> {
        self.with_registry(|r, ws| {
            let resource = r.describe(ws, name)?;
            r.delete(ws, &resource)?;
            Ok(resource)
        })
    }

    pub fn add_referenced(&mut self, request: &ResourceRequest) -> Result<Resource> {
        self.with_registry(|r, ws| r.add_referenced(ws, request))
    }

    pub fn create_controlled(&mut self, request: &ResourceRequest) -> Result<Resource> {
        self.with_registry(|r, ws| r.create_controlled(ws, request))
    }

    // ---- tools ----

    /// Environment for a tool launched against the current workspace
    pub fn build_environment(&mut self, extra: &EnvMap) -> Result<EnvMap> {
        let workspace = self.current_workspace()?;
        let (identity, token) = self.user_token()?;
        let registry = ResourceRegistry::new(
            self.services.workspace.as_ref(),
            self.services.cloud.as_ref(),
            &self.retry,
            &token,
            self.config.resource_limit,
        );
        CommandEnvironmentBuilder::new(&registry, &mut self.credentials)
            .build(&workspace, &identity, extra)
    }

    pub fn run_tool(
        &mut self,
        runner: &dyn CommandRunner,
        command: &str,
        extra: &EnvMap,
    ) -> Result<()> {
        let env = self.build_environment(extra)?;
        runner::run_tool(runner, command, &env)
    }

    /// End the command. Credentials fetched for an overriding workspace are
    /// dropped unless it is also the persisted current one.
    pub fn close(mut self) -> Result<()> {
        let workspace = match self.context.workspace() {
            Some(workspace) if self.context.is_overridden() => workspace.clone(),
            _ => return Ok(()),
        };
        if self.context.is_persisted_workspace(&workspace) {
            return Ok(());
        }
        match self.identity() {
            Ok(identity) => self.credentials.invalidate(&identity, Some(&workspace)),
            Err(e) => {
                warn!(error = %e, "No identity to clean up after override");
                Ok(())
            }
        }
    }
}

fn not_logged_in() -> TerraError {
    TerraError::UserActionable("Not logged in. Run `terra auth login` first".to_string())
}
