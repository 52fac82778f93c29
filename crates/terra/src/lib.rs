//! Terra - workspace context, credentials and resource resolution
//!
//! The CLI mirrors remote workspace state into a local context, hands out
//! end-user and impersonated credentials, resolves workspace resources into
//! values tools can use, and duplicates a workspace's resources into a new
//! workspace.
//!
//! A command runs in a [`Session`]: it loads the persisted context (or a
//! one-command override), talks to the remote services through a
//! [`RetryingClient`], and writes context changes back through the
//! [`ContextStore`].

pub mod clone;
pub mod context;
pub mod credentials;
pub mod env;
pub mod groups;
pub mod model;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod runner;
pub mod server;
pub mod service;
pub mod session;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use clone::{
    CloneOrchestrator, CloneOutcome, CloneResult, DuplicateRequest, DuplicatedWorkspace,
};
pub use context::{CommandContext, ContextStore, PersistedContext};
pub use credentials::{CredentialStore, TokenRefresher};
pub use env::{CommandEnvironmentBuilder, EnvMap};
pub use groups::{GroupDescription, GroupManager};
pub use model::{Group, GroupPolicy, Identity, Server, Workspace};
pub use registry::ResourceRegistry;
pub use resource::{CloningPolicy, ResolveOptions, Resource, ResourceKind, Stewardship};
pub use retry::{Recovery, RemoteError, RetryingClient};
pub use server::{OAuthClient, ServerCatalog};
pub use session::{Services, Session};
pub use workspace::WorkspaceManager;
