//! terra - workspace context and tool launcher
//!
//! Thin command surface over the `terra` library. Exit codes: 0 success,
//! 1 user-actionable failure, 2 validation failure, 3 internal or remote
//! failure, anything else is the exit code of a launched tool.

use std::io::Write;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use terra::model::{
    CloudPlatform, CreateWorkspace, Credential, GroupPolicy, IamRole, UserCredential,
    WorkspaceUpdate,
};
use terra::resource::{BqPathFormat, ResourceRequest};
use terra::runner::runner_for;
use terra::{
    CloneResult, CloningPolicy, DuplicateRequest, EnvMap, OAuthClient, ResolveOptions, Resource,
    ResourceKind, Server, Session, Workspace,
};
use terra_core::{exit_codes, AppLaunch, CliConfig, Paths, TerraError};

#[derive(Parser)]
#[command(name = "terra")]
#[command(version)]
#[command(about = "Work with Terra workspaces, their resources and the tools that use them")]
struct Cli {
    /// Use this workspace (UUID or id) for this command only
    #[arg(long, global = true)]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the logged-in identity
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Choose the deployment to talk to
    #[command(subcommand)]
    Server(ServerCommand),

    /// Manage workspaces
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Manage workspace resources
    #[command(subcommand)]
    Resource(ResourceCommand),

    /// Manage identity-service groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Run tools with workspace resources in their environment
    #[command(subcommand)]
    App(AppCommand),

    /// Read and change CLI configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Store a credential obtained from the identity provider
    Login {
        /// Access token
        #[arg(long)]
        token: String,
        /// Seconds until the access token expires
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
        /// Refresh token used to renew the access token
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Show the current identity and whether its login is valid
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Forget the current identity and all of its credentials
    Logout,
}

#[derive(Subcommand)]
enum ServerCommand {
    /// List known servers
    List {
        #[arg(long)]
        json: bool,
    },
    /// Select a server; moving to a different one logs out
    Set {
        #[arg(long)]
        name: String,
        /// OAuth client id used to refresh access tokens
        #[arg(long)]
        oauth_client_id: Option<String>,
        #[arg(long)]
        oauth_client_secret: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// List workspaces you can read
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 30)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Create a workspace and make it current
    Create {
        #[arg(long = "id")]
        user_facing_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum, default_value_t = Platform::Gcp)]
        platform: Platform,
    },
    /// Make a workspace current
    Set {
        /// Workspace UUID or id
        #[arg(long = "id")]
        id: String,
    },
    /// Show the current workspace
    Describe {
        #[arg(long)]
        json: bool,
    },
    /// Change properties of the current workspace
    Update {
        #[arg(long = "new-id")]
        user_facing_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete the current workspace
    Delete,
    /// Copy the current workspace and its resources into a new workspace
    Duplicate {
        #[arg(long = "new-id")]
        user_facing_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List members of the current workspace
    ListUsers {
        #[arg(long)]
        json: bool,
    },
    /// Grant a role on the current workspace
    AddUser {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        role: IamRole,
    },
    /// Remove a role from a member of the current workspace
    RemoveUser {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        role: IamRole,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// List groups you belong to
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create a group; you become its admin
    Create {
        #[arg(long)]
        name: String,
    },
    /// Show a group's email
    Describe {
        #[arg(long)]
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete a group
    Delete {
        #[arg(long)]
        name: String,
    },
    /// List members holding a policy on a group
    ListUsers {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = GroupPolicy::Member)]
        policy: GroupPolicy,
        #[arg(long)]
        json: bool,
    },
    /// Add a member to a group
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_enum, default_value_t = GroupPolicy::Member)]
        policy: GroupPolicy,
    },
    /// Remove a member from a group
    RemoveUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_enum, default_value_t = GroupPolicy::Member)]
        policy: GroupPolicy,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Platform {
    Gcp,
    Azure,
}

#[derive(Subcommand)]
enum ResourceCommand {
    /// List resources in the workspace
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one resource
    Describe {
        #[arg(long)]
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the identifier tools use for a resource
    Resolve {
        #[arg(long)]
        name: String,
        /// Print bucket paths without gs://
        #[arg(long)]
        exclude_bucket_prefix: bool,
        /// Use project:dataset for BigQuery paths
        #[arg(long)]
        legacy_bq_path: bool,
    },
    /// Check that you can read a referenced resource
    CheckAccess {
        #[arg(long)]
        name: String,
    },
    /// Delete a resource (controlled resources delete the cloud object)
    Delete {
        #[arg(long)]
        name: String,
    },
    /// Link an existing cloud object into the workspace
    AddRef {
        #[command(flatten)]
        common: NewResource,
        #[command(subcommand)]
        kind: KindArgs,
    },
    /// Create a new cloud object owned by the workspace
    Create {
        #[command(flatten)]
        common: NewResource,
        #[command(subcommand)]
        kind: KindArgs,
    },
}

#[derive(Args)]
struct NewResource {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_enum)]
    cloning: Option<CloningPolicy>,
}

#[derive(Subcommand)]
enum KindArgs {
    GcsBucket {
        #[arg(long)]
        bucket_name: String,
    },
    GcsObject {
        #[arg(long)]
        bucket_name: String,
        #[arg(long)]
        object_name: String,
    },
    BqDataset {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        dataset_id: String,
    },
    BqTable {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        dataset_id: String,
        #[arg(long)]
        table_id: String,
    },
    GitRepo {
        #[arg(long)]
        url: String,
    },
}

impl From<KindArgs> for ResourceKind {
    fn from(args: KindArgs) -> Self {
        match args {
            KindArgs::GcsBucket { bucket_name } => ResourceKind::GcsBucket { bucket_name },
            KindArgs::GcsObject {
                bucket_name,
                object_name,
            } => ResourceKind::GcsObject {
                bucket_name,
                object_name,
            },
            KindArgs::BqDataset {
                project_id,
                dataset_id,
            } => ResourceKind::BqDataset {
                project_id,
                dataset_id,
            },
            KindArgs::BqTable {
                project_id,
                dataset_id,
                table_id,
            } => ResourceKind::BqTable {
                project_id,
                dataset_id,
                table_id,
            },
            KindArgs::GitRepo { url } => ResourceKind::GitRepo { git_repo_url: url },
        }
    }
}

#[derive(Subcommand)]
enum AppCommand {
    /// Run a command with TERRA_<NAME> variables for every resource
    Execute {
        /// Extra variables, KEY=VALUE; must not clash with generated ones
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print a setting, or all settings
    Get { key: Option<ConfigKey> },
    /// Change a setting
    Set { key: ConfigKey, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigKey {
    ResourceLimit,
    AppLaunch,
    DockerImage,
    LogLevel,
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

fn main() {
    let cli = Cli::parse();
    let paths = Paths::new();

    let config = CliConfig::load(&paths);
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = config
        .map_err(anyhow::Error::from)
        .and_then(|config| run(cli, paths, config));
    if let Err(err) = result {
        std::process::exit(report(&err, &mut std::io::stderr()));
    }
}

/// Print the error to `out` and pick the exit code
fn report(err: &anyhow::Error, out: &mut dyn Write) -> i32 {
    let terra = err.downcast_ref::<TerraError>();
    let written = match terra {
        Some(TerraError::Passthrough(code)) => writeln!(out, "Command exited with code {}", code),
        Some(e) if e.is_user_facing() => writeln!(out, "{}", e),
        Some(e) => writeln!(out, "terra failed. Set RUST_LOG=debug for details.\n  {}", e),
        None => writeln!(out, "terra failed: {:#}", err),
    };
    // nowhere left to report a closed stderr
    let _ = written;
    terra.map(TerraError::exit_code).unwrap_or(exit_codes::SYSTEM)
}

fn run(cli: Cli, paths: Paths, config: CliConfig) -> Result<()> {
    let command = match cli.command {
        Commands::Config(command) => return cmd_config(command, &paths, config),
        other => other,
    };

    let mut session = Session::connect(paths, config, cli.workspace.as_deref())?;
    let result = match command {
        Commands::Auth(command) => cmd_auth(&mut session, command),
        Commands::Server(command) => cmd_server(&mut session, command),
        Commands::Workspace(command) => cmd_workspace(&mut session, command),
        Commands::Resource(command) => cmd_resource(&mut session, command),
        Commands::Group(command) => cmd_group(&mut session, command),
        Commands::App(command) => cmd_app(&mut session, command),
        Commands::Config(_) => Ok(()),
    };
    let closed = session.close();
    result?;
    closed?;
    Ok(())
}

fn cmd_auth(session: &mut Session, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login {
            token,
            expires_in,
            refresh_token,
        } => {
            let identity = session.login(UserCredential {
                token: Credential::new(token, Utc::now() + Duration::seconds(expires_in)),
                refresh_token,
            })?;
            println!("Logged in as {}", identity.email);
        }
        AuthCommand::Status { json } => {
            let status = session.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("Server: {}", status.server);
            match &status.identity {
                Some(identity) => {
                    println!("User: {}", identity.email);
                    if let Some(proxy) = &identity.proxy_group_email {
                        println!("Proxy group: {}", proxy);
                    }
                    let valid = if status.logged_in { "yes" } else { "no (expired)" };
                    println!("Logged in: {}", valid);
                }
                None => println!("Not logged in"),
            }
            if let Some(workspace) = &status.workspace {
                println!("Workspace: {}", workspace.user_facing_id);
            }
        }
        AuthCommand::Logout => match session.logout()? {
            Some(identity) => println!("Logged out {}", identity.email),
            None => println!("Not logged in"),
        },
    }
    Ok(())
}

fn cmd_server(session: &mut Session, command: ServerCommand) -> Result<()> {
    match command {
        ServerCommand::List { json } => {
            let catalog = session.servers()?;
            let servers = catalog.list();
            if json {
                let public: Vec<Server> = servers
                    .iter()
                    .map(|server| Server {
                        oauth_client_secret: None,
                        ..(*server).clone()
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&public)?);
                return Ok(());
            }
            let current = &session.context().server().name;
            for server in servers {
                let marker = if &server.name == current { "*" } else { " " };
                println!("{} {:<20} {}", marker, server.name, server.description);
            }
        }
        ServerCommand::Set {
            name,
            oauth_client_id,
            oauth_client_secret,
        } => {
            let server = session.set_server(
                &name,
                &OAuthClient {
                    client_id: oauth_client_id,
                    client_secret: oauth_client_secret,
                },
            )?;
            println!("Server set to {}", server.name);
            if server.oauth_client_id.is_empty() {
                println!("No OAuth client id configured; expired logins cannot be refreshed.");
            }
        }
    }
    Ok(())
}

fn print_workspace(workspace: &Workspace) {
    println!("ID: {}", workspace.user_facing_id);
    println!("UUID: {}", workspace.id);
    if let Some(name) = &workspace.name {
        println!("Name: {}", name);
    }
    if let Some(description) = &workspace.description {
        println!("Description: {}", description);
    }
    println!("Cloud platform: {}", workspace.cloud_platform);
    if let Some(project) = &workspace.project_id {
        println!("Project: {}", project);
    }
}

fn cmd_workspace(session: &mut Session, command: WorkspaceCommand) -> Result<()> {
    match command {
        WorkspaceCommand::List {
            offset,
            limit,
            json,
        } => {
            let workspaces = session.list_workspaces(offset, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&workspaces)?);
                return Ok(());
            }
            let current = session.context().workspace().map(|w| w.id);
            for workspace in workspaces {
                let marker = if Some(workspace.id) == current { "*" } else { " " };
                println!(
                    "{} {:<32} {}",
                    marker,
                    workspace.user_facing_id,
                    workspace.name.as_deref().unwrap_or("")
                );
            }
        }
        WorkspaceCommand::Create {
            user_facing_id,
            name,
            description,
            platform,
        } => {
            let workspace = session.create_workspace(&CreateWorkspace {
                user_facing_id,
                name,
                description,
                cloud_platform: match platform {
                    Platform::Gcp => CloudPlatform::Gcp,
                    Platform::Azure => CloudPlatform::Azure,
                },
            })?;
            println!("Workspace created and set as current.");
            print_workspace(&workspace);
        }
        WorkspaceCommand::Set { id } => {
            let workspace = session.set_workspace(&id)?;
            println!("Workspace set to {}", workspace.user_facing_id);
        }
        WorkspaceCommand::Describe { json } => {
            let workspace = session.describe_workspace()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&workspace)?);
            } else {
                print_workspace(&workspace);
            }
        }
        WorkspaceCommand::Update {
            user_facing_id,
            name,
            description,
        } => {
            let update = WorkspaceUpdate {
                user_facing_id,
                name,
                description,
            };
            if update.user_facing_id.is_none()
                && update.name.is_none()
                && update.description.is_none()
            {
                return Err(TerraError::InvalidInput(
                    "Nothing to update: pass --new-id, --name or --description".to_string(),
                )
                .into());
            }
            let workspace = session.update_workspace(&update)?;
            println!("Workspace updated.");
            print_workspace(&workspace);
        }
        WorkspaceCommand::Delete => {
            let workspace = session.delete_workspace()?;
            println!("Workspace {} deleted.", workspace.user_facing_id);
        }
        WorkspaceCommand::Duplicate {
            user_facing_id,
            name,
            description,
            json,
        } => {
            let result = session.duplicate_workspace(&DuplicateRequest {
                user_facing_id,
                name,
                description,
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            println!(
                "Workspace {} duplicated to {}",
                result.source.user_facing_id, result.destination.user_facing_id
            );
            for outcome in &result.resources {
                let result_text = match outcome.result {
                    CloneResult::Succeeded => "SUCCEEDED",
                    CloneResult::Skipped => "SKIPPED",
                    CloneResult::Failed => "FAILED",
                };
                let name = &outcome.source.name;
                match &outcome.error {
                    Some(error) => println!("  {:<24} {} ({})", name, result_text, error),
                    None => println!("  {:<24} {}", name, result_text),
                }
            }
        }
        WorkspaceCommand::ListUsers { json } => {
            let bindings = session.list_users()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bindings)?);
                return Ok(());
            }
            for binding in bindings {
                for member in binding.members {
                    println!("{:<40} {}", member, binding.role.as_str());
                }
            }
        }
        WorkspaceCommand::AddUser { email, role } => {
            let outcome = session.grant_role(role, &email)?;
            if outcome.was_recovered() {
                println!("Invited {}", email);
            }
            println!("Granted {} to {}", role.as_str(), email);
        }
        WorkspaceCommand::RemoveUser { email, role } => {
            session.remove_user(role, &email)?;
            println!("Removed {} from {}", role.as_str(), email);
        }
    }
    Ok(())
}

fn cmd_group(session: &mut Session, command: GroupCommand) -> Result<()> {
    match command {
        GroupCommand::List { json } => {
            let groups = session.list_groups()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(());
            }
            for group in groups {
                println!(
                    "{:<24} {:<40} {}",
                    group.group_name,
                    group.group_email,
                    group.role.as_str()
                );
            }
        }
        GroupCommand::Create { name } => {
            let group = session.create_group(&name)?;
            println!("Group {} created ({})", group.name, group.email);
        }
        GroupCommand::Describe { name, json } => {
            let group = session.describe_group(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&group)?);
            } else {
                println!("{}: {}", group.name, group.email);
            }
        }
        GroupCommand::Delete { name } => {
            session.delete_group(&name)?;
            println!("Group {} deleted.", name);
        }
        GroupCommand::ListUsers { name, policy, json } => {
            let members = session.list_group_members(&name, policy)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&members)?);
                return Ok(());
            }
            for member in members {
                println!("{}", member);
            }
        }
        GroupCommand::AddUser {
            name,
            email,
            policy,
        } => {
            session.add_group_member(&name, policy, &email)?;
            println!("Added {} to {} as {}", email, name, policy.as_str());
        }
        GroupCommand::RemoveUser {
            name,
            email,
            policy,
        } => {
            session.remove_group_member(&name, policy, &email)?;
            println!("Removed {} {} from {}", policy.as_str(), email, name);
        }
    }
    Ok(())
}

fn print_resources(resources: &[Resource]) {
    for resource in resources {
        println!(
            "{:<24} {:<12} {:<11} {}",
            resource.name,
            resource.kind.type_name(),
            resource.stewardship,
            resource.resolve()
        );
    }
}

fn cmd_resource(session: &mut Session, command: ResourceCommand) -> Result<()> {
    match command {
        ResourceCommand::List { json } => {
            let resources = session.list_resources()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else {
                print_resources(&resources);
            }
        }
        ResourceCommand::Describe { name, json } => {
            let resource = session.describe_resource(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resource)?);
            } else {
                print_resources(std::slice::from_ref(&resource));
            }
        }
        ResourceCommand::Resolve {
            name,
            exclude_bucket_prefix,
            legacy_bq_path,
        } => {
            let options = ResolveOptions {
                exclude_bucket_prefix,
                bq_format: if legacy_bq_path {
                    BqPathFormat::Legacy
                } else {
                    BqPathFormat::Sql
                },
            };
            println!("{}", session.resolve_resource(&name, &options)?);
        }
        ResourceCommand::CheckAccess { name } => {
            session.check_access(&name)?;
            println!("Access confirmed for {}", name);
        }
        ResourceCommand::Delete { name } => {
            let resource = session.delete_resource(&name)?;
            println!("Deleted {} resource {}", resource.stewardship, resource.name);
        }
        ResourceCommand::AddRef { common, kind } => {
            let mut request = ResourceRequest::referenced(common.name, kind.into())
                .with_description(common.description);
            if let Some(policy) = common.cloning {
                request = request.with_cloning_policy(policy);
            }
            let resource = session.add_referenced(&request)?;
            println!("Added reference {} -> {}", resource.name, resource.resolve());
        }
        ResourceCommand::Create { common, kind } => {
            let mut request = ResourceRequest::controlled(common.name, kind.into())
                .with_description(common.description);
            if let Some(policy) = common.cloning {
                request = request.with_cloning_policy(policy);
            }
            let resource = session.create_controlled(&request)?;
            println!("Created {} -> {}", resource.name, resource.resolve());
        }
    }
    Ok(())
}

fn cmd_app(session: &mut Session, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Execute { env, command } => {
            let extra: EnvMap = env.into_iter().collect();
            let runner = runner_for(session.config())?;
            session.run_tool(runner.as_ref(), &command.join(" "), &extra)?;
        }
    }
    Ok(())
}

fn cmd_config(command: ConfigCommand, paths: &Paths, mut config: CliConfig) -> Result<()> {
    match command {
        ConfigCommand::Get { key: None } => {
            print!("{}", serde_yaml::to_string(&config).map_err(TerraError::from)?);
        }
        ConfigCommand::Get { key: Some(key) } => {
            let value = match key {
                ConfigKey::ResourceLimit => config.resource_limit.to_string(),
                ConfigKey::AppLaunch => match config.app_launch {
                    AppLaunch::LocalProcess => "LOCAL_PROCESS".to_string(),
                    AppLaunch::DockerContainer => "DOCKER_CONTAINER".to_string(),
                },
                ConfigKey::DockerImage => config.docker_image.clone(),
                ConfigKey::LogLevel => config.log_level.clone(),
            };
            println!("{}", value);
        }
        ConfigCommand::Set { key, value } => {
            match key {
                ConfigKey::ResourceLimit => {
                    config.resource_limit = value.parse().map_err(|_| {
                        TerraError::InvalidInput(format!(
                            "resource-limit must be a number, got '{}'",
                            value
                        ))
                    })?;
                }
                ConfigKey::AppLaunch => {
                    let launch = value.to_ascii_uppercase().replace('-', "_");
                    config.app_launch = match launch.as_str() {
                        "LOCAL_PROCESS" => AppLaunch::LocalProcess,
                        "DOCKER_CONTAINER" => AppLaunch::DockerContainer,
                        _ => {
                            return Err(anyhow!(TerraError::InvalidInput(format!(
                                "app-launch must be LOCAL_PROCESS or DOCKER_CONTAINER, got '{}'",
                                value
                            ))))
                        }
                    };
                }
                ConfigKey::DockerImage => config.docker_image = value,
                ConfigKey::LogLevel => config.log_level = value,
            }
            config.save(paths)?;
            println!("Configuration saved to {}", paths.config_file().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(err: TerraError) -> (i32, String) {
        let mut out = Vec::new();
        let code = report(&anyhow::Error::from(err), &mut out);
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_passthrough_reports_tool_exit_code() {
        let (code, message) = reported(TerraError::Passthrough(42));
        assert_eq!(code, 42);
        assert_eq!(message, "Command exited with code 42\n");
    }

    #[test]
    fn test_user_facing_errors_print_message() {
        let (code, message) = reported(TerraError::UserActionable("Not logged in".to_string()));
        assert_eq!(code, exit_codes::USER_ACTIONABLE);
        assert_eq!(message, "Not logged in\n");
    }

    #[test]
    fn test_internal_errors_point_at_debug_logging() {
        let (code, message) = reported(TerraError::Internal("boom".to_string()));
        assert_eq!(code, exit_codes::SYSTEM);
        assert!(message.contains("RUST_LOG=debug"));
        assert!(message.contains("boom"));
    }
}
