//! Launching tool commands
//!
//! The tool runs to completion while this process blocks. Its exit code is
//! passed through untouched.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use terra_core::{AppLaunch, CliConfig, Result, TerraError};
use tracing::{debug, info};
use which::which;

use crate::env::{EnvMap, GOOGLE_APPLICATION_CREDENTIALS};

/// Where the credential file is mounted inside the container
pub const CONTAINER_CREDENTIALS: &str = "/etc/terra/application_default_credentials.json";
/// Working directory inside the container
pub const CONTAINER_WORKDIR: &str = "/workspace";

pub trait CommandRunner {
    /// Run `command` with `env` and return its exit code
    fn run(&self, command: &str, env: &EnvMap) -> Result<i32>;
}

/// `bash -c` in the current directory with inherited stdio
pub struct LocalProcessRunner {
    shell: PathBuf,
}

impl LocalProcessRunner {
    pub fn new() -> Result<Self> {
        let shell = which("bash")
            .map_err(|_| TerraError::UserActionable("bash not found on PATH".to_string()))?;
        Ok(Self { shell })
    }
}

impl CommandRunner for LocalProcessRunner {
    fn run(&self, command: &str, env: &EnvMap) -> Result<i32> {
        debug!(command, "Launching local process");
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .envs(env)
            .status()?;
        Ok(exit_code(status))
    }
}

/// `docker run --rm` with the environment passed by name
pub struct DockerRunner {
    docker: PathBuf,
    image: String,
}

impl DockerRunner {
    pub fn new(image: &str) -> Result<Self> {
        let docker = which("docker").map_err(|_| {
            TerraError::UserActionable(
                "docker not found on PATH; install it or set app_launch to LOCAL_PROCESS"
                    .to_string(),
            )
        })?;
        Ok(Self {
            docker,
            image: image.to_string(),
        })
    }

    /// Arguments for `docker` and the environment the launcher needs.
    /// Values are never placed on the command line; `-e KEY` reads them from
    /// the launcher's environment.
    pub fn docker_args(&self, command: &str, env: &EnvMap, cwd: &Path) -> (Vec<String>, EnvMap) {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "-v".to_string(),
            format!("{}:{}", cwd.display(), CONTAINER_WORKDIR),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
        ];
        let mut launcher_env = env.clone();

        if let Some(host_path) = env.get(GOOGLE_APPLICATION_CREDENTIALS) {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", host_path, CONTAINER_CREDENTIALS));
            launcher_env.insert(
                GOOGLE_APPLICATION_CREDENTIALS.to_string(),
                CONTAINER_CREDENTIALS.to_string(),
            );
        }
        for key in env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        args.push(self.image.clone());
        args.push("bash".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());
        (args, launcher_env)
    }
}

impl CommandRunner for DockerRunner {
    fn run(&self, command: &str, env: &EnvMap) -> Result<i32> {
        let cwd = std::env::current_dir()?;
        let (args, launcher_env) = self.docker_args(command, env, &cwd);
        debug!(image = %self.image, command, "Launching container");
        let status = Command::new(&self.docker)
            .args(&args)
            .envs(&launcher_env)
            .status()?;
        Ok(exit_code(status))
    }
}

/// The runner selected by the CLI configuration
pub fn runner_for(config: &CliConfig) -> Result<Box<dyn CommandRunner>> {
    match config.app_launch {
        AppLaunch::LocalProcess => Ok(Box::new(LocalProcessRunner::new()?)),
        AppLaunch::DockerContainer => Ok(Box::new(DockerRunner::new(&config.docker_image)?)),
    }
}

/// Run a tool; a non-zero exit becomes `Passthrough` with the same code
pub fn run_tool(runner: &dyn CommandRunner, command: &str, env: &EnvMap) -> Result<()> {
    let code = runner.run(command, env)?;
    if code != 0 {
        info!(code, "Tool exited with non-zero status");
        return Err(TerraError::Passthrough(code));
    }
    Ok(())
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
