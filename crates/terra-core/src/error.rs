//! Error taxonomy shared by every Terra command
//!
//! Each error carries a [`ErrorKind`] tag that decides how it is reported and
//! which exit code the process ends with.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TerraError>;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Not found, access denied, wrong stewardship type, expired login
    pub const USER_ACTIONABLE: i32 = 1;
    /// Bad input, resource limit exceeded, environment collision
    pub const VALIDATION: i32 = 2;
    /// Bugs and exhausted retries against remote services
    pub const SYSTEM: i32 = 3;
}

/// Classification used for reporting and propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserActionable,
    RemoteUnavailable,
    AuthExpired,
    SystemInternal,
    Passthrough,
}

#[derive(Error, Debug)]
pub enum TerraError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{name} is a {actual} resource, this operation requires a {expected} resource")]
    WrongStewardshipType {
        name: String,
        actual: String,
        expected: String,
    },

    #[error("Total number of resources ({total}) exceeds the CLI limit ({limit})")]
    ResourceLimitExceeded { total: usize, limit: usize },

    #[error("Environment variable {0} conflicts with a variable set by the caller")]
    EnvironmentCollision(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    UserActionable(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RemoteUnavailable {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Credentials expired: {0}. Run `terra auth login` to log in again")]
    AuthExpired(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Command exited with code {0}")]
    Passthrough(i32),
}

impl From<serde_json::Error> for TerraError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TerraError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl TerraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::AccessDenied(_)
            | Self::WrongStewardshipType { .. }
            | Self::ResourceLimitExceeded { .. }
            | Self::EnvironmentCollision(_)
            | Self::InvalidInput(_)
            | Self::UserActionable(_) => ErrorKind::UserActionable,
            Self::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            Self::AuthExpired(_) => ErrorKind::AuthExpired,
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::SystemInternal,
            Self::Passthrough(_) => ErrorKind::Passthrough,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passthrough(code) => *code,
            Self::ResourceLimitExceeded { .. }
            | Self::EnvironmentCollision(_)
            | Self::InvalidInput(_) => exit_codes::VALIDATION,
            _ => match self.kind() {
                ErrorKind::UserActionable | ErrorKind::AuthExpired => exit_codes::USER_ACTIONABLE,
                _ => exit_codes::SYSTEM,
            },
        }
    }

    /// Whether the message can be shown to the user as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UserActionable | ErrorKind::AuthExpired | ErrorKind::Passthrough
        )
    }
}
