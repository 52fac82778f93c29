//! Retry and one-time recovery around remote calls
//!
//! Every call into the workspace service, the identity service or a cloud
//! provider goes through [`RetryingClient`]. Transient failures are retried
//! with exponential backoff; anything else is surfaced immediately with its
//! taxonomy tag.

use std::fmt;
use std::thread;
use std::time::Duration;

use terra_core::{RetryConfig, TerraError};
use tracing::{debug, warn};

/// A failed remote call. `status` is `None` for transport failures and for
/// local failures that kept the call from being made at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
    local: bool,
}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            local: false,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            local: false,
        }
    }

    /// The call could not be attempted, e.g. a required tool is missing.
    /// Never retried; the message is shown to the user as-is.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            local: true,
        }
    }

    /// Server errors, unavailability and dropped connections
    pub fn is_transient(&self) -> bool {
        if self.local {
            return false;
        }
        match self.status {
            None => true,
            Some(status) => matches!(status, 500 | 502 | 503 | 504),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_bad_request(&self) -> bool {
        self.status == Some(400)
    }

    /// Map onto the error taxonomy. `what` names the object the call was about.
    pub fn into_terra(self, what: &str) -> TerraError {
        if self.local {
            return TerraError::UserActionable(self.message);
        }
        match self.status {
            Some(404) => TerraError::NotFound(what.to_string()),
            Some(401) => TerraError::AuthExpired(self.message),
            Some(403) => TerraError::AccessDenied(format!("{}: {}", what, self.message)),
            Some(400) | Some(409) | Some(422) => TerraError::InvalidInput(self.message),
            _ => TerraError::Internal(format!("{}: {}", what, self)),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None if self.local => f.write_str(&self.message),
            None => write!(f, "transport error: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Retry policy without sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Outcome of [`RetryingClient::call_with_recovery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery<T> {
    /// The first attempt succeeded
    Direct(T),
    /// The first attempt failed recoverably; recovery ran and the retry succeeded
    Recovered(T),
}

impl<T> Recovery<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Direct(value) | Self::Recovered(value) => value,
        }
    }

    pub fn was_recovered(&self) -> bool {
        matches!(self, Self::Recovered(_))
    }
}

struct Failure {
    error: RemoteError,
    attempts: u32,
}

impl Failure {
    fn into_terra(self, what: &str) -> TerraError {
        if self.error.is_transient() {
            TerraError::RemoteUnavailable {
                operation: what.to_string(),
                attempts: self.attempts,
                last_error: self.error.to_string(),
            }
        } else {
            self.error.into_terra(what)
        }
    }
}

/// Wraps remote calls with bounded retries
#[derive(Debug, Clone, Default)]
pub struct RetryingClient {
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying transient failures. `what` names the operation in
    /// logs and errors.
    pub fn call<T, F>(&self, what: &str, mut op: F) -> Result<T, TerraError>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        self.attempt(what, &mut op).map_err(|f| f.into_terra(what))
    }

    /// Like [`call`](Self::call), then if the failure matches `is_recoverable`
    /// run `recover` once and retry exactly once more. A failure of the second
    /// round is returned as-is.
    pub fn call_with_recovery<T, F, P, R>(
        &self,
        what: &str,
        mut op: F,
        is_recoverable: P,
        recover: R,
    ) -> Result<Recovery<T>, TerraError>
    where
        F: FnMut() -> Result<T, RemoteError>,
        P: Fn(&RemoteError) -> bool,
        R: FnOnce() -> Result<(), TerraError>,
    {
        match self.attempt(what, &mut op) {
            Ok(value) => Ok(Recovery::Direct(value)),
            Err(failure) if is_recoverable(&failure.error) => {
                warn!(operation = what, error = %failure.error, "Attempting one-time recovery");
                recover()?;
                let value = self.call(what, op)?;
                Ok(Recovery::Recovered(value))
            }
            Err(failure) => Err(failure.into_terra(what)),
        }
    }

    fn attempt<T, F>(&self, what: &str, op: &mut F) -> Result<T, Failure>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(operation = what, attempt, "Remote call");
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        error = %error,
                        "Transient failure, retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    return Err(Failure {
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn client() -> RetryingClient {
        RetryingClient::new(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let calls = Cell::new(0);
        let result = client().call("get workspace", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(RemoteError::http(503, "unavailable"))
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_retries_surface_remote_unavailable() {
        let calls = Cell::new(0);
        let result: Result<(), _> = client().call("list resources", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::transport("connection reset"))
        });

        match result {
            Err(TerraError::RemoteUnavailable {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "list resources");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_non_transient_errors_fail_fast() {
        let calls = Cell::new(0);
        let result: Result<(), _> = client().call("Workspace abc", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::http(404, "no such workspace"))
        });

        assert!(matches!(result, Err(TerraError::NotFound(ref what)) if what == "Workspace abc"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_recovery_runs_once_then_retries() {
        let calls = Cell::new(0);
        let recovered = Cell::new(0);
        let result = client()
            .call_with_recovery(
                "get user",
                || {
                    calls.set(calls.get() + 1);
                    if recovered.get() == 0 {
                        Err(RemoteError::http(404, "not registered"))
                    } else {
                        Ok("subject")
                    }
                },
                RemoteError::is_not_found,
                || {
                    recovered.set(recovered.get() + 1);
                    Ok(())
                },
            )
            .unwrap();

        assert!(result.was_recovered());
        assert_eq!(result.into_inner(), "subject");
        assert_eq!(recovered.get(), 1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_second_failure_is_not_masked() {
        let recovered = Cell::new(0);
        let result: Result<Recovery<()>, _> = client().call_with_recovery(
            "grant role",
            || Err(RemoteError::http(400, "unknown user")),
            RemoteError::is_bad_request,
            || {
                recovered.set(recovered.get() + 1);
                Ok(())
            },
        );

        assert!(matches!(result, Err(TerraError::InvalidInput(ref m)) if m == "unknown user"));
        assert_eq!(recovered.get(), 1);
    }

    #[test]
    fn test_unrecoverable_errors_skip_recovery() {
        let recovered = Cell::new(false);
        let result: Result<Recovery<()>, _> = client().call_with_recovery(
            "get user",
            || Err(RemoteError::http(403, "forbidden")),
            RemoteError::is_not_found,
            || {
                recovered.set(true);
                Ok(())
            },
        );

        assert!(matches!(result, Err(TerraError::AccessDenied(_))));
        assert!(!recovered.get());
    }

    #[test]
    fn test_local_failures_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = client().call("Access to repo", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::local("git not found on PATH"))
        });

        assert!(matches!(
            result,
            Err(TerraError::UserActionable(ref m)) if m == "git not found on PATH"
        ));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    }
}
