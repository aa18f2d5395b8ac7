use std::fmt;

use crate::endpoint::Endpoint;

/// A configuration parsing/validation error.
///
/// Kept as a thin string wrapper rather than a `thiserror` enum:
/// configuration failures are only ever displayed to an operator, never
/// matched on programmatically.
#[derive(Clone, Debug)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

impl From<String> for ConfigError {
    fn from(s: String) -> Self {
        ConfigError(s)
    }
}

impl<'a> From<&'a str> for ConfigError {
    fn from(s: &'a str) -> Self {
        ConfigError(s.to_owned())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError(format!("{}", e))
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError(format!("{}", e))
    }
}

/// Runtime error kinds: each one corresponds to a named failure mode the
/// message center recovers from locally or surfaces as a rejection.
#[derive(thiserror::Error, Debug, Clone)]
pub enum MessageCenterError {
    /// The live-gateway set was empty at selection time.
    #[error("No gateways available")]
    NoGatewayAvailable,

    /// Dialing `endpoint` failed, or a prior failure is still within the
    /// cooldown window.
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: Endpoint, reason: String },

    /// The connection was torn down by `Abort` or by manager shutdown.
    #[error("connection to {endpoint} aborted: {reason}")]
    ConnectionAborted { endpoint: Endpoint, reason: String },

    /// A connection became invalid between selection and `Send`.
    #[error("lost race sending to {endpoint}: connection no longer valid")]
    RaceLost { endpoint: Endpoint },

    /// The message center is not in the `Running` state.
    #[error("message center is not running")]
    NotRunning,

    /// `UpdateClientId` was called on an identity kind that cannot be
    /// transitioned.
    #[error("invalid state: {0}")]
    InvalidState(String),
}
