//! Machine lifecycle error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable reason attached to a terminal error.
///
/// The reason tells the reconciliation driver that retrying the same
/// specification is pointless and that the machine spec has to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineStatusError {
    /// The combination of settings in the provider spec cannot work.
    InvalidConfiguration,
    /// The spec was changed in a way the provider cannot reconcile.
    UnsupportedChange,
    /// Quota exhausted or no capacity left at the backend.
    InsufficientResources,
    CreateError,
    UpdateError,
    DeleteError,
    /// The instance never showed up as a cluster node.
    JoinClusterTimeoutError,
}

impl MachineStatusError {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatusError::InvalidConfiguration => "InvalidConfiguration",
            MachineStatusError::UnsupportedChange => "UnsupportedChange",
            MachineStatusError::InsufficientResources => "InsufficientResources",
            MachineStatusError::CreateError => "CreateError",
            MachineStatusError::UpdateError => "UpdateError",
            MachineStatusError::DeleteError => "DeleteError",
            MachineStatusError::JoinClusterTimeoutError => "JoinClusterTimeoutError",
        }
    }
}

impl std::fmt::Display for MachineStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to the reconciliation driver.
///
/// `Terminal` must not be retried verbatim, `InstanceNotFound` means no
/// backend resource matches the machine's correlation key, and every other
/// variant is retriable with the driver's own backoff.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{reason}: {message}")]
    Terminal {
        reason: MachineStatusError,
        message: String,
    },

    #[error("instance not found")]
    InstanceNotFound,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config variable error: {0}")]
    ConfigVar(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Machine store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn terminal(reason: MachineStatusError, message: impl Into<String>) -> Self {
        CloudError::Terminal {
            reason,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CloudError::Terminal { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::InstanceNotFound)
    }

    pub fn terminal_reason(&self) -> Option<MachineStatusError> {
        match self {
            CloudError::Terminal { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
