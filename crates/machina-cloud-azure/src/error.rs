//! Azure provider error types

use machina_cloud::{CloudError, MachineStatusError};
use thiserror::Error;

/// ARM error codes that no retry of the same spec will ever fix
const INVALID_CONFIGURATION_CODES: &[&str] = &[
    "InvalidParameter",
    "InvalidResourceReference",
    "ImageNotFound",
    "PlatformImageNotFound",
    "SkuNotAvailable",
    "InvalidTemplateDeployment",
];

const INSUFFICIENT_RESOURCES_CODES: &[&str] = &[
    "QuotaExceeded",
    "OperationNotAllowed",
    "AllocationFailed",
    "ZonalAllocationFailed",
];

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Azure API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl AzureError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        AzureError::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AzureError::NotFound(_))
    }

    /// Config variable or secret lookups that may succeed on a later attempt
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            AzureError::Cloud(CloudError::ConfigVar(_) | CloudError::Api(_) | CloudError::Store(_))
        )
    }

    /// ARM error code, if the backend returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            AzureError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Prefixes the message with what was being attempted
    pub fn context(self, what: impl std::fmt::Display) -> Self {
        match self {
            AzureError::NotFound(msg) => AzureError::NotFound(format!("{}: {}", what, msg)),
            AzureError::Api {
                status,
                code,
                message,
            } => AzureError::Api {
                status,
                code,
                message: format!("{}: {}", what, message),
            },
            AzureError::Timeout(msg) => AzureError::Timeout(format!("{}: {}", what, msg)),
            AzureError::InvalidConfig(msg) => {
                AzureError::InvalidConfig(format!("{}: {}", what, msg))
            }
            other => other,
        }
    }

    /// Classifies a failed resource creation.
    ///
    /// ARM rejections of the machine spec become terminal, everything else
    /// stays retriable.
    pub fn into_create_error(self) -> CloudError {
        let reason = match self.code() {
            Some(code) if INVALID_CONFIGURATION_CODES.contains(&code) => {
                Some(MachineStatusError::InvalidConfiguration)
            }
            Some(code) if INSUFFICIENT_RESOURCES_CODES.contains(&code) => {
                Some(MachineStatusError::InsufficientResources)
            }
            _ => None,
        };

        match reason {
            Some(reason) => CloudError::terminal(reason, self.to_string()),
            None => self.into(),
        }
    }
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::Cloud(inner) => inner,
            AzureError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
            other => CloudError::Api(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_error_classification() {
        let err = AzureError::api(400, "InvalidParameter", "osDisk.diskSizeGB is too small");
        let cloud = err.into_create_error();
        assert_eq!(
            cloud.terminal_reason(),
            Some(MachineStatusError::InvalidConfiguration)
        );

        let err = AzureError::api(409, "QuotaExceeded", "cores quota exhausted");
        assert_eq!(
            err.into_create_error().terminal_reason(),
            Some(MachineStatusError::InsufficientResources)
        );

        let err = AzureError::api(503, "ServiceUnavailable", "try again");
        let cloud = err.into_create_error();
        assert!(!cloud.is_terminal());
        assert!(matches!(cloud, CloudError::Api(_)));
    }

    #[test]
    fn test_not_found_is_not_instance_not_found() {
        let cloud: CloudError = AzureError::NotFound("nic".to_string()).into();
        assert!(!cloud.is_not_found());
        assert!(matches!(cloud, CloudError::Api(_)));
    }

    #[test]
    fn test_conversion_keeps_config_and_cloud_errors() {
        let cloud: CloudError = AzureError::InvalidConfig("vmSize is missing".into()).into();
        assert!(matches!(cloud, CloudError::InvalidConfig(msg) if msg == "vmSize is missing"));

        let cloud: CloudError = AzureError::Cloud(CloudError::InstanceNotFound).into();
        assert!(cloud.is_not_found());
    }

    #[test]
    fn test_lookup_failures() {
        let missing = AzureError::Cloud(CloudError::ConfigVar(
            "secret kube-system/azure[k] not found".into(),
        ));
        assert!(missing.is_lookup_failure());
        assert!(AzureError::Cloud(CloudError::Store("timeout".into())).is_lookup_failure());

        let unparsable = AzureError::InvalidConfig("failed to parse cloudProviderSpec".into());
        assert!(!unparsable.is_lookup_failure());
        let invalid = AzureError::Cloud(CloudError::InvalidConfig("bad ipFamily".into()));
        assert!(!invalid.is_lookup_failure());
    }

    #[test]
    fn test_context_prefixes_message() {
        let err = AzureError::api(500, "InternalError", "boom").context("failed to create NIC");
        assert_eq!(
            err.to_string(),
            "Azure API error (500) InternalError: failed to create NIC: boom"
        );
    }
}
