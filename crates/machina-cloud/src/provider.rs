//! Machine provider trait definition

use crate::error::{CloudError, Result};
use crate::instance::Instance;
use crate::machine::{Machine, MachineUid, ProviderData, ProviderSpec};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Machine provider abstraction trait
///
/// Every backend (Azure, bare metal, virtualization platforms, ...)
/// implements this trait. The reconciliation driver is polymorphic over it
/// and never talks to a backend directly.
///
/// The driver never runs two operations for the same machine concurrently,
/// but does run operations for different machines in parallel.
#[async_trait]
pub trait MachineProvider: Send + Sync {
    /// Returns the provider tag (e.g., "azure"), matched against
    /// `cloudProvider` in the provider spec
    fn name(&self) -> &str;

    /// Resolve and check the configuration using read-only remote calls
    async fn validate(&self, spec: &ProviderSpec) -> Result<()>;

    /// Fill optional fields with defaults. Pure and idempotent.
    fn add_defaults(&self, spec: ProviderSpec) -> Result<ProviderSpec>;

    /// Create all backend resources of a machine.
    ///
    /// Idempotent and resumable: finalizers are committed before each
    /// resource is created, and every create call is keyed by a stable
    /// name so that a retry after a crash repairs instead of duplicating.
    async fn create(
        &self,
        machine: &mut Machine,
        data: &ProviderData,
        userdata: &str,
    ) -> Result<Instance>;

    /// Tear down the backend resources of a machine.
    ///
    /// Returns `true` once no lifecycle finalizer is left on the machine.
    async fn cleanup(&self, machine: &mut Machine, data: &ProviderData) -> Result<bool>;

    /// Look up the instance by its correlation key.
    ///
    /// Returns [`CloudError::InstanceNotFound`] when nothing matches.
    async fn get(&self, machine: &Machine, data: &ProviderData) -> Result<Instance>;

    /// Render the cloud-controller-manager configuration
    async fn get_cloud_config(&self, spec: &ProviderSpec) -> Result<CloudConfig>;

    /// Re-tag every created resource of the machine with a new UID
    async fn migrate_uid(&self, machine: &Machine, new_uid: &MachineUid) -> Result<()>;

    /// Best-effort labels for machine metrics
    async fn machine_metrics_labels(&self, machine: &Machine) -> MetricsLabels;
}

/// Rendered cloud-controller-manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// Backend specific configuration text
    pub config: String,

    /// Provider name the controller manager expects
    pub provider_name: String,
}

impl CloudConfig {
    pub fn new(config: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            provider_name: provider_name.into(),
        }
    }
}

/// Result of a metrics label lookup
///
/// A failed lookup still yields a (possibly empty) label set; the error is
/// carried along for logging only.
#[derive(Debug, Default)]
pub struct MetricsLabels {
    pub labels: BTreeMap<String, String>,
    pub error: Option<CloudError>,
}

impl MetricsLabels {
    pub fn ok(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            error: None,
        }
    }

    pub fn failed(error: CloudError) -> Self {
        Self {
            labels: BTreeMap::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
