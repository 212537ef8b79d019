//! Machina Cloud
//!
//! This crate defines the provider-independent machine lifecycle contract:
//! the operation set every backend implements, the finalizer ledger that
//! makes create and cleanup resumable, and the error taxonomy the
//! reconciliation driver acts upon.
//!
//! # Supported Providers
//!
//! - **Azure**: VMs, NICs, public IPs, managed disks (via ARM REST API)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Reconciliation driver               │
//! │        (Machine records, finalizer updates)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 machina-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait MachineProvider { ... }            │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Finalizer   │  │  ConfigVar   │            │
//! │  │   Ledger     │  │  Resolver    │            │
//! │  └──────────────┘  └──────────────┘            │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Lookup Cache │  │   Registry   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │     azure     │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod cache;
pub mod config_var;
pub mod error;
pub mod finalizer;
pub mod instance;
pub mod kubeconfig;
pub mod machine;
pub mod provider;
pub mod provider_config;
pub mod registry;

// Re-exports
pub use cache::{DEFAULT_TTL, LookupCache};
pub use config_var::{
    ConfigVarBool, ConfigVarResolver, ConfigVarString, KeyRef, SecretSource, StaticSecretSource,
};
pub use error::{CloudError, MachineStatusError, Result};
pub use finalizer::FinalizerLedger;
pub use instance::{AddressClass, Instance, InstanceStatus};
pub use kubeconfig::{Kubeconfig, KubeconfigError};
pub use machine::{Machine, MachineMutator, MachineStore, MachineUid, ProviderData, ProviderSpec};
pub use provider::{CloudConfig, MachineProvider, MetricsLabels};
pub use provider_config::{IpFamily, NetworkConfig, OperatingSystem, ProviderConfig};
pub use registry::ProviderRegistry;

#[cfg(any(test, feature = "test-utils"))]
pub use machine::{FinalizerChange, MemoryMachineStore};
