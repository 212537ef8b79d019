//! Azure provider for Machina
//!
//! This crate implements the MachineProvider trait for Microsoft Azure,
//! enabling Machina to run machines as Azure virtual machines.
//!
//! # Features
//!
//! - Public IPv4/IPv6 addresses, network interfaces, VMs and managed disks
//! - Resumable create and cleanup driven by the finalizer ledger
//! - Disk SKU validation against cached VM SKU capabilities
//! - Cloud-controller-manager configuration rendering
//!
//! # Requirements
//!
//! - A service principal with access to the target subscription, either in
//!   the machine spec or in `AZURE_SUBSCRIPTION_ID`, `AZURE_TENANT_ID`,
//!   `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`
//!
//! # Example
//!
//! ```ignore
//! use machina_cloud::{ConfigVarResolver, LookupCache, MachineProvider, DEFAULT_TTL};
//! use machina_cloud_azure::AzureProvider;
//! use std::sync::Arc;
//!
//! let provider = AzureProvider::with_arm(
//!     ConfigVarResolver::without_secrets(),
//!     Arc::new(LookupCache::new(DEFAULT_TTL)),
//! )?;
//!
//! provider.validate(&machine.provider_spec).await?;
//! let instance = provider.create(&mut machine, &data, userdata).await?;
//! ```

pub mod api;
pub mod arm;
pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod provider;
pub mod sku;
pub mod status;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use api::{AzureApi, AzureClientFactory};
pub use arm::{ArmClient, ArmClientFactory, ArmOptions};
pub use config::{Config, Credentials};
pub use error::{AzureError, Result};
pub use provider::{AzureProvider, PROVIDER_NAME};
pub use sku::SkuCache;
pub use types::{AzureCloudConfig, ImagePlan, ImageReference, RawConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeAzure;
