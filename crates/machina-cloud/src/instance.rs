//! Normalized view of a provisioned compute instance

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of an instance, as every provider must report it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Backend reported something that does not map onto the other states
    #[default]
    Unknown,
    /// Instance is being provisioned or booting
    Creating,
    /// Instance is up
    Running,
    /// Instance is being torn down
    Deleting,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Unknown => write!(f, "unknown"),
            InstanceStatus::Creating => write!(f, "creating"),
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Deleting => write!(f, "deleting"),
        }
    }
}

/// Reachability class of an instance address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressClass {
    #[serde(rename = "InternalIP")]
    InternalIp,
    #[serde(rename = "ExternalIP")]
    ExternalIp,
}

/// Instance as observed at the backend.
///
/// Never persisted, always re-derived on `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider-specific instance ID
    pub id: String,

    /// Backend name of the instance
    pub name: String,

    /// IP address to address class
    pub addresses: BTreeMap<String, AddressClass>,

    pub status: InstanceStatus,
}

impl Instance {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            addresses: BTreeMap::new(),
            status: InstanceStatus::Unknown,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_addresses(mut self, addresses: BTreeMap<String, AddressClass>) -> Self {
        self.addresses.extend(addresses);
        self
    }

    pub fn external_addresses(&self) -> Vec<&str> {
        self.addresses_of(AddressClass::ExternalIp)
    }

    pub fn internal_addresses(&self) -> Vec<&str> {
        self.addresses_of(AddressClass::InternalIp)
    }

    fn addresses_of(&self, class: AddressClass) -> Vec<&str> {
        self.addresses
            .iter()
            .filter(|(_, c)| **c == class)
            .map(|(address, _)| address.as_str())
            .collect()
    }
}
