//! Azure provider spec and cloud-controller configuration types

use crate::error::{AzureError, Result};
use machina_cloud::{ConfigVarBool, ConfigVarString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw `cloudProviderSpec` section as written in the machine spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default, rename = "subscriptionID")]
    pub subscription_id: ConfigVarString,
    #[serde(default, rename = "tenantID")]
    pub tenant_id: ConfigVarString,
    #[serde(default, rename = "clientID")]
    pub client_id: ConfigVarString,
    #[serde(default)]
    pub client_secret: ConfigVarString,

    #[serde(default)]
    pub location: ConfigVarString,
    #[serde(default)]
    pub resource_group: ConfigVarString,
    #[serde(default)]
    pub vnet_resource_group: ConfigVarString,
    #[serde(default)]
    pub vm_size: ConfigVarString,
    #[serde(default)]
    pub vnet_name: ConfigVarString,
    #[serde(default)]
    pub subnet_name: ConfigVarString,
    #[serde(default)]
    pub load_balancer_sku: ConfigVarString,
    #[serde(default)]
    pub route_table_name: ConfigVarString,
    #[serde(default)]
    pub availability_set: ConfigVarString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_availability_set: Option<bool>,
    #[serde(default)]
    pub security_group_name: ConfigVarString,

    #[serde(default, rename = "imageID")]
    pub image_id: ConfigVarString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_plan: Option<ImagePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<ImageReference>,

    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub os_disk_size: i32,
    #[serde(default, rename = "osDiskSKU", skip_serializing_if = "Option::is_none")]
    pub os_disk_sku: Option<String>,
    #[serde(default)]
    pub data_disk_size: i32,
    #[serde(default, rename = "dataDiskSKU", skip_serializing_if = "Option::is_none")]
    pub data_disk_sku: Option<String>,

    #[serde(default, rename = "assignPublicIP")]
    pub assign_public_ip: ConfigVarBool,
}

impl RawConfig {
    /// Strictly parses the provider-owned section; unknown fields are rejected
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| AzureError::InvalidConfig(format!("failed to parse cloudProviderSpec: {}", e)))
    }
}

/// Marketplace purchase plan of an image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub product: String,
}

impl ImagePlan {
    pub fn new(name: &str, publisher: &str, product: &str) -> Self {
        Self {
            name: name.to_string(),
            publisher: publisher.to_string(),
            product: product.to_string(),
        }
    }
}

/// Marketplace image coordinates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub offer: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub version: String,
}

impl ImageReference {
    pub fn new(publisher: &str, offer: &str, sku: &str, version: &str) -> Self {
        Self {
            publisher: publisher.to_string(),
            offer: offer.to_string(),
            sku: sku.to_string(),
            version: version.to_string(),
        }
    }
}

/// Configuration file of the Azure cloud-controller-manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCloudConfig {
    pub cloud: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub aad_client_id: String,
    pub aad_client_secret: String,

    pub resource_group: String,
    pub location: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub route_table_name: String,
    pub security_group_name: String,
    pub primary_availability_set_name: String,
    pub vnet_resource_group: String,
    pub use_instance_metadata: bool,
    pub load_balancer_sku: String,
}

impl AzureCloudConfig {
    pub const PUBLIC_CLOUD: &'static str = "AZUREPUBLICCLOUD";

    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
