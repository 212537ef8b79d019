//! Disk SKU validation against the VM SKU
//!
//! VM SKU lookups list every SKU of a location, which is slow and the same
//! for every machine of a deployment, so results go through a shared
//! [`LookupCache`].

use crate::api::AzureApi;
use crate::config::Config;
use crate::error::{AzureError, Result};
use crate::models::{Capability, ResourceSku};
use machina_cloud::LookupCache;
use tracing::debug;

pub const SKU_STANDARD_LRS: &str = "Standard_LRS";
pub const SKU_STANDARD_SSD_LRS: &str = "StandardSSD_LRS";
pub const SKU_PREMIUM_LRS: &str = "Premium_LRS";
pub const SKU_ULTRA_SSD_LRS: &str = "UltraSSD_LRS";

pub const OS_DISK_SKUS: &[&str] = &[SKU_STANDARD_LRS, SKU_STANDARD_SSD_LRS, SKU_PREMIUM_LRS];
pub const DATA_DISK_SKUS: &[&str] = &[
    SKU_STANDARD_LRS,
    SKU_STANDARD_SSD_LRS,
    SKU_PREMIUM_LRS,
    SKU_ULTRA_SSD_LRS,
];

const CAPABILITY_PREMIUM_IO: &str = "PremiumIO";
const CAPABILITY_ULTRA_SSD: &str = "UltraSSDAvailable";
const CAPABILITY_TRUE: &str = "True";

const RESOURCE_TYPE_VM: &str = "virtualMachines";

/// Cache key of a VM SKU lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkuKey {
    pub subscription_id: String,
    pub location: String,
    pub vm_size: String,
}

impl SkuKey {
    pub fn for_config(config: &Config) -> Self {
        Self {
            subscription_id: config.subscription_id.clone(),
            location: config.location.clone(),
            vm_size: config.vm_size.clone(),
        }
    }
}

pub type SkuCache = LookupCache<SkuKey, ResourceSku>;

/// Looks up the SKU of the configured VM size, served from `cache` when fresh
pub async fn vm_sku(api: &dyn AzureApi, cache: &SkuCache, config: &Config) -> Result<ResourceSku> {
    let key = SkuKey::for_config(config);
    cache.purge_expired();
    cache
        .get_or_try_fetch(key.clone(), || async move {
            debug!(location = %key.location, vm_size = %key.vm_size, "Fetching VM SKU");
            api.list_vm_skus(&key.location)
                .await?
                .into_iter()
                .find(|sku| {
                    sku.name.as_deref() == Some(key.vm_size.as_str())
                        && sku
                            .resource_type
                            .as_deref()
                            .is_none_or(|t| t == RESOURCE_TYPE_VM)
                })
                .ok_or_else(|| {
                    AzureError::InvalidConfig(format!(
                        "VM size '{}' is not available in location '{}'",
                        key.vm_size, key.location
                    ))
                })
        })
        .await
}

/// Checks the configured OS and data disk SKUs
pub async fn validate_disk_skus(api: &dyn AzureApi, cache: &SkuCache, config: &Config) -> Result<()> {
    if config.os_disk_sku.is_none() && config.data_disk_sku.is_none() {
        return Ok(());
    }

    let sku = vm_sku(api, cache, config)
        .await
        .map_err(|e| e.context("failed to get VM SKU"))?;

    if let Some(os_disk_sku) = &config.os_disk_sku {
        if !OS_DISK_SKUS.contains(&os_disk_sku.as_str()) {
            return Err(AzureError::InvalidConfig(format!(
                "invalid OS disk SKU '{}'",
                os_disk_sku
            )));
        }
        supports_disk_sku(&sku, os_disk_sku, &config.zones)?;
    }

    if let Some(data_disk_sku) = &config.data_disk_sku {
        if !DATA_DISK_SKUS.contains(&data_disk_sku.as_str()) {
            return Err(AzureError::InvalidConfig(format!(
                "invalid data disk SKU '{}'",
                data_disk_sku
            )));
        }

        let in_availability_set =
            config.assign_availability_set == Some(true) || !config.availability_set.is_empty();
        if data_disk_sku == SKU_ULTRA_SSD_LRS && in_availability_set {
            return Err(AzureError::InvalidConfig(format!(
                "data disk SKU '{}' does not support availability sets",
                data_disk_sku
            )));
        }
        supports_disk_sku(&sku, data_disk_sku, &config.zones)?;
    }

    Ok(())
}

/// Checks one disk SKU against the VM SKU's capabilities
pub fn supports_disk_sku(vm_sku: &ResourceSku, disk_sku: &str, zones: &[String]) -> Result<()> {
    let (Some(name), Some(capabilities)) = (&vm_sku.name, &vm_sku.capabilities) else {
        return Err(AzureError::InvalidConfig("invalid VM SKU object".to_string()));
    };

    match disk_sku {
        SKU_PREMIUM_LRS => {
            if !has_capability(capabilities, CAPABILITY_PREMIUM_IO) {
                return Err(unsupported(name, disk_sku));
            }
        }
        SKU_ULTRA_SSD_LRS => match vm_sku.location_info.first() {
            None => {
                if !has_capability(capabilities, CAPABILITY_ULTRA_SSD) {
                    return Err(unsupported(name, disk_sku));
                }
            }
            Some(location) => {
                for zone in zones {
                    let supported = location.zone_details.iter().any(|details| {
                        details.name.contains(zone)
                            && has_capability(&details.capabilities, CAPABILITY_ULTRA_SSD)
                    });
                    if !supported {
                        return Err(AzureError::InvalidConfig(format!(
                            "VM SKU '{}' does not support disk SKU '{}' in zone '{}'",
                            name, disk_sku, zone
                        )));
                    }
                }
            }
        },
        _ => {}
    }

    Ok(())
}

fn has_capability(capabilities: &[Capability], name: &str) -> bool {
    capabilities
        .iter()
        .any(|c| c.name == name && c.value == CAPABILITY_TRUE)
}

fn unsupported(vm_sku: &str, disk_sku: &str) -> AzureError {
    AzureError::InvalidConfig(format!(
        "VM SKU '{}' does not support disk SKU '{}'",
        vm_sku, disk_sku
    ))
}
