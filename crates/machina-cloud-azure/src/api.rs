//! Azure backend abstraction
//!
//! The provider only talks to Azure through [`AzureApi`]. The production
//! implementation is the ARM REST client in [`crate::arm`]; tests use the
//! in-memory backend from `fake`.
//!
//! Every create call is a create-or-update keyed by resource name and
//! returns once the backend reports the operation finished. Deletes of
//! absent resources succeed.

use crate::config::Credentials;
use crate::error::Result;
use crate::models::{
    Disk, ImageReference, InstanceView, NetworkInterface, PublicIpAddress, ResourceSku, Subnet,
    Tags, VirtualMachine, VirtualNetwork,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AzureApi: Send + Sync {
    // Public IP addresses

    async fn create_or_update_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<PublicIpAddress>;

    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<PublicIpAddress>;

    async fn list_public_ips(&self, resource_group: &str) -> Result<Vec<PublicIpAddress>>;

    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()>;

    // Network interfaces

    async fn create_or_update_nic(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<NetworkInterface>;

    async fn get_nic(&self, resource_group: &str, name: &str) -> Result<NetworkInterface>;

    async fn list_nics(&self, resource_group: &str) -> Result<Vec<NetworkInterface>>;

    async fn delete_nic(&self, resource_group: &str, name: &str) -> Result<()>;

    // Virtual machines

    async fn create_or_update_vm(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine>;

    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VirtualMachine>;

    /// All virtual machines of the subscription
    async fn list_all_vms(&self) -> Result<Vec<VirtualMachine>>;

    async fn list_vms(&self, resource_group: &str) -> Result<Vec<VirtualMachine>>;

    async fn instance_view(&self, resource_group: &str, name: &str) -> Result<InstanceView>;

    /// Replaces the tags of a VM, leaving every other property untouched
    async fn update_vm_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()>;

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<()>;

    // Disks

    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>>;

    async fn update_disk_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()>;

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()>;

    // Lookups used by validation

    async fn get_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualNetwork>;

    async fn get_subnet(&self, resource_group: &str, vnet: &str, name: &str) -> Result<Subnet>;

    /// VM resource SKUs offered in a location
    async fn list_vm_skus(&self, location: &str) -> Result<Vec<ResourceSku>>;

    /// Fails with `NotFound` unless the image can be booted in `location`
    async fn check_image(&self, location: &str, image: &ImageReference) -> Result<()>;
}

/// Builds backend clients for a set of credentials
pub trait AzureClientFactory: Send + Sync {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn AzureApi>>;
}
