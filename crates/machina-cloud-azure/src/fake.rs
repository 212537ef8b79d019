//! In-memory Azure backend for tests
//!
//! Behaves like ARM where the provider depends on it: creates are
//! create-or-update by name, deleting an absent resource succeeds, and a
//! resource still referenced by another one refuses deletion. Deleting a VM
//! leaves its managed disks behind.
//!
//! Every call is appended to a call log before fault injection runs, so a
//! failed call shows up in the log as well.

use crate::api::{AzureApi, AzureClientFactory};
use crate::config::Credentials;
use crate::error::{AzureError, Result};
use crate::models::{
    Disk, IP_VERSION_V6, ImageReference, InstanceView, NetworkInterface, PublicIpAddress,
    ResourceSku, Subnet, Tags, VirtualMachine, VirtualNetwork,
};
use crate::naming;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const FAKE_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

type Key = (String, String);

fn key(resource_group: &str, name: &str) -> Key {
    (resource_group.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    public_ips: BTreeMap<Key, PublicIpAddress>,
    nics: BTreeMap<Key, NetworkInterface>,
    vms: BTreeMap<Key, VirtualMachine>,
    views: BTreeMap<Key, InstanceView>,
    disks: BTreeMap<Key, Disk>,
    vnets: BTreeSet<Key>,
    subnets: BTreeSet<(String, String, String)>,
    skus: Vec<ResourceSku>,
    reject_images: bool,

    calls: Vec<String>,
    faults: HashMap<String, AzureError>,
    sku_list_calls: usize,
    clients: Vec<Credentials>,
    next_address: u32,
}

impl State {
    fn call(&mut self, op: &str, target: &str) -> Result<()> {
        if target.is_empty() {
            self.calls.push(op.to_string());
        } else {
            self.calls.push(format!("{} {}", op, target));
        }
        match self.faults.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_address(&mut self) -> u32 {
        self.next_address += 1;
        self.next_address
    }

    fn nic_in_use(&self, resource_group: &str, nic: &str) -> Option<&str> {
        self.vms.values().find_map(|vm| {
            let profile = vm.properties.network_profile.as_ref()?;
            profile
                .network_interfaces
                .iter()
                .filter_map(|r| r.id.as_deref())
                .any(|id| refers_to(id, resource_group, nic))
                .then(|| vm.name.as_deref().unwrap_or_default())
        })
    }

    fn public_ip_in_use(&self, resource_group: &str, address: &str) -> Option<&str> {
        self.nics.values().find_map(|nic| {
            nic.properties
                .ip_configurations
                .iter()
                .filter_map(|c| c.properties.public_ip_address.as_ref()?.id.as_deref())
                .any(|id| refers_to(id, resource_group, address))
                .then(|| nic.name.as_deref().unwrap_or_default())
        })
    }
}

/// Shared in-memory Azure subscription. Clones share state.
#[derive(Clone, Default)]
pub struct FakeAzure {
    state: Arc<Mutex<State>>,
}

impl FakeAzure {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a virtual network with one subnet
    pub fn with_subnet(self, resource_group: &str, vnet: &str, subnet: &str) -> Self {
        {
            let mut state = self.state();
            state.vnets.insert(key(resource_group, vnet));
            state.subnets.insert((
                resource_group.to_string(),
                vnet.to_string(),
                subnet.to_string(),
            ));
        }
        self
    }

    pub fn with_vm_sku(self, sku: ResourceSku) -> Self {
        self.state().skus.push(sku);
        self
    }

    /// Makes every image lookup fail with `NotFound`
    pub fn reject_images(&self) {
        self.state().reject_images = true;
    }

    /// Fails the next call of `op` (e.g. `"delete_nic"`) with `err`
    pub fn fail_next(&self, op: &str, err: AzureError) {
        self.state().faults.insert(op.to_string(), err);
    }

    pub fn set_instance_view(&self, resource_group: &str, name: &str, view: InstanceView) {
        self.state().views.insert(key(resource_group, name), view);
    }

    /// Reports the VM as provisioned and running
    pub fn set_running(&self, resource_group: &str, name: &str) {
        self.set_instance_view(
            resource_group,
            name,
            InstanceView::with_codes(&["ProvisioningState/succeeded", "PowerState/running"]),
        );
    }

    /// Calls in call order, formatted as `"<op> <name>"`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Mutating calls only
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                ["put_", "delete_", "tag_"]
                    .iter()
                    .any(|prefix| c.starts_with(prefix))
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn sku_list_calls(&self) -> usize {
        self.state().sku_list_calls
    }

    /// Credentials every client was built with
    pub fn clients(&self) -> Vec<Credentials> {
        self.state().clients.clone()
    }

    pub fn public_ip_names(&self) -> Vec<String> {
        self.state().public_ips.keys().map(|(_, n)| n.clone()).collect()
    }

    pub fn nic_names(&self) -> Vec<String> {
        self.state().nics.keys().map(|(_, n)| n.clone()).collect()
    }

    pub fn vm_names(&self) -> Vec<String> {
        self.state().vms.keys().map(|(_, n)| n.clone()).collect()
    }

    pub fn disk_names(&self) -> Vec<String> {
        self.state().disks.keys().map(|(_, n)| n.clone()).collect()
    }

    /// True when nothing but networks and SKUs is left
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.public_ips.is_empty()
            && state.nics.is_empty()
            && state.vms.is_empty()
            && state.disks.is_empty()
    }
}

/// Matches ARM ids by resource group and name, ignoring the subscription
fn refers_to(id: &str, resource_group: &str, name: &str) -> bool {
    naming::name_from_id(id) == name
        && id
            .to_ascii_lowercase()
            .contains(&format!("/resourcegroups/{}/", resource_group.to_ascii_lowercase()))
}

fn not_found(kind: &str, name: &str) -> AzureError {
    AzureError::NotFound(format!("{} {:?} not found", kind, name))
}

fn in_use(code: &str, what: &str, user: &str) -> AzureError {
    AzureError::api(
        400,
        code,
        format!("{} is in use by {:?} and cannot be deleted", what, user),
    )
}

fn invalid_reference(id: &str) -> AzureError {
    AzureError::api(
        400,
        "InvalidResourceReference",
        format!("resource {} referenced by the request was not found", id),
    )
}

#[async_trait]
impl AzureApi for FakeAzure {
    async fn create_or_update_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<PublicIpAddress> {
        let mut state = self.state();
        state.call("put_public_ip", name)?;

        let k = key(resource_group, name);
        let ip_address = match state.public_ips.get(&k) {
            Some(existing) => existing.properties.ip_address.clone(),
            None => {
                let n = state.next_address();
                Some(if address.version() == IP_VERSION_V6 {
                    format!("2001:db8::{:x}", n)
                } else {
                    format!("20.0.0.{}", n)
                })
            }
        };

        let mut stored = address.clone();
        stored.id = Some(naming::public_ip_id(FAKE_SUBSCRIPTION, resource_group, name));
        stored.name = Some(name.to_string());
        stored.properties.ip_address = ip_address;
        stored.properties.provisioning_state = Some("Succeeded".to_string());
        state.public_ips.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<PublicIpAddress> {
        let mut state = self.state();
        state.call("get_public_ip", name)?;
        state
            .public_ips
            .get(&key(resource_group, name))
            .cloned()
            .ok_or_else(|| not_found("public IP", name))
    }

    async fn list_public_ips(&self, resource_group: &str) -> Result<Vec<PublicIpAddress>> {
        let mut state = self.state();
        state.call("list_public_ips", resource_group)?;
        Ok(state
            .public_ips
            .iter()
            .filter(|((rg, _), _)| rg == resource_group)
            .map(|(_, address)| address.clone())
            .collect())
    }

    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.call("delete_public_ip", name)?;
        if let Some(nic) = state.public_ip_in_use(resource_group, name) {
            return Err(in_use("PublicIPAddressInUse", name, nic));
        }
        state.public_ips.remove(&key(resource_group, name));
        Ok(())
    }

    async fn create_or_update_nic(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<NetworkInterface> {
        let mut state = self.state();
        state.call("put_nic", name)?;

        for config in &nic.properties.ip_configurations {
            let Some(id) = config
                .properties
                .public_ip_address
                .as_ref()
                .and_then(|r| r.id.as_deref())
            else {
                continue;
            };
            if !state
                .public_ips
                .contains_key(&key(resource_group, naming::name_from_id(id)))
            {
                return Err(invalid_reference(id));
            }
        }

        let k = key(resource_group, name);
        let previous: BTreeMap<String, String> = state
            .nics
            .get(&k)
            .map(|existing| {
                existing
                    .properties
                    .ip_configurations
                    .iter()
                    .filter_map(|c| Some((c.name.clone()?, c.properties.private_ip_address.clone()?)))
                    .collect()
            })
            .unwrap_or_default();

        let mut stored = nic.clone();
        stored.id = Some(naming::nic_id(FAKE_SUBSCRIPTION, resource_group, name));
        stored.name = Some(name.to_string());
        for config in &mut stored.properties.ip_configurations {
            let reused = config.name.as_ref().and_then(|n| previous.get(n)).cloned();
            let address = match reused {
                Some(address) => address,
                None => {
                    let n = state.next_address();
                    if config.properties.private_ip_address_version.as_deref() == Some(IP_VERSION_V6)
                    {
                        format!("fd00::{:x}", n)
                    } else {
                        format!("10.0.0.{}", n)
                    }
                }
            };
            config.properties.private_ip_address = Some(address);
        }
        stored.properties.provisioning_state = Some("Succeeded".to_string());
        state.nics.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get_nic(&self, resource_group: &str, name: &str) -> Result<NetworkInterface> {
        let mut state = self.state();
        state.call("get_nic", name)?;
        state
            .nics
            .get(&key(resource_group, name))
            .cloned()
            .ok_or_else(|| not_found("network interface", name))
    }

    async fn list_nics(&self, resource_group: &str) -> Result<Vec<NetworkInterface>> {
        let mut state = self.state();
        state.call("list_nics", resource_group)?;
        Ok(state
            .nics
            .iter()
            .filter(|((rg, _), _)| rg == resource_group)
            .map(|(_, nic)| nic.clone())
            .collect())
    }

    async fn delete_nic(&self, resource_group: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.call("delete_nic", name)?;
        if let Some(vm) = state.nic_in_use(resource_group, name) {
            return Err(in_use("NicInUse", name, vm));
        }
        state.nics.remove(&key(resource_group, name));
        Ok(())
    }

    async fn create_or_update_vm(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine> {
        let mut state = self.state();
        state.call("put_vm", name)?;

        let interfaces = vm
            .properties
            .network_profile
            .as_ref()
            .map(|p| p.network_interfaces.as_slice())
            .unwrap_or_default();
        for interface in interfaces {
            let id = interface.id.as_deref().unwrap_or_default();
            if !state
                .nics
                .contains_key(&key(resource_group, naming::name_from_id(id)))
            {
                return Err(invalid_reference(id));
            }
        }

        let k = key(resource_group, name);
        let vm_id = naming::vm_id(FAKE_SUBSCRIPTION, resource_group, name);
        let mut stored = vm.clone();
        stored.id = Some(vm_id.clone());
        stored.name = Some(name.to_string());
        stored.properties.provisioning_state = Some("Succeeded".to_string());
        stored.properties.vm_id = Some(format!("vm-{}", name));

        let mut disk_names = vec![format!("{}_OsDisk_1", name)];
        if let Some(storage) = &vm.properties.storage_profile {
            disk_names.extend(
                storage
                    .data_disks
                    .iter()
                    .map(|d| format!("{}_DataDisk_{}", name, d.lun)),
            );
        }
        for disk_name in disk_names {
            state
                .disks
                .entry(key(resource_group, &disk_name))
                .or_insert_with(|| Disk {
                    id: Some(naming::disk_id(FAKE_SUBSCRIPTION, resource_group, &disk_name)),
                    name: Some(disk_name.clone()),
                    location: vm.location.clone(),
                    tags: vm.tags.clone(),
                    managed_by: Some(vm_id.clone()),
                });
        }

        state
            .views
            .entry(k.clone())
            .or_insert_with(|| InstanceView::with_codes(&["ProvisioningState/creating"]));
        state.vms.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        let mut state = self.state();
        state.call("get_vm", name)?;
        state
            .vms
            .get(&key(resource_group, name))
            .cloned()
            .ok_or_else(|| not_found("virtual machine", name))
    }

    async fn list_all_vms(&self) -> Result<Vec<VirtualMachine>> {
        let mut state = self.state();
        state.call("list_all_vms", "")?;
        Ok(state.vms.values().cloned().collect())
    }

    async fn list_vms(&self, resource_group: &str) -> Result<Vec<VirtualMachine>> {
        let mut state = self.state();
        state.call("list_vms", resource_group)?;
        Ok(state
            .vms
            .iter()
            .filter(|((rg, _), _)| rg == resource_group)
            .map(|(_, vm)| vm.clone())
            .collect())
    }

    async fn instance_view(&self, resource_group: &str, name: &str) -> Result<InstanceView> {
        let mut state = self.state();
        state.call("instance_view", name)?;
        let k = key(resource_group, name);
        if !state.vms.contains_key(&k) {
            return Err(not_found("virtual machine", name));
        }
        Ok(state.views.get(&k).cloned().unwrap_or_default())
    }

    async fn update_vm_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state();
        state.call("tag_vm", name)?;
        let vm = state
            .vms
            .get_mut(&key(resource_group, name))
            .ok_or_else(|| not_found("virtual machine", name))?;
        vm.tags = tags.clone();
        Ok(())
    }

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.call("delete_vm", name)?;
        let k = key(resource_group, name);
        if state.vms.remove(&k).is_some() {
            let vm_id = naming::vm_id(FAKE_SUBSCRIPTION, resource_group, name);
            for disk in state.disks.values_mut() {
                if disk.managed_by.as_deref() == Some(vm_id.as_str()) {
                    disk.managed_by = None;
                }
            }
        }
        state.views.remove(&k);
        Ok(())
    }

    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>> {
        let mut state = self.state();
        state.call("list_disks", resource_group)?;
        Ok(state
            .disks
            .iter()
            .filter(|((rg, _), _)| rg == resource_group)
            .map(|(_, disk)| disk.clone())
            .collect())
    }

    async fn update_disk_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state();
        state.call("tag_disk", name)?;
        let disk = state
            .disks
            .get_mut(&key(resource_group, name))
            .ok_or_else(|| not_found("disk", name))?;
        disk.tags = tags.clone();
        Ok(())
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.call("delete_disk", name)?;
        let k = key(resource_group, name);
        if let Some(owner) = state.disks.get(&k).and_then(|d| d.managed_by.clone()) {
            return Err(AzureError::api(
                409,
                "OperationNotAllowed",
                format!("disk {:?} is attached to {}", name, owner),
            ));
        }
        state.disks.remove(&k);
        Ok(())
    }

    async fn get_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualNetwork> {
        let mut state = self.state();
        state.call("get_virtual_network", name)?;
        if !state.vnets.contains(&key(resource_group, name)) {
            return Err(not_found("virtual network", name));
        }
        Ok(VirtualNetwork {
            id: Some(format!(
                "{}/providers/Microsoft.Network/virtualNetworks/{}",
                naming::resource_group_id(FAKE_SUBSCRIPTION, resource_group),
                name
            )),
            name: Some(name.to_string()),
        })
    }

    async fn get_subnet(&self, resource_group: &str, vnet: &str, name: &str) -> Result<Subnet> {
        let mut state = self.state();
        state.call("get_subnet", name)?;
        let k = (
            resource_group.to_string(),
            vnet.to_string(),
            name.to_string(),
        );
        if !state.subnets.contains(&k) {
            return Err(not_found("subnet", name));
        }
        Ok(Subnet {
            id: Some(naming::subnet_id(FAKE_SUBSCRIPTION, resource_group, vnet, name)),
            name: Some(name.to_string()),
        })
    }

    async fn list_vm_skus(&self, location: &str) -> Result<Vec<ResourceSku>> {
        let mut state = self.state();
        state.call("list_vm_skus", location)?;
        state.sku_list_calls += 1;
        Ok(state
            .skus
            .iter()
            .filter(|sku| sku.locations.is_empty() || sku.locations.iter().any(|l| l == location))
            .cloned()
            .collect())
    }

    async fn check_image(&self, location: &str, image: &ImageReference) -> Result<()> {
        let mut state = self.state();
        state.call("check_image", location)?;
        if state.reject_images {
            return Err(not_found(
                "image",
                image
                    .id
                    .as_deref()
                    .or(image.offer.as_deref())
                    .unwrap_or_default(),
            ));
        }
        Ok(())
    }
}

impl AzureClientFactory for FakeAzure {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn AzureApi>> {
        self.state().clients.push(credentials.clone());
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        IpConfiguration, IpConfigurationProperties, NetworkInterfaceProperties, NetworkProfile,
        NetworkInterfaceReference, SubResource, VirtualMachineProperties,
    };

    const RG: &str = "rg";

    fn nic_with_public_ip(public_ip: &str) -> NetworkInterface {
        NetworkInterface {
            properties: NetworkInterfaceProperties {
                ip_configurations: vec![IpConfiguration {
                    name: Some("ip-config-1".to_string()),
                    properties: IpConfigurationProperties {
                        public_ip_address: Some(SubResource::new(naming::public_ip_id(
                            FAKE_SUBSCRIPTION,
                            RG,
                            public_ip,
                        ))),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn vm_on(nic: &str) -> VirtualMachine {
        VirtualMachine {
            properties: VirtualMachineProperties {
                network_profile: Some(NetworkProfile {
                    network_interfaces: vec![NetworkInterfaceReference {
                        id: Some(naming::nic_id(FAKE_SUBSCRIPTION, RG, nic)),
                        properties: None,
                    }],
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_referenced_resources_refuse_deletion() {
        let azure = FakeAzure::new();
        azure
            .create_or_update_public_ip(RG, "pip", &PublicIpAddress::default())
            .await
            .unwrap();
        azure
            .create_or_update_nic(RG, "nic", &nic_with_public_ip("pip"))
            .await
            .unwrap();
        azure.create_or_update_vm(RG, "vm", &vm_on("nic")).await.unwrap();

        let err = azure.delete_nic(RG, "nic").await.unwrap_err();
        assert_eq!(err.code(), Some("NicInUse"));
        let err = azure.delete_public_ip(RG, "pip").await.unwrap_err();
        assert_eq!(err.code(), Some("PublicIPAddressInUse"));
        let err = azure.delete_disk(RG, "vm_OsDisk_1").await.unwrap_err();
        assert_eq!(err.code(), Some("OperationNotAllowed"));

        azure.delete_vm(RG, "vm").await.unwrap();
        assert_eq!(azure.disk_names(), vec!["vm_OsDisk_1"]);
        azure.delete_disk(RG, "vm_OsDisk_1").await.unwrap();
        azure.delete_nic(RG, "nic").await.unwrap();
        azure.delete_public_ip(RG, "pip").await.unwrap();
        assert!(azure.is_empty());
    }

    #[tokio::test]
    async fn test_updates_keep_addresses() {
        let azure = FakeAzure::new();
        let first = azure
            .create_or_update_public_ip(RG, "pip", &PublicIpAddress::default())
            .await
            .unwrap();
        let second = azure
            .create_or_update_public_ip(RG, "pip", &PublicIpAddress::default())
            .await
            .unwrap();
        assert_eq!(first.properties.ip_address, second.properties.ip_address);
        assert_eq!(azure.public_ip_names().len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_public_ip_reference() {
        let azure = FakeAzure::new();
        let err = azure
            .create_or_update_nic(RG, "nic", &nic_with_public_ip("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("InvalidResourceReference"));
    }

    #[tokio::test]
    async fn test_fault_injection_is_one_shot() {
        let azure = FakeAzure::new();
        azure.fail_next("delete_vm", AzureError::api(500, "InternalError", "boom"));

        assert!(azure.delete_vm(RG, "vm").await.is_err());
        assert!(azure.delete_vm(RG, "vm").await.is_ok());
        assert_eq!(azure.writes(), vec!["delete_vm vm", "delete_vm vm"]);
    }
}
