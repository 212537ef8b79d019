//! Resource names, correlation tags, finalizers and ARM ids

use crate::models::Tags;
use machina_cloud::{FinalizerLedger, MachineUid};

/// Tag correlating every Azure resource with the machine that owns it
pub const MACHINE_UID_TAG: &str = "Machine-UID";

pub const FINALIZER_PUBLIC_IP: &str = "machina.io/cleanup-azure-public-ip";
pub const FINALIZER_PUBLIC_IPV6: &str = "machina.io/cleanup-azure-public-ipv6";
pub const FINALIZER_NIC: &str = "machina.io/cleanup-azure-nic";
pub const FINALIZER_DISKS: &str = "machina.io/cleanup-azure-disks";
pub const FINALIZER_VM: &str = "machina.io/cleanup-azure-vm";

/// Azure sub-resources in creation order
pub const LEDGER: FinalizerLedger = FinalizerLedger::new(&[
    FINALIZER_PUBLIC_IP,
    FINALIZER_PUBLIC_IPV6,
    FINALIZER_NIC,
    FINALIZER_DISKS,
    FINALIZER_VM,
]);

pub fn nic_name(machine_name: &str) -> String {
    format!("{}-netiface", machine_name)
}

pub fn public_ip_name(nic_name: &str) -> String {
    format!("{}-pubip", nic_name)
}

pub fn public_ipv6_name(nic_name: &str) -> String {
    format!("{}-pubipv6", nic_name)
}

/// User tags plus the correlation tag
pub fn resource_tags(user_tags: &Tags, uid: &MachineUid) -> Tags {
    let mut tags = user_tags.clone();
    tags.insert(MACHINE_UID_TAG.to_string(), uid.to_string());
    tags
}

pub fn has_uid(tags: &Tags, uid: &MachineUid) -> bool {
    tags.get(MACHINE_UID_TAG)
        .is_some_and(|tag| tag == uid.as_str())
}

/// Last path segment of an ARM resource id
pub fn name_from_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

pub fn resource_group_id(subscription: &str, resource_group: &str) -> String {
    format!("/subscriptions/{}/resourceGroups/{}", subscription, resource_group)
}

pub fn availability_set_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Compute/availabilitySets/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}

pub fn subnet_id(subscription: &str, resource_group: &str, vnet: &str, subnet: &str) -> String {
    format!(
        "{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
        resource_group_id(subscription, resource_group),
        vnet,
        subnet
    )
}

pub fn security_group_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Network/networkSecurityGroups/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}

pub fn public_ip_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Network/publicIPAddresses/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}

pub fn nic_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Network/networkInterfaces/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}

pub fn vm_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Compute/virtualMachines/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}

pub fn disk_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Compute/disks/{}",
        resource_group_id(subscription, resource_group),
        name
    )
}
