//! Azure machine provider implementation

use crate::api::{AzureApi, AzureClientFactory};
use crate::arm::{ArmClientFactory, ArmOptions};
use crate::config::{self, Config};
use crate::error::{AzureError, Result};
use crate::models::{
    ALLOCATION_DYNAMIC, ALLOCATION_STATIC, HardwareProfile, IP_VERSION_V4, IP_VERSION_V6,
    IpConfiguration, IpConfigurationProperties, LinuxConfiguration, NetworkInterface,
    NetworkInterfaceProperties, NetworkInterfaceReference, NetworkInterfaceReferenceProperties,
    NetworkProfile, OsProfile, PUBLIC_IP_SKU_BASIC, PUBLIC_IP_SKU_STANDARD, PublicIpAddress,
    PublicIpProperties, Sku, SshConfiguration, SshPublicKey, SubResource, VirtualMachine,
    VirtualMachineProperties,
};
use crate::naming::{
    self, FINALIZER_DISKS, FINALIZER_NIC, FINALIZER_PUBLIC_IP, FINALIZER_PUBLIC_IPV6,
    FINALIZER_VM, LEDGER,
};
use crate::sku::{self, SkuCache};
use crate::status;
use crate::types::AzureCloudConfig;
use async_trait::async_trait;
use machina_cloud::{
    AddressClass, CloudConfig, CloudError, ConfigVarResolver, Instance, Machine,
    MachineProvider, MachineStatusError, MachineUid, MetricsLabels, ProviderConfig, ProviderData,
    ProviderSpec,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PROVIDER_NAME: &str = "azure";

/// Azure provider
///
/// Creates one public IPv4 (and IPv6 for dual-stack), one NIC and one VM
/// per machine. All of them carry the `Machine-UID` tag, which is how
/// `get` and `cleanup` find them again.
pub struct AzureProvider {
    resolver: ConfigVarResolver,
    clients: Arc<dyn AzureClientFactory>,
    sku_cache: Arc<SkuCache>,
}

impl AzureProvider {
    pub fn new(
        resolver: ConfigVarResolver,
        clients: Arc<dyn AzureClientFactory>,
        sku_cache: Arc<SkuCache>,
    ) -> Self {
        Self {
            resolver,
            clients,
            sku_cache,
        }
    }

    /// Provider talking to Azure Resource Manager
    pub fn with_arm(resolver: ConfigVarResolver, sku_cache: Arc<SkuCache>) -> Result<Self> {
        let clients = Arc::new(ArmClientFactory::new(ArmOptions::default())?);
        Ok(Self::new(resolver, clients, sku_cache))
    }

    async fn config(&self, spec: &ProviderSpec) -> Result<(Config, ProviderConfig)> {
        Config::resolve(&self.resolver, spec).await
    }

    /// Config for `create`, which cannot proceed on a broken spec
    async fn config_or_terminal(
        &self,
        spec: &ProviderSpec,
    ) -> machina_cloud::Result<(Config, ProviderConfig)> {
        self.config(spec).await.map_err(unparsable_spec)
    }

    fn api(&self, config: &Config) -> Result<Arc<dyn AzureApi>> {
        self.clients.client(&config.credentials())
    }
}

#[async_trait]
impl MachineProvider for AzureProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn validate(&self, spec: &ProviderSpec) -> machina_cloud::Result<()> {
        let (config, provider_config) = self
            .config(spec)
            .await
            .map_err(|e| invalid(format!("failed to parse config: {}", e)))?;

        if let Some(field) = config.missing_required_field() {
            return Err(invalid(format!("{} is missing", field)));
        }

        let family = provider_config.ip_family();
        family.ensure_known()?;
        family.ensure_not_ipv6_only()?;

        let api = self.api(&config)?;

        api.list_all_vms()
            .await
            .map_err(|e| invalid(format!("failed to list all: {}", e)))?;

        api.get_virtual_network(&config.vnet_resource_group, &config.vnet_name)
            .await
            .map_err(|e| invalid(format!("failed to get virtual network: {}", e)))?;

        api.get_subnet(
            &config.vnet_resource_group,
            &config.vnet_name,
            &config.subnet_name,
        )
        .await
        .map_err(|e| invalid(format!("failed to get subnet: {}", e)))?;

        sku::validate_disk_skus(api.as_ref(), &self.sku_cache, &config)
            .await
            .map_err(|e| invalid(format!("failed to validate disk SKUs: {}", e)))?;

        let image = config
            .image_reference(provider_config.operating_system)
            .map_err(|e| invalid(e.to_string()))?;
        api.check_image(&config.location, &image)
            .await
            .map_err(|e| invalid(format!("failed to get image: {}", e)))?;

        Ok(())
    }

    fn add_defaults(&self, spec: ProviderSpec) -> machina_cloud::Result<ProviderSpec> {
        Ok(spec)
    }

    async fn create(
        &self,
        machine: &mut Machine,
        data: &ProviderData,
        userdata: &str,
    ) -> machina_cloud::Result<Instance> {
        let (config, provider_config) = self.config_or_terminal(&machine.provider_spec).await?;
        let api = self.api(&config)?;
        let api = api.as_ref();

        let name = machine.name.clone();
        let uid = machine.uid.clone();
        let dual_stack = provider_config.ip_family().is_dual_stack();
        let nic_name = naming::nic_name(&name);

        let mut public_ip = None;
        let mut public_ipv6 = None;
        if config.assign_public_ip {
            LEDGER.ensure(data, machine, &[FINALIZER_PUBLIC_IP]).await?;
            let address = create_public_ip(
                api,
                &config,
                &naming::public_ip_name(&nic_name),
                IP_VERSION_V4,
                dual_stack,
                &uid,
            )
            .await
            .map_err(AzureError::into_create_error)?;
            public_ip = address.id;

            if dual_stack {
                LEDGER.ensure(data, machine, &[FINALIZER_PUBLIC_IPV6]).await?;
                let address = create_public_ip(
                    api,
                    &config,
                    &naming::public_ipv6_name(&nic_name),
                    IP_VERSION_V6,
                    dual_stack,
                    &uid,
                )
                .await
                .map_err(AzureError::into_create_error)?;
                public_ipv6 = address.id;
            }
        }

        LEDGER.ensure(data, machine, &[FINALIZER_NIC]).await?;
        let nic = nic_spec(&config, &uid, public_ip, public_ipv6, dual_stack);
        let nic = api
            .create_or_update_nic(&config.resource_group, &nic_name, &nic)
            .await
            .map_err(|e| {
                e.context("failed to create main network interface")
                    .into_create_error()
            })?;
        let nic_id = nic.id.unwrap_or_else(|| {
            naming::nic_id(&config.subscription_id, &config.resource_group, &nic_name)
        });

        let vm = vm_spec(&config, &provider_config, &name, &uid, &nic_id, userdata).map_err(
            |e| CloudError::terminal(MachineStatusError::InvalidConfiguration, e.to_string()),
        )?;

        info!(machine = %name, vm_size = %config.vm_size, "Creating VM");
        LEDGER
            .ensure(data, machine, &[FINALIZER_DISKS, FINALIZER_VM])
            .await?;
        api.create_or_update_vm(&config.resource_group, &name, &vm)
            .await
            .map_err(|e| e.context("trying to create a VM").into_create_error())?;

        let vm = api
            .get_vm(&config.resource_group, &name)
            .await
            .map_err(|e| {
                e.context(format!("failed to retrieve updated data for VM {:?}", name))
            })?;

        Ok(instance(api, &config, &vm).await?)
    }

    async fn cleanup(
        &self,
        machine: &mut Machine,
        data: &ProviderData,
    ) -> machina_cloud::Result<bool> {
        // Never terminal: finalizers stay until a later attempt resolves the spec
        let (config, _) = self
            .config(&machine.provider_spec)
            .await
            .map_err(|e| e.context("failed to parse MachineSpec"))?;
        let api = self.api(&config)?;
        let api = api.as_ref();

        let name = machine.name.clone();
        let uid = machine.uid.clone();
        let resource_group = config.resource_group.as_str();

        for finalizer in LEDGER.remaining(machine) {
            match finalizer {
                FINALIZER_VM => match find_vm(api, &uid).await {
                    Ok(_) => {
                        info!(machine = %name, "Deleting VM");
                        delete_vms(api, resource_group, &uid).await.map_err(|e| {
                            e.context(format!("failed to delete instance for machine {:?}", name))
                        })?;
                    }
                    Err(e) if is_instance_not_found(&e) => {
                        info!(machine = %name, "VM already gone");
                    }
                    Err(e) => return Err(e.into()),
                },
                FINALIZER_DISKS => {
                    info!(machine = %name, "Deleting disks");
                    delete_disks(api, resource_group, &uid).await.map_err(|e| {
                        e.context(format!("failed to remove disks of machine {:?}", name))
                    })?;
                }
                FINALIZER_NIC => {
                    info!(machine = %name, "Deleting network interfaces");
                    delete_nics(api, resource_group, &uid).await.map_err(|e| {
                        e.context(format!(
                            "failed to remove network interfaces of machine {:?}",
                            name
                        ))
                    })?;
                }
                FINALIZER_PUBLIC_IPV6 => {
                    info!(machine = %name, "Deleting public IPv6 addresses");
                    delete_public_ips(api, resource_group, &uid, IP_VERSION_V6)
                        .await
                        .map_err(|e| {
                            e.context(format!(
                                "failed to remove public IPv6 addresses of machine {:?}",
                                name
                            ))
                        })?;
                }
                FINALIZER_PUBLIC_IP => {
                    info!(machine = %name, "Deleting public IP addresses");
                    delete_public_ips(api, resource_group, &uid, IP_VERSION_V4)
                        .await
                        .map_err(|e| {
                            e.context(format!(
                                "failed to remove public IP addresses of machine {:?}",
                                name
                            ))
                        })?;
                }
                _ => continue,
            }

            LEDGER.discharge(data, machine, finalizer).await?;
        }

        Ok(LEDGER.is_clear(machine))
    }

    async fn get(
        &self,
        machine: &Machine,
        _data: &ProviderData,
    ) -> machina_cloud::Result<Instance> {
        let (config, _) = self
            .config(&machine.provider_spec)
            .await
            .map_err(|e| invalid(format!("failed to parse MachineSpec: {}", e)))?;
        let api = self.api(&config)?;

        let vm = find_vm(api.as_ref(), &machine.uid).await.map_err(|e| {
            if is_instance_not_found(&e) {
                CloudError::InstanceNotFound
            } else {
                e.context(format!("failed to find machine {} by its UID", machine.uid))
                    .into()
            }
        })?;

        Ok(instance(api.as_ref(), &config, &vm).await?)
    }

    async fn get_cloud_config(&self, spec: &ProviderSpec) -> machina_cloud::Result<CloudConfig> {
        let (config, _) = self
            .config(spec)
            .await
            .map_err(|e| invalid(format!("failed to parse config: {}", e)))?;

        let rendered = AzureCloudConfig {
            cloud: AzureCloudConfig::PUBLIC_CLOUD.to_string(),
            tenant_id: config.tenant_id.clone(),
            subscription_id: config.subscription_id.clone(),
            aad_client_id: config.client_id.clone(),
            aad_client_secret: config.client_secret.clone(),
            resource_group: config.resource_group.clone(),
            location: config.location.clone(),
            vnet_name: config.vnet_name.clone(),
            subnet_name: config.subnet_name.clone(),
            route_table_name: config.route_table_name.clone(),
            security_group_name: config.security_group_name.clone(),
            primary_availability_set_name: config
                .effective_availability_set()
                .unwrap_or_default()
                .to_string(),
            vnet_resource_group: config.vnet_resource_group.clone(),
            use_instance_metadata: true,
            load_balancer_sku: config.load_balancer_sku.clone(),
        }
        .render()
        .map_err(|e| invalid(format!("failed to convert cloud-config to string: {}", e)))?;

        Ok(CloudConfig::new(rendered, PROVIDER_NAME))
    }

    async fn migrate_uid(
        &self,
        machine: &Machine,
        new_uid: &MachineUid,
    ) -> machina_cloud::Result<()> {
        let (config, provider_config) = self.config(&machine.provider_spec).await.map_err(|e| {
            if e.is_lookup_failure() {
                e.into()
            } else {
                unparsable_spec(e)
            }
        })?;
        let api = self.api(&config)?;
        let api = api.as_ref();

        let dual_stack = provider_config.ip_family().is_dual_stack();
        let nic_name = naming::nic_name(&machine.name);
        let resource_group = config.resource_group.as_str();
        let public_ip_ref = |name: String, finalizer: &str| {
            machine.has_finalizer(finalizer).then(|| {
                naming::public_ip_id(&config.subscription_id, resource_group, &name)
            })
        };

        for finalizer in LEDGER.present(machine) {
            debug!(machine = %machine.name, finalizer, uid = %new_uid, "Migrating resource UID");
            match finalizer {
                FINALIZER_PUBLIC_IP => {
                    create_public_ip(
                        api,
                        &config,
                        &naming::public_ip_name(&nic_name),
                        IP_VERSION_V4,
                        dual_stack,
                        new_uid,
                    )
                    .await
                    .map_err(|e| e.context("failed to update UID on public IP"))?;
                }
                FINALIZER_PUBLIC_IPV6 => {
                    create_public_ip(
                        api,
                        &config,
                        &naming::public_ipv6_name(&nic_name),
                        IP_VERSION_V6,
                        true,
                        new_uid,
                    )
                    .await
                    .map_err(|e| e.context("failed to update UID on public IPv6"))?;
                }
                FINALIZER_NIC => {
                    let nic = nic_spec(
                        &config,
                        new_uid,
                        public_ip_ref(naming::public_ip_name(&nic_name), FINALIZER_PUBLIC_IP),
                        public_ip_ref(naming::public_ipv6_name(&nic_name), FINALIZER_PUBLIC_IPV6),
                        dual_stack,
                    );
                    api.create_or_update_nic(resource_group, &nic_name, &nic)
                        .await
                        .map_err(|e| e.context("failed to update UID on main network interface"))?;
                }
                FINALIZER_DISKS => {
                    let disks = api.list_disks(resource_group).await?;
                    for disk in disks.into_iter().filter(|d| {
                        naming::has_uid(&d.tags, &machine.uid) || naming::has_uid(&d.tags, new_uid)
                    }) {
                        let Some(disk_name) = disk.name.as_deref() else {
                            continue;
                        };
                        let mut tags = disk.tags.clone();
                        tags.insert(naming::MACHINE_UID_TAG.to_string(), new_uid.to_string());
                        api.update_disk_tags(resource_group, disk_name, &tags)
                            .await
                            .map_err(|e| {
                                e.context(format!("failed to update UID for disk {}", disk_name))
                            })?;
                    }
                }
                FINALIZER_VM => {
                    let tags = naming::resource_tags(&config.tags, new_uid);
                    api.update_vm_tags(resource_group, &machine.name, &tags)
                        .await
                        .map_err(|e| e.context("failed to update UID of the instance"))?;
                }
                _ => {}
            }
        }

        info!(machine = %machine.name, uid = %new_uid, "Migrated resources to new UID");
        Ok(())
    }

    async fn machine_metrics_labels(&self, machine: &Machine) -> MetricsLabels {
        match self.config(&machine.provider_spec).await {
            Ok((config, _)) => MetricsLabels::ok(BTreeMap::from([
                ("size".to_string(), config.vm_size),
                ("location".to_string(), config.location),
            ])),
            Err(e) => {
                warn!(machine = %machine.name, error = %e, "Failed to read metrics labels");
                MetricsLabels::failed(e.into())
            }
        }
    }
}

fn unparsable_spec(err: AzureError) -> CloudError {
    CloudError::terminal(
        MachineStatusError::InvalidConfiguration,
        format!("failed to parse MachineSpec, due to {}", err),
    )
}

fn invalid(message: impl Into<String>) -> CloudError {
    CloudError::InvalidConfig(message.into())
}

fn is_instance_not_found(err: &AzureError) -> bool {
    matches!(err, AzureError::Cloud(CloudError::InstanceNotFound))
}

/// Public IP SKU; IPv6 and mixed-family addresses need Standard
fn public_ip_sku(dual_stack: bool) -> &'static str {
    if dual_stack {
        PUBLIC_IP_SKU_STANDARD
    } else {
        PUBLIC_IP_SKU_BASIC
    }
}

async fn create_public_ip(
    api: &dyn AzureApi,
    config: &Config,
    name: &str,
    version: &str,
    dual_stack: bool,
    uid: &MachineUid,
) -> Result<PublicIpAddress> {
    let address = PublicIpAddress {
        location: Some(config.location.clone()),
        tags: naming::resource_tags(&config.tags, uid),
        sku: Some(Sku {
            name: public_ip_sku(dual_stack).to_string(),
        }),
        properties: PublicIpProperties {
            public_ip_allocation_method: Some(ALLOCATION_STATIC.to_string()),
            public_ip_address_version: Some(version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    debug!(name, version, "Creating public IP");
    let mut created = api
        .create_or_update_public_ip(&config.resource_group, name, &address)
        .await
        .map_err(|e| e.context(format!("failed to create public IP {:?}", name)))?;

    if created.id.is_none() {
        created.id = Some(naming::public_ip_id(
            &config.subscription_id,
            &config.resource_group,
            name,
        ));
    }
    Ok(created)
}

fn nic_spec(
    config: &Config,
    uid: &MachineUid,
    public_ip: Option<String>,
    public_ipv6: Option<String>,
    dual_stack: bool,
) -> NetworkInterface {
    let subnet = SubResource::new(naming::subnet_id(
        &config.subscription_id,
        &config.vnet_resource_group,
        &config.vnet_name,
        &config.subnet_name,
    ));

    let mut ip_configurations = vec![IpConfiguration {
        name: Some("ip-config-1".to_string()),
        properties: IpConfigurationProperties {
            subnet: Some(subnet.clone()),
            private_ip_allocation_method: Some(ALLOCATION_DYNAMIC.to_string()),
            private_ip_address_version: Some(IP_VERSION_V4.to_string()),
            public_ip_address: public_ip.map(SubResource::new),
            primary: Some(true),
            ..Default::default()
        },
        ..Default::default()
    }];

    if dual_stack {
        ip_configurations.push(IpConfiguration {
            name: Some("ip-config-2".to_string()),
            properties: IpConfigurationProperties {
                subnet: Some(subnet),
                private_ip_allocation_method: Some(ALLOCATION_DYNAMIC.to_string()),
                private_ip_address_version: Some(IP_VERSION_V6.to_string()),
                public_ip_address: public_ipv6.map(SubResource::new),
                primary: Some(false),
                ..Default::default()
            },
            ..Default::default()
        });
    }

    let network_security_group = (!config.security_group_name.is_empty()).then(|| {
        SubResource::new(naming::security_group_id(
            &config.subscription_id,
            &config.resource_group,
            &config.security_group_name,
        ))
    });

    NetworkInterface {
        location: Some(config.location.clone()),
        tags: naming::resource_tags(&config.tags, uid),
        properties: NetworkInterfaceProperties {
            ip_configurations,
            network_security_group,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn vm_spec(
    config: &Config,
    provider_config: &ProviderConfig,
    name: &str,
    uid: &MachineUid,
    nic_id: &str,
    userdata: &str,
) -> Result<VirtualMachine> {
    let os = provider_config.operating_system;
    let admin_username = config::admin_username(os);

    Ok(VirtualMachine {
        location: Some(config.location.clone()),
        tags: naming::resource_tags(&config.tags, uid),
        plan: config.image_plan(os),
        zones: config.zones.clone(),
        properties: VirtualMachineProperties {
            hardware_profile: Some(HardwareProfile {
                vm_size: config.vm_size.clone(),
            }),
            storage_profile: Some(config.storage_profile(os)?),
            os_profile: Some(OsProfile {
                computer_name: name.to_string(),
                admin_username: admin_username.to_string(),
                custom_data: Some(config::encode_custom_data(userdata)),
                linux_configuration: Some(LinuxConfiguration {
                    disable_password_authentication: true,
                    ssh: SshConfiguration {
                        public_keys: vec![SshPublicKey {
                            path: format!("/home/{}/.ssh/authorized_keys", admin_username),
                            key_data: config::admin_ssh_key(provider_config),
                        }],
                    },
                }),
            }),
            network_profile: Some(NetworkProfile {
                network_interfaces: vec![NetworkInterfaceReference {
                    id: Some(nic_id.to_string()),
                    properties: Some(NetworkInterfaceReferenceProperties { primary: true }),
                }],
            }),
            availability_set: config.availability_set_id().map(SubResource::new),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Finds the VM tagged with `uid` anywhere in the subscription
async fn find_vm(api: &dyn AzureApi, uid: &MachineUid) -> Result<VirtualMachine> {
    api.list_all_vms()
        .await?
        .into_iter()
        .find(|vm| naming::has_uid(&vm.tags, uid))
        .ok_or(AzureError::Cloud(CloudError::InstanceNotFound))
}

async fn instance(api: &dyn AzureApi, config: &Config, vm: &VirtualMachine) -> Result<Instance> {
    let name = vm
        .name
        .clone()
        .ok_or_else(|| AzureError::api(200, "InvalidResponse", "VM has no name"))?;

    let view = api
        .instance_view(&config.resource_group, &name)
        .await
        .map_err(|e| e.context(format!("failed to get instance view for machine {:?}", name)))?;
    let status = status::instance_status(&view);

    let addresses = vm_addresses(api, config, vm)
        .await
        .map_err(|e| e.context(format!("failed to retrieve IP addresses for VM {:?}", name)))?;

    let id = vm.id.clone().unwrap_or_else(|| name.clone());
    Ok(Instance::new(id, name)
        .with_status(status)
        .with_addresses(addresses))
}

async fn vm_addresses(
    api: &dyn AzureApi,
    config: &Config,
    vm: &VirtualMachine,
) -> Result<BTreeMap<String, AddressClass>> {
    let interfaces = vm
        .properties
        .network_profile
        .as_ref()
        .map(|profile| profile.network_interfaces.as_slice())
        .unwrap_or_default();
    if interfaces.is_empty() {
        return Err(AzureError::api(200, "InvalidResponse", "machine has no network interfaces"));
    }

    let mut addresses = BTreeMap::new();
    for (n, interface) in interfaces.iter().enumerate() {
        let Some(id) = interface.id.as_deref().filter(|id| !id.is_empty()) else {
            return Err(AzureError::api(
                200,
                "InvalidResponse",
                format!("interface {} has no ID", n),
            ));
        };

        let nic = api
            .get_nic(&config.resource_group, naming::name_from_id(id))
            .await?;

        for ip_config in &nic.properties.ip_configurations {
            if let Some(private) = &ip_config.properties.private_ip_address {
                addresses.insert(private.clone(), AddressClass::InternalIp);
            }

            let Some(public_id) = ip_config
                .properties
                .public_ip_address
                .as_ref()
                .and_then(|r| r.id.as_deref())
            else {
                continue;
            };

            let public = api
                .get_public_ip(&config.resource_group, naming::name_from_id(public_id))
                .await?;
            if let Some(address) = public.properties.ip_address {
                addresses.insert(address, AddressClass::ExternalIp);
            }
        }
    }

    Ok(addresses)
}

async fn delete_vms(api: &dyn AzureApi, resource_group: &str, uid: &MachineUid) -> Result<()> {
    for vm in api.list_vms(resource_group).await? {
        if let (true, Some(name)) = (naming::has_uid(&vm.tags, uid), vm.name.as_deref()) {
            api.delete_vm(resource_group, name).await?;
        }
    }
    Ok(())
}

async fn delete_disks(api: &dyn AzureApi, resource_group: &str, uid: &MachineUid) -> Result<()> {
    for disk in api.list_disks(resource_group).await? {
        if let (true, Some(name)) = (naming::has_uid(&disk.tags, uid), disk.name.as_deref()) {
            api.delete_disk(resource_group, name).await?;
        }
    }
    Ok(())
}

async fn delete_nics(api: &dyn AzureApi, resource_group: &str, uid: &MachineUid) -> Result<()> {
    for nic in api.list_nics(resource_group).await? {
        if let (true, Some(name)) = (naming::has_uid(&nic.tags, uid), nic.name.as_deref()) {
            api.delete_nic(resource_group, name).await?;
        }
    }
    Ok(())
}

async fn delete_public_ips(
    api: &dyn AzureApi,
    resource_group: &str,
    uid: &MachineUid,
    version: &str,
) -> Result<()> {
    for address in api.list_public_ips(resource_group).await? {
        if !naming::has_uid(&address.tags, uid) || address.version() != version {
            continue;
        }
        if let Some(name) = address.name.as_deref() {
            api.delete_public_ip(resource_group, name).await?;
        }
    }
    Ok(())
}
