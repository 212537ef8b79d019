use machina_cloud::{
    ConfigVarResolver, DEFAULT_TTL, KeyRef, LookupCache, Machine, MemoryMachineStore,
    ProviderData, ProviderSpec, StaticSecretSource,
};
use machina_cloud_azure::models::{Capability, ResourceSku};
use machina_cloud_azure::{AzureProvider, FakeAzure};
use serde_json::{Value, json};
use std::sync::Arc;

pub const RESOURCE_GROUP: &str = "machines";
pub const VNET: &str = "cluster-vnet";
pub const SUBNET: &str = "nodes";
pub const LOCATION: &str = "westeurope";
pub const VM_SIZE: &str = "Standard_D2s_v3";

pub struct TestEnv {
    pub azure: FakeAzure,
    pub store: Arc<MemoryMachineStore>,
    pub data: ProviderData,
    pub provider: AzureProvider,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_azure(FakeAzure::new().with_subnet(RESOURCE_GROUP, VNET, SUBNET))
    }

    pub fn with_azure(azure: FakeAzure) -> Self {
        let store = Arc::new(MemoryMachineStore::new());
        let data = ProviderData::new(store.clone());
        let provider = AzureProvider::new(
            ConfigVarResolver::without_secrets(),
            Arc::new(azure.clone()),
            Arc::new(LookupCache::new(DEFAULT_TTL)),
        );
        Self {
            azure,
            store,
            data,
            provider,
        }
    }

    /// Second provider over the same subscription, resolving with `resolver`
    #[allow(dead_code)]
    pub fn provider_with(&self, resolver: ConfigVarResolver) -> AzureProvider {
        AzureProvider::new(
            resolver,
            Arc::new(self.azure.clone()),
            Arc::new(LookupCache::new(DEFAULT_TTL)),
        )
    }

    /// Registers a machine record with the store and returns it
    pub async fn machine(&self, name: &str, uid: &str, spec: ProviderSpec) -> Machine {
        let machine = Machine::new(name, uid, spec);
        self.store.insert(machine.clone()).await;
        machine
    }

    #[allow(dead_code)]
    pub async fn stored(&self, name: &str) -> Machine {
        self.store.get(name).await.unwrap()
    }
}

/// `cloudProviderSpec` with inline credentials and every required field
pub fn cloud_spec() -> Value {
    json!({
        "subscriptionID": "sub-1",
        "tenantID": "tenant-1",
        "clientID": "client-1",
        "clientSecret": "secret-1",
        "location": LOCATION,
        "resourceGroup": RESOURCE_GROUP,
        "vmSize": VM_SIZE,
        "vnetName": VNET,
        "subnetName": SUBNET,
        "tags": { "team": "infra" }
    })
}

#[allow(dead_code)]
pub fn client_secret_ref() -> KeyRef {
    KeyRef {
        namespace: "kube-system".to_string(),
        name: "azure".to_string(),
        key: "clientSecret".to_string(),
    }
}

/// [`cloud_spec`] reading `clientSecret` from [`client_secret_ref`]
#[allow(dead_code)]
pub fn cloud_spec_with_secret_ref() -> Value {
    let key_ref = client_secret_ref();
    cloud_spec_with(json!({
        "clientSecret": {
            "secretKeyRef": {
                "namespace": key_ref.namespace,
                "name": key_ref.name,
                "key": key_ref.key
            }
        }
    }))
}

/// Resolver that knows the secret behind [`client_secret_ref`]
#[allow(dead_code)]
pub fn secret_resolver() -> ConfigVarResolver {
    ConfigVarResolver::new(Arc::new(
        StaticSecretSource::new().with_secret(client_secret_ref(), "secret-1"),
    ))
}

/// Merges `overrides` into [`cloud_spec`]
#[allow(dead_code)]
pub fn cloud_spec_with(overrides: Value) -> Value {
    let mut spec = cloud_spec();
    if let (Some(base), Some(extra)) = (spec.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    spec
}

pub fn provider_spec(cloud: Value, ip_family: &str) -> ProviderSpec {
    ProviderSpec::new(json!({
        "cloudProvider": "azure",
        "cloudProviderSpec": cloud,
        "operatingSystem": "ubuntu",
        "operatingSystemSpec": {},
        "sshPublicKeys": ["ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB3fYbQ+dev dev@example"],
        "network": { "ipFamily": ip_family }
    }))
}

#[allow(dead_code)]
pub fn vm_sku(capabilities: &[(&str, &str)]) -> ResourceSku {
    ResourceSku {
        name: Some(VM_SIZE.to_string()),
        resource_type: Some("virtualMachines".to_string()),
        locations: vec![LOCATION.to_string()],
        capabilities: Some(
            capabilities
                .iter()
                .map(|(name, value)| Capability::new(name, value))
                .collect(),
        ),
        ..Default::default()
    }
}
