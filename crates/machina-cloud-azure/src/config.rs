//! Resolved Azure machine configuration
//!
//! [`Config::resolve`] turns the raw provider spec into plain values:
//! config variables are looked up, credentials fall back to the
//! `AZURE_*` environment variables, and the optional fields get their
//! defaults. Everything derived purely from the resolved values (image,
//! plan, storage profile, admin user) lives here as well.

use crate::error::{AzureError, Result};
use crate::models::{
    DataDisk, ImageReference, ManagedDiskParameters, OsDisk, Plan, StorageProfile, Tags,
};
use crate::naming;
use crate::types::{ImagePlan, RawConfig};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::SigningKey;
use machina_cloud::{ConfigVarResolver, OperatingSystem, ProviderConfig, ProviderSpec};

pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Service principal credentials for one subscription
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Azure configuration of one machine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,

    pub location: String,
    pub resource_group: String,
    pub vnet_resource_group: String,
    pub vm_size: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub load_balancer_sku: String,
    pub route_table_name: String,
    pub availability_set: String,
    pub assign_availability_set: Option<bool>,
    pub security_group_name: String,

    pub image_id: String,
    pub image_plan: Option<ImagePlan>,
    pub image_reference: Option<crate::types::ImageReference>,

    pub zones: Vec<String>,
    pub tags: Tags,

    pub os_disk_size: i32,
    pub os_disk_sku: Option<String>,
    pub data_disk_size: i32,
    pub data_disk_sku: Option<String>,

    pub assign_public_ip: bool,
}

impl Config {
    /// Parses and resolves a machine's provider spec
    pub async fn resolve(
        resolver: &ConfigVarResolver,
        spec: &ProviderSpec,
    ) -> Result<(Config, ProviderConfig)> {
        let provider_config = ProviderConfig::from_spec(spec)?;
        let raw = RawConfig::from_value(&provider_config.cloud_provider_spec)?;

        let resource_group = resolver.string(&raw.resource_group).await?;
        let mut vnet_resource_group = resolver.string(&raw.vnet_resource_group).await?;
        if vnet_resource_group.is_empty() {
            vnet_resource_group = resource_group.clone();
        }

        let config = Config {
            subscription_id: resolver
                .string_or_env(&raw.subscription_id, ENV_SUBSCRIPTION_ID)
                .await?,
            tenant_id: resolver
                .string_or_env(&raw.tenant_id, ENV_TENANT_ID)
                .await?,
            client_id: resolver
                .string_or_env(&raw.client_id, ENV_CLIENT_ID)
                .await?,
            client_secret: resolver
                .string_or_env(&raw.client_secret, ENV_CLIENT_SECRET)
                .await?,
            location: resolver.string(&raw.location).await?,
            resource_group,
            vnet_resource_group,
            vm_size: resolver.string(&raw.vm_size).await?,
            vnet_name: resolver.string(&raw.vnet_name).await?,
            subnet_name: resolver.string(&raw.subnet_name).await?,
            load_balancer_sku: resolver.string(&raw.load_balancer_sku).await?,
            route_table_name: resolver.string(&raw.route_table_name).await?,
            availability_set: resolver.string(&raw.availability_set).await?,
            assign_availability_set: raw.assign_availability_set,
            security_group_name: resolver.string(&raw.security_group_name).await?,
            image_id: resolver.string(&raw.image_id).await?,
            image_plan: raw.image_plan,
            image_reference: raw.image_reference,
            zones: raw.zones,
            tags: raw.tags,
            os_disk_size: raw.os_disk_size,
            os_disk_sku: raw.os_disk_sku,
            data_disk_size: raw.data_disk_size,
            data_disk_sku: raw.data_disk_sku,
            assign_public_ip: resolver
                .bool(&raw.assign_public_ip)
                .await?
                .unwrap_or(false),
        };

        Ok((config, provider_config))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            subscription_id: self.subscription_id.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    /// First required field that resolved to an empty value
    pub fn missing_required_field(&self) -> Option<&'static str> {
        [
            ("subscriptionID", &self.subscription_id),
            ("tenantID", &self.tenant_id),
            ("clientID", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("resourceGroup", &self.resource_group),
            ("vmSize", &self.vm_size),
            ("vnetName", &self.vnet_name),
            ("subnetName", &self.subnet_name),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
    }

    /// Availability set name, if the machine should join one
    pub fn effective_availability_set(&self) -> Option<&str> {
        if self.availability_set.is_empty() || self.assign_availability_set == Some(false) {
            return None;
        }
        Some(&self.availability_set)
    }

    /// Full ARM id of the availability set the machine joins
    pub fn availability_set_id(&self) -> Option<String> {
        self.effective_availability_set().map(|name| {
            naming::availability_set_id(&self.subscription_id, &self.resource_group, name)
        })
    }

    /// Image to boot: explicit id, then explicit reference, then the
    /// built-in default of the operating system
    pub fn image_reference(&self, os: OperatingSystem) -> Result<ImageReference> {
        if !self.image_id.is_empty() {
            return Ok(ImageReference::by_id(&self.image_id));
        }

        if let Some(reference) = &self.image_reference {
            return Ok(ImageReference::marketplace(
                &reference.publisher,
                &reference.offer,
                &reference.sku,
                &reference.version,
            ));
        }

        default_image_reference(os)
    }

    /// Marketplace plan for the image, if it needs one
    pub fn image_plan(&self, os: OperatingSystem) -> Option<Plan> {
        if let Some(plan) = self.image_plan.as_ref().filter(|p| !p.name.is_empty()) {
            return Some(Plan {
                name: plan.name.clone(),
                publisher: plan.publisher.clone(),
                product: plan.product.clone(),
            });
        }

        default_image_plan(os)
    }

    pub fn storage_profile(&self, os: OperatingSystem) -> Result<StorageProfile> {
        let mut profile = StorageProfile {
            image_reference: Some(self.image_reference(os)?),
            ..Default::default()
        };

        if self.os_disk_size != 0 {
            profile.os_disk = Some(OsDisk {
                create_option: "FromImage".to_string(),
                disk_size_gb: Some(self.os_disk_size),
                managed_disk: self.os_disk_sku.as_ref().map(|sku| ManagedDiskParameters {
                    storage_account_type: sku.clone(),
                }),
            });
        }

        if self.data_disk_size != 0 {
            profile.data_disks.push(DataDisk {
                lun: 0,
                create_option: "Empty".to_string(),
                disk_size_gb: Some(self.data_disk_size),
                managed_disk: self.data_disk_sku.as_ref().map(|sku| ManagedDiskParameters {
                    storage_account_type: sku.clone(),
                }),
            });
        }

        Ok(profile)
    }
}

fn default_image_reference(os: OperatingSystem) -> Result<ImageReference> {
    let (publisher, offer, sku, version) = match os {
        OperatingSystem::CentOs => ("OpenLogic", "CentOS", "7_9", "latest"),
        OperatingSystem::Ubuntu => (
            "Canonical",
            "0001-com-ubuntu-server-focal",
            "20_04-lts",
            "latest",
        ),
        OperatingSystem::Rhel => ("RedHat", "rhel-byos", "rhel-lvm83", "8.3.20201109"),
        OperatingSystem::Flatcar => (
            "kinvolk",
            "flatcar-container-linux",
            "stable",
            "2905.2.5",
        ),
        OperatingSystem::RockyLinux => (
            "procomputers",
            "rocky-linux-8-5",
            "rocky-linux-8-5",
            "8.5.20211118",
        ),
        other => {
            return Err(AzureError::InvalidConfig(format!(
                "operating system {:?} not supported",
                other.as_str()
            )));
        }
    };

    Ok(ImageReference::marketplace(publisher, offer, sku, version))
}

fn default_image_plan(os: OperatingSystem) -> Option<Plan> {
    let (name, publisher, product) = match os {
        OperatingSystem::Flatcar => ("stable", "kinvolk", "flatcar-container-linux"),
        OperatingSystem::Rhel => ("rhel-lvm83", "redhat", "rhel-byos"),
        OperatingSystem::RockyLinux => ("rocky-linux-8-5", "procomputers", "rocky-linux-8-5"),
        _ => return None,
    };

    Some(Plan {
        name: name.to_string(),
        publisher: publisher.to_string(),
        product: product.to_string(),
    })
}

/// Login user baked into the image
pub fn admin_username(os: OperatingSystem) -> &'static str {
    match os {
        OperatingSystem::Flatcar => "core",
        other => other.as_str(),
    }
}

/// SSH key for the admin user.
///
/// Azure refuses Linux VMs without a key, so when the machine has none a
/// throwaway ed25519 public key is generated whose private half is never
/// kept.
pub fn admin_ssh_key(provider_config: &ProviderConfig) -> String {
    if let Some(key) = provider_config
        .ssh_public_keys
        .iter()
        .find(|k| !k.trim().is_empty())
    {
        return key.clone();
    }
    throwaway_ssh_key()
}

fn throwaway_ssh_key() -> String {
    const KEY_TYPE: &[u8] = b"ssh-ed25519";

    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let point = signing_key.verifying_key().to_bytes();

    // RFC 4253 wire format: length-prefixed key type, then the key bytes
    let mut blob = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + point.len());
    blob.extend_from_slice(&(KEY_TYPE.len() as u32).to_be_bytes());
    blob.extend_from_slice(KEY_TYPE);
    blob.extend_from_slice(&(point.len() as u32).to_be_bytes());
    blob.extend_from_slice(&point);

    format!("ssh-ed25519 {} machina-throwaway", STANDARD.encode(blob))
}

/// `userdata` as Azure expects it in `osProfile.customData`
pub fn encode_custom_data(userdata: &str) -> String {
    STANDARD.encode(userdata.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use machina_cloud::{KeyRef, StaticSecretSource};
    use serde_json::json;
    use serial_test::serial;
    use std::sync::Arc;

    fn spec(cloud: serde_json::Value, os: &str) -> ProviderSpec {
        ProviderSpec::new(json!({
            "cloudProvider": "azure",
            "cloudProviderSpec": cloud,
            "operatingSystem": os,
            "operatingSystemSpec": {},
            "sshPublicKeys": []
        }))
    }

    fn resolve(cloud: serde_json::Value, os: &str) -> Result<(Config, ProviderConfig)> {
        tokio_test::block_on(Config::resolve(
            &ConfigVarResolver::without_secrets(),
            &spec(cloud, os),
        ))
    }

    #[test]
    #[serial]
    fn test_credentials_fall_back_to_env() {
        temp_env::with_vars(
            [
                (ENV_SUBSCRIPTION_ID, Some("env-sub")),
                (ENV_TENANT_ID, Some("env-tenant")),
                (ENV_CLIENT_ID, Some("env-client")),
                (ENV_CLIENT_SECRET, Some("env-secret")),
            ],
            || {
                let (config, _) = resolve(
                    json!({ "tenantID": "inline-tenant", "resourceGroup": "rg" }),
                    "ubuntu",
                )
                .unwrap();

                assert_eq!(config.subscription_id, "env-sub");
                assert_eq!(config.tenant_id, "inline-tenant");
                assert_eq!(config.client_secret, "env-secret");
                assert_eq!(config.vnet_resource_group, "rg");
            },
        );
    }

    #[test]
    #[serial]
    fn test_secret_beats_env() {
        temp_env::with_var(ENV_CLIENT_SECRET, Some("env-secret"), || {
            let key_ref = KeyRef {
                namespace: "kube-system".to_string(),
                name: "azure".to_string(),
                key: "clientSecret".to_string(),
            };
            let resolver = ConfigVarResolver::new(Arc::new(
                StaticSecretSource::new().with_secret(key_ref, "from-secret"),
            ));
            let spec = spec(
                json!({ "clientSecret": { "value": "", "secretKeyRef": { "namespace": "kube-system", "name": "azure", "key": "clientSecret" } } }),
                "ubuntu",
            );

            let (config, _) = tokio_test::block_on(Config::resolve(&resolver, &spec)).unwrap();
            assert_eq!(config.client_secret, "from-secret");
        });
    }

    #[test]
    #[serial]
    fn test_missing_required_field() {
        temp_env::with_vars_unset(
            [ENV_SUBSCRIPTION_ID, ENV_TENANT_ID, ENV_CLIENT_ID, ENV_CLIENT_SECRET],
            || {
                let (config, _) = resolve(json!({ "subscriptionID": "sub" }), "ubuntu").unwrap();
                assert_eq!(config.missing_required_field(), Some("tenantID"));
            },
        );
    }

    #[test]
    fn test_image_precedence() {
        let mut config = Config::default();
        let flatcar = config.image_reference(OperatingSystem::Flatcar).unwrap();
        assert_eq!(flatcar.publisher.as_deref(), Some("kinvolk"));
        assert_eq!(flatcar.version.as_deref(), Some("2905.2.5"));

        config.image_reference = Some(crate::types::ImageReference::new(
            "Canonical", "ubuntu-24_04-lts", "server", "latest",
        ));
        let explicit = config.image_reference(OperatingSystem::Flatcar).unwrap();
        assert_eq!(explicit.offer.as_deref(), Some("ubuntu-24_04-lts"));

        config.image_id = "/subscriptions/sub/images/golden".to_string();
        let by_id = config.image_reference(OperatingSystem::Flatcar).unwrap();
        assert_eq!(by_id.id.as_deref(), Some("/subscriptions/sub/images/golden"));
        assert!(by_id.publisher.is_none());
    }

    #[test]
    fn test_unsupported_os_image() {
        let err = Config::default()
            .image_reference(OperatingSystem::Sles)
            .unwrap_err();
        assert!(err.to_string().contains("operating system \"sles\" not supported"));
    }

    #[test]
    fn test_plans_and_usernames() {
        let mut config = Config::default();
        assert_eq!(
            config.image_plan(OperatingSystem::Flatcar).unwrap().publisher,
            "kinvolk"
        );
        assert!(config.image_plan(OperatingSystem::Ubuntu).is_none());

        config.image_plan = Some(ImagePlan::new("custom", "acme", "golden"));
        assert_eq!(config.image_plan(OperatingSystem::Ubuntu).unwrap().name, "custom");

        assert_eq!(admin_username(OperatingSystem::Flatcar), "core");
        assert_eq!(admin_username(OperatingSystem::Ubuntu), "ubuntu");
    }

    #[test]
    fn test_storage_profile() {
        let mut config = Config::default();
        let profile = config.storage_profile(OperatingSystem::Ubuntu).unwrap();
        assert!(profile.os_disk.is_none());
        assert!(profile.data_disks.is_empty());

        config.os_disk_size = 64;
        config.os_disk_sku = Some("Premium_LRS".to_string());
        config.data_disk_size = 128;
        let profile = config.storage_profile(OperatingSystem::Ubuntu).unwrap();

        let os_disk = profile.os_disk.unwrap();
        assert_eq!(os_disk.create_option, "FromImage");
        assert_eq!(os_disk.managed_disk.unwrap().storage_account_type, "Premium_LRS");
        assert_eq!(profile.data_disks[0].lun, 0);
        assert_eq!(profile.data_disks[0].create_option, "Empty");
        assert!(profile.data_disks[0].managed_disk.is_none());
    }

    #[test]
    fn test_availability_set_assignment() {
        let mut config = Config {
            subscription_id: "sub".to_string(),
            resource_group: "rg".to_string(),
            ..Default::default()
        };
        assert!(config.availability_set_id().is_none());

        config.availability_set = "as-1".to_string();
        assert!(config.availability_set_id().unwrap().ends_with("/availabilitySets/as-1"));

        config.assign_availability_set = Some(false);
        assert!(config.availability_set_id().is_none());
    }

    #[test]
    fn test_throwaway_key_shape() {
        let key = throwaway_ssh_key();
        let mut parts = key.split(' ');
        assert_eq!(parts.next(), Some("ssh-ed25519"));

        let blob = STANDARD.decode(parts.next().unwrap()).unwrap();
        assert_eq!(blob.len(), 4 + 11 + 4 + 32);
        assert_eq!(&blob[4..15], b"ssh-ed25519");
        assert_ne!(key, throwaway_ssh_key());
    }

    #[test]
    fn test_throwaway_keys_are_valid_ed25519_points() {
        for _ in 0..64 {
            let key = throwaway_ssh_key();
            let encoded = key.split(' ').nth(1).unwrap();
            let blob = STANDARD.decode(encoded).unwrap();

            let point: [u8; 32] = blob[19..51].try_into().unwrap();
            assert!(ed25519_dalek::VerifyingKey::from_bytes(&point).is_ok());
        }
    }

    #[test]
    fn test_admin_ssh_key_prefers_machine_key() {
        let mut provider_config = ProviderConfig::from_spec(&ProviderSpec::new(json!({
            "cloudProvider": "azure",
            "operatingSystem": "ubuntu",
            "operatingSystemSpec": {},
            "sshPublicKeys": [" ", "ssh-rsa AAAA dev"]
        })))
        .unwrap();
        assert_eq!(admin_ssh_key(&provider_config), "ssh-rsa AAAA dev");

        provider_config.ssh_public_keys.clear();
        assert!(admin_ssh_key(&provider_config).ends_with(" machina-throwaway"));
    }

    #[test]
    fn test_custom_data_is_base64() {
        assert_eq!(encode_custom_data("#cloud-config"), "I2Nsb3VkLWNvbmZpZw==");
    }
}
