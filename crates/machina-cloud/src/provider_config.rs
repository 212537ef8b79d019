//! Provider spec envelope
//!
//! Every machine's provider spec carries the same outer structure; only
//! `cloudProviderSpec` is owned by the individual provider.

use crate::config_var::ConfigVarString;
use crate::error::{CloudError, Result};
use crate::machine::ProviderSpec;
use serde::{Deserialize, Serialize};

pub const ERR_IPV6_ONLY_UNSUPPORTED: &str = "IPv6 only network family not supported";

/// Operating system of the machine image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Ubuntu,
    CentOs,
    Rhel,
    Flatcar,
    RockyLinux,
    Amzn2,
    Sles,
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Ubuntu => "ubuntu",
            OperatingSystem::CentOs => "centos",
            OperatingSystem::Rhel => "rhel",
            OperatingSystem::Flatcar => "flatcar",
            OperatingSystem::RockyLinux => "rockylinux",
            OperatingSystem::Amzn2 => "amzn2",
            OperatingSystem::Sles => "sles",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IP family requested for the machine network
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IpFamily {
    #[default]
    Unspecified,
    IPv4,
    IPv6,
    DualStack,
    /// Kept verbatim so validation can report it
    Unknown(String),
}

impl IpFamily {
    pub fn is_dual_stack(&self) -> bool {
        matches!(self, IpFamily::DualStack)
    }

    /// Rejects families no provider can serve.
    ///
    /// Providers that lack IPv6-only support call
    /// [`IpFamily::ensure_not_ipv6_only`] on top of this.
    pub fn ensure_known(&self) -> Result<()> {
        match self {
            IpFamily::Unknown(family) => Err(CloudError::InvalidConfig(format!(
                "Unknown IP family {:?} only IPv4,IPv6,IPv4+IPv6 are valid.",
                family
            ))),
            _ => Ok(()),
        }
    }

    pub fn ensure_not_ipv6_only(&self) -> Result<()> {
        match self {
            IpFamily::IPv6 => Err(CloudError::InvalidConfig(
                ERR_IPV6_ONLY_UNSUPPORTED.to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl From<String> for IpFamily {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "" => IpFamily::Unspecified,
            "IPv4" => IpFamily::IPv4,
            "IPv6" => IpFamily::IPv6,
            "IPv4+IPv6" => IpFamily::DualStack,
            _ => IpFamily::Unknown(raw),
        }
    }
}

impl From<IpFamily> for String {
    fn from(family: IpFamily) -> Self {
        match family {
            IpFamily::Unspecified => String::new(),
            IpFamily::IPv4 => "IPv4".to_string(),
            IpFamily::IPv6 => "IPv6".to_string(),
            IpFamily::DualStack => "IPv4+IPv6".to_string(),
            IpFamily::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    #[serde(default)]
    pub servers: Vec<String>,
}

/// Static network settings of a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub cidr: ConfigVarString,
    #[serde(default)]
    pub gateway: ConfigVarString,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub ip_family: IpFamily,
}

/// Parsed provider spec envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Runtime tag selecting the provider
    pub cloud_provider: String,

    /// Provider-owned section, parsed by the provider itself
    #[serde(default)]
    pub cloud_provider_spec: serde_json::Value,

    pub operating_system: OperatingSystem,

    #[serde(default)]
    pub operating_system_spec: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    #[serde(default, rename = "sshPublicKeys")]
    pub ssh_public_keys: Vec<String>,
}

impl ProviderConfig {
    /// Parses the envelope out of a machine's provider spec
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self> {
        let value = spec.value.as_ref().ok_or_else(|| {
            CloudError::InvalidConfig("machine.spec.providerconfig.value is nil".to_string())
        })?;

        let config: ProviderConfig = serde_json::from_value(value.clone())
            .map_err(|e| CloudError::InvalidConfig(format!("failed to parse provider spec: {}", e)))?;

        if config.operating_system_spec.is_null() {
            return Err(CloudError::InvalidConfig(
                "operatingSystemSpec in the MachineDeployment cannot be empty".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn ip_family(&self) -> IpFamily {
        self.network
            .as_ref()
            .map(|n| n.ip_family.clone())
            .unwrap_or_default()
    }
}

/// Reads only the `cloudProvider` tag, without requiring the rest to parse
pub fn cloud_provider_tag(spec: &ProviderSpec) -> Result<String> {
    spec.value
        .as_ref()
        .and_then(|v| v.get("cloudProvider"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| CloudError::InvalidConfig("cloudProvider is missing".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(network: serde_json::Value) -> ProviderSpec {
        ProviderSpec::new(json!({
            "cloudProvider": "azure",
            "cloudProviderSpec": { "location": "westeurope" },
            "operatingSystem": "flatcar",
            "operatingSystemSpec": {},
            "network": network,
            "sshPublicKeys": ["ssh-ed25519 AAAA test"]
        }))
    }

    #[test]
    fn test_parse_envelope() {
        let config = ProviderConfig::from_spec(&spec(json!({ "ipFamily": "IPv4+IPv6" }))).unwrap();

        assert_eq!(config.cloud_provider, "azure");
        assert_eq!(config.operating_system, OperatingSystem::Flatcar);
        assert_eq!(config.ip_family(), IpFamily::DualStack);
        assert_eq!(config.ssh_public_keys.len(), 1);
        assert_eq!(config.cloud_provider_spec["location"], "westeurope");
    }

    #[test]
    fn test_missing_value_and_os_spec() {
        let err = ProviderConfig::from_spec(&ProviderSpec::default()).unwrap_err();
        assert!(err.to_string().contains("value is nil"));

        let no_os_spec = ProviderSpec::new(json!({
            "cloudProvider": "azure",
            "operatingSystem": "ubuntu"
        }));
        let err = ProviderConfig::from_spec(&no_os_spec).unwrap_err();
        assert!(err.to_string().contains("operatingSystemSpec"));
    }

    #[test]
    fn test_ip_family_validation() {
        assert_eq!(IpFamily::from(String::new()), IpFamily::Unspecified);
        assert!(IpFamily::IPv4.ensure_known().is_ok());
        assert!(IpFamily::IPv6.ensure_not_ipv6_only().is_err());

        let config = ProviderConfig::from_spec(&spec(json!({ "ipFamily": "IPv5" }))).unwrap();
        let err = config.ip_family().ensure_known().unwrap_err();
        assert!(err.to_string().contains("\"IPv5\""));
    }

    #[test]
    fn test_cloud_provider_tag() {
        assert_eq!(cloud_provider_tag(&spec(json!(null))).unwrap(), "azure");
        assert!(cloud_provider_tag(&ProviderSpec::default()).is_err());
    }
}
