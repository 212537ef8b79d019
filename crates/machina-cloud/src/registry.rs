//! Provider registry
//!
//! Selects the provider implementation by the `cloudProvider` tag of a
//! machine's provider spec.

use crate::error::{CloudError, Result};
use crate::machine::ProviderSpec;
use crate::provider::MachineProvider;
use crate::provider_config::cloud_provider_tag;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MachineProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn MachineProvider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registering machine provider");
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MachineProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotFound(name.to_string()))
    }

    /// Provider responsible for the given spec
    pub fn for_spec(&self, spec: &ProviderSpec) -> Result<Arc<dyn MachineProvider>> {
        let tag = cloud_provider_tag(spec)?;
        self.get(&tag)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::machine::{Machine, MachineUid, ProviderData};
    use crate::provider::{CloudConfig, MetricsLabels};
    use async_trait::async_trait;
    use serde_json::json;

    struct Dummy(&'static str);

    #[async_trait]
    impl MachineProvider for Dummy {
        fn name(&self) -> &str {
            self.0
        }

        async fn validate(&self, _spec: &ProviderSpec) -> Result<()> {
            Ok(())
        }

        fn add_defaults(&self, spec: ProviderSpec) -> Result<ProviderSpec> {
            Ok(spec)
        }

        async fn create(
            &self,
            machine: &mut Machine,
            _data: &ProviderData,
            _userdata: &str,
        ) -> Result<Instance> {
            Ok(Instance::new(machine.uid.as_str(), &machine.name))
        }

        async fn cleanup(&self, _machine: &mut Machine, _data: &ProviderData) -> Result<bool> {
            Ok(true)
        }

        async fn get(&self, _machine: &Machine, _data: &ProviderData) -> Result<Instance> {
            Err(CloudError::InstanceNotFound)
        }

        async fn get_cloud_config(&self, _spec: &ProviderSpec) -> Result<CloudConfig> {
            Ok(CloudConfig::new("", self.0))
        }

        async fn migrate_uid(&self, _machine: &Machine, _new_uid: &MachineUid) -> Result<()> {
            Ok(())
        }

        async fn machine_metrics_labels(&self, _machine: &Machine) -> MetricsLabels {
            MetricsLabels::default()
        }
    }

    #[test]
    fn test_select_provider_by_tag() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Dummy("azure")));
        registry.register(Arc::new(Dummy("hetzner")));

        let spec = ProviderSpec::new(json!({ "cloudProvider": "hetzner" }));
        assert_eq!(registry.for_spec(&spec).unwrap().name(), "hetzner");
        assert_eq!(registry.names(), vec!["azure", "hetzner"]);
    }

    #[test]
    fn test_unknown_tag() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Dummy("azure")));

        let spec = ProviderSpec::new(json!({ "cloudProvider": "openstack" }));
        match registry.for_spec(&spec) {
            Err(CloudError::ProviderNotFound(tag)) => assert_eq!(tag, "openstack"),
            other => panic!("unexpected: {:?}", other.map(|p| p.name().to_string())),
        }
    }
}
