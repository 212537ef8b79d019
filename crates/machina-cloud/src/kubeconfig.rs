//! Minimal kubeconfig access for boot configuration
//!
//! Only the pieces needed to point a new node at its cluster are read:
//! the API server address and the cluster CA. Both require the kubeconfig
//! to contain exactly one cluster.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeconfigError {
    #[error("kubeconfig does not contain exactly one cluster (found {0})")]
    ClusterCount(usize),

    #[error("cluster {0:?} has no certificate authority data")]
    MissingCaData(String),

    #[error("invalid certificate authority data: {0}")]
    InvalidCaData(#[from] base64::DecodeError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cluster {
    pub server: String,

    #[serde(default, rename = "certificate-authority-data")]
    pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

/// Parsed kubeconfig, clusters section only
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
}

impl Kubeconfig {
    pub fn from_yaml(content: &str) -> Result<Self, KubeconfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// The one cluster of this kubeconfig, an error on zero or several
    pub fn sole_cluster(&self) -> Result<&NamedCluster, KubeconfigError> {
        match self.clusters.as_slice() {
            [cluster] => Ok(cluster),
            clusters => Err(KubeconfigError::ClusterCount(clusters.len())),
        }
    }

    /// API server address with the `https://` scheme stripped
    pub fn server_address(&self) -> Result<String, KubeconfigError> {
        let cluster = self.sole_cluster()?;
        Ok(cluster.cluster.server.replace("https://", ""))
    }

    /// PEM-encoded cluster CA
    pub fn ca_cert(&self) -> Result<String, KubeconfigError> {
        let cluster = self.sole_cluster()?;
        let data = cluster
            .cluster
            .certificate_authority_data
            .as_deref()
            .ok_or_else(|| KubeconfigError::MissingCaData(cluster.name.clone()))?;
        let decoded = STANDARD.decode(data.trim())?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://api.prod.example.com:6443
    certificate-authority-data: LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t
"#;

    #[test]
    fn test_single_cluster_accessors() {
        let config = Kubeconfig::from_yaml(SINGLE).unwrap();
        assert_eq!(config.sole_cluster().unwrap().name, "prod");
        assert_eq!(
            config.server_address().unwrap(),
            "api.prod.example.com:6443"
        );
        assert_eq!(config.ca_cert().unwrap(), "-----BEGIN CERTIFICATE-----");
    }

    #[test]
    fn test_zero_or_many_clusters_rejected() {
        let empty = Kubeconfig::from_yaml("clusters: []").unwrap();
        assert!(matches!(
            empty.sole_cluster(),
            Err(KubeconfigError::ClusterCount(0))
        ));

        let two = Kubeconfig::from_yaml(
            r#"
clusters:
- name: a
  cluster: { server: "https://a" }
- name: b
  cluster: { server: "https://b" }
"#,
        )
        .unwrap();
        assert!(matches!(
            two.server_address(),
            Err(KubeconfigError::ClusterCount(2))
        ));
    }

    #[test]
    fn test_missing_ca_data() {
        let config = Kubeconfig::from_yaml(
            "clusters:\n- name: a\n  cluster:\n    server: https://a\n",
        )
        .unwrap();
        assert!(matches!(
            config.ca_cert(),
            Err(KubeconfigError::MissingCaData(_))
        ));
    }
}
