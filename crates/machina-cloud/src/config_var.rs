//! Config variables
//!
//! A config variable is written either as a bare value or as an object
//! pointing at a secret, a config map or an environment variable:
//!
//! ```text
//! "vmSize": "Standard_D2s_v3"
//! "clientSecret": { "secretKeyRef": { "namespace": "kube-system", "name": "azure", "key": "clientSecret" } }
//! "tenantID": { "envVar": "MY_TENANT" }
//! ```
//!
//! ## Precedence
//!
//! 1. inline value, if non-empty
//! 2. `secretKeyRef`
//! 3. `configMapKeyRef`
//! 4. for fields with an environment fallback only: the explicit `envVar`,
//!    then the field's default environment variable
//!
//! Resolution keeps no state, so two machines pointing at different
//! secrets never see each other's values.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Reference to one key of a secret or config map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

impl std::fmt::Display for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

/// String-valued config variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StringRepr")]
#[serde(rename_all = "camelCase")]
pub struct ConfigVarString {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeyRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeyRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl ConfigVarString {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn secret(key_ref: KeyRef) -> Self {
        Self {
            secret_key_ref: Some(key_ref),
            ..Default::default()
        }
    }

    pub fn env(name: impl Into<String>) -> Self {
        Self {
            env_var: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringRepr {
    Literal(String),
    Object {
        #[serde(default)]
        value: String,
        #[serde(default, rename = "secretKeyRef")]
        secret_key_ref: Option<KeyRef>,
        #[serde(default, rename = "configMapKeyRef")]
        config_map_key_ref: Option<KeyRef>,
        #[serde(default, rename = "envVar")]
        env_var: Option<String>,
    },
}

impl From<StringRepr> for ConfigVarString {
    fn from(repr: StringRepr) -> Self {
        match repr {
            StringRepr::Literal(value) => Self::literal(value),
            StringRepr::Object {
                value,
                secret_key_ref,
                config_map_key_ref,
                env_var,
            } => Self {
                value,
                secret_key_ref,
                config_map_key_ref,
                env_var,
            },
        }
    }
}

/// Boolean config variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoolRepr")]
#[serde(rename_all = "camelCase")]
pub struct ConfigVarBool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeyRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeyRef>,
}

impl ConfigVarBool {
    pub fn literal(value: bool) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Literal(bool),
    Object {
        #[serde(default)]
        value: Option<bool>,
        #[serde(default, rename = "secretKeyRef")]
        secret_key_ref: Option<KeyRef>,
        #[serde(default, rename = "configMapKeyRef")]
        config_map_key_ref: Option<KeyRef>,
    },
}

impl From<BoolRepr> for ConfigVarBool {
    fn from(repr: BoolRepr) -> Self {
        match repr {
            BoolRepr::Literal(value) => Self::literal(value),
            BoolRepr::Object {
                value,
                secret_key_ref,
                config_map_key_ref,
            } => Self {
                value,
                secret_key_ref,
                config_map_key_ref,
            },
        }
    }
}

/// Read access to secrets and config maps
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Returns `None` if the secret or its key does not exist
    async fn secret_value(&self, key_ref: &KeyRef) -> Result<Option<String>>;

    /// Returns `None` if the config map or its key does not exist
    async fn config_map_value(&self, key_ref: &KeyRef) -> Result<Option<String>>;
}

/// Secret source backed by fixed in-memory maps
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource {
    secrets: HashMap<KeyRef, String>,
    config_maps: HashMap<KeyRef, String>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, key_ref: KeyRef, value: impl Into<String>) -> Self {
        self.secrets.insert(key_ref, value.into());
        self
    }

    pub fn with_config_map(mut self, key_ref: KeyRef, value: impl Into<String>) -> Self {
        self.config_maps.insert(key_ref, value.into());
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn secret_value(&self, key_ref: &KeyRef) -> Result<Option<String>> {
        Ok(self.secrets.get(key_ref).cloned())
    }

    async fn config_map_value(&self, key_ref: &KeyRef) -> Result<Option<String>> {
        Ok(self.config_maps.get(key_ref).cloned())
    }
}

/// Resolves config variables to concrete values
#[derive(Clone)]
pub struct ConfigVarResolver {
    secrets: Arc<dyn SecretSource>,
}

impl ConfigVarResolver {
    pub fn new(secrets: Arc<dyn SecretSource>) -> Self {
        Self { secrets }
    }

    /// Resolver that only understands inline values and environment variables
    pub fn without_secrets() -> Self {
        Self::new(Arc::new(StaticSecretSource::new()))
    }

    /// Resolves a string variable; unset variables resolve to ""
    pub async fn string(&self, var: &ConfigVarString) -> Result<String> {
        if !var.value.is_empty() {
            return Ok(var.value.clone());
        }

        if let Some(key_ref) = &var.secret_key_ref {
            debug!(secret = %key_ref, "Resolving secret reference");
            return self
                .secrets
                .secret_value(key_ref)
                .await?
                .ok_or_else(|| CloudError::ConfigVar(format!("secret {} not found", key_ref)));
        }

        if let Some(key_ref) = &var.config_map_key_ref {
            debug!(config_map = %key_ref, "Resolving config map reference");
            return self
                .secrets
                .config_map_value(key_ref)
                .await?
                .ok_or_else(|| {
                    CloudError::ConfigVar(format!("config map {} not found", key_ref))
                });
        }

        Ok(String::new())
    }

    /// Resolves a string variable, falling back to the environment.
    ///
    /// The variable's own `envVar` wins over `default_env`.
    pub async fn string_or_env(&self, var: &ConfigVarString, default_env: &str) -> Result<String> {
        let value = self.string(var).await?;
        if !value.is_empty() {
            return Ok(value);
        }

        if let Some(name) = var.env_var.as_deref().filter(|n| !n.is_empty()) {
            if let Ok(value) = std::env::var(name) {
                return Ok(value);
            }
        }

        Ok(std::env::var(default_env).unwrap_or_default())
    }

    /// Resolves a boolean variable, `None` when it is not set at all
    pub async fn bool(&self, var: &ConfigVarBool) -> Result<Option<bool>> {
        if var.value.is_some() {
            return Ok(var.value);
        }

        let raw = if let Some(key_ref) = &var.secret_key_ref {
            self.secrets.secret_value(key_ref).await?.ok_or_else(|| {
                CloudError::ConfigVar(format!("secret {} not found", key_ref))
            })?
        } else if let Some(key_ref) = &var.config_map_key_ref {
            self.secrets.config_map_value(key_ref).await?.ok_or_else(|| {
                CloudError::ConfigVar(format!("config map {} not found", key_ref))
            })?
        } else {
            return Ok(None);
        };

        parse_bool(&raw).map(Some)
    }

    /// Resolves an integer carried by a string variable, `None` when unset
    pub async fn int(&self, var: &ConfigVarString) -> Result<Option<i64>> {
        let raw = self.string(var).await?;
        if raw.is_empty() {
            return Ok(None);
        }

        raw.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| CloudError::ConfigVar(format!("invalid integer {:?}: {}", raw, e)))
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(CloudError::ConfigVar(format!("invalid boolean {:?}", other))),
    }
}
