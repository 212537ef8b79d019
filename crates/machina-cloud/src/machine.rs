//! Machine record owned by the reconciliation driver
//!
//! The driver creates the record before the first `create` call and only
//! deletes it once `cleanup` reports that no finalizers remain. Providers
//! read the record and mutate its finalizers through a [`MachineStore`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identity of a machine, used as the backend correlation key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineUid(String);

impl MachineUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineUid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

/// Opaque provider configuration blob of a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub value: Option<serde_json::Value>,
}

impl ProviderSpec {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value: Some(value) }
    }
}

/// Machine record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub uid: MachineUid,
    pub provider_spec: ProviderSpec,
    #[serde(default)]
    pub finalizers: Vec<String>,
}

impl Machine {
    pub fn new(name: impl Into<String>, uid: impl Into<MachineUid>, spec: ProviderSpec) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            provider_spec: spec,
            finalizers: Vec::new(),
        }
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds a finalizer, returns false if it was already present
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes a finalizer, returns false if it was not present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }
}

/// Mutation applied to the stored machine record
pub type MachineMutator<'a> = &'a (dyn Fn(&mut Machine) + Send + Sync);

/// Transactional access to the record store holding machines
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Applies `mutate` to the stored record, commits it and refreshes
    /// `machine` with the committed state.
    ///
    /// Returns only after the change is durable.
    async fn update(&self, machine: &mut Machine, mutate: MachineMutator<'_>) -> Result<()>;
}

/// Driver-supplied context handed to provider operations
#[derive(Clone)]
pub struct ProviderData {
    store: Arc<dyn MachineStore>,
}

impl ProviderData {
    pub fn new(store: Arc<dyn MachineStore>) -> Self {
        Self { store }
    }

    pub async fn update(&self, machine: &mut Machine, mutate: MachineMutator<'_>) -> Result<()> {
        self.store.update(machine, mutate).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FinalizerChange, MemoryMachineStore};

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::{Machine, MachineMutator, MachineStore};
    use crate::error::{CloudError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Finalizer mutation observed by [`MemoryMachineStore`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FinalizerChange {
        Added(String),
        Removed(String),
    }

    #[derive(Default)]
    struct Inner {
        records: HashMap<String, Machine>,
        history: Vec<FinalizerChange>,
        failing_updates: usize,
    }

    /// In-memory machine store recording every committed finalizer change
    #[derive(Default)]
    pub struct MemoryMachineStore {
        inner: Mutex<Inner>,
    }

    impl MemoryMachineStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, machine: Machine) {
            let mut inner = self.inner.lock().await;
            inner.records.insert(machine.name.clone(), machine);
        }

        pub async fn get(&self, name: &str) -> Option<Machine> {
            self.inner.lock().await.records.get(name).cloned()
        }

        /// Committed finalizer changes in commit order
        pub async fn history(&self) -> Vec<FinalizerChange> {
            self.inner.lock().await.history.clone()
        }

        pub async fn clear_history(&self) {
            self.inner.lock().await.history.clear();
        }

        /// Makes the next `count` updates fail without committing
        pub async fn fail_next_updates(&self, count: usize) {
            self.inner.lock().await.failing_updates = count;
        }
    }

    #[async_trait]
    impl MachineStore for MemoryMachineStore {
        async fn update(&self, machine: &mut Machine, mutate: MachineMutator<'_>) -> Result<()> {
            let mut inner = self.inner.lock().await;

            if inner.failing_updates > 0 {
                inner.failing_updates -= 1;
                return Err(CloudError::Store(format!(
                    "update of machine {} rejected",
                    machine.name
                )));
            }

            let stored = inner
                .records
                .get(&machine.name)
                .cloned()
                .ok_or_else(|| CloudError::Store(format!("machine {} not found", machine.name)))?;

            let mut updated = stored.clone();
            mutate(&mut updated);

            for finalizer in &updated.finalizers {
                if !stored.has_finalizer(finalizer) {
                    inner.history.push(FinalizerChange::Added(finalizer.clone()));
                }
            }
            for finalizer in &stored.finalizers {
                if !updated.has_finalizer(finalizer) {
                    inner.history.push(FinalizerChange::Removed(finalizer.clone()));
                }
            }

            inner.records.insert(updated.name.clone(), updated.clone());
            *machine = updated;
            Ok(())
        }
    }
}
