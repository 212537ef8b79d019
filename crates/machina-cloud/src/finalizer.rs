//! Finalizer ledger
//!
//! Each finalizer on a machine stands for one cloud sub-resource that may
//! exist and has to be cleaned up. A provider declares its finalizers in
//! creation order; teardown walks them in reverse. Because the ledger lives
//! on the machine record, create and cleanup can resume after a restart at
//! exactly the step where they stopped.
//!
//! Ordering rules:
//!
//! - `ensure` commits a finalizer before the resource creation call starts.
//! - `discharge` is called only after the resource is confirmed deleted.

use crate::error::Result;
use crate::machine::{Machine, ProviderData};
use tracing::debug;

/// Ordered set of finalizers owned by one provider
#[derive(Debug, Clone, Copy)]
pub struct FinalizerLedger {
    steps: &'static [&'static str],
}

impl FinalizerLedger {
    /// `steps` must be listed in resource creation order
    pub const fn new(steps: &'static [&'static str]) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &'static [&'static str] {
        self.steps
    }

    /// Finalizers present on the machine, in creation order
    pub fn present(&self, machine: &Machine) -> Vec<&'static str> {
        self.steps
            .iter()
            .copied()
            .filter(|step| machine.has_finalizer(step))
            .collect()
    }

    /// Finalizers still to discharge, in teardown order
    pub fn remaining(&self, machine: &Machine) -> Vec<&'static str> {
        let mut remaining = self.present(machine);
        remaining.reverse();
        remaining
    }

    /// True once no finalizer of this ledger is left on the machine
    pub fn is_clear(&self, machine: &Machine) -> bool {
        !self.steps.iter().any(|step| machine.has_finalizer(step))
    }

    /// Commits the given finalizers to the machine record.
    ///
    /// Skips the store round-trip when all of them are already present.
    pub async fn ensure(
        &self,
        data: &ProviderData,
        machine: &mut Machine,
        finalizers: &[&'static str],
    ) -> Result<()> {
        if finalizers.iter().all(|f| machine.has_finalizer(f)) {
            return Ok(());
        }

        debug!(machine = %machine.name, ?finalizers, "Adding finalizers");
        data.update(machine, &|record| {
            for finalizer in finalizers {
                record.add_finalizer(finalizer);
            }
        })
        .await
    }

    /// Removes a finalizer from the machine record
    pub async fn discharge(
        &self,
        data: &ProviderData,
        machine: &mut Machine,
        finalizer: &'static str,
    ) -> Result<()> {
        if !machine.has_finalizer(finalizer) {
            return Ok(());
        }

        debug!(machine = %machine.name, finalizer, "Removing finalizer");
        data.update(machine, &|record| {
            record.remove_finalizer(finalizer);
        })
        .await
    }
}
