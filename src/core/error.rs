//! Fatal error conditions of the control cycle.

use thiserror::Error;

/// Errors that abort the control cycle.
///
/// Everything else (unplaceable demand, drift, scenario end) is either a
/// warning or a normal outcome and never surfaces here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// An optimizer strategy returned an allocation with overallocated VMs.
    /// Strategies are expected to self-validate, so this indicates a defect
    /// in the strategy, not a recoverable condition.
    #[error("optimizer returned an infeasible allocation ({overallocated} overallocated VMs)")]
    InfeasibleAllocation { overallocated: usize },

    /// An allocation was constructed with a container mapped to a VM that is
    /// not part of the running set.
    #[error("container mapped to VM {vm} which is not in the running set")]
    InconsistentAllocation { vm: u32 },

    /// Status reporting found a VM with negative free capacity. The validator
    /// rules make this impossible, so reaching it means the invariants were
    /// broken somewhere upstream.
    #[error("negative free capacity on VM {vm}: cpu = {free_cpu}, memory = {free_memory}")]
    NegativeFreeCapacity {
        vm: u32,
        free_cpu: i64,
        free_memory: i64,
    },
}
