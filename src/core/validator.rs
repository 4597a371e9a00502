//! Pure feasibility checks over allocations.

use std::collections::{BTreeSet, HashMap};

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::measures::SystemMeasures;

/// Checks whether a VM cannot hold the given containers.
///
/// Demand from `previous` containers whose service is no longer present
/// counts as well: such containers are logically replaced but keep running
/// through the grace period, so their footprint is still on the machine.
pub fn is_vm_overallocated(catalog: &CloudCatalog, vm: u32, containers: &[u32], previous: &[u32]) -> bool {
    let mut cpu: u64 = 0;
    let mut memory: u64 = 0;
    let mut services = BTreeSet::new();
    for ct in containers {
        let container_type = catalog.container_type(*ct);
        cpu += container_type.cpu_units as u64;
        memory += container_type.memory;
        services.insert(container_type.service);
    }
    for ct in previous {
        let container_type = catalog.container_type(*ct);
        if !services.contains(&container_type.service) {
            cpu += container_type.cpu_units as u64;
            memory += container_type.memory;
        }
    }
    cpu > catalog.vm_cpu_capacity(vm) as u64 || memory > catalog.vm_memory_capacity(vm)
}

/// Overallocation check for allocations without a predecessor: no
/// grace-period carry-over is accounted.
pub fn is_vm_overallocated_neutral(catalog: &CloudCatalog, vm: u32, containers: &[u32]) -> bool {
    is_vm_overallocated(catalog, vm, containers, &[])
}

/// Per service, how much measured load is not covered by allocated capacity.
/// Only positive deficits are reported.
pub fn missing_capacity_per_service(
    catalog: &CloudCatalog,
    allocation: &Allocation,
    measures: &SystemMeasures,
) -> HashMap<u32, f64> {
    let capacity = allocation.capacity_per_service(catalog);
    let mut missing = HashMap::new();
    for service in catalog.service_ids() {
        let deficit = measures.total_load(service) - capacity.get(&service).copied().unwrap_or(0.);
        if deficit > 0. {
            missing.insert(service, deficit);
        }
    }
    missing
}

/// Per service, how much allocated capacity exceeds measured load. Only
/// positive surpluses are reported.
pub fn overprovisioned_capacity_per_service(
    catalog: &CloudCatalog,
    allocation: &Allocation,
    measures: &SystemMeasures,
) -> HashMap<u32, f64> {
    let capacity = allocation.capacity_per_service(catalog);
    let mut surplus = HashMap::new();
    for service in catalog.service_ids() {
        let excess = capacity.get(&service).copied().unwrap_or(0.) - measures.total_load(service);
        if excess > 0. {
            surplus.insert(service, excess);
        }
    }
    surplus
}

/// Number of mapped VMs that fail the capacity check. This is the
/// feasibility criterion: under-provisioning is penalized elsewhere but
/// never makes an allocation infeasible.
pub fn overallocated_vm_count(catalog: &CloudCatalog, allocation: &Allocation, previous: Option<&Allocation>) -> usize {
    allocation
        .map()
        .iter()
        .filter(|(vm, containers)| {
            let carried = previous.map_or(&[] as &[u32], |p| p.containers_on(**vm));
            is_vm_overallocated(catalog, **vm, containers.as_slice(), carried)
        })
        .count()
}

pub fn overallocated_vm_count_neutral(catalog: &CloudCatalog, allocation: &Allocation) -> usize {
    overallocated_vm_count(catalog, allocation, None)
}

/// Constraint violation measure: one per overallocated VM plus the raw RPM
/// magnitude of unmet capacity summed over underprovisioned services.
///
/// The mixed unit is deliberate: it keeps the penalty sensitive to how far
/// under-provisioned the system is, not merely whether it is.
pub fn violations(
    catalog: &CloudCatalog,
    allocation: &Allocation,
    previous: Option<&Allocation>,
    measures: &SystemMeasures,
) -> f64 {
    let overallocated = overallocated_vm_count(catalog, allocation, previous) as f64;
    let missing: f64 = missing_capacity_per_service(catalog, allocation, measures).values().sum();
    overallocated + missing
}

/// Same as [`violations`] but with the neutral overallocation check.
pub fn neutral_violations(catalog: &CloudCatalog, allocation: &Allocation, measures: &SystemMeasures) -> f64 {
    violations(catalog, allocation, None, measures)
}
