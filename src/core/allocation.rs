//! Allocation of container types to VM instances.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::core::cloud::CloudCatalog;
use crate::core::error::ControllerError;

/// VM id -> ordered list of container type ids placed on it.
///
/// Insertion order matters: the greedy strategy scans candidate VMs in map
/// order, so the map type must preserve it.
pub type AllocationMap = IndexMap<u32, Vec<u32>>;

/// Flattened wire form of one placement, used for diffing and genome decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTuple {
    pub vm: u32,
    pub container_type: u32,
    pub allocate: bool,
}

/// Places a container type on a VM, replacing any already placed container
/// of the same service. At most one container type per service may occupy a
/// VM at a time.
pub fn place_container(map: &mut AllocationMap, catalog: &CloudCatalog, vm: u32, container_type: u32) {
    let service = catalog.container_type(container_type).service;
    let containers = map.entry(vm).or_default();
    containers.retain(|ct| catalog.container_type(*ct).service != service);
    containers.push(container_type);
}

/// An immutable assignment of container types to VM instances.
///
/// The running set is derived as mapped VMs plus all on-premise VMs, but can
/// be widened explicitly for staged transitions where freshly launched VMs
/// carry no containers yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    map: AllocationMap,
    running: BTreeSet<u32>,
}

impl Allocation {
    /// Creates an allocation whose running set is exactly the mapped VMs
    /// plus all on-premise VMs.
    pub fn build(catalog: &CloudCatalog, map: AllocationMap) -> Self {
        let mut running: BTreeSet<u32> = map.keys().cloned().collect();
        running.extend(catalog.on_premise_vms());
        Self { map, running }
    }

    /// Creates an allocation with an explicit running set. Every mapped VM
    /// must be part of it; a container on a non-running VM is a fatal
    /// inconsistency.
    pub fn with_running(
        catalog: &CloudCatalog,
        map: AllocationMap,
        running: BTreeSet<u32>,
    ) -> Result<Self, ControllerError> {
        let mut running = running;
        running.extend(catalog.on_premise_vms());
        for vm in map.keys() {
            if !running.contains(vm) {
                return Err(ControllerError::InconsistentAllocation { vm: *vm });
            }
        }
        Ok(Self { map, running })
    }

    /// The empty allocation: nothing placed, only on-premise VMs running.
    pub fn empty(catalog: &CloudCatalog) -> Self {
        Self::build(catalog, AllocationMap::new())
    }

    pub fn from_tuples(catalog: &CloudCatalog, tuples: &[AllocationTuple]) -> Self {
        let mut map = AllocationMap::new();
        for tuple in tuples {
            if tuple.allocate {
                place_container(&mut map, catalog, tuple.vm, tuple.container_type);
            }
        }
        Self::build(catalog, map)
    }

    pub fn map(&self) -> &AllocationMap {
        &self.map
    }

    /// VMs that must be up: every mapped VM and every on-premise VM, even if
    /// it hosts nothing.
    pub fn running_vms(&self) -> &BTreeSet<u32> {
        &self.running
    }

    /// VMs hosting at least one container, in map order.
    pub fn used_vms(&self) -> Vec<u32> {
        self.map
            .iter()
            .filter(|(_, containers)| !containers.is_empty())
            .map(|(vm, _)| *vm)
            .collect()
    }

    pub fn is_used(&self, vm: u32) -> bool {
        self.map.get(&vm).map_or(false, |c| !c.is_empty())
    }

    pub fn containers_on(&self, vm: u32) -> &[u32] {
        self.map.get(&vm).map_or(&[] as &[u32], |c| c.as_slice())
    }

    pub fn container_count(&self) -> usize {
        self.map.values().map(|c| c.len()).sum()
    }

    /// Hourly cost of the allocation: the sum over used VMs. Running but
    /// empty VMs and on-premise VMs contribute nothing.
    pub fn total_cost(&self, catalog: &CloudCatalog) -> f64 {
        self.used_vms().iter().map(|vm| catalog.hourly_cost(*vm)).sum()
    }

    /// Request capacity per service summed over all placed containers.
    pub fn capacity_per_service(&self, catalog: &CloudCatalog) -> HashMap<u32, f64> {
        let mut capacity = HashMap::new();
        for containers in self.map.values() {
            for ct in containers {
                let container_type = catalog.container_type(*ct);
                *capacity.entry(container_type.service).or_insert(0.) += container_type.rpm_capacity;
            }
        }
        capacity
    }

    pub fn tuples(&self) -> Vec<AllocationTuple> {
        let mut tuples = Vec::with_capacity(self.container_count());
        for (vm, containers) in &self.map {
            for ct in containers {
                tuples.push(AllocationTuple {
                    vm: *vm,
                    container_type: *ct,
                    allocate: true,
                });
            }
        }
        tuples
    }
}
