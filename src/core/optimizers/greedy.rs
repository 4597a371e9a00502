//! Deterministic greedy placement heuristic.

use std::time::Instant;

use log::warn;

use crate::core::allocation::{place_container, Allocation, AllocationMap};
use crate::core::cloud::CloudCatalog;
use crate::core::fitness::FitnessFunction;
use crate::core::measures::SystemMeasures;
use crate::core::optimizer::{OptResult, OptimizerStrategy};
use crate::core::provider::ImageCacheState;
use crate::core::validator::{is_vm_overallocated, missing_capacity_per_service, overprovisioned_capacity_per_service};

/// First-fit bin-packing strategy: trims overprovisioned containers from the
/// previous allocation, sizes new containers largest-fit-first for each
/// service with a capacity deficit, and places them first on already used
/// VMs, then on unleased VMs cheapest-first.
pub struct GreedyOptimizer {
    fitness: FitnessFunction,
}

impl GreedyOptimizer {
    pub fn new(fitness: FitnessFunction) -> Self {
        Self { fitness }
    }
}

impl OptimizerStrategy for GreedyOptimizer {
    fn optimize(
        &mut self,
        catalog: &CloudCatalog,
        previous: &Allocation,
        measures: &SystemMeasures,
        cache: &ImageCacheState,
    ) -> OptResult {
        let start = Instant::now();
        let map = solve(catalog, previous, measures);
        let allocation = Allocation::build(catalog, map);
        let fitness = self
            .fitness
            .eval(catalog, &allocation, Some(previous), measures, Some(cache));
        let neutral_fitness = self.fitness.eval_neutral(catalog, &allocation, measures);
        OptResult {
            allocation,
            fitness,
            neutral_fitness,
            runtime: start.elapsed().as_secs_f64(),
        }
    }

    fn name(&self) -> String {
        "Greedy".to_string()
    }
}

/// Produces the greedy target map. Shared with the evolutionary repair
/// operator, which uses it as a full heuristic re-solve.
pub(crate) fn solve(catalog: &CloudCatalog, previous: &Allocation, measures: &SystemMeasures) -> AllocationMap {
    let mut map = previous.map().clone();

    let mut surplus = overprovisioned_capacity_per_service(catalog, previous, measures);
    let missing = missing_capacity_per_service(catalog, previous, measures);

    // Trim containers no longer paying for themselves.
    for containers in map.values_mut() {
        containers.retain(|ct| {
            let container_type = catalog.container_type(*ct);
            if let Some(excess) = surplus.get_mut(&container_type.service) {
                if *excess >= container_type.rpm_capacity {
                    *excess -= container_type.rpm_capacity;
                    return false;
                }
            }
            true
        });
    }
    map.retain(|_, containers| !containers.is_empty());

    // Size new containers for every service with a deficit.
    let mut pending = Vec::new();
    for service in catalog.service_ids() {
        if let Some(deficit) = missing.get(&service) {
            pending.extend(size_containers(catalog, service, *deficit));
        }
    }

    // Reuse pass: biggest memory footprint first onto already mapped VMs.
    pending.sort_by(|a, b| catalog.container_type(*b).memory.cmp(&catalog.container_type(*a).memory));
    let mut unplaced = Vec::new();
    for ct in pending {
        let target = map
            .keys()
            .find(|vm| can_place(catalog, &map, previous, **vm, ct))
            .cloned();
        match target {
            Some(vm) => place_container(&mut map, catalog, vm, ct),
            None => unplaced.push(ct),
        }
    }

    // New-capacity pass: pack the rest onto unleased VMs, cheapest first.
    let mut candidates: Vec<u32> = catalog.vm_ids().into_iter().filter(|vm| !map.contains_key(vm)).collect();
    candidates.sort_by(|a, b| catalog.hourly_cost(*a).total_cmp(&catalog.hourly_cost(*b)).then(a.cmp(b)));
    for vm in candidates {
        if unplaced.is_empty() {
            break;
        }
        unplaced.retain(|ct| {
            if can_place(catalog, &map, previous, vm, *ct) {
                place_container(&mut map, catalog, vm, *ct);
                false
            } else {
                true
            }
        });
    }

    if !unplaced.is_empty() {
        let services: Vec<&str> = unplaced
            .iter()
            .map(|ct| catalog.service(catalog.container_type(*ct).service).name.as_str())
            .collect();
        warn!(
            "could not place {} containers within available VMs (services: {:?}); applying under-provisioned allocation",
            unplaced.len(),
            services
        );
    }

    map
}

/// A container fits on a VM if the VM does not already host its service and
/// the grace-period-aware capacity check passes.
pub(crate) fn can_place(
    catalog: &CloudCatalog,
    map: &AllocationMap,
    previous: &Allocation,
    vm: u32,
    ct: u32,
) -> bool {
    let service = catalog.container_type(ct).service;
    let current = map.get(&vm).map_or(&[] as &[u32], |c| c.as_slice());
    if current.iter().any(|c| catalog.container_type(*c).service == service) {
        return false;
    }
    let mut candidate = current.to_vec();
    candidate.push(ct);
    !is_vm_overallocated(catalog, vm, &candidate, previous.containers_on(vm))
}

/// Chooses container sizes for a capacity deficit, walking the service's
/// sizes in descending capacity order. The current size keeps being taken
/// while the deficit is at least as large as it, or no smaller size exists,
/// or the deficit exceeds the next smaller size; otherwise the walk steps
/// down a size. Bounds both under-sizing and gross over-sizing.
pub(crate) fn size_containers(catalog: &CloudCatalog, service: u32, deficit: f64) -> Vec<u32> {
    let mut sizes = catalog.service(service).container_types.clone();
    sizes.sort_by(|a, b| {
        catalog
            .container_type(*b)
            .rpm_capacity
            .total_cmp(&catalog.container_type(*a).rpm_capacity)
    });

    let mut result = Vec::new();
    let mut remaining = deficit;
    let mut i = 0;
    while remaining > 0. && i < sizes.len() {
        let capacity = catalog.container_type(sizes[i]).rpm_capacity;
        let next_smaller = sizes.get(i + 1).map(|ct| catalog.container_type(*ct).rpm_capacity);
        let take = remaining >= capacity || next_smaller.map_or(true, |smaller| remaining > smaller);
        if take {
            result.push(sizes[i]);
            remaining -= capacity;
        } else {
            i += 1;
        }
    }
    result
}
