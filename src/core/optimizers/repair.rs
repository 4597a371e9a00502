//! Constraint-repair operator for the evolutionary strategy.

use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::core::allocation::{place_container, Allocation, AllocationMap};
use crate::core::cloud::CloudCatalog;
use crate::core::measures::SystemMeasures;
use crate::core::optimizers::genome::{Chromosome, GenomeLayout};
use crate::core::optimizers::greedy;
use crate::core::validator::{is_vm_overallocated, missing_capacity_per_service, overallocated_vm_count};

/// Everything a repair operator needs to judge and fix a candidate.
pub struct RepairContext<'a> {
    pub catalog: &'a CloudCatalog,
    pub layout: &'a GenomeLayout,
    pub previous: &'a Allocation,
    pub measures: &'a SystemMeasures,
}

/// Constraint plugged into the generational loop: `test` decides whether a
/// candidate is acceptable, `repair` fixes a rejected one. Implementations
/// carry no state besides their RNG, so they can be unit-tested outside the
/// search loop.
pub trait RepairConstraint {
    fn test(&mut self, ctx: &RepairContext, chromosome: &Chromosome) -> bool;

    fn repair(&mut self, ctx: &RepairContext, chromosome: &Chromosome) -> Chromosome;
}

/// Default repair operator.
///
/// `test` accepts unconditionally with probability 0.8 (cheap, keeps
/// diversity) and otherwise requires zero overallocated VMs; an
/// under-provisioned candidate passes the gate and is left to the fitness
/// penalty. `repair` substitutes the full greedy re-solve with probability
/// 0.2 (diversity injection) and otherwise runs the reparation routine.
pub struct GreedyRepair {
    rng: Pcg64,
    accept_probability: f64,
    resolve_probability: f64,
}

impl GreedyRepair {
    pub fn new(rng: Pcg64) -> Self {
        Self {
            rng,
            accept_probability: 0.8,
            resolve_probability: 0.2,
        }
    }
}

impl RepairConstraint for GreedyRepair {
    fn test(&mut self, ctx: &RepairContext, chromosome: &Chromosome) -> bool {
        if self.rng.gen_bool(self.accept_probability) {
            return true;
        }
        let map = ctx.layout.decode(ctx.catalog, chromosome);
        let allocation = Allocation::build(ctx.catalog, map);
        overallocated_vm_count(ctx.catalog, &allocation, Some(ctx.previous)) == 0
    }

    fn repair(&mut self, ctx: &RepairContext, chromosome: &Chromosome) -> Chromosome {
        if self.rng.gen_bool(self.resolve_probability) {
            let map = greedy::solve(ctx.catalog, ctx.previous, ctx.measures);
            return ctx.layout.encode(ctx.catalog, &map);
        }
        let map = reparation(ctx, &mut self.rng, ctx.layout.decode(ctx.catalog, chromosome));
        ctx.layout.encode(ctx.catalog, &map)
    }
}

/// The reparation routine: re-admit containers per VM until feasible, then
/// cover the remaining capacity deficits with best-fit sized containers and
/// place everything back, reusing VMs before leasing new ones.
fn reparation(ctx: &RepairContext, rng: &mut Pcg64, decoded: AllocationMap) -> AllocationMap {
    let catalog = ctx.catalog;
    let previous = ctx.previous;

    let mut vms: Vec<u32> = decoded.keys().cloned().collect();
    vms.shuffle(rng);

    let mut map = AllocationMap::new();
    let mut to_move = Vec::new();
    for vm in vms {
        let mut containers = decoded[&vm].clone();
        let carried = previous.containers_on(vm);
        if !is_vm_overallocated(catalog, vm, &containers, carried) {
            map.insert(vm, containers);
            continue;
        }
        containers.shuffle(rng);
        let mut kept: Vec<u32> = Vec::new();
        for ct in containers {
            let mut candidate = kept.clone();
            candidate.push(ct);
            if is_vm_overallocated(catalog, vm, &candidate, carried) {
                to_move.push(ct);
            } else {
                kept = candidate;
            }
        }
        map.insert(vm, kept);
    }

    // Residual deficits, net of the capacity the to-move containers still carry.
    let partial = Allocation::build(catalog, map.clone());
    let mut missing = missing_capacity_per_service(catalog, &partial, ctx.measures);
    for ct in &to_move {
        let container_type = catalog.container_type(*ct);
        if let Some(deficit) = missing.get_mut(&container_type.service) {
            *deficit -= container_type.rpm_capacity;
        }
    }

    let mut pending = to_move;
    for service in catalog.service_ids() {
        if let Some(deficit) = missing.get(&service) {
            if *deficit > 0. {
                pending.extend(size_best_fit(catalog, service, *deficit));
            }
        }
    }

    // Reuse pass over already used VMs.
    let mut unplaced = Vec::new();
    for ct in pending {
        let target = map
            .iter()
            .filter(|(_, containers)| !containers.is_empty())
            .map(|(vm, _)| *vm)
            .find(|vm| greedy::can_place(catalog, &map, previous, *vm, ct));
        match target {
            Some(vm) => place_container(&mut map, catalog, vm, ct),
            None => unplaced.push(ct),
        }
    }

    // Then unused VMs: previously abandoned ones before fresh ones, cheapest
    // first within each group.
    let mut candidates: Vec<u32> = catalog
        .vm_ids()
        .into_iter()
        .filter(|vm| map.get(vm).map_or(true, |c| c.is_empty()))
        .collect();
    candidates.sort_by(|a, b| {
        // Abandoned VMs (used by the previous allocation) sort before fresh ones.
        let fresh = |vm: &u32| !previous.is_used(*vm);
        fresh(a)
            .cmp(&fresh(b))
            .then(catalog.hourly_cost(*a).total_cmp(&catalog.hourly_cost(*b)))
            .then(a.cmp(b))
    });
    for vm in candidates {
        if unplaced.is_empty() {
            break;
        }
        unplaced.retain(|ct| {
            if greedy::can_place(catalog, &map, previous, vm, *ct) {
                place_container(&mut map, catalog, vm, *ct);
                false
            } else {
                true
            }
        });
    }

    if !unplaced.is_empty() {
        warn!("reparation left {} containers unplaced", unplaced.len());
    }

    map.retain(|_, containers| !containers.is_empty());
    map
}

/// Best-fit sizing used by the reparation routine: the smallest size whose
/// capacity covers the deficit, else the largest size smaller than it.
fn size_best_fit(catalog: &CloudCatalog, service: u32, deficit: f64) -> Vec<u32> {
    let mut sizes = catalog.service(service).container_types.clone();
    sizes.sort_by(|a, b| {
        catalog
            .container_type(*a)
            .rpm_capacity
            .total_cmp(&catalog.container_type(*b).rpm_capacity)
    });
    let mut result = Vec::new();
    let mut remaining = deficit;
    while remaining > 0. && !sizes.is_empty() {
        match sizes
            .iter()
            .find(|ct| catalog.container_type(**ct).rpm_capacity >= remaining)
        {
            Some(ct) => {
                result.push(*ct);
                remaining = 0.;
            }
            None => {
                let largest = *sizes.last().unwrap();
                result.push(largest);
                remaining -= catalog.container_type(largest).rpm_capacity;
            }
        }
    }
    result
}
