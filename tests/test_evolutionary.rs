mod common;

use rand::SeedableRng;
use rand_pcg::Pcg64;

use fleetopt::core::allocation::{Allocation, AllocationMap};
use fleetopt::core::cloud::CloudCatalog;
use fleetopt::core::fitness::FitnessFunction;
use fleetopt::core::optimizer::OptimizerStrategy;
use fleetopt::core::optimizers::evolutionary::EvolutionaryOptimizer;
use fleetopt::core::optimizers::genome::GenomeLayout;
use fleetopt::core::optimizers::repair::{GreedyRepair, RepairConstraint, RepairContext};
use fleetopt::core::provider::ImageCacheState;
use fleetopt::core::validator::{missing_capacity_per_service, overallocated_vm_count};

use common::{cloud_catalog, measures};

/// Two VMs of 2048 CPU units and two single-size services whose containers
/// (1100 units each) cannot share a VM.
fn tight_catalog() -> CloudCatalog {
    let mut catalog = CloudCatalog::new();
    let dc = catalog.add_data_center("dc", false);
    let vm_type = catalog.add_vm_type("m", 2, 4096, 0.1, dc);
    catalog.add_vm(vm_type);
    catalog.add_vm(vm_type);
    let a = catalog.add_service("a");
    catalog.add_container_type("a-std", 1100, 1024, 1000., a);
    let b = catalog.add_service("b");
    catalog.add_container_type("b-std", 1100, 1024, 1000., b);
    catalog
}

#[test]
// The search returns a feasible allocation that covers the measured load.
fn test_search_finds_feasible_covering_allocation() {
    let catalog = cloud_catalog();
    let previous = Allocation::empty(&catalog);
    let m = measures(&[(0, 800.), (1, 600.)]);
    let cache = ImageCacheState::default();

    let mut strategy = EvolutionaryOptimizer::with_params(FitnessFunction::default(), 7, 30, 40);
    let result = strategy.optimize(&catalog, &previous, &m, &cache);

    assert_eq!(overallocated_vm_count(&catalog, &result.allocation, Some(&previous)), 0);
    assert!(missing_capacity_per_service(&catalog, &result.allocation, &m).is_empty());
    assert!(result.allocation.total_cost(&catalog) > 0.);
    assert!(result.runtime >= 0.);
}

#[test]
// Identical seeds produce identical results.
fn test_search_is_deterministic() {
    let catalog = cloud_catalog();
    let previous = Allocation::empty(&catalog);
    let m = measures(&[(0, 800.), (1, 600.)]);
    let cache = ImageCacheState::default();

    let mut first = EvolutionaryOptimizer::with_params(FitnessFunction::default(), 11, 20, 25);
    let mut second = EvolutionaryOptimizer::with_params(FitnessFunction::default(), 11, 20, 25);
    let a = first.optimize(&catalog, &previous, &m, &cache);
    let b = second.optimize(&catalog, &previous, &m, &cache);

    assert_eq!(a.allocation, b.allocation);
    assert_eq!(a.fitness, b.fitness);
}

#[test]
// A feasible candidate always passes the constraint test; an overallocated
// one is rejected whenever the probabilistic gate actually checks.
fn test_constraint_gate() {
    let catalog = tight_catalog();
    let previous = Allocation::empty(&catalog);
    let m = measures(&[(0, 1000.), (1, 1000.)]);
    let layout = GenomeLayout::new(&catalog, &m);
    let ctx = RepairContext {
        catalog: &catalog,
        layout: &layout,
        previous: &previous,
        measures: &m,
    };

    let mut feasible_map = AllocationMap::new();
    feasible_map.insert(0, vec![0]);
    feasible_map.insert(1, vec![1]);
    let feasible = layout.encode(&catalog, &feasible_map);

    let mut overallocated_map = AllocationMap::new();
    overallocated_map.insert(0, vec![0, 1]);
    let overallocated = layout.encode(&catalog, &overallocated_map);

    let mut repair = GreedyRepair::new(Pcg64::seed_from_u64(3));
    let mut rejections = 0;
    for _ in 0..200 {
        assert!(repair.test(&ctx, &feasible));
        if !repair.test(&ctx, &overallocated) {
            rejections += 1;
        }
    }
    // The gate skips the check with probability 0.8, but 200 draws reject
    // an infeasible candidate many times.
    assert!(rejections > 0);
}

#[test]
// Repair always turns an overallocated candidate into a feasible one and
// restores capacity coverage, whichever internal path it takes.
fn test_repair_produces_feasible_candidates() {
    let catalog = tight_catalog();
    let previous = Allocation::empty(&catalog);
    let m = measures(&[(0, 1000.), (1, 1000.)]);
    let layout = GenomeLayout::new(&catalog, &m);
    let ctx = RepairContext {
        catalog: &catalog,
        layout: &layout,
        previous: &previous,
        measures: &m,
    };

    let mut broken_map = AllocationMap::new();
    broken_map.insert(0, vec![0, 1]);
    let broken = layout.encode(&catalog, &broken_map);

    let mut repair = GreedyRepair::new(Pcg64::seed_from_u64(17));
    for _ in 0..20 {
        let repaired = repair.repair(&ctx, &broken);
        let allocation = Allocation::build(&catalog, layout.decode(&catalog, &repaired));
        assert_eq!(overallocated_vm_count(&catalog, &allocation, Some(&previous)), 0);
        assert!(missing_capacity_per_service(&catalog, &allocation, &m).is_empty());
    }
}
