mod common;

use fleetopt::core::allocation::{Allocation, AllocationMap};
use fleetopt::core::cloud::CloudCatalog;
use fleetopt::core::fitness::FitnessFunction;
use fleetopt::core::optimizer::OptimizerStrategy;
use fleetopt::core::optimizers::greedy::GreedyOptimizer;
use fleetopt::core::provider::ImageCacheState;
use fleetopt::core::validator::{neutral_violations, overallocated_vm_count};

use common::{cloud_catalog, measures};

fn optimize(catalog: &CloudCatalog, previous: &Allocation, loads: &[(u32, f64)]) -> Allocation {
    let mut strategy = GreedyOptimizer::new(FitnessFunction::default());
    let measures = measures(loads);
    let cache = ImageCacheState::default();
    strategy.optimize(catalog, previous, &measures, &cache).allocation
}

#[test]
// One service with a single 1000-RPM size and 1500 RPM of load: two
// containers cover it (2000 >= 1500) on two VMs, since a VM may hold only
// one container per service, and nothing is overallocated.
fn test_minimal_sizing_covers_load() {
    let mut catalog = CloudCatalog::new();
    let dc = catalog.add_data_center("dc", false);
    let vm_type = catalog.add_vm_type("m", 2, 4096, 0.1, dc);
    for _ in 0..3 {
        catalog.add_vm(vm_type);
    }
    let svc = catalog.add_service("svc");
    catalog.add_container_type("std", 1000, 1024, 1000., svc);

    let previous = Allocation::empty(&catalog);
    let allocation = optimize(&catalog, &previous, &[(0, 1500.)]);

    assert_eq!(allocation.container_count(), 2);
    assert_eq!(allocation.used_vms().len(), 2);
    let capacity = allocation.capacity_per_service(&catalog);
    assert_eq!(capacity[&0], 2000.);
    let m = measures(&[(0, 1500.)]);
    assert_eq!(neutral_violations(&catalog, &allocation, &m), 0.);
}

#[test]
// A service whose load dropped to zero loses its containers; the emptied VM
// leaves the running set.
fn test_trim_overprovisioned_frees_vm() {
    let catalog = cloud_catalog();
    let mut map = AllocationMap::new();
    map.insert(0, vec![1]);
    let previous = Allocation::build(&catalog, map);

    let allocation = optimize(&catalog, &previous, &[(0, 0.), (1, 0.)]);

    assert_eq!(allocation.container_count(), 0);
    assert!(allocation.used_vms().is_empty());
    assert!(allocation.running_vms().is_empty());
    assert_eq!(allocation.total_cost(&catalog), 0.);
}

#[test]
// Trimming removes only as much as the surplus allows: with 1500 RPM of web
// capacity and 900 RPM of load, removing the 500-RPM container would fit the
// 600-RPM surplus but removing the 1000-RPM one would not.
fn test_trim_is_bounded_by_surplus() {
    let catalog = cloud_catalog();
    let mut map = AllocationMap::new();
    map.insert(0, vec![0]);
    map.insert(1, vec![1]);
    let previous = Allocation::build(&catalog, map);

    let allocation = optimize(&catalog, &previous, &[(0, 900.), (1, 0.)]);

    let capacity = allocation.capacity_per_service(&catalog);
    assert_eq!(capacity[&0], 1000.);
    assert_eq!(allocation.container_count(), 1);
}

#[test]
// Sizing steps down when the deficit fits a smaller container: 250 RPM of
// missing web load takes one web-small (500), not a web-large.
fn test_sizing_steps_down_to_smaller_sizes() {
    let catalog = cloud_catalog();
    let previous = Allocation::empty(&catalog);
    let allocation = optimize(&catalog, &previous, &[(0, 250.), (1, 0.)]);

    let capacity = allocation.capacity_per_service(&catalog);
    assert_eq!(capacity[&0], 500.);
    assert_eq!(allocation.container_count(), 1);
}

#[test]
// New containers land on already used VMs before any new VM is leased.
fn test_reuses_mapped_vms_first() {
    let catalog = cloud_catalog();
    let mut map = AllocationMap::new();
    map.insert(0, vec![0]);
    let previous = Allocation::build(&catalog, map);

    let allocation = optimize(&catalog, &previous, &[(0, 500.), (1, 800.)]);

    assert_eq!(allocation.used_vms(), vec![0]);
    assert_eq!(allocation.containers_on(0).len(), 2);
    assert!((allocation.total_cost(&catalog) - 0.2).abs() < 1e-9);
}

#[test]
// Placement is grace-period aware: capacity consumed by containers that are
// trimmed but still draining stays blocked for new placements.
fn test_placement_respects_draining_containers() {
    let mut catalog = CloudCatalog::new();
    let dc = catalog.add_data_center("dc", false);
    let vm_type = catalog.add_vm_type("m", 2, 4096, 0.1, dc);
    catalog.add_vm(vm_type);
    catalog.add_vm(vm_type);
    let a = catalog.add_service("a");
    catalog.add_container_type("a-std", 1100, 1024, 1000., a);
    let b = catalog.add_service("b");
    catalog.add_container_type("b-std", 1100, 1024, 1000., b);

    let mut map = AllocationMap::new();
    map.insert(0, vec![0]);
    let previous = Allocation::build(&catalog, map);

    // Service a drops out, service b comes in. VM 0 still carries the
    // draining a-container (1100 + 1100 > 2048), so b goes to VM 1.
    let allocation = optimize(&catalog, &previous, &[(0, 0.), (1, 800.)]);

    assert_eq!(allocation.used_vms(), vec![1]);
    assert_eq!(allocation.containers_on(1), &[1]);
    assert_eq!(overallocated_vm_count(&catalog, &allocation, Some(&previous)), 0);
}

#[test]
// Demand beyond what the fleet can hold is dropped, not fatal: the result is
// under-provisioned and flagged by the violation measure.
fn test_unplaceable_demand_is_not_fatal() {
    let catalog = cloud_catalog();
    let previous = Allocation::empty(&catalog);
    // 50000 RPM of web load wants 50 web-large containers; only 4 VMs exist
    // and each may hold one web container.
    let allocation = optimize(&catalog, &previous, &[(0, 50000.), (1, 0.)]);

    let capacity = allocation.capacity_per_service(&catalog);
    assert_eq!(capacity[&0], 4000.);
    let m = measures(&[(0, 50000.), (1, 0.)]);
    assert!(neutral_violations(&catalog, &allocation, &m) > 0.);
    assert_eq!(overallocated_vm_count(&catalog, &allocation, Some(&previous)), 0);
}
