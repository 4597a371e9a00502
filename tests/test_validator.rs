mod common;

use fleetopt::core::allocation::{Allocation, AllocationMap};
use fleetopt::core::cloud::CloudCatalog;
use fleetopt::core::validator::{
    is_vm_overallocated, is_vm_overallocated_neutral, missing_capacity_per_service, neutral_violations,
    overallocated_vm_count, overprovisioned_capacity_per_service, violations,
};

use common::{cloud_catalog, measures};

/// One VM with 2 cores (2048 CPU units) and two single-size services:
/// service 0 with container X (1000 units) and service 1 with container Y
/// (1200 units).
fn grace_catalog() -> CloudCatalog {
    let mut catalog = CloudCatalog::new();
    let dc = catalog.add_data_center("dc", false);
    let vm_type = catalog.add_vm_type("m", 2, 4096, 0.1, dc);
    catalog.add_vm(vm_type);
    let a = catalog.add_service("a");
    catalog.add_container_type("x", 1000, 1024, 1000., a);
    let b = catalog.add_service("b");
    catalog.add_container_type("y", 1200, 1024, 1000., b);
    catalog
}

#[test]
// Replacing X (service a) with Y (service b) on the same VM keeps X's
// footprint on the machine through the grace period: 1200 + 1000 > 2048.
// Once X is no longer carried, Y alone fits.
fn test_grace_period_overallocation() {
    let catalog = grace_catalog();
    assert!(is_vm_overallocated(&catalog, 0, &[1], &[0]));
    assert!(!is_vm_overallocated_neutral(&catalog, 0, &[1]));
    assert!(!is_vm_overallocated(&catalog, 0, &[1], &[]));
}

#[test]
// A carried container whose service is still present is not abandoned
// demand: it is the one being vertically replaced.
fn test_same_service_carry_over_not_abandoned() {
    let catalog = cloud_catalog();
    // web-large (1024) replacing web-small (512) on a 2048-unit VM: the old
    // size is not counted on top.
    assert!(!is_vm_overallocated(&catalog, 0, &[1], &[0]));
    // An api container draining next to it is counted: 1024 + 1024 still fits.
    assert!(!is_vm_overallocated(&catalog, 0, &[1], &[0, 2]));
}

#[test]
fn test_missing_and_overprovisioned_capacity() {
    let catalog = cloud_catalog();
    let mut map = AllocationMap::new();
    map.insert(0, vec![1]);
    let allocation = Allocation::build(&catalog, map);
    let measures = measures(&[(0, 1600.), (1, 0.)]);

    let missing = missing_capacity_per_service(&catalog, &allocation, &measures);
    assert_eq!(missing.len(), 1);
    assert!((missing[&0] - 600.).abs() < 1e-9);

    let surplus = overprovisioned_capacity_per_service(&catalog, &allocation, &measures);
    assert!(surplus.get(&0).is_none());

    let covered = measures_covering();
    let surplus = overprovisioned_capacity_per_service(&catalog, &allocation, &covered);
    assert!((surplus[&0] - 200.).abs() < 1e-9);
}

fn measures_covering() -> fleetopt::core::measures::SystemMeasures {
    measures(&[(0, 800.), (1, 0.)])
}

#[test]
// Violations mix units on purpose: one per overallocated VM plus the raw
// RPM magnitude of unmet capacity.
fn test_violations_mixed_units() {
    let catalog = cloud_catalog();
    let mut map = AllocationMap::new();
    // 1024 + 1024 + 512 = 2560 > 2048: overallocated.
    map.insert(0, vec![1, 2, 0]);
    let allocation = Allocation::build(&catalog, map);
    // web capacity 1500 vs load 1500, api capacity 1000 vs load 1400.
    let measures = measures(&[(0, 1500.), (1, 1400.)]);

    assert_eq!(overallocated_vm_count(&catalog, &allocation, None), 1);
    let score = neutral_violations(&catalog, &allocation, &measures);
    assert!((score - 401.).abs() < 1e-9);
}

#[test]
// The grace-aware violation check tolerates what the neutral one rejects
// only when the overflow comes from carried-over demand, never the reverse.
fn test_violations_with_previous() {
    let catalog = grace_catalog();
    let mut previous_map = AllocationMap::new();
    previous_map.insert(0, vec![0]);
    let previous = Allocation::build(&catalog, previous_map);

    let mut map = AllocationMap::new();
    map.insert(0, vec![1]);
    let allocation = Allocation::build(&catalog, map);
    let measures = measures(&[(0, 0.), (1, 1000.)]);

    // Neutral: Y fits alone.
    assert!((neutral_violations(&catalog, &allocation, &measures) - 0.).abs() < 1e-9);
    // Grace-aware: X still drains on the VM, 2200 > 2048.
    assert!((violations(&catalog, &allocation, Some(&previous), &measures) - 1.).abs() < 1e-9);
}
