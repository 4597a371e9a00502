//! Turns allocation diffs into provider calls.

use std::collections::BTreeSet;

use log::debug;

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::provider::{CloudProvider, ProviderState};

/// Applies the target allocation: launches missing VMs, starts missing
/// containers, then stops leftover containers and kills leftover VMs, in
/// that order so new capacity is up before anything old goes away. Updates
/// the provider-side bookkeeping including the warm-image cache.
pub fn execute(
    catalog: &CloudCatalog,
    provider: &mut dyn CloudProvider,
    target: &Allocation,
    state: &mut ProviderState,
) {
    let current = state.live.clone();

    // Launch everything that should run but has no provider handle yet. This
    // also brings up on-premise VMs on the first cycle: they are part of
    // every running set and never get killed below.
    for vm in target.running_vms() {
        if state.vm_handles.contains_key(vm) {
            continue;
        }
        let vm_type = catalog.vm_type(catalog.vm(*vm).vm_type);
        let data_center = catalog.data_center(vm_type.data_center);
        let handle = provider.launch_vm(&vm_type.label, &data_center.name);
        state.vm_handles.insert(*vm, handle);
        debug!("launched VM {} ({} in {})", vm, vm_type.label, data_center.name);
    }

    let current_tuples: BTreeSet<(u32, u32)> = current.tuples().iter().map(|t| (t.vm, t.container_type)).collect();
    let target_tuples: BTreeSet<(u32, u32)> = target.tuples().iter().map(|t| (t.vm, t.container_type)).collect();

    for (vm, ct) in target_tuples.difference(&current_tuples) {
        let container_type = catalog.container_type(*ct);
        let vm_handle = state.vm_handles[vm];
        let handle = provider.launch_container(container_type.cpu_units, container_type.memory, vm_handle);
        state.container_handles.insert((*vm, *ct), handle);
        if state.image_cache.insert(*vm, container_type.service) {
            state.image_downloads += 1;
            debug!(
                "image of service {} downloaded to VM {}",
                catalog.service(container_type.service).name,
                vm
            );
        }
        debug!("started container {} on VM {}", container_type.label, vm);
    }

    for key in current_tuples.difference(&target_tuples) {
        if let Some(handle) = state.container_handles.remove(key) {
            provider.terminate_container(handle);
            debug!("stopped container {} on VM {}", catalog.container_type(key.1).label, key.0);
        }
    }

    for vm in current.running_vms().difference(target.running_vms()) {
        if let Some(handle) = state.vm_handles.remove(vm) {
            provider.terminate_vm(handle);
        }
        state.image_cache.clear_vm(*vm);
        debug!("killed VM {}", vm);
    }

    state.live = target.clone();
}
