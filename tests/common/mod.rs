#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use fleetopt::core::cloud::CloudCatalog;
use fleetopt::core::measures::{ServiceLoad, SystemMeasures};
use fleetopt::core::monitoring::{Monitor, MonitoringResult};
use fleetopt::core::provider::CloudProvider;

/// One cloud data center with 4 identical VMs (ids 0..=3, 2 cores = 2048 CPU
/// units, 4096 MB, 0.2/h) and two services:
/// web (id 0) with web-small (ct 0: 512 units, 512 MB, 500 RPM) and
/// web-large (ct 1: 1024 units, 1024 MB, 1000 RPM);
/// api (id 1) with api-std (ct 2: 1024 units, 1024 MB, 1000 RPM).
pub fn cloud_catalog() -> CloudCatalog {
    let mut catalog = CloudCatalog::new();
    let cloud = catalog.add_data_center("cloud-east", false);
    let vm_type = catalog.add_vm_type("m.small", 2, 4096, 0.2, cloud);
    for _ in 0..4 {
        catalog.add_vm(vm_type);
    }
    let web = catalog.add_service("web");
    catalog.add_container_type("web-small", 512, 512, 500., web);
    catalog.add_container_type("web-large", 1024, 1024, 1000., web);
    let api = catalog.add_service("api");
    catalog.add_container_type("api-std", 1024, 1024, 1000., api);
    catalog.add_downstream(api, web, 0.5);
    catalog
}

/// Same as [`cloud_catalog`] plus an on-premise data center with one VM
/// (id 4, 4 cores, 8192 MB).
pub fn catalog_with_on_premise() -> CloudCatalog {
    let mut catalog = cloud_catalog();
    let on_premise = catalog.add_data_center("basement", true);
    let vm_type = catalog.add_vm_type("rack", 4, 8192, 0.5, on_premise);
    catalog.add_vm(vm_type);
    catalog.set_latency(0, on_premise, 10.);
    catalog
}

pub fn measures(loads: &[(u32, f64)]) -> SystemMeasures {
    measures_with_interaction(loads, &[])
}

pub fn measures_with_interaction(loads: &[(u32, f64)], edges: &[((u32, u32), f64)]) -> SystemMeasures {
    let loads: HashMap<u32, ServiceLoad> = loads
        .iter()
        .map(|(service, load)| {
            (
                *service,
                ServiceLoad {
                    external: *load,
                    internal: 0.,
                    total: *load,
                },
            )
        })
        .collect();
    let interaction: HashMap<(u32, u32), f64> = edges.iter().cloned().collect();
    SystemMeasures::new(loads, interaction)
}

/// Monitor replaying a fixed sequence of per-service loads, then signaling
/// scenario end.
pub struct ScriptedMonitor {
    steps: Vec<Vec<(u32, f64)>>,
    interaction: Vec<((u32, u32), f64)>,
    cursor: usize,
}

impl ScriptedMonitor {
    pub fn new(steps: Vec<Vec<(u32, f64)>>, interaction: Vec<((u32, u32), f64)>) -> Self {
        Self {
            steps,
            interaction,
            cursor: 0,
        }
    }

    /// The same loads replayed for `cycles` cycles.
    pub fn constant(loads: Vec<(u32, f64)>, cycles: usize) -> Self {
        Self::new(vec![loads; cycles], Vec::new())
    }
}

impl Monitor for ScriptedMonitor {
    fn current_load(&mut self, _elapsed_seconds: f64) -> Option<MonitoringResult> {
        if self.cursor >= self.steps.len() {
            return None;
        }
        let loads = &self.steps[self.cursor];
        self.cursor += 1;
        let external: HashMap<u32, f64> = loads.iter().cloned().collect();
        Some(MonitoringResult {
            external_load: external.clone(),
            internal_load: external.keys().map(|s| (*s, 0.)).collect(),
            total_load: external.clone(),
            total_system_load: external.values().sum(),
            interaction: self.interaction.iter().cloned().collect(),
        })
    }
}

/// Provider stub that records every call in order.
pub struct RecordingProvider {
    pub log: Rc<RefCell<Vec<String>>>,
    next_handle: u64,
}

impl RecordingProvider {
    pub fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                log: log.clone(),
                next_handle: 0,
            },
            log,
        )
    }
}

impl CloudProvider for RecordingProvider {
    fn launch_vm(&mut self, vm_type: &str, data_center: &str) -> u64 {
        self.next_handle += 1;
        self.log
            .borrow_mut()
            .push(format!("launch_vm {} {} -> {}", vm_type, data_center, self.next_handle));
        self.next_handle
    }

    fn terminate_vm(&mut self, vm: u64) {
        self.log.borrow_mut().push(format!("terminate_vm {}", vm));
    }

    fn launch_container(&mut self, cpu_units: u32, memory: u64, vm: u64) -> u64 {
        self.next_handle += 1;
        self.log.borrow_mut().push(format!(
            "launch_container {}/{} on {} -> {}",
            cpu_units, memory, vm, self.next_handle
        ));
        self.next_handle
    }

    fn terminate_container(&mut self, container: u64) {
        self.log.borrow_mut().push(format!("terminate_container {}", container));
    }

    fn abort(&mut self) {
        self.log.borrow_mut().push("abort".to_string());
    }
}

/// Minimal provider for multi-threaded tests: only hands out handles.
#[derive(Default)]
pub struct CountingProvider {
    next_handle: u64,
}

impl CloudProvider for CountingProvider {
    fn launch_vm(&mut self, _vm_type: &str, _data_center: &str) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn terminate_vm(&mut self, _vm: u64) {}

    fn launch_container(&mut self, _cpu_units: u32, _memory: u64, _vm: u64) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn terminate_container(&mut self, _container: u64) {}

    fn abort(&mut self) {}
}
