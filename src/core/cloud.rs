//! Static domain catalog: data centers, VM types and instances, services and
//! container types. Built once at startup and read-only during a run.

use std::collections::BTreeMap;

/// Number of CPU units corresponding to one physical core.
pub const CPU_UNITS_PER_CORE: u32 = 1024;

/// A physical location owning VM types and instances. VMs of an on-premise
/// data center are always running and cost nothing per hour.
#[derive(Debug, Clone)]
pub struct DataCenter {
    pub name: String,
    pub on_premise: bool,
}

/// A leasable machine size within one data center.
#[derive(Debug, Clone)]
pub struct VmType {
    pub label: String,
    pub cpu_units: u32,
    pub memory: u64,
    pub cost_per_hour: f64,
    pub data_center: u32,
}

/// A concrete VM. Identity is the id; the instance itself never changes.
#[derive(Debug, Clone)]
pub struct VmInstance {
    pub id: u32,
    pub vm_type: u32,
}

/// One deployable size of a service. `rpm_capacity` is the request rate a
/// single instance can serve.
#[derive(Debug, Clone)]
pub struct ContainerType {
    pub label: String,
    pub cpu_units: u32,
    pub memory: u64,
    pub rpm_capacity: f64,
    pub service: u32,
}

/// A service with its ordered list of container sizes and the call ratios to
/// downstream services (used by load generators, not by the optimizer).
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub container_types: Vec<u32>,
    pub downstream: Vec<(u32, f64)>,
}

/// Immutable lookup tables for the whole domain.
#[derive(Debug, Clone, Default)]
pub struct CloudCatalog {
    data_centers: Vec<DataCenter>,
    vm_types: Vec<VmType>,
    vms: BTreeMap<u32, VmInstance>,
    services: Vec<Service>,
    container_types: Vec<ContainerType>,
    latency: Vec<Vec<f64>>,
    next_vm_id: u32,
}

impl CloudCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data_center(&mut self, name: &str, on_premise: bool) -> u32 {
        self.data_centers.push(DataCenter {
            name: name.to_string(),
            on_premise,
        });
        for row in self.latency.iter_mut() {
            row.push(0.);
        }
        self.latency.push(vec![0.; self.data_centers.len()]);
        self.data_centers.len() as u32 - 1
    }

    pub fn add_vm_type(&mut self, label: &str, cores: u32, memory: u64, cost_per_hour: f64, data_center: u32) -> u32 {
        self.vm_types.push(VmType {
            label: label.to_string(),
            cpu_units: cores * CPU_UNITS_PER_CORE,
            memory,
            cost_per_hour,
            data_center,
        });
        self.vm_types.len() as u32 - 1
    }

    pub fn add_vm(&mut self, vm_type: u32) -> u32 {
        let id = self.next_vm_id;
        self.next_vm_id += 1;
        self.vms.insert(id, VmInstance { id, vm_type });
        id
    }

    pub fn add_service(&mut self, name: &str) -> u32 {
        self.services.push(Service {
            name: name.to_string(),
            container_types: Vec::new(),
            downstream: Vec::new(),
        });
        self.services.len() as u32 - 1
    }

    pub fn add_container_type(&mut self, label: &str, cpu_units: u32, memory: u64, rpm_capacity: f64, service: u32) -> u32 {
        self.container_types.push(ContainerType {
            label: label.to_string(),
            cpu_units,
            memory,
            rpm_capacity,
            service,
        });
        let id = self.container_types.len() as u32 - 1;
        self.services[service as usize].container_types.push(id);
        id
    }

    pub fn add_downstream(&mut self, from: u32, to: u32, ratio: f64) {
        self.services[from as usize].downstream.push((to, ratio));
    }

    /// Sets the symmetric network latency between two data centers.
    pub fn set_latency(&mut self, dc_a: u32, dc_b: u32, latency: f64) {
        self.latency[dc_a as usize][dc_b as usize] = latency;
        self.latency[dc_b as usize][dc_a as usize] = latency;
    }

    pub fn data_center(&self, id: u32) -> &DataCenter {
        &self.data_centers[id as usize]
    }

    pub fn vm_type(&self, id: u32) -> &VmType {
        &self.vm_types[id as usize]
    }

    pub fn vm(&self, id: u32) -> &VmInstance {
        &self.vms[&id]
    }

    pub fn service(&self, id: u32) -> &Service {
        &self.services[id as usize]
    }

    pub fn container_type(&self, id: u32) -> &ContainerType {
        &self.container_types[id as usize]
    }

    /// Returns IDs of all VM instances in catalog order.
    pub fn vm_ids(&self) -> Vec<u32> {
        self.vms.keys().cloned().collect()
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn service_ids(&self) -> Vec<u32> {
        (0..self.services.len() as u32).collect()
    }

    pub fn vm_cpu_capacity(&self, vm: u32) -> u32 {
        self.vm_type(self.vm(vm).vm_type).cpu_units
    }

    pub fn vm_memory_capacity(&self, vm: u32) -> u64 {
        self.vm_type(self.vm(vm).vm_type).memory
    }

    pub fn is_on_premise(&self, vm: u32) -> bool {
        let vm_type = self.vm_type(self.vm(vm).vm_type);
        self.data_center(vm_type.data_center).on_premise
    }

    /// Hourly leasing cost of a VM. On-premise machines are owned, not
    /// leased, so they cost nothing regardless of their type's price tag.
    pub fn hourly_cost(&self, vm: u32) -> f64 {
        if self.is_on_premise(vm) {
            0.
        } else {
            self.vm_type(self.vm(vm).vm_type).cost_per_hour
        }
    }

    pub fn on_premise_vms(&self) -> Vec<u32> {
        self.vms
            .keys()
            .cloned()
            .filter(|vm| self.is_on_premise(*vm))
            .collect()
    }

    /// Network distance between two VMs, modeled as the latency between
    /// their data centers. A VM's distance to itself is 0.
    pub fn distance(&self, vm_a: u32, vm_b: u32) -> f64 {
        if vm_a == vm_b {
            return 0.;
        }
        let dc_a = self.vm_type(self.vm(vm_a).vm_type).data_center;
        let dc_b = self.vm_type(self.vm(vm_b).vm_type).data_center;
        self.latency[dc_a as usize][dc_b as usize]
    }
}
