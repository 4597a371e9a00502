//! Scenario configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::cloud::CloudCatalog;
use crate::core::fitness::FitnessWeights;

/// Holds the raw scenario config parsed from a YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawScenarioConfig {
    pub cycle_interval: Option<f64>,
    pub scale_factor: Option<f64>,
    pub strategy: Option<String>,
    pub weights: Option<FitnessWeights>,
    pub data_centers: Option<Vec<DataCenterConfig>>,
    pub latency: Option<Vec<LatencyConfig>>,
    pub services: Option<Vec<ServiceConfig>>,
}

/// Configuration of one data center and its VM types.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DataCenterConfig {
    pub name: String,
    /// On-premise machines are always running and cost nothing.
    pub on_premise: Option<bool>,
    pub vm_types: Vec<VmTypeConfig>,
}

/// Configuration of a VM type and how many instances of it exist.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmTypeConfig {
    pub label: String,
    /// CPU cores; capacity in CPU units is cores * 1024.
    pub cores: u32,
    /// Memory capacity in MB.
    pub memory: u64,
    pub cost_per_hour: f64,
    /// Number of leasable instances of this type.
    pub count: Option<u32>,
}

/// One entry of the symmetric inter-data-center latency table.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct LatencyConfig {
    pub from: String,
    pub to: String,
    pub latency: f64,
}

/// Configuration of a service: its container sizes and downstream call ratios.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub container_types: Vec<ContainerTypeConfig>,
    /// Fraction of this service's requests that fan out to each downstream
    /// service, by name.
    pub downstream: Option<HashMap<String, f64>>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ContainerTypeConfig {
    pub label: String,
    pub cpu_units: u32,
    /// Memory requirement in MB.
    pub memory: u64,
    /// Requests per minute one instance can serve.
    pub rpm_capacity: f64,
}

/// Represents a full scenario configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ScenarioConfig {
    /// Seconds between control cycles.
    pub cycle_interval: f64,
    /// Multiplier applied to all measured loads.
    pub scale_factor: f64,
    /// Optimizer strategy string, e.g. `Evolutionary[seed=42]`.
    pub strategy: String,
    pub weights: FitnessWeights,
    pub data_centers: Vec<DataCenterConfig>,
    pub latency: Vec<LatencyConfig>,
    pub services: Vec<ServiceConfig>,
}

impl ScenarioConfig {
    /// Creates a scenario config by reading parameter values from a YAML
    /// file (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        Self::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Self {
        let raw: RawScenarioConfig =
            serde_yaml::from_str(content).unwrap_or_else(|e| panic!("Can't parse YAML config: {}", e));
        Self {
            cycle_interval: raw.cycle_interval.unwrap_or(30.),
            scale_factor: raw.scale_factor.unwrap_or(1.),
            strategy: raw.strategy.unwrap_or_else(|| "Greedy".to_string()),
            weights: raw.weights.unwrap_or_default(),
            data_centers: raw.data_centers.unwrap_or_default(),
            latency: raw.latency.unwrap_or_default(),
            services: raw.services.unwrap_or_default(),
        }
    }
}

impl CloudCatalog {
    /// Builds the immutable domain catalog from a scenario config.
    pub fn from_config(config: &ScenarioConfig) -> Self {
        let mut catalog = CloudCatalog::new();
        let mut dc_ids = HashMap::new();
        for dc in &config.data_centers {
            let id = catalog.add_data_center(&dc.name, dc.on_premise.unwrap_or(false));
            dc_ids.insert(dc.name.clone(), id);
            for vm_type in &dc.vm_types {
                let type_id = catalog.add_vm_type(&vm_type.label, vm_type.cores, vm_type.memory, vm_type.cost_per_hour, id);
                for _ in 0..vm_type.count.unwrap_or(1) {
                    catalog.add_vm(type_id);
                }
            }
        }
        for entry in &config.latency {
            let from = *dc_ids
                .get(&entry.from)
                .unwrap_or_else(|| panic!("Unknown data center in latency table: {}", entry.from));
            let to = *dc_ids
                .get(&entry.to)
                .unwrap_or_else(|| panic!("Unknown data center in latency table: {}", entry.to));
            catalog.set_latency(from, to, entry.latency);
        }
        let mut service_ids = HashMap::new();
        for service in &config.services {
            let id = catalog.add_service(&service.name);
            service_ids.insert(service.name.clone(), id);
            for ct in &service.container_types {
                if ct.rpm_capacity <= 0. {
                    panic!("Container type {} must have positive rpm_capacity", ct.label);
                }
                catalog.add_container_type(&ct.label, ct.cpu_units, ct.memory, ct.rpm_capacity, id);
            }
        }
        for service in &config.services {
            if let Some(downstream) = &service.downstream {
                let from = service_ids[&service.name];
                for (name, ratio) in downstream {
                    let to = *service_ids
                        .get(name)
                        .unwrap_or_else(|| panic!("Unknown downstream service: {}", name));
                    catalog.add_downstream(from, to, *ratio);
                }
            }
        }
        catalog
    }
}

/// Parses a config value string consisting of a name and an optional options
/// part, e.g. `Evolutionary[seed=42,population=100]`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses an options string into a map of option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.to_string(), value.to_string());
        }
    }
    options
}
