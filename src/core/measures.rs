//! Measured system state for one control cycle.

use std::collections::HashMap;

use crate::core::monitoring::MonitoringResult;

/// Request load of one service, split by origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServiceLoad {
    pub external: f64,
    pub internal: f64,
    pub total: f64,
}

/// Per-cycle measurements: request load per service, the inter-service
/// interaction graph, and the affinity graph derived from it.
#[derive(Debug, Clone, Default)]
pub struct SystemMeasures {
    loads: HashMap<u32, ServiceLoad>,
    total_system_load: f64,
    interaction: HashMap<(u32, u32), f64>,
    affinity: HashMap<(u32, u32), f64>,
}

impl SystemMeasures {
    pub fn new(loads: HashMap<u32, ServiceLoad>, interaction: HashMap<(u32, u32), f64>) -> Self {
        let total_system_load = loads.values().map(|l| l.total).sum();
        let affinity = compute_affinity(&interaction);
        Self {
            loads,
            total_system_load,
            interaction,
            affinity,
        }
    }

    pub fn from_monitoring(result: &MonitoringResult) -> Self {
        let mut loads = HashMap::new();
        for (service, total) in &result.total_load {
            loads.insert(
                *service,
                ServiceLoad {
                    external: result.external_load.get(service).copied().unwrap_or(0.),
                    internal: result.internal_load.get(service).copied().unwrap_or(0.),
                    total: *total,
                },
            );
        }
        Self::new(loads, result.interaction.clone())
    }

    /// Applies the scenario scale factor to all measured loads. Affinity is a
    /// normalized ratio and is unaffected.
    pub fn scaled(mut self, factor: f64) -> Self {
        for load in self.loads.values_mut() {
            load.external *= factor;
            load.internal *= factor;
            load.total *= factor;
        }
        self.total_system_load *= factor;
        self
    }

    pub fn total_load(&self, service: u32) -> f64 {
        self.loads.get(&service).map_or(0., |l| l.total)
    }

    pub fn total_system_load(&self) -> f64 {
        self.total_system_load
    }

    pub fn loads(&self) -> &HashMap<u32, ServiceLoad> {
        &self.loads
    }

    pub fn interaction(&self, a: u32, b: u32) -> f64 {
        self.interaction.get(&(a, b)).copied().unwrap_or(0.)
    }

    /// Normalized bidirectional call volume between two services, in [0, 1].
    pub fn affinity(&self, a: u32, b: u32) -> f64 {
        self.affinity.get(&(a, b)).copied().unwrap_or(0.)
    }
}

/// Affinity of a pair is its bidirectional interaction volume divided by the
/// maximum bidirectional volume over all pairs.
fn compute_affinity(interaction: &HashMap<(u32, u32), f64>) -> HashMap<(u32, u32), f64> {
    let mut bidirectional: HashMap<(u32, u32), f64> = HashMap::new();
    for ((from, to), weight) in interaction {
        let key = if from <= to { (*from, *to) } else { (*to, *from) };
        *bidirectional.entry(key).or_insert(0.) += weight;
    }
    let max = bidirectional.values().cloned().fold(0., f64::max);
    let mut affinity = HashMap::new();
    if max > 0. {
        for ((a, b), volume) in bidirectional {
            affinity.insert((a, b), volume / max);
            affinity.insert((b, a), volume / max);
        }
    }
    affinity
}
