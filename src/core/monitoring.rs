//! Interface to the external load monitor.

use std::collections::HashMap;

/// One cycle worth of measurements delivered by the monitor.
#[derive(Debug, Clone, Default)]
pub struct MonitoringResult {
    /// Requests per minute entering each service from outside the system.
    pub external_load: HashMap<u32, f64>,
    /// Requests per minute reaching each service from other services.
    pub internal_load: HashMap<u32, f64>,
    /// Total requests per minute per service.
    pub total_load: HashMap<u32, f64>,
    pub total_system_load: f64,
    /// Observed call volume between service pairs (directed).
    pub interaction: HashMap<(u32, u32), f64>,
}

/// Source of load measurements, implemented outside the core (live metrics
/// collector, trace replay, simulator).
pub trait Monitor {
    /// Returns the measurements for the cycle starting at `elapsed_seconds`,
    /// or `None` once the scenario has ended.
    fn current_load(&mut self, elapsed_seconds: f64) -> Option<MonitoringResult>;
}
