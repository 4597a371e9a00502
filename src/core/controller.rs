//! The control cycle driver: monitor, analyze and plan, execute, report.

use log::{error, info};

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::config::ScenarioConfig;
use crate::core::error::ControllerError;
use crate::core::executor::execute;
use crate::core::fitness::FitnessFunction;
use crate::core::measures::SystemMeasures;
use crate::core::monitoring::Monitor;
use crate::core::optimizer::optimizer_resolver;
use crate::core::planner::{PlanOutcome, Planner};
use crate::core::provider::{CloudProvider, ProviderState};
use crate::core::stats::{CycleStats, StatsRecorder};
use crate::core::validator::missing_capacity_per_service;

/// Result of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    Continue,
    /// The monitor has no more data; the run shut down gracefully.
    ScenarioEnded,
}

/// Owns all components and runs the control loop against the external
/// monitor and provider.
pub struct FleetController {
    catalog: CloudCatalog,
    monitor: Box<dyn Monitor>,
    provider: Box<dyn CloudProvider>,
    planner: Planner,
    state: ProviderState,
    current: Allocation,
    stats: StatsRecorder,
    cycle_interval: f64,
    scale_factor: f64,
    cycle: u64,
    time: f64,
}

impl FleetController {
    pub fn new(config: &ScenarioConfig, monitor: Box<dyn Monitor>, provider: Box<dyn CloudProvider>) -> Self {
        let catalog = CloudCatalog::from_config(config);
        let strategy = optimizer_resolver(&config.strategy, config.weights);
        let planner = Planner::new(strategy, FitnessFunction::new(config.weights));
        let state = ProviderState::new(&catalog);
        let current = Allocation::empty(&catalog);
        Self {
            catalog,
            monitor,
            provider,
            planner,
            state,
            current,
            stats: StatsRecorder::new(),
            cycle_interval: config.cycle_interval,
            scale_factor: config.scale_factor,
            cycle: 0,
            time: 0.,
        }
    }

    pub fn catalog(&self) -> &CloudCatalog {
        &self.catalog
    }

    pub fn current_allocation(&self) -> &Allocation {
        &self.current
    }

    pub fn provider_state(&self) -> &ProviderState {
        &self.state
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Runs one monitor-plan-execute cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, ControllerError> {
        let Some(result) = self.monitor.current_load(self.time) else {
            info!("scenario ended after {} cycles", self.cycle);
            self.provider.abort();
            return Ok(CycleOutcome::ScenarioEnded);
        };
        let measures = SystemMeasures::from_monitoring(&result).scaled(self.scale_factor);

        let outcome = self
            .planner
            .plan(&self.catalog, &self.current, &measures, &self.state.image_cache)?;
        let applied = outcome != PlanOutcome::Keep;
        if let PlanOutcome::Apply(target) = outcome {
            execute(&self.catalog, self.provider.as_mut(), &target, &mut self.state);
            self.current = target;
        }

        self.report_status(&measures, applied)?;
        self.cycle += 1;
        self.time += self.cycle_interval;
        Ok(CycleOutcome::Continue)
    }

    /// Runs cycles until the scenario ends or a fatal error aborts the loop.
    pub fn run(&mut self) -> Result<(), ControllerError> {
        loop {
            match self.run_cycle() {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::ScenarioEnded) => return Ok(()),
                Err(e) => {
                    error!("cycle {} aborted: {}", self.cycle, e);
                    self.provider.abort();
                    return Err(e);
                }
            }
        }
    }

    /// Logs the cycle summary and records stats. Free capacity is computed
    /// over the physically live allocation; finding it negative means the
    /// validator invariants were broken and the run must stop.
    fn report_status(&mut self, measures: &SystemMeasures, applied: bool) -> Result<(), ControllerError> {
        for vm in self.state.live.used_vms() {
            let mut cpu: i64 = self.catalog.vm_cpu_capacity(vm) as i64;
            let mut memory: i64 = self.catalog.vm_memory_capacity(vm) as i64;
            for ct in self.state.live.containers_on(vm) {
                let container_type = self.catalog.container_type(*ct);
                cpu -= container_type.cpu_units as i64;
                memory -= container_type.memory as i64;
            }
            if cpu < 0 || memory < 0 {
                return Err(ControllerError::NegativeFreeCapacity {
                    vm,
                    free_cpu: cpu,
                    free_memory: memory,
                });
            }
        }

        let missing: f64 = missing_capacity_per_service(&self.catalog, &self.current, measures)
            .values()
            .sum();
        let row = CycleStats {
            cycle: self.cycle,
            time: self.time,
            applied,
            total_cost: self.current.total_cost(&self.catalog),
            vms_running: self.current.running_vms().len(),
            vms_used: self.current.used_vms().len(),
            containers: self.current.container_count(),
            missing_capacity: missing,
            image_downloads: self.state.image_downloads,
        };
        info!(
            "cycle {}: load {:.1} RPM, cost {:.3}, {} running / {} used VMs, {} containers, missing capacity {:.1}",
            row.cycle,
            measures.total_system_load(),
            row.total_cost,
            row.vms_running,
            row.vms_used,
            row.containers,
            row.missing_capacity
        );
        self.stats.record(row);
        Ok(())
    }
}
