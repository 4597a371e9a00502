//! Drift detection and the grace-period transition state machine.

use std::collections::HashMap;

use log::{debug, info};

use crate::core::allocation::{place_container, Allocation};
use crate::core::cloud::CloudCatalog;
use crate::core::error::ControllerError;
use crate::core::fitness::FitnessFunction;
use crate::core::measures::SystemMeasures;
use crate::core::optimizer::OptimizerStrategy;
use crate::core::provider::ImageCacheState;
use crate::core::validator::{missing_capacity_per_service, overallocated_vm_count, overallocated_vm_count_neutral};

const LOAD_DRIFT_THRESHOLD: f64 = 0.02;
const CAPACITY_DRIFT_THRESHOLD: f64 = 0.02;
const FITNESS_DRIFT_THRESHOLD: f64 = 0.05;

/// What the executor should do this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Nothing changes; the current allocation stays live.
    Keep,
    /// Apply this allocation now.
    Apply(Allocation),
}

/// The changes required to move from the live allocation to a new target.
#[derive(Debug, Clone)]
pub struct ReallocationPlan {
    pub target: Allocation,
    pub vms_to_launch: Vec<u32>,
    pub containers_to_launch: Vec<(u32, u32)>,
    /// Containers replaced by a different size of the same service on the
    /// same VM: (vm, old container type).
    pub vertical_replacements: Vec<(u32, u32)>,
    boot_allocation: Allocation,
    swap_allocation: Allocation,
}

impl ReallocationPlan {
    pub fn new(catalog: &CloudCatalog, current: &Allocation, target: Allocation) -> Result<Self, ControllerError> {
        let vms_to_launch: Vec<u32> = target
            .running_vms()
            .difference(current.running_vms())
            .cloned()
            .collect();

        let current_tuples: Vec<(u32, u32)> = current
            .tuples()
            .iter()
            .map(|t| (t.vm, t.container_type))
            .collect();
        let containers_to_launch: Vec<(u32, u32)> = target
            .tuples()
            .iter()
            .map(|t| (t.vm, t.container_type))
            .filter(|t| !current_tuples.contains(t))
            .collect();

        let mut vertical_replacements = Vec::new();
        for (vm, containers) in current.map() {
            for old in containers {
                let service = catalog.container_type(*old).service;
                let replaced = target
                    .containers_on(*vm)
                    .iter()
                    .any(|new| *new != *old && catalog.container_type(*new).service == service);
                if replaced {
                    vertical_replacements.push((*vm, *old));
                }
            }
        }

        // Step 1: all VMs of both allocations up, containers untouched.
        let union_running = current.running_vms().union(target.running_vms()).cloned().collect();
        let boot_allocation = Allocation::with_running(catalog, current.map().clone(), union_running)?;

        // Step 3: vertically replaced containers gone, all new containers in;
        // everything else keeps draining until the plan completes.
        let mut swap_map = current.map().clone();
        for (vm, old) in &vertical_replacements {
            if let Some(containers) = swap_map.get_mut(vm) {
                containers.retain(|ct| ct != old);
            }
        }
        for (vm, ct) in &containers_to_launch {
            place_container(&mut swap_map, catalog, *vm, *ct);
        }
        let swap_allocation =
            Allocation::with_running(catalog, swap_map, boot_allocation.running_vms().clone())?;

        Ok(Self {
            target,
            vms_to_launch,
            containers_to_launch,
            vertical_replacements,
            boot_allocation,
            swap_allocation,
        })
    }
}

/// Grace-period transition progress. A plan steps once per planner
/// invocation; no new optimization starts while one is active.
#[derive(Debug, Clone)]
enum TransitionState {
    Idle,
    Staging { step: u8, plan: ReallocationPlan },
}

/// Reference point for drift detection, captured when an optimization result
/// is accepted.
#[derive(Debug, Clone)]
struct DriftBaseline {
    loads: HashMap<u32, f64>,
    capacities: HashMap<u32, f64>,
    fitness: f64,
}

/// Decides when re-optimization is worth its cost and rolls accepted targets
/// out through the 4-step grace-period machine.
pub struct Planner {
    strategy: Box<dyn OptimizerStrategy>,
    fitness: FitnessFunction,
    transition: TransitionState,
    baseline: Option<DriftBaseline>,
}

impl Planner {
    pub fn new(strategy: Box<dyn OptimizerStrategy>, fitness: FitnessFunction) -> Self {
        Self {
            strategy,
            fitness,
            transition: TransitionState::Idle,
            baseline: None,
        }
    }

    pub fn is_staging(&self) -> bool {
        matches!(self.transition, TransitionState::Staging { .. })
    }

    /// Current transition step (1..=4), if a plan is active.
    pub fn transition_step(&self) -> Option<u8> {
        match &self.transition {
            TransitionState::Idle => None,
            TransitionState::Staging { step, .. } => Some(*step),
        }
    }

    /// True if the current allocation is invalid or under-provisioned, or if
    /// load, capacity, or fitness drifted beyond their thresholds since the
    /// last accepted optimization.
    pub fn is_optimization_required(
        &self,
        catalog: &CloudCatalog,
        current: &Allocation,
        measures: &SystemMeasures,
    ) -> bool {
        let overallocated = overallocated_vm_count_neutral(catalog, current);
        if overallocated > 0 {
            info!("current allocation is invalid: {} overallocated VMs", overallocated);
            return true;
        }
        let missing = missing_capacity_per_service(catalog, current, measures);
        if !missing.is_empty() {
            info!("current allocation is under-provisioned: {:?}", missing);
            return true;
        }
        let Some(baseline) = &self.baseline else {
            return true;
        };
        for service in catalog.service_ids() {
            let drift = relative_drift(
                baseline.loads.get(&service).copied().unwrap_or(0.),
                measures.total_load(service),
            );
            if drift > LOAD_DRIFT_THRESHOLD {
                info!(
                    "load of service {} drifted by {:.1}%",
                    catalog.service(service).name,
                    drift * 100.
                );
                return true;
            }
        }
        let capacities = current.capacity_per_service(catalog);
        for service in catalog.service_ids() {
            let drift = relative_drift(
                baseline.capacities.get(&service).copied().unwrap_or(0.),
                capacities.get(&service).copied().unwrap_or(0.),
            );
            if drift > CAPACITY_DRIFT_THRESHOLD {
                info!(
                    "capacity of service {} drifted by {:.1}%",
                    catalog.service(service).name,
                    drift * 100.
                );
                return true;
            }
        }
        let fitness_now = self.fitness.eval_neutral(catalog, current, measures);
        let drift = relative_drift(baseline.fitness, fitness_now);
        if drift > FITNESS_DRIFT_THRESHOLD {
            info!("fitness drifted by {:.1}% since the last optimization", drift * 100.);
            return true;
        }
        false
    }

    /// Advances an active transition or decides whether to re-optimize.
    pub fn plan(
        &mut self,
        catalog: &CloudCatalog,
        current: &Allocation,
        measures: &SystemMeasures,
        cache: &ImageCacheState,
    ) -> Result<PlanOutcome, ControllerError> {
        if let TransitionState::Staging { step, plan } = &mut self.transition {
            *step += 1;
            let step = *step;
            debug!("transition step {}", step);
            if step <= 4 {
                return Ok(match step {
                    3 => PlanOutcome::Apply(plan.swap_allocation.clone()),
                    _ => PlanOutcome::Keep,
                });
            }
            // Drain window over: the fully drained target goes live.
            let target = plan.target.clone();
            self.transition = TransitionState::Idle;
            info!("transition complete, target allocation applied");
            return Ok(PlanOutcome::Apply(target));
        }

        if !self.is_optimization_required(catalog, current, measures) {
            debug!("no drift beyond thresholds, keeping current allocation");
            return Ok(PlanOutcome::Keep);
        }

        let result = self.strategy.optimize(catalog, current, measures, cache);
        info!(
            "{} optimization finished in {:.3}s: fitness {:.3}, cost {:.3}",
            self.strategy.name(),
            result.runtime,
            result.fitness,
            result.allocation.total_cost(catalog)
        );

        let overallocated = overallocated_vm_count(catalog, &result.allocation, Some(current));
        if overallocated > 0 {
            return Err(ControllerError::InfeasibleAllocation { overallocated });
        }

        self.baseline = Some(DriftBaseline {
            loads: measures.loads().iter().map(|(s, l)| (*s, l.total)).collect(),
            capacities: result.allocation.capacity_per_service(catalog),
            fitness: result.neutral_fitness,
        });

        if result.allocation == *current {
            debug!("optimizer kept the current allocation");
            return Ok(PlanOutcome::Keep);
        }

        let plan = ReallocationPlan::new(catalog, current, result.allocation)?;
        info!(
            "starting staged transition: {} VMs to launch, {} containers to launch, {} vertical replacements",
            plan.vms_to_launch.len(),
            plan.containers_to_launch.len(),
            plan.vertical_replacements.len()
        );
        let first = plan.boot_allocation.clone();
        self.transition = TransitionState::Staging { step: 1, plan };
        Ok(PlanOutcome::Apply(first))
    }
}

fn relative_drift(from: f64, to: f64) -> f64 {
    if from == 0. {
        if to == 0. {
            0.
        } else {
            f64::INFINITY
        }
    } else {
        ((to - from) / from).abs()
    }
}
