//! Scalar objective over candidate allocations, minimized by the strategies.

use serde::{Deserialize, Serialize};

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::measures::SystemMeasures;
use crate::core::provider::ImageCacheState;
use crate::core::validator::{neutral_violations, violations};

/// Lower bound applied to inter-VM distances before dividing in the
/// co-location term. The modeled distance of a VM to itself is 0, so the
/// clamp keeps the bonus finite while same-VM pairs still score highest.
pub const MIN_DISTANCE: f64 = 0.1;

/// Weight of each objective term. The violation weight must dominate all
/// other terms by orders of magnitude so any feasible candidate beats any
/// infeasible one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub cost: f64,
    pub grace_waste: f64,
    pub colocation: f64,
    pub provisioning: f64,
    pub image_miss: f64,
    pub violation: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            cost: 100.,
            grace_waste: 100.,
            colocation: 10.,
            provisioning: 0.01,
            image_miss: 1.,
            violation: 1e6,
        }
    }
}

/// Multi-term objective function.
#[derive(Debug, Clone, Default)]
pub struct FitnessFunction {
    weights: FitnessWeights,
}

impl FitnessFunction {
    pub fn new(weights: FitnessWeights) -> Self {
        Self { weights }
    }

    /// Evaluates an allocation against the previous one and the image cache.
    /// Smaller is better.
    pub fn eval(
        &self,
        catalog: &CloudCatalog,
        allocation: &Allocation,
        previous: Option<&Allocation>,
        measures: &SystemMeasures,
        cache: Option<&ImageCacheState>,
    ) -> f64 {
        let w = &self.weights;
        let mut total = w.cost * allocation.total_cost(catalog);

        if let Some(previous) = previous {
            let waste: f64 = previous
                .used_vms()
                .iter()
                .filter(|vm| !allocation.is_used(**vm))
                .map(|vm| catalog.hourly_cost(*vm))
                .sum();
            total += w.grace_waste * waste;
        }

        let tuples = allocation.tuples();
        let mut colocation = 0.;
        for a in &tuples {
            let service_a = catalog.container_type(a.container_type).service;
            for b in &tuples {
                let service_b = catalog.container_type(b.container_type).service;
                let affinity = measures.affinity(service_a, service_b);
                if affinity > 0. {
                    colocation += affinity / catalog.distance(a.vm, b.vm).max(MIN_DISTANCE);
                }
            }
        }
        total -= w.colocation * colocation;

        let capacity = allocation.capacity_per_service(catalog);
        let provisioning: f64 = catalog
            .service_ids()
            .iter()
            .map(|s| (capacity.get(s).copied().unwrap_or(0.) - measures.total_load(*s)).abs())
            .sum();
        total += w.provisioning * provisioning;

        if let Some(cache) = cache {
            let misses = tuples
                .iter()
                .filter(|t| !cache.is_cached(t.vm, catalog.container_type(t.container_type).service))
                .count();
            total += w.image_miss * misses as f64;
        }

        let violation_score = match previous {
            Some(previous) => violations(catalog, allocation, Some(previous), measures),
            None => neutral_violations(catalog, allocation, measures),
        };
        total + w.violation * violation_score
    }

    /// Baseline evaluation unaffected by the moving previous-allocation
    /// reference: no grace-period term, no image-cache term, neutral
    /// violation check.
    pub fn eval_neutral(&self, catalog: &CloudCatalog, allocation: &Allocation, measures: &SystemMeasures) -> f64 {
        self.eval(catalog, allocation, None, measures, None)
    }
}
