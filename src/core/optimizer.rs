//! Placement optimization strategies.

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::config::parse_config_value;
use crate::core::fitness::{FitnessFunction, FitnessWeights};
use crate::core::measures::SystemMeasures;
use crate::core::optimizers::evolutionary::EvolutionaryOptimizer;
use crate::core::optimizers::greedy::GreedyOptimizer;
use crate::core::provider::ImageCacheState;

/// Outcome of one optimization run.
#[derive(Debug, Clone)]
pub struct OptResult {
    pub allocation: Allocation,
    /// Fitness relative to the previous allocation and image cache.
    pub fitness: f64,
    /// Baseline fitness without the moving previous-allocation reference.
    pub neutral_fitness: f64,
    /// Wall-clock runtime of the optimization in seconds.
    pub runtime: f64,
}

/// Trait for implementations of placement strategies.
///
/// A strategy maps the previous allocation, the measured load, and the warm
/// image state to a new allocation. Strategies self-validate: the returned
/// allocation must have no overallocated VMs (under-provisioning is allowed
/// and is the caller's signal to try again next cycle).
pub trait OptimizerStrategy {
    fn optimize(
        &mut self,
        catalog: &CloudCatalog,
        previous: &Allocation,
        measures: &SystemMeasures,
        cache: &ImageCacheState,
    ) -> OptResult;

    fn name(&self) -> String;
}

/// Resolves a strategy from its config string, e.g. `Greedy` or
/// `Evolutionary[seed=42,population=100,generations=250]`.
pub fn optimizer_resolver(config_str: &str, weights: FitnessWeights) -> Box<dyn OptimizerStrategy> {
    let (name, options) = parse_config_value(config_str);
    let fitness = FitnessFunction::new(weights);
    match name.as_str() {
        "Greedy" => Box::new(GreedyOptimizer::new(fitness)),
        "Evolutionary" => Box::new(EvolutionaryOptimizer::from_options(
            &options.unwrap_or_default(),
            fitness,
        )),
        _ => panic!("Can't resolve optimizer strategy: {}", config_str),
    }
}
