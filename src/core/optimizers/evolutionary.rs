//! Evolutionary placement strategy over the service-row genome.

use std::time::Instant;

use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;
use crate::core::config::parse_options;
use crate::core::fitness::FitnessFunction;
use crate::core::measures::SystemMeasures;
use crate::core::optimizer::{OptResult, OptimizerStrategy};
use crate::core::optimizers::genome::{Chromosome, GenomeLayout};
use crate::core::optimizers::greedy;
use crate::core::optimizers::repair::{GreedyRepair, RepairConstraint, RepairContext};
use crate::core::provider::ImageCacheState;
use crate::core::validator::overallocated_vm_count;

/// Population-based search minimizing the fitness function, with the greedy
/// heuristic wired in as a constraint-repair operator.
pub struct EvolutionaryOptimizer {
    fitness: FitnessFunction,
    population_size: usize,
    generations: usize,
    crossover_rate: f64,
    swap_mutation_rate: f64,
    point_mutation_rate: f64,
    max_age: usize,
    rng: Pcg64,
    repair: Box<dyn RepairConstraint>,
}

struct Individual {
    chromosome: Chromosome,
    fitness: f64,
    age: usize,
}

impl EvolutionaryOptimizer {
    pub fn new(fitness: FitnessFunction, seed: u64) -> Self {
        Self::with_params(fitness, seed, 100, 250)
    }

    pub fn with_params(fitness: FitnessFunction, seed: u64, population_size: usize, generations: usize) -> Self {
        Self {
            fitness,
            population_size,
            generations,
            crossover_rate: 0.05,
            swap_mutation_rate: 0.05,
            point_mutation_rate: 0.05,
            max_age: 100,
            rng: Pcg64::seed_from_u64(seed),
            repair: Box::new(GreedyRepair::new(Pcg64::seed_from_u64(seed.wrapping_add(1)))),
        }
    }

    pub fn from_options(options_str: &str, fitness: FitnessFunction) -> Self {
        let options = parse_options(options_str);
        let parse = |key: &str, default: u64| {
            options
                .get(key)
                .map(|v| v.parse::<u64>().unwrap_or_else(|_| panic!("Can't parse option {}={}", key, v)))
                .unwrap_or(default)
        };
        Self::with_params(
            fitness,
            parse("seed", 42),
            parse("population", 100) as usize,
            parse("generations", 250) as usize,
        )
    }

    fn evaluate(
        &self,
        catalog: &CloudCatalog,
        layout: &GenomeLayout,
        chromosome: &Chromosome,
        previous: &Allocation,
        measures: &SystemMeasures,
        cache: &ImageCacheState,
    ) -> f64 {
        let allocation = Allocation::build(catalog, layout.decode(catalog, chromosome));
        self.fitness
            .eval(catalog, &allocation, Some(previous), measures, Some(cache))
    }

    /// Uniform crossover: each gene position swaps between the two children
    /// with the crossover rate.
    fn crossover(&mut self, a: &Chromosome, b: &Chromosome) -> (Chromosome, Chromosome) {
        let mut child_a = a.clone();
        let mut child_b = b.clone();
        for (row_a, row_b) in child_a.rows.iter_mut().zip(child_b.rows.iter_mut()) {
            for (gene_a, gene_b) in row_a.genes.iter_mut().zip(row_b.genes.iter_mut()) {
                if self.rng.gen_bool(self.crossover_rate) {
                    let allele = gene_a.allele();
                    gene_a.set_allele(gene_b.allele());
                    gene_b.set_allele(allele);
                }
            }
        }
        (child_a, child_b)
    }

    fn mutate(&mut self, chromosome: &mut Chromosome) {
        for row in chromosome.rows.iter_mut() {
            // Swap mutation moves a placement between two VMs of the row.
            if row.genes.len() >= 2 && self.rng.gen_bool(self.swap_mutation_rate) {
                let i = self.rng.gen_range(0..row.genes.len());
                let j = self.rng.gen_range(0..row.genes.len());
                let allele = row.genes[i].allele();
                let other = row.genes[j].allele();
                row.genes[i].set_allele(other);
                row.genes[j].set_allele(allele);
            }
            for gene in row.genes.iter_mut() {
                if self.rng.gen_bool(self.point_mutation_rate) {
                    gene.mutate(&mut self.rng);
                }
            }
        }
    }

    /// Tournament of 3 over the evaluated population, returns the winner index.
    fn tournament(&mut self, population: &[Individual]) -> usize {
        let mut winner = self.rng.gen_range(0..population.len());
        for _ in 0..2 {
            let challenger = self.rng.gen_range(0..population.len());
            if population[challenger].fitness < population[winner].fitness {
                winner = challenger;
            }
        }
        winner
    }
}

impl OptimizerStrategy for EvolutionaryOptimizer {
    fn optimize(
        &mut self,
        catalog: &CloudCatalog,
        previous: &Allocation,
        measures: &SystemMeasures,
        cache: &ImageCacheState,
    ) -> OptResult {
        let start = Instant::now();
        let layout = GenomeLayout::new(catalog, measures);
        let ctx = RepairContext {
            catalog,
            layout: &layout,
            previous,
            measures,
        };

        let mut population: Vec<Individual> = (0..self.population_size)
            .map(|_| Individual {
                chromosome: layout.random(&mut self.rng),
                fitness: f64::INFINITY,
                age: 0,
            })
            .collect();

        let mut best: Option<(Chromosome, f64)> = None;

        for generation in 0..self.generations {
            for individual in population.iter_mut() {
                if !self.repair.test(&ctx, &individual.chromosome) {
                    individual.chromosome = self.repair.repair(&ctx, &individual.chromosome);
                }
            }
            for individual in population.iter_mut() {
                individual.fitness = self.evaluate(catalog, &layout, &individual.chromosome, previous, measures, cache);
            }
            for individual in &population {
                if best.as_ref().map_or(true, |(_, fitness)| individual.fitness < *fitness) {
                    best = Some((individual.chromosome.clone(), individual.fitness));
                }
            }

            population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));

            // Survivors: elitist best plus tournament selection to half the
            // population; individuals over the age cap make room for fresh ones.
            let survivor_count = (self.population_size / 2).max(1);
            let mut next = Vec::with_capacity(self.population_size);
            next.push(Individual {
                chromosome: population[0].chromosome.clone(),
                fitness: population[0].fitness,
                age: population[0].age + 1,
            });
            while next.len() < survivor_count {
                let winner = self.tournament(&population);
                next.push(Individual {
                    chromosome: population[winner].chromosome.clone(),
                    fitness: population[winner].fitness,
                    age: population[winner].age + 1,
                });
            }
            for individual in next.iter_mut() {
                if individual.age > self.max_age {
                    *individual = Individual {
                        chromosome: layout.random(&mut self.rng),
                        fitness: f64::INFINITY,
                        age: 0,
                    };
                }
            }

            // Offspring: roulette-wheel parents, uniform crossover, mutation.
            let worst = population.last().map_or(0., |i| i.fitness);
            let spread = (worst - population[0].fitness).max(1.);
            let weights: Vec<f64> = population.iter().map(|i| worst - i.fitness + spread * 1e-6).collect();
            let roulette = WeightedIndex::new(&weights).unwrap();
            while next.len() < self.population_size {
                let a = roulette.sample(&mut self.rng);
                let mut b = roulette.sample(&mut self.rng);
                if a == b {
                    b = roulette.sample(&mut self.rng);
                }
                let (mut child_a, mut child_b) = self.crossover(&population[a].chromosome, &population[b].chromosome);
                self.mutate(&mut child_a);
                next.push(Individual {
                    chromosome: child_a,
                    fitness: f64::INFINITY,
                    age: 0,
                });
                if next.len() < self.population_size {
                    self.mutate(&mut child_b);
                    next.push(Individual {
                        chromosome: child_b,
                        fitness: f64::INFINITY,
                        age: 0,
                    });
                }
            }
            population = next;

            if generation % 50 == 0 {
                if let Some((_, fitness)) = &best {
                    debug!("generation {}: best fitness {:.3}", generation, fitness);
                }
            }
        }

        let (chromosome, mut fitness) = best.unwrap();
        let mut allocation = Allocation::build(catalog, layout.decode(catalog, &chromosome));
        if overallocated_vm_count(catalog, &allocation, Some(previous)) > 0 {
            warn!("evolutionary search converged on an infeasible candidate; substituting the greedy solution");
            allocation = Allocation::build(catalog, greedy::solve(catalog, previous, measures));
            fitness = self
                .fitness
                .eval(catalog, &allocation, Some(previous), measures, Some(cache));
        }
        let neutral_fitness = self.fitness.eval_neutral(catalog, &allocation, measures);
        OptResult {
            allocation,
            fitness,
            neutral_fitness,
            runtime: start.elapsed().as_secs_f64(),
        }
    }

    fn name(&self) -> String {
        "Evolutionary".to_string()
    }
}
