//! Service-row genome encoding for the evolutionary strategy.
//!
//! One row per service, one gene per VM instance. A gene's allele is 0 for
//! "no container of this service on this VM" or the 1-based index into the
//! service's container-type list. The layout makes it structurally
//! impossible to encode two container types of the same service on one VM.

use std::rc::Rc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::core::allocation::AllocationMap;
use crate::core::cloud::CloudCatalog;
use crate::core::measures::SystemMeasures;

/// Upper bound on the total probability mass spent on "allocate" alleles,
/// so that the empty allele always keeps support.
const MAX_ALLOC_MASS: f64 = 0.95;

/// Discrete allele distribution of one service row.
///
/// Every "allocate size k" allele carries mass
/// `(service_load / service_overall_capacity) / container_type_count` where
/// the overall capacity is VM count times the mean container capacity; the
/// remainder goes to the empty allele. Sampling a whole genome this way has
/// an expected capacity equal to the measured load, which is what makes
/// random initialization land near plausible solutions.
#[derive(Debug, Clone)]
pub struct AlleleDistribution {
    weights: Vec<f64>,
    index: WeightedIndex<f64>,
}

impl AlleleDistribution {
    pub fn for_service(catalog: &CloudCatalog, service: u32, load: f64, vm_count: usize) -> Self {
        let sizes = &catalog.service(service).container_types;
        let count = sizes.len();
        let mean_capacity = if count > 0 {
            sizes.iter().map(|ct| catalog.container_type(*ct).rpm_capacity).sum::<f64>() / count as f64
        } else {
            0.
        };
        let overall_capacity = vm_count as f64 * mean_capacity;
        let mut per_size = if overall_capacity > 0. && count > 0 {
            (load / overall_capacity) / count as f64
        } else {
            0.
        };
        if per_size * count as f64 > MAX_ALLOC_MASS {
            per_size = MAX_ALLOC_MASS / count as f64;
        }
        let mut weights = vec![1. - per_size * count as f64];
        weights.extend(std::iter::repeat(per_size).take(count));
        let index = WeightedIndex::new(&weights).unwrap();
        Self { weights, index }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> u16 {
        self.index.sample(rng) as u16
    }

    /// Expected allele value under this distribution.
    pub fn mean(&self) -> f64 {
        self.weights.iter().enumerate().map(|(i, w)| i as f64 * w).sum()
    }

    pub fn allele_count(&self) -> usize {
        self.weights.len()
    }
}

/// A single gene: the chosen allele plus the distribution it was drawn from,
/// so mutation resamples from the same biased distribution instead of a
/// uniform range.
#[derive(Debug, Clone)]
pub struct Gene {
    allele: u16,
    distribution: Rc<AlleleDistribution>,
}

impl Gene {
    pub fn new(allele: u16, distribution: Rc<AlleleDistribution>) -> Self {
        Self { allele, distribution }
    }

    pub fn random(distribution: Rc<AlleleDistribution>, rng: &mut impl Rng) -> Self {
        let allele = distribution.sample(rng);
        Self { allele, distribution }
    }

    pub fn allele(&self) -> u16 {
        self.allele
    }

    pub fn set_allele(&mut self, allele: u16) {
        self.allele = allele;
    }

    pub fn mutate(&mut self, rng: &mut impl Rng) {
        self.allele = self.distribution.sample(rng);
    }
}

/// One genome row: the genes of one service across all VMs.
#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub service: u32,
    pub genes: Vec<Gene>,
}

/// A full candidate encoding.
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub rows: Vec<ServiceRow>,
}

/// Fixed VM ordering and per-service distributions shared by all chromosomes
/// of one optimization run.
pub struct GenomeLayout {
    vm_order: Vec<u32>,
    distributions: Vec<Rc<AlleleDistribution>>,
}

impl GenomeLayout {
    pub fn new(catalog: &CloudCatalog, measures: &SystemMeasures) -> Self {
        let vm_order = catalog.vm_ids();
        let distributions = catalog
            .service_ids()
            .into_iter()
            .map(|service| {
                Rc::new(AlleleDistribution::for_service(
                    catalog,
                    service,
                    measures.total_load(service),
                    vm_order.len(),
                ))
            })
            .collect();
        Self { vm_order, distributions }
    }

    pub fn vm_order(&self) -> &[u32] {
        &self.vm_order
    }

    pub fn distribution(&self, service: u32) -> Rc<AlleleDistribution> {
        self.distributions[service as usize].clone()
    }

    pub fn random(&self, rng: &mut impl Rng) -> Chromosome {
        let rows = self
            .distributions
            .iter()
            .enumerate()
            .map(|(service, distribution)| ServiceRow {
                service: service as u32,
                genes: (0..self.vm_order.len())
                    .map(|_| Gene::random(distribution.clone(), rng))
                    .collect(),
            })
            .collect();
        Chromosome { rows }
    }

    /// Encodes an allocation map. Inverse of [`GenomeLayout::decode`].
    pub fn encode(&self, catalog: &CloudCatalog, map: &AllocationMap) -> Chromosome {
        let rows = self
            .distributions
            .iter()
            .enumerate()
            .map(|(service, distribution)| {
                let sizes = &catalog.service(service as u32).container_types;
                let genes = self
                    .vm_order
                    .iter()
                    .map(|vm| {
                        let allele = map
                            .get(vm)
                            .and_then(|containers| {
                                containers
                                    .iter()
                                    .find(|ct| catalog.container_type(**ct).service == service as u32)
                            })
                            .map(|ct| sizes.iter().position(|s| s == ct).unwrap() as u16 + 1)
                            .unwrap_or(0);
                        Gene::new(allele, distribution.clone())
                    })
                    .collect();
                ServiceRow {
                    service: service as u32,
                    genes,
                }
            })
            .collect();
        Chromosome { rows }
    }

    /// Decodes a chromosome into an allocation map. VMs with no containers
    /// do not appear in the result.
    pub fn decode(&self, catalog: &CloudCatalog, chromosome: &Chromosome) -> AllocationMap {
        let mut map = AllocationMap::new();
        for (position, vm) in self.vm_order.iter().enumerate() {
            for row in &chromosome.rows {
                let allele = row.genes[position].allele();
                if allele > 0 {
                    let ct = catalog.service(row.service).container_types[allele as usize - 1];
                    map.entry(*vm).or_default().push(ct);
                }
            }
        }
        map
    }
}
