//! Interface to the external cloud provider and the provider-side
//! bookkeeping that persists across cycles.

use std::collections::{BTreeSet, HashMap};

use crate::core::allocation::Allocation;
use crate::core::cloud::CloudCatalog;

/// Infrastructure backend consumed by the executor. Calls are synchronous
/// and return provider-side handles used to address later stop calls.
pub trait CloudProvider {
    fn launch_vm(&mut self, vm_type: &str, data_center: &str) -> u64;

    fn terminate_vm(&mut self, vm: u64);

    fn launch_container(&mut self, cpu_units: u32, memory: u64, vm: u64) -> u64;

    fn terminate_container(&mut self, container: u64);

    fn abort(&mut self);
}

/// Which service images are already warm on which VM.
#[derive(Debug, Clone, Default)]
pub struct ImageCacheState {
    cached: HashMap<u32, BTreeSet<u32>>,
}

impl ImageCacheState {
    pub fn is_cached(&self, vm: u32, service: u32) -> bool {
        self.cached.get(&vm).map_or(false, |s| s.contains(&service))
    }

    /// Marks a service image warm on a VM. Returns true if it was cold,
    /// i.e. an image download just happened.
    pub fn insert(&mut self, vm: u32, service: u32) -> bool {
        self.cached.entry(vm).or_default().insert(service)
    }

    /// Releasing a VM loses everything cached on it.
    pub fn clear_vm(&mut self, vm: u32) {
        self.cached.remove(&vm);
    }
}

/// Cross-cycle provider bookkeeping: the allocation believed to be live,
/// the handles the provider returned for it, and the image cache. Owned by
/// the executor; everything else only reads it.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub live: Allocation,
    pub vm_handles: HashMap<u32, u64>,
    pub container_handles: HashMap<(u32, u32), u64>,
    pub image_cache: ImageCacheState,
    /// Cumulative count of image downloads triggered by container starts.
    pub image_downloads: u64,
}

impl ProviderState {
    pub fn new(catalog: &CloudCatalog) -> Self {
        Self {
            live: Allocation::empty(catalog),
            vm_handles: HashMap::new(),
            container_handles: HashMap::new(),
            image_cache: ImageCacheState::default(),
            image_downloads: 0,
        }
    }
}
