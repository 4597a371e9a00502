//! Tools for running batches of scenario runs.

use std::fs;
use std::fs::File;
use std::sync::{Arc, Mutex};

use dyn_clone::{clone_trait_object, DynClone};
use indexmap::map::IndexMap;
use serde::Serialize;
use threadpool::ThreadPool;

use crate::core::config::ScenarioConfig;
use crate::core::controller::{CycleOutcome, FleetController};
use crate::core::monitoring::Monitor;
use crate::core::provider::CloudProvider;

/// Builds the external collaborators (monitor and provider) for one run.
pub type ComponentFactory = dyn Fn(&ScenarioConfig) -> (Box<dyn Monitor>, Box<dyn CloudProvider>) + Send + Sync;

/// Trait for implementing custom callbacks for runs within an experiment.
pub trait RunCallbacks: DynClone + Send {
    /// Runs before the first cycle of a run.
    fn on_run_start(&mut self, _controller: &mut FleetController) {}

    /// Runs after every cycle, returns false if the run must be stopped.
    fn on_cycle(&mut self, _controller: &mut FleetController) -> bool {
        true
    }

    /// Runs upon run completion, returns custom results of this run.
    fn on_run_finish(&mut self, _controller: &mut FleetController) -> IndexMap<String, String> {
        IndexMap::new()
    }
}

clone_trait_object!(RunCallbacks);

/// No-op callbacks for experiments that only need the default results.
#[derive(Clone, Default)]
pub struct NoopCallbacks {}

impl RunCallbacks for NoopCallbacks {}

/// Executes a set of named scenario runs on a thread pool and collects
/// per-run results.
pub struct Experiment {
    pub runs: Vec<(String, ScenarioConfig)>,
    pub factory: Arc<ComponentFactory>,
    pub callbacks: Box<dyn RunCallbacks>,
    pub log_dir: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
enum DictValue {
    String(String),
    Config(ScenarioConfig),
    StringDict(IndexMap<String, String>),
}

impl Experiment {
    pub fn new(
        runs: Vec<(String, ScenarioConfig)>,
        factory: Arc<ComponentFactory>,
        callbacks: Box<dyn RunCallbacks>,
        log_dir: Option<String>,
    ) -> Self {
        if let Some(dir) = log_dir.clone() {
            fs::create_dir_all(dir).unwrap();
        }
        Self {
            runs,
            factory,
            callbacks,
            log_dir,
        }
    }

    /// Runs the experiment using the specified number of threads.
    pub fn run(&mut self, num_threads: usize) {
        let _ = env_logger::Builder::from_default_env().try_init();
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(num_threads);

        for (run_id, (name, config)) in self.runs.iter().enumerate() {
            let name = name.clone();
            let config = config.clone();
            let factory = self.factory.clone();
            let mut callbacks = self.callbacks.clone();
            let log_file = self.log_dir.clone().map(|dir| format!("{}/run_{}.csv", dir, run_id));
            let results = results.clone();

            pool.execute(move || {
                log::info!("RUN {}: {}", run_id, name);
                let (monitor, provider) = factory(&config);
                let mut controller = FleetController::new(&config, monitor, provider);
                callbacks.on_run_start(&mut controller);
                loop {
                    match controller.run_cycle() {
                        Ok(CycleOutcome::Continue) => {
                            if !callbacks.on_cycle(&mut controller) {
                                break;
                            }
                        }
                        Ok(CycleOutcome::ScenarioEnded) => break,
                        Err(e) => {
                            log::error!("run {} aborted: {}", run_id, e);
                            break;
                        }
                    }
                }
                let mut run_results = callbacks.on_run_finish(&mut controller);
                run_results.insert("cycles".to_string(), format!("{}", controller.cycle()));
                run_results.insert(
                    "final_cost".to_string(),
                    format!("{:.3}", controller.current_allocation().total_cost(controller.catalog())),
                );
                run_results.insert(
                    "image_downloads".to_string(),
                    format!("{}", controller.provider_state().image_downloads),
                );

                if let Some(log_file) = log_file {
                    match controller.stats().save_csv(&log_file) {
                        Ok(_) => log::info!("stats for run {} saved to {}", run_id, log_file),
                        Err(e) => log::error!("error while saving stats for run {}: {:?}", run_id, e),
                    }
                }

                let mut run_entry = IndexMap::<String, DictValue>::new();
                run_entry.insert("id".to_string(), DictValue::String(format!("{}", run_id)));
                run_entry.insert("name".to_string(), DictValue::String(name));
                run_entry.insert("config".to_string(), DictValue::Config(config));
                run_entry.insert("results".to_string(), DictValue::StringDict(run_results));
                results.lock().unwrap().push(run_entry);
            });
        }

        pool.join();
        let results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();

        if let Some(dir) = self.log_dir.clone() {
            let mut file = File::create(format!("{}/results.json", dir)).unwrap();
            serde_json::to_writer_pretty(&mut file, &results).unwrap();
        }
    }
}
