mod common;

use std::sync::{Arc, Mutex};

use indexmap::map::IndexMap;

use fleetopt::core::config::ScenarioConfig;
use fleetopt::core::controller::FleetController;
use fleetopt::core::monitoring::Monitor;
use fleetopt::core::provider::CloudProvider;
use fleetopt::experiment::{ComponentFactory, Experiment, RunCallbacks};

use common::{CountingProvider, ScriptedMonitor};

const CONFIG: &str = r#"
cycle_interval: 30
strategy: Greedy
data_centers:
  - name: dc
    vm_types:
      - label: m
        cores: 2
        memory: 4096
        cost_per_hour: 0.1
        count: 3
services:
  - name: svc
    container_types:
      - label: std
        cpu_units: 1024
        memory: 1024
        rpm_capacity: 1000
"#;

#[derive(Clone)]
struct CollectingCallbacks {
    finished: Arc<Mutex<Vec<String>>>,
}

impl RunCallbacks for CollectingCallbacks {
    fn on_run_finish(&mut self, controller: &mut FleetController) -> IndexMap<String, String> {
        self.finished.lock().unwrap().push(format!("cycles={}", controller.cycle()));
        let mut results = IndexMap::new();
        results.insert(
            "used_vms".to_string(),
            controller.current_allocation().used_vms().len().to_string(),
        );
        results
    }
}

#[test]
// Two scenario runs fan out on the thread pool, each with its own monitor
// and provider, and both report back through the callbacks.
fn test_parallel_runs() {
    let base = ScenarioConfig::from_str(CONFIG);
    let mut scaled = base.clone();
    scaled.scale_factor = 1.6;

    let runs = vec![("base".to_string(), base), ("scaled".to_string(), scaled)];
    let factory: Arc<ComponentFactory> = Arc::new(|_config: &ScenarioConfig| {
        (
            Box::new(ScriptedMonitor::constant(vec![(0, 800.)], 6)) as Box<dyn Monitor>,
            Box::new(CountingProvider::default()) as Box<dyn CloudProvider>,
        )
    });
    let finished = Arc::new(Mutex::new(Vec::new()));
    let callbacks = Box::new(CollectingCallbacks {
        finished: finished.clone(),
    });

    let mut experiment = Experiment::new(runs, factory, callbacks, None);
    experiment.run(2);

    let finished = finished.lock().unwrap();
    assert_eq!(finished.len(), 2);
    for entry in finished.iter() {
        assert_eq!(entry, "cycles=6");
    }
}
