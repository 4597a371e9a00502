//! Per-cycle statistics collected by the controller.

use std::fs::File;

use serde::Serialize;

/// One row of cycle-level evaluation output.
#[derive(Debug, Clone, Serialize)]
pub struct CycleStats {
    pub cycle: u64,
    pub time: f64,
    pub applied: bool,
    pub total_cost: f64,
    pub vms_running: usize,
    pub vms_used: usize,
    pub containers: usize,
    pub missing_capacity: f64,
    pub image_downloads: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    rows: Vec<CycleStats>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: CycleStats) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[CycleStats] {
        &self.rows
    }

    pub fn last(&self) -> Option<&CycleStats> {
        self.rows.last()
    }

    pub fn save_csv(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
