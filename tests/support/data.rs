use std::path::Path;

use calgrid::config::GridConfig;
use calgrid::dataset::TrainingTable;

pub const OBSERVATION: &str = "obs";
pub const FEATURES: [&str; 2] = ["f1", "f2"];

/// `rows_per_lead` deterministic rows for each lead time.
///
/// `obs` tracks `f1` closely so every threshold in 0.0..1.0 has both classes.
pub fn synthetic_table(lead_times: &[u32], rows_per_lead: usize) -> TrainingTable {
    let mut lead = Vec::new();
    let mut obs = Vec::new();
    let mut f1 = Vec::new();
    let mut f2 = Vec::new();
    for &lead_time in lead_times {
        for idx in 0..rows_per_lead {
            let x = idx as f64 / rows_per_lead as f64;
            let wiggle = ((idx * 7919) % 13) as f64 / 130.0;
            lead.push(f64::from(lead_time));
            f1.push(x);
            f2.push(wiggle);
            obs.push((x + wiggle - 0.05).clamp(0.0, 1.0));
        }
    }
    TrainingTable::from_columns([
        ("lead_time_hours".to_string(), lead),
        (OBSERVATION.to_string(), obs),
        (FEATURES[0].to_string(), f1),
        (FEATURES[1].to_string(), f2),
    ])
    .expect("synthetic table")
}

pub fn grid_config(output_dir: &Path, lead_times: &[u32], thresholds: &[f64]) -> GridConfig {
    GridConfig::new(
        output_dir,
        lead_times.to_vec(),
        thresholds.to_vec(),
        OBSERVATION,
        FEATURES.iter().map(|name| name.to_string()).collect(),
    )
}
