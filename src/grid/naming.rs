//! Canonical keys and artifact file names for grid cells.
//!
//! Every name is a pure function of `(lead_time, threshold)`, so reruns with
//! the same configuration land on exactly the same paths. Lead times are
//! zero-padded to three digits both in dictionary keys and in file names,
//! which keeps lexicographic order equal to numeric order for 0..=999 hours.

use std::path::{Path, PathBuf};

/// Width used when zero-padding lead times.
pub const LEAD_TIME_WIDTH: usize = 3;
/// Largest lead time whose padded key still sorts numerically.
pub const MAX_LEAD_TIME_HOURS: u32 = 999;
/// Digits after the decimal point in threshold keys.
pub const THRESHOLD_DECIMALS: usize = 4;
/// Subdirectory holding primary model text files.
pub const PRIMARY_MODELS_DIR: &str = "primary_models";
/// Subdirectory holding compiled predictors.
pub const COMPILED_MODELS_DIR: &str = "compiled_models";
/// Extension of primary model files.
pub const PRIMARY_MODEL_EXTENSION: &str = "txt";

const THRESHOLD_SCALE: f64 = 10_000.0;
// Absorbs binary representation error so 0.00005 rounds up, not down.
const ROUNDING_NUDGE: f64 = 1e-7;
// Scaled values below 2^53 are exact integers in an f64.
const EXACT_SCALED_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Dictionary key for a lead time, e.g. `24` → `"024"`.
pub fn lead_time_key(lead_time: u32) -> String {
    format!("{lead_time:0width$}", width = LEAD_TIME_WIDTH)
}

/// Fixed-point key for a threshold with half-up rounding, e.g. `0.05` → `"0.0500"`.
///
/// Halves round away from zero; values that round to zero never carry a sign.
pub fn threshold_key(threshold: f64) -> String {
    let scaled = threshold * THRESHOLD_SCALE;
    if scaled.is_nan() || scaled.abs() >= EXACT_SCALED_LIMIT {
        // Adjacent floats here are more than 1e-4 apart, so plain formatting stays injective.
        return format!("{threshold:.prec$}", prec = THRESHOLD_DECIMALS);
    }
    let rounded = (scaled + scaled.signum() * ROUNDING_NUDGE).round();
    let negative = rounded < 0.0;
    let magnitude = rounded.abs() as u64;
    let whole = magnitude / THRESHOLD_SCALE as u64;
    let frac = magnitude % THRESHOLD_SCALE as u64;
    format!(
        "{}{whole}.{frac:0width$}",
        if negative { "-" } else { "" },
        width = THRESHOLD_DECIMALS
    )
}

/// File stem shared by every artifact of a cell, e.g. `(24, 0.1)` → `"024H_0.1000"`.
pub fn artifact_stem(lead_time: u32, threshold: f64) -> String {
    format!("{}H_{}", lead_time_key(lead_time), threshold_key(threshold))
}

/// Artifact file name, e.g. `(24, 0.1, "txt")` → `"024H_0.1000.txt"`.
pub fn artifact_file_name(lead_time: u32, threshold: f64, extension: &str) -> String {
    format!("{}.{extension}", artifact_stem(lead_time, threshold))
}

/// Path of the primary model for a cell under `output_dir`.
pub fn primary_model_path(output_dir: &Path, lead_time: u32, threshold: f64) -> PathBuf {
    output_dir
        .join(PRIMARY_MODELS_DIR)
        .join(artifact_file_name(lead_time, threshold, PRIMARY_MODEL_EXTENSION))
}

/// Path of the compiled predictor for a cell under `output_dir`.
pub fn compiled_model_path(
    output_dir: &Path,
    lead_time: u32,
    threshold: f64,
    extension: &str,
) -> PathBuf {
    output_dir
        .join(COMPILED_MODELS_DIR)
        .join(artifact_file_name(lead_time, threshold, extension))
}
