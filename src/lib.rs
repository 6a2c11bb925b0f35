//! Grid training and native compilation of probabilistic calibration models.
//!
//! One binary classifier is trained per (lead time, threshold) cell, saved
//! under `primary_models/`, and optionally compiled to a native predictor
//! under `compiled_models/`. The run returns a [`grid::ConfigTree`] mapping
//! every cell to its artifact paths.

/// Per-user directories for logs and default configuration.
pub mod app_dirs;
/// TOML grid configuration.
pub mod config;
/// Tabular training data and per-cell selection.
pub mod dataset;
/// Atomic file writes and directory helpers.
pub mod fs_ops;
/// Grid orchestration and artifact bookkeeping.
pub mod grid;
/// Tracing subscriber setup for the binaries.
pub mod logging;
/// Gradient-boosted tree training and evaluation.
pub mod ml;
/// Model-to-C code generation and native toolchain driving.
pub mod native;
/// Standalone compilation of one saved model.
pub mod standalone;
