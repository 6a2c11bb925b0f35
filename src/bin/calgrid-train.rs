//! Train (and, when a toolchain is present, compile) every grid cell.

use std::path::PathBuf;

use calgrid::app_dirs;
use calgrid::config::load_grid_config;
use calgrid::dataset::load_csv;
use calgrid::grid::{GridProcess, Orchestrator, SystemBackends};
use calgrid::logging;

const TREE_FILE_NAME: &str = "config.json";

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    if let Err(err) = run() {
        tracing::error!("{err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config_path = match options.config {
        Some(path) => path,
        None => app_dirs::default_config_path().map_err(|err| err.to_string())?,
    };
    let mut config = load_grid_config(&config_path).map_err(|err| err.to_string())?;
    if let Some(output_dir) = options.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(toolchain) = options.toolchain {
        config.compilation.options.toolchain = toolchain;
    }

    let data = load_csv(&options.data).map_err(|err| err.to_string())?;
    tracing::info!("Loaded {} row(s) from {}", data.len(), options.data.display());

    let orchestrator = Orchestrator::new(&config, &SystemBackends).map_err(|err| err.to_string())?;
    let tree = orchestrator.process(&data).map_err(|err| err.to_string())?;

    let tree_path = config.output_dir.join(TREE_FILE_NAME);
    tree.write_json(&tree_path).map_err(|err| err.to_string())?;
    tracing::info!("Wrote config tree to {}", tree_path.display());
    println!("{}", tree.to_json().map_err(|err| err.to_string())?);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    config: Option<PathBuf>,
    data: PathBuf,
    output_dir: Option<PathBuf>,
    toolchain: Option<String>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config = None;
    let mut data = None;
    let mut output_dir = None;
    let mut toolchain = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or("--config requires a value")?;
                config = Some(PathBuf::from(value));
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or("--data requires a value")?;
                data = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or("--out requires a value")?;
                output_dir = Some(PathBuf::from(value));
            }
            "--toolchain" => {
                idx += 1;
                let value = args.get(idx).ok_or("--toolchain requires a value")?;
                toolchain = Some(value.clone());
            }
            other => return Err(format!("Unknown argument: {other}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let data = data.ok_or_else(|| format!("--data is required\n\n{}", help_text()))?;
    Ok(CliOptions {
        config,
        data,
        output_dir,
        toolchain,
    })
}

fn help_text() -> String {
    [
        "calgrid-train",
        "",
        "Train one classifier per (lead time, threshold) cell and compile each",
        "to a native library when the toolchain is available.",
        "",
        "Usage:",
        "  calgrid-train --data <training.csv> [--config <grid.toml>] [--out <dir>] [--toolchain <name>]",
        "",
        "Options:",
        "  --config <path>     Grid configuration (default: ~/.calgrid/grid.toml).",
        "  --data <path>       Headered CSV with lead time, observation and feature columns.",
        "  --out <dir>         Override output_dir from the configuration.",
        "  --toolchain <name>  Override the C toolchain (gcc, clang, msvc).",
    ]
    .join("\n")
}
