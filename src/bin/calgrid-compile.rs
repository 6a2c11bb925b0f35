//! Compile one saved primary model into a native library.

use std::path::PathBuf;

use calgrid::logging;
use calgrid::native::CompileOptions;
use calgrid::standalone::{CompileRequest, compile_model_file};

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
    let request = parse_args(std::env::args().skip(1).collect())?;
    let dest = compile_model_file(&request).map_err(|err| err.to_string())?;
    println!("{}", dest.display());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CompileRequest, String> {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut options = CompileOptions::default();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--toolchain" => {
                idx += 1;
                let value = args.get(idx).ok_or("--toolchain requires a value")?;
                options.toolchain = value.clone();
            }
            "--verbose" | "-v" => options.verbose = true,
            "--parallel-comp" => {
                idx += 1;
                let value = args.get(idx).ok_or("--parallel-comp requires a value")?;
                options.parallel_compile_units = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --parallel-comp value: {value}"))?;
            }
            "--no-quantize" => options.quantize = false,
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            path => positional.push(PathBuf::from(path)),
        }
        idx += 1;
    }

    let [model_path, output_dir]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| format!("Expected <model.txt> <output_dir>\n\n{}", help_text()))?;
    Ok(CompileRequest {
        model_path,
        output_dir,
        options,
    })
}

fn help_text() -> String {
    [
        "calgrid-compile",
        "",
        "Compile a saved primary model into <output_dir>/<model stem>.<so|dylib|dll>.",
        "",
        "Usage:",
        "  calgrid-compile <model.txt> <output_dir> [--toolchain <name>] [--verbose] [--parallel-comp <n>]",
        "",
        "Options:",
        "  --toolchain <name>   C toolchain: gcc (default), clang, msvc, or a versioned driver.",
        "  --verbose            Log every toolchain command and its output.",
        "  --parallel-comp <n>  Spread trees over n translation units (0 = single unit).",
        "  --no-quantize        Compare raw feature values instead of bin indices.",
    ]
    .join("\n")
}
