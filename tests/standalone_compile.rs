mod support;

use calgrid::grid::GridError;
use calgrid::ml::gbdt::{TrainParams, train_binary_forest};
use calgrid::native::{CompileOptions, Toolchain, native_library_extension};
use calgrid::standalone::{CompileRequest, compile_model_file};
use support::data::{FEATURES, OBSERVATION, synthetic_table};
use tempfile::tempdir;

fn available_toolchain() -> Option<String> {
    ["cc", "gcc", "clang"]
        .into_iter()
        .find(|name| Toolchain::new(name).is_available())
        .map(str::to_string)
}

fn save_trained_model(path: &std::path::Path) {
    let table = synthetic_table(&[24], 80);
    let spec = calgrid::dataset::ColumnSpec {
        lead_time_column: "lead_time_hours".into(),
        observation_column: OBSERVATION.into(),
        feature_columns: FEATURES.iter().map(|name| name.to_string()).collect(),
    };
    let (features, labels) = table.cell_training_set(&spec, 24, 0.5).unwrap();
    let model = train_binary_forest(&features, &labels, &TrainParams::default()).unwrap();
    model.save_text(path).unwrap();
}

#[test]
fn rejects_model_without_txt_extension_before_probing() {
    let dir = tempdir().unwrap();
    let model = dir.path().join("024H_0.5000.json");
    save_trained_model(&model);
    let request = CompileRequest {
        model_path: model,
        output_dir: dir.path().to_path_buf(),
        options: CompileOptions {
            toolchain: "calgrid-no-such-cc".into(),
            ..CompileOptions::default()
        },
    };
    assert!(matches!(
        compile_model_file(&request),
        Err(GridError::Validation(_))
    ));
}

#[test]
fn rejects_missing_output_directory() {
    let dir = tempdir().unwrap();
    let model = dir.path().join("024H_0.5000.txt");
    save_trained_model(&model);
    let request = CompileRequest {
        model_path: model,
        output_dir: dir.path().join("absent"),
        options: CompileOptions::default(),
    };
    assert!(matches!(
        compile_model_file(&request),
        Err(GridError::Validation(_))
    ));
}

#[test]
fn compiles_saved_model_next_to_its_stem() {
    let Some(toolchain) = available_toolchain() else {
        return;
    };
    let dir = tempdir().unwrap();
    let model = dir.path().join("024H_0.5000.txt");
    save_trained_model(&model);
    let out = dir.path().join("native");
    std::fs::create_dir(&out).unwrap();

    for parallel_compile_units in [0, 3] {
        let request = CompileRequest {
            model_path: model.clone(),
            output_dir: out.clone(),
            options: CompileOptions {
                toolchain: toolchain.clone(),
                parallel_compile_units,
                ..CompileOptions::default()
            },
        };
        let dest = compile_model_file(&request).unwrap();
        assert_eq!(
            dest,
            out.join(format!("024H_0.5000.{}", native_library_extension()))
        );
        assert!(dest.is_file());
        assert!(std::fs::metadata(&dest).unwrap().len() > 0);
    }
}
