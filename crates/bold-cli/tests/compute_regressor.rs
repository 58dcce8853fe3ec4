use assert_cmd::Command;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize)]
struct RegressorOutput {
    frame_times: Vec<f64>,
    names: Vec<String>,
    signals: Vec<Vec<f64>>,
}

fn test_data(file: &str) -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data")
        .join(file);
    root.to_string_lossy().to_string()
}

#[test]
fn computes_glover_derivative_regressors() {
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args([
        "compute-regressor",
        "--events",
        &test_data("button_press_events.tsv"),
        "--label",
        "press_left",
        "--model",
        "glover + derivative",
        "--tr",
        "0.5",
        "--n-scans",
        "61",
        "--oversampling",
        "16",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: RegressorOutput = serde_json::from_slice(&out).unwrap();
    assert_eq!(value.names, vec!["press_left", "press_left_derivative"]);
    assert_eq!(value.frame_times.len(), 61);
    for signal in &value.signals {
        assert_eq!(signal.len(), 61);
    }
}

#[test]
fn frame_times_file_overrides_the_scan_grid() {
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args([
        "compute-regressor",
        "--events",
        &test_data("button_press_events.tsv"),
        "--frame-times",
        &test_data("frame_times.txt"),
        "--oversampling",
        "16",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: RegressorOutput = serde_json::from_slice(&out).unwrap();
    assert_eq!(value.frame_times.len(), 61);
    assert_eq!(value.names, vec!["main"]);
}

#[test]
fn fir_model_yields_one_signal_per_delay() {
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args([
        "compute-regressor",
        "--events",
        &test_data("button_press_events.tsv"),
        "--label",
        "press_right",
        "--model",
        "fir",
        "--fir-delays",
        "0,2,4",
        "--tr",
        "0.5",
        "--n-scans",
        "61",
        "--oversampling",
        "16",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: RegressorOutput = serde_json::from_slice(&out).unwrap();
    assert_eq!(
        value.names,
        vec![
            "press_right_delay_0",
            "press_right_delay_2",
            "press_right_delay_4"
        ]
    );
    assert_eq!(value.signals.len(), 3);
}

#[test]
fn unknown_model_is_a_hard_error() {
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args([
        "compute-regressor",
        "--events",
        &test_data("button_press_events.tsv"),
        "--model",
        "hanning",
    ]);
    cmd.assert().failure();
}

#[test]
fn fir_without_delays_is_a_hard_error() {
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args([
        "compute-regressor",
        "--events",
        &test_data("button_press_events.tsv"),
        "--model",
        "fir",
    ]);
    cmd.assert().failure();
}

#[test]
fn hrf_kernel_dumps_the_basis_set() {
    #[derive(Deserialize)]
    struct KernelOutput {
        model: String,
        names: Vec<String>,
        kernels: Vec<Vec<f64>>,
    }
    let mut cmd = Command::cargo_bin("bold").unwrap();
    cmd.args(["hrf-kernel", "--model", "spm + derivative", "--dt", "0.05"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: KernelOutput = serde_json::from_slice(&out).unwrap();
    assert_eq!(value.model, "spm + derivative");
    assert_eq!(value.names, vec!["hrf", "hrf_derivative"]);
    assert_eq!(value.kernels.len(), 2);
    assert_eq!(value.kernels[0].len(), 640);
}
