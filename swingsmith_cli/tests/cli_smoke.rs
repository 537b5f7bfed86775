use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{Duration, NaiveDate};
use tempfile::tempdir;

const BARS: usize = 300;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("workspace root")
        .to_path_buf()
}

fn swingsmith() -> Command {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_swingsmith") {
        Command::new(bin)
    } else {
        let mut cmd = Command::new("cargo");
        cmd.args(["run", "-q", "-p", "swingsmith_cli", "--"]);
        cmd
    }
}

/// Quiet stretch, 2.5% dip on phase 15, rally to +3%, hold. Cycle of 25.
fn closes() -> Vec<f64> {
    (0..BARS)
        .map(|i| match i % 25 {
            0..=14 => 100.0 * (1.0 + 0.003 * (1.3 * i as f64).sin()),
            15 => 97.5,
            phase @ 16..=20 => 97.5 + (phase - 15) as f64 * 1.1,
            _ => 103.0,
        })
        .collect()
}

struct Row {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn rows() -> Vec<Row> {
    let closes = closes();
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).expect("start date");
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Row {
                date: (start + Duration::days(i as i64)).format("%Y-%m-%d").to_string(),
                open,
                high: open.max(close) * 1.002,
                low: open.min(close) * 0.998,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

fn write_csv(path: &Path, rows: &[Row]) {
    let mut out = String::from("Date,Open,High,Low,Close,Volume\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            row.date, row.open, row.high, row.low, row.close, row.volume
        ));
    }
    std::fs::write(path, out).expect("write raw csv");
}

fn payload(rows: &[Row]) -> String {
    let bars: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "t": row.date,
                "o": row.open,
                "h": row.high,
                "l": row.low,
                "c": row.close,
                "v": row.volume,
            })
        })
        .collect();
    serde_json::Value::Array(bars).to_string()
}

fn run_predict(model_dir: &Path, input: &str) -> (bool, String) {
    let mut child = swingsmith()
        .args(["predict", "--model-dir", model_dir.to_str().expect("model dir")])
        .current_dir(workspace_root())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn swingsmith predict");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    let output = child.wait_with_output().expect("predict output");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn process_train_predict_round_trip() {
    let temp = tempdir().expect("temp dir");
    let root = temp.path();
    let data_dir = root.join("data");
    let processed_dir = root.join("processed");
    let model_dir = root.join("models");
    std::fs::create_dir_all(&data_dir).expect("data dir");
    let rows = rows();
    write_csv(&data_dir.join("SWING.csv"), &rows);

    let status = swingsmith()
        .args([
            "process",
            "--symbols",
            "SWING,MISSING",
            "--data-dir",
            data_dir.to_str().expect("data"),
            "--processed-dir",
            processed_dir.to_str().expect("processed"),
        ])
        .current_dir(workspace_root())
        .status()
        .expect("failed to spawn swingsmith process");
    assert!(status.success(), "process exited with {status:?}");
    assert!(processed_dir.join("SWING_processed.csv").exists());
    assert!(processed_dir.join("swingsmith.log").exists());

    let status = swingsmith()
        .args([
            "train",
            "--symbol",
            "SWING",
            "--processed-dir",
            processed_dir.to_str().expect("processed"),
            "--model-dir",
            model_dir.to_str().expect("models"),
            "--n-estimators",
            "60",
            "--max-depth",
            "3",
            "--learning-rate",
            "0.3",
            "--workers",
            "1",
            "--no-file-log",
        ])
        .current_dir(workspace_root())
        .status()
        .expect("failed to spawn swingsmith train");
    assert!(status.success(), "train exited with {status:?}");
    assert!(model_dir.join("swing_trader_model.json").exists());
    assert!(!model_dir.join("swingsmith.log").exists());

    // Dip bar of the seventh cycle, inside the training partition.
    let (ok, stdout) = run_predict(&model_dir, &payload(&rows[..=165]));
    assert!(ok);
    assert_eq!(stdout, "1\n");

    let (ok, stdout) = run_predict(&model_dir, &payload(&rows[..30]));
    assert!(ok);
    assert_eq!(stdout, "0\n");

    let (ok, stdout) = run_predict(&root.join("nowhere"), &payload(&rows));
    assert!(ok);
    assert_eq!(stdout, "0\n");

    let (ok, stdout) = run_predict(&model_dir, "[{\"t\": 1}]");
    assert!(!ok);
    assert!(stdout.is_empty());
}
