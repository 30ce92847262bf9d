use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SAMPLE_CATALOG: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../charterplan-core/assets/sample_catalog.json"
);

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "charterplan-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn run(state_dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_charterplan");
    Command::new(exe)
        .args(["--catalog", SAMPLE_CATALOG, "--state-dir"])
        .arg(state_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run cli")
}

fn run_json(state_dir: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.extend(["--report", "json"]);
    let output = run(state_dir, &full);
    assert!(
        output.status.success(),
        "cli failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json report")
}

#[test]
fn cli_status_on_fresh_session() {
    let state_dir = temp_path("fresh");
    let status = run_json(&state_dir, &["--action", "status"]);
    assert_eq!(status["stats"]["covered"], 0);
    assert_eq!(status["stats"]["targets"], 16);
    assert_eq!(status["budget"], 7);
    assert!(!state_dir.join("default.json").exists());
}

#[test]
fn cli_apply_persists_the_plan() {
    let state_dir = temp_path("apply");
    let applied = run_json(&state_dir, &["--action", "apply"]);
    assert_eq!(applied["outcome"], "proposed");
    assert_eq!(applied["applied"], 7);
    assert_eq!(applied["slots_used"], 6);
    assert!(state_dir.join("default.json").exists());

    let status = run_json(&state_dir, &["--action", "status"]);
    assert_eq!(status["stats"]["covered"], 16);
    assert_eq!(status["paid"], 6);

    let again = run_json(&state_dir, &["--action", "optimize"]);
    assert_eq!(again["outcome"], "unchanged");
    assert_eq!(again["reason"]["status"], "fully_covered");
}

#[test]
fn cli_share_code_moves_selection_between_sessions() {
    let state_dir = temp_path("share");
    run_json(
        &state_dir,
        &["--action", "select", "--provider", "company_krupp"],
    );
    let chosen = run_json(
        &state_dir,
        &[
            "--action",
            "charter",
            "--provider",
            "company_krupp",
            "--charter",
            "iron_mine",
        ],
    );
    assert_eq!(chosen["changed"], true);

    let share = run_json(&state_dir, &["--action", "share"]);
    let code = share["detail"].as_str().expect("code").to_string();
    assert!(code.starts_with("CP1."));

    let imported = run_json(
        &state_dir,
        &["--session", "friend", "--action", "import-code", "--code", &code],
    );
    assert_eq!(imported["import"]["applied"], 2);

    let status = run_json(&state_dir, &["--session", "friend", "--action", "status"]);
    assert_eq!(status["selection"][0]["provider"], "company_krupp");
    assert_eq!(status["selection"][0]["charter"], "iron_mine");
    assert_eq!(status["stats"]["covered"], 4);
}

#[test]
fn cli_import_reports_dropped_entries() {
    let state_dir = temp_path("import");
    let input = temp_path("import-payload").with_extension("json");
    std::fs::write(
        &input,
        r#"{
            "version": 1,
            "providers": ["basic_textiles", "company_retired"],
            "charters": { "basic_textiles": "furniture_manufactories", "company_retired": "port" }
        }"#,
    )
    .unwrap();
    let input_arg = input.to_string_lossy().to_string();
    let imported = run_json(&state_dir, &["--action", "import", "--input", &input_arg]);
    assert_eq!(imported["import"]["applied"], 2);
    assert_eq!(imported["import"]["total"], 4);

    let exported = run(&state_dir, &["--action", "export"]);
    assert!(exported.status.success());
    let record: serde_json::Value = serde_json::from_slice(&exported.stdout).unwrap();
    assert_eq!(record["providers"], serde_json::json!(["basic_textiles"]));
    assert_eq!(record["filter"]["capabilities"].as_array().unwrap().len(), 16);
}

#[test]
fn cli_prestige_requirement_drives_the_first_pick() {
    let state_dir = temp_path("prestige");
    let toggled = run_json(
        &state_dir,
        &["--action", "toggle-prestige", "--capability", "port"],
    );
    assert_eq!(toggled["changed"], true);

    let status = run_json(&state_dir, &["--action", "status"]);
    assert_eq!(status["stats"]["missing_prestige"], serde_json::json!(["port"]));

    let proposed = run_json(&state_dir, &["--action", "optimize", "--budget", "1"]);
    assert_eq!(proposed["outcome"], "proposed");
    assert_eq!(proposed["picks"][0]["provider"], "company_hudson_bay");
    assert_eq!(proposed["picks"][0]["prestige"], "port");
    assert_eq!(proposed["after"]["missing_prestige"], serde_json::json!([]));

    let exported = run(&state_dir, &["--action", "export"]);
    let record: serde_json::Value = serde_json::from_slice(&exported.stdout).unwrap();
    assert_eq!(
        record["filter"]["required_prestige"],
        serde_json::json!(["port"])
    );
}

#[test]
fn cli_rejects_missing_arguments() {
    let state_dir = temp_path("missing");
    let output = run(&state_dir, &["--action", "select"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--provider is required for --action select"));
}

#[test]
fn cli_console_report_writes_to_file() {
    let state_dir = temp_path("console");
    let output_path = temp_path("console-report");
    let output = run(
        &state_dir,
        &["--action", "optimize", "--output", output_path.to_str().unwrap()],
    );
    assert!(output.status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Optimizer Proposal"));
    assert!(content.contains("Suez Canal Company [company_suez]"));
}
