use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rsh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rsh");
    path
}

/// A config with no LLM and no embedder, so every command runs offline.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha\n\nNotes on solid-state batteries and lithium anodes.",
    )
    .unwrap();
    fs::write(files_dir.join("slides.pdf"), b"%PDF-1.4").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/research.sqlite"

[embedding]
provider = "disabled"

[llm]
provider = "disabled"

[pipeline]
stage_timeout_secs = 5
deadline_secs = 30

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("research.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rsh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rsh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rsh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rsh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/research.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_rsh(&config_path, &["init"]);
    let (_, _, second) = run_rsh(&config_path, &["init"]);
    assert!(first && second);
}

#[test]
fn test_empty_query_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (_, stderr, success) = run_rsh(&config_path, &["research", "   "]);
    assert!(!success);
    assert!(stderr.contains("must not be empty"), "stderr: {}", stderr);
}

#[test]
fn test_research_without_llm_still_produces_report() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, stderr, success) = run_rsh(&config_path, &["research", "battery chemistry"]);
    assert!(success, "research failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Report-Generation failed"));
    assert!(stdout.contains("Memory id:"));
}

#[test]
fn test_memory_lists_newest_first() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    run_rsh(&config_path, &["research", "first question"]);
    run_rsh(&config_path, &["research", "second question"]);

    let (stdout, stderr, success) = run_rsh(&config_path, &["memory", "list"]);
    assert!(success, "memory list failed: {}", stderr);
    let first = stdout.find("first question").expect("first entry listed");
    let second = stdout.find("second question").expect("second entry listed");
    assert!(second < first, "newest entry should come first:\n{}", stdout);
    assert!(stdout.contains("of 2"));

    let (stdout, _, success) = run_rsh(&config_path, &["memory", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared 2 memory entries."));
}

#[test]
fn test_research_json_has_final_report() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_rsh(&config_path, &["research", "battery chemistry", "--json", "--debug"]);
    assert!(success, "research failed: {}", stderr);

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["query"], "battery chemistry");
    assert_eq!(value["final_report"], "Report-Generation failed");
    assert_eq!(value["context_analysis_output"], "No prior research context available.");
    assert!(value["search_debug"]["extra"]["error"].is_string());
    assert!(value["memory_id"].is_string());
}

#[test]
fn test_memory_get_round_trip() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, _, _) = run_rsh(&config_path, &["research", "battery chemistry", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let id = value["memory_id"].as_str().unwrap().to_string();

    let (stdout, stderr, success) = run_rsh(&config_path, &["memory", "get", &id]);
    assert!(success, "memory get failed: {}", stderr);
    assert!(stdout.contains("battery chemistry"));

    let (_, _, success) = run_rsh(&config_path, &["memory", "get", "no-such-id"]);
    assert!(!success);
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, stderr, success) = run_rsh(&config_path, &["stats", "--json"]);
    assert!(success, "stats failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["total_chunks"], 0);
    assert_eq!(value["collection"], "research_documents");
    assert_eq!(value["memory_entries"], 0);
}

#[test]
fn test_ingest_reports_failures() {
    let (tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let missing = tmp.path().join("files/missing.txt");
    let pdf = tmp.path().join("files/slides.pdf");
    let (stdout, _, success) = run_rsh(
        &config_path,
        &["ingest", missing.to_str().unwrap(), pdf.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stdout.contains("processed: 0"));
    assert!(stdout.contains("failed: 2"));
    assert!(stdout.contains("file not found"));
    assert!(stdout.contains("unsupported format: .pdf"));
}

#[test]
fn test_ingest_json_lists_processed_sources() {
    let (tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let missing = tmp.path().join("files/missing.txt");
    let (stdout, _, success) = run_rsh(&config_path, &["ingest", missing.to_str().unwrap(), "--json"]);
    assert!(!success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["processed"], serde_json::json!([]));
    assert!(value["failed"][0]["source"].as_str().unwrap().ends_with("missing.txt"));
}

#[test]
fn test_ask_falls_back_without_documents() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    // The fallback answer needs the LLM, which is disabled here, so the
    // apology comes back instead of an error.
    let (stdout, stderr, success) = run_rsh(&config_path, &["ask", "anything", "--json"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        value["output"],
        "I apologize, but I'm unable to provide a response at this time."
    );
    assert_eq!(value["context_used"], false);
    assert_eq!(value["context_length"], 0);
    assert_eq!(value["fallback"]["kind"], "NoDocuments");
}

#[test]
fn test_ask_debug_records_llm_error() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_rsh(&config_path, &["ask", "anything", "--json", "--debug"]);
    assert!(success, "ask failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(value["debug"]["extra"]["error"].is_string());
    assert_eq!(value["debug"]["extra"]["fallback_reason"], "no_documents");
}

#[test]
fn test_ask_rejects_zero_budget() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (_, stderr, success) = run_rsh(&config_path, &["ask", "anything", "--max-tokens", "0"]);
    assert!(!success);
    assert!(stderr.contains("max_tokens must be > 0"), "stderr: {}", stderr);
}

#[test]
fn test_delete_and_clear_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    run_rsh(&config_path, &["init"]);

    let (stdout, _, success) = run_rsh(&config_path, &["delete", "nothing.md"]);
    assert!(success);
    assert!(stdout.contains("Deleted 0 chunks"));

    let (stdout, _, success) = run_rsh(&config_path, &["clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared 0 chunks."));
}
