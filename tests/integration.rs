use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();
    fs::write(files_dir.join("empty.txt"), "").unwrap();
    fs::write(files_dir.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/brainstore.sqlite"

[chunking]
chunk_size = 500
chunk_overlap = 0

[store]
retry_base_delay_ms = 1
"#,
        root.display()
    );

    let config_path = config_dir.join("brainstore.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_brainstore");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("MAX_BRAIN_SIZE")
        .env_remove("MAX_BRAIN_SIZE_WITH_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run brainstore binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn create_brain(config_path: &Path, user: &str, name: &str) -> String {
    let (stdout, stderr, success) = run(
        config_path,
        &["brain", "create", "--user", user, "--name", name],
    );
    assert!(success, "brain create failed: {}", stderr);
    stdout.trim().to_string()
}

fn file_arg(config_path: &Path, name: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files").join(name).display().to_string()
}

const USER: &str = "6f1c2a3e-8d4b-4c5a-9e7f-0a1b2c3d4e5f";

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_brain_create_and_list() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);

    let brain = create_brain(&config_path, USER, "research");
    assert!(uuid::Uuid::parse_str(&brain).is_ok(), "got {:?}", brain);

    let (stdout, _, success) = run(&config_path, &["brain", "list", "--user", USER]);
    assert!(success);
    assert!(stdout.contains(&brain));
    assert!(stdout.contains("Owner"));
    assert!(stdout.contains("research"));
}

#[test]
fn test_upload_and_list_files() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);
    let brain = create_brain(&config_path, USER, "docs");

    for name in ["alpha.md", "beta.txt"] {
        let path = file_arg(&config_path, name);
        let (stdout, stderr, success) = run(&config_path, &["upload", &path, "--brain", &brain]);
        assert!(success, "upload failed: {}", stderr);
        assert!(stdout.contains("has been uploaded"), "got: {}", stdout);
    }

    let (stdout, _, success) = run(&config_path, &["files", "--brain", &brain]);
    assert!(success);
    let alpha = stdout.find("alpha.md").expect("alpha.md listed");
    let beta = stdout.find("beta.txt").expect("beta.txt listed");
    assert!(alpha < beta, "largest file first: {}", stdout);
}

#[test]
fn test_reupload_is_reported_not_duplicated() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);
    let brain = create_brain(&config_path, USER, "docs");
    let path = file_arg(&config_path, "alpha.md");

    run(&config_path, &["upload", &path, "--brain", &brain]);
    let (stdout, _, success) = run(&config_path, &["upload", &path, "--brain", &brain]);
    assert!(success);
    assert!(stdout.contains("already exists"), "got: {}", stdout);
}

#[test]
fn test_rejected_uploads_are_reported() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);
    let brain = create_brain(&config_path, USER, "docs");

    let empty = file_arg(&config_path, "empty.txt");
    let (stdout, _, success) = run(&config_path, &["upload", &empty, "--brain", &brain]);
    assert!(success);
    assert!(stdout.contains("empty.txt is empty."));

    let blob = file_arg(&config_path, "blob.bin");
    let (stdout, _, _) = run(&config_path, &["upload", &blob, "--brain", &brain]);
    assert!(stdout.contains("blob.bin is not supported."));
}

#[test]
fn test_upload_to_unknown_brain_fails() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);
    let path = file_arg(&config_path, "alpha.md");

    let (_, stderr, success) = run(
        &config_path,
        &["upload", &path, "--brain", "00000000-0000-0000-0000-000000000000"],
    );
    assert!(!success);
    assert!(stderr.contains("Brain not found"), "got: {}", stderr);
}

#[test]
fn test_delete_reaps_vectors() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);
    let brain = create_brain(&config_path, USER, "docs");
    let path = file_arg(&config_path, "beta.txt");
    run(&config_path, &["upload", &path, "--brain", &brain]);

    let (stdout, stderr, success) = run(&config_path, &["delete", "beta.txt", "--brain", &brain]);
    assert!(success, "delete failed: {}", stderr);
    assert!(stdout.contains("1 vectors deleted"), "got: {}", stdout);

    let (stdout, _, _) = run(&config_path, &["files", "--brain", &brain]);
    assert!(stdout.contains("No files"));

    let (stdout, _, success) = run(&config_path, &["gc", "--min-age-secs", "0"]);
    assert!(success);
    assert!(stdout.contains("Deleted 0 orphaned vectors."));
}
