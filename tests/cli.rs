//! Black-box tests of the `docqa` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn docqa(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docqa"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run docqa")
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();

    let config_path = root.join("config").join("docqa.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/docqa.sqlite"

[storage]
upload_dir = "{root}/uploads"

[embedding]
provider = "disabled"

[index]
dir = "{root}/vectorstore"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

#[test]
fn init_is_idempotent() {
    let (tmp, config) = setup_test_env();

    for _ in 0..2 {
        let out = docqa(&config, &["init"]);
        assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
        assert!(String::from_utf8_lossy(&out.stdout).contains("Database initialized successfully."));
    }
    assert!(tmp.path().join("data").join("docqa.sqlite").exists());
}

#[test]
fn missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let out = docqa(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to read config file"));
}

#[test]
fn invalid_config_is_rejected() {
    let (tmp, config) = setup_test_env();
    let mut content = fs::read_to_string(&config).unwrap();
    content.push_str("\n[retrieval]\ntop_k = 0\n");
    fs::write(&config, content).unwrap();

    let out = docqa(&config, &["init"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("top_k"));
    drop(tmp);
}

#[test]
fn ask_with_unknown_source_fails() {
    let (_tmp, config) = setup_test_env();
    assert!(docqa(&config, &["init"]).status.success());

    let out = docqa(&config, &["ask", "--source", "does-not-exist", "Anything?"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("source not found"));
}
