use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cvault_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cvault");
    path
}

fn run_cvault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cvault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("VAULT_SIGNING_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cvault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
    let path = tmp.path().join("vault.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_hash_secret_prints_phc() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("none.toml");
    let (stdout, stderr, success) = run_cvault(&missing, &["hash-secret", "hunter2"]);
    assert!(success, "hash-secret failed: {}", stderr);
    let line = stdout.trim();
    assert!(line.starts_with("$argon2id$"), "{}", line);
    assert!(!line.contains("hunter2"));
}

#[test]
fn test_check_config_accepts_hashed_users() {
    let tmp = TempDir::new().unwrap();
    let (hash, _, _) = run_cvault(&tmp.path().join("x.toml"), &["hash-secret", "pw"]);
    let config = write_config(
        &tmp,
        &format!(
            r#"[auth]
signing_key = "never-printed-signing-key-0123456789"

[[auth.users]]
username = "admin"
secret_hash = "{}"
identity_tag = "tenant-admin"
"#,
            hash.trim()
        ),
    );

    let (stdout, stderr, success) = run_cvault(&config, &["check-config"]);
    assert!(success, "check-config failed: {}", stderr);
    assert!(stdout.contains("config OK"));
    assert!(stdout.contains("users:      1"));
    assert!(!stdout.contains("never-printed"));
    assert!(!stdout.contains("$argon2id$"));
}

#[test]
fn test_check_config_rejects_plaintext_secret() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        &tmp,
        r#"[[auth.users]]
username = "admin"
secret_hash = "plaintext"
identity_tag = "tenant-admin"
"#,
    );
    let (_, stderr, success) = run_cvault(&config, &["check-config"]);
    assert!(!success);
    assert!(stderr.contains("PHC"), "{}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_cvault(&tmp.path().join("absent.toml"), &["check-config"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}

#[test]
fn test_example_config_needs_a_real_hash() {
    let example = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/vault.example.toml");
    let body = fs::read_to_string(&example).unwrap();
    let tmp = TempDir::new().unwrap();

    let copied = write_config(&tmp, &body);
    let (_, stderr, success) = run_cvault(&copied, &["check-config"]);
    assert!(!success, "placeholder hash accepted");
    assert!(stderr.contains("PHC"), "{}", stderr);

    let (hash, stderr, success) = run_cvault(&copied, &["hash-secret", "my-secret"]);
    assert!(success, "hash-secret failed: {}", stderr);
    let pasted: String = body
        .lines()
        .map(|line| {
            if line.starts_with("secret_hash") {
                format!("secret_hash = \"{}\"", hash.trim())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let config = write_config(&tmp, &pasted);

    let (stdout, stderr, success) = run_cvault(&config, &["check-config"]);
    assert!(success, "check-config failed: {}", stderr);
    assert!(stdout.contains("users:      1"), "{}", stdout);
}
