/*!
 * End-to-end tests for the pixelwatch binary
 *
 * Each test gets its own HOME and database so no user configuration leaks in.
 */

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("pixelwatch.db")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_pixelwatch"))
            .args(args)
            .arg("--db")
            .arg(self.db())
            .env("HOME", self.dir.path())
            .env_remove("PIXELWATCH_DB")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_register_ingest_and_report() {
    let env = Env::new();

    let site = env.run_json(&[
        "site",
        "add",
        "--org",
        "1",
        "--url",
        "https://shop.example",
        "--gtm",
        "GTM-ABC123",
    ]);
    let site_id = site["id"].as_i64().unwrap().to_string();
    assert_eq!(site["name"], "https://shop.example");

    let status = env.run_json(&["status", &site_id]);
    assert!(status["overall"].is_null());
    assert_eq!(status["totalHeartbeats"], 0);

    let payload = env.write(
        "beat.json",
        r#"{"siteUrl":"https://shop.example","gtmPresent":true,"consentGranted":false}"#,
    );
    let ack = env.run_json(&["ingest", path_str(&payload)]);
    assert_eq!(ack["success"], true);

    let status = env.run_json(&["status", &site_id]);
    assert_eq!(status["overall"], "degraded");
    assert_eq!(status["issueCount"], 2);
    assert_eq!(status["ga4"]["status"], "blocked");
    assert_eq!(status["totalHeartbeats"], 1);

    let beats = env.run_json(&["heartbeats", &site_id, "--limit", "5"]);
    assert_eq!(beats.as_array().unwrap().len(), 1);
    assert_eq!(beats[0]["id"], ack["heartbeatId"]);

    let sites = env.run_json(&["site", "list", "--org", "1", "--json"]);
    assert_eq!(sites.as_array().unwrap().len(), 1);
}

#[test]
fn test_client_errors_exit_with_one() {
    let env = Env::new();

    let output = env.run(&["status", "999"]);
    assert_eq!(output.status.code(), Some(1));

    let payload = env.write("unknown.json", r#"{"siteUrl":"https://nowhere.example"}"#);
    let output = env.run(&["ingest", path_str(&payload)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Site not found"));

    let output = env.run(&["site", "remove", "--org", "1", "7"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_duplicate_site_rejected() {
    let env = Env::new();
    let args = ["site", "add", "--org", "1", "--url", "https://shop.example"];

    assert!(env.run(&args).status.success());
    let output = env.run(&args);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_init_config_then_load() {
    let env = Env::new();
    let path = env.dir.path().join("pixelwatch.toml");

    let output = env.run(&["init-config", path_str(&path)]);
    assert!(output.status.success());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[database]"));

    let output = env.run(&["init-config", path_str(&path)]);
    assert_eq!(output.status.code(), Some(1));

    // A bad config file is fatal.
    let bad = env.write("bad.toml", "[server]\nport = \"eighty\"\n");
    let output = env.run(&["--config", path_str(&bad), "status", "1"]);
    assert_eq!(output.status.code(), Some(2));
}
