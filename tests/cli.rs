mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

fn roster_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("roster");
    path
}

/// Temp workspace with a config pointing at `data/roster.sqlite`, plus
/// any extra TOML appended.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        "[db]\npath = \"{}/data/roster.sqlite\"\n\n[fetch]\ntimeout_secs = 5\n{}",
        root.display(),
        extra
    );
    let config_path = config_dir.join("roster.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

fn run_roster(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = roster_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run roster binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_roster(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(stdout.contains("Seeded 72 counties."));
    assert!(tmp.path().join("data/roster.sqlite").exists());
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env("");
    let (_, _, first) = run_roster(&config, &["init"]);
    let (stdout, stderr, second) = run_roster(&config, &["init"]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
    assert!(stdout.contains("Seeded 72 counties."));
}

#[test]
fn test_sources_lists_builtins() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, stderr, success) = run_roster(&config, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    let counties: Vec<&str> = stdout
        .lines()
        .skip(1)
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(counties, vec!["Vilas", "Waukesha", "Barron", "Burnett", "Sawyer"]);
}

#[test]
fn test_inmates_on_empty_database() {
    let (_tmp, config) = setup_test_env("");
    run_roster(&config, &["init"]);
    let (stdout, stderr, success) = run_roster(&config, &["inmates", "Vilas"]);
    assert!(success, "inmates failed: {}", stderr);
    assert!(stdout.contains("LAST"));
    assert!(stdout.contains("0 of 0 record(s), page 1"));
}

#[test]
fn test_inmates_rejects_zero_page_size() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_roster(&config, &["inmates", "Vilas", "--page-size", "0"]);
    assert!(!success);
    assert!(stderr.contains("--page-size"));
}

#[test]
fn test_refresh_unknown_county_fails() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_roster(&config, &["refresh", "--county", "NotACounty"]);
    assert!(!success);
    assert!(stderr.contains("unknown source county: 'NotACounty'"), "{}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_roster(&missing, &["sources"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_source_config_fails() {
    let (_tmp, config) = setup_test_env(
        r#"
[[sources]]
county = "Vilas"
form = "table_grid"
acquisition = { kind = "direct", url = "http://localhost/vilas.pdf" }
parser = { strategy = "uppercase_pairs" }
"#,
    );
    let (_, stderr, success) = run_roster(&config, &["sources"]);
    assert!(!success);
    assert!(stderr.contains("Invalid [[sources]] configuration"), "{}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_direct_source_end_to_end() {
    let pdf = common::text_pdf(&["IN CUSTODY", "DOE, JOHN Q 01/02/2026", "ROE, JANE"]);
    let app = Router::new().route("/sawyer.pdf", get(move || async move { pdf }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (_tmp, config) = setup_test_env(&format!(
        r#"
[[sources]]
county = "Sawyer"
form = "plain_text"
acquisition = {{ kind = "direct", url = "http://{}/sawyer.pdf" }}
parser = {{ strategy = "uppercase_pairs" }}
"#,
        addr
    ));

    let refresh = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || run_roster(&config, &["refresh"]))
            .await
            .unwrap()
    };
    let (stdout, stderr, success) = refresh;
    assert!(success, "refresh failed: {}", stderr);
    assert!(stdout.contains("total stored: 2"), "{}", stdout);

    let listed = tokio::task::spawn_blocking(move || {
        run_roster(&config, &["inmates", "sawyer", "--search", "doe"])
    })
    .await
    .unwrap();
    let (stdout, _, success) = listed;
    assert!(success);
    assert!(stdout.contains("Doe"));
    assert!(stdout.contains("1 of 1 record(s), page 1"));
}
