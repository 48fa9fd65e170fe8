//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with a throwaway HOME so local config never
//! touches the developer's own, and pass `--offline` wherever a session would
//! otherwise contact the config server.

use std::net::TcpListener;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_boxbreath"))
        .args(args)
        .env("HOME", home)
        .env_remove("BOXBREATH_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn simulate(home: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["simulate", "--offline"];
    full.extend_from_slice(args);
    let (code, stdout, stderr) = run_cli(home, &full);
    assert_eq!(code, 0, "simulate failed: {stderr}");
    serde_json::from_str(&stdout).expect("simulate output is JSON")
}

fn phases(sim: &serde_json::Value) -> Vec<(u64, String)> {
    sim["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["at_ms"].as_u64().unwrap(), e["phase"].as_str().unwrap().to_string()))
        .collect()
}

#[test]
fn test_help() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("simulate"));
    assert!(stdout.contains("presets"));
}

#[test]
fn test_simulate_box_timeline() {
    let home = tempfile::tempdir().unwrap();
    let sim = simulate(home.path(), &["--variant", "box", "--pattern", "4-4-4-4", "--seconds", "16"]);
    assert_eq!(
        phases(&sim),
        vec![
            (0, "inhale".to_string()),
            (4000, "hold".to_string()),
            (8000, "exhale".to_string()),
            (12000, "hold".to_string()),
            (16000, "inhale".to_string()),
        ]
    );
    assert_eq!(sim["variant"], "box");
}

#[test]
fn test_simulate_skips_zero_hold() {
    let home = tempfile::tempdir().unwrap();
    let sim = simulate(home.path(), &["--variant", "three", "--pattern", "3-0-3", "--seconds", "6"]);
    let names: Vec<_> = phases(&sim).into_iter().map(|(_, p)| p).collect();
    assert_eq!(names, vec!["inhale", "exhale", "inhale"]);
}

#[test]
fn test_simulate_stops_after_cycles() {
    let home = tempfile::tempdir().unwrap();
    let sim = simulate(home.path(), &["--preset", "box", "--cycles", "2", "--seconds", "120"]);
    assert_eq!(sim["stopped"], true);
    assert_eq!(sim["completed_cycles"], 2);
    assert_eq!(sim["simulated_ms"], 32000);
    // The session ends on the cycle boundary; no third inhale is emitted.
    let timeline = phases(&sim);
    assert_eq!(timeline.len(), 8);
    assert_eq!(timeline.last(), Some(&(28000, "hold".to_string())));
}

#[test]
fn test_simulate_frames() {
    let home = tempfile::tempdir().unwrap();
    let sim = simulate(home.path(), &["--preset", "equal", "--seconds", "1", "--frames"]);
    let frames = sim["frames"].as_array().unwrap();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0]["label"], "inhale");
    assert!(frames[4]["fill"].as_f64().unwrap() > frames[0]["fill"].as_f64().unwrap());
}

#[test]
fn test_simulate_rejects_bad_pattern() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(
        home.path(),
        &["simulate", "--offline", "--variant", "two", "--pattern", "4-4-4"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (code, _, stderr) = run_cli(home.path(), &["simulate", "--offline", "--pattern", "0-0-0-0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("nothing to animate"));
}

#[test]
fn test_presets_list() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["presets"]);
    assert_eq!(code, 0);
    let list: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let relax = list
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "relax")
        .unwrap();
    assert_eq!(relax["cycle"], "4-7-8");
    assert_eq!(relax["variant"], "three");
}

#[test]
fn test_config_set_get_reset() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "session.target_cycles"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");

    let (code, _, _) = run_cli(home.path(), &["config", "set", "session.target_cycles", "3"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "session.target_cycles"]);
    assert_eq!(stdout.trim(), "3");
    assert!(home.path().join(".config/boxbreath/config.toml").exists());

    let (code, _, _) = run_cli(home.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "list"]);
    assert!(stdout.contains("session.target_cycles = 5"));
}

#[test]
fn test_config_rejects_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["config", "set", "session.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown configuration key"));
}

#[test]
fn test_configured_cycles_apply_to_simulation() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["config", "set", "session.target_cycles", "1"]);
    let sim = simulate(home.path(), &["--preset", "equal", "--seconds", "60"]);
    assert_eq!(sim["completed_cycles"], 1);
    assert_eq!(sim["simulated_ms"], 10000);
}

fn point_at_server(home: &Path, url: &str) {
    let (code, _, stderr) = run_cli(home, &["config", "set", "server.base_url", url]);
    assert_eq!(code, 0, "config set failed: {stderr}");
}

#[test]
fn test_chat_plan_prints_summary_and_plan() {
    let home = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(r#"{"reply":"That sounds like a lot."}"#)
        .create();
    let summary = server
        .mock("POST", "/api/chatbot")
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "messages": ["exams tomorrow", "That sounds like a lot."]
        })))
        .with_status(200)
        .with_body(
            r#"{"result":"{\"conversation\":[\"You've prepared well.\"],\"breathing\":{\"emotion\":\"Anxious\",\"type\":\"3 point\",\"timing\":{\"inhale\":4,\"hold\":7,\"exhale\":8}}}"}"#,
        )
        .create();
    point_at_server(home.path(), &server.url());

    let (code, stdout, stderr) =
        run_cli(home.path(), &["chat", "--plan", "--no-apply", "exams", "tomorrow"]);
    assert_eq!(code, 0, "chat failed: {stderr}");
    summary.assert();
    assert!(stdout.contains("That sounds like a lot."));
    assert!(stdout.contains("You've prepared well."));
    assert!(stdout.contains("feeling Anxious"));
    assert!(stdout.contains("cycle 4-7-8"));
}

#[test]
fn test_chat_plan_falls_back_to_calm_box() {
    let home = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(r#"{"reply":"I hear you."}"#)
        .create();
    server
        .mock("POST", "/api/chatbot")
        .with_status(200)
        .with_body(r#"{"result":"no plan today"}"#)
        .create();
    point_at_server(home.path(), &server.url());

    let (code, stdout, stderr) = run_cli(home.path(), &["chat", "--plan", "--no-apply", "tired"]);
    assert_eq!(code, 0, "chat failed: {stderr}");
    assert!(stdout.contains("couldn't generate a plan"));
    assert!(stdout.contains("cycle 4-4-4-4"));
}

#[test]
fn test_chat_plan_needs_a_message() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["chat", "--plan"]);
    assert_eq!(code, 2);
}

#[test]
fn test_chat_gives_up_on_silent_backend() {
    let home = tempfile::tempdir().unwrap();
    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    point_at_server(home.path(), &format!("http://{addr}"));
    run_cli(home.path(), &["config", "set", "server.timeout_secs", "1"]);

    let mut child = Command::new(env!("CARGO_BIN_EXE_boxbreath"))
        .args(["chat", "--no-apply", "hi"])
        .env("HOME", home.path())
        .env_remove("BOXBREATH_ENV")
        .env_remove("RUST_LOG")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("chat ignored server.timeout_secs");
        }
        std::thread::sleep(Duration::from_millis(100));
    };
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_pattern_update_requires_a_field() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["pattern", "update"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("nothing to update"));
}

#[test]
fn test_pattern_update_posts_config() {
    let home = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new();
    let update = server
        .mock("POST", "/api/config")
        .match_body(mockito::Matcher::Json(serde_json::json!({"cycle_seconds": 16.0})))
        .with_status(200)
        .with_body(r#"{"variant":null,"cycle_seconds":16.0,"box_scale":1.0}"#)
        .create();
    point_at_server(home.path(), &server.url());

    let (code, stdout, stderr) =
        run_cli(home.path(), &["pattern", "update", "--cycle-seconds", "16"]);
    assert_eq!(code, 0, "update failed: {stderr}");
    update.assert();
    let view: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(view["active"]["cycle"], "4-4-4-4");
}
