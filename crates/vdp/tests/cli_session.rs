#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/vdpcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket never appeared at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn publish_to_listen_delivers_updates() {
    let dir = unique_temp_dir("session");
    let sock_path = dir.join("vdp.sock");

    let listener = Command::new(env!("CARGO_BIN_EXE_vdp"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .arg("--count")
        .arg("3")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let publish = Command::new(env!("CARGO_BIN_EXE_vdp"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("publish")
        .arg(&sock_path)
        .arg("--updates")
        .arg("3")
        .arg("--interval")
        .arg("20ms")
        .output()
        .expect("publish command should run");
    assert!(
        publish.status.success(),
        "publish failed: {}",
        String::from_utf8_lossy(&publish.stderr)
    );

    let summary: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&publish.stdout).trim())
            .expect("publish summary should be JSON");
    assert_eq!(summary["role"], "controller");
    assert_eq!(summary["negotiated"]["acked"], serde_json::json!([0]));
    assert_eq!(summary["updates_sent"], 3);

    let output = listener
        .wait_with_output()
        .expect("listen command should exit");
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("event should be JSON"))
        .collect();
    assert_eq!(events.len(), 4, "events: {events:?}");
    assert_eq!(events[0]["event"], "broadcast");
    assert_eq!(events[0]["channel"], 0);
    assert_eq!(events[0]["name"], "telemetry");

    let seqs: Vec<u64> = events[1..]
        .iter()
        .map(|event| {
            assert_eq!(event["event"], "data");
            assert_eq!(event["value"]["status"], "ok");
            event["value"]["seq"].as_u64().expect("seq should be a number")
        })
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn publish_without_acknowledgement_times_out() {
    let dir = unique_temp_dir("silent");
    let sock_path = dir.join("silent.sock");
    let listener = UnixListener::bind(&sock_path).expect("silent listener should bind");

    // Accepts and reads, never answers.
    let silent = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
            sink.len()
        } else {
            0
        }
    });

    let output = Command::new(env!("CARGO_BIN_EXE_vdp"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("publish")
        .arg(&sock_path)
        .arg("--ack-timeout")
        .arg("50ms")
        .arg("--attempts")
        .arg("2")
        .output()
        .expect("publish command should run");

    assert_eq!(output.status.code(), Some(124));
    let summary: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&output.stdout).trim())
            .expect("summary should be JSON");
    assert_eq!(summary["negotiated"]["failed"], serde_json::json!([0]));
    assert_eq!(summary["negotiated"]["failed_attempts"], 2);
    assert_eq!(summary["registry"]["ack_timeouts"], 2);

    let received = silent.join().expect("silent listener should not panic");
    assert!(received > 0, "broadcasts should have reached the socket");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn publish_rejects_zero_baud() {
    let dir = unique_temp_dir("baud");
    let sock_path = dir.join("baud.sock");
    let listener = UnixListener::bind(&sock_path).expect("listener should bind");
    let accepted = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
            sink.len()
        } else {
            0
        }
    });

    let output = Command::new(env!("CARGO_BIN_EXE_vdp"))
        .arg("--log-level")
        .arg("error")
        .arg("publish")
        .arg(&sock_path)
        .arg("--baud")
        .arg("0")
        .output()
        .expect("publish command should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("transport start failed"));
    assert_eq!(accepted.join().expect("listener should not panic"), 0);

    let _ = std::fs::remove_dir_all(&dir);
}
