// SPDX-License-Identifier: Apache-2.0

use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn wait_for_port(host: &str, port: u16, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if TcpStream::connect((host, port)).is_ok() {
            return;
        }
        sleep(Duration::from_millis(100));
    }
    panic!("daemon did not start on {}:{} within {:?}", host, port, timeout);
}

fn spawn_daemon(port: u16) -> Child {
    let mut child = Command::new("cargo")
        .args([
            "run",
            "-p",
            "loudness-daemon",
            "--",
            "--bind",
            "127.0.0.1",
            "--port",
            &port.to_string(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn daemon");

    wait_for_port("127.0.0.1", port, Duration::from_secs(10));
    child
}

fn run_cli(args: &[&str]) -> String {
    let output = Command::new("cargo")
        .args(["run", "-p", "loudness-cli", "--"])
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("run cli");

    if !output.status.success() {
        let mut stderr = String::new();
        stderr.push_str(&String::from_utf8_lossy(&output.stderr));
        panic!("CLI failed: {}", stderr);
    }

    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn e2e_status_and_empty_stream_list() {
    let port = pick_free_port();
    let mut daemon = spawn_daemon(port);
    let base = format!("http://127.0.0.1:{}", port);

    let status = run_cli(&["--daemon", &base, "status"]);
    assert!(status.contains("\"status\""));

    let streams = run_cli(&["--daemon", &base, "stream", "list"]);
    assert!(streams.contains("\"streams\""));

    let _ = daemon.kill();
}

#[test]
fn e2e_register_gain_and_solo_flow() {
    let port = pick_free_port();
    let mut daemon = spawn_daemon(port);
    let base = format!("http://127.0.0.1:{}", port);

    let registered = run_cli(&[
        "--daemon",
        &base,
        "stream",
        "register",
        "mic-1",
        "--kind",
        "sine",
    ]);
    assert!(registered.contains("\"stream_id\""));

    let id: String = registered
        .lines()
        .find(|l| l.contains("stream_id"))
        .and_then(|l| l.split('"').nth(3).map(str::to_string))
        .expect("stream_id in response");

    let streams = run_cli(&["--daemon", &base, "stream", "list"]);
    assert!(streams.contains(&id));

    let gain = run_cli(&["--daemon", &base, "stream", "gain", &id, "-3.0"]);
    assert!(gain.contains("\"applied_gain_db\""));

    let solo = run_cli(&["--daemon", &base, "stream", "solo", &id]);
    assert!(solo.contains("\"solo_stream\""));

    let _ = daemon.kill();
}

#[test]
fn e2e_limiter_get_and_set() {
    let port = pick_free_port();
    let mut daemon = spawn_daemon(port);
    let base = format!("http://127.0.0.1:{}", port);

    let limiter = run_cli(&["--daemon", &base, "limiter", "get"]);
    assert!(limiter.contains("\"threshold_db\""));

    let updated = run_cli(&["--daemon", &base, "limiter", "set", "--threshold-db", "-6.0"]);
    assert!(updated.contains("-6.0"));

    let _ = daemon.kill();
}
