use std::{
    io::{BufRead as _, BufReader},
    path::Path,
    process::{Command, Output, Stdio},
};

const KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: ci
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
users:
- name: ci
  user:
    token: t0ken
contexts:
- name: ci
  context:
    cluster: ci
    user: ci
current-context: ci
"#;

fn ephemera(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ephemera"))
        .env_clear()
        .env("GITHUB_OUTPUT", dir.join("outputs"))
        .arg("--state-file")
        .arg(dir.join("ephemera.json"))
        .arg("--kubeconfig")
        .arg(KUBECONFIG)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to run ephemera: {err}"))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn down_without_a_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = ephemera(dir.path(), &["down"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no session state"), "{}", stderr(&output));
}

#[test]
fn default_command_is_up_without_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let output = ephemera(dir.path(), &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("storage class"), "{}", stderr(&output));
    assert!(!dir.path().join("ephemera.json").exists());
}

#[test]
fn default_command_is_down_with_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("ephemera.json");
    std::fs::write(&state, r#"{"version":1,"resources":[]}"#).unwrap();
    let output = ephemera(dir.path(), &[]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!state.exists());
}

#[test]
fn up_refuses_an_existing_session() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("ephemera.json");
    std::fs::write(&state, r#"{"version":1,"resources":[]}"#).unwrap();
    let output = ephemera(
        dir.path(),
        &["up", "--storage-class", "standard", "--access-mode", "ReadWriteOnce"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists"), "{}", stderr(&output));
    assert!(state.exists());
}

#[test]
fn download_needs_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("coverage");
    let output = ephemera(
        dir.path(),
        &["download", "--directory", target.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--server"), "{}", stderr(&output));
}

#[test]
fn invalid_environment_values_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_ephemera"))
        .env_clear()
        .env("EPHEMERA_PORT", "eighty")
        .args(["serve", "--coverdir"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("EPHEMERA_PORT"), "{}", stderr(&output));
}

#[cfg(unix)]
#[test]
fn serve_exits_cleanly_on_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_ephemera"))
        .env_clear()
        .env("NO_COLOR", "1")
        .args(["serve", "--port", "0", "--coverdir"])
        .arg(dir.path())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stderr = BufReader::new(child.stderr.take().unwrap());
    let mut line = String::new();
    loop {
        line.clear();
        assert_ne!(stderr.read_line(&mut line).unwrap(), 0, "collector exited early");
        if line.contains("collector listening") {
            break;
        }
    }

    let status = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
    let status = child.wait().unwrap();
    assert!(status.success(), "{status}");
}
