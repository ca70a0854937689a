#![cfg(unix)]

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use rotaslice_core::{CancelToken, EngineError};
use rotaslice_engine::{
    default_handlers, spawn, wait_or_cancel, EngineCommand, EngineMessage, EngineOutcome,
    MessageDispatcher,
};

fn dispatcher() -> MessageDispatcher {
    MessageDispatcher::new(default_handlers())
}

fn shell(dir: &std::path::Path, script: &str) -> EngineCommand {
    EngineCommand::new("sh", dir)
        .args(["-c", script])
        .with_output(dir.join("out.stream"))
}

fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_missing_executable_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let command = EngineCommand::new(dir.path().join("no-such-engine"), dir.path());
    let err = spawn(&command, dispatcher(), None, CancelToken::new()).expect_err("must fail");
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert!(err.is_spawn_error());
}

#[tokio::test]
async fn test_finished_engine_reports_messages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let command = shell(
        dir.path(),
        "echo Progress:slice:1:2; echo LayerCount:4; echo ';LAYER:0,0.2' > out.stream",
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn(&command, dispatcher(), Some(tx), CancelToken::new()).expect("spawn");
    let outcome = wait_or_cancel(handle).await.expect("engine run");

    assert_eq!(
        outcome,
        EngineOutcome::Finished {
            output: dir.path().join("out.stream")
        }
    );
    assert_eq!(
        rx.recv().await,
        Some(EngineMessage::Progress {
            stage: "slice".into(),
            fraction: 0.5
        })
    );
    assert_eq!(rx.recv().await, Some(EngineMessage::LayerCount(4)));
}

#[tokio::test]
async fn test_failed_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let handle = spawn(
        &shell(dir.path(), "exit 3"),
        dispatcher(),
        None,
        CancelToken::new(),
    )
    .expect("spawn");
    let err = wait_or_cancel(handle).await.expect_err("must fail");
    assert!(matches!(err, EngineError::Exited { code: Some(3) }));
}

#[tokio::test]
async fn test_missing_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let handle = spawn(&shell(dir.path(), "true"), dispatcher(), None, CancelToken::new())
        .expect("spawn");
    let err = wait_or_cancel(handle).await.expect_err("must fail");
    assert!(matches!(err, EngineError::MissingOutput { .. }));
}

#[tokio::test]
async fn test_cancel_terminates_and_reaps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancelToken::new();
    let handle = spawn(
        &shell(dir.path(), "exec sleep 30"),
        dispatcher(),
        None,
        cancel.clone(),
    )
    .expect("spawn");
    let pid = handle.pid().expect("pid");

    let started = Instant::now();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let outcome = wait_or_cancel(handle).await.expect("cancel is not an error");
    assert_eq!(outcome, EngineOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_timeout_terminates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let command =
        shell(dir.path(), "exec sleep 30").with_timeout(Some(Duration::from_millis(100)));
    let handle = spawn(&command, dispatcher(), None, CancelToken::new()).expect("spawn");
    let pid = handle.pid().expect("pid");

    let err = wait_or_cancel(handle).await.expect_err("must time out");
    assert!(matches!(err, EngineError::Timeout { timeout_ms: 100 }));
    assert!(!process_alive(pid));
}
