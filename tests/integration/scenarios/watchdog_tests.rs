use crate::infrastructure::{tslaunch_binary, wait_for_group_exit, EngineHarness};
use anyhow::Result;
use std::time::{Duration, Instant};
use testsystem_launcher::{ClientConfig, ConnectionState, Descriptor, TestSystemError};
use tracing::debug;

/// An engine that never connects is given up on once the budget runs out
#[tokio::test]
async fn test_handshake_timeout() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut harness = EngineHarness::new()?;
    harness.configure(|config| {
        config.handshake_timeout = Duration::from_millis(500);
        config.poll_interval = ClientConfig::default().poll_interval;
    });
    let mut test_system = harness.create(&harness.shell_descriptor("sleep 30 & sleep 30"))?;

    let begun = Instant::now();
    let err = test_system.start().await.unwrap_err();
    let elapsed = begun.elapsed();
    debug!(?elapsed, "start failed: {}", err);

    assert!(matches!(err, TestSystemError::HandshakeTimeout(_)), "unexpected error: {}", err);
    assert_eq!(test_system.connection_state(), ConnectionState::TimedOut);
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(700), "took {:?}", elapsed);

    // The engine and its background child were killed on the way out
    let log = test_system.execution_log();
    assert!(log.has_exited());
    assert!(log.exit_signal.is_some(), "log: {}", log);
    wait_for_group_exit(log.pid.expect("engine pid"), Duration::from_secs(1)).await?;
    Ok(())
}

/// A leader that exits while its background child keeps the output pipes
/// open is still seen as an early exit, and the child does not survive
#[tokio::test]
async fn test_early_exit_with_background_child() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut harness = EngineHarness::new()?;
    harness.configure(|config| {
        config.handshake_timeout = Duration::from_millis(3000);
        config.early_termination_debounce = Duration::from_millis(200);
    });
    let mut test_system = harness.create(&harness.shell_descriptor("sleep 30 & exit 1"))?;

    let begun = Instant::now();
    let err = test_system.start().await.unwrap_err();
    let elapsed = begun.elapsed();

    assert!(
        matches!(err, TestSystemError::EarlyTermination { exit_code: Some(1) }),
        "unexpected error: {}",
        err
    );
    assert_eq!(test_system.connection_state(), ConnectionState::TerminatedEarly);
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);

    let log = test_system.execution_log();
    assert_eq!(log.exit_code, Some(1));
    wait_for_group_exit(log.pid.expect("engine pid"), Duration::from_secs(1)).await?;
    Ok(())
}

/// An engine that dies before connecting is reported with its exit status
#[tokio::test]
async fn test_early_termination() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut harness = EngineHarness::new()?;
    harness.configure(|config| {
        config.early_termination_debounce = Duration::from_millis(1000);
    });
    let mut test_system = harness.create(&harness.shell_descriptor("echo boom >&2; exit 1"))?;

    let begun = Instant::now();
    let err = test_system.start().await.unwrap_err();
    let elapsed = begun.elapsed();

    assert!(
        matches!(err, TestSystemError::EarlyTermination { exit_code: Some(1) }),
        "unexpected error: {}",
        err
    );
    assert_eq!(test_system.connection_state(), ConnectionState::TerminatedEarly);
    assert!(elapsed >= Duration::from_millis(1000), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);

    let log = test_system.execution_log();
    assert_eq!(log.exit_code, Some(1));
    assert!(log.stderr.contains("boom"), "stderr: {}", log.stderr);
    Ok(())
}

/// A command that cannot be spawned fails start as if it had timed out
#[tokio::test]
async fn test_launch_failure() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let descriptor = Descriptor::new("slim", "missing")
        .with_command("/nonexistent/engine-binary", Vec::<String>::new());
    let mut test_system = harness.create(&descriptor)?;

    let begun = Instant::now();
    let err = test_system.start().await.unwrap_err();

    assert!(matches!(err, TestSystemError::LaunchFailure { .. }), "unexpected error: {}", err);
    assert_eq!(test_system.connection_state(), ConnectionState::TimedOut);
    assert!(!test_system.is_successfully_started());
    assert!(begun.elapsed() < Duration::from_secs(1));
    Ok(())
}

/// Killing a running engine is safe, and safe to repeat
#[tokio::test]
async fn test_kill_is_idempotent() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.stub_descriptor("slim", &[]))?;
    test_system.start().await?;

    test_system.kill().await;
    assert_eq!(test_system.connection_state(), ConnectionState::Killed);
    assert!(test_system.is_successfully_started(), "an established connection stays established");

    let log = test_system.execution_log();
    assert!(log.has_exited(), "engine should be gone after kill: {}", log);

    test_system.kill().await;
    assert_eq!(test_system.connection_state(), ConnectionState::Killed);
    Ok(())
}

/// kill() takes down everything the engine started, not just the engine
#[tokio::test]
async fn test_kill_reaches_whole_process_group() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let script = format!(
        "sleep 30 & exec {} engine \"$0\" \"$1\" \"$2\"",
        tslaunch_binary().display()
    );
    let mut test_system = harness.create(&harness.shell_descriptor(&script))?;
    test_system.start().await?;

    let pgid = test_system.execution_log().pid.expect("engine pid");
    test_system.kill().await;

    wait_for_group_exit(pgid, Duration::from_secs(1)).await?;
    assert!(test_system.execution_log().has_exited());
    Ok(())
}

/// Killing before start leaves nothing to clean up
#[tokio::test]
async fn test_kill_before_start() -> Result<()> {
    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.shell_descriptor("sleep 5"))?;

    test_system.kill().await;
    assert!(!test_system.execution_log().has_exited());
    assert!(!test_system.is_successfully_started());
    Ok(())
}
