use crate::infrastructure::{EngineHarness, LifecycleEvent};
use anyhow::Result;
use std::time::{Duration, Instant};
use testsystem_launcher::{ConnectionState, Dialect, TestSystemError};
use tracing::debug;

/// An engine that connects with its ticket is accepted and ends cleanly on bye
#[tokio::test]
async fn test_stub_engine_connects_and_says_bye() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.stub_descriptor("slim", &[]))?;
    assert_eq!(test_system.dialect(), Dialect::Slim);

    test_system.start().await?;
    assert!(test_system.is_successfully_started());
    assert_eq!(test_system.connection_state(), ConnectionState::Connected);
    assert!(test_system.adapter_mut().channel().is_some(), "adapter should own the channel");

    test_system.bye().await?;

    let log = test_system.execution_log();
    debug!("execution log:\n{}", log);
    assert!(log.has_exited());
    assert_eq!(log.exit_code, Some(0));
    assert!(log.pid.is_some());

    assert_eq!(
        harness.listener().events(),
        vec![
            LifecycleEvent::Started("stub".to_string()),
            LifecycleEvent::Stopped {
                name: "stub".to_string(),
                exit_code: Some(0),
                error: None,
            },
        ]
    );
    Ok(())
}

/// The FIT adapter ends the session as well; the engine's exit status is kept
#[tokio::test]
async fn test_fit_session_records_exit_status() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.stub_descriptor("FIT", &["--exit-code", "3"]))?;
    assert_eq!(test_system.dialect(), Dialect::Fit);

    test_system.start().await?;
    test_system.bye().await?;

    assert_eq!(test_system.execution_log().exit_code, Some(3));
    Ok(())
}

/// A connection announcing someone else's ticket never counts as the engine
#[tokio::test]
async fn test_wrong_ticket_is_rejected() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.stub_descriptor("slim", &["--ticket-override", "70000"]))?;

    let err = test_system.start().await.unwrap_err();
    assert!(
        matches!(err, TestSystemError::TicketMismatch { ref received, .. } if received == "70000"),
        "unexpected error: {}",
        err
    );
    assert!(!test_system.is_successfully_started());
    assert_eq!(test_system.connection_state(), ConnectionState::TimedOut);
    assert!(test_system.adapter_mut().channel().is_none());

    let events = harness.listener().events();
    assert!(matches!(
        events.as_slice(),
        [LifecycleEvent::Stopped { error: Some(_), .. }]
    ));
    Ok(())
}

/// Environment and working directory reach the engine process
#[tokio::test]
async fn test_engine_sees_environment_and_working_directory() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let script = format!(
        "echo \"$GREETING from $(pwd)\"; exec {} engine \"$0\" \"$1\" \"$2\"",
        crate::infrastructure::tslaunch_binary().display()
    );
    let mut environment = testsystem_launcher::Environment::new();
    environment.set("GREETING", "hello");
    let descriptor = harness
        .shell_descriptor(&script)
        .with_environment(environment)
        .with_working_directory(harness.temp_path());

    let mut test_system = harness.create(&descriptor)?;
    test_system.start().await?;
    test_system.bye().await?;

    let log = test_system.execution_log();
    let expected_dir = harness.temp_path().canonicalize()?;
    assert!(log.stdout.contains("hello from"), "stdout: {}", log.stdout);
    assert!(
        log.stdout.contains(&expected_dir.display().to_string()),
        "stdout: {}",
        log.stdout
    );
    assert_eq!(log.exit_code, Some(0));
    Ok(())
}

/// A started test system cannot be started again
#[tokio::test]
async fn test_second_start_is_refused() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.stub_descriptor("slim", &[]))?;
    test_system.start().await?;

    let begun = Instant::now();
    assert!(matches!(
        test_system.start().await,
        Err(TestSystemError::AlreadyStarted)
    ));
    assert!(begun.elapsed() < Duration::from_secs(1));
    assert_eq!(test_system.connection_state(), ConnectionState::Connected);

    test_system.bye().await?;
    Ok(())
}
