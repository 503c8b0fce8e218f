use crate::infrastructure::EngineHarness;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use testsystem_launcher::{ConnectionState, Dialect, LaunchArguments, TestSystemError};
use tokio::io::AsyncReadExt;

/// The stub entry point connects from inside this process
#[tokio::test]
async fn test_in_process_stub_connects() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut test_system = harness.create(&harness.in_process_descriptor("slim", "stub"))?;

    let begun = Instant::now();
    test_system.start().await?;
    assert!(begun.elapsed() < Duration::from_secs(2));
    assert_eq!(test_system.connection_state(), ConnectionState::Connected);

    let log = test_system.execution_log();
    assert!(log.in_process);
    assert!(log.pid.is_none());
    assert!(log.command.starts_with("stub -x 127.0.0.1"), "command: {}", log.command);

    test_system.bye().await?;
    Ok(())
}

/// Fast-mode engines always receive `-x` in front of the launch arguments
#[tokio::test]
async fn test_entry_point_receives_fast_mode_arguments() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let received = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let mut harness = EngineHarness::new()?;
    let seen = Arc::clone(&received);
    harness.register_entry_point("recorder", move |args: Vec<String>| {
        let seen = Arc::clone(&seen);
        async move {
            if let Ok(mut seen) = seen.lock() {
                seen.extend(args.iter().cloned());
            }
            testsystem_launcher::stub_engine::entry_point(args).await
        }
    });

    let mut test_system = harness.create(&harness.in_process_descriptor("fit", "recorder"))?;
    assert_eq!(test_system.dialect(), Dialect::Fit);
    test_system.start().await?;
    test_system.bye().await?;

    let args = received.lock().unwrap().clone();
    assert_eq!(args[0], "-x");
    let launch = LaunchArguments::parse(&args).expect("launch arguments");
    assert_eq!(launch.host, "127.0.0.1");
    assert_eq!(launch.ticket, test_system.client().ticket());
    Ok(())
}

/// kill() marks the test system killed but cannot stop an in-process engine
#[tokio::test]
async fn test_kill_leaves_entry_point_running() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let finished = Arc::new(AtomicBool::new(false));
    let mut harness = EngineHarness::new()?;
    let done = Arc::clone(&finished);
    harness.register_entry_point("lingering", move |args: Vec<String>| {
        let done = Arc::clone(&done);
        async move {
            let launch = LaunchArguments::parse(&args)
                .ok_or_else(|| eyre::eyre!("bad arguments: {:?}", args))?;
            let mut channel =
                testsystem_launcher::ticket::announce(&launch.host, launch.port, launch.ticket).await?;
            let mut session = Vec::new();
            channel.read_to_end(&mut session).await?;
            done.store(true, Ordering::SeqCst);
            Ok::<(), eyre::Report>(())
        }
    });

    let mut test_system = harness.create(&harness.in_process_descriptor("slim", "lingering"))?;
    test_system.start().await?;

    test_system.kill().await;
    assert_eq!(test_system.connection_state(), ConnectionState::Killed);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!finished.load(Ordering::SeqCst), "entry point should still be running");

    // Ending the session is what lets it finish
    test_system.adapter_mut().finish().await?;
    for _ in 0..50 {
        if finished.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("entry point did not finish after the session ended");
}

/// An entry point that never connects is not rescued by any watchdog
#[tokio::test]
async fn test_in_process_has_no_watchdogs() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut harness = EngineHarness::new()?;
    harness.configure(|config| config.handshake_timeout = Duration::from_millis(100));
    harness.register_entry_point("silent", |_args: Vec<String>| async { Ok(()) });

    let mut test_system = harness.create(&harness.in_process_descriptor("slim", "silent"))?;
    let outcome = tokio::time::timeout(Duration::from_millis(500), test_system.start()).await;
    assert!(outcome.is_err(), "start should still be waiting");
    Ok(())
}

/// An in-process descriptor naming an unregistered entry point fails to build
#[tokio::test]
async fn test_unknown_entry_point() -> Result<()> {
    let harness = EngineHarness::new()?;
    let err = harness
        .registry()
        .create(&harness.in_process_descriptor("slim", "fitnesse.slim.SlimService"))
        .err()
        .expect("creation should fail");
    assert!(matches!(err, TestSystemError::UnknownEntryPoint(id) if id == "fitnesse.slim.SlimService"));
    Ok(())
}
