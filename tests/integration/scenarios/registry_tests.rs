use crate::infrastructure::EngineHarness;
use anyhow::Result;
use std::sync::Arc;
use testsystem_launcher::{
    ClientBuilder, Descriptor, Dialect, LaunchMode, Result as LaunchResult, TestSystem,
    TestSystemError, TracingListener,
};

/// Built-in factories cover both dialects in both launch modes
#[tokio::test]
async fn test_builtin_factories() -> Result<()> {
    let harness = EngineHarness::new()?;
    let registry = harness.registry();

    assert_eq!(
        registry.identifiers(),
        ["fit", "fit^inprocess", "slim", "slim^inprocess"]
    );
    for identifier in ["FIT", "Slim", "fit^InProcess", "SLIM^INPROCESS"] {
        assert!(registry.is_registered(identifier), "{} should be registered", identifier);
    }
    Ok(())
}

/// Type lookup ignores case and honours the launch mode
#[tokio::test]
async fn test_type_lookup_is_case_insensitive() -> Result<()> {
    let harness = EngineHarness::new()?;

    let fit = harness.create(&harness.stub_descriptor("Fit", &[]))?;
    assert_eq!(fit.dialect(), Dialect::Fit);
    assert!(!fit.execution_log().in_process);

    let slim = harness.create(&harness.in_process_descriptor("SLIM", "stub"))?;
    assert_eq!(slim.dialect(), Dialect::Slim);
    assert!(slim.execution_log().in_process);
    Ok(())
}

/// Unregistered types are reported by name
#[tokio::test]
async fn test_unknown_type() -> Result<()> {
    let harness = EngineHarness::new()?;
    let err = harness
        .registry()
        .create(&Descriptor::new("cucumber", "suite"))
        .err()
        .expect("creation should fail");
    assert!(matches!(err, TestSystemError::UnknownTestSystemType(t) if t == "cucumber"));
    Ok(())
}

/// A later registration replaces a built-in factory
#[tokio::test]
async fn test_custom_factory_overrides_builtin() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = EngineHarness::new()?;
    let mut registry = harness.registry();
    registry.register("SLIM", |descriptor: &Descriptor| -> LaunchResult<TestSystem> {
        let client = ClientBuilder::default().build(descriptor, LaunchMode::OutOfProcess)?;
        Ok(TestSystem::new(
            format!("custom-{}", descriptor.name),
            client,
            Dialect::Fit.adapter(),
            Arc::new(TracingListener),
        ))
    });

    let mut test_system = registry.create(&harness.stub_descriptor("slim", &[]))?;
    assert_eq!(test_system.name(), "custom-stub");
    assert_eq!(test_system.dialect(), Dialect::Fit);

    test_system.start().await?;
    test_system.bye().await?;
    assert_eq!(test_system.execution_log().exit_code, Some(0));
    Ok(())
}
