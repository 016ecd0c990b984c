use std::time::Duration;

use modhost_core::{KernelConfig, Language, Logger};
use modhost_ipc::{ChildKey, IpcManager, SpawnSpec};

fn echo_child_spec() -> SpawnSpec {
    SpawnSpec::new(env!("CARGO_BIN_EXE_echo_child"))
}

fn key() -> ChildKey {
    ChildKey::new("sample-provider", "1.0.0", Language::Python)
}

#[tokio::test]
async fn out_of_order_replies_still_correlate_by_id() {
    let manager = IpcManager::new(&KernelConfig::default(), Logger::new("test"));
    let handle = manager
        .get_or_spawn(key(), echo_child_spec())
        .await
        .expect("child starts");

    // request 1 is answered by the fixture only after request 2, so this
    // exercises id-based correlation rather than reply ordering.
    let first = handle.call("echo", vec![serde_json::json!("first")], Duration::from_secs(2));
    let second = handle.call("echo", vec![serde_json::json!("second")], Duration::from_secs(2));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), serde_json::json!(["first"]));
    assert_eq!(second.unwrap(), serde_json::json!(["second"]));
}

#[tokio::test]
async fn repeated_get_or_spawn_reuses_the_same_child() {
    let manager = IpcManager::new(&KernelConfig::default(), Logger::new("test"));
    let first = manager
        .get_or_spawn(key(), echo_child_spec())
        .await
        .expect("child starts");
    let second = manager
        .get_or_spawn(key(), echo_child_spec())
        .await
        .expect("child reused");

    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn call_times_out_when_child_never_replies() {
    let manager = IpcManager::new(&KernelConfig::default(), Logger::new("test"));
    let handle = manager
        .get_or_spawn(key(), echo_child_spec())
        .await
        .expect("child starts");

    let started = tokio::time::Instant::now();
    let result = handle
        .call("never_replies", vec![], Duration::from_millis(200))
        .await;
    let elapsed = started.elapsed();

    assert!(result.is_err());
    assert!(elapsed >= Duration::from_millis(200));
    match result.unwrap_err() {
        modhost_core::KernelError::IpcTimeout { .. } => {}
        other => panic!("expected IpcTimeout, got {other:?}"),
    }
}
