mod mocks;

use mocks::{at, manager, n8n_container, MockEngine};
use n8n_docker::{CheckpointStore, NoProgress, RecoveryOutcome, UpgradeCheckpoint, UpgradeStage};
use n8n_types::{AccessMode, ErrorKind};
use std::sync::Mutex;
use tempfile::TempDir;

fn running_engine() -> MockEngine {
    MockEngine::new()
        .with_image("sha256:100", &["n8nio/n8n:1.0.0"], &[], at(1))
        .with_container(n8n_container("n8n", "sha256:100", "running"))
        .with_networks(&["bridge", "host", "none", "n8n_web"])
}

#[tokio::test]
async fn test_upgrade_preserves_runtime_configuration() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let manager = manager(&engine, &dir);

    let id = manager.upgrade_to("1.1.0", &NoProgress).await.unwrap();

    assert_eq!(
        engine.mutations(),
        vec!["stop_container", "remove_container", "pull_image", "create_container", "connect_network", "start_container"]
    );

    let created = engine.created();
    assert_eq!(created.len(), 1);
    let (name, spec) = &created[0];
    assert_eq!(name, "n8n");
    assert_eq!(spec.image, "n8nio/n8n:1.1.0");
    assert_eq!(spec.restart_policy, "unless-stopped");
    assert_eq!(spec.runtime.port_bindings.get(&5678), Some(&5678));
    assert_eq!(spec.runtime.volume_mounts["n8n_data"].mount_path, "/home/node/.n8n");
    assert_eq!(spec.runtime.volume_mounts["n8n_data"].mode, AccessMode::Rw);
    assert_eq!(
        spec.runtime.environment.get("N8N_HOST").map(String::as_str),
        Some("n8n.example.com")
    );

    let container = engine.container("n8n").unwrap();
    assert_eq!(container.id, id);
    assert_eq!(container.state.status, "running");
    assert!(container.networks.contains(&"n8n_web".to_string()));

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    assert!(store.load().await.unwrap().is_none());
    assert!(!store.lock_path().exists());
}

#[tokio::test]
async fn test_progress_milestones() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let messages = Mutex::new(Vec::new());
    let sink = |message: &str| messages.lock().unwrap().push(message.to_string());

    manager(&engine, &dir).upgrade_to("1.1.0", &sink).await.unwrap();

    let messages = messages.into_inner().unwrap();
    assert_eq!(messages.first().map(String::as_str), Some("Getting current container configuration..."));
    assert!(messages.contains(&"Pulling image n8nio/n8n:1.1.0...".to_string()));
    assert_eq!(messages.last().map(String::as_str), Some("Upgrade complete!"));
}

#[tokio::test]
async fn test_absent_container_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let engine = MockEngine::new();

    manager(&engine, &dir).upgrade_to("1.1.0", &NoProgress).await.unwrap();

    assert_eq!(engine.mutations(), vec!["pull_image", "create_container", "start_container"]);
    let (_, spec) = &engine.created()[0];
    assert_eq!(spec.runtime.port_bindings.get(&5678), Some(&5678));
    assert_eq!(spec.runtime.volume_mounts["n8n_data"].mount_path, "/home/node/.n8n");
    assert!(spec.runtime.environment.is_empty());
}

#[tokio::test]
async fn test_pull_failure_leaves_container_absent_and_checkpoint_behind() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().missing_tag("n8nio/n8n:9.9.9");
    let manager = manager(&engine, &dir);

    let err = manager.upgrade_to("9.9.9", &NoProgress).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ImageNotFound);
    assert!(engine.container("n8n").is_none());
    assert!(engine.created().is_empty());

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    let checkpoint = store.load().await.unwrap().unwrap();
    assert_eq!(checkpoint.stage, UpgradeStage::Pulling);
    assert_eq!(checkpoint.previous_image.as_deref(), Some("n8nio/n8n:1.0.0"));
    assert_eq!(checkpoint.runtime_config.port_bindings.get(&5678), Some(&5678));
    assert!(!store.lock_path().exists());
}

#[tokio::test]
async fn test_recover_recreates_previous_container() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().missing_tag("n8nio/n8n:9.9.9");
    let manager = manager(&engine, &dir);
    manager.upgrade_to("9.9.9", &NoProgress).await.unwrap_err();

    let outcome = manager.recover().await.unwrap();

    let container = engine.container("n8n").unwrap();
    assert_eq!(
        outcome,
        RecoveryOutcome::Recreated {
            container_id: container.id.clone(),
            image: "n8nio/n8n:1.0.0".to_string(),
        }
    );
    assert_eq!(container.image_id, "sha256:100");
    assert_eq!(container.state.status, "running");
    assert!(container.networks.contains(&"n8n_web".to_string()));
    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NoCheckpoint);
}

#[tokio::test]
async fn test_retry_after_failed_pull_keeps_captured_configuration() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().missing_tag("n8nio/n8n:9.9.9");
    let manager = manager(&engine, &dir);
    manager.upgrade_to("9.9.9", &NoProgress).await.unwrap_err();
    assert!(engine.container("n8n").is_none());

    manager.upgrade_to("1.1.0", &NoProgress).await.unwrap();

    let (_, spec) = &engine.created()[0];
    assert_eq!(spec.image, "n8nio/n8n:1.1.0");
    assert_eq!(
        spec.runtime.environment.get("N8N_HOST").map(String::as_str),
        Some("n8n.example.com")
    );
    assert_eq!(spec.runtime.network_name.as_deref(), Some("n8n_web"));

    let container = engine.container("n8n").unwrap();
    assert_eq!(container.state.status, "running");
    assert!(container.networks.contains(&"n8n_web".to_string()));

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NoCheckpoint);
}

#[tokio::test]
async fn test_failed_retry_keeps_checkpoint_for_recovery() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine()
        .missing_tag("n8nio/n8n:9.9.9")
        .missing_tag("n8nio/n8n:9.9.8");
    let manager = manager(&engine, &dir);
    manager.upgrade_to("9.9.9", &NoProgress).await.unwrap_err();
    manager.upgrade_to("9.9.8", &NoProgress).await.unwrap_err();

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    let checkpoint = store.load().await.unwrap().unwrap();
    assert_eq!(checkpoint.target_image, "n8nio/n8n:9.9.8");
    assert_eq!(checkpoint.previous_image.as_deref(), Some("n8nio/n8n:1.0.0"));

    match manager.recover().await.unwrap() {
        RecoveryOutcome::Recreated { image, .. } => assert_eq!(image, "n8nio/n8n:1.0.0"),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_recover_starts_container_left_stopped_by_failed_removal() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().failing_remove();
    let manager = manager(&engine, &dir);

    let err = manager.upgrade_to("1.1.0", &NoProgress).await.unwrap_err();
    assert!(err.to_string().starts_with("Remove container failed"));
    assert_eq!(engine.container("n8n").unwrap().state.status, "exited");

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    assert_eq!(store.load().await.unwrap().unwrap().stage, UpgradeStage::Removing);

    assert_eq!(
        manager.recover().await.unwrap(),
        RecoveryOutcome::Restarted {
            container_id: "n8n-id".to_string(),
        }
    );
    let container = engine.container("n8n").unwrap();
    assert_eq!(container.state.status, "running");
    assert_eq!(container.image_id, "sha256:100");
    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NoCheckpoint);
}

#[tokio::test]
async fn test_recover_keeps_checkpoint_when_start_fails() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().failing_start();
    let manager = manager(&engine, &dir);

    let err = manager.upgrade_to("1.1.0", &NoProgress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operation);
    assert!(err.to_string().starts_with("Start container failed"));
    assert_eq!(engine.container("n8n").unwrap().state.status, "created");

    assert!(manager.recover().await.is_err());
    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    assert_eq!(store.load().await.unwrap().unwrap().stage, UpgradeStage::Starting);

    engine.set_failing_start(false);
    assert!(matches!(
        manager.recover().await.unwrap(),
        RecoveryOutcome::Restarted { .. }
    ));
    assert_eq!(engine.container("n8n").unwrap().state.status, "running");
}

#[tokio::test]
async fn test_recover_discards_checkpoint_when_container_runs() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let manager = manager(&engine, &dir);

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    let mut checkpoint = UpgradeCheckpoint::new(
        "n8n",
        Some("n8nio/n8n:1.0.0".to_string()),
        "n8nio/n8n:1.1.0".to_string(),
        Default::default(),
    );
    checkpoint.stage = UpgradeStage::Removing;
    store.save(&checkpoint).await.unwrap();

    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NothingToRecover);
    assert!(engine.mutations().is_empty());
    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NoCheckpoint);
}

#[tokio::test]
async fn test_recover_waits_for_running_upgrade() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let manager = manager(&engine, &dir);

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    let lock = store.lock().unwrap();

    let err = manager.recover().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpgradeInProgress);

    drop(lock);
    assert_eq!(manager.recover().await.unwrap(), RecoveryOutcome::NoCheckpoint);
}

#[tokio::test]
async fn test_held_lock_rejects_concurrent_upgrade() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let manager = manager(&engine, &dir);

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    let lock = store.lock().unwrap();

    let err = manager.upgrade_to("1.1.0", &NoProgress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpgradeInProgress);
    assert!(engine.mutations().is_empty());

    drop(lock);
    assert!(manager.upgrade_to("1.1.0", &NoProgress).await.is_ok());
}

#[tokio::test]
async fn test_stale_lock_can_be_released() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine();
    let manager = manager(&engine, &dir);

    let store = CheckpointStore::new(&manager.config().state.dir, "n8n");
    std::mem::forget(store.lock().unwrap());

    assert!(manager.upgrade_to("1.1.0", &NoProgress).await.is_err());
    assert!(manager.release_stale_lock().unwrap());
    assert!(!manager.release_stale_lock().unwrap());
    assert!(manager.upgrade_to("1.1.0", &NoProgress).await.is_ok());
}

#[tokio::test]
async fn test_network_fallback_prefers_web_network() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine()
        .with_networks(&["bridge", "n8n_web", "compose_web", "backend"])
        .refusing_network("n8n_web");

    manager(&engine, &dir).upgrade_to("1.1.0", &NoProgress).await.unwrap();

    let connected: Vec<String> = engine.connected().into_iter().map(|(network, _)| network).collect();
    assert_eq!(connected, vec!["compose_web"]);
    assert_eq!(engine.container("n8n").unwrap().state.status, "running");
}

#[tokio::test]
async fn test_network_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let engine = running_engine().with_networks(&["bridge"]);

    let result = manager(&engine, &dir).upgrade_to("1.1.0", &NoProgress).await;

    assert!(result.is_ok());
    assert!(engine.connected().is_empty());
    assert_eq!(engine.container("n8n").unwrap().state.status, "running");
}
