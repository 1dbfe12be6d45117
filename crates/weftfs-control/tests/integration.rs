//! Integration tests for the control plane: idempotent controller
//! initialization, tombstone handling, mastership alignment, and clone
//! activation, all driven against the in-memory coordination store and a
//! scripted dataset driver.

mod common;

use common::{test_node, test_node_with_client, FlakyKv};

use weftfs_control::{CloneError, ControlError, DatasetProbe, DriverError};
use weftfs_store::DatasetId;

fn ds(id: &str) -> DatasetId {
    DatasetId::new(id)
}

#[tokio::test]
async fn test_init_controller_is_idempotent() {
    let node = test_node("node-1");
    let id = ds("ds-a");

    let first = node.registry.init_controller(&id).await.unwrap();
    let second = node.registry.init_controller(&id).await.unwrap();
    assert!(first.same_controller(&second));

    // One loop means one discovery probe.
    first.mount().await.unwrap(); // barrier behind discovery
    assert_eq!(node.driver.probe_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_init_yields_one_controller() {
    let node = test_node("node-1");
    let id = ds("ds-a");

    let (a, b) = tokio::join!(
        node.registry.init_controller(&id),
        node.registry.init_controller(&id),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.same_controller(&b));

    // Whichever loop exists, it is the only one probing.
    a.report_snapshots("peer", vec![]).await.unwrap();
    assert_eq!(node.driver.probe_calls(), 1);
}

#[tokio::test]
async fn test_tombstoned_dataset_is_never_initialized() {
    let node = test_node("node-1");
    let id = ds("ds-b");
    node.store.mark_deleted(&id).await.unwrap();

    let err = node.registry.init_controller(&id).await;
    assert!(matches!(err, Err(ControlError::Deleted(_))));

    // No controller was created, and local purge ran.
    assert!(matches!(
        node.registry.controller(&id),
        Err(ControlError::UnknownDataset(_))
    ));
    assert_eq!(node.driver.destroy_calls(), 1);
    assert_eq!(node.runtime.cleanup_calls(), 1);
}

#[tokio::test]
async fn test_tombstone_purges_stale_controller() {
    let node = test_node("node-1");
    let id = ds("ds-b2");

    node.registry.init_controller(&id).await.unwrap();
    node.store.mark_deleted(&id).await.unwrap();

    // Next initialization reference notices the tombstone and tears the
    // stale controller down.
    let err = node.registry.init_controller(&id).await;
    assert!(matches!(err, Err(ControlError::Deleted(_))));
    assert!(matches!(
        node.registry.controller(&id),
        Err(ControlError::UnknownDataset(_))
    ));
}

#[tokio::test]
async fn test_align_mounts_when_we_are_master() {
    let node = test_node("node-1");
    let id = ds("ds-c");
    node.store.set_master(&id, "node-1").await.unwrap();

    let handle = node.registry.init_controller(&id).await.unwrap();
    assert!(!handle.mounted());

    node.registry.align_mount_state(&id).await.unwrap();
    assert!(handle.mounted());
    assert_eq!(node.driver.mount_calls(), 1);
    assert_eq!(node.driver.unmount_calls(), 0);
}

#[tokio::test]
async fn test_align_unmounts_when_master_is_elsewhere() {
    let node = test_node("node-1");
    let id = ds("ds-d");
    node.store.set_master(&id, "node-z").await.unwrap();
    node.driver.script_probe(
        &id,
        DatasetProbe {
            exists: true,
            mounted: true,
            snapshots: Vec::new(),
        },
    );

    let handle = node.registry.init_controller(&id).await.unwrap();
    handle.report_snapshots("peer", vec![]).await.unwrap(); // barrier
    assert!(handle.mounted());

    node.registry.align_mount_state(&id).await.unwrap();
    assert!(!handle.mounted());
    assert_eq!(node.driver.unmount_calls(), 1);
    assert_eq!(node.driver.mount_calls(), 0);
}

#[tokio::test]
async fn test_align_is_idempotent_for_stable_masters() {
    let node = test_node("node-1");
    let id = ds("ds-e");
    node.store.set_master(&id, "node-1").await.unwrap();
    node.registry.init_controller(&id).await.unwrap();

    node.registry.align_mount_state(&id).await.unwrap();
    node.registry.align_mount_state(&id).await.unwrap();

    // Already aligned: the second pass is a no-op.
    assert_eq!(node.driver.mount_calls(), 1);
}

#[tokio::test]
async fn test_align_with_no_master_and_unmounted_is_aligned() {
    let node = test_node("node-1");
    let id = ds("ds-f");
    node.registry.init_controller(&id).await.unwrap();

    node.registry.align_mount_state(&id).await.unwrap();
    assert_eq!(node.driver.mount_calls(), 0);
    assert_eq!(node.driver.unmount_calls(), 0);
}

#[tokio::test]
async fn test_align_unknown_dataset_fails_without_retry() {
    let node = test_node("node-1");
    let err = node.registry.align_mount_state(&ds("ds-missing")).await;
    assert!(matches!(err, Err(ControlError::UnknownDataset(_))));
}

#[tokio::test]
async fn test_align_retries_busy_driver() {
    let node = test_node("node-1");
    let id = ds("ds-g");
    node.store.set_master(&id, "node-1").await.unwrap();
    node.registry.init_controller(&id).await.unwrap();

    node.driver.fail_next_mount(DriverError::Busy);
    node.registry.align_mount_state(&id).await.unwrap();

    // First mount reported busy, the retry succeeded.
    assert_eq!(node.driver.mount_calls(), 2);
    assert!(node.registry.controller(&id).unwrap().mounted());
}

#[tokio::test]
async fn test_align_retries_busy_unmount() {
    let node = test_node("node-1");
    let id = ds("ds-g2");
    node.store.set_master(&id, "node-z").await.unwrap();
    node.driver.script_probe(
        &id,
        DatasetProbe {
            exists: true,
            mounted: true,
            snapshots: Vec::new(),
        },
    );
    let handle = node.registry.init_controller(&id).await.unwrap();
    handle.report_snapshots("peer", vec![]).await.unwrap(); // barrier

    node.driver.fail_next_unmount(DriverError::Busy);
    node.registry.align_mount_state(&id).await.unwrap();
    assert_eq!(node.driver.unmount_calls(), 2);
    assert!(!handle.mounted());
}

#[tokio::test]
async fn test_align_defers_when_master_read_fails() {
    let kv = FlakyKv::new();
    let node = test_node_with_client("node-1", kv.clone());
    let id = ds("ds-h");
    node.store.set_master(&id, "node-1").await.unwrap();
    node.registry.init_controller(&id).await.unwrap();

    // The first master read fails; the alignment must defer and retry,
    // not assume "no master".
    kv.fail_next_gets(1);
    node.registry.align_mount_state(&id).await.unwrap();
    assert!(node.registry.controller(&id).unwrap().mounted());
}

#[tokio::test]
async fn test_activate_clone_happy_path() {
    let node = test_node("node-1");
    let parent = ds("ds-p");
    let child = ds("ds-c1");
    node.registry.init_controller(&parent).await.unwrap();

    node.registry
        .activate_clone(&parent, "snap-1", &child, "feature")
        .await
        .unwrap();

    // The clone record and the master claim both exist...
    let clones = node.store.list_clones().await.unwrap();
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].filesystem_id, child);
    assert_eq!(clones[0].origin.filesystem_id, parent);
    assert_eq!(clones[0].origin.snapshot_id, "snap-1");
    assert_eq!(clones[0].name, "feature");
    assert_eq!(node.store.current_master(&child).await.unwrap(), "node-1");

    // ...and the child has a live controller.
    assert!(node.registry.controller(&child).is_ok());
}

#[tokio::test]
async fn test_activate_clone_rejects_taken_branch() {
    let node = test_node("node-1");
    let parent = ds("ds-p");

    node.registry
        .activate_clone(&parent, "snap-1", &ds("ds-c1"), "feature")
        .await
        .unwrap();

    let err = node
        .registry
        .activate_clone(&parent, "snap-2", &ds("ds-c2"), "feature")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "failed-clone-registration");

    // The losing activation claimed no master.
    assert!(node.store.current_master(&ds("ds-c2")).await.is_err());
}

#[tokio::test]
async fn test_activate_clone_rejects_claimed_master() {
    let node = test_node("node-1");
    let parent = ds("ds-p");
    let child = ds("ds-c1");
    node.store.set_master(&child, "node-other").await.unwrap();

    let err = node
        .registry
        .activate_clone(&parent, "snap-1", &child, "feature")
        .await
        .unwrap_err();
    assert!(matches!(err, CloneError::ClaimMaster(_)));
    assert_eq!(err.code(), "failed-make-cloner-master");

    // Ordering invariant: the clone record may exist without the master,
    // never the other way around.
    assert_eq!(node.store.list_clones().await.unwrap().len(), 1);
    assert_eq!(
        node.store.current_master(&child).await.unwrap(),
        "node-other"
    );
}

#[tokio::test]
async fn test_delete_dataset_is_best_effort() {
    let node = test_node("node-1");
    let id = ds("ds-i");
    node.registry.init_controller(&id).await.unwrap();
    node.registry.update_containers(&id, vec!["web-1".into()]);

    node.driver.fail_destroy(DriverError::Failed("dataset busy in zfs".into()));
    node.runtime.fail_with("docker unreachable");

    // Everything failed, the call still succeeds; convergence retries.
    node.registry.delete_dataset(&id).await.unwrap();

    assert!(matches!(
        node.registry.controller(&id),
        Err(ControlError::UnknownDataset(_))
    ));
    assert!(node.registry.containers_for(&id).is_empty());
    assert_eq!(node.runtime.cleanup_calls(), 1);
    assert_eq!(node.driver.destroy_calls(), 1);
}

#[tokio::test]
async fn test_delete_dataset_leaves_master_mapping() {
    let node = test_node("node-1");
    let id = ds("ds-j");
    node.store.set_master(&id, "node-1").await.unwrap();
    node.registry.init_controller(&id).await.unwrap();

    node.registry.delete_dataset(&id).await.unwrap();

    // The master mapping is owned by the coordination store; teardown
    // must not touch it.
    assert_eq!(node.store.current_master(&id).await.unwrap(), "node-1");
}

#[tokio::test]
async fn test_snapshots_for_current_master() {
    let node = test_node("node-1");
    let id = ds("ds-k");
    node.store.set_master(&id, "node-2").await.unwrap();

    let handle = node.registry.init_controller(&id).await.unwrap();
    handle
        .report_snapshots(
            "node-2",
            vec![weftfs_store::Snapshot {
                id: "snap-1".to_string(),
                filesystem_id: id.clone(),
                created_at: Default::default(),
                metadata: Default::default(),
            }],
        )
        .await
        .unwrap();

    let snaps = node.registry.snapshots_for_current_master(&id).await.unwrap();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].id, "snap-1");

    // Without a master declaration the query fails.
    let err = node
        .registry
        .snapshots_for_current_master(&ds("ds-unmastered"))
        .await;
    assert!(err.is_err());
}
