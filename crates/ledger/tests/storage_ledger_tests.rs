mod common;

use cistern_ledger::repos::{NewStorage, StorageRepo, VolumeRepo};
use cistern_ledger::LedgerError;
use common::{new_volume, TestLedger};

#[tokio::test]
async fn create_and_fetch_storage() {
    let ledger = TestLedger::new().await;

    let created = ledger.add_storage("ceph-1", 100).await;
    assert_eq!(created.used, 0);
    assert_eq!(created.free(), 100);

    let fetched = ledger.store.storage_by_name("ceph-1").await.unwrap();
    assert_eq!(fetched.storage_id, created.storage_id);
    assert_eq!(fetched.size, 100);
}

#[tokio::test]
async fn duplicate_storage_name_conflicts() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;

    let err = ledger
        .store
        .create_storage(&NewStorage {
            name: "ceph-1".to_string(),
            size: 50,
            replicas: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists(_)));
}

#[tokio::test]
async fn unknown_storage_is_not_found() {
    let ledger = TestLedger::new().await;
    let err = ledger.store.storage_by_name("nope").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn rename_and_resize_storage() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;

    let updated = ledger
        .store
        .update_storage(
            "ceph-1",
            &cistern_ledger::repos::StorageUpdate {
                name: Some("ceph-east".to_string()),
                size: Some(200),
                replicas: Some(3),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "ceph-east");
    assert_eq!(updated.size, 200);
    assert_eq!(updated.replicas, 3);

    // The old name no longer resolves.
    assert!(ledger.store.storage_by_name("ceph-1").await.is_err());
    assert!(ledger.store.storage_by_name("ceph-east").await.is_ok());
}

#[tokio::test]
async fn storage_rename_cascades_to_volumes() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;
    ledger
        .store
        .create_volume(&new_volume("ns-1", "vol-a", 10, "ceph-1"))
        .await
        .unwrap();

    ledger
        .store
        .update_storage(
            "ceph-1",
            &cistern_ledger::repos::StorageUpdate {
                name: Some("ceph-2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let volume = ledger.store.volume_by_label("ns-1", "vol-a").await.unwrap();
    assert_eq!(volume.storage_name, "ceph-2");
}

#[tokio::test]
async fn rename_onto_taken_name_conflicts() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;
    ledger.add_storage("ceph-2", 100).await;

    let err = ledger
        .store
        .update_storage(
            "ceph-1",
            &cistern_ledger::repos::StorageUpdate {
                name: Some("ceph-2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists(_)));
}

#[tokio::test]
async fn shrinking_below_allocation_is_rejected() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;
    ledger
        .store
        .create_volume(&new_volume("ns-1", "vol-a", 40, "ceph-1"))
        .await
        .unwrap();

    let err = ledger
        .store
        .update_storage(
            "ceph-1",
            &cistern_ledger::repos::StorageUpdate {
                size: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidResize {
            current: 40,
            requested: 30
        }
    ));
}

#[tokio::test]
async fn delete_storage_is_idempotent_failure() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;

    ledger.store.delete_storage("ceph-1").await.unwrap();
    assert!(ledger.store.storage_by_name("ceph-1").await.is_err());

    let err = ledger.store.delete_storage("ceph-1").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn least_used_prefers_emptier_storage() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;
    ledger.add_storage("ceph-2", 100).await;

    ledger
        .store
        .create_volume(&new_volume("ns-1", "vol-a", 30, "ceph-1"))
        .await
        .unwrap();

    let chosen = ledger.store.least_used_storage(10).await.unwrap();
    assert_eq!(chosen.name, "ceph-2");
}

#[tokio::test]
async fn least_used_skips_deleted_and_full_storages() {
    let ledger = TestLedger::new().await;
    ledger.add_storage("ceph-1", 100).await;
    ledger.add_storage("ceph-2", 5).await;
    ledger.store.delete_storage("ceph-1").await.unwrap();

    let err = ledger.store.least_used_storage(10).await.unwrap_err();
    assert!(matches!(err, LedgerError::NoCapacity { requested: 10 }));

    // ceph-2 still fits a smaller request.
    let chosen = ledger.store.least_used_storage(5).await.unwrap();
    assert_eq!(chosen.name, "ceph-2");
}
