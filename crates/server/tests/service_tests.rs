mod common;

use cistern_ledger::repos::VolumeRepo;
use cistern_server::service::volumes::ImportParams;
use cistern_server::ApiError;
use common::TestEnv;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn quota_volume_uses_namespace_size() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;

    let user = Uuid::new_v4();
    let row = env
        .service
        .create_volume(user, false, "ns-1", "vol-a", Uuid::nil())
        .await
        .unwrap();

    assert_eq!(row.capacity, 10);
    assert!(row.tariff_id.is_none());
    assert_eq!(env.used("ceph-1").await, 10);
    // Untariffed volumes never touch billing.
    assert!(env.billing.calls().is_empty());
    assert_eq!(env.orchestrator.calls(), vec!["create ns-1/vol-a"]);
}

#[tokio::test]
async fn exhausted_namespace_quota_is_rejected() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    env.billing.namespace_quota.store(0, Ordering::SeqCst);

    let err = env
        .service
        .create_volume(Uuid::new_v4(), false, "ns-1", "vol-a", Uuid::nil())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::QuotaExceeded(_)));
    assert_eq!(env.used("ceph-1").await, 0);
}

#[tokio::test]
async fn tariffed_volume_subscribes_billing() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    let tariff = env.billing.add_tariff(2, true, true);

    let row = env
        .service
        .create_volume(Uuid::new_v4(), false, "ns-1", "vol-a", tariff)
        .await
        .unwrap();

    assert_eq!(row.capacity, 2);
    assert_eq!(row.tariff_id, Some(tariff));
    assert_eq!(
        env.billing.calls(),
        vec![format!("subscribe {}", row.volume_id)]
    );
}

#[tokio::test]
async fn tariff_gating() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;

    let inactive = env.billing.add_tariff(2, false, true);
    let err = env
        .service
        .create_volume(Uuid::new_v4(), true, "ns-1", "vol-a", inactive)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::TariffUnavailable(_)));

    let private = env.billing.add_tariff(2, true, false);
    let err = env
        .service
        .create_volume(Uuid::new_v4(), false, "ns-1", "vol-a", private)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::TariffUnavailable(_)));

    // Admins may use private tariffs.
    env.service
        .create_volume(Uuid::new_v4(), true, "ns-1", "vol-a", private)
        .await
        .unwrap();

    let err = env
        .service
        .create_volume(Uuid::new_v4(), false, "ns-1", "vol-b", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Client(_)));
}

#[tokio::test]
async fn failed_provisioning_leaves_a_pending_row() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    env.orchestrator.fail_create.store(true, Ordering::SeqCst);

    let err = env
        .service
        .create_volume(Uuid::new_v4(), false, "ns-1", "vol-a", Uuid::nil())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Client(_)));

    // The ledger keeps the row and the reservation for the reconciler.
    let row = env.store.volume_by_label("ns-1", "vol-a").await.unwrap();
    assert_eq!(row.provision_state, "pending");
    assert_eq!(row.provision_attempts, 1);
    assert_eq!(env.used("ceph-1").await, 10);
}

#[tokio::test]
async fn delete_unsubscribes_tariffed_volumes() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    let tariff = env.billing.add_tariff(2, true, true);

    let user = Uuid::new_v4();
    let row = env
        .service
        .create_volume(user, false, "ns-1", "vol-a", tariff)
        .await
        .unwrap();

    env.service.delete_volume(user, "ns-1", "vol-a").await.unwrap();

    assert_eq!(env.used("ceph-1").await, 0);
    assert!(env
        .orchestrator
        .calls()
        .contains(&"delete ns-1/vol-a".to_string()));
    assert!(env
        .billing
        .calls()
        .contains(&format!("unsubscribe {}", row.volume_id)));
}

#[tokio::test]
async fn bulk_delete_unsubscribes_only_tariffed() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    let tariff = env.billing.add_tariff(2, true, true);

    let user = Uuid::new_v4();
    env.service
        .create_volume(user, false, "ns-1", "vol-quota", Uuid::nil())
        .await
        .unwrap();
    env.service
        .create_volume(user, false, "ns-2", "vol-paid", tariff)
        .await
        .unwrap();

    let deleted = env.service.delete_all_user_volumes(user).await.unwrap();
    assert_eq!(deleted.len(), 2);
    assert_eq!(env.used("ceph-1").await, 0);
    assert!(env
        .billing
        .calls()
        .contains(&"massive_unsubscribe 1".to_string()));
}

#[tokio::test]
async fn bulk_delete_of_untariffed_volumes_skips_billing() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;

    let user = Uuid::new_v4();
    env.service
        .create_volume(user, false, "ns-1", "vol-a", Uuid::nil())
        .await
        .unwrap();

    env.service.delete_all_user_volumes(user).await.unwrap();
    assert!(env.billing.calls().is_empty());
}

#[tokio::test]
async fn rename_propagates_to_billing_for_tariffed_volumes() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    let tariff = env.billing.add_tariff(2, true, true);

    let user = Uuid::new_v4();
    let row = env
        .service
        .create_volume(user, false, "ns-1", "vol-a", tariff)
        .await
        .unwrap();

    env.service
        .rename_volume(user, "ns-1", "vol-a", "vol-b")
        .await
        .unwrap();
    assert!(env
        .billing
        .calls()
        .contains(&format!("rename {} vol-b", row.volume_id)));

    // Untariffed rename stays local.
    env.service
        .create_volume(user, false, "ns-1", "vol-c", Uuid::nil())
        .await
        .unwrap();
    let calls_before = env.billing.calls().len();
    env.service
        .rename_volume(user, "ns-1", "vol-c", "vol-d")
        .await
        .unwrap();
    assert_eq!(env.billing.calls().len(), calls_before);
}

#[tokio::test]
async fn resize_follows_the_new_tariff() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;
    let small = env.billing.add_tariff(2, true, true);
    let large = env.billing.add_tariff(5, true, true);

    let user = Uuid::new_v4();
    env.service
        .create_volume(user, false, "ns-1", "vol-a", small)
        .await
        .unwrap();

    let row = env
        .service
        .resize_volume(user, false, "ns-1", "vol-a", large)
        .await
        .unwrap();
    assert_eq!(row.capacity, 5);
    assert_eq!(row.tariff_id, Some(large));
    assert_eq!(env.used("ceph-1").await, 5);
    assert!(env
        .orchestrator
        .calls()
        .contains(&"update ns-1/vol-a".to_string()));

    // Moving to a smaller tariff is rejected.
    let err = env
        .service
        .resize_volume(user, false, "ns-1", "vol-a", small)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Ledger(cistern_ledger::LedgerError::InvalidResize { .. })
    ));
}

#[tokio::test]
async fn import_registers_without_external_calls() {
    let env = TestEnv::new().await;
    env.add_storage("ceph-1", 20).await;

    let row = env
        .service
        .import_volume(
            "ns-1",
            ImportParams {
                name: "legacy".to_string(),
                capacity: 3,
                storage: "ceph-1".to_string(),
                owner: None,
                access_mode: Some("ReadWriteMany".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(row.provision_state, "provisioned");
    assert_eq!(row.owner_user_id, Uuid::nil());
    assert_eq!(row.access_mode, "ReadWriteMany");
    assert_eq!(env.used("ceph-1").await, 3);
    assert!(env.orchestrator.calls().is_empty());
}
