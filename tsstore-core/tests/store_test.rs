//! End-to-end scenarios driving a [`Store`] over the in-memory test doubles.

use tokio_util::sync::CancellationToken;

use tsstore_core::queries::MeasurementTagKeys;
use tsstore_core::Store;
use tsstore_types::in_memory::{InMemoryOpener, TestBatch, TestPoint};
use tsstore_types::{AllowAll, Database, Error, RetentionPolicy, ShardId, StoreConfig};

async fn open_store(root: &std::path::Path) -> (std::sync::Arc<Store>, std::sync::Arc<InMemoryOpener>) {
    let opener = InMemoryOpener::new("inmem");
    let config = StoreConfig::new(root);
    let store = Store::open(config, opener.clone()).await.unwrap();
    (store, opener)
}

#[tokio::test]
async fn create_delete_rp_removes_only_its_shards_and_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let (store, opener) = open_store(tmp.path()).await;

    let db0 = Database::from("db0");
    let rp0 = RetentionPolicy::from("rp0");
    let rp1 = RetentionPolicy::from("rp1");

    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(1), true).await.unwrap();
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(2), true).await.unwrap();
    store.create_shard(opener.as_ref(), db0.clone(), rp1.clone(), ShardId(3), true).await.unwrap();

    store.delete_retention_policy(db0.clone(), rp0.clone()).await.unwrap();

    assert!(!store.has_shard(ShardId(1)));
    assert!(!store.has_shard(ShardId(2)));
    assert!(store.has_shard(ShardId(3)));
    assert!(!tmp.path().join("db0").join("rp0").exists());
    assert!(tmp.path().join("db0").join("rp1").exists());

    store.close().await.unwrap();
}

#[tokio::test]
async fn delete_shard_purges_series_unique_to_it() {
    let tmp = tempfile::tempdir().unwrap();
    let (store, opener) = open_store(tmp.path()).await;

    let db0 = Database::from("db0");
    let rp0 = RetentionPolicy::from("rp0");
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(1), true).await.unwrap();
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(2), true).await.unwrap();

    store
        .write_to_shard(ShardId(1), &TestBatch::new(vec![TestPoint::new("cpu", &[("serverb", "b")], 1)]))
        .await
        .unwrap();
    store
        .write_to_shard(
            ShardId(2),
            &TestBatch::new(vec![
                TestPoint::new("cpu", &[("servera", "a")], 1),
                TestPoint::new("mem", &[("serverc", "a")], 1),
            ]),
        )
        .await
        .unwrap();

    store.delete_shard(ShardId(1)).await.unwrap();

    let cancel = CancellationToken::new();
    let result = store.tag_keys(&AllowAll, &db0, &[ShardId(2)], None, &cancel).await.unwrap();
    assert_eq!(
        result,
        vec![
            MeasurementTagKeys { measurement: "cpu".into(), keys: vec!["servera".into()] },
            MeasurementTagKeys { measurement: "mem".into(), keys: vec!["serverc".into()] },
        ]
    );

    store.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_writes_and_deletes_settle_to_the_survivor_measurement() {
    let tmp = tempfile::tempdir().unwrap();
    let (store, opener) = open_store(tmp.path()).await;

    let db0 = Database::from("db0");
    let rp0 = RetentionPolicy::from("rp0");
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(1), true).await.unwrap();
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(2), true).await.unwrap();
    store
        .write_to_shard(ShardId(1), &TestBatch::new(vec![TestPoint::new("mem", &[("host", "a")], 0)]))
        .await
        .unwrap();

    let writer_store = store.clone();
    let writer = tokio::spawn(async move {
        for i in 0..20 {
            writer_store
                .write_to_shard(ShardId(1), &TestBatch::new(vec![TestPoint::new("cpu", &[("server", "a")], i)]))
                .await
                .unwrap();
            writer_store
                .write_to_shard(ShardId(2), &TestBatch::new(vec![TestPoint::new("cpu", &[("server", "b")], i)]))
                .await
                .unwrap();
        }
    });

    let deleter_store = store.clone();
    let deleter = tokio::spawn(async move {
        for _ in 0..20 {
            deleter_store.delete_measurement(db0.clone(), "cpu".to_string()).await.unwrap();
        }
    });

    writer.await.unwrap();
    deleter.await.unwrap();

    let db0 = Database::from("db0");
    store.delete_measurement(db0.clone(), "cpu".to_string()).await.unwrap();

    let cancel = CancellationToken::new();
    let names = store.measurement_names(&AllowAll, &db0, None, &cancel).await.unwrap().unwrap();
    assert_eq!(names, vec!["mem".to_string()]);

    store.close().await.unwrap();
}

#[tokio::test]
async fn mixed_index_types_refuse_series_delete_but_allow_create() {
    let tmp = tempfile::tempdir().unwrap();
    let opener_a = InMemoryOpener::new("inmem");
    let config = StoreConfig::new(tmp.path());
    let store = Store::open(config, opener_a.clone()).await.unwrap();

    let db0 = Database::from("db0");
    let rp0 = RetentionPolicy::from("rp0");
    store.create_shard(opener_a.as_ref(), db0.clone(), rp0.clone(), ShardId(1), true).await.unwrap();

    let opener_b = InMemoryOpener::new("tsi1");
    store.create_shard(opener_b.as_ref(), db0.clone(), rp0.clone(), ShardId(2), true).await.unwrap();
    assert!(store.has_shard(ShardId(2)));

    let err = store.delete_series(db0.clone(), vec![], None).await.unwrap_err();
    assert!(matches!(err, Error::MultipleIndexTypes(_)));

    store.close().await.unwrap();
}

#[tokio::test]
async fn already_cancelled_token_aborts_a_query_between_shards() {
    let tmp = tempfile::tempdir().unwrap();
    let (store, opener) = open_store(tmp.path()).await;

    let db0 = Database::from("db0");
    let rp0 = RetentionPolicy::from("rp0");
    store.create_shard(opener.as_ref(), db0.clone(), rp0.clone(), ShardId(1), true).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let shard_ids = store.shard_ids_in_database(&db0);
    let err = store.tag_keys(&AllowAll, &db0, &shard_ids, None, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    store.close().await.unwrap();
}
