//! On-disk behavior: data and anchors survive closing and reopening the file.

use geotrail_core::{Anchor, Fix};
use geotrail_db::{Database, DbConfig};

#[tokio::test]
async fn test_store_and_queue_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geotrail.db");

    let token = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        for ts in [100, 200, 300] {
            let sample = Fix::new(ts, 10.0, 20.0).with_heading(45.0).into_sample();
            db.locations().append(&sample).await.unwrap();
            db.upload_queue().enqueue(&sample).await.unwrap();
        }

        let (_, next) = db.locations().query(None, 1).await.unwrap();
        db.close().await;
        next.unwrap().encode()
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let (total, applied) = db.migration_status().await.unwrap();
    assert_eq!(total, applied);

    let anchor = Anchor::decode(&token).unwrap();
    let (page, _) = db.locations().query(Some(anchor), 10).await.unwrap();
    let timestamps: Vec<i64> = page.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, vec![200, 300]);

    let batch = db.upload_queue().flush().await.unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].heading, Some(45.0));
}

#[tokio::test]
async fn test_ids_not_reused_after_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geotrail.db");

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let first = db
        .locations()
        .append(&Fix::new(100, 0.0, 0.0).into_sample())
        .await
        .unwrap();
    db.locations().evict_before(i64::MAX).await.unwrap();
    db.close().await;

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let second = db
        .locations()
        .append(&Fix::new(100, 0.0, 0.0).into_sample())
        .await
        .unwrap();

    // An anchor issued for the evicted row must not match the new one.
    assert!(second > first);
}
