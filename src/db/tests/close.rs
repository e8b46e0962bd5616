use crate::db::*;
use crate::types::RecordId;
use tempfile::NamedTempFile;

/// Verify that querying the database after closing the pool returns an error
/// rather than hanging or panicking.
#[tokio::test]
async fn test_get_record_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let record = db
        .admit_publication(&super::new_publication("report.pdf"))
        .await
        .unwrap();
    assert!(db.get_record(record.id).await.unwrap().is_some());

    db.pool().close().await;

    let result = db.get_record(record.id).await;
    assert!(
        result.is_err(),
        "get_record after pool close should return an error, got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_admit_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db
        .admit_publication(&super::new_publication("report.pdf"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_claim_after_pool_close_returns_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.pool().close().await;

    let result = db
        .claim_next_job("worker-0", std::time::Duration::from_secs(60))
        .await;
    assert!(result.is_err());

    let result = db.finalize_error(RecordId::new(), "late").await;
    assert!(result.is_err());
}
