use super::*;

#[tokio::test]
async fn test_shutdown_stops_admission() {
    let env = create_test_env().await;
    let mut events = env.publisher.subscribe();
    assert!(env.publisher.is_accepting());

    env.publisher.shutdown().await.unwrap();

    assert!(!env.publisher.is_accepting());
    let err = env.publisher.publish(env.request().await).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
    assert_eq!(env.publisher.db.count_records().await.unwrap(), 0);

    assert!(matches!(events.recv().await.unwrap(), Event::Shutdown));
}

#[tokio::test]
async fn test_shutdown_keeps_queued_jobs_for_next_start() {
    let env = create_test_env().await;
    let accepted = env.publisher.publish(env.request().await).await.unwrap();

    env.publisher.shutdown().await.unwrap();
    assert_eq!(env.status(accepted.file_id).await, Status::Pending);
    assert_eq!(env.publisher.db.count_jobs().await.unwrap(), 1);

    let restarted = Publisher::new((*env.publisher.get_config()).clone())
        .await
        .unwrap();
    assert!(restarted.process_next_job(TEST_WORKER).await.unwrap());
    assert_eq!(env.status(accepted.file_id).await, Status::Available);
}

#[tokio::test]
async fn test_restart_releases_claims_of_dead_workers() {
    let env = create_test_env().await;
    let accepted = env.publisher.publish(env.request().await).await.unwrap();

    // The previous process claimed the job and died without acknowledging it
    let lease = env.publisher.config.worker.lease_timeout;
    env.publisher
        .db
        .claim_next_job("dead-process-0", lease)
        .await
        .unwrap()
        .unwrap();
    assert!(!env.publisher.process_next_job(TEST_WORKER).await.unwrap());

    let restarted = Publisher::new((*env.publisher.get_config()).clone())
        .await
        .unwrap();
    let job = restarted
        .db
        .get_job_for_record(accepted.file_id)
        .await
        .unwrap()
        .unwrap();
    assert!(job.claimed_by.is_none());

    assert!(restarted.process_next_job(TEST_WORKER).await.unwrap());
    assert_eq!(env.status(accepted.file_id).await, Status::Available);
}

#[tokio::test]
async fn test_shutdown_returns_promptly_when_idle() {
    let env = create_test_env().await;
    let handles = env.publisher.start_workers();

    tokio::time::timeout(Duration::from_secs(2), env.publisher.shutdown())
        .await
        .expect("idle shutdown should not wait for the timeout")
        .unwrap();

    for handle in handles {
        handle.await.unwrap();
    }
}
