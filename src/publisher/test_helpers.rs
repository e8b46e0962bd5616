//! Shared test helpers for creating Publisher instances in tests.

use crate::config::{Config, StrategyMode};
use crate::publisher::{PublishRequest, Publisher};
use crate::types::{RecordId, Status};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

/// Content of the sample file every test repository starts with
pub(crate) const SAMPLE_CONTENT: &[u8] = b"The quick brown fox jumps over the lazy dog\n";

/// Test fixture: a publisher over one repository inside a temp directory
pub(crate) struct TestEnv {
    pub(crate) publisher: Publisher,
    /// Canonical path of the repository root
    pub(crate) repo: PathBuf,
    /// Canonical path of `my_file_to_publish.txt` inside the repository
    pub(crate) sample: PathBuf,
    // Keep the temp directory alive
    _temp_dir: tempfile::TempDir,
}

impl TestEnv {
    /// Published location of `file_name` at `version`
    pub(crate) fn published(&self, file_name: &str, version: i64) -> PathBuf {
        self.repo
            .join("public")
            .join(crate::utils::stored_file_name(file_name, version))
    }

    /// Issue a valid token
    pub(crate) async fn token(&self) -> String {
        self.publisher
            .db
            .insert_token("tester", Duration::from_secs(3600))
            .await
            .unwrap()
    }

    /// A request for the sample file with a valid token
    pub(crate) async fn request(&self) -> PublishRequest {
        PublishRequest {
            token: Some(self.token().await),
            path: Some(self.sample.display().to_string()),
            ..Default::default()
        }
    }

    /// Write a file into the repository and return its canonical path
    pub(crate) fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.repo.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Poll the download counter until it reaches `expected` or 5s elapse
    pub(crate) async fn wait_for_downloads(&self, id: RecordId, expected: i64) -> i64 {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let count = self
                .publisher
                .db
                .get_record(id)
                .await
                .unwrap()
                .unwrap()
                .download_count;
            if count >= expected || tokio::time::Instant::now() > deadline {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Status of a record
    pub(crate) async fn status(&self, id: RecordId) -> Status {
        self.publisher
            .db
            .get_record(id)
            .await
            .unwrap()
            .unwrap()
            .status()
    }
}

/// Helper to create a test Publisher with a persistent database and one repository
pub(crate) async fn create_test_env() -> TestEnv {
    create_test_env_with(|_| {}).await
}

/// Like [`create_test_env`], with a hook to adjust the configuration
pub(crate) async fn create_test_env_with(adjust: impl FnOnce(&mut Config)) -> TestEnv {
    let temp_dir = tempdir().unwrap();
    let root = std::fs::canonicalize(temp_dir.path()).unwrap();
    let repo = root.join("repos").join("myrepo");
    std::fs::create_dir_all(&repo).unwrap();

    let sample = repo.join("my_file_to_publish.txt");
    std::fs::write(&sample, SAMPLE_CONTENT).unwrap();

    let mut config = Config::default();
    config.persistence.database_path = root.join("test.db");
    config.storage.repositories = vec![repo.clone()];
    config.worker.poll_interval = Duration::from_millis(20);
    config.worker.shutdown_timeout = Duration::from_secs(5);
    adjust(&mut config);

    let publisher = Publisher::new(config).await.unwrap();

    TestEnv {
        publisher,
        repo,
        sample,
        _temp_dir: temp_dir,
    }
}

/// Environment whose workers always copy
pub(crate) async fn create_copy_env() -> TestEnv {
    create_test_env_with(|config| config.storage.strategy = StrategyMode::Copy).await
}

/// Poll until the record leaves `pending` or the timeout elapses
pub(crate) async fn wait_for_terminal(publisher: &Publisher, id: RecordId) -> Status {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = publisher.db.get_record(id).await.unwrap().unwrap().status();
        if status.is_terminal() || tokio::time::Instant::now() > deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// MD5 of a file on disk
pub(crate) fn md5_of(path: &Path) -> String {
    crate::utils::hash_file(path).unwrap().1
}
