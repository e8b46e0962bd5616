//! Repository fixtures for integration tests

use file_publish::{Config, Publisher, StrategyMode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A repository root with one publishable file, plus the config pointing at it
pub struct Fixture {
    /// Keeps the temp directory alive for the duration of the test
    pub temp_dir: TempDir,
    /// Canonical repository root
    pub repo: PathBuf,
    /// Configuration using `repo` and a database inside the temp directory
    pub config: Config,
}

impl Fixture {
    /// Create a repository with the given strategy mode
    pub fn new(strategy: StrategyMode) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let root = std::fs::canonicalize(temp_dir.path()).expect("canonicalize temp dir");
        let repo = root.join("repo");
        std::fs::create_dir_all(&repo).expect("create repo");

        let mut config = Config::default();
        config.persistence.database_path = root.join("publish.db");
        config.storage.repositories = vec![repo.clone()];
        config.storage.strategy = strategy;
        config.worker.poll_interval = Duration::from_millis(20);
        config.worker.shutdown_timeout = Duration::from_secs(5);

        Self {
            temp_dir,
            repo,
            config,
        }
    }

    /// Write a file into the repository
    pub fn write(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.repo.join(name);
        std::fs::write(&path, content).expect("write fixture file");
        path
    }

    /// Versioned location of `stored_name` in the public folder
    pub fn public(&self, stored_name: &str) -> PathBuf {
        self.repo.join("public").join(stored_name)
    }

    /// Open a publisher on this fixture's database
    pub async fn publisher(&self) -> Publisher {
        Publisher::new(self.config.clone())
            .await
            .expect("create publisher")
    }
}

/// Issue a token valid for an hour
pub async fn issue_token(publisher: &Publisher) -> String {
    publisher
        .db
        .insert_token("integration", Duration::from_secs(3600))
        .await
        .expect("insert token")
}

/// MD5 of a file on disk
pub fn md5_hex(path: &Path) -> String {
    format!("{:x}", md5::compute(std::fs::read(path).expect("read file")))
}
