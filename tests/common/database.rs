//! Throwaway SQLite databases for tests

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use swig_tracker::database::{DatabaseManager, PortfolioStore};

/// A database in its own temporary directory, removed on drop
pub struct TestDatabase {
    pub manager: Arc<DatabaseManager>,
    _dir: TempDir,
}

impl TestDatabase {
    pub fn store(&self) -> Arc<dyn PortfolioStore> {
        self.manager.clone()
    }
}

/// Create a completely fresh database file
pub async fn init_fresh_test_database() -> Result<TestDatabase> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wig_test.db");
    let manager = DatabaseManager::new(&path.to_string_lossy()).await?;

    Ok(TestDatabase {
        manager: Arc::new(manager),
        _dir: dir,
    })
}
