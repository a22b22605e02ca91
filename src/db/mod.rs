use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;
use crate::error::{GraphError, Result};

pub mod migrate;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
                       PRAGMA synchronous = NORMAL; \
                       PRAGMA busy_timeout = 5000;";

/// Database connection wrapper
///
/// Every call opens its own connection; SQLite serializes writers.
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        open(&self.path)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| GraphError::InvalidInput(format!("database task failed: {}", e)))?
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(GraphError::Database)?;
    conn.execute_batch(PRAGMAS)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db
            .with_connection(|conn| {
                conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                    .map_err(GraphError::Database)?;
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");
            Ok::<(), GraphError>(())
        })
        .await
        .unwrap();
    }
}
