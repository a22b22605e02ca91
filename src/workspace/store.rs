use std::path::Path;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Workspace;
use crate::db::{migrate, Db};
use crate::error::{GraphError, Result};

/// Saves workspaces as JSON documents in SQLite.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    db: Db,
}

impl WorkspaceStore {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(migrate::run_migrations).await?;
        log::debug!("Workspace store ready at {}", db.path().display());
        Ok(Self { db })
    }

    /// Insert or update `workspace`.
    pub async fn save(&self, workspace: &Workspace) -> Result<()> {
        let data_json = serde_json::to_string(workspace)
            .map_err(|e| GraphError::InvalidInput(format!("cannot serialize workspace: {}", e)))?;
        let id = workspace.id.clone();
        let name = workspace.name.clone();
        let updated_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO workspaces (id, name, data_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                         name = excluded.name,
                         data_json = excluded.data_json,
                         updated_at = excluded.updated_at",
                    params![id, name, data_json, updated_at],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<Workspace>> {
        let id = id.to_string();
        let data: Option<String> = self
            .db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data_json FROM workspaces WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        data.map(|json| decode(&json)).transpose()
    }

    /// All saved workspaces in the order they were first saved.
    pub async fn load_all(&self) -> Result<Vec<Workspace>> {
        let rows: Vec<String> = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT data_json FROM workspaces ORDER BY rowid")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        rows.iter().map(|json| decode(json)).collect()
    }

    /// Returns whether a row was deleted.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let n = conn.execute("DELETE FROM workspaces WHERE id = ?1", params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

fn decode(json: &str) -> Result<Workspace> {
    serde_json::from_str(json)
        .map_err(|e| GraphError::InvalidInput(format!("corrupt workspace record: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttributeValue, Attributes, Graph};
    use tempfile::TempDir;

    fn sample() -> Workspace {
        let mut g = Graph::new();
        let mut attrs = Attributes::new();
        attrs.insert("age".into(), AttributeValue::Int(40));
        g.add_node("n1", attrs);
        g.add_node("n2", Attributes::new());
        g.add_link("l1", "n1", "n2");
        let mut ws = Workspace::with_graph(g, Some("Saved".into()));
        ws.apply_expression("age >= 18").unwrap();
        ws
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = WorkspaceStore::open(dir.path().join("ws.db")).await.unwrap();
        let ws = sample();

        store.save(&ws).await.unwrap();
        let loaded = store.load(&ws.id).await.unwrap().unwrap();
        assert_eq!(loaded, ws);
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_order_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = WorkspaceStore::open(dir.path().join("ws.db")).await.unwrap();
        let mut first = sample();
        let second = Workspace::new(Some("Second".into()));
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        first.name = "Renamed".into();
        store.save(&first).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Renamed");
        assert_eq!(all[1].id, second.id);

        assert!(store.delete(&second.id).await.unwrap());
        assert!(!store.delete(&second.id).await.unwrap());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_existing_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ws.db");
        let ws = sample();
        WorkspaceStore::open(&path).await.unwrap().save(&ws).await.unwrap();

        let reopened = WorkspaceStore::open(&path).await.unwrap();
        assert_eq!(reopened.load_all().await.unwrap(), vec![ws]);
    }
}
