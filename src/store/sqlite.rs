use super::{check_unique, record_id, Collection, Record, Store, StoreError};
use crate::db;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// Workspace-backed store: one SQLite table of JSON documents per collection.
pub struct SqliteStore {
    conn: Connection,
    in_tx: bool,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Ok(Self { conn, in_tx: false })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn, in_tx: false })
    }

    fn query_bodies(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Record>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let bodies = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }
}

impl Store for SqliteStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?", collection.name()),
                [id],
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        self.query_bodies(
            &format!("SELECT body FROM {} ORDER BY rowid", collection.name()),
            [],
        )
    }

    fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let def = collection.index(index)?;
        self.query_bodies(
            &format!(
                "SELECT body FROM {} WHERE json_extract(body, '$.{}') = ? ORDER BY rowid",
                collection.name(),
                def.field
            ),
            [value],
        )
    }

    fn put(&mut self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let id = record_id(collection, &record)?;
        check_unique(&*self, collection, &id, &record)?;
        let body = serde_json::to_string(&record)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {}(id, body, updated_at) VALUES(?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                collection.name()
            ),
            (&id, &body, Utc::now().to_rfc3339()),
        )?;
        Ok(record)
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", collection.name()),
            [id],
        )?;
        Ok(())
    }

    fn begin(&mut self, _scope: &[Collection]) -> Result<(), StoreError> {
        if self.in_tx {
            return Err(StoreError::NestedTransaction);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_tx = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Err(StoreError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_tx = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Err(StoreError::NoTransaction);
        }
        self.in_tx = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
