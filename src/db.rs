use crate::store::Collection;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "classroom.sqlite3";
pub const SCHEMA_VERSION: i64 = 1;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // One document table per collection; indexed fields are JSON expressions.
    for collection in Collection::ALL {
        let table = collection.name();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    id TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )"
            ),
            [],
        )?;
        for def in collection.indexes() {
            let unique = if def.unique { "UNIQUE " } else { "" };
            conn.execute(
                &format!(
                    "CREATE {unique}INDEX IF NOT EXISTS idx_{table}_{field} ON {table}(json_extract(body, '$.{field}'))",
                    field = def.field
                ),
                [],
            )?;
        }
    }

    let current = schema_version(conn)?;
    if current.is_none() {
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', ?)",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> anyhow::Result<Option<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()))
}
