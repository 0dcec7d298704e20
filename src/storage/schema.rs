use anyhow::{Context, Result};
use rusqlite::Connection;

/// `AUTOINCREMENT` keeps SQLite from handing out the id of a deleted row again.
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS mood_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            mood TEXT NOT NULL,
            description TEXT NOT NULL
        );
        "#,
    )
    .context("applying journal schema")?;
    Ok(())
}
