use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::slot::{now_utc_rfc3339, GeneratedSlot};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_history_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS slot_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_at TEXT NOT NULL,
    decision_path TEXT NOT NULL,
    selected_node_id TEXT NOT NULL,
    selected_node_name TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}'
);
"#,
    },
    Migration {
        version: 2,
        name: "history_lookup_indexes_v1",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_slot_history_generated_at
    ON slot_history(generated_at);
CREATE INDEX IF NOT EXISTS idx_slot_history_selected_node_name
    ON slot_history(selected_node_name);
"#,
    },
];

const SELECT_SLOT: &str = r#"
SELECT id, generated_at, decision_path, selected_node_id, selected_node_name, metadata_json
FROM slot_history
"#;

#[derive(Debug)]
pub enum HistoryError {
    Sql(rusqlite::Error),
    Metadata(serde_json::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Sql(err) => write!(f, "history database error: {}", err),
            HistoryError::Metadata(err) => write!(f, "slot metadata error: {}", err),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::Sql(err) => Some(err),
            HistoryError::Metadata(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(value: rusqlite::Error) -> Self {
        HistoryError::Sql(value)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(value: serde_json::Error) -> Self {
        HistoryError::Metadata(value)
    }
}

/// Append-only log of generated slots, kept in SQLite.
pub struct SlotHistory {
    conn: Connection,
}

impl SlotHistory {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = open_connection(path)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, HistoryError> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Stores `slot` and returns it with its assigned id.
    #[cfg(test)]
    pub fn add(&self, slot: &GeneratedSlot) -> Result<GeneratedSlot, HistoryError> {
        insert_slot(&self.conn, slot)
    }

    /// Stores every slot in one transaction, in order.
    pub fn add_all(&mut self, slots: &[GeneratedSlot]) -> Result<Vec<GeneratedSlot>, HistoryError> {
        let tx = self.conn.transaction()?;
        let stored = slots
            .iter()
            .map(|slot| insert_slot(&tx, slot))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        info!(count = stored.len(), "slots recorded");
        Ok(stored)
    }

    /// Every slot in generation order.
    pub fn all(&self) -> Result<Vec<GeneratedSlot>, HistoryError> {
        self.query(&format!("{SELECT_SLOT} ORDER BY id ASC"), params![])
    }

    /// The most recent `count` slots, oldest first.
    pub fn last(&self, count: usize) -> Result<Vec<GeneratedSlot>, HistoryError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let mut slots = self.query(
            &format!("{SELECT_SLOT} ORDER BY id DESC LIMIT ?1"),
            params![limit],
        )?;
        slots.reverse();
        Ok(slots)
    }

    pub fn latest(&self) -> Result<Option<GeneratedSlot>, HistoryError> {
        Ok(self.last(1)?.pop())
    }

    pub fn count(&self) -> Result<usize, HistoryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM slot_history", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn by_main_category(&self, category: &str) -> Result<Vec<GeneratedSlot>, HistoryError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|slot| slot.main_category() == category)
            .collect())
    }

    pub fn by_selected_node(&self, node_name: &str) -> Result<Vec<GeneratedSlot>, HistoryError> {
        self.query(
            &format!("{SELECT_SLOT} WHERE selected_node_name = ?1 ORDER BY id ASC"),
            params![node_name],
        )
    }

    /// Slots generated within `[from, to]`. Rows with unreadable timestamps
    /// are skipped.
    pub fn by_date_range(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<GeneratedSlot>, HistoryError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|slot| {
                slot.generated_at_datetime()
                    .is_some_and(|at| at >= from && at <= to)
            })
            .collect())
    }

    pub fn remove(&self, id: i64) -> Result<bool, HistoryError> {
        let removed = self
            .conn
            .execute("DELETE FROM slot_history WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!(id, "slot removed from history");
        }
        Ok(removed > 0)
    }

    /// Deletes every slot and restarts id assignment at 1.
    pub fn clear(&mut self) -> Result<usize, HistoryError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM slot_history", [])?;
        tx.execute(
            "DELETE FROM sqlite_sequence WHERE name = 'slot_history'",
            [],
        )?;
        tx.commit()?;
        info!(removed, "history cleared");
        Ok(removed)
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<GeneratedSlot>, HistoryError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(slot_from_row(row)?);
        }
        Ok(result)
    }
}

fn insert_slot(conn: &Connection, slot: &GeneratedSlot) -> Result<GeneratedSlot, HistoryError> {
    let metadata_json = serde_json::to_string(&slot.metadata)?;
    conn.execute(
        r#"
INSERT INTO slot_history (
    generated_at, decision_path, selected_node_id, selected_node_name, metadata_json
)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
        params![
            slot.generated_at,
            slot.decision_path,
            slot.selected_node_id,
            slot.selected_node_name,
            metadata_json
        ],
    )?;
    let mut stored = slot.clone();
    stored.id = Some(conn.last_insert_rowid());
    debug!(id = stored.id, path = %stored.decision_path, "slot recorded");
    Ok(stored)
}

fn slot_from_row(row: &Row<'_>) -> Result<GeneratedSlot, HistoryError> {
    let metadata_json: String = row.get(5)?;
    let metadata: BTreeMap<String, Value> = serde_json::from_str(&metadata_json)?;
    Ok(GeneratedSlot {
        id: Some(row.get(0)?),
        generated_at: row.get(1)?,
        decision_path: row.get(2)?,
        selected_node_id: row.get(3)?,
        selected_node_name: row.get(4)?,
        metadata,
    })
}

pub fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}
