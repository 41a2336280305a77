use std::net::IpAddr;
use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{ServerKey, ServerRecord};
use super::{Admission, RecordStore, StoreError};

const SELECT_COLUMNS: &str =
    "SELECT address, port, hostname, description, password_required, num_players, last_updated
     FROM servers";

pub struct SqliteStore {
    conn: Connection,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl SqliteStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS servers (
                address           TEXT NOT NULL,
                port              INTEGER NOT NULL,
                hostname          TEXT NOT NULL,
                description       TEXT NOT NULL DEFAULT '',
                password_required INTEGER NOT NULL DEFAULT 0,
                num_players       INTEGER NOT NULL DEFAULT 0,
                last_updated      INTEGER NOT NULL,
                PRIMARY KEY (address, port)
            );

            CREATE INDEX IF NOT EXISTS idx_servers_last_updated ON servers(last_updated);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Helper to convert a database row to ServerRecord
    fn row_to_record(row: &rusqlite::Row) -> Result<ServerRecord, rusqlite::Error> {
        let address_str: String = row.get(0)?;
        let last_updated_ms: i64 = row.get(6)?;

        let address = address_str.parse::<IpAddr>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        let last_updated = DateTime::from_timestamp_millis(last_updated_ms)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, last_updated_ms))?;

        Ok(ServerRecord {
            address,
            port: row.get::<_, u16>(1)?,
            hostname: row.get(2)?,
            description: row.get(3)?,
            password_required: row.get(4)?,
            num_players: row.get::<_, u32>(5)?,
            last_updated,
        })
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&mut self, record: &ServerRecord) -> Result<Admission, StoreError> {
        let address = record.address.to_string();
        let tx = self.conn.transaction()?;

        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM servers WHERE address = ?1 AND port = ?2)",
            params![&address, record.port],
            |row| row.get(0),
        )?;

        // Hostname is only written on insert; lookups update it separately
        tx.execute(
            r#"
            INSERT INTO servers (
                address, port, hostname, description, password_required, num_players, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(address, port) DO UPDATE SET
                description = excluded.description,
                password_required = excluded.password_required,
                num_players = excluded.num_players,
                last_updated = MAX(last_updated, excluded.last_updated)
            "#,
            params![
                &address,
                record.port,
                &record.hostname,
                &record.description,
                record.password_required,
                record.num_players,
                record.last_updated.timestamp_millis(),
            ],
        )?;

        tx.commit()?;

        Ok(if existed { Admission::Refreshed } else { Admission::Created })
    }

    fn set_hostname(&mut self, address: IpAddr, hostname: &str) -> Result<usize, StoreError> {
        let count = self.conn.execute(
            "UPDATE servers SET hostname = ?1 WHERE address = ?2",
            params![hostname, address.to_string()],
        )?;
        Ok(count)
    }

    fn remove(&mut self, key: &ServerKey) -> Result<bool, StoreError> {
        let count = self.conn.execute(
            "DELETE FROM servers WHERE address = ?1 AND port = ?2",
            params![key.address.to_string(), key.port],
        )?;
        Ok(count > 0)
    }

    fn get(&self, key: &ServerKey) -> Result<Option<ServerRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("{} WHERE address = ?1 AND port = ?2", SELECT_COLUMNS),
                params![key.address.to_string(), key.port],
                Self::row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    fn scan_updated_after(&self, cutoff: DateTime<Utc>) -> Result<Vec<ServerRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{} WHERE last_updated > ?1", SELECT_COLUMNS))?;

        let records = stmt
            .query_map([cutoff.timestamp_millis()], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn purge_not_updated_since(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let count = self.conn.execute(
            "DELETE FROM servers WHERE last_updated <= ?1",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(count)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_sqlite_store_conformance() {
        conformance::run_all(|| Box::new(SqliteStore::open(":memory:").unwrap()) as Box<dyn RecordStore>);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("servers.db");
        let record = conformance::record(5, 7777, Utc::now());

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.upsert(&record).unwrap();
            store.set_hostname(record.address, "arena.example.org").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let stored = store.get(&record.key()).unwrap().unwrap();
        assert_eq!(stored.hostname, "arena.example.org");
        assert_eq!(stored.num_players, record.num_players);
        assert_eq!(
            stored.last_updated.timestamp_millis(),
            record.last_updated.timestamp_millis()
        );
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let mut store = SqliteStore::open(":memory:").unwrap();
        let mut record = conformance::record(5, 7777, Utc::now());
        record.description = "'); DROP TABLE servers; --".to_string();

        store.upsert(&record).unwrap();
        let stored = store.get(&record.key()).unwrap().unwrap();
        assert_eq!(stored.description, record.description);
        assert_eq!(store.len().unwrap(), 1);
    }
}
