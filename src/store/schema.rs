//! Database schema for the record store.
//!
//! Three record tables (`subnets`, `hosts`, `discoveries`) plus
//! `record_ids`, the allocation registry for the shared identifier
//! namespace. Every record row references its `record_ids` entry, and the
//! registry's primary key is what finally rejects a duplicate identifier when
//! two invocations race. Registry rows outlive deleted records so an
//! identifier is never handed out twice.
//!
//! Timestamps are stored as microseconds since the Unix epoch (UTC).

use rusqlite::Connection;

use super::StoreError;

/// Value written to `PRAGMA user_version` once the schema exists
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS record_ids (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('subnet', 'host', 'discovery')),
    reserved_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS subnets (
    id TEXT PRIMARY KEY NOT NULL REFERENCES record_ids(id),
    name TEXT,
    cidr TEXT NOT NULL,
    parent_id TEXT REFERENCES subnets(id),
    comment TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subnets_name ON subnets(name);
CREATE INDEX IF NOT EXISTS idx_subnets_cidr ON subnets(cidr);
CREATE INDEX IF NOT EXISTS idx_subnets_parent ON subnets(parent_id);

CREATE TABLE IF NOT EXISTS hosts (
    id TEXT PRIMARY KEY NOT NULL REFERENCES record_ids(id),
    name TEXT,
    address TEXT NOT NULL,
    parent_id TEXT REFERENCES subnets(id),
    comment TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    last_seen INTEGER
);

CREATE INDEX IF NOT EXISTS idx_hosts_address ON hosts(address);
CREATE INDEX IF NOT EXISTS idx_hosts_parent ON hosts(parent_id);

CREATE TABLE IF NOT EXISTS discoveries (
    id TEXT PRIMARY KEY NOT NULL REFERENCES record_ids(id),
    address TEXT NOT NULL,
    subnet_id TEXT NOT NULL REFERENCES subnets(id),
    discovered_at INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('alive', 'unreachable')),
    UNIQUE (subnet_id, address)
);
"#;

/// Create all tables and indexes. Safe to run against an existing database.
pub fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)
        .map_err(|e| StoreError::query("failed to create schema", e))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| StoreError::query("failed to record schema version", e))?;

    log::debug!("Schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}

/// Whether [`initialize_schema`] has run against this database
pub fn is_initialized(conn: &Connection) -> Result<bool, StoreError> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StoreError::query("failed to read schema version", e))?;
    Ok(version >= SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_is_not_initialized() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!is_initialized(&conn).unwrap());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert!(is_initialized(&conn).unwrap());

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["discoveries", "hosts", "record_ids", "subnets"]);
    }
}
