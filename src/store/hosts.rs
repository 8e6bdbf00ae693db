//! Host persistence.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::resolve::resolve_parent_reference;
use super::{
    optional_timestamp_column, reserve_unique_id, store_now, subnets, timestamp_column, to_micros,
    StoreError,
};
use crate::id::RecordId;
use crate::ip::cidr;
use crate::types::{normalize_name, Host, HostChanges, NewHost, RecordKind};
use crate::utils::validation::validate_host_placement;

pub(super) const COLUMNS: &str = "id, name, address, parent_id, comment, created_at, last_seen";

pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        parent_id: row.get(3)?,
        comment: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        last_seen: optional_timestamp_column(row, 6)?,
    })
}

pub(super) fn insert(conn: &Connection, rng: &mut StdRng, new: NewHost) -> Result<Host, StoreError> {
    let address = cidr::parse_address(&new.address)?;
    let parent_id = resolve_parent_reference(conn, &new.parent)?;
    if let Some(parent_id) = &parent_id {
        warn_if_outside(conn, &address, parent_id)?;
    }

    let id = reserve_unique_id(conn, rng, RecordKind::Host)?;
    let host = Host {
        id,
        name: normalize_name(new.name),
        address: address.to_string(),
        parent_id,
        comment: new.comment,
        created_at: store_now(),
        last_seen: None,
    };

    conn.execute(
        r#"
        INSERT INTO hosts (id, name, address, parent_id, comment, created_at, last_seen)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
        "#,
        params![
            host.id,
            host.name,
            host.address,
            host.parent_id,
            host.comment,
            to_micros(&host.created_at),
        ],
    )
    .map_err(|e| StoreError::query("failed to insert host", e))?;

    Ok(host)
}

pub(super) fn get(conn: &Connection, id: &RecordId) -> Result<Host, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM hosts WHERE id = ?1", COLUMNS),
        params![id],
        from_row,
    )
    .optional()
    .map_err(|e| StoreError::query("failed to get host by id", e))?
    .ok_or_else(|| StoreError::NotFound {
        kind: RecordKind::Host,
        id: id.clone(),
    })
}

pub(super) fn list(conn: &Connection) -> Result<Vec<Host>, StoreError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM hosts ORDER BY created_at, id", COLUMNS))
        .map_err(|e| StoreError::query("failed to prepare host listing", e))?;
    let hosts = stmt
        .query_map([], from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::query("failed to list hosts", e))?;
    Ok(hosts)
}

pub(super) fn update(conn: &Connection, id: &RecordId, changes: HostChanges) -> Result<Host, StoreError> {
    let mut host = get(conn, id)?;
    let placement_changed = changes.address.is_some() || changes.parent.is_some();

    if let Some(address) = changes.address {
        host.address = cidr::parse_address(&address)?.to_string();
    }
    if let Some(name) = changes.name {
        host.name = normalize_name(Some(name));
    }
    if let Some(parent) = changes.parent {
        host.parent_id = resolve_parent_reference(conn, &parent)?;
    }
    if let Some(comment) = changes.comment {
        host.comment = comment;
    }

    if placement_changed {
        if let Some(parent_id) = &host.parent_id {
            let address = cidr::parse_address(&host.address)?;
            warn_if_outside(conn, &address, parent_id)?;
        }
    }

    conn.execute(
        "UPDATE hosts SET name = ?2, address = ?3, parent_id = ?4, comment = ?5 WHERE id = ?1",
        params![host.id, host.name, host.address, host.parent_id, host.comment],
    )
    .map_err(|e| StoreError::query("failed to update host", e))?;

    Ok(host)
}

pub(super) fn delete(conn: &Connection, id: &RecordId) -> Result<Host, StoreError> {
    let host = get(conn, id)?;
    conn.execute("DELETE FROM hosts WHERE id = ?1", params![id])
        .map_err(|e| StoreError::query("failed to delete host", e))?;
    Ok(host)
}

/// Set `last_seen` on every host registered with `address`
pub(super) fn touch_seen(conn: &Connection, address: &str, seen: DateTime<Utc>) -> Result<usize, StoreError> {
    let touched = conn
        .execute(
            "UPDATE hosts SET last_seen = ?2 WHERE address = ?1",
            params![address, to_micros(&seen)],
        )
        .map_err(|e| StoreError::query("failed to update host last_seen", e))?;
    if touched > 0 {
        log::debug!("Marked {} host(s) at {} as seen", touched, address);
    }
    Ok(touched)
}

fn warn_if_outside(conn: &Connection, address: &IpAddr, parent_id: &RecordId) -> Result<(), StoreError> {
    let parent = subnets::get(conn, parent_id)?;
    if let Err(message) = validate_host_placement(address, &parent) {
        log::warn!("{}", message);
    }
    Ok(())
}
