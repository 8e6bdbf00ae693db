//! Subnet persistence.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::resolve::resolve_parent_reference;
use super::{reserve_unique_id, store_now, timestamp_column, to_micros, StoreError};
use crate::id::RecordId;
use crate::ip::cidr;
use crate::types::{normalize_name, NewSubnet, RecordKind, Subnet, SubnetChanges};
use crate::utils::validation::validate_subnet_nesting;

pub(super) const COLUMNS: &str = "id, name, cidr, parent_id, comment, created_at";

pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Subnet> {
    Ok(Subnet {
        id: row.get(0)?,
        name: row.get(1)?,
        cidr: row.get(2)?,
        parent_id: row.get(3)?,
        comment: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

pub(super) fn insert(conn: &Connection, rng: &mut StdRng, new: NewSubnet) -> Result<Subnet, StoreError> {
    let net = cidr::parse_cidr(&new.cidr)?;
    let parent_id = resolve_parent_reference(conn, &new.parent)?;
    if let Some(parent_id) = &parent_id {
        warn_if_not_nested(conn, &net, parent_id)?;
    }

    let id = reserve_unique_id(conn, rng, RecordKind::Subnet)?;
    let subnet = Subnet {
        id,
        name: normalize_name(new.name),
        cidr: net.to_string(),
        parent_id,
        comment: new.comment,
        created_at: store_now(),
    };

    conn.execute(
        r#"
        INSERT INTO subnets (id, name, cidr, parent_id, comment, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            subnet.id,
            subnet.name,
            subnet.cidr,
            subnet.parent_id,
            subnet.comment,
            to_micros(&subnet.created_at),
        ],
    )
    .map_err(|e| StoreError::query("failed to insert subnet", e))?;

    Ok(subnet)
}

pub(super) fn find(conn: &Connection, id: &RecordId) -> Result<Option<Subnet>, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM subnets WHERE id = ?1", COLUMNS),
        params![id],
        from_row,
    )
    .optional()
    .map_err(|e| StoreError::query("failed to get subnet by id", e))
}

pub(super) fn get(conn: &Connection, id: &RecordId) -> Result<Subnet, StoreError> {
    find(conn, id)?.ok_or_else(|| StoreError::NotFound {
        kind: RecordKind::Subnet,
        id: id.clone(),
    })
}

pub(super) fn list(conn: &Connection) -> Result<Vec<Subnet>, StoreError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM subnets ORDER BY created_at, id", COLUMNS))
        .map_err(|e| StoreError::query("failed to prepare subnet listing", e))?;
    let subnets = stmt
        .query_map([], from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::query("failed to list subnets", e))?;
    Ok(subnets)
}

pub(super) fn names(conn: &Connection) -> Result<HashMap<RecordId, String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM subnets WHERE name IS NOT NULL AND name != ''")
        .map_err(|e| StoreError::query("failed to prepare subnet name lookup", e))?;
    let names = stmt
        .query_map([], |row| Ok((row.get::<_, RecordId>(0)?, row.get::<_, String>(1)?)))
        .and_then(|rows| rows.collect::<Result<HashMap<_, _>, _>>())
        .map_err(|e| StoreError::query("failed to load subnet names", e))?;
    Ok(names)
}

pub(super) fn update(conn: &Connection, id: &RecordId, changes: SubnetChanges) -> Result<Subnet, StoreError> {
    let mut subnet = get(conn, id)?;
    let placement_changed = changes.cidr.is_some() || changes.parent.is_some();

    if let Some(new_cidr) = changes.cidr {
        subnet.cidr = cidr::canonical_cidr(&new_cidr)?;
    }
    if let Some(name) = changes.name {
        subnet.name = normalize_name(Some(name));
    }
    if let Some(parent) = changes.parent {
        let parent_id = resolve_parent_reference(conn, &parent)?;
        if let Some(parent_id) = &parent_id {
            ensure_not_cyclic(conn, id, parent_id)?;
        }
        subnet.parent_id = parent_id;
    }
    if let Some(comment) = changes.comment {
        subnet.comment = comment;
    }

    if placement_changed {
        if let Some(parent_id) = &subnet.parent_id {
            let net = cidr::parse_cidr(&subnet.cidr)?;
            warn_if_not_nested(conn, &net, parent_id)?;
        }
    }

    conn.execute(
        "UPDATE subnets SET name = ?2, cidr = ?3, parent_id = ?4, comment = ?5 WHERE id = ?1",
        params![subnet.id, subnet.name, subnet.cidr, subnet.parent_id, subnet.comment],
    )
    .map_err(|e| StoreError::query("failed to update subnet", e))?;

    Ok(subnet)
}

pub(super) fn delete(conn: &Connection, id: &RecordId) -> Result<Subnet, StoreError> {
    let subnet = get(conn, id)?;

    let child_subnets = count(conn, "SELECT COUNT(*) FROM subnets WHERE parent_id = ?1", id)?;
    let hosts = count(conn, "SELECT COUNT(*) FROM hosts WHERE parent_id = ?1", id)?;
    if child_subnets > 0 || hosts > 0 {
        return Err(StoreError::SubnetInUse {
            id: id.clone(),
            child_subnets,
            hosts,
        });
    }

    let discoveries = conn
        .execute("DELETE FROM discoveries WHERE subnet_id = ?1", params![id])
        .map_err(|e| StoreError::query("failed to delete subnet discoveries", e))?;
    if discoveries > 0 {
        log::debug!("Removed {} discoveries of subnet {}", discoveries, id);
    }

    conn.execute("DELETE FROM subnets WHERE id = ?1", params![id])
        .map_err(|e| StoreError::query("failed to delete subnet", e))?;

    Ok(subnet)
}

/// Refuse a parent that is `id` itself or sits below it in the forest
fn ensure_not_cyclic(conn: &Connection, id: &RecordId, new_parent: &RecordId) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent.clone());

    while let Some(current) = cursor {
        if &current == id {
            return Err(StoreError::CyclicParent {
                id: id.clone(),
                parent: new_parent.clone(),
            });
        }
        if !seen.insert(current.clone()) {
            break;
        }
        cursor = conn
            .query_row(
                "SELECT parent_id FROM subnets WHERE id = ?1",
                params![current],
                |row| row.get::<_, Option<RecordId>>(0),
            )
            .optional()
            .map_err(|e| StoreError::query("failed to walk subnet ancestry", e))?
            .flatten();
    }
    Ok(())
}

fn warn_if_not_nested(conn: &Connection, net: &ipnet::IpNet, parent_id: &RecordId) -> Result<(), StoreError> {
    let parent = get(conn, parent_id)?;
    if let Err(message) = validate_subnet_nesting(net, &parent) {
        log::warn!("{}", message);
    }
    Ok(())
}

fn count(conn: &Connection, sql: &str, id: &RecordId) -> Result<usize, StoreError> {
    conn.query_row(sql, params![id], |row| row.get::<_, i64>(0))
        .map(|n| n as usize)
        .map_err(|e| StoreError::query("failed to count subnet references", e))
}
