//! Parent reference resolution.
//!
//! Operators rarely remember six-character codes, so a `--parent` value may
//! name a subnet by ID (in any letter case), by name or by CIDR. Resolution collects the distinct
//! set of subnets matching under any of the three attributes:
//!
//! - no subnet: [`StoreError::ParentNotFound`]
//! - one subnet (even if it matched under several attributes): its ID
//! - several subnets: [`StoreError::AmbiguousReference`]
//!
//! Two subnets sharing a name are therefore ambiguous; the caller must fall
//! back to the ID or the CIDR.

use std::collections::BTreeSet;

use rusqlite::{params, Connection};

use super::StoreError;
use crate::id::RecordId;

pub(crate) fn resolve_parent_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<RecordId>, StoreError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Ok(None);
    }

    let matches = matching_subnet_ids(conn, reference)?;
    match matches.len() {
        0 => {
            log::debug!("Parent reference '{}' matched no subnet", reference);
            Err(StoreError::ParentNotFound {
                reference: reference.to_string(),
            })
        }
        1 => {
            let id = matches.into_iter().next();
            log::debug!("Parent reference '{}' resolved to {:?}", reference, id);
            Ok(id)
        }
        _ => Err(StoreError::AmbiguousReference {
            reference: reference.to_string(),
            candidates: matches.into_iter().collect(),
        }),
    }
}

fn matching_subnet_ids(conn: &Connection, reference: &str) -> Result<BTreeSet<RecordId>, StoreError> {
    let mut stmt = conn
        .prepare_cached("SELECT id FROM subnets WHERE id = ?2 OR name = ?1 OR cidr = ?1")
        .map_err(|e| StoreError::query("failed to prepare parent lookup", e))?;

    // IDs are accepted in any case, as on the command line; names stay exact.
    let ids = stmt
        .query_map(params![reference, reference.to_ascii_uppercase()], |row| {
            row.get::<_, RecordId>(0)
        })
        .and_then(|rows| rows.collect::<Result<BTreeSet<_>, _>>())
        .map_err(|e| StoreError::query("failed to resolve parent reference", e))?;
    Ok(ids)
}
