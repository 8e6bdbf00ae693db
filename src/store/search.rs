//! Substring search across record kinds.
//!
//! Matching is case-sensitive and uses SQLite's `instr`, which, unlike
//! `LIKE`, treats `%` and `_` in the query literally.

use rusqlite::{params, Connection, Row};

use super::{discoveries, hosts, subnets, StoreError};
use crate::types::SearchResults;

pub(super) fn search(conn: &Connection, query: &str) -> Result<SearchResults, StoreError> {
    let subnets = matching(
        conn,
        &format!(
            "SELECT {} FROM subnets
             WHERE instr(cidr, ?1) > 0 OR instr(COALESCE(name, ''), ?1) > 0 OR instr(comment, ?1) > 0
             ORDER BY created_at, id",
            subnets::COLUMNS
        ),
        query,
        subnets::from_row,
        "failed to search subnets",
    )?;

    let hosts = matching(
        conn,
        &format!(
            "SELECT {} FROM hosts
             WHERE instr(address, ?1) > 0 OR instr(COALESCE(name, ''), ?1) > 0 OR instr(comment, ?1) > 0
             ORDER BY created_at, id",
            hosts::COLUMNS
        ),
        query,
        hosts::from_row,
        "failed to search hosts",
    )?;

    let discoveries = matching(
        conn,
        &format!(
            "SELECT {} FROM discoveries
             WHERE instr(address, ?1) > 0 OR instr(status, ?1) > 0
             ORDER BY discovered_at, id",
            discoveries::COLUMNS
        ),
        query,
        discoveries::from_row,
        "failed to search discoveries",
    )?;

    log::debug!(
        "Search '{}': {} subnets, {} hosts, {} discoveries",
        query,
        subnets.len(),
        hosts.len(),
        discoveries.len()
    );

    Ok(SearchResults {
        subnets,
        hosts,
        discoveries,
    })
}

fn matching<T, F>(conn: &Connection, sql: &str, query: &str, map: F, context: &str) -> Result<Vec<T>, StoreError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StoreError::query(context.to_string(), e))?;
    let rows = stmt
        .query_map(params![query], map)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::query(context.to_string(), e))?;
    Ok(rows)
}
