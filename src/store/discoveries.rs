//! Discovery persistence.
//!
//! A discovery is keyed by `(subnet_id, address)`. Sweeps create one the
//! first time an address answers and afterwards only flip its status, so
//! `discovered_at` keeps the first sighting while `last_seen` tracks the most
//! recent alive probe.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{hosts, reserve_unique_id, store_now, subnets, timestamp_column, to_micros, StoreError};
use crate::id::RecordId;
use crate::ip::probe::{ProbeOutcome, ProbeResult};
use crate::types::{Discovery, DiscoveryStatus, RecordKind};

pub(super) const COLUMNS: &str = "id, address, subnet_id, discovered_at, last_seen, status";

pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Discovery> {
    let status: String = row.get(5)?;
    let status = status.parse::<DiscoveryStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Discovery {
        id: row.get(0)?,
        address: row.get(1)?,
        subnet_id: row.get(2)?,
        discovered_at: timestamp_column(row, 3)?,
        last_seen: timestamp_column(row, 4)?,
        status,
    })
}

pub(super) fn list(conn: &Connection) -> Result<Vec<Discovery>, StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM discoveries ORDER BY discovered_at, id",
            COLUMNS
        ))
        .map_err(|e| StoreError::query("failed to prepare discovery listing", e))?;
    let discoveries = stmt
        .query_map([], from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::query("failed to list discoveries", e))?;
    Ok(discoveries)
}

fn find(conn: &Connection, subnet_id: &RecordId, address: &str) -> Result<Option<Discovery>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM discoveries WHERE subnet_id = ?1 AND address = ?2",
            COLUMNS
        ),
        params![subnet_id, address],
        from_row,
    )
    .optional()
    .map_err(|e| StoreError::query("failed to look up discovery", e))
}

/// Insert or refresh the discovery for `address`
pub(super) fn record(
    conn: &Connection,
    rng: &mut StdRng,
    subnet_id: &RecordId,
    address: IpAddr,
    status: DiscoveryStatus,
) -> Result<Discovery, StoreError> {
    // Fails with NotFound before anything is written.
    subnets::get(conn, subnet_id)?;
    upsert(conn, rng, subnet_id, &address.to_string(), status, store_now())
}

fn upsert(
    conn: &Connection,
    rng: &mut StdRng,
    subnet_id: &RecordId,
    address: &str,
    status: DiscoveryStatus,
    now: DateTime<Utc>,
) -> Result<Discovery, StoreError> {
    match find(conn, subnet_id, address)? {
        Some(mut existing) => {
            existing.status = status;
            if status == DiscoveryStatus::Alive {
                existing.last_seen = now;
            }
            conn.execute(
                "UPDATE discoveries SET status = ?2, last_seen = ?3 WHERE id = ?1",
                params![existing.id, status.as_str(), to_micros(&existing.last_seen)],
            )
            .map_err(|e| StoreError::query("failed to update discovery", e))?;
            Ok(existing)
        }
        None => {
            let discovery = Discovery {
                id: reserve_unique_id(conn, rng, RecordKind::Discovery)?,
                address: address.to_string(),
                subnet_id: subnet_id.clone(),
                discovered_at: now,
                last_seen: now,
                status,
            };
            conn.execute(
                r#"
                INSERT INTO discoveries (id, address, subnet_id, discovered_at, last_seen, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    discovery.id,
                    discovery.address,
                    discovery.subnet_id,
                    to_micros(&discovery.discovered_at),
                    to_micros(&discovery.last_seen),
                    discovery.status.as_str(),
                ],
            )
            .map_err(|e| StoreError::query("failed to insert discovery", e))?;
            log::debug!("New discovery {} at {}", discovery.id, discovery.address);
            Ok(discovery)
        }
    }
}

/// Apply one sweep's results.
///
/// Alive addresses are upserted and stamp `last_seen` on matching hosts.
/// Unreachable addresses only touch discoveries that already exist, so a
/// sweep of a mostly empty block does not fill the table with dead rows.
/// Cancelled and failed probes say nothing about the address and are skipped.
pub(super) fn record_sweep(
    conn: &Connection,
    rng: &mut StdRng,
    subnet_id: &RecordId,
    results: &[ProbeResult],
) -> Result<Vec<Discovery>, StoreError> {
    subnets::get(conn, subnet_id)?;
    let now = store_now();
    let mut recorded = Vec::new();

    for result in results {
        let address = result.address.to_string();
        match &result.outcome {
            ProbeOutcome::Alive => {
                recorded.push(upsert(conn, rng, subnet_id, &address, DiscoveryStatus::Alive, now)?);
                hosts::touch_seen(conn, &address, now)?;
            }
            ProbeOutcome::Unreachable => {
                if find(conn, subnet_id, &address)?.is_some() {
                    recorded.push(upsert(
                        conn,
                        rng,
                        subnet_id,
                        &address,
                        DiscoveryStatus::Unreachable,
                        now,
                    )?);
                }
            }
            ProbeOutcome::Cancelled | ProbeOutcome::Failed(_) => {}
        }
    }

    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::ip::probe::{ProbeOutcome, ProbeResult};
    use crate::store::Store;
    use crate::types::{DiscoveryStatus, NewHost, NewSubnet};

    fn store_with_subnet() -> (Store, crate::id::RecordId) {
        let mut store = Store::open_in_memory().unwrap();
        let subnet = store
            .add_subnet(NewSubnet {
                cidr: "10.9.0.0/29".to_string(),
                ..Default::default()
            })
            .unwrap();
        (store, subnet.id)
    }

    fn result(address: &str, outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            address: address.parse().unwrap(),
            outcome,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_record_discovery_upserts() {
        let (mut store, subnet_id) = store_with_subnet();
        let address = "10.9.0.2".parse().unwrap();

        let first = store
            .record_discovery(&subnet_id, address, DiscoveryStatus::Alive)
            .unwrap();
        assert_eq!(first.discovered_at, first.last_seen);

        let second = store
            .record_discovery(&subnet_id, address, DiscoveryStatus::Unreachable)
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, DiscoveryStatus::Unreachable);
        assert_eq!(second.last_seen, first.last_seen);
        assert_eq!(store.list_discoveries().unwrap(), vec![second]);
    }

    #[test]
    fn test_record_discovery_for_unknown_subnet_fails() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .record_discovery(
                &"ZZZ999".parse().unwrap(),
                "10.0.0.1".parse().unwrap(),
                DiscoveryStatus::Alive,
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_record_sweep() {
        let (mut store, subnet_id) = store_with_subnet();
        let host = store
            .add_host(NewHost {
                address: "10.9.0.1".to_string(),
                ..Default::default()
            })
            .unwrap();
        store
            .record_discovery(&subnet_id, "10.9.0.3".parse().unwrap(), DiscoveryStatus::Alive)
            .unwrap();

        let recorded = store
            .record_sweep(
                &subnet_id,
                &[
                    result("10.9.0.1", ProbeOutcome::Alive),
                    result("10.9.0.2", ProbeOutcome::Unreachable),
                    result("10.9.0.3", ProbeOutcome::Unreachable),
                    result("10.9.0.4", ProbeOutcome::Failed("boom".to_string())),
                    result("10.9.0.5", ProbeOutcome::Cancelled),
                ],
            )
            .unwrap();

        let summary: Vec<_> = recorded
            .iter()
            .map(|d| (d.address.as_str(), d.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("10.9.0.1", DiscoveryStatus::Alive),
                ("10.9.0.3", DiscoveryStatus::Unreachable),
            ]
        );
        assert_eq!(store.list_discoveries().unwrap().len(), 2);
        assert!(store.get_host(&host.id).unwrap().last_seen.is_some());
    }

    #[test]
    fn test_deleting_subnet_removes_its_discoveries() {
        let (mut store, subnet_id) = store_with_subnet();
        store
            .record_discovery(&subnet_id, "10.9.0.6".parse().unwrap(), DiscoveryStatus::Alive)
            .unwrap();
        store.delete_subnet(&subnet_id).unwrap();
        assert!(store.list_discoveries().unwrap().is_empty());
    }
}
