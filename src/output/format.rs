//! Human-readable renderings of store records.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::table::Table;
use crate::id::RecordId;
use crate::ip::probe::{ProbeOutcome, ProbeResult};
use crate::ip::sweep::SweepSummary;
use crate::types::{Discovery, Host, SearchResults, Subnet};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Prefer a subnet's name over its ID when it has one
fn subnet_label(id: &RecordId, subnet_names: &HashMap<RecordId, String>) -> String {
    subnet_names
        .get(id)
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| id.to_string())
}

pub fn format_subnets(subnets: &[Subnet]) -> String {
    let mut table = Table::new(["ID", "CIDR", "Name", "Parent", "Comment", "Created"]);
    for subnet in subnets {
        table.add_row([
            subnet.id.to_string(),
            subnet.cidr.clone(),
            subnet.name.clone().unwrap_or_default(),
            subnet.parent_id.as_ref().map(ToString::to_string).unwrap_or_default(),
            subnet.comment.clone(),
            timestamp(&subnet.created_at),
        ]);
    }
    table.to_string()
}

pub fn format_hosts(hosts: &[Host], subnet_names: &HashMap<RecordId, String>) -> String {
    let mut table = Table::new(["ID", "Address", "Name", "Parent", "Comment", "Created", "Last Seen"]);
    for host in hosts {
        table.add_row([
            host.id.to_string(),
            host.address.clone(),
            host.name.clone().unwrap_or_default(),
            host.parent_id
                .as_ref()
                .map(|id| subnet_label(id, subnet_names))
                .unwrap_or_default(),
            host.comment.clone(),
            timestamp(&host.created_at),
            host.last_seen.as_ref().map(timestamp).unwrap_or_default(),
        ]);
    }
    table.to_string()
}

pub fn format_discoveries(discoveries: &[Discovery], subnet_names: &HashMap<RecordId, String>) -> String {
    let mut table = Table::new(["ID", "Address", "Subnet", "Status", "Discovered", "Last Seen"]);
    for discovery in discoveries {
        table.add_row([
            discovery.id.to_string(),
            discovery.address.clone(),
            subnet_label(&discovery.subnet_id, subnet_names),
            discovery.status.to_string(),
            timestamp(&discovery.discovered_at),
            timestamp(&discovery.last_seen),
        ]);
    }
    table.to_string()
}

/// Grouped listing of search matches, or a "no results" line
pub fn format_search_results(results: &SearchResults) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::from("Search Results:\n\n");

    if !results.subnets.is_empty() {
        out.push_str("Subnets:\n");
        for subnet in &results.subnets {
            let _ = writeln!(
                out,
                "  {} ({}) - {}",
                subnet.cidr,
                subnet.id,
                subnet.name.as_deref().unwrap_or("")
            );
            if !subnet.comment.is_empty() {
                let _ = writeln!(out, "    Comment: {}", subnet.comment);
            }
        }
        out.push('\n');
    }

    if !results.hosts.is_empty() {
        out.push_str("Hosts:\n");
        for host in &results.hosts {
            let _ = writeln!(
                out,
                "  {} ({}) - {}",
                host.address,
                host.id,
                host.name.as_deref().unwrap_or("")
            );
            if !host.comment.is_empty() {
                let _ = writeln!(out, "    Comment: {}", host.comment);
            }
        }
        out.push('\n');
    }

    if !results.discoveries.is_empty() {
        out.push_str("Discoveries:\n");
        for discovery in &results.discoveries {
            let _ = writeln!(
                out,
                "  {} ({}) - Status: {}",
                discovery.address, discovery.id, discovery.status
            );
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Total: {} matches", results.total());
    out
}

/// Table of addresses that answered (or could not be probed), followed by
/// outcome counts for the whole sweep
pub fn format_sweep(subnet: &Subnet, results: &[ProbeResult]) -> String {
    let mut table = Table::new(["Address", "Status", "Time"]);
    // One row per distinct failure reason, anchored at its first address.
    let mut failures: Vec<(&ProbeResult, &str, usize)> = Vec::new();
    for result in results {
        match &result.outcome {
            ProbeOutcome::Alive => table.add_row([
                result.address.to_string(),
                result.outcome.label().to_string(),
                format!("{} ms", result.elapsed.as_millis()),
            ]),
            ProbeOutcome::Failed(reason) => {
                match failures.iter_mut().find(|(_, seen, _)| *seen == reason.as_str()) {
                    Some((_, _, count)) => *count += 1,
                    None => failures.push((result, reason.as_str(), 1)),
                }
            }
            ProbeOutcome::Unreachable | ProbeOutcome::Cancelled => {}
        }
    }
    for (first, reason, count) in failures {
        let detail = if count > 1 {
            format!("{} (+{} more)", reason, count - 1)
        } else {
            reason.to_string()
        };
        table.add_row([first.address.to_string(), first.outcome.label().to_string(), detail]);
    }

    let summary = SweepSummary::from_results(results);
    let mut out = table.to_string();
    let _ = write!(
        out,
        "\nSwept {} addresses in {}: {} alive, {} unreachable",
        summary.total(),
        subnet.cidr,
        summary.alive,
        summary.unreachable
    );
    if summary.cancelled > 0 {
        let _ = write!(out, ", {} cancelled", summary.cancelled);
    }
    if summary.failed > 0 {
        let _ = write!(out, ", {} failed", summary.failed);
    }
    out.push('\n');
    out
}
