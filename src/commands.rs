//! Command handlers behind the `p3ipam` binary.
//!
//! Each handler writes its human-readable output to `out` and returns an
//! error only for conditions that should end the invocation with a failure
//! status. Deleting or editing an ID that does not exist is reported on
//! `out` and is not an error.

use std::io::Write;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::{debug, info};
use serde::Serialize;

use crate::config::{Config, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use crate::id::RecordId;
use crate::ip::cidr;
use crate::ip::probe::{CancelToken, ProbeOutcome, Prober};
use crate::ip::sweep::{sweep, SweepSummary};
use crate::output;
use crate::store::{Store, StoreError};
use crate::types::{HostChanges, NewHost, NewSubnet, RecordKind, SubnetChanges};

/// Create the database under the configured data directory
pub fn init(config: &Config, out: &mut impl Write) -> Result<()> {
    let path = config.database_path();
    Store::create(&path).wrap_err("Error initializing database")?;

    writeln!(out, "✅ Database initialized successfully!")?;
    writeln!(out, "📁 Database file: {}", path.display())?;

    let from_env = std::env::var_os(DATA_DIR_ENV).is_some();
    if config.data_dir.as_path() != std::path::Path::new(DEFAULT_DATA_DIR) && !from_env {
        writeln!(out)?;
        writeln!(out, "💡 Note: To use this data directory in the future,")?;
        writeln!(
            out,
            "   set the environment variable: {}={}",
            DATA_DIR_ENV,
            config.data_dir.display()
        )?;
    }
    Ok(())
}

pub fn version(out: &mut impl Write) -> Result<()> {
    writeln!(out, "p3ipam v{}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// Open the configured database, which must already be initialized
pub fn open_store(config: &Config) -> Result<Store> {
    let store = Store::open(&config.database_path())?;
    Ok(store)
}

pub fn add_subnet(store: &mut Store, new: NewSubnet, out: &mut impl Write) -> Result<()> {
    let subnet = store.add_subnet(new).wrap_err("Error adding subnet")?;

    writeln!(out, "✅ Subnet added successfully!")?;
    writeln!(out, "   ID: {}", subnet.id)?;
    writeln!(out, "   CIDR: {}", subnet.cidr)?;
    if let Some(name) = &subnet.name {
        writeln!(out, "   Name: {}", name)?;
    }
    if let Some(parent) = &subnet.parent_id {
        writeln!(out, "   Parent: {}", parent)?;
    }
    if !subnet.comment.is_empty() {
        writeln!(out, "   Comment: {}", subnet.comment)?;
    }
    Ok(())
}

pub fn add_host(store: &mut Store, new: NewHost, out: &mut impl Write) -> Result<()> {
    let host = store.add_host(new).wrap_err("Error adding host")?;

    writeln!(out, "✅ Host added successfully!")?;
    writeln!(out, "   ID: {}", host.id)?;
    writeln!(out, "   Address: {}", host.address)?;
    if let Some(name) = &host.name {
        writeln!(out, "   Name: {}", name)?;
    }
    if let Some(parent) = &host.parent_id {
        writeln!(out, "   Parent: {}", parent)?;
    }
    if !host.comment.is_empty() {
        writeln!(out, "   Comment: {}", host.comment)?;
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T, out: &mut impl Write) -> Result<()> {
    let json = serde_json::to_string_pretty(value).wrap_err("Failed to serialize JSON output")?;
    writeln!(out, "{}", json)?;
    Ok(())
}

pub fn list_subnets(store: &Store, json: bool, out: &mut impl Write) -> Result<()> {
    let subnets = store.list_subnets().wrap_err("Error listing subnets")?;
    if json {
        return write_json(&subnets, out);
    }
    write!(out, "{}", output::format_subnets(&subnets))?;
    Ok(())
}

pub fn list_hosts(store: &Store, json: bool, out: &mut impl Write) -> Result<()> {
    let hosts = store.list_hosts().wrap_err("Error listing hosts")?;
    if json {
        return write_json(&hosts, out);
    }
    let names = store.subnet_names()?;
    write!(out, "{}", output::format_hosts(&hosts, &names))?;
    Ok(())
}

pub fn list_discoveries(store: &Store, json: bool, out: &mut impl Write) -> Result<()> {
    let discoveries = store.list_discoveries().wrap_err("Error listing discoveries")?;
    if json {
        return write_json(&discoveries, out);
    }
    let names = store.subnet_names()?;
    write!(out, "{}", output::format_discoveries(&discoveries, &names))?;
    Ok(())
}

/// Report a missing record on `out`; any other error is passed back
fn not_found_notice(
    err: StoreError,
    kind: RecordKind,
    id: &RecordId,
    action: &str,
    out: &mut impl Write,
) -> Result<()> {
    if !err.is_not_found() {
        return Err(err.into());
    }
    info!("{} {} not found, nothing {}", kind, id, action);
    writeln!(out, "⚠️  {} {} not found; nothing {}.", capitalize(kind), id, action)?;
    Ok(())
}

fn capitalize(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Subnet => "Subnet",
        RecordKind::Host => "Host",
        RecordKind::Discovery => "Discovery",
    }
}

pub fn delete_subnet(store: &mut Store, id: &RecordId, out: &mut impl Write) -> Result<()> {
    match store.delete_subnet(id) {
        Ok(subnet) => {
            writeln!(out, "✅ Subnet {} ({}) deleted.", subnet.id, subnet.cidr)?;
            Ok(())
        }
        Err(e) => not_found_notice(e, RecordKind::Subnet, id, "deleted", out)
            .wrap_err("Error deleting subnet"),
    }
}

pub fn delete_host(store: &mut Store, id: &RecordId, out: &mut impl Write) -> Result<()> {
    match store.delete_host(id) {
        Ok(host) => {
            writeln!(out, "✅ Host {} ({}) deleted.", host.id, host.address)?;
            Ok(())
        }
        Err(e) => not_found_notice(e, RecordKind::Host, id, "deleted", out)
            .wrap_err("Error deleting host"),
    }
}

pub fn edit_subnet(
    store: &mut Store,
    id: &RecordId,
    changes: SubnetChanges,
    out: &mut impl Write,
) -> Result<()> {
    if changes.is_empty() {
        return Err(eyre!("Nothing to change: pass at least one of --cidr, --name, --parent, --comment"));
    }
    match store.update_subnet(id, changes) {
        Ok(subnet) => {
            writeln!(out, "✅ Subnet {} updated.", subnet.id)?;
            write!(out, "{}", output::format_subnets(std::slice::from_ref(&subnet)))?;
            Ok(())
        }
        Err(e) => not_found_notice(e, RecordKind::Subnet, id, "changed", out)
            .wrap_err("Error editing subnet"),
    }
}

pub fn edit_host(
    store: &mut Store,
    id: &RecordId,
    changes: HostChanges,
    out: &mut impl Write,
) -> Result<()> {
    if changes.is_empty() {
        return Err(eyre!("Nothing to change: pass at least one of --address, --name, --parent, --comment"));
    }
    match store.update_host(id, changes) {
        Ok(host) => {
            writeln!(out, "✅ Host {} updated.", host.id)?;
            let names = store.subnet_names()?;
            write!(out, "{}", output::format_hosts(std::slice::from_ref(&host), &names))?;
            Ok(())
        }
        Err(e) => not_found_notice(e, RecordKind::Host, id, "changed", out)
            .wrap_err("Error editing host"),
    }
}

/// Sweep every usable address of the subnet `reference` names and record
/// what answered
pub fn ping_subnet<P: Prober>(
    store: &mut Store,
    config: &Config,
    reference: &str,
    prober: &P,
    out: &mut impl Write,
) -> Result<()> {
    let subnet_id = store
        .resolve_parent_reference(reference)?
        .ok_or_else(|| eyre!("A subnet reference (ID, name or CIDR) is required"))?;
    let subnet = store.get_subnet(&subnet_id)?;

    let net = cidr::parse_cidr(&subnet.cidr)
        .wrap_err_with(|| format!("Subnet {} has an unusable CIDR", subnet.id))?;
    let targets = cidr::usable_hosts(&net, config.ping.max_hosts)?;
    debug!("Subnet {} has {} usable addresses", subnet.id, targets.len());

    writeln!(
        out,
        "Pinging {} addresses in {} ({})...",
        targets.len(),
        subnet.cidr,
        subnet.id
    )?;

    let cancel = CancelToken::new();
    let results = sweep(&targets, prober, config.ping.workers, &cancel)
        .wrap_err("Failed to start ping workers")?;
    store
        .record_sweep(&subnet.id, &results)
        .wrap_err("Error recording discoveries")?;

    write!(out, "{}", output::format_sweep(&subnet, &results))?;

    let summary = SweepSummary::from_results(&results);
    if summary.failed > 0 {
        let reason = results
            .iter()
            .find_map(|result| match &result.outcome {
                ProbeOutcome::Failed(reason) => Some(reason.as_str()),
                _ => None,
            })
            .unwrap_or("unknown error");
        return Err(eyre!(
            "Ping sweep of {} failed for {} of {} addresses: {}",
            subnet.cidr,
            summary.failed,
            summary.total(),
            reason
        ));
    }
    Ok(())
}

pub fn search(store: &Store, query: &str, json: bool, out: &mut impl Write) -> Result<()> {
    let results = store.search(query).wrap_err("Error searching database")?;
    if json {
        return write_json(&results, out);
    }
    write!(out, "{}", output::format_search_results(&results))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewSubnet;

    fn output_of(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_version() {
        let text = output_of(|out| version(out));
        assert_eq!(text, format!("p3ipam v{}\n", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_delete_missing_id_is_a_notice() {
        let mut store = Store::open_in_memory().unwrap();
        let id: RecordId = "MIS404".parse().unwrap();
        let text = output_of(|out| delete_host(&mut store, &id, out));
        assert!(text.contains("Host MIS404 not found; nothing deleted."));
    }

    #[test]
    fn test_edit_missing_id_is_a_notice() {
        let mut store = Store::open_in_memory().unwrap();
        let id: RecordId = "MIS404".parse().unwrap();
        let changes = SubnetChanges {
            name: Some("x".to_string()),
            ..Default::default()
        };
        let text = output_of(|out| edit_subnet(&mut store, &id, changes, out));
        assert!(text.contains("Subnet MIS404 not found; nothing changed."));
    }

    #[test]
    fn test_edit_without_changes_is_an_error() {
        let mut store = Store::open_in_memory().unwrap();
        let id: RecordId = "ABC123".parse().unwrap();
        let mut buf = Vec::new();
        assert!(edit_host(&mut store, &id, HostChanges::default(), &mut buf).is_err());
    }

    #[test]
    fn test_delete_subnet_in_use_is_an_error() {
        let mut store = Store::open_in_memory().unwrap();
        let lab = store
            .add_subnet(NewSubnet {
                cidr: "10.0.0.0/24".to_string(),
                name: Some("lab".to_string()),
                ..Default::default()
            })
            .unwrap();
        store
            .add_host(NewHost {
                address: "10.0.0.1".to_string(),
                parent: "lab".to_string(),
                ..Default::default()
            })
            .unwrap();

        let mut buf = Vec::new();
        let err = delete_subnet(&mut store, &lab.id, &mut buf).unwrap_err();
        assert!(err.chain().any(|cause| cause.to_string().contains("still in use")));
    }

    #[test]
    fn test_list_json() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .add_subnet(NewSubnet {
                cidr: "10.0.0.0/24".to_string(),
                ..Default::default()
            })
            .unwrap();
        let text = output_of(|out| list_subnets(&store, true, out));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["cidr"], "10.0.0.0/24");
        assert!(parsed[0]["name"].is_null());
    }
}
