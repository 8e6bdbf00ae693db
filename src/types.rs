//! Record types persisted by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RecordId;

/// The three kinds of record sharing one identifier namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Subnet,
    Host,
    Discovery,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Subnet => "subnet",
            RecordKind::Host => "host",
            RecordKind::Discovery => "discovery",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered network block, optionally nested under a parent subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: RecordId,
    pub name: Option<String>,
    pub cidr: String,
    pub parent_id: Option<RecordId>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A registered individual address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: RecordId,
    pub name: Option<String>,
    pub address: String,
    pub parent_id: Option<RecordId>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Result of the most recent probe of a discovered address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStatus {
    Alive,
    Unreachable,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Alive => "alive",
            DiscoveryStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(DiscoveryStatus::Alive),
            "unreachable" => Ok(DiscoveryStatus::Unreachable),
            other => Err(format!("Unknown discovery status '{}'", other)),
        }
    }
}

/// An address found by a ping sweep, distinct from a manually registered host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub id: RecordId,
    pub address: String,
    pub subnet_id: RecordId,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: DiscoveryStatus,
}

/// Input for [`crate::store::Store::add_subnet`]
#[derive(Debug, Clone, Default)]
pub struct NewSubnet {
    pub cidr: String,
    pub name: Option<String>,
    /// Parent reference: subnet ID, name or CIDR. Empty means no parent.
    pub parent: String,
    pub comment: String,
}

/// Input for [`crate::store::Store::add_host`]
#[derive(Debug, Clone, Default)]
pub struct NewHost {
    pub address: String,
    pub name: Option<String>,
    /// Parent reference: subnet ID, name or CIDR. Empty means no parent.
    pub parent: String,
    pub comment: String,
}

/// Field updates for [`crate::store::Store::update_subnet`].
///
/// `None` leaves a field untouched. `name: Some("")` clears the name and
/// `parent: Some("")` detaches the subnet from its parent.
#[derive(Debug, Clone, Default)]
pub struct SubnetChanges {
    pub cidr: Option<String>,
    pub name: Option<String>,
    pub parent: Option<String>,
    pub comment: Option<String>,
}

/// Field updates for [`crate::store::Store::update_host`]; same rules as
/// [`SubnetChanges`].
#[derive(Debug, Clone, Default)]
pub struct HostChanges {
    pub address: Option<String>,
    pub name: Option<String>,
    pub parent: Option<String>,
    pub comment: Option<String>,
}

impl SubnetChanges {
    pub fn is_empty(&self) -> bool {
        self.cidr.is_none() && self.name.is_none() && self.parent.is_none() && self.comment.is_none()
    }
}

impl HostChanges {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.name.is_none() && self.parent.is_none() && self.comment.is_none()
    }
}

/// Matches from [`crate::store::Store::search`], grouped by record kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub subnets: Vec<Subnet>,
    pub hosts: Vec<Host>,
    pub discoveries: Vec<Discovery>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty() && self.hosts.is_empty() && self.discoveries.is_empty()
    }

    pub fn total(&self) -> usize {
        self.subnets.len() + self.hosts.len() + self.discoveries.len()
    }
}

/// Normalise an optional free-text name: blank input means "no name"
pub fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
