//! # p3ipam - Lightweight IP address management
//!
//! This library backs the `p3ipam` command-line tool, which keeps an
//! inventory of network blocks (subnets), individually registered addresses
//! (hosts) and addresses found by ping sweeps (discoveries) in a single
//! SQLite file.
//!
//! ## Key Features
//!
//! - **Short identifiers**: every record gets a code like `ABC123`, unique
//!   across all record kinds
//! - **Flexible parent references**: `--parent` accepts a subnet ID, name or
//!   CIDR, and refuses ambiguous matches
//! - **Search**: case-sensitive substring search over every record kind
//! - **Discovery**: parallel ping sweeps that record which addresses answer
//!
//! ## Architecture
//!
//! - `id`: record identifier type and generator
//! - `types`: record types and edit/insert inputs
//! - `store`: SQLite persistence, ID allocation, reference resolution, search
//! - `ip`: CIDR parsing, ping probes and sweeps
//! - `config` / `config_loader`: data directory and `p3ipam.yaml` settings
//! - `output`: tables and record formatters
//! - `commands`: command handlers used by the binary
//! - `utils`: duration parsing and placement checks
//!
//! ## Example Usage
//!
//! ```rust
//! use p3ipam::store::Store;
//! use p3ipam::types::{NewHost, NewSubnet};
//!
//! let mut store = Store::open_in_memory()?;
//! let lab = store.add_subnet(NewSubnet {
//!     cidr: "10.0.0.0/24".to_string(),
//!     name: Some("lab".to_string()),
//!     ..Default::default()
//! })?;
//!
//! // "lab" resolves to the subnet just added
//! let printer = store.add_host(NewHost {
//!     address: "10.0.0.5".to_string(),
//!     parent: "lab".to_string(),
//!     ..Default::default()
//! })?;
//! assert_eq!(printer.parent_id, Some(lab.id));
//! assert_eq!(store.search("10.0.0")?.total(), 2);
//! # Ok::<(), p3ipam::store::StoreError>(())
//! ```
//!
//! ## Error Handling
//!
//! Library modules return typed `thiserror` errors (`StoreError`,
//! `CidrError`, `ValidationError`); the command layer and the binary wrap
//! them with `color_eyre` for reporting.

pub mod commands;
pub mod config;
pub mod config_loader;
pub mod id;
pub mod ip;
pub mod output;
pub mod store;
pub mod types;
pub mod utils;
