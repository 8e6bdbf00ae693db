//! Store error types

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::id::RecordId;
use crate::ip::cidr::CidrError;
use crate::types::RecordKind;

/// Boxed error for wrapping SQLite and I/O failures
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file is missing or has no schema yet
    #[error("database at {} is not initialized; run `p3ipam init` first", .path.display())]
    NotInitialized { path: PathBuf },

    /// Point lookup, edit or delete of an unknown ID
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: RecordId },

    /// Parent reference matched no subnet
    #[error("no subnet found matching reference: {reference}")]
    ParentNotFound { reference: String },

    /// Parent reference matched more than one subnet
    #[error(
        "multiple subnets match reference '{reference}' ({}). Please use a more specific reference (ID, unique name, or exact CIDR)",
        join_ids(.candidates)
    )]
    AmbiguousReference {
        reference: String,
        candidates: Vec<RecordId>,
    },

    /// Subnet still referenced by child subnets or hosts
    #[error("subnet {id} is still in use by {child_subnets} child subnet(s) and {hosts} host(s)")]
    SubnetInUse {
        id: RecordId,
        child_subnets: usize,
        hosts: usize,
    },

    /// Re-parenting would make a subnet its own ancestor
    #[error("subnet {parent} cannot become the parent of {id}: it is {id} itself or one of its descendants")]
    CyclicParent { id: RecordId, parent: RecordId },

    /// No free identifier found within the attempt budget
    #[error("could not allocate a unique record id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    /// CIDR or address validation failure
    #[error(transparent)]
    Invalid(#[from] CidrError),

    /// Opening or creating the database failed
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// Statement execution failure
    #[error("query failed: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },
}

impl StoreError {
    /// Create a connection error with source
    pub fn connection(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error with source
    pub fn query(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Resolution failures: the parent reference was unknown or ambiguous
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            StoreError::ParentNotFound { .. } | StoreError::AmbiguousReference { .. }
        )
    }
}

fn join_ids(ids: &[RecordId]) -> String {
    ids.iter()
        .map(RecordId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
