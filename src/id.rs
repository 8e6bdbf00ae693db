//! Record identifiers.
//!
//! Every subnet, host and discovery carries a short, human-friendly code of
//! three upper-case letters followed by three digits (e.g. `ABC123`). The
//! three record kinds share one namespace, so a code names exactly one record
//! anywhere in the database. Generation itself makes no uniqueness promise;
//! see [`crate::store::Store::allocate_unique_id`] for collision handling.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of leading letters in an identifier
pub const LETTER_COUNT: usize = 3;

/// Number of trailing digits in an identifier
pub const DIGIT_COUNT: usize = 3;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}[0-9]{3}$").expect("Invalid record id regex"));

/// Errors produced when parsing an identifier from user input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("Invalid record id '{0}': expected three letters followed by three digits (e.g. ABC123)")]
    Malformed(String),
}

/// A six character record identifier such as `KQZ042`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a random identifier: three letters drawn uniformly from A-Z,
    /// then three digits drawn uniformly from 0-9.
    ///
    /// # Examples
    /// ```
    /// use p3ipam::id::RecordId;
    ///
    /// let id = RecordId::generate(&mut rand::thread_rng());
    /// assert_eq!(id.as_str().len(), 6);
    /// ```
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut code = String::with_capacity(LETTER_COUNT + DIGIT_COUNT);
        for _ in 0..LETTER_COUNT {
            code.push(char::from(b'A' + rng.gen_range(0..26u8)));
        }
        for _ in 0..DIGIT_COUNT {
            code.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        RecordId(code)
    }

    /// Check whether a string is a well-formed identifier (case-sensitive)
    pub fn is_well_formed(candidate: &str) -> bool {
        ID_PATTERN.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    /// Parse user input. Lower-case letters are accepted and normalised.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if Self::is_well_formed(&normalized) {
            Ok(RecordId(normalized))
        } else {
            Err(IdError::Malformed(s.to_string()))
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl ToSql for RecordId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for RecordId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        if Self::is_well_formed(raw) {
            Ok(RecordId(raw.to_string()))
        } else {
            Err(FromSqlError::Other(Box::new(IdError::Malformed(raw.to_string()))))
        }
    }
}
