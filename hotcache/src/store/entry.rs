//! Keyspace entries with TTL support

use crate::error::{CacheError, Result};
use crate::types::CacheValue;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// The shape held by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    String,
    Hash,
    List,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::String => write!(f, "string"),
            EntryKind::Hash => write!(f, "hash"),
            EntryKind::List => write!(f, "list"),
        }
    }
}

/// Entry payload
#[derive(Debug, Clone, PartialEq)]
pub enum EntryData {
    String(CacheValue),
    Hash(HashMap<String, CacheValue>),
    List(VecDeque<CacheValue>),
}

impl EntryData {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryData::String(_) => EntryKind::String,
            EntryData::Hash(_) => EntryKind::Hash,
            EntryData::List(_) => EntryKind::List,
        }
    }

    /// Aggregates that lost their last element are removed from the keyspace
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            EntryData::String(_) => false,
            EntryData::Hash(fields) => fields.is_empty(),
            EntryData::List(items) => items.is_empty(),
        }
    }
}

/// A keyspace entry with an optional expiration time
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value
    pub data: EntryData,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// When the entry expires; `None` means never
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Create a new entry, expiring after `ttl` when one is given
    pub fn new(data: EntryData, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        Self {
            data,
            created_at: now,
            expires_at: ttl.and_then(|ttl| deadline(now, ttl)),
        }
    }

    /// Check whether the entry has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Get time until expiration; `None` for persistent or already expired entries
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        (expires_at - Utc::now()).to_std().ok()
    }

    /// Reset the expiration to `ttl` from now
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.expires_at = deadline(Utc::now(), ttl);
    }

    pub fn kind(&self) -> EntryKind {
        self.data.kind()
    }

    /// Borrow the string payload or fail with `TypeMismatch`
    pub fn as_string(&self, key: &str) -> Result<&CacheValue> {
        match &self.data {
            EntryData::String(value) => Ok(value),
            other => Err(CacheError::type_mismatch(key, EntryKind::String, other.kind())),
        }
    }

    pub fn as_string_mut(&mut self, key: &str) -> Result<&mut CacheValue> {
        match &mut self.data {
            EntryData::String(value) => Ok(value),
            other => Err(CacheError::type_mismatch(key, EntryKind::String, other.kind())),
        }
    }

    pub fn as_hash(&self, key: &str) -> Result<&HashMap<String, CacheValue>> {
        match &self.data {
            EntryData::Hash(fields) => Ok(fields),
            other => Err(CacheError::type_mismatch(key, EntryKind::Hash, other.kind())),
        }
    }

    pub fn as_hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, CacheValue>> {
        match &mut self.data {
            EntryData::Hash(fields) => Ok(fields),
            other => Err(CacheError::type_mismatch(key, EntryKind::Hash, other.kind())),
        }
    }

    pub fn as_list(&self, key: &str) -> Result<&VecDeque<CacheValue>> {
        match &self.data {
            EntryData::List(items) => Ok(items),
            other => Err(CacheError::type_mismatch(key, EntryKind::List, other.kind())),
        }
    }

    pub fn as_list_mut(&mut self, key: &str) -> Result<&mut VecDeque<CacheValue>> {
        match &mut self.data {
            EntryData::List(items) => Ok(items),
            other => Err(CacheError::type_mismatch(key, EntryKind::List, other.kind())),
        }
    }
}

/// A TTL too large to represent never expires
fn deadline(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// Parse a string payload as a signed 64-bit integer
pub(crate) fn parse_integer(key: &str, value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CacheError::type_mismatch(key, "integer", "non-numeric string"))
}
