//! Core type definitions shared by every store backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Cache key type
pub type CacheKey = String;

/// Cache value type - opaque bytes, interpreted by the writer/reader pair
pub type CacheValue = Vec<u8>;

/// Remaining lifetime of a live key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key never expires
    Persistent,

    /// The key expires after this duration
    Remaining(Duration),
}

impl Ttl {
    /// Remaining whole seconds, or -1 for a persistent key
    pub fn as_secs(&self) -> i64 {
        match self {
            Ttl::Persistent => -1,
            Ttl::Remaining(d) => d.as_secs() as i64,
        }
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Persistent => write!(f, "-1"),
            Ttl::Remaining(d) => write!(f, "{}", d.as_secs()),
        }
    }
}

/// Statistics for store activity monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Reads that found a live value
    pub hits: u64,

    /// Reads that found nothing (missing or expired)
    pub misses: u64,

    /// Number of live keys at the time the stats were taken
    pub keys: usize,

    /// Entries dropped on access because their TTL had passed
    pub evictions_lazy: u64,

    /// Entries dropped by the background sweep
    pub evictions_sweep: u64,

    /// Total commands executed
    pub commands: u64,
}

impl CacheStats {
    /// Calculate read hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate total TTL evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_lazy + self.evictions_sweep
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, ",
            self.hits,
            self.misses,
            self.hit_rate()
        )?;
        write!(
            f,
            "keys: {}, evictions: {}, commands: {} }}",
            self.keys,
            self.total_evictions(),
            self.commands
        )
    }
}

/// Diagnostic summary returned by `info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Backend name ("memory" or "redis")
    pub backend: String,

    /// Live key count
    pub keys: usize,

    /// Seconds since the store was opened
    pub uptime_secs: u64,

    /// Activity counters, when the backend tracks them
    pub stats: Option<CacheStats>,

    /// Backend-specific details (server version, memory usage, ...)
    pub details: BTreeMap<String, String>,
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "backend: {}", self.backend)?;
        writeln!(f, "keys: {}", self.keys)?;
        writeln!(f, "uptime_secs: {}", self.uptime_secs)?;
        if let Some(stats) = &self.stats {
            writeln!(f, "stats: {}", stats)?;
        }
        for (name, value) in &self.details {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}
