// src/pipeline/lease.rs

//! Per-source run leases.
//!
//! A lease keeps two collections of the same source from overlapping.
//! It is released when the guard drops, or taken over by the next caller
//! once its TTL has passed (a crashed holder never blocks forever).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Holder {
    token: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Table {
    holders: HashMap<String, Holder>,
    next_token: u64,
}

/// Registry of active leases keyed by lower-cased source name.
#[derive(Debug, Clone)]
pub struct RunLocks {
    ttl: Duration,
    table: Arc<Mutex<Table>>,
}

impl RunLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            table: Arc::new(Mutex::new(Table::default())),
        }
    }

    /// Take the lease for `source`, or `None` while another live lease holds it.
    pub fn try_acquire(&self, source: &str) -> Option<RunLease> {
        let key = source.to_ascii_lowercase();
        let now = Instant::now();
        let mut table = self.table.lock().ok()?;

        if let Some(holder) = table.holders.get(&key) {
            if holder.expires_at > now {
                return None;
            }
            log::warn!("lease expired, taking over source={}", key);
        }

        table.next_token += 1;
        let token = table.next_token;
        table.holders.insert(
            key.clone(),
            Holder {
                token,
                expires_at: now + self.ttl,
            },
        );
        Some(RunLease {
            key,
            token,
            table: Arc::clone(&self.table),
        })
    }

    pub fn is_held(&self, source: &str) -> bool {
        let key = source.to_ascii_lowercase();
        self.table
            .lock()
            .map(|t| t.holders.get(&key).is_some_and(|h| h.expires_at > Instant::now()))
            .unwrap_or(false)
    }
}

/// Guard for one acquired lease.
#[derive(Debug)]
pub struct RunLease {
    key: String,
    token: u64,
    table: Arc<Mutex<Table>>,
}

impl RunLease {
    pub fn source(&self) -> &str {
        &self.key
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            // A holder that outlived its TTL must not release its successor's lease.
            if table.holders.get(&self.key).is_some_and(|h| h.token == self.token) {
                table.holders.remove(&self.key);
            }
        }
    }
}
