use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// Connection-quality statistics tracked by a lower-level transport
/// component. The book trusts these numbers as given.
pub trait ConnectionStats {
    fn attempt_count(&self) -> u64;
    fn last_attempt_unix(&self) -> i64;
    fn last_success_unix(&self) -> i64;
}

/// Point-in-time copy of a [`KnownEndpoint`]; also the on-disk record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KnownEndpointSnapshot {
    pub addr: Endpoint,
    pub attempts: u64,
    pub last_attempt: DateTime<Utc>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct EndpointStats {
    attempts: u64,
    last_attempt: DateTime<Utc>,
    last_success: Option<DateTime<Utc>>,
}

/// Attempt/success bookkeeping for one endpoint in the address book.
///
/// `attempts == 0` means the endpoint was never tried or its last attempt
/// succeeded; the dial scheduler prefers those.
#[derive(Debug)]
pub struct KnownEndpoint {
    endpoint: Endpoint,
    stats: Mutex<EndpointStats>,
}

impl KnownEndpoint {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stats: Mutex::new(EndpointStats {
                attempts: 0,
                last_attempt: Utc::now(),
                last_success: None,
            }),
        }
    }

    pub fn from_snapshot(snapshot: KnownEndpointSnapshot) -> Self {
        Self {
            endpoint: snapshot.addr,
            stats: Mutex::new(EndpointStats {
                attempts: snapshot.attempts,
                last_attempt: snapshot.last_attempt,
                last_success: snapshot.last_success,
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn key(&self) -> String {
        self.endpoint.key()
    }

    /// Record a successful connection; clears failure history.
    pub fn mark_success(&self) {
        let now = Utc::now();
        let mut stats = self.stats.lock();
        stats.last_attempt = now;
        stats.last_success = Some(now);
        stats.attempts = 0;
    }

    /// Record a connection attempt.
    pub fn mark_attempt(&self) {
        let mut stats = self.stats.lock();
        stats.last_attempt = Utc::now();
        stats.attempts = stats.attempts.saturating_add(1);
    }

    /// Overwrite the stats with figures from an external connection monitor.
    ///
    /// A `last_success_unix` of 0 means the monitor never saw a success.
    pub fn refresh_from_external_stats(
        &self,
        count: u64,
        last_attempt_unix: i64,
        last_success_unix: i64,
    ) {
        let mut stats = self.stats.lock();
        stats.attempts = count;
        stats.last_attempt = from_unix(last_attempt_unix);
        stats.last_success = (last_success_unix != 0).then(|| from_unix(last_success_unix));
    }

    pub fn refresh_from<S: ConnectionStats + ?Sized>(&self, monitor: &S) {
        self.refresh_from_external_stats(
            monitor.attempt_count(),
            monitor.last_attempt_unix(),
            monitor.last_success_unix(),
        );
    }

    pub fn attempt_count(&self) -> u64 {
        self.stats.lock().attempts
    }

    pub fn snapshot(&self) -> KnownEndpointSnapshot {
        let stats = self.stats.lock();
        KnownEndpointSnapshot {
            addr: self.endpoint,
            attempts: stats.attempts,
            last_attempt: stats.last_attempt,
            last_success: stats.last_success,
        }
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
