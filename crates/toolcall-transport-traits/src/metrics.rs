//! Transport metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a transport's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Total number of bytes sent.
    pub bytes_sent: u64,

    /// Total number of bytes received.
    pub bytes_received: u64,

    /// Total number of messages sent.
    pub messages_sent: u64,

    /// Total number of messages received and dispatched.
    pub messages_received: u64,

    /// Total number of connection attempts.
    pub connections: u64,

    /// Total number of failed connection attempts.
    pub failed_connections: u64,

    /// Reconnects after a lost or failed stream.
    pub reconnects: u64,

    /// `endpoint` announcements applied.
    pub endpoint_updates: u64,

    /// Inbound envelopes dropped because they did not decode.
    pub malformed_messages: u64,

    /// Stream lines skipped because they could not be parsed.
    pub parse_errors: u64,

    /// The average send latency, in milliseconds.
    pub average_latency_ms: f64,

    /// The current number of active connections.
    pub active_connections: u64,
}

/// A lock-free, atomic structure for metrics updates from the I/O task.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes sent (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total messages sent (atomic counter).
    pub messages_sent: AtomicU64,

    /// Total messages received (atomic counter).
    pub messages_received: AtomicU64,

    /// Total connection attempts (atomic counter).
    pub connections: AtomicU64,

    /// Failed connection attempts (atomic counter).
    pub failed_connections: AtomicU64,

    /// Reconnects (atomic counter).
    pub reconnects: AtomicU64,

    /// Endpoint updates (atomic counter).
    pub endpoint_updates: AtomicU64,

    /// Dropped malformed envelopes (atomic counter).
    pub malformed_messages: AtomicU64,

    /// Skipped stream lines (atomic counter).
    pub parse_errors: AtomicU64,

    /// Current active connections (atomic counter).
    pub active_connections: AtomicU64,

    /// The average latency, stored as an exponential moving average in microseconds.
    avg_latency_us: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outbound message of `bytes` bytes.
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one dispatched inbound message.
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Updates the average latency using an exponential moving average (EMA).
    pub fn update_latency_us(&self, latency_us: u64) {
        let current = self.avg_latency_us.load(Ordering::Relaxed);
        let new_avg = if current == 0 {
            latency_us
        } else {
            // EMA with alpha = 0.1, saturating so multi-second latencies cannot overflow
            current.saturating_mul(9).saturating_add(latency_us) / 10
        };
        self.avg_latency_us.store(new_avg, Ordering::Relaxed);
    }

    /// Creates a serializable `TransportMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> TransportMetrics {
        let avg_latency_us = self.avg_latency_us.load(Ordering::Relaxed);

        TransportMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            endpoint_updates: self.endpoint_updates.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            average_latency_ms: (avg_latency_us as f64) / 1000.0,
        }
    }

}
