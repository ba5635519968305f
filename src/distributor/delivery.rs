use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::connection::{ConnectionHandle, SendOutcome};
use crate::metrics::{DeliveryMetrics, DistributorMetrics};
use crate::session::{SessionKey, SessionRegistry};

use super::{OutboundMessage, Target};

/// Outcome of delivering one message on this process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Targeted keys with at least one local connection
    pub keys_matched: usize,
    /// Targeted keys with no local connection
    pub keys_skipped: usize,
    /// Send attempts, one per selected connection
    pub attempted: usize,
    pub queued: usize,
    /// Rejected by a writer's overflow policy
    pub dropped: usize,
    /// Refused by a closed or terminated writer
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub notifications: AtomicU64,
    pub attempted: AtomicU64,
    pub queued: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub notifications: u64,
    pub attempted: u64,
    pub queued: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl DeliveryStats {
    fn record(&self, report: &DeliveryReport) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        self.attempted
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.queued.fetch_add(report.queued as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            attempted: self.attempted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Delivers a message to the matching connections of this process.
/// Shared by every distributor strategy.
pub struct LocalDelivery {
    registry: Arc<SessionRegistry>,
    stats: DeliveryStats,
}

impl LocalDelivery {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            stats: DeliveryStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Enqueue the payload on every selected connection. Never waits on the
    /// wire, so a slow connection cannot hold up the others.
    pub fn deliver(&self, message: &OutboundMessage) -> DeliveryReport {
        let payload: Arc<str> = Arc::from(message.payload.as_str());
        let mut report = DeliveryReport::default();

        match &message.target {
            Target::Keys { keys } => {
                for key in keys {
                    self.deliver_to_key(key, &payload, message.only_one_connection_per_key, &mut report);
                }
            }
            Target::All => {
                for key in self.registry.all_keys() {
                    self.deliver_to_key(&key, &payload, message.only_one_connection_per_key, &mut report);
                }
            }
        }

        self.stats.record(&report);
        DeliveryMetrics::record(
            report.queued as u64,
            report.failed as u64,
            report.keys_skipped as u64,
        );
        tracing::debug!(
            target_keys = %message.target,
            keys_matched = report.keys_matched,
            keys_skipped = report.keys_skipped,
            queued = report.queued,
            dropped = report.dropped,
            failed = report.failed,
            "Local delivery complete"
        );

        report
    }

    fn deliver_to_key(
        &self,
        key: &SessionKey,
        payload: &Arc<str>,
        one_per_key: bool,
        report: &mut DeliveryReport,
    ) {
        let connections = self.registry.connections_for(key.as_str());
        if connections.is_empty() {
            // Registered on another process, or offline
            report.keys_skipped += 1;
            return;
        }
        report.keys_matched += 1;

        if one_per_key {
            // Lowest open connection id, so the pick is stable
            let pick = connections
                .iter()
                .find(|c| c.is_open())
                .or_else(|| connections.first());
            if let Some(connection) = pick {
                send_one(connection, payload, report);
            }
        } else {
            for connection in &connections {
                send_one(connection, payload, report);
            }
        }
    }
}

fn send_one(connection: &ConnectionHandle, payload: &Arc<str>, report: &mut DeliveryReport) {
    report.attempted += 1;
    match connection.send(payload.clone()) {
        Ok(SendOutcome::Queued { .. }) => report.queued += 1,
        Ok(SendOutcome::Rejected) => report.dropped += 1,
        Err(e) => {
            report.failed += 1;
            tracing::debug!(connection_id = %connection.id, error = %e, "Send refused");
        }
    }
}

/// Decode a notification received from the broker. Malformed input is
/// logged and dropped.
pub fn decode_notification(bytes: &[u8]) -> Option<OutboundMessage> {
    match serde_json::from_slice(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            DistributorMetrics::record_decode_failed();
            tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable notification");
            None
        }
    }
}
