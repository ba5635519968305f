//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL, CONNECTIONS_OPENED_TOTAL, CONNECTION_DURATION,
    DELIVERIES_FAILED_TOTAL, DELIVERIES_QUEUED_TOTAL, DELIVERY_KEYS_SKIPPED_TOTAL,
    INBOUND_FRAMES_TOTAL, NOTIFICATIONS_DECODE_FAILED_TOTAL, NOTIFICATIONS_PUBLISHED_TOTAL,
    NOTIFICATIONS_PUBLISH_FAILED_TOTAL, NOTIFICATIONS_RECEIVED_TOTAL, SESSION_KEYS_ACTIVE,
    WRITER_FRAMES_WRITTEN_TOTAL, WRITER_MESSAGES_DROPPED_TOTAL, WRITER_OVERFLOW_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_registry_size(connections: usize, keys: usize) {
        CONNECTIONS_ACTIVE.set(connections as i64);
        SESSION_KEYS_ACTIVE.set(keys as i64);
    }

    pub fn record_opened() {
        CONNECTIONS_OPENED_TOTAL.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        CONNECTIONS_CLOSED_TOTAL.inc();
        CONNECTION_DURATION.observe(duration_secs);
    }
}

/// Helper struct for recording distributor metrics
pub struct DistributorMetrics;

impl DistributorMetrics {
    pub fn record_published(strategy: &str) {
        NOTIFICATIONS_PUBLISHED_TOTAL
            .with_label_values(&[strategy])
            .inc();
    }

    pub fn record_publish_failed(strategy: &str) {
        NOTIFICATIONS_PUBLISH_FAILED_TOTAL
            .with_label_values(&[strategy])
            .inc();
    }

    pub fn record_received() {
        NOTIFICATIONS_RECEIVED_TOTAL.inc();
    }

    pub fn record_decode_failed() {
        NOTIFICATIONS_DECODE_FAILED_TOTAL.inc();
    }
}

/// Helper struct for recording local delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record(queued: u64, failed: u64, keys_skipped: u64) {
        DELIVERIES_QUEUED_TOTAL.inc_by(queued);
        DELIVERIES_FAILED_TOTAL.inc_by(failed);
        DELIVERY_KEYS_SKIPPED_TOTAL.inc_by(keys_skipped);
    }
}

/// Helper struct for recording connection writer metrics
pub struct WriterMetrics;

impl WriterMetrics {
    pub fn record_written() {
        WRITER_FRAMES_WRITTEN_TOTAL.inc();
    }

    pub fn record_overflow(policy: &str) {
        WRITER_OVERFLOW_TOTAL.with_label_values(&[policy]).inc();
    }

    pub fn record_dropped(reason: &str, count: u64) {
        WRITER_MESSAGES_DROPPED_TOTAL
            .with_label_values(&[reason])
            .inc_by(count);
    }
}

/// Helper struct for recording inbound dispatch metrics
pub struct InboundMetrics;

impl InboundMetrics {
    pub fn record(outcome: &str) {
        INBOUND_FRAMES_TOTAL.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_contains_prefix() {
        WriterMetrics::record_written();
        InboundMetrics::record("handled");

        let output = encode_metrics().unwrap();
        assert!(output.contains("relay_writer_frames_written_total"));
        assert!(output.contains("relay_inbound_frames_total"));
    }
}
