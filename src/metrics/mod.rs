//! Prometheus metrics for the relay.
//!
//! - Registry metrics (active connections, active session keys)
//! - Distributor metrics (published, received, decode failures)
//! - Delivery and writer metrics (queued, dropped, overflow actions)
//! - Inbound dispatch metrics

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DeliveryMetrics, DistributorMetrics, InboundMetrics,
    WriterMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Registry Metrics
    // ============================================================================

    /// Live connections registered on this process
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Live connections registered on this process"
    ).unwrap();

    /// Distinct session keys with at least one live connection
    pub static ref SESSION_KEYS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_session_keys_active", METRIC_PREFIX),
        "Distinct session keys with at least one live connection"
    ).unwrap();

    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total connections opened"
    ).unwrap();

    pub static ref CONNECTIONS_CLOSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total connections closed"
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Distributor Metrics
    // ============================================================================

    /// Messages handed to the fan-out mechanism, by strategy
    pub static ref NOTIFICATIONS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_published_total", METRIC_PREFIX),
        "Total messages published to the fan-out mechanism",
        &["strategy"]
    ).unwrap();

    pub static ref NOTIFICATIONS_PUBLISH_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_publish_failed_total", METRIC_PREFIX),
        "Total publish attempts that failed",
        &["strategy"]
    ).unwrap();

    /// Notifications received from the broker
    pub static ref NOTIFICATIONS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_received_total", METRIC_PREFIX),
        "Total notifications received from the broker"
    ).unwrap();

    pub static ref NOTIFICATIONS_DECODE_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_decode_failed_total", METRIC_PREFIX),
        "Total received notifications that could not be decoded"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    pub static ref DELIVERIES_QUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_queued_total", METRIC_PREFIX),
        "Total sends queued on a connection writer"
    ).unwrap();

    pub static ref DELIVERIES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_failed_total", METRIC_PREFIX),
        "Total sends refused by a closed or terminated writer"
    ).unwrap();

    pub static ref DELIVERY_KEYS_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_keys_skipped_total", METRIC_PREFIX),
        "Total targeted session keys without a local connection"
    ).unwrap();

    // ============================================================================
    // Writer Metrics
    // ============================================================================

    pub static ref WRITER_FRAMES_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        format!("{}_writer_frames_written_total", METRIC_PREFIX),
        "Total frames written to the wire"
    ).unwrap();

    /// Overflow actions, by policy
    pub static ref WRITER_OVERFLOW_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_writer_overflow_total", METRIC_PREFIX),
        "Total overflow actions taken by connection writers",
        &["policy"]
    ).unwrap();

    pub static ref WRITER_MESSAGES_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_writer_messages_dropped_total", METRIC_PREFIX),
        "Total queued messages discarded by connection writers",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Inbound Metrics
    // ============================================================================

    pub static ref INBOUND_FRAMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_inbound_frames_total", METRIC_PREFIX),
        "Total inbound text frames by dispatch outcome",
        &["outcome"]
    ).unwrap();
}
