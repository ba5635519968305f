//! Serializing, backpressure-aware send path for a single connection.
//!
//! Callers enqueue with [`ConnectionWriter::send`], which never waits on the
//! wire. A dedicated flush task owns the raw connection and writes queued
//! frames one at a time, so writes on one connection never overlap.
//!
//! Bounds:
//! - `buffer_size_limit_bytes`: total payload bytes waiting in the queue.
//!   Exceeding it applies the configured [`OverflowPolicy`].
//! - `send_time_limit_ms`: a queued frame older than this is stale. Under
//!   `Terminate` that closes the connection; the drop policies discard it
//!   unless it is the newest frame queued. A single wire write taking longer
//!   closes the connection. Once closing starts (terminate or `close()`),
//!   the in-flight write and the final close share one deadline of this
//!   length.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::metrics::WriterMetrics;

use super::{ConnectionId, RawConnection};

/// Action taken when a connection's queue exceeds its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Close the connection; the slow consumer is unrecoverable.
    #[default]
    #[serde(alias = "TERMINATE")]
    Terminate,
    /// Discard the oldest queued frames; the newest is always kept.
    #[serde(alias = "drop-oldest", alias = "DROP_OLDEST")]
    DropOldest,
    /// Reject the frame that would overflow the queue.
    #[serde(alias = "drop-newest", alias = "DROP_NEWEST")]
    DropNewest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Terminate => "terminate",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default = "default_send_time_limit_ms")]
    pub send_time_limit_ms: u64,
    #[serde(default = "default_buffer_size_limit_bytes")]
    pub buffer_size_limit_bytes: usize,
}

fn default_send_time_limit_ms() -> u64 {
    10_000
}

fn default_buffer_size_limit_bytes() -> usize {
    512 * 1024
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            overflow_policy: OverflowPolicy::default(),
            send_time_limit_ms: default_send_time_limit_ms(),
            buffer_size_limit_bytes: default_buffer_size_limit_bytes(),
        }
    }
}

impl WriterConfig {
    pub fn send_time_limit(&self) -> Duration {
        Duration::from_millis(self.send_time_limit_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriterState {
    Open,
    /// No new frames accepted; the flush task drains what is queued.
    Closing,
    Closed,
}

/// Result of a successful [`ConnectionWriter::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame is queued; `evicted` older frames were discarded to make room.
    Queued { evicted: usize },
    /// The frame was discarded under [`OverflowPolicy::DropNewest`].
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriterError {
    #[error("Connection {0} is closed")]
    Closed(ConnectionId),

    #[error("Connection {connection_id} terminated: send queue overflow")]
    Terminated { connection_id: ConnectionId },
}

struct Pending {
    payload: Arc<str>,
    enqueued_at: Instant,
}

struct Queue {
    pending: VecDeque<Pending>,
    buffered_bytes: usize,
    state: WriterState,
    /// Set when the writer starts closing; bounds the remaining wire work.
    deadline: Option<Instant>,
}

impl Queue {
    fn pop_front(&mut self) -> Option<Pending> {
        let item = self.pending.pop_front()?;
        self.buffered_bytes -= item.payload.len();
        Some(item)
    }

    fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.buffered_bytes = 0;
        dropped
    }

    fn head_is_stale(&self, now: Instant, limit: Duration) -> bool {
        self.pending
            .front()
            .is_some_and(|p| now.duration_since(p.enqueued_at) > limit)
    }
}

struct Shared {
    connection_id: ConnectionId,
    config: WriterConfig,
    queue: Mutex<Queue>,
    wake: Notify,
    state: watch::Sender<WriterState>,
    raw: tokio::sync::Mutex<Box<dyn RawConnection>>,
}

enum Step {
    Write(Pending),
    Wait,
    Stop,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the state forward; never backwards.
    fn transition(&self, queue: &mut Queue, next: WriterState) {
        if next > queue.state {
            queue.state = next;
            self.state.send_replace(next);
        }
    }

    /// Start the close clock. The first caller wins; the in-flight write and
    /// the final close both have to finish before this instant.
    fn arm_deadline(&self, queue: &mut Queue) {
        if queue.deadline.is_none() {
            queue.deadline = Some(Instant::now() + self.config.send_time_limit());
        }
    }

    /// Time left before the close deadline, or a full send time limit when
    /// no deadline is armed.
    fn time_left(&self) -> Duration {
        match self.lock_queue().deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.config.send_time_limit(),
        }
    }

    /// Resolves once the writer has left `Open` and its close deadline passed.
    async fn deadline_passed(&self) {
        let mut state = self.state.subscribe();
        let left_open = state.wait_for(|s| *s != WriterState::Open).await.is_ok();
        if !left_open {
            return std::future::pending().await;
        }
        let deadline = self.lock_queue().deadline;
        match deadline {
            Some(deadline) => {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
            }
            None => std::future::pending().await,
        }
    }

    /// Stop accepting frames and discard the queue.
    fn terminate(&self, queue: &mut Queue, reason: &'static str) {
        let dropped = queue.clear();
        self.arm_deadline(queue);
        self.transition(queue, WriterState::Closing);
        self.wake.notify_one();

        WriterMetrics::record_overflow(self.config.overflow_policy.as_str());
        WriterMetrics::record_dropped(reason, dropped as u64);
        tracing::warn!(
            connection_id = %self.connection_id,
            policy = %self.config.overflow_policy,
            reason = reason,
            dropped = dropped,
            "Terminating slow connection"
        );
    }

    fn next_step(&self) -> Step {
        let mut queue = self.lock_queue();
        match queue.pop_front() {
            Some(pending) => Step::Write(pending),
            None if queue.state != WriterState::Open => Step::Stop,
            None => Step::Wait,
        }
    }

    /// Close the raw connection and publish the final state.
    async fn finish(&self) {
        let closed = timeout(self.time_left(), async {
            let mut raw = self.raw.lock().await;
            raw.close().await
        })
        .await;

        match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "Close failed");
            }
            Err(_) => {
                tracing::warn!(connection_id = %self.connection_id, "Close timed out");
            }
        }

        let mut queue = self.lock_queue();
        let dropped = queue.clear();
        if dropped > 0 {
            WriterMetrics::record_dropped("closed", dropped as u64);
        }
        self.transition(&mut queue, WriterState::Closed);
    }
}

/// Per-connection outbound queue with a dedicated flush task.
pub struct ConnectionWriter {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionWriter {
    /// Take ownership of `raw` and start its flush task.
    pub fn spawn(
        connection_id: ConnectionId,
        raw: Box<dyn RawConnection>,
        config: WriterConfig,
    ) -> Self {
        let (state, _) = watch::channel(WriterState::Open);
        let shared = Arc::new(Shared {
            connection_id,
            config,
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                buffered_bytes: 0,
                state: WriterState::Open,
                deadline: None,
            }),
            wake: Notify::new(),
            state,
            raw: tokio::sync::Mutex::new(raw),
        });

        let task = tokio::spawn(flush_loop(shared.clone()));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.shared.connection_id
    }

    pub fn state(&self) -> WriterState {
        self.shared.lock_queue().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == WriterState::Open
    }

    /// Frames and bytes currently waiting to be written.
    pub fn backlog(&self) -> (usize, usize) {
        let queue = self.shared.lock_queue();
        (queue.pending.len(), queue.buffered_bytes)
    }

    /// Enqueue a text frame. Never waits for the wire.
    pub fn send(&self, payload: impl Into<Arc<str>>) -> Result<SendOutcome, WriterError> {
        let payload = payload.into();
        let shared = &self.shared;
        let connection_id = shared.connection_id;
        let policy = shared.config.overflow_policy;
        let limit = shared.config.send_time_limit();
        let now = Instant::now();

        let mut queue = shared.lock_queue();
        if queue.state != WriterState::Open {
            return Err(WriterError::Closed(connection_id));
        }

        let mut evicted = 0;
        if queue.head_is_stale(now, limit) {
            if policy == OverflowPolicy::Terminate {
                shared.terminate(&mut queue, "stale");
                return Err(WriterError::Terminated { connection_id });
            }
            while queue.head_is_stale(now, limit) {
                queue.pop_front();
                evicted += 1;
            }
            WriterMetrics::record_dropped("stale", evicted as u64);
        }

        queue.buffered_bytes += payload.len();
        queue.pending.push_back(Pending {
            payload,
            enqueued_at: now,
        });

        if queue.buffered_bytes > shared.config.buffer_size_limit_bytes {
            match policy {
                OverflowPolicy::Terminate => {
                    shared.terminate(&mut queue, "overflow");
                    return Err(WriterError::Terminated { connection_id });
                }
                OverflowPolicy::DropOldest => {
                    let mut overflowed = 0;
                    while queue.buffered_bytes > shared.config.buffer_size_limit_bytes
                        && queue.pending.len() > 1
                    {
                        queue.pop_front();
                        overflowed += 1;
                    }
                    evicted += overflowed;
                    WriterMetrics::record_overflow(policy.as_str());
                    WriterMetrics::record_dropped("overflow", overflowed as u64);
                    tracing::warn!(
                        connection_id = %connection_id,
                        policy = %policy,
                        dropped = overflowed,
                        "Send queue full, dropped oldest frames"
                    );
                }
                OverflowPolicy::DropNewest => {
                    if let Some(rejected) = queue.pending.pop_back() {
                        queue.buffered_bytes -= rejected.payload.len();
                    }
                    WriterMetrics::record_overflow(policy.as_str());
                    WriterMetrics::record_dropped("overflow", 1);
                    tracing::warn!(
                        connection_id = %connection_id,
                        policy = %policy,
                        "Send queue full, rejected newest frame"
                    );
                    return Ok(SendOutcome::Rejected);
                }
            }
        }
        drop(queue);

        shared.wake.notify_one();
        Ok(SendOutcome::Queued { evicted })
    }

    /// Stop accepting frames, flush what is queued within the send time
    /// limit, then close the raw connection. Idempotent.
    pub async fn close(&self) {
        {
            let mut queue = self.shared.lock_queue();
            if queue.state == WriterState::Open {
                self.shared.arm_deadline(&mut queue);
            }
            self.shared.transition(&mut queue, WriterState::Closing);
        }
        self.shared.wake.notify_one();

        let limit = self.shared.config.send_time_limit();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match task {
            Some(mut task) => {
                if timeout(limit, &mut task).await.is_err() {
                    tracing::warn!(
                        connection_id = %self.shared.connection_id,
                        limit_ms = limit.as_millis() as u64,
                        "Drain exceeded send time limit, forcing close"
                    );
                    task.abort();
                    let _ = task.await;
                    self.shared.finish().await;
                }
            }
            // Another caller is draining
            None => {
                let _ = timeout(limit * 2, self.closed()).await;
            }
        }
    }

    /// Resolves once the raw connection has been closed.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == WriterState::Closed).await;
    }
}

impl Drop for ConnectionWriter {
    fn drop(&mut self) {
        let mut queue = self.shared.lock_queue();
        self.shared.transition(&mut queue, WriterState::Closing);
        drop(queue);
        self.shared.wake.notify_one();
    }
}

async fn flush_loop(shared: Arc<Shared>) {
    let limit = shared.config.send_time_limit();
    let policy = shared.config.overflow_policy;

    loop {
        let pending = match shared.next_step() {
            Step::Write(pending) => pending,
            Step::Wait => {
                shared.wake.notified().await;
                continue;
            }
            Step::Stop => break,
        };

        // Under the drop policies a stale frame only goes when something newer
        // is queued behind it; the latest frame is always attempted.
        let stale = pending.enqueued_at.elapsed() > limit;
        if stale && policy == OverflowPolicy::Terminate {
            let mut queue = shared.lock_queue();
            shared.terminate(&mut queue, "stale");
            continue;
        }
        if stale && !shared.lock_queue().pending.is_empty() {
            WriterMetrics::record_dropped("stale", 1);
            tracing::debug!(
                connection_id = %shared.connection_id,
                policy = %policy,
                "Dropped stale frame"
            );
            continue;
        }

        let written = {
            let mut raw = shared.raw.lock().await;
            tokio::select! {
                result = timeout(limit, raw.send_text(&pending.payload)) => result.ok(),
                _ = shared.deadline_passed() => None,
            }
        };

        match written {
            Some(Ok(())) => WriterMetrics::record_written(),
            Some(Err(e)) => {
                tracing::debug!(connection_id = %shared.connection_id, error = %e, "Write failed");
                let mut queue = shared.lock_queue();
                let dropped = queue.clear();
                WriterMetrics::record_dropped("closed", dropped as u64);
                shared.transition(&mut queue, WriterState::Closing);
            }
            None => {
                // The write used up the time budget; close without waiting again
                let mut queue = shared.lock_queue();
                if queue.state == WriterState::Open {
                    queue.deadline = Some(Instant::now());
                    shared.terminate(&mut queue, "write_timeout");
                } else {
                    queue.deadline.get_or_insert_with(Instant::now);
                    let dropped = queue.clear();
                    WriterMetrics::record_dropped("closed", dropped as u64);
                }
            }
        }
    }

    shared.finish().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelConnection, ChannelPeer, PeerFrame};

    fn writer_with(
        config: WriterConfig,
        conn: ChannelConnection,
    ) -> ConnectionWriter {
        ConnectionWriter::spawn(ConnectionId::next(), Box::new(conn), config)
    }

    fn config(policy: OverflowPolicy, limit_ms: u64, buffer: usize) -> WriterConfig {
        WriterConfig {
            overflow_policy: policy,
            send_time_limit_ms: limit_ms,
            buffer_size_limit_bytes: buffer,
        }
    }

    async fn texts_until_close(peer: &mut ChannelPeer) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(frame) = peer.recv_timeout(Duration::from_secs(2)).await {
            match frame {
                PeerFrame::Text(text) => texts.push(text),
                PeerFrame::Close => break,
            }
        }
        texts
    }

    #[test]
    fn test_policy_deserialize_aliases() {
        let policy: OverflowPolicy = serde_json::from_str("\"drop-oldest\"").unwrap();
        assert_eq!(policy, OverflowPolicy::DropOldest);
        let policy: OverflowPolicy = serde_json::from_str("\"drop_newest\"").unwrap();
        assert_eq!(policy, OverflowPolicy::DropNewest);
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Terminate);
    }

    #[tokio::test]
    async fn test_frames_written_in_submission_order() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(WriterConfig::default(), conn);

        for i in 0..50 {
            writer.send(format!("msg-{}", i)).unwrap();
        }
        writer.close().await;

        let expected: Vec<String> = (0..50).map(|i| format!("msg-{}", i)).collect();
        assert_eq!(texts_until_close(&mut peer).await, expected);
        assert_eq!(writer.state(), WriterState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_never_interleave() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = Arc::new(writer_with(WriterConfig::default(), conn));

        let mut tasks = Vec::new();
        for sender in 0..4 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..100 {
                    writer.send(format!("{}:{}", sender, seq)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        writer.close().await;

        let texts = texts_until_close(&mut peer).await;
        assert_eq!(texts.len(), 400);

        let mut last_seen = [-1i64; 4];
        for text in texts {
            let (sender, seq) = text.split_once(':').unwrap();
            let sender: usize = sender.parse().unwrap();
            let seq: i64 = seq.parse().unwrap();
            assert_eq!(seq, last_seen[sender] + 1, "out of order for sender {}", sender);
            last_seen[sender] = seq;
        }
    }

    #[tokio::test]
    async fn test_terminate_on_byte_overflow() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(config(OverflowPolicy::Terminate, 500, 10), conn);

        // Nothing has been flushed yet: the flush task has not been polled
        assert_eq!(writer.send("aaaaaaaa"), Ok(SendOutcome::Queued { evicted: 0 }));
        let connection_id = writer.connection_id();
        assert_eq!(
            writer.send("bbbbbbbb"),
            Err(WriterError::Terminated { connection_id })
        );

        timeout(Duration::from_secs(1), writer.closed()).await.unwrap();
        assert_eq!(writer.send("late"), Err(WriterError::Closed(connection_id)));
        assert!(texts_until_close(&mut peer).await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(config(OverflowPolicy::DropOldest, 500, 10), conn);

        writer.send("11111111").unwrap();
        assert_eq!(
            writer.send("22222222"),
            Ok(SendOutcome::Queued { evicted: 1 })
        );
        assert_eq!(
            writer.send("33333333"),
            Ok(SendOutcome::Queued { evicted: 1 })
        );
        assert_eq!(writer.backlog(), (1, 8));
        assert!(writer.is_open());

        writer.close().await;
        assert_eq!(texts_until_close(&mut peer).await, vec!["33333333"]);
    }

    #[tokio::test]
    async fn test_drop_oldest_delivers_oversized_frame() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(config(OverflowPolicy::DropOldest, 500, 4), conn);

        assert_eq!(
            writer.send("larger than four bytes"),
            Ok(SendOutcome::Queued { evicted: 0 })
        );
        writer.close().await;
        assert_eq!(
            texts_until_close(&mut peer).await,
            vec!["larger than four bytes"]
        );
    }

    #[tokio::test]
    async fn test_drop_newest_rejects_incoming() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(config(OverflowPolicy::DropNewest, 500, 10), conn);

        writer.send("11111111").unwrap();
        assert_eq!(writer.send("22222222"), Ok(SendOutcome::Rejected));
        assert!(writer.is_open());

        writer.close().await;
        assert_eq!(texts_until_close(&mut peer).await, vec!["11111111"]);
    }

    #[tokio::test]
    async fn test_stale_frames_dropped_newest_kept() {
        let (conn, mut peer) = ChannelConnection::pair();
        let conn = conn.with_write_delay(Duration::from_millis(80));
        let writer = writer_with(config(OverflowPolicy::DropOldest, 100, 1024), conn);

        for i in 1..=4 {
            writer.send(format!("m{}", i)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(writer.is_open());

        writer.send("fresh").unwrap();
        writer.close().await;

        let texts = texts_until_close(&mut peer).await;
        assert_eq!(texts.first().map(String::as_str), Some("m1"));
        assert!(!texts.contains(&"m3".to_string()));
        assert!(texts.contains(&"m4".to_string()));
        assert_eq!(texts.last().map(String::as_str), Some("fresh"));
    }

    #[tokio::test]
    async fn test_stale_last_frame_still_delivered() {
        let (conn, mut peer) = ChannelConnection::pair();
        let conn = conn.with_write_delay(Duration::from_millis(80));
        let writer = writer_with(config(OverflowPolicy::DropOldest, 100, 1024), conn);

        for i in 1..=4 {
            writer.send(format!("m{}", i)).unwrap();
        }

        // Nothing else is sent; the newest frame must not be lost to staleness
        let mut texts = Vec::new();
        while let Some(PeerFrame::Text(text)) = peer.recv_timeout(Duration::from_secs(1)).await {
            let done = text == "m4";
            texts.push(text);
            if done {
                break;
            }
        }
        assert_eq!(texts.last().map(String::as_str), Some("m4"));
        assert!(!texts.contains(&"m3".to_string()));
        assert!(writer.is_open());
    }

    #[tokio::test]
    async fn test_drop_newest_stale_last_frame_still_delivered() {
        let (conn, mut peer) = ChannelConnection::pair();
        let conn = conn.with_write_delay(Duration::from_millis(150));
        let writer = writer_with(config(OverflowPolicy::DropNewest, 100, 1024), conn);

        writer.send("first").unwrap();
        writer.send("last").unwrap();

        assert_eq!(
            peer.recv_timeout(Duration::from_secs(1)).await,
            Some(PeerFrame::Text("first".into()))
        );
        assert_eq!(
            peer.recv_timeout(Duration::from_secs(1)).await,
            Some(PeerFrame::Text("last".into()))
        );
        assert!(writer.is_open());
    }

    #[tokio::test]
    async fn test_stuck_write_closes_within_limit() {
        let (conn, mut peer) = ChannelConnection::pair();
        let conn = conn.with_write_delay(Duration::from_secs(5));
        let writer = writer_with(config(OverflowPolicy::DropOldest, 100, 1024), conn);

        writer.send("never").unwrap();
        timeout(Duration::from_secs(1), writer.closed()).await.unwrap();

        assert!(!writer.is_open());
        assert_eq!(peer.recv().await, Some(PeerFrame::Close));
    }

    /// Raw connection whose writes and close never complete.
    struct HangingConnection;

    #[async_trait::async_trait]
    impl RawConnection for HangingConnection {
        async fn send_text(&mut self, _payload: &str) -> Result<(), crate::connection::ConnectionError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), crate::connection::ConnectionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_terminate_reaches_closed_within_one_limit() {
        let limit = Duration::from_millis(200);
        let writer = ConnectionWriter::spawn(
            ConnectionId::next(),
            Box::new(HangingConnection),
            config(OverflowPolicy::Terminate, 200, 10),
        );

        writer.send("aaaaaa").unwrap();
        // Let the flush task start the write that never returns
        tokio::time::sleep(Duration::from_millis(20)).await;

        let terminated_at = Instant::now();
        assert!(matches!(
            writer.send("bbbbbb"),
            Err(WriterError::Terminated { .. })
        ));

        timeout(limit + Duration::from_millis(100), writer.closed())
            .await
            .expect("writer should close within the send time limit");
        assert!(terminated_at.elapsed() < limit + Duration::from_millis(100));
        assert_eq!(writer.state(), WriterState::Closed);
    }

    #[tokio::test]
    async fn test_stuck_write_and_close_bounded_by_limit() {
        let writer = ConnectionWriter::spawn(
            ConnectionId::next(),
            Box::new(HangingConnection),
            config(OverflowPolicy::DropOldest, 150, 1024),
        );

        let started = Instant::now();
        writer.send("never").unwrap();
        timeout(Duration::from_millis(250), writer.closed())
            .await
            .expect("stuck write should close the writer");
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_failed_write_closes_writer() {
        let (conn, _peer) = ChannelConnection::pair();
        let writer = writer_with(WriterConfig::default(), conn.failing());

        writer.send("x").unwrap();
        timeout(Duration::from_secs(1), writer.closed()).await.unwrap();
        assert!(writer.send("y").is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, mut peer) = ChannelConnection::pair();
        let writer = writer_with(WriterConfig::default(), conn);

        writer.send("only").unwrap();
        writer.close().await;
        writer.close().await;

        assert_eq!(
            peer.try_drain(),
            vec![PeerFrame::Text("only".into()), PeerFrame::Close]
        );
    }
}
