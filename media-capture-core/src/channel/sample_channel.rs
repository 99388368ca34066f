use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::models::sample::SampleBuffer;
use crate::models::session::OutputKind;

use super::router::RouterRef;

/// What a full channel gives up when a new buffer arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the incoming buffer. Suits recording, where earlier
    /// frames must not be rewritten.
    DropNewest,
    /// Evict the oldest queued buffer. Suits preview and metering, which
    /// care about the latest state.
    #[default]
    DropOldest,
}

/// Per-channel buffering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    pub capacity: usize,
    pub policy: OverflowPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            capacity: 8,
            policy: OverflowPolicy::DropOldest,
        }
    }
}

impl ChannelOptions {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self { capacity, policy }
    }
}

/// Delivery counters for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Buffers enqueued for the consumer.
    pub delivered: u64,
    /// Buffers lost to overflow.
    pub dropped: u64,
}

#[derive(Default)]
pub(crate) struct ChannelCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelCounters {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Runs on the producer's thread before a buffer is queued. Returning
/// `None` discards the buffer; returning a different buffer queues that
/// one instead.
pub type DeliveryFilter = Arc<dyn Fn(SampleBuffer) -> Option<SampleBuffer> + Send + Sync>;

pub(crate) type FilterSlot = Arc<RwLock<Option<DeliveryFilter>>>;

struct CancelState {
    cancelled: AtomicBool,
    id: u64,
    router: RouterRef,
}

/// Handle that cancels a channel from any thread.
///
/// Cancelling is idempotent. The first call deregisters the channel from
/// its producer and wakes a consumer blocked in `next()`.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub(crate) fn new(id: u64, router: RouterRef) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                id,
                router,
            }),
        }
    }

    /// Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(router) = self.state.router.upgrade() {
            router.unsubscribe(self.state.id);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("id", &self.state.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A consumer's lazy, ordered view of one output's buffers.
///
/// Iterating blocks until the next buffer arrives and yields `None` once
/// the channel is cancelled or its producer terminates it. Dropping the
/// channel cancels it.
pub struct SampleChannel {
    output: OutputKind,
    rx: Receiver<SampleBuffer>,
    token: CancelToken,
    counters: Arc<ChannelCounters>,
    filter: FilterSlot,
}

impl SampleChannel {
    pub(crate) fn new(
        output: OutputKind,
        rx: Receiver<SampleBuffer>,
        token: CancelToken,
        counters: Arc<ChannelCounters>,
        filter: FilterSlot,
    ) -> Self {
        Self {
            output,
            rx,
            token,
            counters,
            filter,
        }
    }

    /// Install `filter` for buffers delivered from now on. Buffers already
    /// queued are left as they are.
    pub fn set_filter(&self, filter: DeliveryFilter) {
        *self.filter.write() = Some(filter);
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Wait up to `timeout` for the next buffer.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SampleBuffer, RecvTimeoutError> {
        if self.token.is_cancelled() {
            return Err(RecvTimeoutError::Disconnected);
        }
        let buffer = self.rx.recv_timeout(timeout)?;
        if self.token.is_cancelled() {
            return Err(RecvTimeoutError::Disconnected);
        }
        Ok(buffer)
    }

    /// Take the next buffer if one is queued.
    pub fn try_recv(&self) -> Result<SampleBuffer, TryRecvError> {
        if self.token.is_cancelled() {
            return Err(TryRecvError::Disconnected);
        }
        self.rx.try_recv()
    }

    /// Everything currently queued, without waiting.
    pub fn drain_now(&self) -> Vec<SampleBuffer> {
        if self.token.is_cancelled() {
            return Vec::new();
        }
        self.rx.try_iter().collect()
    }

    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the producer has closed the channel and nothing is queued.
    pub fn is_terminated(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        let registered = self
            .token
            .state
            .router
            .upgrade()
            .is_some_and(|router| router.has_subscriber(self.token.state.id));
        !registered && self.rx.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        self.counters.snapshot()
    }

    /// Underlying queue, for consumers that wait on several channels at once.
    pub(crate) fn receiver(&self) -> &Receiver<SampleBuffer> {
        &self.rx
    }
}

impl Iterator for SampleChannel {
    type Item = SampleBuffer;

    fn next(&mut self) -> Option<SampleBuffer> {
        if self.token.is_cancelled() {
            return None;
        }
        let buffer = self.rx.recv().ok()?;
        if self.token.is_cancelled() {
            return None;
        }
        Some(buffer)
    }
}

impl Drop for SampleChannel {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for SampleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleChannel")
            .field("output", &self.output)
            .field("queued", &self.rx.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
