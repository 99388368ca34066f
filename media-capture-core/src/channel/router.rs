use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::models::sample::SampleBuffer;
use crate::models::session::OutputKind;
use crate::traits::capture_hardware::SampleHandler;

use super::sample_channel::{CancelToken, ChannelCounters, ChannelOptions, FilterSlot, OverflowPolicy, SampleChannel};

struct Subscriber {
    id: u64,
    tx: Sender<SampleBuffer>,
    // Second handle on the queue so the producer can evict the oldest entry.
    evict: Receiver<SampleBuffer>,
    policy: OverflowPolicy,
    counters: Arc<ChannelCounters>,
    filter: FilterSlot,
}

impl Subscriber {
    fn deliver(&self, buffer: SampleBuffer) {
        let buffer = match self.filter.read().as_ref() {
            Some(filter) => match filter(buffer) {
                Some(buffer) => buffer,
                None => return,
            },
            None => buffer,
        };
        match self.tx.try_send(buffer) {
            Ok(()) => self.counters.record_delivered(),
            Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(buffer)) => match self.policy {
                OverflowPolicy::DropNewest => {
                    self.counters.record_dropped();
                    log::trace!("channel {} full, dropping newest buffer", self.id);
                }
                OverflowPolicy::DropOldest => {
                    if self.evict.try_recv().is_ok() {
                        self.counters.record_dropped();
                    }
                    match self.tx.try_send(buffer) {
                        Ok(()) => self.counters.record_delivered(),
                        Err(_) => self.counters.record_dropped(),
                    }
                    log::trace!("channel {} full, dropped oldest buffer", self.id);
                }
            },
        }
    }
}

/// Fans buffers from one output out to every open channel.
///
/// The capture thread calls [`SampleRouter::dispatch`]; consumers register
/// and deregister without touching the session's configuration lock.
pub struct SampleRouter {
    output: OutputKind,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SampleRouter {
    pub fn new(output: OutputKind) -> Arc<Self> {
        Arc::new(Self {
            output,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Callback to install on the producer. Holds only a weak reference so
    /// the producer never keeps the router alive.
    pub fn handler(self: &Arc<Self>) -> SampleHandler {
        let router = Arc::downgrade(self);
        Arc::new(move |buffer: SampleBuffer| {
            if let Some(router) = router.upgrade() {
                router.dispatch(buffer);
            }
        })
    }

    /// Hand `buffer` to every open channel without blocking.
    pub fn dispatch(&self, buffer: SampleBuffer) {
        if buffer.media_type() != self.output.media_kind() {
            log::warn!(
                "dropping {} buffer delivered to {:?} output",
                buffer.media_type(),
                self.output
            );
            return;
        }
        let subscribers = self.subscribers.read();
        match subscribers.as_slice() {
            [] => {}
            [only] => only.deliver(buffer),
            many => {
                for subscriber in many {
                    subscriber.deliver(buffer.clone());
                }
            }
        }
    }

    /// Open a new, independent channel on this output.
    pub fn subscribe(self: &Arc<Self>, options: ChannelOptions) -> SampleChannel {
        let capacity = options.capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let counters = Arc::new(ChannelCounters::default());
        let filter = FilterSlot::default();

        self.subscribers.write().push(Subscriber {
            id,
            tx,
            evict: rx.clone(),
            policy: options.policy,
            counters: Arc::clone(&counters),
            filter: Arc::clone(&filter),
        });
        log::debug!("opened channel {} on {:?} (capacity {})", id, self.output, capacity);

        let token = CancelToken::new(id, Arc::downgrade(self));
        SampleChannel::new(self.output, rx, token, counters, filter)
    }

    /// Remove a channel. Returns false if it was already gone.
    pub(crate) fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            log::debug!("closed channel {} on {:?}", id, self.output);
        }
        removed
    }

    /// Terminate every open channel; consumers observe end-of-stream.
    pub fn close_all(&self) -> usize {
        let closed: Vec<Subscriber> = std::mem::take(&mut *self.subscribers.write());
        if !closed.is_empty() {
            log::info!("terminated {} channel(s) on {:?}", closed.len(), self.output);
        }
        closed.len()
    }

    pub(crate) fn has_subscriber(&self, id: u64) -> bool {
        self.subscribers.read().iter().any(|s| s.id == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

pub(crate) type RouterRef = Weak<SampleRouter>;
