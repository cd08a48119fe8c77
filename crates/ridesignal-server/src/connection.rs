use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use ridesignal_core::{ConnectionId, Frame};
use ridesignal_settings::OverflowPolicy;
use ridesignal_telemetry::MetricsRecorder;
use tokio::sync::Notify;

/// Result of handing a frame to a connection's outbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after evicting the oldest pending frame.
    Evicted,
    /// Queue was full under the disconnect policy; the connection is closing.
    Overflowed,
    /// No such connection, or it is already closing.
    Closed,
}

impl Delivery {
    pub fn is_queued(self) -> bool {
        matches!(self, Self::Queued | Self::Evicted)
    }
}

/// Anything that can hand a frame to a connection without blocking.
pub trait Outbox {
    fn deliver(&self, to: &ConnectionId, frame: &Frame) -> Delivery;
}

/// Bounded single-consumer queue feeding one socket writer.
///
/// Producers never wait: a full queue either sheds its oldest frame or
/// closes, depending on the overflow policy.
pub struct OutboundQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, frame: Frame) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }
        let outcome = {
            let mut frames = self.frames.lock();
            if frames.len() < self.capacity {
                frames.push_back(frame);
                Delivery::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        frames.pop_front();
                        frames.push_back(frame);
                        Delivery::Evicted
                    }
                    OverflowPolicy::Disconnect => Delivery::Overflowed,
                }
            }
        };
        if outcome == Delivery::Overflowed {
            self.close();
        } else {
            self.notify.notify_one();
        }
        outcome
    }

    /// Wait for the next frame. `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return None;
            }
            if let Some(frame) = self.frames.lock().pop_front() {
                return Some(frame);
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

/// Consumer half handed to the socket writer.
pub struct OutboundReceiver {
    queue: Arc<OutboundQueue>,
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.queue.pop().await
    }

    /// Non-blocking pop. Still drains frames left behind after close.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.queue.frames.lock().pop_front()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// A live transport connection as seen by the registry.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    queue: Arc<OutboundQueue>,
    last_pong: AtomicU64,
}

impl ConnectionHandle {
    fn new(id: ConnectionId, queue: Arc<OutboundQueue>) -> Self {
        Self {
            id,
            queue,
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all open connections and their outbound queues.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    queue_capacity: usize,
    policy: OverflowPolicy,
    metrics: Arc<MetricsRecorder>,
}

impl ConnectionRegistry {
    pub fn new(
        queue_capacity: usize,
        policy: OverflowPolicy,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity,
            policy,
            metrics,
        }
    }

    /// Allocate an id and outbound queue for a new transport connection.
    pub fn open(&self) -> (ConnectionId, OutboundReceiver) {
        let id = ConnectionId::new();
        let queue = Arc::new(OutboundQueue::new(self.queue_capacity, self.policy));
        let handle = Arc::new(ConnectionHandle::new(id.clone(), Arc::clone(&queue)));
        self.connections.insert(id.clone(), handle);
        (id, OutboundReceiver { queue })
    }

    /// Remove a connection and close its queue. Returns whether it was open.
    pub fn close(&self, id: &ConnectionId) -> bool {
        match self.connections.remove(id) {
            Some((_, handle)) => {
                handle.queue.close();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(id).map(|h| Arc::clone(h.value()))
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn record_pong(&self, id: &ConnectionId) {
        if let Some(handle) = self.connections.get(id) {
            handle.record_pong();
        }
    }

    pub fn send_to(&self, id: &ConnectionId, frame: Frame) -> Delivery {
        self.deliver(id, &frame)
    }

    /// Queue `frame` for every open connection.
    pub fn broadcast_all(&self, frame: &Frame) -> usize {
        self.fan_out(frame, None)
    }

    /// Queue `frame` for every open connection except `sender`.
    pub fn broadcast_except(&self, sender: &ConnectionId, frame: &Frame) -> usize {
        self.fan_out(frame, Some(sender))
    }

    fn fan_out(&self, frame: &Frame, skip: Option<&ConnectionId>) -> usize {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .connections
            .iter()
            .filter(|e| Some(e.key()) != skip)
            .map(|e| Arc::clone(e.value()))
            .collect();
        targets
            .iter()
            .filter(|handle| self.push(handle, frame).is_queued())
            .count()
    }

    fn push(&self, handle: &ConnectionHandle, frame: &Frame) -> Delivery {
        let outcome = handle.queue.push(Arc::clone(frame));
        match outcome {
            Delivery::Queued => self.metrics.increment_counter("frames_delivered", &[], 1),
            Delivery::Evicted => {
                self.metrics.increment_counter("frames_delivered", &[], 1);
                self.metrics.increment_counter("frames_dropped", &[("reason", "evicted")], 1);
                tracing::warn!(connection_id = %handle.id, "Send queue full, dropped oldest frame");
            }
            Delivery::Overflowed => {
                self.metrics.increment_counter("frames_dropped", &[("reason", "overflow")], 1);
                tracing::warn!(connection_id = %handle.id, "Send queue full, disconnecting slow client");
            }
            Delivery::Closed => {}
        }
        outcome
    }

    /// Close every outbound queue. Used on shutdown; drivers then disconnect.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            if !entry.value().queue.is_closed() {
                entry.value().queue.close();
                closed += 1;
            }
        }
        closed
    }

    /// Close every connection that has not answered a ping within `timeout`.
    ///
    /// Only the queue is closed here; the socket driver notices and runs the
    /// regular disconnect sequence.
    pub fn expire_silent(&self, timeout: Duration) -> Vec<ConnectionId> {
        let dead: Vec<Arc<ConnectionHandle>> = self
            .connections
            .iter()
            .filter(|e| !e.value().is_alive(timeout) && !e.value().queue.is_closed())
            .map(|e| Arc::clone(e.value()))
            .collect();
        dead.into_iter()
            .map(|handle| {
                handle.queue.close();
                tracing::info!(connection_id = %handle.id, "Closing unresponsive connection");
                handle.id.clone()
            })
            .collect()
    }
}

impl Outbox for ConnectionRegistry {
    fn deliver(&self, to: &ConnectionId, frame: &Frame) -> Delivery {
        match self.get(to) {
            Some(handle) => self.push(&handle, frame),
            None => Delivery::Closed,
        }
    }
}
