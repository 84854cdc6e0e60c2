//! Push bus: room-keyed fan-out to connected realtime clients.
//!
//! Every client owns a bounded outbox. Publishing never blocks: when an
//! outbox is full the oldest event is dropped (and counted), so a slow or
//! dead client cannot stall publishers or starve other subscribers.
//! Events delivered to a single client preserve publish order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use aeris_common::events::AerisEvent;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

struct ClientOutbox {
    queue: Mutex<VecDeque<AerisEvent>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl ClientOutbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }
}

struct BusInner {
    rooms: HashMap<String, HashSet<Uuid>>,
    clients: HashMap<Uuid, Arc<ClientOutbox>>,
}

pub struct PushBus {
    inner: Mutex<BusInner>,
    outbox_capacity: usize,
}

impl Default for PushBus {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl PushBus {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                rooms: HashMap::new(),
                clients: HashMap::new(),
            }),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Register a new client and hand back its receiver. The receiver
    /// disconnects the client when dropped.
    pub fn connect(self: &Arc<Self>) -> PushReceiver {
        let client_id = Uuid::new_v4();
        let outbox = Arc::new(ClientOutbox::new());
        self.lock().clients.insert(client_id, outbox.clone());
        debug!(%client_id, "push client connected");
        PushReceiver {
            bus: self.clone(),
            client_id,
            outbox,
        }
    }

    pub fn join(&self, client_id: Uuid, room: &str) {
        let mut inner = self.lock();
        if !inner.clients.contains_key(&client_id) {
            return;
        }
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(client_id);
        debug!(%client_id, room, "joined room");
    }

    pub fn leave(&self, client_id: Uuid, room: &str) {
        let mut inner = self.lock();
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&client_id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }

    /// Fan an event out to every client in `room`; returns how many
    /// outboxes it was enqueued to. Full outboxes drop their oldest event.
    pub fn publish(&self, room: &str, event: &AerisEvent) -> usize {
        let targets: Vec<(Uuid, Arc<ClientOutbox>)> = {
            let inner = self.lock();
            let Some(members) = inner.rooms.get(room) else {
                return 0;
            };
            members
                .iter()
                .filter_map(|id| inner.clients.get(id).map(|outbox| (*id, outbox.clone())))
                .collect()
        };

        let mut delivered = 0;
        for (client_id, outbox) in targets {
            let mut queue = outbox.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.outbox_capacity {
                queue.pop_front();
                let dropped = outbox.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%client_id, room, dropped, "outbox full, dropped oldest event");
            }
            queue.push_back(event.clone());
            drop(queue);
            outbox.notify.notify_one();
            delivered += 1;
        }
        delivered
    }

    /// Total events dropped for a client, for diagnostics.
    pub fn dropped_for(&self, client_id: Uuid) -> u64 {
        self.lock()
            .clients
            .get(&client_id)
            .map(|outbox| outbox.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    fn disconnect(&self, client_id: Uuid) {
        let mut inner = self.lock();
        inner.clients.remove(&client_id);
        inner.rooms.retain(|_, members| {
            members.remove(&client_id);
            !members.is_empty()
        });
        debug!(%client_id, "push client disconnected");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving half of one client connection.
pub struct PushReceiver {
    bus: Arc<PushBus>,
    client_id: Uuid,
    outbox: Arc<ClientOutbox>,
}

impl PushReceiver {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn join(&self, room: &str) {
        self.bus.join(self.client_id, room);
    }

    pub fn leave(&self, room: &str) {
        self.bus.leave(self.client_id, room);
    }

    /// Next event in publish order; waits if the outbox is empty.
    pub async fn recv(&self) -> AerisEvent {
        loop {
            {
                let mut queue = self.outbox.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            self.outbox.notify.notified().await;
        }
    }

    /// Non-blocking variant.
    pub fn try_recv(&self) -> Option<AerisEvent> {
        self.outbox
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

impl Drop for PushReceiver {
    fn drop(&mut self) {
        self.bus.disconnect(self.client_id);
    }
}
