//! ClientHub - dashboard connection registry and best-effort fan-out
//!
//! ## Responsibilities
//!
//! - Track connected dashboard clients (one bounded queue each)
//! - Broadcast state snapshots and discrete events in issue order
//! - Drop clients whose queue is closed or full; never wait on a client
//!
//! Broadcast copies the membership under the lock, sends outside it, then
//! prunes the failures, so a client connecting or leaving mid-broadcast is
//! harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{LogEntry, OutboundMessage, SorterEvent};
use super::state::LaneBoard;

/// Registry of connected dashboard clients.
pub struct ClientHub {
    clients: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
    buffer: usize,
    messages_sent: AtomicU64,
    clients_dropped: AtomicU64,
}

impl ClientHub {
    /// `buffer` is how many messages a client may fall behind before it is dropped.
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
            messages_sent: AtomicU64::new(0),
            clients_dropped: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, mpsc::Sender<String>>> {
        self.clients.read().unwrap_or_else(|e| {
            warn!("ClientHub lock poisoned on read, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, mpsc::Sender<String>>> {
        self.clients.write().unwrap_or_else(|e| {
            warn!("ClientHub lock poisoned on write, recovering");
            e.into_inner()
        })
    }

    /// Register a new client and hand back its outbound queue.
    pub fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);
        let total = {
            let mut clients = self.write();
            clients.insert(id, tx);
            clients.len()
        };
        info!(connection_id = %id, clients = total, "Dashboard client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: &Uuid) {
        if self.write().remove(id).is_some() {
            info!(connection_id = %id, "Dashboard client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.read().len()
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn clients_dropped(&self) -> u64 {
        self.clients_dropped.load(Ordering::Relaxed)
    }

    /// Push a serialized message to every client. Returns how many accepted it.
    pub fn broadcast(&self, json: &str) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<String>)> = self
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(json.to_owned()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = %id, "Dashboard client backlogged, dropping");
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, "Dashboard client gone, dropping");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut clients = self.write();
            for id in &failed {
                clients.remove(id);
            }
            self.clients_dropped
                .fetch_add(failed.len() as u64, Ordering::Relaxed);
        }
        self.messages_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Log an event and push it to every client.
    pub fn emit(&self, event: SorterEvent) {
        info!(kind = event.kind(), "{}", event);
        let entry = LogEntry::now(event);
        match OutboundMessage::Log(&entry).to_json() {
            Ok(json) => {
                self.broadcast(&json);
            }
            Err(e) => error!(error = %e, "Failed to serialize event"),
        }
    }

    /// Push a full state snapshot to every client.
    pub fn publish_state(&self, board: &LaneBoard) -> usize {
        let message = OutboundMessage::StateUpdate { state: board };
        match message.to_json() {
            Ok(json) => self.broadcast(&json),
            Err(e) => {
                error!(error = %e, "Failed to serialize state snapshot");
                0
            }
        }
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new(crate::config::defaults::CLIENT_BUFFER)
    }
}
