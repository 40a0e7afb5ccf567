//! The endpoint registry (spec §6): tracks every connection currently open
//! on a server endpoint, keyed by connection id, so a caller can address an
//! individual connection or broadcast to all of them without threading its
//! own bookkeeping through every handler. Grounded in the teacher's `uuid`
//! per-connection id (`server.rs::generate_new_uuid`) generalized from a
//! single flat event channel into an addressable map, per the spec's
//! redesign away from one giant `Event` enum.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::Error;
use crate::message::{DataType, Message, OutboundCommand};

/// A cheap, cloneable reference to one open connection's command queue.
/// Dropping every clone does not close the connection — only an explicit
/// [`ConnectionHandle::close`] or the peer closing does.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<OutboundCommand>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: Uuid, tx: mpsc::Sender<OutboundCommand>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn send(&self, message: Message) -> Result<(), Error> {
        self.tx.send(OutboundCommand::Send(message)).await?;
        Ok(())
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.send(Message::Binary(data.into())).await
    }

    /// Starts a fragmented message: `fin` is always false on the first
    /// frame. Follow with one or more [`send_fragment_continuation`] calls,
    /// the last with `fin: true`.
    pub async fn send_fragment_start(&self, data_type: DataType, data: Vec<u8>) -> Result<(), Error> {
        self.tx
            .send(OutboundCommand::SendFragmentedStart(data_type, data))
            .await?;
        Ok(())
    }

    pub async fn send_fragment_continuation(&self, fin: bool, data: Vec<u8>) -> Result<(), Error> {
        self.tx
            .send(OutboundCommand::SendFragmentedCont { fin, data })
            .await?;
        Ok(())
    }

    pub async fn ping(&self, data: Vec<u8>) -> Result<(), Error> {
        self.tx.send(OutboundCommand::Ping(data)).await?;
        Ok(())
    }

    /// Requests a close with the given code. This is cooperative (spec §5):
    /// it enqueues a command the connection's own task observes on its next
    /// loop iteration, rather than forcing the socket shut from here.
    pub async fn close(&self, code: u16) -> Result<(), Error> {
        self.tx.send(OutboundCommand::Close(code)).await?;
        Ok(())
    }
}

/// Tracks every connection currently open on one server endpoint.
#[derive(Clone, Default)]
pub struct Registry {
    connections: Arc<Mutex<HashMap<Uuid, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, handle: ConnectionHandle) {
        self.connections.lock().await.insert(handle.id(), handle);
    }

    pub(crate) async fn remove(&self, id: Uuid) {
        self.connections.lock().await.remove(&id);
    }

    pub async fn get(&self, id: Uuid) -> Option<ConnectionHandle> {
        self.connections.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Sends `message` to every connection currently registered. Individual
    /// send failures (a connection that raced ahead and closed) are
    /// swallowed — broadcast is best-effort by nature.
    pub async fn broadcast(&self, message: Message) {
        for handle in self.handles().await {
            let _ = handle.send(message.clone()).await;
        }
    }
}
