use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};

use futures_util::Stream;
use parking_lot::Mutex;

use crate::{events::ChatEvent, util::Id, UserData};

use super::RoomRegistry;

pub type ConnectionId = Id<Connection>;

/// A live gateway connection tracked by the registry.
///
/// State machine: a connection starts outside any room, enters one on join,
/// and is removed entirely on disconnect. It is in at most one room at a
/// time.
pub struct Connection {
    pub id: ConnectionId,
    pub user: UserData,
    /// The room this connection is currently in, if any
    pub room: Option<String>,
    pending: Arc<Mutex<VecDeque<ChatEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

/// The consuming side of a connection, streaming the events the registry
/// routed to it. Dropping the handle disconnects the connection.
pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending events
    pending: Arc<Mutex<VecDeque<ChatEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove the connection when dropped
    registry: Weak<RoomRegistry>,
}

impl Connection {
    pub(super) fn new(user: UserData) -> Self {
        Self {
            id: ConnectionId::new(),
            user,
            room: None,
            pending: Default::default(),
            waker: Default::default(),
        }
    }

    /// Queues an event for delivery and wakes the handle
    pub(super) fn send(&self, event: ChatEvent) {
        self.pending.lock().push_back(event);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    pub(super) fn handle(&self, registry: Weak<RoomRegistry>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending: self.pending.clone(),
            waker: self.waker.clone(),
            registry,
        }
    }
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Stream for ConnectionHandle {
    type Item = ChatEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending = self.pending.lock();

        match pending.pop_front() {
            Some(event) => Poll::Ready(Some(event)),
            None => {
                *self.waker.lock() = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.disconnect(self.id)
        }
    }
}
