mod connection;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};

use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

pub use connection::*;

use crate::{ChatEvent, Database, DatabaseError, MessageData, NewMessage, UserData};

/// Tracks live connections, their room membership, and routes room traffic.
///
/// Rooms are not persisted anywhere, they exist in here for as long as they
/// have members. All access goes through the two mutexes, locked in
/// connections-then-rooms order.
pub struct RoomRegistry {
    me: Weak<RoomRegistry>,
    database: Arc<dyn Database>,

    connections: Mutex<HashMap<ConnectionId, Connection>>,
    rooms: Mutex<HashMap<String, RoomState>>,
}

/// Transient per-room state
#[derive(Default)]
struct RoomState {
    members: HashSet<ConnectionId>,
    /// Usernames currently typing in this room
    typing: HashSet<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Connection does not exist")]
    UnknownConnection,
    #[error("Connection is not in a room")]
    NotInRoom,
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl RoomRegistry {
    pub fn new(database: &Arc<dyn Database>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            database: database.clone(),
            connections: Default::default(),
            rooms: Default::default(),
        })
    }

    /// Registers a new connection for a user, returning the handle its
    /// gateway task consumes events from
    pub fn connect(&self, user: UserData) -> ConnectionHandle {
        let connection = Connection::new(user);
        let handle = connection.handle(self.me.clone());

        info!("{} connected to the gateway", connection.user.username);
        self.connections.lock().insert(connection.id, connection);

        handle
    }

    /// Puts a connection in a room. A connection is in at most one room, so
    /// entering a new room leaves the previous one first.
    pub fn join(&self, id: ConnectionId, room: &str) {
        let mut connections = self.connections.lock();
        let mut rooms = self.rooms.lock();

        let (username, previous) = {
            let Some(connection) = connections.get_mut(&id) else {
                warn!("Join from unknown connection {id}");
                return;
            };

            if connection.room.as_deref() == Some(room) {
                return;
            }

            (
                connection.user.username.clone(),
                connection.room.replace(room.to_string()),
            )
        };

        if let Some(previous) = previous {
            Self::remove_member(&connections, &mut rooms, id, &previous, &username);
        }

        rooms.entry(room.to_string()).or_default().members.insert(id);
        info!("{username} joined room {room}");
    }

    /// Takes a connection out of a room. Does nothing if it isn't in it.
    pub fn leave(&self, id: ConnectionId, room: &str) {
        let mut connections = self.connections.lock();
        let mut rooms = self.rooms.lock();

        let username = {
            let Some(connection) = connections.get_mut(&id) else {
                return;
            };

            if connection.room.as_deref() != Some(room) {
                return;
            }

            connection.room = None;
            connection.user.username.clone()
        };

        Self::remove_member(&connections, &mut rooms, id, room, &username);
        info!("{username} left room {room}");
    }

    /// Updates the typing state of a connection's user and notifies the
    /// other members of its room. Fire-and-forget.
    pub fn set_typing(&self, id: ConnectionId, typing: bool) {
        let connections = self.connections.lock();
        let mut rooms = self.rooms.lock();

        let Some(connection) = connections.get(&id) else {
            return;
        };

        let Some(room) = connection.room.as_deref() else {
            warn!(
                "Typing event from {} outside of a room",
                connection.user.username
            );
            return;
        };

        let Some(state) = rooms.get_mut(room) else {
            return;
        };

        let username = &connection.user.username;

        let changed = if typing {
            state.typing.insert(username.clone())
        } else {
            state.typing.remove(username)
        };

        // Key repeats arrive faster than the idle timeout, don't echo them
        if !changed {
            return;
        }

        Self::broadcast(
            &connections,
            &state.members,
            Some(id),
            ChatEvent::TypingChanged {
                room: room.to_string(),
                users: state.typing.iter().cloned().collect(),
            },
        );
    }

    /// Persists a message sent by a connection, then relays it to every
    /// member of its room, the sender included. A message that fails to
    /// persist is never relayed.
    pub async fn send_message(
        &self,
        id: ConnectionId,
        text: String,
        nonce: Option<String>,
    ) -> Result<MessageData, RegistryError> {
        // Resolve the room and sender up front, persistence must not happen
        // under the registry locks
        let (room, sender) = {
            let connections = self.connections.lock();

            let connection = connections
                .get(&id)
                .ok_or(RegistryError::UnknownConnection)?;

            let room = connection.room.clone().ok_or(RegistryError::NotInRoom)?;
            (room, connection.user.clone())
        };

        let new_message = NewMessage {
            room: room.clone(),
            text,
            nonce,
            sender_id: sender.id,
            sent_at: Utc::now(),
        };

        let message = match self.database.create_message(new_message).await {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to persist message in {room}: {e}");
                return Err(e.into());
            }
        };

        let connections = self.connections.lock();
        let mut rooms = self.rooms.lock();

        if let Some(state) = rooms.get_mut(&room) {
            // Submitting a message ends the sender's typing state
            if state.typing.remove(&sender.username) {
                Self::broadcast(
                    &connections,
                    &state.members,
                    Some(id),
                    ChatEvent::TypingChanged {
                        room: room.clone(),
                        users: state.typing.iter().cloned().collect(),
                    },
                );
            }

            Self::broadcast(
                &connections,
                &state.members,
                None,
                ChatEvent::MessageSent {
                    message: message.clone(),
                },
            );
        }

        Ok(message)
    }

    /// Removes a connection from the registry and from the room it was in.
    /// Called when its [ConnectionHandle] is dropped.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut connections = self.connections.lock();
        let mut rooms = self.rooms.lock();

        let Some(connection) = connections.remove(&id) else {
            return;
        };

        if let Some(room) = connection.room.as_deref() {
            Self::remove_member(&connections, &mut rooms, id, room, &connection.user.username);
        }

        info!("{} disconnected from the gateway", connection.user.username);
    }

    /// Drops a member from a room, clearing its typing state and the room
    /// itself when it empties out
    fn remove_member(
        connections: &HashMap<ConnectionId, Connection>,
        rooms: &mut HashMap<String, RoomState>,
        id: ConnectionId,
        room: &str,
        username: &str,
    ) {
        let empty = {
            let Some(state) = rooms.get_mut(room) else {
                return;
            };

            state.members.remove(&id);

            if state.typing.remove(username) {
                Self::broadcast(
                    connections,
                    &state.members,
                    None,
                    ChatEvent::TypingChanged {
                        room: room.to_string(),
                        users: state.typing.iter().cloned().collect(),
                    },
                );
            }

            state.members.is_empty()
        };

        if empty {
            rooms.remove(room);
        }
    }

    /// Delivers an event to every member of a room, except the excluded
    /// connection if one is given
    fn broadcast(
        connections: &HashMap<ConnectionId, Connection>,
        members: &HashSet<ConnectionId>,
        exclude: Option<ConnectionId>,
        event: ChatEvent,
    ) {
        for member in members {
            if Some(*member) == exclude {
                continue;
            }

            if let Some(connection) = connections.get(member) {
                connection.send(event.clone())
            }
        }
    }

    #[cfg(test)]
    fn rooms_containing(&self, id: ConnectionId) -> Vec<String> {
        self.rooms
            .lock()
            .iter()
            .filter(|(_, state)| state.members.contains(&id))
            .map(|(room, _)| room.clone())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::NewUser;
    use futures_util::{FutureExt, StreamExt};

    async fn user(db: &Arc<dyn Database>, username: &str) -> UserData {
        db.create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "hash".to_string(),
        })
        .await
        .unwrap()
    }

    fn setup() -> (Arc<RoomRegistry>, Arc<dyn Database>, Arc<MemoryDatabase>) {
        let memory = Arc::new(MemoryDatabase::new());
        let db: Arc<dyn Database> = memory.clone();
        (RoomRegistry::new(&db), db, memory)
    }

    /// Polls the next event without waiting, None when nothing is queued
    fn poll(handle: &mut ConnectionHandle) -> Option<ChatEvent> {
        handle.next().now_or_never().flatten()
    }

    #[tokio::test]
    async fn messages_reach_the_room_and_only_the_room() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;
        let noah = user(&db, "noah").await;

        let sender = registry.connect(john);
        let mut peer = registry.connect(mary);
        let mut outsider = registry.connect(noah);

        registry.join(sender.id(), "general");
        registry.join(peer.id(), "general");
        registry.join(outsider.id(), "random");

        let sent = registry
            .send_message(sender.id(), "hi".to_string(), Some("n-1".to_string()))
            .await
            .unwrap();

        assert_eq!(sent.room, "general");
        assert_eq!(sent.text, "hi");
        assert_eq!(sent.nonce.as_deref(), Some("n-1"));

        let Some(ChatEvent::MessageSent { message }) = poll(&mut peer) else {
            panic!("peer did not receive the message");
        };

        assert_eq!(message.id, sent.id);
        assert_eq!(message.sender.username, "john");
        assert_eq!(message.nonce.as_deref(), Some("n-1"));

        assert!(poll(&mut outsider).is_none());

        // The sender gets the echo too, reconciliation is the client's job
        let mut sender = sender;
        let Some(ChatEvent::MessageSent { message }) = poll(&mut sender) else {
            panic!("sender did not receive the echo");
        };
        assert_eq!(message.nonce.as_deref(), Some("n-1"));

        // And it landed in history
        let history = db.recent_messages("general", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hi");
    }

    #[tokio::test]
    async fn leaving_stops_delivery() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let sender = registry.connect(john);
        let mut peer = registry.connect(mary);

        registry.join(sender.id(), "general");
        registry.join(peer.id(), "general");

        registry.leave(peer.id(), "general");

        registry
            .send_message(sender.id(), "anyone?".to_string(), None)
            .await
            .unwrap();

        registry.set_typing(sender.id(), true);

        assert!(poll(&mut peer).is_none());
    }

    #[tokio::test]
    async fn joining_a_new_room_leaves_the_previous_one() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let drifter = registry.connect(john);
        let mut stayer = registry.connect(mary);

        registry.join(drifter.id(), "general");
        registry.join(stayer.id(), "general");

        // No leave-room in between
        registry.join(drifter.id(), "random");

        assert_eq!(registry.rooms_containing(drifter.id()), vec!["random"]);

        registry
            .send_message(stayer.id(), "gone already".to_string(), None)
            .await
            .unwrap();

        let mut drifter = drifter;
        assert!(poll(&mut drifter).is_none());

        // The stayer still gets its own echo
        assert!(matches!(
            poll(&mut stayer),
            Some(ChatEvent::MessageSent { .. })
        ));
    }

    #[tokio::test]
    async fn disconnecting_removes_all_membership() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let sender = registry.connect(john);
        let peer = registry.connect(mary);
        let peer_id = peer.id();

        registry.join(sender.id(), "general");
        registry.join(peer_id, "general");

        drop(peer);

        assert!(registry.rooms_containing(peer_id).is_empty());

        registry
            .send_message(sender.id(), "still here?".to_string(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn typing_state_is_tracked_per_room() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let mut typist = registry.connect(john);
        let mut watcher = registry.connect(mary);

        registry.join(typist.id(), "general");
        registry.join(watcher.id(), "general");

        registry.set_typing(typist.id(), true);

        let Some(ChatEvent::TypingChanged { room, users }) = poll(&mut watcher) else {
            panic!("watcher did not receive the typing update");
        };

        assert_eq!(room, "general");
        assert_eq!(users, vec!["john".to_string()]);

        // The sender is not notified about itself
        assert!(poll(&mut typist).is_none());

        // Key repeats don't echo
        registry.set_typing(typist.id(), true);
        assert!(poll(&mut watcher).is_none());

        registry.set_typing(typist.id(), false);

        let Some(ChatEvent::TypingChanged { users, .. }) = poll(&mut watcher) else {
            panic!("watcher did not receive the stop update");
        };

        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn sending_a_message_ends_typing() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let typist = registry.connect(john);
        let mut watcher = registry.connect(mary);

        registry.join(typist.id(), "general");
        registry.join(watcher.id(), "general");

        registry.set_typing(typist.id(), true);
        let _ = poll(&mut watcher);

        registry
            .send_message(typist.id(), "done".to_string(), None)
            .await
            .unwrap();

        let Some(ChatEvent::TypingChanged { users, .. }) = poll(&mut watcher) else {
            panic!("watcher did not receive the stop update");
        };
        assert!(users.is_empty());

        assert!(matches!(
            poll(&mut watcher),
            Some(ChatEvent::MessageSent { .. })
        ));
    }

    #[tokio::test]
    async fn persistence_failure_suppresses_the_relay() {
        let (registry, db, memory) = setup();

        let john = user(&db, "john").await;
        let mary = user(&db, "mary").await;

        let sender = registry.connect(john);
        let mut peer = registry.connect(mary);

        registry.join(sender.id(), "general");
        registry.join(peer.id(), "general");

        memory.fail_message_writes(true);

        let result = registry
            .send_message(sender.id(), "lost".to_string(), None)
            .await;

        assert!(matches!(result, Err(RegistryError::Db(_))));
        assert!(poll(&mut peer).is_none());

        memory.fail_message_writes(false);

        registry
            .send_message(sender.id(), "found".to_string(), None)
            .await
            .unwrap();

        assert!(matches!(
            poll(&mut peer),
            Some(ChatEvent::MessageSent { .. })
        ));
    }

    #[tokio::test]
    async fn sending_outside_a_room_is_an_error() {
        let (registry, db, _) = setup();

        let john = user(&db, "john").await;
        let lonely = registry.connect(john);

        let result = registry
            .send_message(lonely.id(), "hello?".to_string(), None)
            .await;

        assert!(matches!(result, Err(RegistryError::NotInRoom)));
    }
}
