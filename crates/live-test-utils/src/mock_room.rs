//! Mock managed-room SDK.
//!
//! [`MockRoomConnector`] accepts (or rejects) connections and keeps each
//! [`MockRoom`] so tests can push [`RoomEvent`]s into a running session.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use live_signaling::managed::{
    ConnectOptions, RemoteParticipant, Room, RoomConnector, RoomError, RoomEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

const EVENT_CAPACITY: usize = 64;

pub struct MockRoom {
    name: String,
    present: Vec<RemoteParticipant>,
    events: Mutex<Option<mpsc::Sender<RoomEvent>>>,
    disconnected: AtomicBool,
}

impl MockRoom {
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Push a room notification. Returns `false` after disconnect.
    pub async fn emit(&self, event: RoomEvent) -> bool {
        let tx = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Room for MockRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn participants(&self) -> Vec<RemoteParticipant> {
        self.present.clone()
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[derive(Default)]
pub struct MockRoomConnector {
    present: Vec<RemoteParticipant>,
    reject: Option<RoomError>,
    rooms: Mutex<Vec<Arc<MockRoom>>>,
    options: Mutex<Vec<ConnectOptions>>,
    tokens: Mutex<Vec<String>>,
}

impl MockRoomConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Participants already in the room when a session connects.
    #[must_use]
    pub fn with_participants(mut self, participants: Vec<RemoteParticipant>) -> Self {
        self.present = participants;
        self
    }

    #[must_use]
    pub fn rejecting(mut self, err: RoomError) -> Self {
        self.reject = Some(err);
        self
    }

    pub fn last_room(&self) -> Option<Arc<MockRoom>> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Options passed to each `connect`.
    pub fn options(&self) -> Vec<ConnectOptions> {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tokens presented to each `connect`, exposed for assertions.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RoomConnector for MockRoomConnector {
    async fn connect(
        &self,
        token: &SecretString,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Room>, mpsc::Receiver<RoomEvent>), RoomError> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.expose_secret().to_string());
        let name = options.room_name.clone();
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options);

        if let Some(err) = &self.reject {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let room = Arc::new(MockRoom {
            name,
            present: self.present.clone(),
            events: Mutex::new(Some(tx)),
            disconnected: AtomicBool::new(false),
        });
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&room));
        Ok((room, rx))
    }
}
