//! Recording transport used by the engine's unit tests.

use parking_lot::Mutex;
use pagesync_core::{ServerMessage, SessionId};

use crate::outbound::Outbound;

#[derive(Default)]
pub struct RecordingOutbound {
    connected: Mutex<Vec<SessionId>>,
    sent: Mutex<Vec<(SessionId, ServerMessage)>>,
}

impl RecordingOutbound {
    pub fn connect(&self, id: SessionId) {
        self.connected.lock().push(id);
    }

    pub fn disconnect(&self, id: &SessionId) {
        self.connected.lock().retain(|c| c != id);
    }

    pub fn messages_for(&self, id: &SessionId) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<(SessionId, ServerMessage)> {
        self.sent.lock().clone()
    }
}

impl Outbound for RecordingOutbound {
    fn send_to(&self, session: &SessionId, message: &ServerMessage) -> bool {
        if !self.connected.lock().contains(session) {
            return false;
        }
        self.sent.lock().push((session.clone(), message.clone()));
        true
    }

    fn broadcast(&self, message: &ServerMessage) -> usize {
        let connected = self.connected.lock().clone();
        let mut sent = self.sent.lock();
        for id in &connected {
            sent.push((id.clone(), message.clone()));
        }
        connected.len()
    }
}
