use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::ReceivedMessage;
use super::presence::broadcast_presence;
use super::registry::{PeerId, PeerSender, SessionRegistry};

/// Connection lifecycle and traffic, in the order the connections produced it.
#[derive(Debug)]
pub enum RelayEvent {
    Open {
        peer: PeerId,
        note_id: String,
        outbound: PeerSender,
    },
    Frame {
        peer: PeerId,
        text: String,
    },
    Close {
        peer: PeerId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub sessions: usize,
    pub peers: usize,
}

/// Cheap handle used by connection tasks to feed the dispatcher.
///
/// Every method returns `false` once the dispatcher has stopped.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayHandle {
    pub fn open(&self, peer: PeerId, note_id: String, outbound: PeerSender) -> bool {
        self.tx.send(RelayEvent::Open { peer, note_id, outbound }).is_ok()
    }

    pub fn frame(&self, peer: PeerId, text: String) -> bool {
        self.tx.send(RelayEvent::Frame { peer, text }).is_ok()
    }

    pub fn close(&self, peer: PeerId) -> bool {
        self.tx.send(RelayEvent::Close { peer }).is_ok()
    }

    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RelayEvent::Stats { reply }).ok()?;
        rx.await.ok()
    }
}

/// Owns the session registry and applies relay events one at a time.
pub struct RelayDispatcher {
    registry: SessionRegistry,
}

impl RelayDispatcher {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Start the dispatcher task. It runs until every handle is dropped and
    /// hands the registry back when it stops.
    pub fn spawn(registry: SessionRegistry) -> (RelayHandle, JoinHandle<SessionRegistry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self::new(registry);
        let task = tokio::spawn(dispatcher.run(rx));
        (RelayHandle { tx }, task)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RelayEvent>) -> SessionRegistry {
        info!("Relay dispatcher started");
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        info!(
            "Relay dispatcher stopped with {} sessions, {} peers",
            self.registry.session_count(),
            self.registry.peer_count()
        );
        self.registry
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Open { peer, note_id, outbound } => self.on_open(peer, &note_id, outbound),
            RelayEvent::Frame { peer, text } => {
                self.on_frame(peer, text);
            }
            RelayEvent::Close { peer } => self.on_close(peer),
            RelayEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            sessions: self.registry.session_count(),
            peers: self.registry.peer_count(),
        }
    }

    fn on_open(&mut self, peer: PeerId, note_id: &str, outbound: PeerSender) {
        let session = self.registry.join(note_id, peer, outbound);
        info!("Peer {} joined note {:?} ({} collaborators)", peer, note_id, session.count);
        broadcast_presence(&self.registry, note_id);
    }

    /// Relay an edit to the sender's siblings. Returns how many peers got it.
    fn on_frame(&mut self, peer: PeerId, text: String) -> usize {
        let Some(note_id) = self.registry.session_of(peer) else {
            debug!("Dropping frame from peer {} outside any session", peer);
            return 0;
        };

        let edit = match ReceivedMessage::parse(&text) {
            Ok(edit) => edit,
            Err(e) => {
                warn!("Dropping malformed frame from peer {} on note {:?}: {}", peer, note_id, e);
                return 0;
            }
        };
        debug!("Relaying {} edit from peer {} on note {:?}", edit.field(), peer, note_id);

        let mut delivered = 0;
        for (target, sender) in self.registry.peers_except(note_id, peer) {
            if sender.send(text.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!("Skipping closed peer {}", target);
            }
        }
        delivered
    }

    fn on_close(&mut self, peer: PeerId) {
        let Some(session) = self.registry.disconnect(peer) else {
            debug!("Peer {} already left", peer);
            return;
        };
        info!("Peer {} left note {:?} ({} collaborators)", peer, session.note_id, session.count);
        if session.count > 0 {
            broadcast_presence(&self.registry, &session.note_id);
        }
    }
}
