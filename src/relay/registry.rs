use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identity of one relay connection
pub type PeerId = Uuid;

/// Outbound queue of a peer. Text frames pushed here are written to its socket.
pub type PeerSender = mpsc::UnboundedSender<String>;

/// Session state right after a membership change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    pub note_id: String,
    pub count: usize,
}

/// Note id -> connected peers, plus the reverse peer -> note id association.
///
/// A session exists only while it has at least one peer. The registry is
/// owned by a single dispatcher task, so it needs no locking.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, HashMap<PeerId, PeerSender>>,
    memberships: HashMap<PeerId, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` under `note_id`, creating the session when absent.
    ///
    /// The note id is not validated; any string, including the empty one,
    /// groups peers. A peer already joined elsewhere is moved.
    pub fn join(&mut self, note_id: &str, peer: PeerId, sender: PeerSender) -> SessionHandle {
        if let Some(previous) = self.memberships.get(&peer).cloned() {
            if previous != note_id {
                self.leave(&previous, peer);
            }
        }

        let peers = self.sessions.entry(note_id.to_string()).or_insert_with(|| {
            debug!("Session created for note {:?}", note_id);
            HashMap::new()
        });
        peers.insert(peer, sender);
        let count = peers.len();
        self.memberships.insert(peer, note_id.to_string());

        SessionHandle {
            note_id: note_id.to_string(),
            count,
        }
    }

    /// Remove `peer` from `note_id`. Returns the remaining count, or `None`
    /// when the peer was not a member. An emptied session is deleted.
    pub fn leave(&mut self, note_id: &str, peer: PeerId) -> Option<usize> {
        let peers = self.sessions.get_mut(note_id)?;
        peers.remove(&peer)?;
        let remaining = peers.len();
        if remaining == 0 {
            self.sessions.remove(note_id);
            debug!("Session removed for note {:?}", note_id);
        }
        if self.memberships.get(&peer).is_some_and(|n| n == note_id) {
            self.memberships.remove(&peer);
        }
        Some(remaining)
    }

    /// Leave whatever session `peer` belongs to. Repeated calls are no-ops.
    pub fn disconnect(&mut self, peer: PeerId) -> Option<SessionHandle> {
        let note_id = self.memberships.get(&peer)?.clone();
        let count = self.leave(&note_id, peer)?;
        Some(SessionHandle { note_id, count })
    }

    pub fn session_of(&self, peer: PeerId) -> Option<&str> {
        self.memberships.get(&peer).map(String::as_str)
    }

    /// Every current member of `note_id` except `peer`.
    pub fn peers_except(&self, note_id: &str, peer: PeerId) -> impl Iterator<Item = (PeerId, &PeerSender)> {
        self.members(note_id).filter(move |(id, _)| *id != peer)
    }

    pub fn members(&self, note_id: &str) -> impl Iterator<Item = (PeerId, &PeerSender)> {
        self.sessions
            .get(note_id)
            .into_iter()
            .flat_map(|peers| peers.iter().map(|(id, sender)| (*id, sender)))
    }

    pub fn count(&self, note_id: &str) -> usize {
        self.sessions.get(note_id).map_or(0, HashMap::len)
    }

    pub fn contains(&self, note_id: &str) -> bool {
        self.sessions.contains_key(note_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn peer_count(&self) -> usize {
        self.memberships.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (PeerId, PeerSender, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    #[test]
    fn join_creates_session_lazily() {
        let mut registry = SessionRegistry::new();
        assert!(!registry.contains("42"));

        let (a, tx, _rx) = peer();
        let handle = registry.join("42", a, tx);
        assert_eq!(handle, SessionHandle { note_id: "42".to_string(), count: 1 });
        assert!(registry.contains("42"));
        assert_eq!(registry.session_of(a), Some("42"));
    }

    #[test]
    fn counts_follow_joins_and_leaves() {
        let mut registry = SessionRegistry::new();
        let (a, tx_a, _ra) = peer();
        let (b, tx_b, _rb) = peer();
        let (c, tx_c, _rc) = peer();

        registry.join("n", a, tx_a);
        registry.join("n", b, tx_b);
        assert_eq!(registry.join("n", c, tx_c).count, 3);

        assert_eq!(registry.leave("n", b), Some(2));
        assert_eq!(registry.count("n"), 2);
        assert_eq!(registry.leave("n", a), Some(1));
        assert_eq!(registry.leave("n", c), Some(0));
        assert_eq!(registry.count("n"), 0);
        assert!(!registry.contains("n"));
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.peer_count(), 0);
    }

    #[test]
    fn leaving_twice_or_as_non_member_is_a_noop() {
        let mut registry = SessionRegistry::new();
        let (a, tx_a, _ra) = peer();
        let (b, tx_b, _rb) = peer();
        registry.join("n", a, tx_a);
        registry.join("n", b, tx_b);

        assert_eq!(registry.disconnect(a), Some(SessionHandle { note_id: "n".to_string(), count: 1 }));
        assert_eq!(registry.disconnect(a), None);
        assert_eq!(registry.leave("n", a), None);
        assert_eq!(registry.leave("other", b), None);
        assert_eq!(registry.count("n"), 1);
    }

    #[test]
    fn peers_except_skips_the_sender() {
        let mut registry = SessionRegistry::new();
        let (a, tx_a, _ra) = peer();
        let (b, tx_b, _rb) = peer();
        let (c, tx_c, _rc) = peer();
        registry.join("n", a, tx_a);
        registry.join("n", b, tx_b);
        registry.join("other", c, tx_c);

        let others: Vec<PeerId> = registry.peers_except("n", a).map(|(id, _)| id).collect();
        assert_eq!(others, vec![b]);
        assert_eq!(registry.peers_except("missing", a).count(), 0);
    }

    #[test]
    fn empty_note_id_still_groups_peers() {
        let mut registry = SessionRegistry::new();
        let (a, tx_a, _ra) = peer();
        let (b, tx_b, _rb) = peer();
        registry.join("", a, tx_a);
        assert_eq!(registry.join("", b, tx_b).count, 2);
    }

    #[test]
    fn rejoining_elsewhere_moves_the_peer() {
        let mut registry = SessionRegistry::new();
        let (a, tx_a, _ra) = peer();
        registry.join("1", a, tx_a.clone());
        registry.join("2", a, tx_a);
        assert!(!registry.contains("1"));
        assert_eq!(registry.count("2"), 1);
        assert_eq!(registry.peer_count(), 1);
    }

    #[test]
    fn session_absent_iff_count_zero() {
        let mut registry = SessionRegistry::new();
        let peers: Vec<_> = (0..5).map(|_| peer()).collect();
        for (id, tx, _) in &peers {
            registry.join("s", *id, tx.clone());
        }
        for (i, (id, _, _)) in peers.iter().enumerate() {
            registry.disconnect(*id);
            let expected = peers.len() - i - 1;
            assert_eq!(registry.count("s"), expected);
            assert_eq!(registry.contains("s"), expected > 0);
        }
    }
}
