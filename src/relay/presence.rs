use tracing::debug;

use crate::models::SendMessage;
use super::registry::SessionRegistry;

/// Presence message for a session of `count` peers.
pub fn presence_message(count: usize) -> SendMessage {
    SendMessage::collaborators(count)
}

/// Push the current count of `note_id` to every member, the newest one included.
/// Returns how many peers were reached; an absent session reaches nobody.
pub fn broadcast_presence(registry: &SessionRegistry, note_id: &str) -> usize {
    let count = registry.count(note_id);
    if count == 0 {
        return 0;
    }

    let frame = presence_message(count).to_text();
    let mut delivered = 0;
    for (peer, sender) in registry.members(note_id) {
        if sender.send(frame.clone()).is_ok() {
            delivered += 1;
        } else {
            debug!("Skipping presence for closed peer {}", peer);
        }
    }
    debug!("Presence for note {:?}: {} collaborators", note_id, count);
    delivered
}
