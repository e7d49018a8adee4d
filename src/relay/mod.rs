//! Server side of note collaboration: which peers edit which note, and
//! the single task that relays their edits and presence counts.

pub mod registry;
pub mod presence;
pub mod dispatcher;

pub use registry::{PeerId, PeerSender, SessionHandle, SessionRegistry};
pub use presence::{broadcast_presence, presence_message};
pub use dispatcher::{RelayDispatcher, RelayEvent, RelayHandle, RelayStats};
