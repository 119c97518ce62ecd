//! Server-side relay state and the protocol state machine
//!
//! Leaf-first: [`buffer`] holds a room's bounded message log, [`presence`]
//! owns per-connection participant state, [`rooms`] maps rooms to member
//! sets, and [`coordinator`] validates inbound events against both and
//! emits the fan-out.

pub mod buffer;
pub mod coordinator;
pub mod presence;
pub mod rooms;

pub use buffer::MessageBuffer;
pub use coordinator::SessionCoordinator;
pub use presence::{Participant, PresenceRegistry};
pub use rooms::RoomDirectory;
