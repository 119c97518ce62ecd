//! Protocol layer: inbound and outbound event types
//!
//! Field names follow the logical wire contract (kebab-case event tags,
//! camelCase payload fields); serialization uses serde/JSON.

pub mod events;

pub use events::{
    ClientEvent, ErrorPayload, Message, MessageKind, OutboundEvent, ParticipantInfo, RoomId,
    RoomInfoPayload, RoomsListPayload, TypingUpdate,
};
