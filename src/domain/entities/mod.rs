//! # Domain Entities
//!
//! Core domain entities of the chat engine. All entities map directly to
//! their corresponding database tables.
//!
//! - **ChatRoom** / **Participant**: a direct conversation and its two members
//! - **Message**: an entry in a room's ordered log, with attachments
//! - **PresenceRecord**: a user's online state
//! - **UserProfile**: read-only view of an account owned by the identity service
//!
//! Each entity has an associated repository trait defining data access
//! operations, implemented in the infrastructure layer.

mod message;
mod presence;
mod room;
mod user;

pub use message::{AttachmentDescriptor, Message, MessageRepository, MessageType, NewMessage};
pub use presence::{PresenceRecord, PresenceRepository};
#[cfg(test)]
pub use presence::MockPresenceRepository;
pub use room::{ChatRoom, Participant, RoomKind, RoomRepository};
pub use user::{UserDirectory, UserProfile};
