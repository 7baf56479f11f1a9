//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **AuthGate**: credential verification and user admission
//! - **RoomService**: direct rooms, membership and room summaries
//! - **MessageStore**: ordered message log, read cursors, edits and deletes
//! - **PresenceTracker**: online state and presence transitions
//! - **AttachmentResolver**: file validation and object storage

pub mod attachment_service;
pub mod auth_service;
pub mod message_service;
pub mod presence_service;
pub mod room_service;

pub use attachment_service::{
    AttachmentCategory, AttachmentResolver, FilePayload, ResolvedAttachment,
};
pub use auth_service::{AuthError, AuthGate, Claims, IdentityProvider, JwtIdentityProvider};
pub use message_service::{MessageDraft, MessageStore, SendRequest};
pub use presence_service::{PresenceChanged, PresenceStatus, PresenceTracker};
pub use room_service::RoomService;
