//! # Domain Layer
//!
//! Entities, value objects and repository contracts of the chat engine. It
//! is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: ChatRoom, Participant, Message, PresenceRecord, UserProfile
//! - **value_objects**: DirectPair
//!
//! Repository traits define data access contracts; the infrastructure layer
//! provides PostgreSQL and in-memory implementations.

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
