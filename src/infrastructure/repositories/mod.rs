//! Repository Implementations
//!
//! Concrete implementations of the repository traits defined in the domain
//! layer.
//!
//! ## Available Repositories
//!
//! - **PgRoomRepository** - Direct rooms, participants and read cursors
//! - **PgMessageRepository** - Per-room ordered message log
//! - **PgPresenceRepository** - Last known online state per user
//! - **PgUserDirectory** - Read-only user profiles
//! - **InMemoryChatStore** - All of the above, held in process memory
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgMessageRepository, PgRoomRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let room_repo = PgRoomRepository::new(pool.clone());
//!     let message_repo = PgMessageRepository::new(pool.clone());
//! }
//! ```

pub mod memory;
pub mod message_repository;
pub mod presence_repository;
pub mod room_repository;
pub mod user_repository;

pub use memory::InMemoryChatStore;
pub use message_repository::PgMessageRepository;
pub use presence_repository::PgPresenceRepository;
pub use room_repository::PgRoomRepository;
pub use user_repository::PgUserDirectory;
