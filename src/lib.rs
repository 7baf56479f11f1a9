//! # Chat Engine Library
//!
//! Real-time direct messaging over WebSocket with:
//! - direct (1:1) rooms with an ordered, paginated message log
//! - attachments validated and written to an object store
//! - typing indicators, presence and read receipts
//! - a request/response HTTP API over the same services
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities and repository traits
//! - **Application Layer**: services (auth, rooms, messages, presence, attachments) and DTOs
//! - **Infrastructure Layer**: PostgreSQL and in-memory repositories, object storage, metrics
//! - **Presentation Layer**: HTTP handlers and the WebSocket gateway
//!
//! ```text
//! chat_engine/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, repository traits
//! +-- application/    Services and DTOs
//! +-- infrastructure/ Database, storage and metrics
//! +-- presentation/   HTTP routes, middleware, WebSocket gateway
//! +-- shared/         Errors, snowflake IDs, validation helpers
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
