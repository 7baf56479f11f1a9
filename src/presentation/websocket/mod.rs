//! WebSocket Gateway
//!
//! Real-time delivery of messages, typing indicators, read receipts and
//! presence to connected clients.

pub mod broker;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;
pub mod typing;

pub use broker::{Audience, RoomBroker};
pub use handler::ws_handler;
pub use messages::{ClientFrame, Outbound, ServerFrame, TypingEvent};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, LiveConnection};
pub use session::GatewayState;
pub use typing::{TypingStopped, TypingTracker};
