//! WebSocket Session State

/// Lifecycle of one gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Connecting,
    Authenticated,
    Joined(i64),
    Closed,
}

impl GatewayState {
    pub fn authenticated(self) -> Self {
        match self {
            GatewayState::Connecting => GatewayState::Authenticated,
            other => other,
        }
    }

    /// Join a room, switching away from any current one.
    pub fn join(self, room_id: i64) -> Self {
        match self {
            GatewayState::Authenticated | GatewayState::Joined(_) => GatewayState::Joined(room_id),
            other => other,
        }
    }

    pub fn leave(self) -> Self {
        match self {
            GatewayState::Joined(_) => GatewayState::Authenticated,
            other => other,
        }
    }

    pub fn close(self) -> Self {
        GatewayState::Closed
    }

    pub fn current_room(&self) -> Option<i64> {
        match self {
            GatewayState::Joined(room_id) => Some(*room_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, GatewayState::Authenticated | GatewayState::Joined(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let state = GatewayState::Connecting;
        assert!(!state.is_authenticated());
        assert_eq!(state.join(1), GatewayState::Connecting);

        let state = state.authenticated();
        assert!(state.is_authenticated());

        let state = state.join(1).join(2);
        assert_eq!(state.current_room(), Some(2));

        let state = state.leave();
        assert_eq!(state, GatewayState::Authenticated);
        assert_eq!(state.leave(), GatewayState::Authenticated);

        let state = state.join(3).close();
        assert_eq!(state, GatewayState::Closed);
        assert_eq!(state.authenticated().join(4), GatewayState::Closed);
    }
}
