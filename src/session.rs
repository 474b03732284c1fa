//! Per-connection lifecycle state machine.
//!
//! A connection starts unbound, becomes bound when a join succeeds, and ends
//! closed. Closed is terminal; [`SessionState::close`] reports whether this
//! call was the one that performed the transition, so cleanup runs exactly
//! once no matter how many paths reach it.

use crate::identity::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted but not yet joined. Only a join intent is honored here.
    Unbound,
    /// Joined as `identity`; messages flow in both directions.
    Bound { identity: Identity },
    /// Terminal. Nothing is accepted or delivered.
    Closed,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::Unbound
    }

    /// Bind to `identity`. Rebinding an already-bound session is allowed and
    /// replaces the identity. Returns false if the session is closed.
    pub fn bind(&mut self, identity: Identity) -> bool {
        match self {
            SessionState::Closed => false,
            _ => {
                *self = SessionState::Bound { identity };
                true
            }
        }
    }

    /// Transition to closed. Returns true only for the call that actually
    /// closed the session.
    pub fn close(&mut self) -> bool {
        if matches!(self, SessionState::Closed) {
            return false;
        }
        *self = SessionState::Closed;
        true
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Bound { identity } => Some(identity),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, SessionState::Bound { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unbound() {
        let state = SessionState::new();
        assert!(!state.is_bound());
        assert!(!state.is_closed());
        assert!(state.identity().is_none());
    }

    #[test]
    fn test_bind_from_unbound() {
        let mut state = SessionState::new();
        assert!(state.bind(Identity::customer(42)));
        assert_eq!(state.identity(), Some(&Identity::customer(42)));
    }

    #[test]
    fn test_rebind_replaces_identity() {
        let mut state = SessionState::new();
        state.bind(Identity::customer(42));
        assert!(state.bind(Identity::vendor(7)));
        assert_eq!(state.identity(), Some(&Identity::vendor(7)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut state = SessionState::new();
        state.bind(Identity::customer(42));
        assert!(state.close());
        assert!(!state.close());
        assert!(state.is_closed());
    }

    #[test]
    fn test_close_from_unbound() {
        let mut state = SessionState::new();
        assert!(state.close());
        assert!(!state.close());
    }

    #[test]
    fn test_bind_after_close_refused() {
        let mut state = SessionState::new();
        state.close();
        assert!(!state.bind(Identity::customer(1)));
        assert!(state.identity().is_none());
        assert!(state.is_closed());
    }
}
