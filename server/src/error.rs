//! Reasons an inbound event is dropped without touching session state.
//!
//! None of these close a connection. The registry logs them and moves on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("unknown player {0}")]
    UnknownPlayer(String),

    #[error("stale collectible {claimed} (active is {active})")]
    StaleCollectible { claimed: String, active: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            Rejection::UnknownPlayer("p3".to_string()).to_string(),
            "unknown player p3"
        );
        assert_eq!(
            Rejection::StaleCollectible {
                claimed: "c1".to_string(),
                active: "c2".to_string(),
            }
            .to_string(),
            "stale collectible c1 (active is c2)"
        );
        assert!(Rejection::MalformedPayload("x is NaN".to_string())
            .to_string()
            .contains("x is NaN"));
    }
}
