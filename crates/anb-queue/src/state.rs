//! Per-consumer lifecycle.
//!
//! ```text
//! Idle ──► Claimed ──► Consuming ──► Closed
//!             ▲  │         │
//!             │  ▼         ▼
//!           Rebalancing ◄──┘
//! ```
//!
//! Every state may move to `Closed`; `Closed` is final.

use tracing::debug;

use crate::error::{QueueError, QueueResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerState {
    /// Joined nothing yet
    Idle,
    /// Owns partitions, nothing received since the last (re)assignment
    Claimed,
    /// Receiving messages
    Consuming,
    /// Partition ownership is changing
    Rebalancing,
    /// Left the group
    Closed,
}

impl ConsumerState {
    pub fn can_transition_to(&self, next: ConsumerState) -> bool {
        use ConsumerState::*;
        matches!(
            (self, next),
            (Idle, Claimed)
                | (Claimed, Consuming)
                | (Claimed, Rebalancing)
                | (Consuming, Rebalancing)
                | (Rebalancing, Claimed)
                | (Rebalancing, Idle)
                | (Idle | Claimed | Consuming | Rebalancing, Closed)
        )
    }
}

/// Tracks one consumer's state and rejects illegal moves.
#[derive(Debug)]
pub struct ConsumerStateMachine {
    state: ConsumerState,
}

impl Default for ConsumerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConsumerState::Idle,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn transition(&mut self, next: ConsumerState) -> QueueResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(QueueError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        debug!("Consumer state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Partitions were assigned.
    pub fn on_assigned(&mut self) -> QueueResult<()> {
        match self.state {
            ConsumerState::Idle | ConsumerState::Rebalancing => self.transition(ConsumerState::Claimed),
            ConsumerState::Claimed | ConsumerState::Consuming => {
                self.transition(ConsumerState::Rebalancing)?;
                self.transition(ConsumerState::Claimed)
            }
            ConsumerState::Closed => Err(QueueError::Closed),
        }
    }

    /// Partitions were revoked.
    pub fn on_revoked(&mut self) -> QueueResult<()> {
        match self.state {
            ConsumerState::Idle | ConsumerState::Rebalancing => Ok(()),
            ConsumerState::Claimed | ConsumerState::Consuming => {
                self.transition(ConsumerState::Rebalancing)
            }
            ConsumerState::Closed => Err(QueueError::Closed),
        }
    }

    /// A message arrived. Receiving one proves ownership of its partition.
    pub fn on_message(&mut self) -> QueueResult<()> {
        match self.state {
            ConsumerState::Consuming => Ok(()),
            ConsumerState::Claimed => self.transition(ConsumerState::Consuming),
            ConsumerState::Idle | ConsumerState::Rebalancing => {
                self.transition(ConsumerState::Claimed)?;
                self.transition(ConsumerState::Consuming)
            }
            ConsumerState::Closed => Err(QueueError::Closed),
        }
    }

    pub fn close(&mut self) {
        if self.state != ConsumerState::Closed {
            debug!("Consumer state {:?} -> Closed", self.state);
            self.state = ConsumerState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = ConsumerStateMachine::new();
        sm.on_assigned().unwrap();
        assert_eq!(sm.state(), ConsumerState::Claimed);
        sm.on_message().unwrap();
        sm.on_message().unwrap();
        assert_eq!(sm.state(), ConsumerState::Consuming);
        sm.on_revoked().unwrap();
        assert_eq!(sm.state(), ConsumerState::Rebalancing);
        sm.on_assigned().unwrap();
        assert_eq!(sm.state(), ConsumerState::Claimed);
        sm.close();
        assert_eq!(sm.state(), ConsumerState::Closed);
    }

    #[test]
    fn test_closed_is_final() {
        let mut sm = ConsumerStateMachine::new();
        sm.close();
        assert!(matches!(sm.on_message(), Err(QueueError::Closed)));
        assert!(sm.transition(ConsumerState::Claimed).is_err());
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!ConsumerState::Idle.can_transition_to(ConsumerState::Consuming));
        assert!(!ConsumerState::Consuming.can_transition_to(ConsumerState::Claimed));
        assert!(!ConsumerState::Closed.can_transition_to(ConsumerState::Idle));

        let mut sm = ConsumerStateMachine::new();
        let err = sm.transition(ConsumerState::Consuming).unwrap_err();
        assert!(err.to_string().contains("Idle -> Consuming"));
    }
}
