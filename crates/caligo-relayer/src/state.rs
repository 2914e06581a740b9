//! request lifecycle state machine
//!
//! a relayed operation moves through
//! `prepared -> proving -> submitted -> {confirmed | failed}`.
//! transitions only move forward; `confirmed` and `failed` are
//! terminal. the tracker enforces legality so a caller cannot, say,
//! confirm a request it never submitted.

use serde::{Deserialize, Serialize};

use crate::error::{RelayerError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Prepared,
    Proving,
    Submitted,
    Confirmed,
    Failed,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RequestState::Prepared => "prepared",
            RequestState::Proving => "proving",
            RequestState::Submitted => "submitted",
            RequestState::Confirmed => "confirmed",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl RequestState {
    pub fn can_advance(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Prepared, Proving)
                | (Proving, Submitted)
                | (Proving, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Confirmed | RequestState::Failed)
    }
}

/// state holder for one relayed request
#[derive(Clone, Debug)]
pub struct RequestTracker {
    reference: String,
    state: RequestState,
}

impl RequestTracker {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            state: RequestState::Prepared,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    fn advance(&mut self, next: RequestState) -> Result<()> {
        if !self.state.can_advance(next) {
            return Err(RelayerError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn begin_proving(&mut self) -> Result<()> {
        self.advance(RequestState::Proving)
    }

    pub fn submitted(&mut self) -> Result<()> {
        self.advance(RequestState::Submitted)
    }

    pub fn confirmed(&mut self) -> Result<()> {
        self.advance(RequestState::Confirmed)
    }

    pub fn failed(&mut self) -> Result<()> {
        self.advance(RequestState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = RequestTracker::new("req-1");
        assert_eq!(tracker.state(), RequestState::Prepared);
        tracker.begin_proving().unwrap();
        tracker.submitted().unwrap();
        tracker.confirmed().unwrap();
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_failure_paths() {
        let mut tracker = RequestTracker::new("req-2");
        tracker.begin_proving().unwrap();
        tracker.failed().unwrap();
        assert_eq!(tracker.state(), RequestState::Failed);

        let mut tracker = RequestTracker::new("req-3");
        tracker.begin_proving().unwrap();
        tracker.submitted().unwrap();
        tracker.failed().unwrap();
        assert_eq!(tracker.state(), RequestState::Failed);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut tracker = RequestTracker::new("req-4");
        // cannot confirm straight out of prepared
        assert!(matches!(
            tracker.confirmed(),
            Err(RelayerError::IllegalTransition { .. })
        ));

        tracker.begin_proving().unwrap();
        tracker.submitted().unwrap();
        tracker.confirmed().unwrap();
        // terminal states never move
        assert!(tracker.failed().is_err());
        assert!(tracker.begin_proving().is_err());
    }
}
