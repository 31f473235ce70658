//! Sync session state machine.
//!
//! A session walks a fixed graph from `Idle` to a terminal state:
//!
//! ```text
//! Idle -> ComputingDiff -> RequestingMetadata -> TransferringFiles
//! TransferringFiles -> ResolvingConflicts | ApplyingChanges | Complete
//! ResolvingConflicts -> ApplyingChanges | Complete
//! ApplyingChanges -> Complete
//! any non-terminal -> Failed
//! ```
//!
//! Re-entering the current state is a no-op; every other transition is
//! rejected without changing state.

use std::fmt;
use std::time::{Instant, SystemTime};

use driftsync_core::{Result, SyncError};

/// Phase of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    ComputingDiff,
    RequestingMetadata,
    TransferringFiles,
    ResolvingConflicts,
    ApplyingChanges,
    Complete,
    Failed,
}

impl SessionState {
    /// Whether the session can make no further progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ComputingDiff => "computing-diff",
            Self::RequestingMetadata => "requesting-metadata",
            Self::TransferringFiles => "transferring-files",
            Self::ResolvingConflicts => "resolving-conflicts",
            Self::ApplyingChanges => "applying-changes",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Forward edges of the state graph, `Failed` escapes excluded.
fn is_progressive(current: SessionState, target: SessionState) -> bool {
    use SessionState::{
        ApplyingChanges, Complete, ComputingDiff, Idle, RequestingMetadata, ResolvingConflicts,
        TransferringFiles,
    };

    matches!(
        (current, target),
        (Idle, ComputingDiff)
            | (ComputingDiff, RequestingMetadata)
            | (RequestingMetadata, TransferringFiles)
            | (TransferringFiles, ResolvingConflicts | ApplyingChanges | Complete)
            | (ResolvingConflicts, ApplyingChanges | Complete)
            | (ApplyingChanges, Complete)
    )
}

/// Point-in-time summary of a session, safe to hand out by value.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub client_id: String,
    pub started_at: SystemTime,
    pub state: SessionState,
    pub files_pending: usize,
    pub bytes_pending: u64,
    /// Populated when `state == Failed`.
    pub last_error: String,
}

/// One client's sync exchange, tracked through the state graph.
#[derive(Debug)]
pub struct SyncSession {
    info: SessionInfo,
    last_transition: Instant,
}

impl SyncSession {
    #[must_use]
    pub fn new(session_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            info: SessionInfo {
                session_id: session_id.into(),
                client_id: client_id.into(),
                started_at: SystemTime::now(),
                state: SessionState::Idle,
                files_pending: 0,
                bytes_pending: 0,
                last_error: String::new(),
            },
            last_transition: Instant::now(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.info.client_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.info.state
    }

    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// When the session last changed state.
    #[must_use]
    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    /// Begin the exchange: requires `Idle`, stamps `started_at`, and moves
    /// to `ComputingDiff`.
    ///
    /// # Errors
    /// Returns a state error if the session already started.
    pub fn start(&mut self, files_pending: usize, bytes_pending: u64) -> Result<()> {
        if self.info.state != SessionState::Idle {
            return Err(SyncError::State(format!(
                "session {} already started",
                self.info.session_id
            )));
        }
        self.info.started_at = SystemTime::now();
        self.info.files_pending = files_pending;
        self.info.bytes_pending = bytes_pending;
        self.transition_to(SessionState::ComputingDiff)
    }

    /// Move to `next`. Re-entering the current state is a no-op `Ok`.
    ///
    /// # Errors
    /// Returns a state error for any edge not in the graph; the state is
    /// left unchanged.
    pub fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if self.info.state == next {
            return Ok(());
        }
        if !self.can_transition(next) {
            return Err(SyncError::State(format!(
                "session {}: {} -> {} is not allowed",
                self.info.session_id, self.info.state, next
            )));
        }

        self.info.state = next;
        self.last_transition = Instant::now();
        if next != SessionState::Failed {
            self.info.last_error.clear();
        }
        Ok(())
    }

    /// Record `error` and move to `Failed`.
    ///
    /// # Errors
    /// Returns a state error if the session is already `Complete`.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.info.last_error = error.into();
        self.transition_to(SessionState::Failed)
    }

    /// Refresh the pending counters shown in [`SessionInfo`].
    pub fn update_pending(&mut self, files_pending: usize, bytes_pending: u64) {
        self.info.files_pending = files_pending;
        self.info.bytes_pending = bytes_pending;
    }

    fn can_transition(&self, target: SessionState) -> bool {
        if self.info.state.is_terminal() {
            return false;
        }
        if target == SessionState::Failed {
            return true;
        }
        is_progressive(self.info.state, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> SyncSession {
        let mut session = SyncSession::new("session-1", "client-1");
        session.start(3, 300).unwrap();
        session
    }

    #[test]
    fn start_moves_idle_to_computing_diff() {
        let session = started();
        assert_eq!(session.state(), SessionState::ComputingDiff);
        assert_eq!(session.info().files_pending, 3);
        assert_eq!(session.info().bytes_pending, 300);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut session = started();
        assert!(matches!(session.start(0, 0), Err(SyncError::State(_))));
    }

    #[test]
    fn happy_path_walks_the_graph() {
        let mut session = started();
        for next in [
            SessionState::RequestingMetadata,
            SessionState::TransferringFiles,
            SessionState::ResolvingConflicts,
            SessionState::ApplyingChanges,
            SessionState::Complete,
        ] {
            session.transition_to(next).unwrap();
            assert_eq!(session.state(), next);
        }
        assert!(session.state().is_terminal());
    }

    #[test]
    fn transfer_can_skip_straight_to_complete() {
        let mut session = started();
        session
            .transition_to(SessionState::RequestingMetadata)
            .unwrap();
        session
            .transition_to(SessionState::TransferringFiles)
            .unwrap();
        session.transition_to(SessionState::Complete).unwrap();
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut session = started();
        let before = session.state();
        assert!(session.transition_to(SessionState::Complete).is_err());
        assert_eq!(session.state(), before);
    }

    #[test]
    fn self_transition_is_a_noop() {
        let mut session = started();
        session.transition_to(SessionState::ComputingDiff).unwrap();
        assert_eq!(session.state(), SessionState::ComputingDiff);
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_state() {
        let mut session = started();
        session.mark_failed("disk full").unwrap();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.info().last_error, "disk full");
    }

    #[test]
    fn terminal_states_admit_nothing() {
        let mut session = started();
        session
            .transition_to(SessionState::RequestingMetadata)
            .unwrap();
        session
            .transition_to(SessionState::TransferringFiles)
            .unwrap();
        session.transition_to(SessionState::Complete).unwrap();

        assert!(session.transition_to(SessionState::Idle).is_err());
        assert!(session.mark_failed("too late").is_err());
        assert_eq!(session.state(), SessionState::Complete);
    }

    #[test]
    fn successful_transition_clears_last_error() {
        let mut session = started();
        session.info.last_error = "stale".to_string();
        session
            .transition_to(SessionState::RequestingMetadata)
            .unwrap();
        assert!(session.info().last_error.is_empty());
    }
}
