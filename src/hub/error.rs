//! Hub error types

use thiserror::Error;

/// Error type for hub operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Publish attempted by a session that is not (or no longer) active
    #[error("session {session_id} is not the active producer session (active: {active:?})")]
    StaleSession {
        /// Session that tried to publish
        session_id: u64,
        /// Session currently allowed to publish
        active: Option<u64>,
    },
}
