//! Protocol states and outcomes.

use std::fmt;
use tracing::{info, warn};

/// Where an asset is in the publish workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Requested,
    Uploading,
    Processing,
    Ready,
    Failed,
    TimedOut,
}

impl PublishState {
    /// Whether no further transition can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "REQUESTED",
            Self::Uploading => "UPLOADING",
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// Result of one status read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<R> {
    /// Still processing; carries the remote status label.
    Pending(String),
    /// Processing finished.
    Ready(R),
    /// The remote reported an explicit error.
    Failed(String),
}

/// Terminal result of [`super::PublishProtocol::drive`].
#[derive(Debug)]
pub enum PublishOutcome<O> {
    /// Finalized successfully.
    Published { output: O, polls: u32 },
    /// Gave up; `state` is the stage that failed.
    Failed { state: PublishState, reason: String },
    /// Poll budget exhausted.
    TimedOut { polls: u32 },
}

impl<O> PublishOutcome<O> {
    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> PublishState {
        match self {
            Self::Published { .. } => PublishState::Ready,
            Self::Failed { .. } => PublishState::Failed,
            Self::TimedOut { .. } => PublishState::TimedOut,
        }
    }

    /// Log the outcome and keep only a successful output.
    pub fn into_option(self, service: &str) -> Option<O> {
        match self {
            Self::Published { output, polls } => {
                info!(service, polls, "Publish complete");
                Some(output)
            }
            Self::Failed { state, reason } => {
                warn!(service, failed_in = %state, reason = %reason, "Publish failed");
                None
            }
            Self::TimedOut { polls } => {
                warn!(service, polls, "Publish timed out waiting for readiness");
                None
            }
        }
    }
}
