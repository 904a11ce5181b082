//! Approval and deletion lifecycle of a single comment.

use serde::{Deserialize, Serialize};

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this comment?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Body of `PUT /api/comments/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationRequest {
    pub action: ModerationAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationState {
    Pending,
    Approved,
}

impl ModerationState {
    pub fn from_approved(approved: bool) -> Self {
        if approved { Self::Approved } else { Self::Pending }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Both actions are idempotent.
    pub fn apply(self, action: ModerationAction) -> Self {
        match action {
            ModerationAction::Approve => Self::Approved,
            ModerationAction::Reject => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationCommand {
    Moderate(ModerationAction),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live(ModerationState),
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModerationError {
    #[error("Comment has been deleted")]
    Deleted,
}

impl Lifecycle {
    pub fn transition(self, command: ModerationCommand) -> Result<Self, ModerationError> {
        match (self, command) {
            (Self::Deleted, _) => Err(ModerationError::Deleted),
            (Self::Live(state), ModerationCommand::Moderate(action)) => {
                Ok(Self::Live(state.apply(action)))
            }
            (Self::Live(_), ModerationCommand::Delete) => Ok(Self::Deleted),
        }
    }
}

/// Answer to `DELETE_PROMPT`. Nothing is sent unless the admin confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteConfirmation {
    Confirmed,
    Declined,
}

impl From<bool> for DeleteConfirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed { Self::Confirmed } else { Self::Declined }
    }
}
