use std::time::Duration;

use shared::error::GatewayError;
use thiserror::Error;

use crate::SessionStatus;

/// Errors surfaced by the public paginator API. Everything that happens after
/// a session is active is absorbed and logged instead.
#[derive(Debug, Error)]
pub enum PaginatorError {
    #[error("invalid paginator config: {0}")]
    InvalidConfig(String),
    #[error("paginator cannot start from status {0:?}")]
    NotPending(SessionStatus),
    #[error("failed to render page 1: {0}")]
    InitialContent(#[source] anyhow::Error),
    #[error("failed to post page 1: {0}")]
    InitialPost(#[source] GatewayError),
}

impl PaginatorError {
    /// The session never became active and no controls were left behind.
    pub fn is_fatal_construction(&self) -> bool {
        matches!(self, Self::InitialContent(_) | Self::InitialPost(_))
    }
}

/// A failed page render for an active session.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("content provider failed for page {page}: {source}")]
    Content { page: u32, source: anyhow::Error },
    #[error("edit failed for page {page}: {source}")]
    Edit { page: u32, source: GatewayError },
    #[error("render task for page {page} did not complete")]
    Aborted { page: u32 },
}

impl RenderError {
    pub fn page(&self) -> u32 {
        match self {
            Self::Content { page, .. } | Self::Edit { page, .. } | Self::Aborted { page } => *page,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Edit { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// The platform no longer has the message, so no later edit can land.
    pub fn is_message_lost(&self) -> bool {
        matches!(
            self,
            Self::Edit {
                source: GatewayError::MessageNotFound,
                ..
            }
        )
    }
}

/// Why an input event did not turn into a navigation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("user {0} may not control this session")]
    PermissionDenied(i64),
    #[error("input from bot user {0}")]
    BotUser(i64),
    #[error("session is {0:?}")]
    Inactive(SessionStatus),
    #[error("unknown control symbol")]
    UnknownSymbol,
    #[error("event belongs to another message")]
    OtherMessage,
}
