use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{ChannelId, MessageHandle, UserId},
    error::GatewayError,
    protocol::{InputEvent, RenderableContent},
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

pub mod config;
pub mod error;
mod lifecycle;
mod router;
mod scheduler;

pub use config::{ControlSymbols, PaginatorConfig};
pub use error::{PaginatorError, RejectReason, RenderError};
pub use lifecycle::CloseReason;

use lifecycle::SessionTask;
use router::InputRouter;
use scheduler::RenderScheduler;

/// Produces the content for one page. Pages are 1-based and may be requested
/// more than once.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn page(&self, page: u32) -> Result<RenderableContent>;
}

#[async_trait]
impl<F> ContentProvider for F
where
    F: Fn(u32) -> Result<RenderableContent> + Send + Sync,
{
    async fn page(&self, page: u32) -> Result<RenderableContent> {
        self(page)
    }
}

#[async_trait]
pub trait PlatformGateway: Send + Sync {
    async fn post_message(
        &self,
        channel_id: ChannelId,
        content: &RenderableContent,
    ) -> std::result::Result<MessageHandle, GatewayError>;
    async fn edit_message(
        &self,
        message: &MessageHandle,
        content: &RenderableContent,
    ) -> std::result::Result<(), GatewayError>;
    async fn attach_controls(
        &self,
        message: &MessageHandle,
        symbols: &[String],
    ) -> std::result::Result<(), GatewayError>;
    async fn detach_controls(&self, message: &MessageHandle)
        -> std::result::Result<(), GatewayError>;
    fn subscribe_input(&self, message: &MessageHandle) -> broadcast::Receiver<InputEvent>;
    fn unsubscribe_input(&self, message: &MessageHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStatus {
    Pending,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
    Jump(i64),
    Stop,
}

impl Direction {
    /// Target page when moving from `from`, clamped to `1..=page_count`.
    pub fn resolve(self, from: u32, page_count: u32) -> u32 {
        let page_count = page_count.max(1);
        match self {
            Self::Prev => from.saturating_sub(1).clamp(1, page_count),
            Self::Next => from.saturating_add(1).clamp(1, page_count),
            Self::Jump(page) => page.clamp(1, i64::from(page_count)) as u32,
            Self::Stop => from.clamp(1, page_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationCommand {
    pub direction: Direction,
    pub requested_by: UserId,
    pub observed_at: DateTime<Utc>,
}

impl NavigationCommand {
    pub fn new(direction: Direction, requested_by: UserId) -> Self {
        Self {
            direction,
            requested_by,
            observed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub page_count: u32,
    pub current_page: u32,
    pub displayed_page: u32,
    pub message: Option<MessageHandle>,
    pub last_activity_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Why the session ended; `None` until closed and for sessions that
    /// never needed input (single page, failed start).
    pub close_reason: Option<CloseReason>,
}

impl SessionSnapshot {
    fn pending(page_count: u32) -> Self {
        Self {
            status: SessionStatus::Pending,
            page_count,
            current_page: 1,
            displayed_page: 1,
            message: None,
            last_activity_at: Utc::now(),
            last_error: None,
            close_reason: None,
        }
    }
}

/// One interactive pagination session bound to one posted message.
pub struct Paginator {
    session_id: SessionId,
    gateway: Arc<dyn PlatformGateway>,
    provider: Arc<dyn ContentProvider>,
    channel_id: ChannelId,
    owner: UserId,
    config: PaginatorConfig,
    started: AtomicBool,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
}

impl Paginator {
    pub fn new(
        gateway: Arc<dyn PlatformGateway>,
        provider: Arc<dyn ContentProvider>,
        channel_id: ChannelId,
        owner: UserId,
        config: PaginatorConfig,
    ) -> std::result::Result<Self, PaginatorError> {
        config.validate()?;
        let (snapshot, _) = watch::channel(SessionSnapshot::pending(config.page_count));
        Ok(Self {
            session_id: SessionId::new(),
            gateway,
            provider,
            channel_id,
            owner,
            config,
            started: AtomicBool::new(false),
            snapshot: Arc::new(snapshot),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Resolves once the session has been fully torn down.
    pub async fn closed(&self) {
        let mut rx = self.snapshot.subscribe();
        let _ = rx
            .wait_for(|snapshot| snapshot.status == SessionStatus::Closed)
            .await;
    }

    /// Posts page 1 and, for multi-page content, attaches the controls and
    /// begins listening for input.
    pub async fn start(&self) -> std::result::Result<(), PaginatorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PaginatorError::NotPending(self.status()));
        }
        let status = self.status();
        if status != SessionStatus::Pending {
            return Err(PaginatorError::NotPending(status));
        }

        let content = match self.provider.page(1).await {
            Ok(content) => content,
            Err(err) => {
                warn!(session_id = %self.session_id, "paginator: page 1 render failed: {err:#}");
                self.mark_closed(None);
                return Err(PaginatorError::InitialContent(err));
            }
        };
        let message = match self.gateway.post_message(self.channel_id, &content).await {
            Ok(message) => message,
            Err(err) => {
                warn!(session_id = %self.session_id, "paginator: initial post failed: {err}");
                self.mark_closed(None);
                return Err(PaginatorError::InitialPost(err));
            }
        };
        self.snapshot.send_modify(|snapshot| {
            snapshot.message = Some(message);
            snapshot.last_activity_at = Utc::now();
        });

        if self.config.page_count == 1 {
            info!(
                session_id = %self.session_id,
                message_id = message.message_id.0,
                "paginator: single page posted, no controls needed"
            );
            self.mark_closed(None);
            return Ok(());
        }
        if self.status() != SessionStatus::Pending {
            info!(session_id = %self.session_id, "paginator: stopped before controls were attached");
            self.mark_closed(Some(CloseReason::Stopped));
            return Ok(());
        }

        let events = self.gateway.subscribe_input(&message);
        if let Err(err) = self
            .gateway
            .attach_controls(&message, &self.config.controls.attach_order())
            .await
        {
            warn!(session_id = %self.session_id, "paginator: failed to attach controls: {err}");
        }

        let activated = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.status != SessionStatus::Pending {
                return false;
            }
            snapshot.status = SessionStatus::Active;
            snapshot.last_activity_at = Utc::now();
            true
        });
        if !activated {
            info!(session_id = %self.session_id, "paginator: stopped while attaching controls");
            if let Err(err) = self.gateway.detach_controls(&message).await {
                warn!(session_id = %self.session_id, "paginator: failed to detach controls: {err}");
            }
            self.gateway.unsubscribe_input(&message);
            self.mark_closed(Some(CloseReason::Stopped));
            return Ok(());
        }

        let (outbox, inputs) = mpsc::channel(self.config.command_buffer);
        let router = InputRouter::new(
            self.session_id,
            self.owner,
            message,
            self.config.clone(),
            self.snapshot.subscribe(),
            outbox,
        );
        let router = tokio::spawn(router.run(events));
        let scheduler = RenderScheduler::new(
            self.session_id,
            Arc::clone(&self.provider),
            Arc::clone(&self.gateway),
            message,
            self.config.page_count,
        );
        let task = SessionTask::new(
            scheduler,
            Arc::clone(&self.gateway),
            Arc::clone(&self.snapshot),
            inputs,
            router,
            self.config.idle_timeout,
        );
        tokio::spawn(task.run());

        info!(
            session_id = %self.session_id,
            message_id = message.message_id.0,
            pages = self.config.page_count,
            "paginator: session active"
        );
        Ok(())
    }

    /// Ends the session. Safe to call any number of times from any state.
    pub fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) {
            self.snapshot.send_if_modified(|snapshot| {
                if snapshot.status >= SessionStatus::Closing {
                    return false;
                }
                snapshot.status = SessionStatus::Closed;
                snapshot.close_reason = Some(CloseReason::Stopped);
                true
            });
            return;
        }
        lifecycle::request_close(&self.snapshot);
    }

    fn mark_closed(&self, reason: Option<CloseReason>) {
        self.snapshot.send_modify(|snapshot| {
            snapshot.status = SessionStatus::Closed;
            snapshot.close_reason = reason;
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
