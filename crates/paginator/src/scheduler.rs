use std::sync::Arc;

use shared::domain::MessageHandle;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{CloseReason, ContentProvider, Direction, PlatformGateway, RenderError, SessionId};

pub(crate) type RenderResult = Result<u32, RenderError>;

struct InFlightRender {
    page: u32,
    handle: JoinHandle<RenderResult>,
}

/// Coalesces navigation into a single pending target and keeps at most one
/// edit in flight.
pub(crate) struct RenderScheduler {
    session_id: SessionId,
    provider: Arc<dyn ContentProvider>,
    gateway: Arc<dyn PlatformGateway>,
    message: MessageHandle,
    page_count: u32,
    current_page: u32,
    displayed_page: u32,
    pending: Option<u32>,
    in_flight: Option<InFlightRender>,
    cooldown_until: Option<Instant>,
    last_error: Option<String>,
}

impl RenderScheduler {
    pub(crate) fn new(
        session_id: SessionId,
        provider: Arc<dyn ContentProvider>,
        gateway: Arc<dyn PlatformGateway>,
        message: MessageHandle,
        page_count: u32,
    ) -> Self {
        Self {
            session_id,
            provider,
            gateway,
            message,
            page_count,
            current_page: 1,
            displayed_page: 1,
            pending: None,
            in_flight: None,
            cooldown_until: None,
            last_error: None,
        }
    }

    pub(crate) fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub(crate) fn message(&self) -> MessageHandle {
        self.message
    }

    pub(crate) fn current_page(&self) -> u32 {
        self.current_page
    }

    pub(crate) fn displayed_page(&self) -> u32 {
        self.displayed_page
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn is_rendering(&self) -> bool {
        self.in_flight.is_some()
    }

    /// End of the current rate-limit back-off, if one applies.
    pub(crate) fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Newest page anyone asked for, rendered or not.
    fn latest_target(&self) -> u32 {
        self.pending.unwrap_or(self.current_page)
    }

    /// Overwrites the pending slot with the page `direction` leads to.
    pub(crate) fn request(&mut self, direction: Direction) -> u32 {
        let target = direction.resolve(self.latest_target(), self.page_count);
        self.pending = Some(target);
        target
    }

    /// Starts a render of the pending target when nothing is in flight.
    pub(crate) fn kick(&mut self) -> Option<u32> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some(until) = self.cooldown_until {
            if until > Instant::now() {
                return None;
            }
            self.cooldown_until = None;
        }
        let target = self.pending.take()?;
        self.current_page = target;
        if target == self.displayed_page {
            return None;
        }

        debug!(session_id = %self.session_id, page = target, "paginator: rendering page");
        let handle = tokio::spawn(render_page(
            Arc::clone(&self.provider),
            Arc::clone(&self.gateway),
            self.message,
            target,
        ));
        self.in_flight = Some(InFlightRender {
            page: target,
            handle,
        });
        Some(target)
    }

    /// Waits for the in-flight render; pends forever when there is none.
    pub(crate) async fn wait_render(&mut self) -> RenderResult {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let page = in_flight.page;
        let outcome = match (&mut in_flight.handle).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session_id = %self.session_id, page, "paginator: render task failed: {err}");
                Err(RenderError::Aborted { page })
            }
        };
        self.in_flight = None;
        outcome
    }

    /// Applies a finished render. Returns a close reason when the session
    /// can no longer show anything.
    pub(crate) fn complete(&mut self, outcome: RenderResult) -> Option<CloseReason> {
        let err = match outcome {
            Ok(page) => {
                self.displayed_page = page;
                debug!(session_id = %self.session_id, page, "paginator: page displayed");
                return None;
            }
            Err(err) => err,
        };
        self.last_error = Some(err.to_string());

        if err.is_message_lost() {
            warn!(session_id = %self.session_id, page = err.page(), "paginator: message is gone");
            self.pending = None;
            return Some(CloseReason::MessageDeleted);
        }
        if let Some(retry_after) = err.retry_after() {
            info!(
                session_id = %self.session_id,
                page = err.page(),
                retry_after_ms = retry_after.as_millis() as u64,
                "paginator: edit rate limited, backing off"
            );
            self.cooldown_until = Some(Instant::now() + retry_after);
            if self.pending.is_none() {
                self.pending = Some(err.page());
            }
        } else {
            warn!(session_id = %self.session_id, "paginator: {err}");
        }
        None
    }
}

async fn render_page(
    provider: Arc<dyn ContentProvider>,
    gateway: Arc<dyn PlatformGateway>,
    message: MessageHandle,
    page: u32,
) -> RenderResult {
    let content = provider
        .page(page)
        .await
        .map_err(|source| RenderError::Content { page, source })?;
    gateway
        .edit_message(&message, &content)
        .await
        .map_err(|source| RenderError::Edit { page, source })?;
    Ok(page)
}
