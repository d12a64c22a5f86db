use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::domain::MessageHandle;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    scheduler::RenderScheduler, Direction, NavigationCommand, PlatformGateway, SessionId,
    SessionSnapshot, SessionStatus,
};

#[derive(Debug)]
pub(crate) enum SessionInput {
    Navigate(NavigationCommand),
    MessageDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Stopped,
    IdleTimeout,
    MessageDeleted,
    InputClosed,
}

/// Moves a pending or active session to `Closing`. Returns whether this call
/// made the transition.
pub(crate) fn request_close(snapshot: &watch::Sender<SessionSnapshot>) -> bool {
    snapshot.send_if_modified(|snapshot| {
        if snapshot.status >= SessionStatus::Closing {
            return false;
        }
        snapshot.status = SessionStatus::Closing;
        true
    })
}

/// Owns all mutable state of an active session. Runs until the session
/// closes, then tears down exactly once.
pub(crate) struct SessionTask {
    session_id: SessionId,
    message: MessageHandle,
    gateway: Arc<dyn PlatformGateway>,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    inputs: mpsc::Receiver<SessionInput>,
    scheduler: RenderScheduler,
    router: JoinHandle<()>,
    idle_timeout: Duration,
    idle_deadline: Instant,
    last_activity_at: DateTime<Utc>,
}

impl SessionTask {
    pub(crate) fn new(
        scheduler: RenderScheduler,
        gateway: Arc<dyn PlatformGateway>,
        snapshot: Arc<watch::Sender<SessionSnapshot>>,
        inputs: mpsc::Receiver<SessionInput>,
        router: JoinHandle<()>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            session_id: scheduler.session_id(),
            message: scheduler.message(),
            gateway,
            snapshot,
            inputs,
            scheduler,
            router,
            idle_timeout,
            idle_deadline: Instant::now() + idle_timeout,
            last_activity_at: Utc::now(),
        }
    }

    fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    pub(crate) async fn run(mut self) {
        let mut status_rx = self.snapshot.subscribe();
        let reason = 'session: loop {
            if self.status() != SessionStatus::Active {
                break CloseReason::Stopped;
            }
            let idle_deadline = self.idle_deadline;
            let cooldown = self.scheduler.cooldown_until();

            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break CloseReason::Stopped;
                    }
                }
                input = self.inputs.recv() => {
                    let Some(input) = input else {
                        break CloseReason::InputClosed;
                    };
                    if let Some(reason) = self.absorb(input) {
                        break reason;
                    }
                    while let Ok(input) = self.inputs.try_recv() {
                        if let Some(reason) = self.absorb(input) {
                            break 'session reason;
                        }
                    }
                }
                outcome = self.scheduler.wait_render() => {
                    if let Some(reason) = self.scheduler.complete(outcome) {
                        break reason;
                    }
                }
                () = sleep_until(cooldown.unwrap_or(idle_deadline)), if cooldown.is_some() => {}
                () = sleep_until(idle_deadline) => {
                    break CloseReason::IdleTimeout;
                }
            }

            if self.status() == SessionStatus::Active {
                self.scheduler.kick();
            }
            self.publish();
        };

        self.teardown(reason).await;
    }

    fn absorb(&mut self, input: SessionInput) -> Option<CloseReason> {
        match input {
            SessionInput::MessageDeleted => Some(CloseReason::MessageDeleted),
            SessionInput::Navigate(command) => {
                if command.direction == Direction::Stop {
                    request_close(&self.snapshot);
                    return Some(CloseReason::Stopped);
                }
                self.idle_deadline = Instant::now() + self.idle_timeout;
                self.last_activity_at = command.observed_at;
                let target = self.scheduler.request(command.direction);
                debug!(
                    session_id = %self.session_id,
                    user_id = command.requested_by.0,
                    direction = ?command.direction,
                    target,
                    "paginator: navigation accepted"
                );
                None
            }
        }
    }

    fn publish(&self) {
        let current_page = self.scheduler.current_page();
        let displayed_page = self.scheduler.displayed_page();
        let last_error = self.scheduler.last_error();
        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.current_page != current_page
                || snapshot.displayed_page != displayed_page
                || snapshot.last_error.as_deref() != last_error
                || snapshot.last_activity_at != self.last_activity_at;
            if changed {
                snapshot.current_page = current_page;
                snapshot.displayed_page = displayed_page;
                snapshot.last_error = last_error.map(str::to_owned);
                snapshot.last_activity_at = self.last_activity_at;
            }
            changed
        });
    }

    async fn teardown(self, reason: CloseReason) {
        request_close(&self.snapshot);
        info!(
            session_id = %self.session_id,
            ?reason,
            page = self.scheduler.current_page(),
            "paginator: closing session"
        );
        self.router.abort();

        // A deleted message has no controls left to remove.
        if reason != CloseReason::MessageDeleted {
            if let Err(err) = self.gateway.detach_controls(&self.message).await {
                warn!(session_id = %self.session_id, "paginator: failed to detach controls: {err}");
            }
        }
        self.gateway.unsubscribe_input(&self.message);

        if self.scheduler.is_rendering() {
            debug!(session_id = %self.session_id, "paginator: leaving in-flight edit to finish");
        }
        self.publish();
        self.snapshot.send_modify(|snapshot| {
            snapshot.status = SessionStatus::Closed;
            snapshot.close_reason = Some(reason);
        });
        info!(session_id = %self.session_id, "paginator: session closed");
    }
}
