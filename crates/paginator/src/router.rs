use shared::{
    domain::{MessageHandle, UserId},
    protocol::InputEvent,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{debug, warn};

use crate::{
    lifecycle::SessionInput, Direction, NavigationCommand, PaginatorConfig, RejectReason,
    SessionId, SessionSnapshot, SessionStatus,
};

enum ControlAction {
    Navigate(Direction),
    ArmJump,
}

/// Turns raw platform input for one message into queued session inputs.
pub(crate) struct InputRouter {
    session_id: SessionId,
    owner: UserId,
    message: MessageHandle,
    config: PaginatorConfig,
    snapshot: watch::Receiver<SessionSnapshot>,
    outbox: mpsc::Sender<SessionInput>,
    jump_armed_by: Option<UserId>,
}

impl InputRouter {
    pub(crate) fn new(
        session_id: SessionId,
        owner: UserId,
        message: MessageHandle,
        config: PaginatorConfig,
        snapshot: watch::Receiver<SessionSnapshot>,
        outbox: mpsc::Sender<SessionInput>,
    ) -> Self {
        Self {
            session_id,
            owner,
            message,
            config,
            snapshot,
            outbox,
            jump_armed_by: None,
        }
    }

    pub(crate) async fn run(mut self, mut events: broadcast::Receiver<InputEvent>) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        session_id = %self.session_id,
                        skipped,
                        "paginator: input subscription lagged, events dropped"
                    );
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let user_id = event.user_id();
            match self.route(event) {
                Ok(Some(input)) => {
                    if !self.enqueue(input) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(reason) => {
                    debug!(
                        session_id = %self.session_id,
                        user_id = ?user_id.map(|id| id.0),
                        "paginator: input ignored: {reason}"
                    );
                }
            }
        }
        debug!(session_id = %self.session_id, "paginator: input router stopped");
    }

    /// Never waits for the scheduler; a full queue drops the input.
    fn enqueue(&self, input: SessionInput) -> bool {
        match self.outbox.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(input)) => {
                warn!(
                    session_id = %self.session_id,
                    "paginator: command queue full, dropping {input:?}"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) fn route(
        &mut self,
        event: InputEvent,
    ) -> Result<Option<SessionInput>, RejectReason> {
        match event {
            InputEvent::MessageDeleted { message_id, .. } => {
                if message_id != self.message.message_id {
                    return Err(RejectReason::OtherMessage);
                }
                Ok(Some(SessionInput::MessageDeleted))
            }
            InputEvent::ReactionAdded {
                message_id,
                user_id,
                bot,
                symbol,
            } => {
                if message_id != self.message.message_id {
                    return Err(RejectReason::OtherMessage);
                }
                self.authorize(user_id, bot)?;
                self.ensure_active()?;
                match self.control_for(&symbol).ok_or(RejectReason::UnknownSymbol)? {
                    ControlAction::Navigate(direction) => Ok(Some(SessionInput::Navigate(
                        NavigationCommand::new(direction, user_id),
                    ))),
                    ControlAction::ArmJump => {
                        debug!(
                            session_id = %self.session_id,
                            user_id = user_id.0,
                            "paginator: waiting for a page number"
                        );
                        self.jump_armed_by = Some(user_id);
                        Ok(None)
                    }
                }
            }
            // Removing a reaction only re-arms the control on the platform side.
            InputEvent::ReactionRemoved { message_id, .. } => {
                if message_id != self.message.message_id {
                    return Err(RejectReason::OtherMessage);
                }
                Ok(None)
            }
            InputEvent::MessageCreated {
                channel_id,
                user_id,
                bot,
                content,
                ..
            } => {
                if channel_id != self.message.channel_id {
                    return Err(RejectReason::OtherMessage);
                }
                if self.jump_armed_by != Some(user_id) {
                    return Ok(None);
                }
                self.authorize(user_id, bot)?;
                self.ensure_active()?;
                self.jump_armed_by = None;
                match content.trim().parse::<i64>() {
                    Ok(page) => Ok(Some(SessionInput::Navigate(NavigationCommand::new(
                        Direction::Jump(page),
                        user_id,
                    )))),
                    Err(_) => {
                        debug!(
                            session_id = %self.session_id,
                            "paginator: jump reply was not a page number"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    fn authorize(&self, user_id: UserId, bot: bool) -> Result<(), RejectReason> {
        if bot {
            return Err(RejectReason::BotUser(user_id.0));
        }
        if !self.config.permits(self.owner, user_id) {
            return Err(RejectReason::PermissionDenied(user_id.0));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), RejectReason> {
        match self.snapshot.borrow().status {
            SessionStatus::Active => Ok(()),
            status => Err(RejectReason::Inactive(status)),
        }
    }

    fn control_for(&self, symbol: &str) -> Option<ControlAction> {
        let controls = &self.config.controls;
        if symbol == controls.prev {
            Some(ControlAction::Navigate(Direction::Prev))
        } else if symbol == controls.next {
            Some(ControlAction::Navigate(Direction::Next))
        } else if symbol == controls.stop {
            Some(ControlAction::Navigate(Direction::Stop))
        } else if controls.first.as_deref() == Some(symbol) {
            Some(ControlAction::Navigate(Direction::Jump(1)))
        } else if controls.last.as_deref() == Some(symbol) {
            Some(ControlAction::Navigate(Direction::Jump(i64::from(
                self.config.page_count,
            ))))
        } else if controls.jump.as_deref() == Some(symbol) {
            Some(ControlAction::ArmJump)
        } else {
            None
        }
    }
}
