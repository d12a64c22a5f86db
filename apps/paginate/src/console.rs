use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use paginator::{ControlSymbols, PlatformGateway};
use shared::{
    domain::{ChannelId, MessageHandle, MessageId, UserId},
    error::GatewayError,
    protocol::{InputEvent, RenderableContent},
};
use tokio::sync::broadcast;
use tracing::debug;

/// Gateway that prints messages to stdout and takes input from the terminal.
pub struct ConsoleGateway {
    next_message_id: AtomicI64,
    events: broadcast::Sender<InputEvent>,
    edit_delay: Duration,
}

impl ConsoleGateway {
    pub fn new(edit_delay: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            next_message_id: AtomicI64::new(1),
            events,
            edit_delay,
        }
    }

    pub fn emit(&self, event: InputEvent) {
        // No receivers just means nobody is listening anymore.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl PlatformGateway for ConsoleGateway {
    async fn post_message(
        &self,
        channel_id: ChannelId,
        content: &RenderableContent,
    ) -> Result<MessageHandle, GatewayError> {
        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        println!("--- message {} in channel {} ---", message_id.0, channel_id.0);
        println!("{}", render_text(content));
        Ok(MessageHandle::new(channel_id, message_id))
    }

    async fn edit_message(
        &self,
        message: &MessageHandle,
        content: &RenderableContent,
    ) -> Result<(), GatewayError> {
        if !self.edit_delay.is_zero() {
            tokio::time::sleep(self.edit_delay).await;
        }
        println!("--- message {} (edited) ---", message.message_id.0);
        println!("{}", render_text(content));
        Ok(())
    }

    async fn attach_controls(
        &self,
        message: &MessageHandle,
        symbols: &[String],
    ) -> Result<(), GatewayError> {
        println!("[{}] controls: {}", message.message_id.0, symbols.join(" "));
        Ok(())
    }

    async fn detach_controls(&self, message: &MessageHandle) -> Result<(), GatewayError> {
        println!("[{}] controls removed", message.message_id.0);
        Ok(())
    }

    fn subscribe_input(&self, message: &MessageHandle) -> broadcast::Receiver<InputEvent> {
        debug!(message_id = message.message_id.0, "console: input subscribed");
        self.events.subscribe()
    }

    fn unsubscribe_input(&self, message: &MessageHandle) {
        debug!(message_id = message.message_id.0, "console: input unsubscribed");
    }
}

pub fn render_text(content: &RenderableContent) -> String {
    let mut lines = Vec::new();
    if let Some(text) = content.content.as_deref().filter(|text| !text.is_empty()) {
        lines.push(text.to_owned());
    }
    if let Some(embed) = &content.embed {
        if let Some(author) = &embed.author {
            lines.push(format!("  {}", author.name));
        }
        if let Some(title) = &embed.title {
            lines.push(format!("  # {title}"));
        }
        if let Some(description) = &embed.description {
            lines.extend(description.lines().map(|line| format!("  {line}")));
        }
        for field in &embed.fields {
            lines.push(format!("  {}: {}", field.name, field.value));
        }
        if let Some(footer) = &embed.footer {
            lines.push(format!("  -- {footer}"));
        }
    }
    lines.join("\n")
}

/// Maps one terminal line to the platform event it stands for. Short
/// commands press controls; anything else is a chat reply from `user`.
pub fn parse_line(
    line: &str,
    controls: &ControlSymbols,
    message: MessageHandle,
    user: UserId,
) -> Option<InputEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let symbol = match line {
        "n" | "next" => Some(controls.next.clone()),
        "p" | "prev" => Some(controls.prev.clone()),
        "s" | "stop" => Some(controls.stop.clone()),
        "f" | "first" => controls.first.clone(),
        "l" | "last" => controls.last.clone(),
        "j" | "jump" => controls.jump.clone(),
        "delete" => {
            return Some(InputEvent::MessageDeleted {
                channel_id: message.channel_id,
                message_id: message.message_id,
            })
        }
        other if controls.attach_order().iter().any(|symbol| symbol == other) => {
            Some(other.to_owned())
        }
        _ => None,
    };

    Some(match symbol {
        Some(symbol) => InputEvent::ReactionAdded {
            message_id: message.message_id,
            user_id: user,
            bot: false,
            symbol,
        },
        None => InputEvent::MessageCreated {
            channel_id: message.channel_id,
            message_id: MessageId(0),
            user_id: user,
            bot: false,
            content: line.to_owned(),
        },
    })
}

#[cfg(test)]
mod tests {
    use shared::protocol::Embed;

    use super::*;

    fn message() -> MessageHandle {
        MessageHandle::new(ChannelId(2), MessageId(9))
    }

    #[test]
    fn short_commands_press_controls() {
        let controls = ControlSymbols::default();
        let event = parse_line(" n ", &controls, message(), UserId(1)).expect("event");
        assert_eq!(
            event,
            InputEvent::ReactionAdded {
                message_id: MessageId(9),
                user_id: UserId(1),
                bot: false,
                symbol: "➡".into(),
            }
        );

        let event = parse_line("⏹", &controls, message(), UserId(1)).expect("event");
        assert!(matches!(event, InputEvent::ReactionAdded { symbol, .. } if symbol == "⏹"));
    }

    #[test]
    fn other_text_becomes_a_reply() {
        let event = parse_line("4", &ControlSymbols::default(), message(), UserId(1))
            .expect("event");
        assert!(matches!(
            event,
            InputEvent::MessageCreated { channel_id: ChannelId(2), content, .. } if content == "4"
        ));
        assert_eq!(
            parse_line("   ", &ControlSymbols::default(), message(), UserId(1)),
            None
        );
    }

    #[test]
    fn disabled_controls_fall_through_to_text() {
        let event = parse_line("j", &ControlSymbols::basic(), message(), UserId(1))
            .expect("event");
        assert!(matches!(event, InputEvent::MessageCreated { .. }));
    }

    #[test]
    fn delete_removes_the_message() {
        let event = parse_line("delete", &ControlSymbols::default(), message(), UserId(1))
            .expect("event");
        assert_eq!(
            event,
            InputEvent::MessageDeleted {
                channel_id: ChannelId(2),
                message_id: MessageId(9),
            }
        );
    }

    #[test]
    fn renders_embed_cards_as_text() {
        let content = RenderableContent::embed(
            Embed::new()
                .title("(1 of 2)")
                .author("Ferris", None)
                .field("Id", "42", true)
                .footer("Added"),
        );
        assert_eq!(
            render_text(&content),
            "  Ferris\n  # (1 of 2)\n  Id: 42\n  -- Added"
        );
    }

    #[tokio::test]
    async fn emitted_events_reach_subscribers() {
        let gateway = ConsoleGateway::new(Duration::ZERO);
        let handle = gateway
            .post_message(ChannelId(2), &RenderableContent::text("hi"))
            .await
            .expect("post");
        let mut events = gateway.subscribe_input(&handle);

        gateway.emit(InputEvent::MessageDeleted {
            channel_id: handle.channel_id,
            message_id: handle.message_id,
        });

        assert!(matches!(
            events.recv().await.expect("event"),
            InputEvent::MessageDeleted { .. }
        ));
    }
}
