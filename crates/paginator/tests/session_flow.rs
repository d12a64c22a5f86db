use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use paginator::{
    ContentProvider, Paginator, PaginatorConfig, PlatformGateway, SessionStatus,
};
use shared::{
    domain::{ChannelId, MessageHandle, MessageId, UserId},
    error::GatewayError,
    protocol::{Embed, InputEvent, RenderableContent},
};
use tokio::sync::broadcast;

const OWNER: UserId = UserId(11);

#[derive(Default)]
struct Log {
    calls: Mutex<Vec<String>>,
}

impl Log {
    fn push(&self, call: impl Into<String>) {
        self.calls.lock().expect("log").push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("log").clone()
    }
}

struct ChannelGateway {
    log: Log,
    events: broadcast::Sender<InputEvent>,
}

impl ChannelGateway {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            log: Log::default(),
            events,
        })
    }

    fn react(&self, symbol: &str) {
        let _ = self.events.send(InputEvent::ReactionAdded {
            message_id: MessageId(1),
            user_id: OWNER,
            bot: false,
            symbol: symbol.into(),
        });
    }
}

fn title(content: &RenderableContent) -> String {
    content
        .embed
        .as_ref()
        .and_then(|embed| embed.title.clone())
        .unwrap_or_default()
}

#[async_trait]
impl PlatformGateway for ChannelGateway {
    async fn post_message(
        &self,
        channel_id: ChannelId,
        content: &RenderableContent,
    ) -> Result<MessageHandle, GatewayError> {
        self.log.push(format!("post {}", title(content)));
        Ok(MessageHandle::new(channel_id, MessageId(1)))
    }

    async fn edit_message(
        &self,
        _message: &MessageHandle,
        content: &RenderableContent,
    ) -> Result<(), GatewayError> {
        self.log.push(format!("edit {}", title(content)));
        Ok(())
    }

    async fn attach_controls(
        &self,
        _message: &MessageHandle,
        symbols: &[String],
    ) -> Result<(), GatewayError> {
        self.log.push(format!("attach {}", symbols.join(" ")));
        Ok(())
    }

    async fn detach_controls(&self, _message: &MessageHandle) -> Result<(), GatewayError> {
        self.log.push("detach");
        Ok(())
    }

    fn subscribe_input(&self, _message: &MessageHandle) -> broadcast::Receiver<InputEvent> {
        self.log.push("subscribe");
        self.events.subscribe()
    }

    fn unsubscribe_input(&self, _message: &MessageHandle) {
        self.log.push("unsubscribe");
    }
}

fn application_cards() -> Arc<dyn ContentProvider> {
    let names = ["Rust", "Ferris Quest", "Cargo Cult"];
    Arc::new(move |page: u32| -> anyhow::Result<RenderableContent> {
        let name = names
            .get(page as usize - 1)
            .ok_or_else(|| anyhow!("page {page} out of range"))?;
        Ok(RenderableContent::embed(
            Embed::new()
                .title(format!("({page} of {})", names.len()))
                .author(*name, None)
                .footer("Added to Discord"),
        ))
    })
}

#[tokio::test(start_paused = true)]
async fn owner_pages_through_cards_and_stops() {
    let gateway = ChannelGateway::new();
    let paginator = Paginator::new(
        Arc::clone(&gateway) as Arc<dyn PlatformGateway>,
        application_cards(),
        ChannelId(3),
        OWNER,
        PaginatorConfig::new(3).with_idle_timeout(Duration::from_secs(120)),
    )
    .expect("paginator");
    let mut updates = paginator.subscribe();

    paginator.start().await.expect("start");
    assert_eq!(paginator.status(), SessionStatus::Active);

    gateway.react("➡");
    updates
        .wait_for(|snapshot| snapshot.displayed_page == 2)
        .await
        .expect("page 2");

    gateway.react("⏭");
    updates
        .wait_for(|snapshot| snapshot.displayed_page == 3)
        .await
        .expect("page 3");

    gateway.react("⏹");
    paginator.closed().await;

    assert_eq!(
        gateway.log.calls(),
        vec![
            "post (1 of 3)",
            "subscribe",
            "attach ⏮ ⬅ ➡ ⏭ 🔢 ⏹",
            "edit (2 of 3)",
            "edit (3 of 3)",
            "detach",
            "unsubscribe",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn idle_session_cleans_up_on_its_own() {
    let gateway = ChannelGateway::new();
    let paginator = Paginator::new(
        Arc::clone(&gateway) as Arc<dyn PlatformGateway>,
        application_cards(),
        ChannelId(3),
        OWNER,
        PaginatorConfig::new(3).with_idle_timeout(Duration::from_secs(5)),
    )
    .expect("paginator");

    paginator.start().await.expect("start");
    paginator.closed().await;

    let calls = gateway.log.calls();
    assert_eq!(calls.iter().filter(|call| *call == "unsubscribe").count(), 1);
    assert_eq!(calls.last().map(String::as_str), Some("unsubscribe"));
    assert_eq!(paginator.snapshot().current_page, 1);
}
