use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use paginator::{ContentProvider, Paginator, PlatformGateway, SessionStatus};
use shared::{
    domain::{ChannelId, UserId},
    protocol::RenderableContent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::load_settings;
use console::{parse_line, ConsoleGateway};

#[derive(Parser, Debug)]
struct Args {
    /// JSON array of pages, each `{"content": ..., "embed": {...}}`.
    #[arg(long)]
    pages: PathBuf,
    #[arg(long, default_value = "paginate.toml")]
    config: PathBuf,
    #[arg(long, default_value_t = 1)]
    user_id: i64,
    #[arg(long, default_value_t = 1)]
    channel_id: i64,
    #[arg(long)]
    allow_others: bool,
}

fn load_pages(path: &Path) -> Result<Vec<RenderableContent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read pages from {}", path.display()))?;
    let pages: Vec<RenderableContent> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse pages in {}", path.display()))?;
    if pages.is_empty() {
        bail!("{} contains no pages", path.display());
    }
    if let Some(blank) = pages.iter().position(RenderableContent::is_empty) {
        bail!("page {} in {} is empty", blank + 1, path.display());
    }
    Ok(pages)
}

fn page_provider(pages: Vec<RenderableContent>) -> Arc<dyn ContentProvider> {
    Arc::new(move |page: u32| -> Result<RenderableContent> {
        (page as usize)
            .checked_sub(1)
            .and_then(|index| pages.get(index))
            .cloned()
            .ok_or_else(|| anyhow!("no page {page}"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    settings.allow_others |= args.allow_others;
    let pages = load_pages(&args.pages)?;
    let page_count = u32::try_from(pages.len()).context("too many pages")?;
    let config = settings.paginator_config(page_count);
    let controls = config.controls.clone();

    let gateway = Arc::new(ConsoleGateway::new(Duration::from_millis(
        settings.edit_delay_ms,
    )));
    let user = UserId(args.user_id);
    let paginator = Paginator::new(
        Arc::clone(&gateway) as Arc<dyn PlatformGateway>,
        page_provider(pages),
        ChannelId(args.channel_id),
        user,
        config,
    )?;
    paginator.start().await?;

    let snapshot = paginator.snapshot();
    let Some(message) = snapshot.message else {
        return Ok(());
    };
    if snapshot.status == SessionStatus::Closed {
        return Ok(());
    }
    println!("commands: n/next p/prev f/first l/last j/jump s/stop delete, or any reply text");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = paginator.closed() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("paginate: interrupted, stopping session");
                paginator.stop();
            }
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => {
                    if let Some(event) = parse_line(&line, &controls, message, user) {
                        gateway.emit(event);
                    }
                }
                None => {
                    info!("paginate: stdin closed, stopping session");
                    paginator.stop();
                    paginator.closed().await;
                    break;
                }
            },
        }
    }

    let snapshot = paginator.snapshot();
    println!(
        "session closed on page {} of {} ({:?})",
        snapshot.displayed_page, snapshot.page_count, snapshot.close_reason
    );
    if let Some(err) = snapshot.last_error {
        println!("last error: {err}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_pages(body: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("paginate_pages_{suffix}.json"));
        fs::write(&path, body).expect("write pages");
        path
    }

    #[test]
    fn loads_pages_and_rejects_empty_ones() {
        let path = temp_pages(r#"[{"content":"one"},{"embed":{"title":"two"}}]"#);
        let pages = load_pages(&path).expect("pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].embed.as_ref().and_then(|e| e.title.as_deref()), Some("two"));

        let path = temp_pages(r#"[{"content":"one"},{}]"#);
        let err = load_pages(&path).expect_err("blank page");
        assert!(err.to_string().contains("page 2"));

        let path = temp_pages("[]");
        assert!(load_pages(&path).is_err());
    }

    #[tokio::test]
    async fn provider_serves_one_based_pages() {
        let provider = page_provider(vec![
            RenderableContent::text("a"),
            RenderableContent::text("b"),
        ]);
        assert_eq!(
            provider.page(2).await.expect("page 2"),
            RenderableContent::text("b")
        );
        assert!(provider.page(0).await.is_err());
        assert!(provider.page(3).await.is_err());
    }
}
