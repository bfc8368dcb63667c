use std::sync::Arc;

use anyhow::Context;

use intake_bot::app::App;
use intake_bot::channels::{Channel, ChannelManager, CliChannel, TelegramChannel};
use intake_bot::config::BotConfig;
use intake_bot::dispatch::{AdminNotifier, Dispatcher};
use intake_bot::engine::DialogueEngine;
use intake_bot::flow::intake_flow;
use intake_bot::session::spawn_sweep_task;
use intake_bot::store::{Ledger, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;
    let flow = Arc::new(intake_flow().context("building intake flow")?);

    eprintln!("📝 Intake Bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let cli: Arc<dyn Channel> = Arc::new(CliChannel::new());
    channels.add(Arc::clone(&cli));

    // Operators are reached on Telegram when it is configured, else on the CLI
    let notify_channel = match config.telegram_token.clone() {
        Some(token) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if config.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    config.allowed_users.join(", ")
                }
            );
            let telegram: Arc<dyn Channel> =
                Arc::new(TelegramChannel::new(token, config.allowed_users.clone()));
            if let Err(e) = telegram.health_check().await {
                tracing::warn!("Telegram health check failed: {e}");
            }
            channels.add(Arc::clone(&telegram));
            telegram
        }
        None => {
            eprintln!("   Telegram: disabled (TELEGRAM_BOT_TOKEN not set)");
            cli
        }
    };
    let channels = Arc::new(channels);
    eprintln!("   Channels: {}", channels.names().join(", "));

    // ── Dispatch ─────────────────────────────────────────────────────────
    let mut dispatcher = Dispatcher::new(Arc::clone(&channels), config.delivery_timeout)
        .with_recipient(Arc::new(Ledger::new(Arc::clone(&db))));
    for admin in &config.admin_ids {
        dispatcher = dispatcher.with_recipient(Arc::new(AdminNotifier::new(
            Arc::clone(&notify_channel),
            admin.to_string(),
            Arc::clone(&flow),
        )));
    }
    if config.admin_ids.is_empty() {
        tracing::warn!("ADMIN_IDS is empty; submissions go to the ledger only");
    }
    eprintln!("   Recipients: {}\n", dispatcher.recipient_names().join(", "));

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = Arc::new(DialogueEngine::new(flow, db.clone(), Arc::new(dispatcher)));
    let _sweep_handle = spawn_sweep_task(
        db,
        engine.locks(),
        config.session_idle_timeout,
        config.sweep_interval,
    );

    App::new(engine, channels).run().await?;
    Ok(())
}
