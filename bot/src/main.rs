/// Snag Download Bot - Main Entry Point
///
/// Telegram bot built with teloxide that shells out to yt-dlp for probing
/// and downloading media, gated behind a force-join channel check.
mod commands;
mod formats;
mod links;
mod membership;
mod ytdlp;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use snag_shared::config::Config;
use snag_shared::pending::PendingStore;
use snag_shared::rate_limit::RateLimiter;
use snag_shared::reaper;
use snag_shared::registry::UserRegistry;

use commands::{AppState, Command};

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snag_bot=info".parse().unwrap())
                .add_directive("snag_shared=info".parse().unwrap()),
        )
        .init();

    info!("=== Snag Bot Starting ===");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.download_dir) {
        error!(
            "Cannot create download dir {}: {}",
            config.download_dir.display(),
            e
        );
        std::process::exit(1);
    }

    let reaped = reaper::reap(&config.download_dir, config.file_ttl);
    if reaped > 0 {
        info!("Startup cleanup removed {} stale files", reaped);
    }

    let registry = match UserRegistry::load(&config.registry_path) {
        Ok(r) => r,
        Err(e) => {
            error!(
                "Cannot load user registry {}: {}",
                config.registry_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        ytdlp: ytdlp::YtDlp::new(config.download_dir.clone()),
        registry,
        rate_limiter: RateLimiter::hourly(),
        pending: PendingStore::new(),
        config,
    });

    let bot = Bot::new(state.config.bot_token.clone());

    // Long polling only; clear any webhook left over from another deployment.
    match bot.delete_webhook().send().await {
        Ok(_) => info!("Webhook cleared, using long polling"),
        Err(e) => warn!("Could not clear webhook: {}", e),
    }

    match bot.set_my_commands(Command::bot_commands()).await {
        Ok(_) => info!("Bot commands registered"),
        Err(e) => warn!("Could not register bot commands: {}", e),
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint({
                    let state = state.clone();
                    move |bot: Bot, msg: Message, cmd: Command| {
                        let state = state.clone();
                        async move { commands::handle_command(bot, msg, cmd, state).await }
                    }
                }),
        )
        .branch(Update::filter_message().endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message| {
                let state = state.clone();
                async move { commands::handle_message(bot, msg, state).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let state = state.clone();
            move |bot: Bot, q: CallbackQuery| {
                let state = state.clone();
                async move { commands::handle_callback_query(bot, q, state).await }
            }
        }));

    info!("Dispatcher starting");
    Dispatcher::builder(bot, handler)
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Snag bot stopped.");
}
