/// Telegram handlers: commands, URL messages, and selection callbacks.
///
/// Handles /start, /help, /menu, /broadcast, plain-text URL capture, and
/// the dl:<token> / check_join / how_to_use callback buttons.
use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, UserId,
};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use url::Url;

use snag_shared::config::Config;
use snag_shared::errors::DownloadError;
use snag_shared::pending::{PendingSelection, PendingStore};
use snag_shared::rate_limit::RateLimiter;
use snag_shared::reaper;
use snag_shared::registry::UserRegistry;

use crate::formats::{reduce_formats, FormatCandidate};
use crate::links;
use crate::membership;
use crate::ytdlp::YtDlp;

/// Extensions delivered with the inline video player; everything else
/// (and every audio extraction) goes out as audio.
const VIDEO_EXTS: [&str; 3] = ["mp4", "mkv", "webm"];

/// Callback-data prefix for staged download tokens.
const DL_PREFIX: &str = "dl:";

/// Bot command definitions.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Snag bot commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Show the menu")]
    Menu,
    #[command(description = "Message every registered user (admin)")]
    Broadcast(String),
}

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: Config,
    pub registry: UserRegistry,
    pub rate_limiter: RateLimiter,
    pub pending: PendingStore,
    pub ytdlp: YtDlp,
}

/// Handle incoming commands.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => cmd_start(bot, msg, state).await,
        Command::Help | Command::Menu => cmd_help(bot, msg, state).await,
        Command::Broadcast(text) => cmd_broadcast(bot, msg, text, state).await,
    }
}

/// /start - force-join gate, registration, welcome menu.
async fn cmd_start(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    if !membership::is_admitted(&bot, &state.config.update_channel, user.id).await {
        return send_join_prompt(&bot, msg.chat.id, &state.config).await;
    }

    register_user(&state, user.id.0).await;
    send_welcome(&bot, msg.chat.id, &user.first_name, &state.config).await
}

/// /help and /menu.
async fn cmd_help(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let text = format!(
        "📚 *Help & Menu*\n\n\
         - Use /start to re-open the menu.\n\
         - Paste a supported link to begin.\n\
         - Download limit: {}× per hour.",
        state.config.hourly_limit
    );
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(main_menu_keyboard(&state.config))
        .await?;
    Ok(())
}

/// /broadcast <text> - admin-only fan-out to every registered user.
/// Individual delivery failures are tolerated and do not abort the loop.
async fn cmd_broadcast(
    bot: Bot,
    msg: Message,
    text: String,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.id.0 != state.config.admin_id {
        bot.send_message(msg.chat.id, "❌ You're not authorized.")
            .await?;
        return Ok(());
    }

    let text = text.trim();
    if text.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /broadcast Your message here")
            .await?;
        return Ok(());
    }

    let body = format!("📢 *Update:*\n\n{}", text);
    let mut sent = 0usize;
    for uid in state.registry.all().await {
        match bot
            .send_message(ChatId(uid as i64), body.clone())
            .parse_mode(ParseMode::Markdown)
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => warn!("Broadcast to {} failed: {}", uid, e),
        }
    }
    bot.send_message(msg.chat.id, format!("✅ Broadcast sent to {} users.", sent))
        .await?;
    Ok(())
}

/// Plain message handler: capture the first URL and present the format
/// chooser for it.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(url) = msg.text().and_then(links::find_url) else {
        return Ok(());
    };
    let url = url.to_string();
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let uid = user.id;
    let chat_id = msg.chat.id;

    if !membership::is_admitted(&bot, &state.config.update_channel, uid).await {
        return send_join_prompt(&bot, chat_id, &state.config).await;
    }

    if !state
        .rate_limiter
        .allowed(uid.0, state.config.hourly_limit)
        .await
    {
        bot.send_message(
            chat_id,
            format!(
                "⚠️ Hourly limit reached ({}). Try again later.",
                state.config.hourly_limit
            ),
        )
        .await?;
        return Ok(());
    }

    let status = bot
        .send_message(chat_id, "🔎 Fetching available formats…")
        .await?;

    let media = match state.ytdlp.probe(&url).await {
        Ok(media) => media,
        Err(e) => {
            warn!("Format probe failed for {}: {}", url, e);
            bot.edit_message_text(
                chat_id,
                status.id,
                "❌ Could not extract info. Make sure the link is valid & supported.",
            )
            .await?;
            return Ok(());
        }
    };

    let candidates = reduce_formats(&media.formats);
    info!(
        "Staging {} format choices for {} ({})",
        candidates.len(),
        media.id,
        media.title.as_deref().unwrap_or("untitled")
    );

    let keyboard = stage_candidates(&state, &url, &candidates).await;
    bot.edit_message_text(chat_id, status.id, "📋 Choose a format:")
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Stage one pending selection per candidate and build the chooser
/// keyboard, two buttons per row. An empty candidate list yields a
/// keyboard with no download buttons.
async fn stage_candidates(
    state: &AppState,
    url: &str,
    candidates: &[FormatCandidate],
) -> InlineKeyboardMarkup {
    let mut buttons = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let token = state
            .pending
            .stage(PendingSelection {
                url: url.to_string(),
                format_id: candidate.format_id.clone(),
                is_audio: candidate.is_audio,
            })
            .await;
        buttons.push(InlineKeyboardButton::callback(
            candidate.label.clone(),
            format!("{}{}", DL_PREFIX, token),
        ));
    }

    let rows: Vec<Vec<InlineKeyboardButton>> = buttons.chunks(2).map(|c| c.to_vec()).collect();
    InlineKeyboardMarkup::new(rows)
}

/// Handle callback query from inline keyboard button press.
pub async fn handle_callback_query(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    if let Some(token) = data.strip_prefix(DL_PREFIX) {
        let token = token.to_string();
        return handle_download_callback(bot, q, token, state).await;
    }

    match data.as_str() {
        "check_join" => handle_check_join(bot, q, state).await,
        "how_to_use" => handle_how_to_use(bot, q, state).await,
        _ => {
            let _ = bot.answer_callback_query(&q.id).await;
            Ok(())
        }
    }
}

/// Re-check membership after the user claims to have joined.
async fn handle_check_join(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    if membership::is_admitted(&bot, &state.config.update_channel, q.from.id).await {
        register_user(&state, q.from.id.0).await;
        bot.answer_callback_query(&q.id)
            .text("✅ You're in! Welcome.")
            .await?;
        if let Some(msg) = q.message {
            send_welcome(&bot, msg.chat.id, &q.from.first_name, &state.config).await?;
        }
    } else {
        bot.answer_callback_query(&q.id)
            .text("🚫 Still not joined.")
            .await?;
    }
    Ok(())
}

async fn handle_how_to_use(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let _ = bot.answer_callback_query(&q.id).await;
    let Some(msg) = q.message else {
        return Ok(());
    };
    let text = format!(
        "📥 *How to Use:*\n\n\
         1. Copy a link from YouTube, TikTok, Instagram, Facebook, or Twitter.\n\
         2. Paste it here.\n\
         3. Choose your preferred format (resolution or MP3).\n\
         4. Receive your file right in this chat! 🎉\n\n\
         🔄 Limit: {} downloads per hour.",
        state.config.hourly_limit
    );
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .await?;
    Ok(())
}

/// A dl:<token> press: consume the selection and run the download.
async fn handle_download_callback(
    bot: Bot,
    q: CallbackQuery,
    token: String,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let uid = q.from.id;

    // Without the originating message there is no chat to deliver into;
    // bail before the token is consumed or a rate slot taken.
    let Some(msg) = q.message else {
        bot.answer_callback_query(&q.id)
            .text("⚠️ Expired request.")
            .await?;
        return Ok(());
    };
    let chat_id = msg.chat.id;

    // Atomic pop: a token is redeemable exactly once. The pop happens
    // before the rate check, so a rate-limited click still consumes the
    // selection and the button cannot be retried later.
    let Some(selection) = state.pending.take(&token).await else {
        bot.answer_callback_query(&q.id)
            .text("⚠️ Expired request.")
            .await?;
        return Ok(());
    };

    // Reserve the rate slot here, not after the download: admission and
    // recording are one atomic step, so a burst of clicks cannot all pass
    // the gate before any slot lands. Attempts that end without a
    // delivery hand the slot back.
    if !state
        .rate_limiter
        .try_acquire(uid.0, state.config.hourly_limit)
        .await
    {
        bot.answer_callback_query(&q.id)
            .text(format!(
                "⚠️ Hourly limit reached ({}).",
                state.config.hourly_limit
            ))
            .await?;
        return Ok(());
    }

    bot.answer_callback_query(&q.id)
        .text("⬇️ Downloading…")
        .await?;
    let _ = bot
        .edit_message_text(chat_id, msg.id, "⬇️ Downloading…")
        .await;

    // Run the download off the dispatcher loop so other updates keep
    // flowing; the token is already consumed, so a concurrent duplicate
    // press cannot start a second download.
    tokio::spawn(async move {
        execute_download_and_send(&bot, chat_id, uid, selection, &state).await;
    });
    Ok(())
}

/// Download the staged selection, enforce the size ceiling, and deliver
/// the file. The rate slot was reserved at click time; any path that ends
/// without a delivery hands it back. A reaper pass runs on every exit.
async fn execute_download_and_send(
    bot: &Bot,
    chat_id: ChatId,
    uid: UserId,
    selection: PendingSelection,
    state: &AppState,
) {
    match run_download(bot, chat_id, &selection, state).await {
        Ok(()) => {}
        Err(DownloadError::Oversize { actual, limit }) => {
            state.rate_limiter.release(uid.0).await;
            let _ = bot
                .send_message(
                    chat_id,
                    format!(
                        "⚠️ File too large ({:.1} MB). Limit: {:.0} MB.",
                        actual as f64 / 1e6,
                        limit as f64 / 1e6
                    ),
                )
                .await;
        }
        Err(e) => {
            state.rate_limiter.release(uid.0).await;
            error!("Download failed for {}: {}", selection.url, e);
            let _ = bot
                .send_message(chat_id, "❌ Something went wrong. Please try again later.")
                .await;
        }
    }

    reaper::reap(&state.config.download_dir, state.config.file_ttl);
}

/// The fallible part of the pipeline: extraction, size gate, delivery.
/// The oversize path deletes the file and the caller skips recording.
async fn run_download(
    bot: &Bot,
    chat_id: ChatId,
    selection: &PendingSelection,
    state: &AppState,
) -> Result<(), DownloadError> {
    let path = state
        .ytdlp
        .download(&selection.url, &selection.format_id, selection.is_audio)
        .await?;

    let size = std::fs::metadata(&path)
        .map(|m| m.len())
        .map_err(|e| DownloadError::Delivery(format!("stat {}: {}", path.display(), e)))?;
    if let Err(e) = check_size(size, state.config.max_file_size) {
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }

    let input = InputFile::file(&path);
    let sent = if !selection.is_audio && is_video_file(&path) {
        bot.send_video(chat_id, input)
            .caption("🎬 Here's your video!")
            .await
    } else {
        bot.send_audio(chat_id, input)
            .caption("🎧 Here's your audio!")
            .await
    };
    sent.map_err(|e| DownloadError::Delivery(e.to_string()))?;
    Ok(())
}

/// Size ceiling gate, split out so the oversize path is unit-testable.
fn check_size(actual: u64, limit: u64) -> Result<(), DownloadError> {
    if actual > limit {
        Err(DownloadError::Oversize { actual, limit })
    } else {
        Ok(())
    }
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .map_or(false, |e| VIDEO_EXTS.contains(&e.as_str()))
}

async fn register_user(state: &AppState, uid: u64) {
    match state.registry.add(uid).await {
        Ok(true) => info!("New user registered: {}", uid),
        Ok(false) => {}
        Err(e) => error!("Failed to persist user {}: {}", uid, e),
    }
}

async fn send_join_prompt(bot: &Bot, chat_id: ChatId, config: &Config) -> ResponseResult<()> {
    let text = format!(
        "🚫 You must join our 📢 *Updates Channel* to use this bot.\n\n\
         👉 [Join Now](https://t.me/{})\n\n\
         Then press ✅ *I've Joined*",
        config.channel_slug()
    );
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ I've Joined",
        "check_join",
    )]]);
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn send_welcome(
    bot: &Bot,
    chat_id: ChatId,
    first_name: &str,
    config: &Config,
) -> ResponseResult<()> {
    let welcome = format!(
        "👋 Hello, *{}*!\n\n\
         I can help you download videos/audio from:\n\
         📺 YouTube | 🎵 TikTok | 📸 Instagram | 🐦 Twitter | 📘 Facebook\n\n\
         👇 Paste any supported link, or pick an option:",
        first_name
    );
    bot.send_message(chat_id, welcome)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(main_menu_keyboard(config))
        .await?;
    Ok(())
}

fn main_menu_keyboard(config: &Config) -> InlineKeyboardMarkup {
    let mut row = vec![InlineKeyboardButton::callback("📥 How to Use", "how_to_use")];
    if let Ok(url) = Url::parse(&format!("https://t.me/{}", config.channel_slug())) {
        row.push(InlineKeyboardButton::url("📢 Updates Channel", url));
    }
    let mut rows = vec![row];
    if let Ok(url) = Url::parse(&format!("https://t.me/{}", config.admin_username)) {
        rows.push(vec![InlineKeyboardButton::url("💬 Contact Admin", url)]);
    }
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_gate_allows_at_or_under_limit() {
        assert!(check_size(100, 100).is_ok());
        assert!(check_size(99, 100).is_ok());
    }

    #[test]
    fn size_gate_rejects_over_limit() {
        match check_size(101, 100) {
            Err(DownloadError::Oversize { actual, limit }) => {
                assert_eq!(actual, 101);
                assert_eq!(limit, 100);
            }
            other => panic!("expected oversize, got {:?}", other),
        }
    }

    #[test]
    fn video_extensions_are_recognized() {
        assert!(is_video_file(Path::new("/tmp/a.mp4")));
        assert!(is_video_file(Path::new("/tmp/a.MKV")));
        assert!(is_video_file(Path::new("/tmp/a.webm")));
        assert!(!is_video_file(Path::new("/tmp/a.mp3")));
        assert!(!is_video_file(Path::new("/tmp/noext")));
    }
}
