/// Environment-sourced configuration.
///
/// Only the bot token is required; every other key has a default. Malformed
/// numeric values fall back to the default rather than aborting startup.
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{SnagError, SnagResult};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_HOURLY_LIMIT: usize = 5;
pub const DEFAULT_FILE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot API token.
    pub bot_token: String,
    /// Numeric id of the single admin account (broadcast authorization).
    pub admin_id: u64,
    /// Admin contact handle, without the leading `@`.
    pub admin_username: String,
    /// Update channel handle, with the leading `@` (force-join target).
    pub update_channel: String,
    /// Path of the JSON user-registry file.
    pub registry_path: PathBuf,
    /// Directory downloads land in; owned by the reaper.
    pub download_dir: PathBuf,
    /// Ceiling on deliverable file size, in bytes.
    pub max_file_size: u64,
    /// Downloads allowed per user per trailing hour.
    pub hourly_limit: usize,
    /// Age past which a downloaded file is eligible for deletion.
    pub file_ttl: Duration,
}

impl Config {
    pub fn from_env() -> SnagResult<Self> {
        let bot_token = std::env::var("TELOXIDE_TOKEN")
            .map_err(|_| SnagError::Config("TELOXIDE_TOKEN must be set".into()))?;

        Ok(Self {
            bot_token,
            admin_id: env_parse("ADMIN_ID", 0),
            admin_username: env_or("ADMIN_USERNAME", "admin"),
            update_channel: env_or("UPDATE_CHANNEL", "@snag_updates"),
            registry_path: PathBuf::from(env_or("REGISTRY_FILE", "users.json")),
            download_dir: PathBuf::from(env_or("DOWNLOAD_DIR", "downloads")),
            max_file_size: env_parse("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE),
            hourly_limit: env_parse("HOURLY_LIMIT", DEFAULT_HOURLY_LIMIT),
            file_ttl: Duration::from_secs(env_parse("FILE_TTL_SECS", DEFAULT_FILE_TTL_SECS)),
        })
    }

    /// Channel name without the leading `@`, for building t.me links.
    pub fn channel_slug(&self) -> &str {
        self.update_channel.trim_start_matches('@')
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
