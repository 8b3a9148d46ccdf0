/// Force-join membership gate.
use teloxide::prelude::*;
use teloxide::types::{ChatMemberStatus, Recipient, UserId};
use tracing::debug;

/// Whether the user may use the bot: they must be a member, administrator,
/// or owner of the update channel. A failed lookup is indistinguishable
/// from non-membership; both yield false. No retries.
pub async fn is_admitted(bot: &Bot, channel: &str, user_id: UserId) -> bool {
    let chat = Recipient::ChannelUsername(channel.to_string());
    match bot.get_chat_member(chat, user_id).await {
        Ok(member) => matches!(
            member.status(),
            ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member
        ),
        Err(e) => {
            debug!("Membership lookup failed for {}: {}", user_id, e);
            false
        }
    }
}
