//! `all <pesan>`: broadcast a message mentioning every group member.

use tracing::error;

use super::Reply;
use crate::whatsapp::message::is_group_jid;
use crate::whatsapp::Transport;

/// Sent outside of group chats.
pub const NOT_GROUP: &str = "❌ Command ini hanya bisa digunakan di grup";

/// Sent when the sender is not a group admin.
pub const NOT_ADMIN: &str = "❌ Hanya admin yang bisa menggunakan command ini";

/// Sent when metadata lookup or delivery fails.
pub const FAILED: &str = "❌ Terjadi kesalahan saat memproses command";

/// Sent when no message follows the command.
pub fn empty_body(prefix: &str) -> String {
    format!("❌ Silakan masukkan pesan setelah command {prefix}all")
}

/// Handle `all`.
///
/// Group metadata is fetched on every call; admin status changes take
/// effect immediately.
pub async fn handle_all(
    transport: &dyn Transport,
    chat: &str,
    sender: &str,
    body: &str,
    prefix: &str,
) -> Reply {
    if !is_group_jid(chat) {
        return Reply::text(NOT_GROUP);
    }

    let metadata = match transport.group_metadata(chat).await {
        Ok(metadata) => metadata,
        Err(e) => {
            error!(error = %e, chat, "failed to fetch group metadata");
            return Reply::text(FAILED);
        }
    };

    if !metadata.is_admin(sender) {
        return Reply::text(NOT_ADMIN);
    }

    let body = body.trim();
    if body.is_empty() {
        return Reply::text(empty_body(prefix));
    }

    Reply::Text {
        text: body.to_owned(),
        mentions: metadata.participant_ids(),
    }
}
