//! Telegram update handlers.
//!
//! Each handler converts the teloxide update into the core messaging model
//! and forwards it to the relay; flow decisions live in `pterobot-core`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use pterobot_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::TextMessage,
};

use crate::router::AppState;

mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    // Replies feed the prompt registry; ones nothing is waiting for are
    // dropped without comment.
    if let Some(anchor) = msg.reply_to_message() {
        let reply = TextMessage {
            chat_id: ChatId(msg.chat.id.0),
            user_id: UserId(user.id.0 as i64),
            message_id: MessageId(msg.id.0),
            reply_to: Some(MessageId(anchor.id.0)),
            text: msg.text().map(|s| s.to_string()),
        };
        state.relay.handle_reply(&reply).await;
        return Ok(());
    }

    if msg.text().is_some_and(|t| t.starts_with('/')) {
        return commands::handle_command(msg, state).await;
    }

    // Plain text outside a reply flow is ignored.
    Ok(())
}
