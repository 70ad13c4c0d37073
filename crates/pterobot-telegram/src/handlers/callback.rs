use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use pterobot_core::domain::{ChatId, MessageId, MessageRef, UserId};

use crate::router::AppState;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Without an originating message there is no chat to act in (inline-mode
    // buttons); just clear the client spinner.
    let (Some(message), Some(data)) = (q.message.as_ref(), q.data.clone()) else {
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    let chat_id = ChatId(message.chat.id.0);
    let cb = pterobot_core::messaging::types::CallbackQuery {
        chat_id,
        user_id: UserId(q.from.id.0 as i64),
        callback_id: q.id.clone(),
        data,
        message: Some(MessageRef {
            chat_id,
            message_id: MessageId(message.id.0),
        }),
    };

    if let Err(err) = state.relay.handle_callback(&cb).await {
        tracing::warn!(error = %err, data = %cb.data, "callback handling failed");
    }
    Ok(())
}
