use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use pterobot_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::Command,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (name, args) = parse_command(text);
    let cmd = Command {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        message_id: MessageId(msg.id.0),
        name,
        args,
    };

    if let Err(err) = state.relay.handle_command(&cmd).await {
        tracing::warn!(error = %err, command = %cmd.name, "command handling failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_slash_and_bot_suffix() {
        assert_eq!(
            parse_command("/servers@my_bot"),
            ("servers".to_string(), String::new())
        );
        assert_eq!(
            parse_command("/Start  hello there"),
            ("start".to_string(), "hello there".to_string())
        );
    }
}
