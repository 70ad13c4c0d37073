use crate::domain::{ChatId, MessageId, MessageRef, UserId};

/// A slash command, already split into name and argument tail.
/// Messenger-specific decorations (`@botname` suffixes) are stripped by the
/// adapter before this is built.
#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub name: String,
    pub args: String,
}

/// A free-text message; `reply_to` is set when it replies to another message.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub reply_to: Option<MessageId>,
    pub text: Option<String>,
}

/// A button press. `data` is the raw action string; it is decoded into a
/// typed action exactly once, in the relay.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub callback_id: String,
    pub data: String,
    /// The message carrying the pressed keyboard, when the messenger
    /// provides it; views are edited in place through this.
    pub message: Option<MessageRef>,
}

/// Inline keyboard, one button per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: String,
}

impl InlineKeyboard {
    pub fn button(mut self, label: impl Into<String>, action: impl Into<String>) -> Self {
        self.buttons.push(InlineButton {
            label: label.into(),
            action: action.into(),
        });
        self
    }
}
