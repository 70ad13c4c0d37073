//! The relay: every user-visible flow lives here.
//!
//! Control flow per event: look up the credential, make at most one panel
//! call, render the result, send or edit a chat message, and optionally arm
//! a pending prompt for a free-text follow-up. The chat front-end and the
//! panel are reached only through their ports, so the whole service runs
//! against fakes in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{
    actions::{CallbackAction, ServerAction},
    config::Config,
    credentials::{validate_api_key, ApiKeyStore},
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, InlineKeyboard, TextMessage},
    },
    panel::{PanelClient, PowerSignal},
    presenter,
    prompts::{handler, ExpireHandler, PromptRegistry, Reply, ReplyHandler},
    Result,
};

#[derive(Clone)]
pub struct PanelRelay {
    cfg: Arc<Config>,
    store: Arc<ApiKeyStore>,
    prompts: PromptRegistry,
    panel: Arc<dyn PanelClient>,
    messenger: Arc<dyn MessagingPort>,
}

impl PanelRelay {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<ApiKeyStore>,
        panel: Arc<dyn PanelClient>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            cfg,
            store,
            prompts: PromptRegistry::new(),
            panel,
            messenger,
        }
    }

    /// Slash-command dispatch. Unknown commands are ignored.
    pub async fn handle_command(&self, cmd: &Command) -> Result<()> {
        let target = Some(MessageRef {
            chat_id: cmd.chat_id,
            message_id: cmd.message_id,
        });
        match cmd.name.as_str() {
            "start" => {
                self.messenger
                    .send_html(cmd.chat_id, &presenter::greeting_text(&self.cfg.bot_title))
                    .await?;
                Ok(())
            }
            "account" => self.show_account(cmd.chat_id, target, cmd.user_id).await,
            "profile" => self.show_profile(cmd.chat_id, target, cmd.user_id).await,
            "servers" => self.show_servers(cmd.chat_id, target, cmd.user_id).await,
            _ => Ok(()),
        }
    }

    /// Route a reply-to-message into the prompt registry.
    ///
    /// Returns true when a pending prompt consumed it; replies to anything
    /// else are ignored.
    pub async fn handle_reply(&self, msg: &TextMessage) -> bool {
        let Some(anchor) = msg.reply_to else {
            return false;
        };
        let reply = Reply {
            message: MessageRef {
                chat_id: msg.chat_id,
                message_id: msg.message_id,
            },
            text: msg.text.clone(),
        };
        self.prompts.fulfill(msg.chat_id, anchor, reply).await
    }

    /// Button-press dispatch. The action string is decoded once here; strings
    /// that decode to nothing are ignored (the callback is still answered so
    /// the client spinner clears).
    pub async fn handle_callback(&self, cb: &CallbackQuery) -> Result<()> {
        let Some(action) = CallbackAction::parse(&cb.data) else {
            return self
                .messenger
                .answer_callback_query(&cb.callback_id, None)
                .await;
        };

        // Remove answers with a toast after the fact; everything else
        // acknowledges up front.
        if action != CallbackAction::RemoveApiKey {
            self.messenger
                .answer_callback_query(&cb.callback_id, None)
                .await?;
        }

        match action {
            CallbackAction::AddApiKey => {
                self.prompt_for_api_key(cb.user_id, cb.chat_id, cb.message)
                    .await
            }
            CallbackAction::RemoveApiKey => {
                let toast = match self.store.remove(cb.user_id).await {
                    Ok(()) => "API key removed.",
                    Err(err) => {
                        tracing::warn!(error = %err, user_id = cb.user_id.0, "key removal failed");
                        self.messenger
                            .send_html(
                                cb.chat_id,
                                &presenter::remote_error_text("Removing the API key", &err),
                            )
                            .await?;
                        "API key was not removed."
                    }
                };
                self.messenger
                    .answer_callback_query(&cb.callback_id, Some(toast))
                    .await?;
                self.show_profile(cb.chat_id, cb.message, cb.user_id).await
            }
            CallbackAction::BackToServers => {
                self.show_servers(cb.chat_id, cb.message, cb.user_id).await
            }
            CallbackAction::Server { server_id, action } => match action {
                ServerAction::Menu => self.show_server_menu(cb.chat_id, cb.message, &server_id).await,
                ServerAction::Info => {
                    self.show_server_details(cb.chat_id, cb.user_id, &server_id)
                        .await
                }
                ServerAction::Resources => {
                    self.show_server_resources(cb.chat_id, cb.user_id, &server_id)
                        .await
                }
                ServerAction::Power(signal) => {
                    self.send_power(cb.chat_id, cb.user_id, &server_id, signal)
                        .await
                }
                ServerAction::Command => {
                    self.prompt_for_command(cb.user_id, cb.chat_id, server_id)
                        .await
                }
                ServerAction::Rename => {
                    self.prompt_for_rename(cb.user_id, cb.chat_id, server_id)
                        .await
                }
            },
        }
    }

    // ===== View flows =====

    async fn show_account(
        &self,
        chat_id: ChatId,
        target: Option<MessageRef>,
        user_id: UserId,
    ) -> Result<()> {
        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel.account(&api_key).await
        }
        .await;

        match result {
            Ok(account) => {
                self.edit_or_send(target, chat_id, &presenter::account_text(&account), None)
                    .await?;
            }
            Err(err) => {
                self.messenger
                    .send_html(
                        chat_id,
                        &presenter::remote_error_text("Fetching account info", &err),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn show_profile(
        &self,
        chat_id: ChatId,
        target: Option<MessageRef>,
        user_id: UserId,
    ) -> Result<()> {
        let api_key = self.store.get(user_id).await;
        let (text, keyboard) = presenter::profile_view(user_id, api_key.as_deref());
        self.edit_or_send(target, chat_id, &text, Some(keyboard))
            .await?;
        Ok(())
    }

    async fn show_servers(
        &self,
        chat_id: ChatId,
        target: Option<MessageRef>,
        user_id: UserId,
    ) -> Result<()> {
        let Ok(api_key) = self.require_api_key(user_id).await else {
            self.edit_or_send(target, chat_id, &presenter::no_credential_servers_text(), None)
                .await?;
            return Ok(());
        };

        match self.panel.servers(&api_key).await {
            Ok(servers) => {
                let (text, keyboard) = presenter::server_list_view(&servers);
                self.edit_or_send(target, chat_id, &text, Some(keyboard))
                    .await?;
            }
            Err(err) => {
                self.edit_or_send(
                    target,
                    chat_id,
                    &presenter::remote_error_text("Fetching servers", &err),
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn show_server_menu(
        &self,
        chat_id: ChatId,
        target: Option<MessageRef>,
        server_id: &str,
    ) -> Result<()> {
        let (text, keyboard) = presenter::server_menu_view(server_id);
        self.edit_or_send(target, chat_id, &text, Some(keyboard))
            .await?;
        Ok(())
    }

    async fn show_server_details(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        server_id: &str,
    ) -> Result<()> {
        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel.server_details(&api_key, server_id).await
        }
        .await;

        let text = match result {
            Ok(details) => presenter::server_details_text(&details),
            Err(err) => presenter::remote_error_text("Fetching server info", &err),
        };
        self.messenger.send_html(chat_id, &text).await?;
        Ok(())
    }

    async fn show_server_resources(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        server_id: &str,
    ) -> Result<()> {
        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel.server_resources(&api_key, server_id).await
        }
        .await;

        let text = match result {
            Ok(resources) => presenter::server_resources_text(&resources),
            Err(err) => presenter::remote_error_text("Fetching resource usage", &err),
        };
        self.messenger.send_html(chat_id, &text).await?;
        Ok(())
    }

    async fn send_power(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<()> {
        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel
                .send_power_signal(&api_key, server_id, signal)
                .await
        }
        .await;

        let text = match result {
            Ok(()) => presenter::power_sent_text(signal),
            Err(err) => {
                let what = format!("Sending power signal '{}'", signal.as_str());
                presenter::remote_error_text(&what, &err)
            }
        };
        self.messenger.send_html(chat_id, &text).await?;
        Ok(())
    }

    // ===== Free-text prompt flows =====

    async fn prompt_for_api_key(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        profile_msg: Option<MessageRef>,
    ) -> Result<()> {
        let question = self
            .messenger
            .send_html(chat_id, "Please enter your API key:")
            .await?;

        let this = self.clone();
        let on_reply: ReplyHandler = Box::new(move |reply| {
            handler(async move {
                if let Err(err) = this.finish_api_key_entry(user_id, profile_msg, reply).await {
                    tracing::warn!(error = %err, "api key entry failed");
                }
            })
        });
        let this = self.clone();
        let on_expire: ExpireHandler =
            Box::new(move || handler(async move { this.expire_prompt(question).await }));

        self.prompts
            .arm(
                chat_id,
                question.message_id,
                on_reply,
                on_expire,
                self.cfg.prompt_ttl,
            )
            .await;
        Ok(())
    }

    async fn finish_api_key_entry(
        &self,
        user_id: UserId,
        profile_msg: Option<MessageRef>,
        reply: Reply,
    ) -> Result<()> {
        let chat_id = reply.message.chat_id;
        let candidate = reply.text.unwrap_or_default().trim().to_string();

        if validate_api_key(&candidate) {
            match self.store.set(user_id, candidate).await {
                Ok(()) => {
                    self.messenger.send_html(chat_id, "API key added.").await?;
                }
                Err(err) => {
                    self.messenger
                        .send_html(
                            chat_id,
                            &presenter::remote_error_text("Saving the API key", &err),
                        )
                        .await?;
                }
            }
        } else {
            // One-shot validation: the prompt is not re-armed.
            self.messenger
                .send_html(
                    chat_id,
                    "That does not look like a panel API key. Use /profile to try again.",
                )
                .await?;
        }

        self.show_profile(chat_id, profile_msg, user_id).await
    }

    fn prompt_for_command(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        server_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let question = self
                .messenger
                .send_html(chat_id, "Please enter the command to send to the server:")
                .await?;

            let this = self.clone();
            let on_reply: ReplyHandler = Box::new(move |reply| {
                handler(async move {
                    if let Err(err) = this
                        .finish_command_entry(user_id, server_id, question, reply)
                        .await
                    {
                        tracing::warn!(error = %err, "command entry failed");
                    }
                })
            });
            let this = self.clone();
            let on_expire: ExpireHandler =
                Box::new(move || handler(async move { this.expire_prompt(question).await }));

            self.prompts
                .arm(
                    chat_id,
                    question.message_id,
                    on_reply,
                    on_expire,
                    self.cfg.prompt_ttl,
                )
                .await;
            Ok(())
        })
    }

    async fn finish_command_entry(
        &self,
        user_id: UserId,
        server_id: String,
        question: MessageRef,
        reply: Reply,
    ) -> Result<()> {
        let chat_id = reply.message.chat_id;
        let command = reply.text.unwrap_or_default().trim().to_string();
        if command.is_empty() {
            self.messenger
                .send_html(chat_id, "Command cannot be empty.")
                .await?;
            return self.prompt_for_command(user_id, chat_id, server_id).await;
        }

        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel.send_command(&api_key, &server_id, &command).await
        }
        .await;

        match result {
            Ok(()) => {
                self.discard_question(question).await;
                self.messenger
                    .send_html(chat_id, &presenter::command_sent_text(&command))
                    .await?;
            }
            Err(err) => {
                self.messenger
                    .send_html(
                        chat_id,
                        &presenter::remote_error_text("Sending the command", &err),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn prompt_for_rename(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        server_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let question = self
                .messenger
                .send_html(chat_id, "Please enter the new server name:")
                .await?;

            let this = self.clone();
            let on_reply: ReplyHandler = Box::new(move |reply| {
                handler(async move {
                    if let Err(err) = this
                        .finish_rename_entry(user_id, server_id, question, reply)
                        .await
                    {
                        tracing::warn!(error = %err, "rename entry failed");
                    }
                })
            });
            let this = self.clone();
            let on_expire: ExpireHandler =
                Box::new(move || handler(async move { this.expire_prompt(question).await }));

            self.prompts
                .arm(
                    chat_id,
                    question.message_id,
                    on_reply,
                    on_expire,
                    self.cfg.prompt_ttl,
                )
                .await;
            Ok(())
        })
    }

    async fn finish_rename_entry(
        &self,
        user_id: UserId,
        server_id: String,
        question: MessageRef,
        reply: Reply,
    ) -> Result<()> {
        let chat_id = reply.message.chat_id;
        let name = reply.text.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            self.messenger
                .send_html(chat_id, "Name cannot be empty.")
                .await?;
            return self.prompt_for_rename(user_id, chat_id, server_id).await;
        }

        let result = async {
            let api_key = self.require_api_key(user_id).await?;
            self.panel.rename_server(&api_key, &server_id, &name).await
        }
        .await;

        match result {
            Ok(()) => {
                self.discard_question(question).await;
                self.messenger
                    .send_html(chat_id, &presenter::renamed_text(&name))
                    .await?;
            }
            Err(err) => {
                self.messenger
                    .send_html(
                        chat_id,
                        &presenter::remote_error_text("Renaming the server", &err),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn expire_prompt(&self, question: MessageRef) {
        if let Err(err) = self
            .messenger
            .send_html(question.chat_id, "Timed out waiting for a reply.")
            .await
        {
            tracing::warn!(error = %err, "failed to send expiry notice");
            return;
        }
        self.discard_question(question).await;
    }

    // ===== Helpers =====

    async fn require_api_key(&self, user_id: UserId) -> Result<String> {
        self.store.get(user_id).await.ok_or(Error::NoCredential)
    }

    /// Best-effort removal of a stale question message.
    async fn discard_question(&self, question: MessageRef) {
        if let Err(err) = self.messenger.delete_message(question).await {
            tracing::debug!(error = %err, "failed to delete prompt message");
        }
    }

    /// Edit `target` in place when possible; any edit failure (deleted
    /// message, message the bot does not own) degrades to a fresh send.
    async fn edit_or_send(
        &self,
        target: Option<MessageRef>,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        if let Some(msg) = target {
            match self.messenger.edit_html(msg, html, keyboard.clone()).await {
                Ok(()) => return Ok(msg),
                Err(err) => {
                    tracing::debug!(error = %err, "edit failed, sending a new message");
                }
            }
        }
        match keyboard {
            Some(kb) => self.messenger.send_inline_keyboard(chat_id, html, kb).await,
            None => self.messenger.send_html(chat_id, html).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI32, Ordering},
        Mutex as StdMutex,
    };
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        credentials::{MemoryBackend, API_KEY_PREFIX},
        domain::MessageId,
        panel::{Account, ServerDetails, ServerResources, ServerSummary},
    };

    const CHAT: ChatId = ChatId(10);
    const USER: UserId = UserId(7);

    fn sample_key() -> String {
        format!("{}{}", API_KEY_PREFIX, "a".repeat(43))
    }

    fn test_config(prompt_ttl: Duration) -> Config {
        Config {
            telegram_bot_token: "token".to_string(),
            panel_base_url: "https://panel.example".to_string(),
            bot_title: "Panel Control".to_string(),
            credentials_file: "/tmp/unused.json".into(),
            prompt_ttl,
            panel_timeout: Duration::from_secs(1),
        }
    }

    /// Panel fake: records every call, optionally fails them all with one
    /// HTTP status.
    #[derive(Default)]
    struct FakePanel {
        calls: StdMutex<Vec<String>>,
        fail_status: Option<u16>,
    }

    impl FakePanel {
        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().expect("calls lock").push(call);
            match self.fail_status {
                Some(status) => Err(Error::Remote {
                    status: Some(status),
                    message: format!("unexpected status {status}"),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl PanelClient for FakePanel {
        async fn account(&self, _api_key: &str) -> Result<Account> {
            self.record("account".to_string())?;
            Ok(Account::default())
        }

        async fn servers(&self, _api_key: &str) -> Result<Vec<ServerSummary>> {
            self.record("servers".to_string())?;
            Ok(vec![ServerSummary {
                identifier: "abc".to_string(),
                name: "Alpha".to_string(),
            }])
        }

        async fn server_details(&self, _api_key: &str, server_id: &str) -> Result<ServerDetails> {
            self.record(format!("details {server_id}"))?;
            Ok(ServerDetails::default())
        }

        async fn server_resources(
            &self,
            _api_key: &str,
            server_id: &str,
        ) -> Result<ServerResources> {
            self.record(format!("resources {server_id}"))?;
            Ok(ServerResources::default())
        }

        async fn send_power_signal(
            &self,
            _api_key: &str,
            server_id: &str,
            signal: PowerSignal,
        ) -> Result<()> {
            self.record(format!("power {server_id} {}", signal.as_str()))
        }

        async fn send_command(&self, _api_key: &str, server_id: &str, command: &str) -> Result<()> {
            self.record(format!("command {server_id} {command}"))
        }

        async fn rename_server(&self, _api_key: &str, server_id: &str, name: &str) -> Result<()> {
            self.record(format!("rename {server_id} {name}"))
        }
    }

    /// Messenger fake: allocates message ids and records traffic.
    #[derive(Default)]
    struct RecordingMessenger {
        next_id: AtomicI32,
        sent: StdMutex<Vec<(MessageRef, String)>>,
        edits: StdMutex<Vec<(MessageRef, String)>>,
        deleted: StdMutex<Vec<MessageRef>>,
        answered: StdMutex<Vec<Option<String>>>,
        fail_edits: bool,
    }

    impl RecordingMessenger {
        fn failing_edits() -> Self {
            Self {
                fail_edits: true,
                ..Self::default()
            }
        }

        fn alloc(&self, chat_id: ChatId) -> MessageRef {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            MessageRef {
                chat_id,
                message_id: MessageId(id),
            }
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .expect("sent lock")
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn edited_texts(&self) -> Vec<String> {
            self.edits
                .lock()
                .expect("edits lock")
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn deleted(&self) -> Vec<MessageRef> {
            self.deleted.lock().expect("deleted lock").clone()
        }

        fn last_sent_ref(&self) -> MessageRef {
            self.sent.lock().expect("sent lock").last().expect("a sent message").0
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            let msg = self.alloc(chat_id);
            self.sent
                .lock()
                .expect("sent lock")
                .push((msg, html.to_string()));
            Ok(msg)
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            html: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.send_html(chat_id, html).await
        }

        async fn edit_html(
            &self,
            msg: MessageRef,
            html: &str,
            _keyboard: Option<InlineKeyboard>,
        ) -> Result<()> {
            if self.fail_edits {
                return Err(Error::External("message can't be edited".to_string()));
            }
            self.edits
                .lock()
                .expect("edits lock")
                .push((msg, html.to_string()));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.deleted.lock().expect("deleted lock").push(msg);
            Ok(())
        }

        async fn answer_callback_query(&self, _callback_id: &str, text: Option<&str>) -> Result<()> {
            self.answered
                .lock()
                .expect("answered lock")
                .push(text.map(|s| s.to_string()));
            Ok(())
        }
    }

    struct Harness {
        relay: PanelRelay,
        panel: Arc<FakePanel>,
        messenger: Arc<RecordingMessenger>,
    }

    fn harness(panel: FakePanel, messenger: RecordingMessenger, ttl: Duration) -> Harness {
        let panel = Arc::new(panel);
        let messenger = Arc::new(messenger);
        let store = Arc::new(
            ApiKeyStore::open(Box::<MemoryBackend>::default()).expect("open store"),
        );
        let relay = PanelRelay::new(
            Arc::new(test_config(ttl)),
            store,
            panel.clone(),
            messenger.clone(),
        );
        Harness {
            relay,
            panel,
            messenger,
        }
    }

    fn command(name: &str) -> Command {
        Command {
            chat_id: CHAT,
            user_id: USER,
            message_id: MessageId(500),
            name: name.to_string(),
            args: String::new(),
        }
    }

    fn callback(data: &str) -> CallbackQuery {
        CallbackQuery {
            chat_id: CHAT,
            user_id: USER,
            callback_id: "cb1".to_string(),
            data: data.to_string(),
            message: Some(MessageRef {
                chat_id: CHAT,
                message_id: MessageId(400),
            }),
        }
    }

    fn reply_to(anchor: MessageId, text: Option<&str>) -> TextMessage {
        TextMessage {
            chat_id: CHAT,
            user_id: USER,
            message_id: MessageId(600),
            reply_to: Some(anchor),
            text: text.map(|s| s.to_string()),
        }
    }

    async fn set_key(h: &Harness) {
        h.relay.store.set(USER, sample_key()).await.expect("set key");
    }

    #[tokio::test]
    async fn servers_without_key_skips_the_panel() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));

        h.relay.handle_command(&command("servers")).await.unwrap();

        assert!(h.panel.calls().is_empty());
        let edited = h.messenger.edited_texts();
        assert_eq!(edited.len(), 1);
        assert!(edited[0].contains("API key is not set"));
        assert!(edited[0].contains("/profile"));
    }

    #[tokio::test]
    async fn panel_500_is_reported_with_status_and_not_retried() {
        let h = harness(FakePanel::failing(500), RecordingMessenger::default(), Duration::from_secs(60));
        set_key(&h).await;

        h.relay.handle_command(&command("servers")).await.unwrap();

        assert_eq!(h.panel.calls(), vec!["servers".to_string()]);
        let edited = h.messenger.edited_texts();
        assert_eq!(edited.len(), 1);
        assert!(edited[0].contains("HTTP 500"));
    }

    #[tokio::test]
    async fn rename_flow_sends_the_replied_text() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));
        set_key(&h).await;

        h.relay
            .handle_callback(&callback("server_abc_rename"))
            .await
            .unwrap();

        let question = h.messenger.last_sent_ref();
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("new server name")));

        let consumed = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some("newname")))
            .await;
        assert!(consumed);
        assert_eq!(h.panel.calls(), vec!["rename abc newname".to_string()]);
        assert!(h.messenger.deleted().contains(&question));
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("renamed to 'newname'")));

        // The prompt is gone; a second reply hits nothing.
        let again = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some("other")))
            .await;
        assert!(!again);
        assert_eq!(h.panel.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_command_reply_asks_again() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));
        set_key(&h).await;

        h.relay
            .handle_callback(&callback("server_abc_command"))
            .await
            .unwrap();
        let first_question = h.messenger.last_sent_ref();

        let consumed = h
            .relay
            .handle_reply(&reply_to(first_question.message_id, Some("   ")))
            .await;
        assert!(consumed);
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("cannot be empty")));
        assert!(h.panel.calls().is_empty());

        // A fresh prompt was armed on a new question message.
        let second_question = h.messenger.last_sent_ref();
        assert_ne!(first_question, second_question);
        let consumed = h
            .relay
            .handle_reply(&reply_to(second_question.message_id, Some("say hi")))
            .await;
        assert!(consumed);
        assert_eq!(h.panel.calls(), vec!["command abc say hi".to_string()]);
    }

    #[tokio::test]
    async fn api_key_entry_validates_and_stores() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));

        h.relay.handle_callback(&callback("add_api_key")).await.unwrap();
        let question = h.messenger.last_sent_ref();

        // Invalid key: reported, not stored, prompt not re-armed.
        let consumed = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some("bad")))
            .await;
        assert!(consumed);
        assert_eq!(h.relay.store.get(USER).await, None);
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("does not look like")));
        let again = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some(&sample_key())))
            .await;
        assert!(!again);
        assert_eq!(h.relay.store.get(USER).await, None);

        // Fresh prompt with a valid key.
        h.relay.handle_callback(&callback("add_api_key")).await.unwrap();
        let question = h.messenger.last_sent_ref();
        let consumed = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some(&sample_key())))
            .await;
        assert!(consumed);
        assert_eq!(h.relay.store.get(USER).await, Some(sample_key()));
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("API key added")));
    }

    #[tokio::test]
    async fn power_button_issues_one_signal() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));
        set_key(&h).await;

        h.relay
            .handle_callback(&callback("server_abc_kill"))
            .await
            .unwrap();

        assert_eq!(h.panel.calls(), vec!["power abc kill".to_string()]);
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("Power signal 'kill' sent")));
    }

    #[tokio::test]
    async fn callback_without_key_reports_and_skips_the_panel() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));

        h.relay
            .handle_callback(&callback("server_abc_info"))
            .await
            .unwrap();

        assert!(h.panel.calls().is_empty());
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("API key is not set")));
    }

    #[tokio::test]
    async fn unknown_callback_is_answered_and_ignored() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_secs(60));

        h.relay.handle_callback(&callback("bogus_action")).await.unwrap();

        assert!(h.panel.calls().is_empty());
        assert!(h.messenger.sent_texts().is_empty());
        assert_eq!(h.messenger.answered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_edit_falls_back_to_a_fresh_send() {
        let h = harness(FakePanel::default(), RecordingMessenger::failing_edits(), Duration::from_secs(60));
        set_key(&h).await;

        h.relay.handle_command(&command("profile")).await.unwrap();

        assert!(h.messenger.edited_texts().is_empty());
        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("Current API token")));
    }

    #[tokio::test]
    async fn expired_prompt_notifies_and_discards_the_question() {
        let h = harness(FakePanel::default(), RecordingMessenger::default(), Duration::from_millis(30));
        set_key(&h).await;

        h.relay
            .handle_callback(&callback("server_abc_rename"))
            .await
            .unwrap();
        let question = h.messenger.last_sent_ref();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(h
            .messenger
            .sent_texts()
            .iter()
            .any(|t| t.contains("Timed out")));
        assert!(h.messenger.deleted().contains(&question));

        // The late reply is ignored.
        let consumed = h
            .relay
            .handle_reply(&reply_to(question.message_id, Some("newname")))
            .await;
        assert!(!consumed);
        assert!(h.panel.calls().is_empty());
    }
}
