use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use pterobot_core::{
    config::Config,
    credentials::{ApiKeyStore, FileBackend},
    messaging::port::MessagingPort,
    panel::PanelClient,
    relay::PanelRelay,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<PanelRelay>,
}

pub async fn run_polling(cfg: Arc<Config>, panel: Arc<dyn PanelClient>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = me.username(), "pterobot started");
    }

    let store = Arc::new(ApiKeyStore::open(Box::new(FileBackend::new(
        cfg.credentials_file.clone(),
    )))?);
    tracing::info!(path = %cfg.credentials_file.display(), "credential store loaded");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let relay = Arc::new(PanelRelay::new(cfg, store, panel, messenger));

    let state = Arc::new(AppState { relay });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
