use std::sync::Arc;

use pterobot_core::{config::Config, panel::PanelClient};
use pterobot_panel::HttpPanelClient;

#[tokio::main]
async fn main() -> Result<(), pterobot_core::Error> {
    pterobot_core::logging::init("pterobot")?;

    let cfg = Arc::new(Config::load()?);
    let panel: Arc<dyn PanelClient> = Arc::new(HttpPanelClient::new(
        cfg.panel_base_url.clone(),
        cfg.panel_timeout,
    ));

    pterobot_telegram::router::run_polling(cfg, panel)
        .await
        .map_err(|e| pterobot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
