use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub panel_base_url: String,
    pub bot_title: String,

    /// Flat JSON file mapping user id → panel API key.
    pub credentials_file: PathBuf,

    /// How long a free-text prompt stays armed before it expires.
    pub prompt_ttl: Duration,

    /// Per-request timeout for panel HTTP calls.
    pub panel_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let panel_base_url = env_str("PANEL_BASE_URL")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("PANEL_BASE_URL environment variable is required".to_string())
            })?
            .trim_end_matches('/')
            .to_string();

        let bot_title = env_str("BOT_TITLE")
            .and_then(non_empty)
            .unwrap_or_else(|| "Panel Control".to_string());

        let credentials_file =
            env_path("CREDENTIALS_FILE").unwrap_or_else(|| PathBuf::from("apikeys.json"));

        let prompt_ttl = Duration::from_secs(env_u64("PROMPT_TTL_SECS").unwrap_or(15));
        let panel_timeout = Duration::from_secs(env_u64("PANEL_TIMEOUT_SECS").unwrap_or(10));

        Ok(Self {
            telegram_bot_token,
            panel_base_url,
            bot_title,
            credentials_file,
            prompt_ttl,
            panel_timeout,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
