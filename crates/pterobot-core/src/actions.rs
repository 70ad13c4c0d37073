//! Button actions, decoded once at the chat boundary.
//!
//! Callback payloads are opaque strings on the wire (`add_api_key`,
//! `server_<id>`, `server_<id>_<action>`); handlers only ever see the typed
//! form. Strings that decode to nothing are ignored by the router.

use crate::panel::PowerSignal;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    AddApiKey,
    RemoveApiKey,
    BackToServers,
    Server {
        server_id: String,
        action: ServerAction,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerAction {
    /// Open the per-server action menu.
    Menu,
    Info,
    Resources,
    Power(PowerSignal),
    Command,
    Rename,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "add_api_key" => return Some(Self::AddApiKey),
            "remove_api_key" => return Some(Self::RemoveApiKey),
            "back_to_servers" => return Some(Self::BackToServers),
            _ => {}
        }

        let rest = data.strip_prefix("server_")?;
        let (server_id, action) = match rest.split_once('_') {
            None => (rest, ServerAction::Menu),
            Some((id, suffix)) => (id, ServerAction::parse(suffix)?),
        };
        if server_id.is_empty() {
            return None;
        }
        Some(Self::Server {
            server_id: server_id.to_string(),
            action,
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::AddApiKey => "add_api_key".to_string(),
            Self::RemoveApiKey => "remove_api_key".to_string(),
            Self::BackToServers => "back_to_servers".to_string(),
            Self::Server { server_id, action } => match action.suffix() {
                None => format!("server_{server_id}"),
                Some(suffix) => format!("server_{server_id}_{suffix}"),
            },
        }
    }
}

impl ServerAction {
    fn parse(s: &str) -> Option<Self> {
        if let Some(signal) = PowerSignal::parse(s) {
            return Some(Self::Power(signal));
        }
        match s {
            "info" => Some(Self::Info),
            "resources" => Some(Self::Resources),
            "command" => Some(Self::Command),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }

    fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Menu => None,
            Self::Info => Some("info"),
            Self::Resources => Some("resources"),
            Self::Power(signal) => Some(signal.as_str()),
            Self::Command => Some("command"),
            Self::Rename => Some("rename"),
        }
    }
}
