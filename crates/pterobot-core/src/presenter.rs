//! Rendering of panel data into chat text and button layouts.
//!
//! Everything here is a pure function returning already-escaped Telegram
//! HTML; nothing fails. The relay decides where the output goes.

use crate::{
    actions::{CallbackAction, ServerAction},
    domain::UserId,
    errors::Error,
    messaging::types::InlineKeyboard,
    panel::{Account, PowerSignal, ServerDetails, ServerResources, ServerSummary},
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Human label for a panel power state; unknown states pass through.
pub fn state_label(state: &str) -> &str {
    match state {
        "starting" => "Starting",
        "running" => "Running",
        "stopping" => "Stopping",
        "offline" => "Offline",
        "installing" => "Installing",
        "install_failed" => "Install failed",
        "suspended" => "Suspended",
        "restoring_backup" => "Restoring backup",
        other => other,
    }
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "Yes"
    } else {
        "No"
    }
}

const MIB: u64 = 1024 * 1024;

pub fn greeting_text(title: &str) -> String {
    format!(
        "Hello! This is <b>{}</b>.\nIt lets you manage your servers without opening the panel.",
        escape_html(title)
    )
}

pub fn account_text(acc: &Account) -> String {
    format!(
        "<b>ID:</b> {}\n\
         <b>Admin:</b> {}\n\
         <b>Username:</b> {}\n\
         <b>Email:</b> {}\n\
         <b>Name:</b> {} {}",
        acc.id,
        yes_no(acc.admin),
        escape_html(&acc.username),
        escape_html(&acc.email),
        escape_html(&acc.first_name),
        escape_html(&acc.last_name),
    )
}

pub fn profile_view(user_id: UserId, api_key: Option<&str>) -> (String, InlineKeyboard) {
    match api_key {
        Some(key) => (
            format!(
                "<b>Your ID:</b> {}\n<b>Current API token:</b> <code>{}</code>",
                user_id.0,
                escape_html(key)
            ),
            InlineKeyboard::default()
                .button("Remove API key", CallbackAction::RemoveApiKey.encode()),
        ),
        None => (
            format!(
                "<b>Your ID:</b> {}\n<b>Current API token:</b> not set",
                user_id.0
            ),
            InlineKeyboard::default().button("Add API key", CallbackAction::AddApiKey.encode()),
        ),
    }
}

pub fn server_list_view(servers: &[ServerSummary]) -> (String, InlineKeyboard) {
    let text = format!("Available servers: {}", servers.len());
    let mut keyboard = InlineKeyboard::default();
    for server in servers {
        let action = CallbackAction::Server {
            server_id: server.identifier.clone(),
            action: ServerAction::Menu,
        };
        keyboard = keyboard.button(
            format!("{} ({})", server.name, server.identifier),
            action.encode(),
        );
    }
    (text, keyboard)
}

pub fn server_menu_view(server_id: &str) -> (String, InlineKeyboard) {
    let actions: [(&str, ServerAction); 8] = [
        ("Info", ServerAction::Info),
        ("Resource usage", ServerAction::Resources),
        ("Start", ServerAction::Power(PowerSignal::Start)),
        ("Restart", ServerAction::Power(PowerSignal::Restart)),
        ("Stop", ServerAction::Power(PowerSignal::Stop)),
        ("Force stop", ServerAction::Power(PowerSignal::Kill)),
        ("Send command", ServerAction::Command),
        ("Rename", ServerAction::Rename),
    ];

    let mut keyboard = InlineKeyboard::default();
    for (label, action) in actions {
        let data = CallbackAction::Server {
            server_id: server_id.to_string(),
            action,
        };
        keyboard = keyboard.button(label, data.encode());
    }
    keyboard = keyboard.button("Back", CallbackAction::BackToServers.encode());

    ("Choose an action:".to_string(), keyboard)
}

pub fn server_details_text(d: &ServerDetails) -> String {
    format!(
        "<b>Name:</b> {}\n\
         <b>Owner:</b> {}\n\
         <b>UUID:</b> <code>{}</code>\n\
         <b>Description:</b> {}\n\
         <b>CPU limit:</b> {}%\n\
         <b>Memory limit:</b> {} MiB\n\
         <b>Disk limit:</b> {} MiB\n\
         <b>Databases:</b> {}\n\
         <b>Allocations:</b> {}\n\
         <b>Backups:</b> {}\n\
         <b>SFTP:</b> <code>{}:{}</code>\n\
         <b>Node:</b> {}\n\
         <b>Suspended:</b> {}\n\
         <b>Installing:</b> {}",
        escape_html(&d.name),
        yes_no(d.server_owner),
        escape_html(&d.uuid),
        escape_html(&d.description),
        d.limits.cpu,
        d.limits.memory,
        d.limits.disk,
        d.feature_limits.databases,
        d.feature_limits.allocations,
        d.feature_limits.backups,
        escape_html(&d.sftp_details.ip),
        d.sftp_details.port,
        escape_html(&d.node),
        yes_no(d.is_suspended),
        yes_no(d.is_installing),
    )
}

pub fn server_resources_text(r: &ServerResources) -> String {
    format!(
        "<b>State:</b> {}\n\
         <b>Memory:</b> {} MiB\n\
         <b>Disk:</b> {} MiB\n\
         <b>CPU:</b> {:.1}%",
        state_label(&r.current_state),
        r.resources.memory_bytes / MIB,
        r.resources.disk_bytes / MIB,
        r.resources.cpu_absolute,
    )
}

pub fn no_credential_text() -> String {
    "API key is not set.".to_string()
}

pub fn no_credential_servers_text() -> String {
    "API key is not set. Add one with /profile.".to_string()
}

/// One-shot failure line; `what` is the operation in sentence position
/// ("Fetching account info", "Sending the command").
pub fn remote_error_text(what: &str, err: &Error) -> String {
    match err {
        Error::NoCredential => no_credential_text(),
        Error::Remote {
            status: Some(code), ..
        } => format!("{what} failed: HTTP {code}."),
        Error::Remote { status: None, .. } => format!("{what} failed: network error."),
        other => format!("{what} failed: {}.", escape_html(&other.to_string())),
    }
}

pub fn power_sent_text(signal: PowerSignal) -> String {
    format!("Power signal '{}' sent.", signal.as_str())
}

pub fn command_sent_text(command: &str) -> String {
    format!("Command <code>{}</code> sent.", escape_html(command))
}

pub fn renamed_text(name: &str) -> String {
    format!("Server renamed to '{}'.", escape_html(name))
}
