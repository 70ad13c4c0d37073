//! Panel client port and the decoded response types.
//!
//! One method per remote operation; each is a single HTTP call with no
//! retries. Response structs default missing fields instead of failing the
//! whole decode, since panel deployments vary in what they return.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Power signal accepted by the panel. Validated by construction; the wire
/// form is the lowercase variant name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Restart,
    Stop,
    Kill,
}

impl PowerSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Kill => "kill",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "restart" => Some(Self::Restart),
            "stop" => Some(Self::Stop),
            "kill" => Some(Self::Kill),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: i64,
    pub admin: bool,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSummary {
    pub identifier: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub cpu: u64,
    pub memory: u64,
    pub disk: u64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeatureLimits {
    pub databases: u64,
    pub allocations: u64,
    pub backups: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SftpDetails {
    pub ip: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerDetails {
    pub name: String,
    pub server_owner: bool,
    pub uuid: String,
    pub description: String,
    pub limits: Limits,
    pub feature_limits: FeatureLimits,
    pub sftp_details: SftpDetails,
    pub node: String,
    pub is_suspended: bool,
    pub is_installing: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub cpu_absolute: f64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerResources {
    pub current_state: String,
    pub resources: ResourceUsage,
}

/// Port to the remote management API.
///
/// Implementations perform exactly one HTTP call per method and map
/// non-success statuses to `Error::Remote` with the status attached
/// (or without one for transport-level failures).
#[async_trait]
pub trait PanelClient: Send + Sync {
    async fn account(&self, api_key: &str) -> Result<Account>;
    async fn servers(&self, api_key: &str) -> Result<Vec<ServerSummary>>;
    async fn server_details(&self, api_key: &str, server_id: &str) -> Result<ServerDetails>;
    async fn server_resources(&self, api_key: &str, server_id: &str) -> Result<ServerResources>;
    async fn send_power_signal(
        &self,
        api_key: &str,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<()>;
    async fn send_command(&self, api_key: &str, server_id: &str, command: &str) -> Result<()>;
    async fn rename_server(&self, api_key: &str, server_id: &str, name: &str) -> Result<()>;
}
