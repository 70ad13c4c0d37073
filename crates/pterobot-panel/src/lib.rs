//! Panel HTTP adapter (reqwest).
//!
//! Implements the `pterobot-core` panel port against a Pterodactyl-style
//! client API: one request per operation, Bearer auth, no retries. Non-2xx
//! statuses become `Error::Remote` carrying the status; connection-level
//! failures carry none.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};
use serde::Deserialize;

use pterobot_core::{
    panel::{
        Account, PanelClient, PowerSignal, ServerDetails, ServerResources, ServerSummary,
    },
    Error, Result,
};

/// Wire envelopes: the API wraps objects in `attributes` and lists in `data`.
#[derive(Deserialize)]
struct Attributes<T> {
    attributes: T,
}

#[derive(Deserialize)]
struct Listing<T> {
    #[serde(default)]
    data: Vec<Attributes<T>>,
}

pub struct HttpPanelClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPanelClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("pterobot/0.1")
            .build()
            .expect("reqwest client build");

        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/client{path}", self.base_url)
    }

    async fn get(&self, api_key: &str, path: &str) -> Result<Response> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(api_key)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp)
    }

    async fn post_json(
        &self,
        api_key: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Response> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(api_key)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp)
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    tracing::debug!(error = %err, "panel request failed before a response");
    Error::Remote {
        status: None,
        message: err.to_string(),
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status: StatusCode = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(Error::Remote {
        status: Some(status.as_u16()),
        message: format!("unexpected status {status}"),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    resp.json::<T>().await.map_err(|err| Error::Remote {
        status: None,
        message: format!("invalid response body: {err}"),
    })
}

#[async_trait]
impl PanelClient for HttpPanelClient {
    async fn account(&self, api_key: &str) -> Result<Account> {
        let resp = self.get(api_key, "/account").await?;
        Ok(decode::<Attributes<Account>>(resp).await?.attributes)
    }

    async fn servers(&self, api_key: &str) -> Result<Vec<ServerSummary>> {
        let resp = self.get(api_key, "").await?;
        let listing = decode::<Listing<ServerSummary>>(resp).await?;
        Ok(listing.data.into_iter().map(|s| s.attributes).collect())
    }

    async fn server_details(&self, api_key: &str, server_id: &str) -> Result<ServerDetails> {
        let resp = self.get(api_key, &format!("/servers/{server_id}")).await?;
        Ok(decode::<Attributes<ServerDetails>>(resp).await?.attributes)
    }

    async fn server_resources(&self, api_key: &str, server_id: &str) -> Result<ServerResources> {
        let resp = self
            .get(api_key, &format!("/servers/{server_id}/resources"))
            .await?;
        Ok(decode::<Attributes<ServerResources>>(resp).await?.attributes)
    }

    async fn send_power_signal(
        &self,
        api_key: &str,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<()> {
        self.post_json(
            api_key,
            &format!("/servers/{server_id}/power"),
            &serde_json::json!({ "signal": signal }),
        )
        .await?;
        Ok(())
    }

    async fn send_command(&self, api_key: &str, server_id: &str, command: &str) -> Result<()> {
        self.post_json(
            api_key,
            &format!("/servers/{server_id}/command"),
            &serde_json::json!({ "command": command }),
        )
        .await?;
        Ok(())
    }

    async fn rename_server(&self, api_key: &str, server_id: &str, name: &str) -> Result<()> {
        self.post_json(
            api_key,
            &format!("/servers/{server_id}/settings/rename"),
            &serde_json::json!({ "name": name }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_the_client_api() {
        let client = HttpPanelClient::new("https://panel.example", Duration::from_secs(1));
        assert_eq!(client.url(""), "https://panel.example/api/client");
        assert_eq!(
            client.url("/servers/abc/power"),
            "https://panel.example/api/client/servers/abc/power"
        );
    }

    #[test]
    fn envelopes_unwrap_attributes() {
        let raw = r#"{
          "object": "list",
          "data": [
            { "object": "server", "attributes": { "identifier": "abc", "name": "Alpha" } },
            { "object": "server", "attributes": { "identifier": "def", "name": "Beta" } }
          ]
        }"#;
        let listing: Listing<ServerSummary> = serde_json::from_str(raw).unwrap();
        let servers: Vec<ServerSummary> =
            listing.data.into_iter().map(|s| s.attributes).collect();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].identifier, "abc");
        assert_eq!(servers[1].name, "Beta");
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let raw = r#"{ "attributes": { "current_state": "running" } }"#;
        let wrapped: Attributes<ServerResources> = serde_json::from_str(raw).unwrap();
        assert_eq!(wrapped.attributes.current_state, "running");
        assert_eq!(wrapped.attributes.resources.memory_bytes, 0);
    }

    #[test]
    fn power_signal_serializes_lowercase() {
        let body = serde_json::json!({ "signal": PowerSignal::Kill });
        assert_eq!(body.to_string(), r#"{"signal":"kill"}"#);
    }
}
