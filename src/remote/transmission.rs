//! Transmission JSON-RPC client using raw reqwest.
//!
//! The daemon guards its endpoint with a CSRF token: the first request gets a
//! 409 carrying `X-Transmission-Session-Id`, which must be echoed on every
//! later request. The token can rotate at any time, so every call retries once
//! after a 409.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tracing::debug;

use super::{AddedItem, Item, ItemAction, RemoteClient, Sorting, Stats};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

const ITEM_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "percentDone",
    "rateDownload",
    "rateUpload",
    "downloadedEver",
    "uploadedEver",
    "uploadRatio",
    "sizeWhenDone",
    "leftUntilDone",
    "addedDate",
    "eta",
    "error",
    "errorString",
    "trackers",
];

pub struct TransmissionClient {
    url: String,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    sorting: RwLock<Sorting>,
}

// --- RPC response types ---

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: String,
    arguments: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TorrentList {
    torrents: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "torrent-added")]
    added: Option<AddedItem>,
    #[serde(rename = "torrent-duplicate")]
    duplicate: Option<AddedItem>,
}

impl TransmissionClient {
    pub fn new(url: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("failed to build HTTP client")?;

        let credentials = username.map(|u| (u.to_owned(), password.unwrap_or_default().to_owned()));

        Ok(Self {
            url: url.to_owned(),
            credentials,
            client,
            session_id: RwLock::new(None),
            sorting: RwLock::new(Sorting::default()),
        })
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_session_id(&self, id: String) {
        *self.session_id.write().unwrap_or_else(|e| e.into_inner()) = Some(id);
    }

    fn sorting(&self) -> Sorting {
        *self.sorting.read().unwrap_or_else(|e| e.into_inner())
    }

    /// POST one RPC call, handling the session-id handshake.
    async fn call<T: DeserializeOwned>(&self, method: &str, arguments: Value) -> Result<T> {
        let body = json!({ "method": method, "arguments": arguments });

        for _ in 0..2 {
            let mut req = self.client.post(&self.url).json(&body);
            if let Some((user, pass)) = &self.credentials {
                req = req.basic_auth(user, Some(pass));
            }
            if let Some(id) = self.current_session_id() {
                req = req.header(SESSION_HEADER, id);
            }

            let resp = req
                .send()
                .await
                .wrap_err_with(|| format!("{method}: request to {} failed", self.url))?;

            match resp.status() {
                StatusCode::CONFLICT => {
                    let Some(id) = resp
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                    else {
                        bail!("{method}: 409 without {SESSION_HEADER} header");
                    };
                    debug!(method, "refreshed transmission session id");
                    self.store_session_id(id.to_owned());
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    bail!("{method}: transmission rejected the credentials (401)")
                }
                _ => {}
            }

            let resp = resp
                .error_for_status()
                .wrap_err_with(|| format!("{method}: HTTP error"))?;
            let parsed: RpcResponse<T> = resp
                .json()
                .await
                .wrap_err_with(|| format!("{method}: malformed response"))?;

            if parsed.result != "success" {
                bail!("{method}: {}", parsed.result);
            }
            return parsed
                .arguments
                .ok_or_else(|| eyre!("{method}: response carried no arguments"));
        }

        bail!("{method}: session handshake did not settle")
    }

    async fn fetch(&self, ids: Option<&[i64]>) -> Result<Vec<Item>> {
        let mut arguments = json!({ "fields": ITEM_FIELDS });
        if let Some(ids) = ids {
            arguments["ids"] = json!(ids);
        }
        let list: TorrentList = self.call("torrent-get", arguments).await?;
        Ok(list.torrents)
    }
}

#[async_trait]
impl RemoteClient for TransmissionClient {
    async fn list_items(&self) -> Result<Vec<Item>> {
        let mut items = self.fetch(None).await?;
        self.sorting().apply(&mut items);
        Ok(items)
    }

    async fn get_item(&self, id: i64) -> Result<Item> {
        self.fetch(Some(&[id]))
            .await?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| eyre!("no torrent with an ID of {id}"))
    }

    async fn session_stats(&self) -> Result<Stats> {
        self.call("session-stats", json!({})).await
    }

    async fn version(&self) -> Result<String> {
        let info: SessionInfo = self
            .call("session-get", json!({ "fields": ["version"] }))
            .await?;
        Ok(info.version)
    }

    async fn add(&self, source: &str) -> Result<AddedItem> {
        let resp: AddResponse = self
            .call("torrent-add", json!({ "filename": source }))
            .await?;
        Ok(resp.added.or(resp.duplicate).unwrap_or_default())
    }

    async fn remove(&self, id: i64, delete_data: bool) -> Result<String> {
        let item = self.get_item(id).await?;
        let _: IgnoredAny = self
            .call(
                "torrent-remove",
                json!({ "ids": [id], "delete-local-data": delete_data }),
            )
            .await?;
        Ok(item.name)
    }

    async fn apply(&self, action: ItemAction, id: i64) -> Result<String> {
        let _: IgnoredAny = self
            .call(action.rpc_method(), json!({ "ids": [id] }))
            .await?;
        Ok("success".to_owned())
    }

    async fn apply_all(&self, action: ItemAction) -> Result<()> {
        let _: IgnoredAny = self.call(action.rpc_method(), json!({})).await?;
        Ok(())
    }

    fn set_sort(&self, sorting: Sorting) {
        *self.sorting.write().unwrap_or_else(|e| e.into_inner()) = sorting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::SortKey;

    #[test]
    fn add_response_prefers_added_over_duplicate() {
        let json = r#"{"torrent-added": {"id": 4, "name": "a", "hashString": "ff"}}"#;
        let resp: AddResponse = serde_json::from_str(json).unwrap();
        let added = resp.added.or(resp.duplicate).unwrap_or_default();
        assert_eq!(added.id, 4);
        assert_eq!(added.hash_string, "ff");

        let json = r#"{"torrent-duplicate": {"id": 2, "name": "b"}}"#;
        let resp: AddResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.added.or(resp.duplicate).unwrap_or_default().name, "b");
    }

    #[test]
    fn empty_add_response_yields_empty_name() {
        let resp: AddResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.added.or(resp.duplicate).unwrap_or_default().name.is_empty());
    }

    #[test]
    fn rpc_envelope_without_arguments_parses() {
        let resp: RpcResponse<IgnoredAny> =
            serde_json::from_str(r#"{"result": "no such method", "tag": 1}"#).unwrap();
        assert_eq!(resp.result, "no such method");
        assert!(resp.arguments.is_none());
    }

    #[test]
    fn credentials_default_to_empty_password() {
        let client = TransmissionClient::new("http://localhost:9091/transmission/rpc", Some("admin"), None)
            .unwrap();
        assert_eq!(client.credentials, Some(("admin".to_owned(), String::new())));

        let anonymous = TransmissionClient::new("http://localhost:9091/transmission/rpc", None, Some("x"))
            .unwrap();
        assert!(anonymous.credentials.is_none());
    }

    #[test]
    fn set_sort_is_visible_to_later_reads() {
        let client = TransmissionClient::new("http://localhost:9091/transmission/rpc", None, None).unwrap();
        assert_eq!(client.sorting(), Sorting::default());
        let wanted = Sorting { key: SortKey::Ratio, reversed: true };
        client.set_sort(wanted);
        assert_eq!(client.sorting(), wanted);
    }
}
