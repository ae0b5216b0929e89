use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time;

use crate::config::AppConfig;
use crate::error::{NotebookError, NotebookResult};
use crate::logger::log;
use crate::models::{Entry, NotebookHandle, NotebookKey, UnlockedNotebook};
use crate::prefs::PreferenceStore;

/// The notebook store as seen by the client.
///
/// Every call either completes or fails; the store decrypts notebooks itself,
/// so a wrong key surfaces as [`NotebookError::Authorization`].
#[allow(async_fn_in_trait)]
pub trait NotebookApi {
    async fn list_notebooks(&self) -> NotebookResult<Vec<NotebookHandle>>;

    async fn notebook_details(&self, name: &str) -> NotebookResult<NotebookHandle>;

    async fn create_notebook(
        &self,
        name: &str,
        description: &str,
        key: &NotebookKey,
    ) -> NotebookResult<UnlockedNotebook>;

    async fn open_notebook(&self, name: &str, key: &NotebookKey)
        -> NotebookResult<UnlockedNotebook>;

    async fn rename_notebook(&self, name: &str, new_name: &str) -> NotebookResult<NotebookHandle>;

    async fn set_notebook_description(
        &self,
        name: &str,
        new_description: &str,
    ) -> NotebookResult<NotebookHandle>;

    async fn rekey_notebook(
        &self,
        name: &str,
        old_key: &NotebookKey,
        new_key: &NotebookKey,
    ) -> NotebookResult<NotebookHandle>;

    /// The key is required as confirmation.
    async fn delete_notebook(&self, name: &str, key: &NotebookKey) -> NotebookResult<()>;

    async fn create_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry>;

    async fn get_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry>;

    async fn rename_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        new_entry_name: &str,
    ) -> NotebookResult<Entry>;

    async fn save_entry_content(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        content: &str,
    ) -> NotebookResult<Entry>;

    async fn search_entries(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        query: &str,
        regex: bool,
    ) -> NotebookResult<BTreeMap<String, Entry>>;

    async fn delete_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<()>;
}

/// Response body shared by every store endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<String>,
}

/// HTTP client for the notebook store's `/api` routes.
pub struct APIClient {
    client: Client,
    base_url: String,
    max_attempts: u32,
}

impl APIClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.general.request_timeout_secs))
                .build()?,
            base_url: config.api_base_url(),
            max_attempts: config.general.max_attempts.max(1),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> NotebookResult<Url> {
        let raw = format!("{}/api/{}", self.base_url, path);
        Url::parse_with_params(&raw, params)
            .map_err(|e| NotebookError::Remote(format!("invalid store address {}: {}", raw, e)))
    }

    /// Sends one request, retrying connection failures. Reads (GET) are also
    /// retried on timeouts and 5xx answers; writes are not, since the store may
    /// already have applied them.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> NotebookResult<Option<T>> {
        let url = self.url(path, params)?;
        let idempotent = method == Method::GET;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let res = self
                .client
                .request(method.clone(), url.clone())
                .send()
                .await
                .map_err(reqwest::Error::without_url);

            match res {
                Ok(resp) => {
                    if resp.status().is_server_error() && idempotent && attempts < self.max_attempts
                    {
                        log(&format!(
                            "APIClient: {} {} answered {}, retrying",
                            method,
                            path,
                            resp.status()
                        ));
                        time::sleep(Duration::from_millis(500 * attempts as u64)).await;
                        continue;
                    }
                    return Self::read_envelope(resp, &method, path).await;
                }
                Err(e)
                    if attempts < self.max_attempts
                        && (e.is_connect() || (idempotent && e.is_timeout())) =>
                {
                    log(&format!(
                        "APIClient: {} {} failed ({}), retrying",
                        method, path, e
                    ));
                    time::sleep(Duration::from_millis(500 * attempts as u64)).await;
                    continue;
                }
                Err(e) => {
                    log(&format!("APIClient: {} {} failed: {}", method, path, e));
                    return Err(e.into());
                }
            }
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        resp: Response,
        method: &Method,
        path: &str,
    ) -> NotebookResult<Option<T>> {
        let status = resp.status();
        let body: Envelope<T> = match resp.json().await.map_err(reqwest::Error::without_url) {
            Ok(body) => body,
            Err(e) => {
                log(&format!(
                    "APIClient: {} {} returned an unreadable body ({}): {}",
                    method, path, status, e
                ));
                return Err(NotebookError::Remote(format!(
                    "{} failed: {}",
                    path, status
                )));
            }
        };

        if let Some(message) = body.error {
            log(&format!("APIClient: {} {} -> {}", method, path, message));
            return Err(NotebookError::from_store_message(&message));
        }
        if !status.is_success() {
            return Err(NotebookError::Remote(format!("{} failed: {}", path, status)));
        }
        Ok(body.data)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> NotebookResult<T> {
        self.request(method, path, params).await?.ok_or_else(|| {
            NotebookError::Remote(format!("{} returned no data", path))
        })
    }

    async fn send(&self, method: Method, path: &str, params: &[(&str, &str)]) -> NotebookResult<()> {
        self.request::<serde_json::Value>(method, path, params)
            .await
            .map(|_| ())
    }
}

impl NotebookApi for APIClient {
    async fn list_notebooks(&self) -> NotebookResult<Vec<NotebookHandle>> {
        // The store answers `null` when the directory is empty.
        Ok(self
            .request(Method::GET, "notebook/all", &[])
            .await?
            .unwrap_or_default())
    }

    async fn notebook_details(&self, name: &str) -> NotebookResult<NotebookHandle> {
        self.fetch(Method::GET, "notebook/details", &[("name", name)])
            .await
    }

    async fn create_notebook(
        &self,
        name: &str,
        description: &str,
        key: &NotebookKey,
    ) -> NotebookResult<UnlockedNotebook> {
        self.fetch(
            Method::POST,
            "notebook",
            &[
                ("name", name),
                ("description", description),
                ("key", key.as_str()),
            ],
        )
        .await
    }

    async fn open_notebook(
        &self,
        name: &str,
        key: &NotebookKey,
    ) -> NotebookResult<UnlockedNotebook> {
        self.fetch(Method::GET, "notebook", &[("name", name), ("key", key.as_str())])
            .await
    }

    async fn rename_notebook(&self, name: &str, new_name: &str) -> NotebookResult<NotebookHandle> {
        self.fetch(
            Method::PATCH,
            "notebook/name",
            &[("name", name), ("newName", new_name)],
        )
        .await
    }

    async fn set_notebook_description(
        &self,
        name: &str,
        new_description: &str,
    ) -> NotebookResult<NotebookHandle> {
        self.fetch(
            Method::PATCH,
            "notebook/description",
            &[("name", name), ("newDescription", new_description)],
        )
        .await
    }

    async fn rekey_notebook(
        &self,
        name: &str,
        old_key: &NotebookKey,
        new_key: &NotebookKey,
    ) -> NotebookResult<NotebookHandle> {
        let handle: Option<NotebookHandle> = self
            .request(
                Method::PATCH,
                "notebook/key",
                &[
                    ("name", name),
                    ("key", old_key.as_str()),
                    ("newKey", new_key.as_str()),
                ],
            )
            .await?;
        match handle {
            Some(handle) => Ok(handle),
            None => self.notebook_details(name).await,
        }
    }

    async fn delete_notebook(&self, name: &str, key: &NotebookKey) -> NotebookResult<()> {
        self.send(
            Method::DELETE,
            "notebook",
            &[("name", name), ("key", key.as_str())],
        )
        .await
    }

    async fn create_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry> {
        self.fetch(
            Method::POST,
            "entry",
            &[
                ("notebookName", notebook_name),
                ("notebookKey", key.as_str()),
                ("entryName", entry_name),
            ],
        )
        .await
    }

    async fn get_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry> {
        self.fetch(
            Method::GET,
            "entry",
            &[
                ("notebookName", notebook_name),
                ("notebookKey", key.as_str()),
                ("entryName", entry_name),
            ],
        )
        .await
    }

    async fn rename_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        new_entry_name: &str,
    ) -> NotebookResult<Entry> {
        self.fetch(
            Method::PATCH,
            "entry/name",
            &[
                ("notebookName", notebook_name),
                ("notebookKey", key.as_str()),
                ("entryName", entry_name),
                ("newEntryName", new_entry_name),
            ],
        )
        .await
    }

    async fn save_entry_content(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        content: &str,
    ) -> NotebookResult<Entry> {
        self.fetch(
            Method::PATCH,
            "entry/content",
            &[
                ("notebookName", notebook_name),
                ("notebookKey", key.as_str()),
                ("entryName", entry_name),
                ("newContent", content),
            ],
        )
        .await
    }

    async fn search_entries(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        query: &str,
        regex: bool,
    ) -> NotebookResult<BTreeMap<String, Entry>> {
        let regex = if regex { "true" } else { "false" };
        Ok(self
            .request(
                Method::GET,
                "entry/search",
                &[
                    ("notebookName", notebook_name),
                    ("notebookKey", key.as_str()),
                    ("query", query),
                    ("regexSearch", regex),
                ],
            )
            .await?
            .unwrap_or_default())
    }

    async fn delete_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<()> {
        self.send(
            Method::DELETE,
            "entry",
            &[
                ("notebookName", notebook_name),
                ("notebookKey", key.as_str()),
                ("entryName", entry_name),
            ],
        )
        .await
    }
}

/// Settings kept by the store. Values travel as JSON strings.
impl PreferenceStore for APIClient {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .request::<String>(Method::GET, "settings", &[("key", key)])
            .await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.send(Method::PATCH, "settings", &[("key", key), ("value", value)])
            .await?;
        Ok(())
    }
}
