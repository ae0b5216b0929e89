use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

use crate::api::APIClient;
use crate::config;
use crate::logger::log;
use crate::ordering::SortSpec;

/// Key/value settings living outside the process.
#[allow(async_fn_in_trait)]
pub trait PreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Lists whose ordering is remembered between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Notebooks,
    /// Entry lists and search results.
    Entries,
}

impl ListKind {
    pub fn preference_key(&self) -> &'static str {
        match self {
            ListKind::Notebooks => "NotebookListSort",
            ListKind::Entries => "EntryListSort",
        }
    }
}

/// The stored ordering for `kind`, or the default when none is stored or it
/// cannot be read.
pub async fn load_sort_spec<S: PreferenceStore>(store: &S, kind: ListKind) -> SortSpec {
    let key = kind.preference_key();
    match store.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(spec) => spec,
            Err(e) => {
                log(&format!("Preferences: ignoring unreadable {}: {}", key, e));
                SortSpec::default()
            }
        },
        Ok(None) => SortSpec::default(),
        Err(e) => {
            log(&format!("Preferences: failed to read {}: {:?}", key, e));
            SortSpec::default()
        }
    }
}

pub async fn save_sort_spec<S: PreferenceStore>(
    store: &S,
    kind: ListKind,
    spec: &SortSpec,
) -> Result<()> {
    let value = serde_json::to_string(spec)?;
    store
        .set(kind.preference_key(), &value)
        .await
        .with_context(|| format!("Failed to save {}", kind.preference_key()))
}

/// The configured preference backend.
pub enum Preferences<'a> {
    Local(SettingsRepo),
    Remote(&'a APIClient),
}

impl PreferenceStore for Preferences<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Preferences::Local(repo) => repo.get(key).await,
            Preferences::Remote(client) => client.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Preferences::Local(repo) => repo.set(key, value).await,
            Preferences::Remote(client) => client.set(key, value).await,
        }
    }
}

enum SettingsRequest {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Local settings in SQLite, served by a dedicated thread.
#[derive(Clone)]
pub struct SettingsRepo {
    tx: mpsc::UnboundedSender<SettingsRequest>,
}

impl SettingsRepo {
    /// Opens `settings.db` in the config directory.
    pub fn new() -> Result<Self> {
        let config_dir = config::get_config_dir();
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        Self::open(config_dir.join("settings.db"))
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        // Open synchronously so a broken database fails here, not on first use.
        let mut actor = SettingsRepoInternal::new(&path).context("Failed to open settings")?;

        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            actor.run(rx);
        });

        Ok(Self { tx })
    }
}

impl PreferenceStore for SettingsRepo {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SettingsRequest::Get {
                key: key.to_string(),
                reply,
            })
            .map_err(|_| anyhow::anyhow!("Settings actor shutdown"))?;
        rx.await.context("Settings actor dropped reply")?
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SettingsRequest::Set {
                key: key.to_string(),
                value: value.to_string(),
                reply,
            })
            .map_err(|_| anyhow::anyhow!("Settings actor shutdown"))?;
        rx.await.context("Settings actor dropped reply")?
    }
}

struct SettingsRepoInternal {
    conn: Connection,
}

impl SettingsRepoInternal {
    fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT
            );",
            [],
        )
        .context("Failed to create tables")?;
        Ok(Self { conn })
    }

    fn run(&mut self, mut rx: mpsc::UnboundedReceiver<SettingsRequest>) {
        while let Some(req) = rx.blocking_recv() {
            match req {
                SettingsRequest::Get { key, reply } => {
                    let _ = reply.send(self.get_kv(&key));
                }
                SettingsRequest::Set { key, value, reply } => {
                    let _ = reply.send(self.set_kv(&key, &value));
                }
            }
        }
    }

    fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let res: Result<String, rusqlite::Error> = self.conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match res {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}
