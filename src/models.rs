use chrono::{DateTime, Datelike, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{NotebookError, NotebookResult};

pub const NOTEBOOK_NAME_MIN_LENGTH: usize = 1;
pub const NOTEBOOK_NAME_MAX_LENGTH: usize = 64;
pub const NOTEBOOK_DESCRIPTION_MAX_LENGTH: usize = 256;
pub const NOTEBOOK_KEY_MIN_LENGTH: usize = 8;
pub const NOTEBOOK_KEY_MAX_LENGTH: usize = 256;

/// The secret protecting a notebook. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct NotebookKey(Zeroizing<String>);

impl NotebookKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NotebookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NotebookKey(<redacted>)")
    }
}

/// Public notebook metadata, readable without a key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookHandle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub create_time: DateTime<Utc>,
    pub edit_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub edit_time: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct NotebookContent {
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
}

/// A decrypted notebook. Only ever held in memory by the view that unlocked it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedNotebook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub create_time: DateTime<Utc>,
    pub edit_time: DateTime<Utc>,
    #[serde(default)]
    pub content: NotebookContent,
}

impl UnlockedNotebook {
    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.content.entries
    }
}

pub const KEYS_MUST_MATCH: &str = "notebook keys must match";

/// The store reports "never" as the zero time (year 1).
pub fn is_unset(time: &DateTime<Utc>) -> bool {
    time.year() <= 1
}

/// Renders a store timestamp in local time, or an empty string when unset.
pub fn display_time(time: &DateTime<Utc>) -> String {
    if is_unset(time) {
        String::new()
    } else {
        time.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

fn check_length(what: &str, value: &str, min: usize, max: usize) -> NotebookResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(NotebookError::Validation(format!(
            "{} must be between {} and {} characters in length",
            what, min, max
        )));
    }
    Ok(())
}

/// Local checks run before asking the store to create a notebook.
pub fn validate_new_notebook(
    name: &str,
    description: &str,
    key: &NotebookKey,
    confirm_key: &NotebookKey,
) -> NotebookResult<()> {
    check_length(
        "notebook name",
        name,
        NOTEBOOK_NAME_MIN_LENGTH,
        NOTEBOOK_NAME_MAX_LENGTH,
    )?;
    check_length(
        "notebook description",
        description,
        0,
        NOTEBOOK_DESCRIPTION_MAX_LENGTH,
    )?;
    check_length(
        "notebook key",
        key.as_str(),
        NOTEBOOK_KEY_MIN_LENGTH,
        NOTEBOOK_KEY_MAX_LENGTH,
    )?;
    if key != confirm_key {
        return Err(NotebookError::Validation(KEYS_MUST_MATCH.to_string()));
    }
    Ok(())
}
