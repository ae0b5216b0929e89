//! In-memory collaborators for unit tests.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::NotebookApi;
use crate::error::{NotebookError, NotebookResult, WRONG_KEY_MESSAGE};
use crate::models::{Entry, NotebookContent, NotebookHandle, NotebookKey, UnlockedNotebook};
use crate::prefs::PreferenceStore;
use crate::prompt::{Confirm, ErrorReporter, KeyPrompt, LineInput};

struct StoredNotebook {
    handle: NotebookHandle,
    key: String,
    entries: BTreeMap<String, Entry>,
}

#[derive(Default)]
struct StoreState {
    notebooks: BTreeMap<String, StoredNotebook>,
    calls: Vec<String>,
    failures: HashMap<String, NotebookError>,
}

/// A notebook store that keeps everything in memory and records every call.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

fn missing() -> NotebookError {
    NotebookError::Remote("the specified notebook does not exist".to_string())
}

fn missing_entry() -> NotebookError {
    NotebookError::Remote("the specified entry does not exist".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notebook(self, name: &str, description: &str, key: &str, entries: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let now = Utc::now();
            let entries = entries
                .iter()
                .map(|(entry_name, content)| {
                    (
                        entry_name.to_string(),
                        Entry {
                            name: entry_name.to_string(),
                            create_time: now,
                            edit_time: now,
                            content: content.to_string(),
                        },
                    )
                })
                .collect();
            state.notebooks.insert(
                name.to_string(),
                StoredNotebook {
                    handle: NotebookHandle {
                        name: name.to_string(),
                        description: description.to_string(),
                        create_time: now,
                        edit_time: now,
                    },
                    key: key.to_string(),
                    entries,
                },
            );
        }
        self
    }

    /// Makes the next call to `operation` fail with `error`.
    pub fn fail_next(&self, operation: &str, error: NotebookError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string(), error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls().iter().any(|c| c == operation)
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| *c == operation).count()
    }

    pub fn key_of(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.notebooks.get(name).map(|n| n.key.clone())
    }

    pub fn description_of(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.notebooks.get(name).map(|n| n.handle.description.clone())
    }

    pub fn content_of(&self, notebook: &str, entry: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .notebooks
            .get(notebook)
            .and_then(|n| n.entries.get(entry))
            .map(|e| e.content.clone())
    }

    /// Changes an entry behind the client's back.
    pub fn set_content(&self, notebook: &str, entry: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state
            .notebooks
            .get_mut(notebook)
            .and_then(|n| n.entries.get_mut(entry))
        {
            e.content = content.to_string();
        }
    }

    fn begin(&self, operation: &str) -> NotebookResult<std::sync::MutexGuard<'_, StoreState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.to_string());
        let failure = state.failures.remove(operation);
        match failure {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

fn unlock<'a>(
    state: &'a mut StoreState,
    name: &str,
    key: &NotebookKey,
) -> NotebookResult<&'a mut StoredNotebook> {
    let notebook = state.notebooks.get_mut(name).ok_or_else(missing)?;
    if notebook.key != key.as_str() {
        return Err(NotebookError::Authorization(WRONG_KEY_MESSAGE.to_string()));
    }
    Ok(notebook)
}

fn snapshot(notebook: &StoredNotebook) -> UnlockedNotebook {
    UnlockedNotebook {
        name: notebook.handle.name.clone(),
        description: notebook.handle.description.clone(),
        create_time: notebook.handle.create_time,
        edit_time: notebook.handle.edit_time,
        content: NotebookContent {
            entries: notebook.entries.clone(),
        },
    }
}

impl NotebookApi for MemoryStore {
    async fn list_notebooks(&self) -> NotebookResult<Vec<NotebookHandle>> {
        let state = self.begin("list_notebooks")?;
        Ok(state.notebooks.values().map(|n| n.handle.clone()).collect())
    }

    async fn notebook_details(&self, name: &str) -> NotebookResult<NotebookHandle> {
        let state = self.begin("notebook_details")?;
        state
            .notebooks
            .get(name)
            .map(|n| n.handle.clone())
            .ok_or_else(missing)
    }

    async fn create_notebook(
        &self,
        name: &str,
        description: &str,
        key: &NotebookKey,
    ) -> NotebookResult<UnlockedNotebook> {
        let mut state = self.begin("create_notebook")?;
        if state.notebooks.contains_key(name) {
            return Err(NotebookError::Remote(
                "the specified notebook name is too similar to the name of another notebook"
                    .to_string(),
            ));
        }
        let now = Utc::now();
        let notebook = StoredNotebook {
            handle: NotebookHandle {
                name: name.to_string(),
                description: description.to_string(),
                create_time: now,
                edit_time: now,
            },
            key: key.as_str().to_string(),
            entries: BTreeMap::new(),
        };
        let unlocked = snapshot(&notebook);
        state.notebooks.insert(name.to_string(), notebook);
        Ok(unlocked)
    }

    async fn open_notebook(
        &self,
        name: &str,
        key: &NotebookKey,
    ) -> NotebookResult<UnlockedNotebook> {
        let mut state = self.begin("open_notebook")?;
        let notebook = unlock(&mut state, name, key)?;
        Ok(snapshot(notebook))
    }

    async fn rename_notebook(&self, name: &str, new_name: &str) -> NotebookResult<NotebookHandle> {
        let mut state = self.begin("rename_notebook")?;
        let mut notebook = state.notebooks.remove(name).ok_or_else(missing)?;
        notebook.handle.name = new_name.to_string();
        let handle = notebook.handle.clone();
        state.notebooks.insert(new_name.to_string(), notebook);
        Ok(handle)
    }

    async fn set_notebook_description(
        &self,
        name: &str,
        new_description: &str,
    ) -> NotebookResult<NotebookHandle> {
        let mut state = self.begin("set_notebook_description")?;
        let notebook = state.notebooks.get_mut(name).ok_or_else(missing)?;
        notebook.handle.description = new_description.to_string();
        Ok(notebook.handle.clone())
    }

    async fn rekey_notebook(
        &self,
        name: &str,
        old_key: &NotebookKey,
        new_key: &NotebookKey,
    ) -> NotebookResult<NotebookHandle> {
        let mut state = self.begin("rekey_notebook")?;
        let notebook = unlock(&mut state, name, old_key)?;
        notebook.key = new_key.as_str().to_string();
        Ok(notebook.handle.clone())
    }

    async fn delete_notebook(&self, name: &str, key: &NotebookKey) -> NotebookResult<()> {
        let mut state = self.begin("delete_notebook")?;
        unlock(&mut state, name, key)?;
        state.notebooks.remove(name);
        Ok(())
    }

    async fn create_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry> {
        let mut state = self.begin("create_entry")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        if notebook.entries.contains_key(entry_name) {
            return Err(NotebookError::Remote(
                "an entry with that name already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let entry = Entry {
            name: entry_name.to_string(),
            create_time: now,
            edit_time: now,
            content: String::new(),
        };
        notebook.entries.insert(entry_name.to_string(), entry.clone());
        Ok(entry)
    }

    async fn get_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<Entry> {
        let mut state = self.begin("get_entry")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        notebook
            .entries
            .get(entry_name)
            .cloned()
            .ok_or_else(missing_entry)
    }

    async fn rename_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        new_entry_name: &str,
    ) -> NotebookResult<Entry> {
        let mut state = self.begin("rename_entry")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        let mut entry = notebook
            .entries
            .remove(entry_name)
            .ok_or_else(missing_entry)?;
        entry.name = new_entry_name.to_string();
        notebook
            .entries
            .insert(new_entry_name.to_string(), entry.clone());
        Ok(entry)
    }

    async fn save_entry_content(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
        content: &str,
    ) -> NotebookResult<Entry> {
        let mut state = self.begin("save_entry_content")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        let entry = notebook
            .entries
            .get_mut(entry_name)
            .ok_or_else(missing_entry)?;
        entry.content = content.to_string();
        entry.edit_time = Utc::now();
        Ok(entry.clone())
    }

    async fn search_entries(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        query: &str,
        _regex: bool,
    ) -> NotebookResult<BTreeMap<String, Entry>> {
        let mut state = self.begin("search_entries")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        Ok(notebook
            .entries
            .iter()
            .filter(|(name, e)| name.contains(query) || e.content.contains(query))
            .map(|(name, e)| (name.clone(), e.clone()))
            .collect())
    }

    async fn delete_entry(
        &self,
        notebook_name: &str,
        key: &NotebookKey,
        entry_name: &str,
    ) -> NotebookResult<()> {
        let mut state = self.begin("delete_entry")?;
        let notebook = unlock(&mut state, notebook_name, key)?;
        notebook
            .entries
            .remove(entry_name)
            .map(|_| ())
            .ok_or_else(missing_entry)
    }
}

/// Answers key prompts from a script; an exhausted script cancels.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<usize>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[Option<&str>]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            asked: Mutex::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        *self.asked.lock().unwrap()
    }
}

impl KeyPrompt for ScriptedPrompt {
    async fn prompt_for_key(&self, _handle: &NotebookHandle) -> Option<NotebookKey> {
        *self.asked.lock().unwrap() += 1;
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .map(NotebookKey::new)
    }
}

/// Answers confirmations from a script and remembers the questions.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<(String, String)>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<(String, String)> {
        self.questions.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    async fn confirm(&self, title: &str, text: &str) -> bool {
        self.questions
            .lock()
            .unwrap()
            .push((title.to_string(), text.to_string()));
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

/// Key prompts and confirmations behind one value, as the terminal provides.
#[derive(Default)]
pub struct ScriptedUi {
    pub keys: ScriptedPrompt,
    pub confirms: ScriptedConfirm,
}

impl ScriptedUi {
    pub fn new(keys: &[Option<&str>], confirms: &[bool]) -> Self {
        Self {
            keys: ScriptedPrompt::new(keys),
            confirms: ScriptedConfirm::new(confirms),
        }
    }
}

impl KeyPrompt for ScriptedUi {
    async fn prompt_for_key(&self, handle: &NotebookHandle) -> Option<NotebookKey> {
        self.keys.prompt_for_key(handle).await
    }
}

impl Confirm for ScriptedUi {
    async fn confirm(&self, title: &str, text: &str) -> bool {
        self.confirms.confirm(title, text).await
    }
}

/// Feeds editor input from a script; an exhausted script is end of input.
#[derive(Default)]
pub struct ScriptedLines {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedLines {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
        }
    }
}

impl LineInput for ScriptedLines {
    async fn next_line(&self, _label: &str) -> Option<String> {
        self.lines.lock().unwrap().pop_front()
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report_error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Preferences held in a map.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

impl PreferenceStore for MemoryPreferences {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
