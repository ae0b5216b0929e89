use std::future::Future;

use crate::api::NotebookApi;
use crate::error::NotebookResult;
use crate::logger::log;
use crate::models::{Entry, NotebookKey};
use crate::prompt::{Confirm, ErrorReporter};

const UNSAVED_TITLE: &str = "Unsaved changes";

/// True iff the buffer differs from what the store last confirmed.
pub fn is_dirty(buffer: &str, last_persisted: &str) -> bool {
    buffer != last_persisted
}

/// Why the user wants to drop the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveIntent {
    BackToNotebook,
    ReloadEntry,
}

impl LeaveIntent {
    pub fn question(&self) -> &'static str {
        match self {
            LeaveIntent::BackToNotebook => "Save before leaving?",
            LeaveIntent::ReloadEntry => "Save before refreshing?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Nothing to save.
    Clean,
    /// The user chose not to save.
    Discarded,
    Saved,
    /// The save was attempted and reported; navigation still happens.
    SaveFailed,
}

/// Gates a navigation-away action. `save` is only polled when the buffer is
/// dirty and the user agrees, and it always runs to completion before this
/// returns. Every outcome lets the caller proceed.
pub async fn guarded_leave<C, R, F>(
    dirty: bool,
    intent: LeaveIntent,
    confirm: &C,
    reporter: &R,
    save: F,
) -> LeaveOutcome
where
    C: Confirm,
    R: ErrorReporter,
    F: Future<Output = NotebookResult<()>>,
{
    if !dirty {
        return LeaveOutcome::Clean;
    }

    if !confirm.confirm(UNSAVED_TITLE, intent.question()).await {
        log(&format!("EditSession: {:?} without saving", intent));
        return LeaveOutcome::Discarded;
    }

    match save.await {
        Ok(()) => LeaveOutcome::Saved,
        Err(e) => {
            log(&format!("EditSession: save during {:?} failed: {}", intent, e));
            reporter.report_error(&e.to_string());
            LeaveOutcome::SaveFailed
        }
    }
}

/// Page-local working copy of an entry's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBuffer {
    content: String,
}

impl EditBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn replace(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn push_line(&mut self, line: &str) {
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(line);
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }
}

/// An open entry: the persisted baseline, the working buffer and what is
/// needed to write it back.
pub struct EditSession {
    notebook_name: String,
    key: NotebookKey,
    entry: Entry,
    buffer: EditBuffer,
}

impl EditSession {
    pub fn new(notebook_name: impl Into<String>, key: NotebookKey, entry: Entry) -> Self {
        let buffer = EditBuffer::new(entry.content.clone());
        Self {
            notebook_name: notebook_name.into(),
            key,
            entry,
            buffer,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn notebook_name(&self) -> &str {
        &self.notebook_name
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut EditBuffer {
        &mut self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        is_dirty(self.buffer.as_str(), &self.entry.content)
    }

    /// Writes the buffer back. On success the buffer becomes the baseline.
    pub async fn save<A: NotebookApi>(&mut self, api: &A) -> NotebookResult<()> {
        let content = self.buffer.as_str().to_string();
        let mut saved = api
            .save_entry_content(&self.notebook_name, &self.key, &self.entry.name, &content)
            .await?;
        saved.content = content;
        self.entry = saved;
        log(&format!(
            "EditSession: saved {}/{}",
            self.notebook_name, self.entry.name
        ));
        Ok(())
    }

    /// Replaces baseline and buffer with the store's current copy.
    pub async fn refresh<A: NotebookApi>(&mut self, api: &A) -> NotebookResult<()> {
        let entry = api
            .get_entry(&self.notebook_name, &self.key, &self.entry.name)
            .await?;
        self.buffer.replace(entry.content.clone());
        self.entry = entry;
        Ok(())
    }

    /// The guarded leave for this session's buffer.
    pub async fn leave<A, C, R>(
        &mut self,
        api: &A,
        confirm: &C,
        reporter: &R,
        intent: LeaveIntent,
    ) -> LeaveOutcome
    where
        A: NotebookApi,
        C: Confirm,
        R: ErrorReporter,
    {
        let dirty = self.is_dirty();
        guarded_leave(dirty, intent, confirm, reporter, self.save(api)).await
    }

    /// Guarded reload: offers to save, then re-reads the entry whatever the
    /// answer was.
    pub async fn reload<A, C, R>(&mut self, api: &A, confirm: &C, reporter: &R) -> LeaveOutcome
    where
        A: NotebookApi,
        C: Confirm,
        R: ErrorReporter,
    {
        let outcome = self
            .leave(api, confirm, reporter, LeaveIntent::ReloadEntry)
            .await;
        if let Err(e) = self.refresh(api).await {
            reporter.report_error(&e.to_string());
        }
        outcome
    }
}
