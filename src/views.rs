use std::fmt::Write as _;

use crate::api::NotebookApi;
use crate::error::NotebookError;
use crate::logger::log;
use crate::models::{display_time, validate_new_notebook, Entry, NotebookHandle, NotebookKey, UnlockedNotebook};
use crate::mutation::{MutationOutcome, NotebookEditForm, NotebookMutationTransaction};
use crate::ordering::{order, SortDirection, SortSpec, Sortable};
use crate::prefs::{load_sort_spec, save_sort_spec, ListKind, PreferenceStore};
use crate::prompt::{Confirm, ErrorReporter, KeyPrompt, LineInput};
use crate::session::{EditSession, LeaveIntent, LeaveOutcome};
use crate::unlock::{UnlockCoordinator, UnlockedSession};

const EDITOR_HELP: &str = "\
Lines you type are appended to the entry. Commands:
  :show    print the entry
  :save    save the entry
  :reload  re-read the entry from the store
  :clear   empty the buffer
  :back    leave the editor
  :help    this text
Start a line with '::' to append a line beginning with ':'.";

/// An ordering requested on the command line. Either half may be missing.
#[derive(Debug, Clone, Default)]
pub struct SortOverride {
    pub field: Option<String>,
    pub direction: Option<SortDirection>,
}

impl SortOverride {
    pub fn is_empty(&self) -> bool {
        self.field.is_none() && self.direction.is_none()
    }

    pub fn apply(&self, base: &SortSpec) -> SortSpec {
        SortSpec {
            field: self.field.clone().unwrap_or_else(|| base.field.clone()),
            direction: self.direction.unwrap_or(base.direction),
        }
    }
}

/// Records shown in a remembered order.
pub struct ListView<T> {
    kind: ListKind,
    spec: SortSpec,
    records: Vec<T>,
}

impl<T: Sortable + Clone> ListView<T> {
    pub async fn load<S: PreferenceStore>(prefs: &S, kind: ListKind, records: Vec<T>) -> Self {
        let spec = load_sort_spec(prefs, kind).await;
        Self {
            kind,
            spec,
            records,
        }
    }

    /// Re-sorts and remembers the new order for this kind of list.
    pub async fn resort<S: PreferenceStore>(&mut self, prefs: &S, spec: SortSpec) {
        self.spec = spec;
        if let Err(e) = save_sort_spec(prefs, self.kind, &self.spec).await {
            log(&format!("ListView: could not remember {}: {:?}", self.spec, e));
        }
    }

    async fn apply<S: PreferenceStore>(&mut self, prefs: &S, sort: &SortOverride) {
        if !sort.is_empty() {
            let spec = sort.apply(&self.spec);
            self.resort(prefs, spec).await;
        }
    }

    pub fn spec(&self) -> &SortSpec {
        &self.spec
    }

    pub fn rows(&self) -> Vec<T> {
        order(&self.records, &self.spec)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct NotebookPage {
    pub session: UnlockedSession,
    pub entries: ListView<Entry>,
}

pub struct SearchPage {
    pub session: UnlockedSession,
    pub query: String,
    pub results: ListView<Entry>,
}

pub struct EditedNotebook {
    pub outcome: MutationOutcome,
    /// The notebook re-opened under its resulting name and key.
    pub reopened: Option<UnlockedSession>,
}

/// Page controllers. Each one unlocks what it needs, calls the store and
/// hands back what should be shown; `None` means the page was abandoned and
/// the caller goes back.
pub struct App<'a, A, U, S, R> {
    api: &'a A,
    ui: &'a U,
    prefs: &'a S,
    reporter: &'a R,
}

impl<'a, A, U, S, R> App<'a, A, U, S, R>
where
    A: NotebookApi,
    U: KeyPrompt + Confirm,
    S: PreferenceStore,
    R: ErrorReporter,
{
    pub fn new(api: &'a A, ui: &'a U, prefs: &'a S, reporter: &'a R) -> Self {
        Self {
            api,
            ui,
            prefs,
            reporter,
        }
    }

    fn report(&self, e: &NotebookError) {
        self.reporter.report_error(&e.to_string());
    }

    async fn unlock(&self, name: &str, key: Option<NotebookKey>) -> Option<UnlockedSession> {
        let mut unlock = UnlockCoordinator::request(self.api, self.ui, self.reporter, name, key).await;
        unlock.run().await;
        unlock.finish().ok()
    }

    pub async fn home(&self, sort: &SortOverride) -> Option<ListView<NotebookHandle>> {
        let notebooks = match self.api.list_notebooks().await {
            Ok(notebooks) => notebooks,
            Err(e) => {
                self.report(&e);
                return None;
            }
        };
        let mut view = ListView::load(self.prefs, ListKind::Notebooks, notebooks).await;
        view.apply(self.prefs, sort).await;
        Some(view)
    }

    pub async fn notebook(
        &self,
        name: &str,
        key: Option<NotebookKey>,
        sort: &SortOverride,
    ) -> Option<NotebookPage> {
        let session = self.unlock(name, key).await?;
        let entries = session.notebook().entries().values().cloned().collect();
        let mut entries = ListView::load(self.prefs, ListKind::Entries, entries).await;
        entries.apply(self.prefs, sort).await;
        Some(NotebookPage { session, entries })
    }

    pub async fn entry(
        &self,
        notebook: &str,
        entry: &str,
        key: Option<NotebookKey>,
    ) -> Option<EditSession> {
        let session = self.unlock(notebook, key).await?;
        let (unlocked, key) = session.into_parts();
        match self.api.get_entry(&unlocked.name, &key, entry).await {
            Ok(entry) => Some(EditSession::new(unlocked.name, key, entry)),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Line-based editor over an open entry. Leaving, by command or end of
    /// input, goes through the guarded leave.
    pub async fn edit_entry<L: LineInput>(&self, session: &mut EditSession, input: &L) -> LeaveOutcome {
        let prompt = format!("{}> ", session.entry().name);
        loop {
            let Some(line) = input.next_line(&prompt).await else {
                return session
                    .leave(self.api, self.ui, self.reporter, LeaveIntent::BackToNotebook)
                    .await;
            };

            match line.trim() {
                ":back" | ":q" => {
                    return session
                        .leave(self.api, self.ui, self.reporter, LeaveIntent::BackToNotebook)
                        .await;
                }
                ":save" | ":w" => {
                    if let Err(e) = session.save(self.api).await {
                        self.report(&e);
                    }
                }
                ":reload" => {
                    session.reload(self.api, self.ui, self.reporter).await;
                }
                ":show" | ":p" => println!("{}", session.buffer().as_str()),
                ":clear" => session.buffer_mut().clear(),
                ":help" => println!("{}", EDITOR_HELP),
                _ => {
                    let text = line.strip_prefix("::").map(|rest| format!(":{}", rest));
                    session
                        .buffer_mut()
                        .push_line(text.as_deref().unwrap_or(&line));
                }
            }
        }
    }

    /// An empty query clears the results without asking the store.
    pub async fn search(
        &self,
        name: &str,
        key: Option<NotebookKey>,
        query: &str,
        regex: bool,
        sort: &SortOverride,
    ) -> Option<SearchPage> {
        let session = self.unlock(name, key).await?;

        let found = if query.is_empty() {
            Vec::new()
        } else {
            match self
                .api
                .search_entries(session.name(), session.key(), query, regex)
                .await
            {
                Ok(found) => found.into_values().collect(),
                Err(e) => {
                    self.report(&e);
                    Vec::new()
                }
            }
        };

        let mut results = ListView::load(self.prefs, ListKind::Entries, found).await;
        results.apply(self.prefs, sort).await;
        Some(SearchPage {
            session,
            query: query.to_string(),
            results,
        })
    }

    /// Unlocks, applies `form`, then re-opens under whatever identity the
    /// notebook ended up with. A store failure may be retried with the same
    /// form; committed steps are not repeated.
    pub async fn edit_notebook(
        &self,
        name: &str,
        key: Option<NotebookKey>,
        form: &NotebookEditForm,
    ) -> Option<EditedNotebook> {
        let mut unlock = UnlockCoordinator::request(self.api, self.ui, self.reporter, name, key).await;
        unlock.run().await;
        let session = unlock.session()?;
        let (current, description, key) = (
            session.name().to_string(),
            session.notebook().description.clone(),
            session.key().clone(),
        );

        let mut transaction = NotebookMutationTransaction::new(current, description, key);
        let mut outcome = transaction.submit(self.api, self.reporter, form).await;
        while matches!(outcome.error, Some(NotebookError::Remote(_)))
            && self
                .ui
                .confirm("Edit notebook", "Submit the remaining changes again?")
                .await
        {
            outcome = transaction.submit(self.api, self.reporter, form).await;
        }

        unlock
            .invalidate(&outcome.name, Some(outcome.key.clone()))
            .await;
        Some(EditedNotebook {
            outcome,
            reopened: unlock.finish().ok(),
        })
    }

    pub async fn create_notebook(
        &self,
        name: &str,
        description: &str,
        key: &NotebookKey,
        confirm_key: &NotebookKey,
    ) -> Option<UnlockedNotebook> {
        let created = match validate_new_notebook(name, description, key, confirm_key) {
            Ok(()) => self.api.create_notebook(name, description, key).await,
            Err(e) => Err(e),
        };
        match created {
            Ok(notebook) => {
                log(&format!("Views: created notebook {}", notebook.name));
                Some(notebook)
            }
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// The store wants the key as proof, so the notebook is unlocked first.
    pub async fn delete_notebook(&self, name: &str, key: Option<NotebookKey>) -> bool {
        let Some(session) = self.unlock(name, key).await else {
            return false;
        };
        let question = format!("Delete '{}' and all of its entries?", session.name());
        if !self.ui.confirm("Delete notebook", &question).await {
            return false;
        }
        match self.api.delete_notebook(session.name(), session.key()).await {
            Ok(()) => {
                log(&format!("Views: deleted notebook {}", session.name()));
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    pub async fn create_entry(&self, notebook: &str, key: Option<NotebookKey>, entry: &str) -> Option<Entry> {
        let session = self.unlock(notebook, key).await?;
        match self.api.create_entry(session.name(), session.key(), entry).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// The entry's identity becomes `new_name`.
    pub async fn rename_entry(
        &self,
        notebook: &str,
        key: Option<NotebookKey>,
        entry: &str,
        new_name: &str,
    ) -> Option<Entry> {
        let session = self.unlock(notebook, key).await?;
        match self
            .api
            .rename_entry(session.name(), session.key(), entry, new_name)
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    pub async fn delete_entry(&self, notebook: &str, key: Option<NotebookKey>, entry: &str) -> bool {
        let Some(session) = self.unlock(notebook, key).await else {
            return false;
        };
        let question = format!("Delete entry '{}'?", entry);
        if !self.ui.confirm("Delete entry", &question).await {
            return false;
        }
        match self.api.delete_entry(session.name(), session.key(), entry).await {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }
}

pub fn render_notebooks(view: &ListView<NotebookHandle>) -> String {
    let mut out = String::new();
    if view.is_empty() {
        out.push_str("No notebooks yet.\n");
        return out;
    }
    let _ = writeln!(out, "{} notebook(s), sorted by {}", view.len(), view.spec());
    for notebook in view.rows() {
        let _ = writeln!(
            out,
            "  {:<24} {:<16} {:<16} {}",
            notebook.name,
            display_time(&notebook.create_time),
            display_time(&notebook.edit_time),
            notebook.description
        );
    }
    out
}

pub fn render_entries(view: &ListView<Entry>) -> String {
    let mut out = String::new();
    if view.is_empty() {
        out.push_str("No entries.\n");
        return out;
    }
    let noun = if view.len() == 1 { "entry" } else { "entries" };
    let _ = writeln!(out, "{} {}, sorted by {}", view.len(), noun, view.spec());
    for entry in view.rows() {
        let _ = writeln!(
            out,
            "  {:<32} {:<16} {}",
            entry.name,
            display_time(&entry.create_time),
            display_time(&entry.edit_time)
        );
    }
    out
}

pub fn render_notebook_header(notebook: &UnlockedNotebook) -> String {
    let mut out = format!("# {}\n", notebook.name);
    if !notebook.description.is_empty() {
        let _ = writeln!(out, "{}", notebook.description);
    }
    out
}
