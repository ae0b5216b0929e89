use crate::api::NotebookApi;
use crate::error::{NotebookError, NotebookResult};
use crate::logger::log;
use crate::models::{NotebookHandle, NotebookKey, UnlockedNotebook};
use crate::prompt::{ErrorReporter, KeyPrompt};

/// A decrypted notebook together with the key that opened it. The two are
/// only ever held as a pair.
#[derive(Debug)]
pub struct UnlockedSession {
    notebook: UnlockedNotebook,
    key: NotebookKey,
}

impl UnlockedSession {
    pub fn notebook(&self) -> &UnlockedNotebook {
        &self.notebook
    }

    pub fn key(&self) -> &NotebookKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.notebook.name
    }

    pub fn into_parts(self) -> (UnlockedNotebook, NotebookKey) {
        (self.notebook, self.key)
    }
}

#[derive(Debug)]
pub enum UnlockState {
    /// No usable key; the next step asks the user for one.
    Locked(NotebookHandle),
    /// The next step tries `key` against the store.
    Unlocking {
        handle: NotebookHandle,
        key: NotebookKey,
    },
    Unlocked(UnlockedSession),
    /// The user gave up. The caller must navigate back.
    Abandoned,
}

impl UnlockState {
    fn label(&self) -> &'static str {
        match self {
            UnlockState::Locked(_) => "Locked",
            UnlockState::Unlocking { .. } => "Unlocking",
            UnlockState::Unlocked(_) => "Unlocked",
            UnlockState::Abandoned => "Abandoned",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, UnlockState::Unlocked(_) | UnlockState::Abandoned)
    }
}

/// Obtains a readable notebook for one view.
///
/// Every transition takes `&mut self`, so a view can never have two unlock
/// attempts in flight for the same coordinator.
pub struct UnlockCoordinator<'a, A, P, R> {
    api: &'a A,
    prompt: &'a P,
    reporter: &'a R,
    state: UnlockState,
}

impl<'a, A, P, R> UnlockCoordinator<'a, A, P, R>
where
    A: NotebookApi,
    P: KeyPrompt,
    R: ErrorReporter,
{
    /// Looks the notebook up and decides where the machine starts: straight
    /// to `Unlocking` when the navigation carried a key, `Locked` otherwise.
    pub async fn request(
        api: &'a A,
        prompt: &'a P,
        reporter: &'a R,
        name: &str,
        carried_key: Option<NotebookKey>,
    ) -> Self {
        let mut coordinator = Self {
            api,
            prompt,
            reporter,
            state: UnlockState::Abandoned,
        };
        coordinator.state = coordinator.resolve(name, carried_key).await;
        coordinator
    }

    async fn resolve(&self, name: &str, carried_key: Option<NotebookKey>) -> UnlockState {
        match self.api.notebook_details(name).await {
            Ok(handle) => match carried_key.filter(|k| !k.is_empty()) {
                Some(key) => {
                    log(&format!("Unlock({}): key carried in, trying it", name));
                    UnlockState::Unlocking { handle, key }
                }
                None => UnlockState::Locked(handle),
            },
            Err(e) => {
                log(&format!("Unlock({}): could not load details: {}", name, e));
                self.reporter.report_error(&e.to_string());
                UnlockState::Abandoned
            }
        }
    }

    pub fn state(&self) -> &UnlockState {
        &self.state
    }

    pub fn session(&self) -> Option<&UnlockedSession> {
        match &self.state {
            UnlockState::Unlocked(session) => Some(session),
            _ => None,
        }
    }

    /// Hands the session to the page. Anything short of `Unlocked` counts as
    /// the user backing out.
    pub fn finish(self) -> NotebookResult<UnlockedSession> {
        match self.state {
            UnlockState::Unlocked(session) => Ok(session),
            _ => Err(NotebookError::Cancelled),
        }
    }

    /// Performs a single transition. Settled states are left as they are.
    pub async fn step(&mut self) -> &UnlockState {
        // If this future is dropped halfway the machine stays Abandoned,
        // which never reads as unlocked.
        let current = std::mem::replace(&mut self.state, UnlockState::Abandoned);
        let from = current.label();

        self.state = match current {
            UnlockState::Locked(handle) => match self.prompt.prompt_for_key(&handle).await {
                Some(key) => UnlockState::Unlocking { handle, key },
                None => {
                    log(&format!("Unlock({}): prompt dismissed", handle.name));
                    UnlockState::Abandoned
                }
            },
            UnlockState::Unlocking { handle, key } => {
                match self.api.open_notebook(&handle.name, &key).await {
                    Ok(notebook) => UnlockState::Unlocked(UnlockedSession { notebook, key }),
                    Err(e) if e.is_authorization() => {
                        log(&format!("Unlock({}): key rejected: {}", handle.name, e));
                        UnlockState::Locked(handle)
                    }
                    Err(e) => {
                        log(&format!("Unlock({}): open failed: {}", handle.name, e));
                        self.reporter.report_error(&e.to_string());
                        UnlockState::Locked(handle)
                    }
                }
            }
            settled => settled,
        };

        if from != self.state.label() {
            log(&format!("Unlock: {} -> {}", from, self.state.label()));
        }
        &self.state
    }

    /// Steps until the notebook is unlocked or the user gives up.
    pub async fn run(&mut self) -> &UnlockState {
        while !self.state().is_settled() {
            self.step().await;
        }
        &self.state
    }

    /// Drops whatever is held and starts over for `name`, which may be a new
    /// name after a rename. A key is only reused if the caller passes it in,
    /// and it is validated against the store again.
    pub async fn invalidate(&mut self, name: &str, carried_key: Option<NotebookKey>) -> &UnlockState {
        self.state = UnlockState::Abandoned;
        self.state = self.resolve(name, carried_key).await;
        self.run().await
    }
}
