use crate::api::NotebookApi;
use crate::error::NotebookError;
use crate::logger::log;
use crate::models::{NotebookKey, KEYS_MUST_MATCH};
use crate::prompt::ErrorReporter;

/// What the user submitted from the edit-notebook form. Empty fields mean
/// "leave unchanged"; `description: None` likewise.
#[derive(Debug, Clone, Default)]
pub struct NotebookEditForm {
    pub name: String,
    pub description: Option<String>,
    pub old_key: NotebookKey,
    pub new_key: NotebookKey,
    pub confirm_new_key: NotebookKey,
}

impl NotebookEditForm {
    fn wants_rekey(&self) -> bool {
        !self.old_key.is_empty() || !self.new_key.is_empty() || !self.confirm_new_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub old_key: NotebookKey,
    pub new_key: NotebookKey,
    pub confirm_new_key: NotebookKey,
}

/// The work one submission would do, against the identity committed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    pub committed_name: String,
    pub committed_key: NotebookKey,
    pub pending_name_change: Option<String>,
    pub pending_description_change: Option<String>,
    pub pending_key_change: Option<KeyChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    Rename,
    Describe,
    Rekey,
}

#[derive(Debug)]
pub struct MutationOutcome {
    /// Where the notebook lives now, whatever happened.
    pub name: String,
    /// The key that currently opens it.
    pub key: NotebookKey,
    pub committed: Vec<MutationStep>,
    /// The failure that stopped the submission, if any.
    pub error: Option<NotebookError>,
}

impl MutationOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// One edit-notebook dialog interaction. Holds the name, description and key
/// committed so far, so a second submission after a partial failure continues
/// from there.
pub struct NotebookMutationTransaction {
    tracked_description: String,
    tracked_name: String,
    tracked_key: NotebookKey,
}

impl NotebookMutationTransaction {
    pub fn new(name: impl Into<String>, description: impl Into<String>, key: NotebookKey) -> Self {
        Self {
            tracked_description: description.into(),
            tracked_name: name.into(),
            tracked_key: key,
        }
    }

    pub fn plan(&self, form: &NotebookEditForm) -> MutationPlan {
        let pending_name_change = Some(form.name.as_str())
            .filter(|n| !n.is_empty() && *n != self.tracked_name)
            .map(str::to_string);

        let pending_description_change = form
            .description
            .as_ref()
            .filter(|d| **d != self.tracked_description)
            .cloned();

        let pending_key_change = form.wants_rekey().then(|| KeyChange {
            old_key: form.old_key.clone(),
            new_key: form.new_key.clone(),
            confirm_new_key: form.confirm_new_key.clone(),
        });

        MutationPlan {
            committed_name: self.tracked_name.clone(),
            committed_key: self.tracked_key.clone(),
            pending_name_change,
            pending_description_change,
            pending_key_change,
        }
    }

    /// Runs rename, describe, rekey in that order, stopping at the first
    /// failure. Committed steps are never rolled back.
    pub async fn submit<A, R>(
        &mut self,
        api: &A,
        reporter: &R,
        form: &NotebookEditForm,
    ) -> MutationOutcome
    where
        A: NotebookApi,
        R: ErrorReporter,
    {
        let plan = self.plan(form);
        let mut committed = Vec::new();
        let error = self.apply(api, plan, &mut committed).await.err();

        if let Some(e) = &error {
            log(&format!(
                "Mutation({}): stopped after {:?}: {}",
                self.tracked_name, committed, e
            ));
            reporter.report_error(&e.to_string());
        }

        MutationOutcome {
            name: self.tracked_name.clone(),
            key: self.tracked_key.clone(),
            committed,
            error,
        }
    }

    async fn apply<A: NotebookApi>(
        &mut self,
        api: &A,
        plan: MutationPlan,
        committed: &mut Vec<MutationStep>,
    ) -> Result<(), NotebookError> {
        if let Some(new_name) = plan.pending_name_change {
            api.rename_notebook(&self.tracked_name, &new_name).await?;
            log(&format!("Mutation: renamed {} to {}", self.tracked_name, new_name));
            self.tracked_name = new_name;
            committed.push(MutationStep::Rename);
        }

        if let Some(description) = plan.pending_description_change {
            api.set_notebook_description(&self.tracked_name, &description)
                .await?;
            log(&format!("Mutation({}): description updated", self.tracked_name));
            self.tracked_description = description;
            committed.push(MutationStep::Describe);
        }

        if let Some(change) = plan.pending_key_change {
            if change.new_key != change.confirm_new_key {
                return Err(NotebookError::Validation(KEYS_MUST_MATCH.to_string()));
            }
            api.rekey_notebook(&self.tracked_name, &change.old_key, &change.new_key)
                .await?;
            log(&format!("Mutation({}): key changed", self.tracked_name));
            self.tracked_key = change.new_key;
            committed.push(MutationStep::Rekey);
        }

        Ok(())
    }
}
