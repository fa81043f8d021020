//! User progress store — in-memory, keyed by user id.
//!
//! The outer map is locked only to look up, insert or remove an entry; each
//! user's progress sits behind its own mutex. Work on one user therefore
//! never waits on another user's update. No lock is held across an await
//! on external I/O, and callers never keep a reference to a `UserProgress`:
//! they re-fetch by user id on every operation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::RegistrationError;

use super::UserId;
use super::model::{DocumentData, UserProgress};
use super::step::Step;

type Entry = Arc<Mutex<UserProgress>>;

/// Volatile registration progress for all users. Lost on restart.
#[derive(Default)]
pub struct ProgressStore {
    progress: RwLock<HashMap<UserId, Entry>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's entry. The map lock is released before returning.
    async fn entry(&self, user_id: UserId) -> Option<Entry> {
        self.progress.read().await.get(&user_id).map(Arc::clone)
    }

    async fn require(&self, user_id: UserId) -> Result<Entry, RegistrationError> {
        self.entry(user_id)
            .await
            .ok_or(RegistrationError::NotFound { user_id })
    }

    /// Insert a fresh registration at `Start` unless one is already in
    /// flight. Returns whether a new registration was created.
    pub async fn begin(&self, user_id: UserId) -> bool {
        let mut progress = self.progress.write().await;
        if progress.contains_key(&user_id) {
            return false;
        }
        progress.insert(user_id, Arc::new(Mutex::new(UserProgress::new())));
        debug!(user_id, "Registration started");
        true
    }

    /// Drop the user's registration. Absent users are fine.
    pub async fn remove(&self, user_id: UserId) -> Option<UserProgress> {
        let removed = self.progress.write().await.remove(&user_id)?;
        debug!(user_id, "Registration removed");
        let progress = removed.lock().await.clone();
        Some(progress)
    }

    /// Current step, or `None` when no registration is in progress.
    pub async fn current_step(&self, user_id: UserId) -> Option<Step> {
        let entry = self.entry(user_id).await?;
        let step = entry.lock().await.step;
        Some(step)
    }

    pub async fn exists(&self, user_id: UserId) -> bool {
        self.progress.read().await.contains_key(&user_id)
    }

    /// Whether the user is at one of the document upload steps.
    pub async fn is_expecting_upload(&self, user_id: UserId) -> bool {
        self.current_step(user_id)
            .await
            .is_some_and(|step| step.is_upload())
    }

    /// Snapshot of the user's document data.
    pub async fn document_data(&self, user_id: UserId) -> Option<DocumentData> {
        let entry = self.entry(user_id).await?;
        let documents = entry.lock().await.documents.clone();
        Some(documents)
    }

    /// Move to the step-table successor of the current step.
    pub async fn advance(&self, user_id: UserId) -> Result<Step, RegistrationError> {
        let entry = self.require(user_id).await?;
        let mut progress = entry.lock().await;
        advance_in_place(user_id, &mut progress)
    }

    /// Assign a step directly. The move must be an edge of the step table:
    /// the successor, or the rollback from confirmation to the ID upload.
    pub async fn set_step(&self, user_id: UserId, step: Step) -> Result<(), RegistrationError> {
        let entry = self.require(user_id).await?;
        let mut progress = entry.lock().await;
        if !progress.step.can_transition_to(step) {
            return Err(RegistrationError::InvalidTransition {
                from: progress.step,
                to: step,
            });
        }
        debug!(user_id, from = %progress.step, to = %step, "Step set");
        progress.step = step;
        Ok(())
    }

    /// Mutate the user's document data in place.
    pub async fn update_documents<F>(&self, user_id: UserId, f: F) -> Result<(), RegistrationError>
    where
        F: FnOnce(&mut DocumentData),
    {
        let entry = self.require(user_id).await?;
        f(&mut entry.lock().await.documents);
        Ok(())
    }

    /// Merge document data and advance as one atomic update, but only if the
    /// user is still at `expected`. Returns the new step, or `None` if the
    /// step changed in the meantime (nothing is written in that case).
    pub async fn merge_and_advance<F>(
        &self,
        user_id: UserId,
        expected: Step,
        f: F,
    ) -> Result<Option<Step>, RegistrationError>
    where
        F: FnOnce(&mut DocumentData),
    {
        let entry = self.require(user_id).await?;
        let mut progress = entry.lock().await;
        if progress.step != expected {
            return Ok(None);
        }
        f(&mut progress.documents);
        advance_in_place(user_id, &mut progress).map(Some)
    }

    /// Walk the step table until the user reaches `step`.
    #[cfg(test)]
    pub(crate) async fn advance_to(&self, user_id: UserId, step: Step) {
        while self.current_step(user_id).await != Some(step) {
            self.advance(user_id)
                .await
                .expect("target step is ahead of the current one");
        }
    }

    /// Number of registrations in progress.
    pub async fn len(&self) -> usize {
        self.progress.read().await.len()
    }
}

fn advance_in_place(user_id: UserId, entry: &mut UserProgress) -> Result<Step, RegistrationError> {
    let next = entry
        .step
        .next()
        .ok_or(RegistrationError::TerminalStep { step: entry.step })?;
    debug!(user_id, from = %entry.step, to = %next, "Step advanced");
    entry.step = next;
    Ok(next)
}
