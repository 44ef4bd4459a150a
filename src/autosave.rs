//! Debounced draft auto-save for a composer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::EmailData;
use crate::session::SharedSession;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(3500);

/// Cancellable timer holding at most one pending task.
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Run `task` after the quiet period, replacing any task still waiting.
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Saves the latest composition once typing has paused.
pub struct DraftAutoSaver {
    session: SharedSession,
    debouncer: Debouncer,
}

impl DraftAutoSaver {
    pub fn new(session: SharedSession, quiet_period: Duration) -> Self {
        Self {
            session,
            debouncer: Debouncer::new(quiet_period),
        }
    }

    /// Record an edit. Returns false when the draft is blank and nothing was scheduled.
    pub fn edit(&mut self, draft: EmailData) -> bool {
        if draft.is_blank() {
            return false;
        }
        let session = self.session.clone();
        self.debouncer.schedule(async move {
            let mut session = session.lock().await;
            if !session.is_authenticated() {
                debug!("Skipping draft auto-save: nobody signed in");
                return;
            }
            match session.save_email_draft(draft) {
                Ok(outcome) => debug!(?outcome, "Draft auto-saved"),
                Err(e) => warn!(error = %e, "Draft auto-save failed"),
            }
        });
        true
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::storage::Storage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn shared_session() -> SharedSession {
        let mut store = SessionStore::new(Storage::temporary().unwrap());
        store.hydrate();
        store.into_shared()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_runs_only_the_last_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        for value in 1..=3 {
            let hits = hits.clone();
            debouncer.schedule(async move {
                hits.store(value, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let counter = hits.clone();
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_pending());

        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_keeps_only_the_settled_draft() {
        let session = shared_session();
        let mut saver = DraftAutoSaver::new(session.clone(), DEFAULT_QUIET_PERIOD);

        assert!(saver.edit(EmailData::new("a@x.io", "Hel", "")));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(saver.edit(EmailData::new("a@x.io", "Hello", "")));
        tokio::time::sleep(Duration::from_millis(3600)).await;

        let store = session.lock().await;
        assert_eq!(store.email_drafts().len(), 1);
        assert_eq!(store.email_drafts()[0].subject, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_draft_and_signed_out_session_do_not_save() {
        let session = shared_session();
        let mut saver = DraftAutoSaver::new(session.clone(), DEFAULT_QUIET_PERIOD);
        assert!(!saver.edit(EmailData::default()));
        assert!(!saver.is_pending());

        session.lock().await.logout().unwrap();
        saver.edit(EmailData::new("a@x.io", "late", ""));
        tokio::time::sleep(Duration::from_millis(4000)).await;

        assert!(session.lock().await.email_drafts().is_empty());
    }
}
