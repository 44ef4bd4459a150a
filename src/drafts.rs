use serde::{Deserialize, Serialize};

use crate::models::EmailData;

pub const MAX_DRAFTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftSave {
    Created,
    Updated,
}

/// Newest-first list of in-progress compositions.
///
/// Saving upserts on the `(subject, to)` pair while deleting matches on the
/// subject alone, so one delete can remove drafts addressed to different people.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct DraftStore {
    drafts: Vec<EmailData>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, draft: EmailData) -> DraftSave {
        if let Some(existing) = self
            .drafts
            .iter_mut()
            .find(|d| d.subject == draft.subject && d.to == draft.to)
        {
            *existing = draft;
            return DraftSave::Updated;
        }
        self.drafts.insert(0, draft);
        self.drafts.truncate(MAX_DRAFTS);
        DraftSave::Created
    }

    /// Remove every draft with the given subject. Returns how many were removed.
    pub fn delete(&mut self, subject: &str) -> usize {
        let before = self.drafts.len();
        self.drafts.retain(|d| d.subject != subject);
        before - self.drafts.len()
    }

    pub fn all(&self) -> &[EmailData] {
        &self.drafts
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_drafts_are_prepended() {
        let mut store = DraftStore::new();
        store.save(EmailData::new("a@x.io", "first", ""));
        store.save(EmailData::new("a@x.io", "second", ""));
        assert_eq!(store.all()[0].subject, "second");
        assert_eq!(store.all()[1].subject, "first");
    }

    #[test]
    fn test_same_subject_and_recipient_updates_in_place() {
        let mut store = DraftStore::new();
        store.save(EmailData::new("a@x.io", "report", "v1"));
        store.save(EmailData::new("b@x.io", "other", ""));

        let outcome = store.save(EmailData::new("a@x.io", "report", "v2"));

        assert_eq!(outcome, DraftSave::Updated);
        assert_eq!(store.len(), 2);
        assert_eq!(store.all()[1].body, "v2");
    }

    #[test]
    fn test_same_subject_new_recipient_is_a_new_draft() {
        let mut store = DraftStore::new();
        store.save(EmailData::new("a@x.io", "report", ""));
        assert_eq!(store.save(EmailData::new("b@x.io", "report", "")), DraftSave::Created);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_list_is_capped_to_most_recent() {
        let mut store = DraftStore::new();
        for i in 0..25 {
            store.save(EmailData::new("a@x.io", format!("s{i}"), ""));
        }
        assert_eq!(store.len(), MAX_DRAFTS);
        assert_eq!(store.all()[0].subject, "s24");
        assert_eq!(store.all()[19].subject, "s5");
    }

    #[test]
    fn test_delete_matches_subject_only() {
        let mut store = DraftStore::new();
        store.save(EmailData::new("a@x.io", "report", ""));
        store.save(EmailData::new("b@x.io", "report", ""));
        store.save(EmailData::new("a@x.io", "keep", ""));

        assert_eq!(store.delete("report"), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].subject, "keep");
        assert_eq!(store.delete("missing"), 0);
    }
}
