//! Per-user, capped, append-only log of human-readable actions.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserActivity;

pub const MAX_ACTIVITIES_PER_USER: usize = 50;

/// Bucket owner for actions taken before anyone signs in.
pub const GUEST: &str = "guest";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ActivityLog {
    buckets: HashMap<String, Vec<UserActivity>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the user's bucket, evicting the oldest past the cap.
    pub fn log(&mut self, user_id: &str, description: impl Into<String>) -> &UserActivity {
        let now = Utc::now();
        let entry = UserActivity {
            id: format!("act-{}-{}", now.timestamp_millis(), short_suffix()),
            timestamp: now,
            description: description.into(),
            user_id: user_id.to_string(),
        };

        let bucket = self.buckets.entry(user_id.to_string()).or_default();
        bucket.push(entry);
        if bucket.len() > MAX_ACTIVITIES_PER_USER {
            let excess = bucket.len() - MAX_ACTIVITIES_PER_USER;
            bucket.drain(..excess);
        }
        &bucket[bucket.len() - 1]
    }

    /// Entries for a user, oldest first. Empty when the user has none.
    pub fn get_activities(&self, user_id: &str) -> &[UserActivity] {
        self.buckets.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn user_count(&self) -> usize {
        self.buckets.len()
    }
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..5].to_string()
}
