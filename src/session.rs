//! Session store: the signed-in user, the registered accounts, activity
//! buckets, SMTP configurations and drafts, written through to [`Storage`].
//!
//! The store moves through `Uninitialized -> Hydrating -> Ready` exactly once.
//! Mutations made before it is ready only touch memory; the first write-through
//! happens when hydration completes, so empty defaults never clobber durable
//! state.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::activity::{ActivityLog, GUEST};
use crate::auth::{hash_password, verify_password};
use crate::drafts::{DraftSave, DraftStore};
use crate::models::{EmailData, NewUser, SmtpConfiguration, User, UserActivity};
use crate::role::{default_company, resolve_role};
use crate::smtp::{parse_smtp_block, SmtpConfigStore, SmtpImportReport};
use crate::storage::{keys, Storage, StorageError, StorageResult};

pub const DEFAULT_DEMO_PASSWORD: &str = "password";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("This email is already registered. Please try logging in or use a different email.")]
    DuplicateEmail(String),

    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,

    #[error("Error: User not authenticated.")]
    NotAuthenticated,

    #[error("SMTP list input is empty. Nothing to save.")]
    EmptySmtpInput,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Hydrating,
    Ready,
}

/// Secret an account signs in with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// bcrypt hash written at registration
    Hash(String),
    /// account never stored a hash; the configured demo password applies
    Demo(String),
    UnknownAccount,
}

impl Credential {
    /// Blocking when a hash is involved; run off the async executor.
    pub fn verify(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        match self {
            Credential::Hash(hash) => verify_password(password, hash),
            Credential::Demo(demo) => Ok(password == demo),
            Credential::UnknownAccount => Ok(false),
        }
    }
}

/// Session handle shared between the REST layer, the dispatcher and the auto-saver.
pub type SharedSession = Arc<Mutex<SessionStore>>;

pub struct SessionStore {
    storage: Storage,
    lifecycle: Lifecycle,
    demo_password: String,
    current_user: Option<User>,
    registered_users: Vec<User>,
    activities: ActivityLog,
    smtp: SmtpConfigStore,
    drafts: DraftStore,
}

/// Records decoded from storage, applied only once all of them parsed.
struct LoadedRecords {
    current_user: Option<User>,
    registered_users: Option<Vec<User>>,
    activities: Option<ActivityLog>,
    smtp: Option<SmtpConfigStore>,
    drafts: Option<DraftStore>,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            lifecycle: Lifecycle::Uninitialized,
            demo_password: DEFAULT_DEMO_PASSWORD.to_string(),
            current_user: None,
            registered_users: Vec::new(),
            activities: ActivityLog::new(),
            smtp: SmtpConfigStore::new(),
            drafts: DraftStore::new(),
        }
    }

    /// Password accepted for accounts that never stored a credential.
    pub fn with_demo_password(mut self, password: impl Into<String>) -> Self {
        self.demo_password = password.into();
        self
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // --- Lifecycle ---

    /// Load the durable records. Never fails: a malformed record resets every
    /// record to empty. Runs at most once per store.
    pub fn hydrate(&mut self) {
        if self.lifecycle != Lifecycle::Uninitialized {
            warn!(lifecycle = ?self.lifecycle, "Session already hydrated; ignoring");
            return;
        }
        self.lifecycle = Lifecycle::Hydrating;

        let reset = match self.read_records() {
            Ok(loaded) => {
                if let Err(e) = self.apply_records(loaded) {
                    error!(error = %e, "Error applying stored session records");
                }
                false
            }
            Err(e) => {
                error!(error = %e, "Error initializing session from durable storage; resetting");
                self.reset_state();
                if let Err(e) = self.storage.clear_records() {
                    error!(error = %e, "Failed to clear durable session records");
                }
                true
            }
        };

        self.lifecycle = Lifecycle::Ready;
        info!(
            users = self.registered_users.len(),
            authenticated = self.is_authenticated(),
            reset,
            "Session hydrated"
        );
        // After a reset the records stay absent so the next start seeds again.
        if !reset {
            if let Err(e) = self.persist() {
                error!(error = %e, "Failed to write session records after hydration");
            }
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// True until hydration has completed.
    pub fn is_loading(&self) -> bool {
        self.lifecycle != Lifecycle::Ready
    }

    fn read_records(&self) -> StorageResult<LoadedRecords> {
        Ok(LoadedRecords {
            current_user: self.storage.get_record(keys::CURRENT_USER)?,
            registered_users: self.storage.get_record(keys::REGISTERED_USERS)?,
            activities: self.storage.get_record(keys::USER_ACTIVITIES)?,
            smtp: self.storage.get_record(keys::SMTP_CONFIGS)?,
            drafts: self.storage.get_record(keys::EMAIL_DRAFTS)?,
        })
    }

    fn apply_records(&mut self, loaded: LoadedRecords) -> SessionResult<()> {
        self.activities = loaded.activities.unwrap_or_default();
        self.smtp = loaded.smtp.unwrap_or_default();
        self.drafts = loaded.drafts.unwrap_or_default();

        let had_stored_user = loaded.current_user.is_some();
        self.current_user = loaded.current_user.map(with_resolved_role);

        match loaded.registered_users {
            Some(users) => {
                self.registered_users = users.into_iter().map(with_resolved_role).collect();
            }
            None => {
                let admin = default_admin();
                info!(email = %admin.email, "No registered users stored; seeding default admin");
                self.registered_users = vec![admin.clone()];
                if !had_stored_user {
                    self.login(admin)?;
                }
            }
        }
        Ok(())
    }

    fn reset_state(&mut self) {
        self.current_user = None;
        self.registered_users.clear();
        self.activities = ActivityLog::new();
        self.smtp = SmtpConfigStore::new();
        self.drafts = DraftStore::new();
    }

    /// Write every record through to storage. Skipped while loading.
    fn persist(&self) -> StorageResult<()> {
        if self.is_loading() {
            debug!("Skipping write-through while session is hydrating");
            return Ok(());
        }
        match &self.current_user {
            Some(user) => self.storage.put_record(keys::CURRENT_USER, user)?,
            None => self.storage.remove_record(keys::CURRENT_USER)?,
        }
        self.storage
            .put_record(keys::REGISTERED_USERS, &self.registered_users)?;
        self.storage
            .put_record(keys::USER_ACTIVITIES, &self.activities)?;
        self.storage.put_record(keys::SMTP_CONFIGS, &self.smtp)?;
        self.storage.put_record(keys::EMAIL_DRAFTS, &self.drafts)?;
        self.storage.flush()
    }

    // --- Accounts ---

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn registered_users(&self) -> &[User] {
        &self.registered_users
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<&User> {
        self.registered_users.iter().find(|u| u.email == email)
    }

    pub fn find_user_by_id(&self, id: &str) -> Option<&User> {
        self.registered_users.iter().find(|u| u.id == id)
    }

    /// Make `user` the signed-in user, re-deriving its role and filling a default company.
    pub fn login(&mut self, user: User) -> SessionResult<User> {
        let role = resolve_role(&user.email);
        let company = user
            .company
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_company(role).to_string());
        let user = User {
            role,
            company: Some(company),
            ..user
        };

        self.activities
            .log(&user.id, format!("User logged in: {}", user.email));
        // Signing in an unknown user also registers them
        if self.find_user_by_email(&user.email).is_none() {
            let mut entry = user.clone();
            entry.registered_at.get_or_insert_with(Utc::now);
            self.registered_users.push(entry);
        }
        info!(user_id = %user.id, email = %user.email, role = %user.role, "User logged in");
        self.current_user = Some(user.clone());
        self.persist()?;
        Ok(user)
    }

    /// Sign out, returning the user that was signed in.
    pub fn logout(&mut self) -> SessionResult<Option<User>> {
        let outgoing = self.current_user.take();
        if let Some(user) = &outgoing {
            self.activities
                .log(&user.id, format!("User logged out: {}", user.email));
            info!(user_id = %user.id, "User logged out");
        }
        self.persist()?;
        Ok(outgoing)
    }

    /// Add a new account. Emails are unique; a duplicate is rejected and logged under `guest`.
    pub fn register_user(&mut self, data: NewUser) -> SessionResult<User> {
        if self.find_user_by_email(&data.email).is_some() {
            warn!(email = %data.email, "Registration rejected: email already registered");
            self.activities.log(
                GUEST,
                format!("Registration attempt with existing email: {}.", data.email),
            );
            self.persist()?;
            return Err(SessionError::DuplicateEmail(data.email));
        }

        let role = resolve_role(&data.email);
        let now = Utc::now();
        let mut id = format!("user-{}", now.timestamp_millis());
        // Two registrations in the same millisecond
        if self.find_user_by_id(&id).is_some() {
            id = format!("{id}-{}", &Uuid::new_v4().simple().to_string()[..5]);
        }
        let user = User {
            id,
            full_name: data.full_name,
            email: data.email,
            role,
            registered_at: Some(now),
            company: Some(
                data.company
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| default_company(role).to_string()),
            ),
        };

        self.registered_users.push(user.clone());
        self.activities.log(
            &user.id,
            format!("New user registered: {} with role {}", user.email, user.role),
        );
        info!(user_id = %user.id, email = %user.email, role = %user.role, "User registered");
        self.persist()?;
        Ok(user)
    }

    /// Register and store a bcrypt hash of the password for later sign-in.
    pub fn register_account(&mut self, data: NewUser, password: &str) -> SessionResult<User> {
        let password_hash = hash_password(password)?;
        self.register_account_with_hash(data, &password_hash)
    }

    /// Register with an already computed hash. The credential is written
    /// before the account so a stored account always has its hash.
    pub fn register_account_with_hash(
        &mut self,
        data: NewUser,
        password_hash: &str,
    ) -> SessionResult<User> {
        if self.find_user_by_email(&data.email).is_none() {
            self.storage.put_credential(&data.email, password_hash)?;
        }
        // Duplicates fall through here and are rejected (and logged) by register_user
        self.register_user(data)
    }

    /// What sign-in must check for this email. Cheap; the bcrypt work happens in [`Credential::verify`].
    pub fn credential_for(&self, email: &str) -> SessionResult<Credential> {
        if self.find_user_by_email(email).is_none() {
            return Ok(Credential::UnknownAccount);
        }
        Ok(match self.storage.get_credential(email)? {
            Some(hash) => Credential::Hash(hash),
            None => Credential::Demo(self.demo_password.clone()),
        })
    }

    /// Sign the user in when `accepted`, otherwise log a failed attempt under `guest`.
    pub fn finish_authentication(&mut self, email: &str, accepted: bool) -> SessionResult<User> {
        let matched = self.find_user_by_email(email).cloned().filter(|_| accepted);
        match matched {
            Some(user) => self.login(user),
            None => {
                warn!(email, "Failed login attempt");
                self.activities
                    .log(GUEST, format!("Failed login attempt for email: {email}."));
                self.persist()?;
                Err(SessionError::InvalidCredentials)
            }
        }
    }

    /// Check credentials and sign the user in.
    ///
    /// Accounts without a stored hash (the seeded admin, users added through
    /// [`Self::login`]) accept the demo password.
    pub fn authenticate(&mut self, email: &str, password: &str) -> SessionResult<User> {
        let accepted = self.credential_for(email)?.verify(password)?;
        self.finish_authentication(email, accepted)
    }

    /// Edit the signed-in user's name and company and sign them in again.
    pub fn update_profile(
        &mut self,
        full_name: impl Into<String>,
        company: Option<String>,
    ) -> SessionResult<User> {
        let current = self
            .current_user
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;
        let full_name = full_name.into();
        let updated = User {
            full_name: full_name.clone(),
            company: company.clone(),
            ..current
        };

        // login fills the default company, so copy from its result
        let user = self.login(updated)?;
        if let Some(entry) = self
            .registered_users
            .iter_mut()
            .find(|u| u.email == user.email)
        {
            entry.full_name = user.full_name.clone();
            entry.company = user.company.clone();
        }
        self.activities.log(
            &user.id,
            format!(
                "Profile settings updated. Full Name: {}, Company: {}",
                full_name,
                company.unwrap_or_default()
            ),
        );
        self.persist()?;
        Ok(user)
    }

    // --- Activity ---

    pub fn log_activity(&mut self, user_id: &str, description: impl Into<String>) -> SessionResult<()> {
        self.activities.log(user_id, description);
        self.persist()?;
        Ok(())
    }

    /// Log against the signed-in user, if any.
    fn log_for_current(&mut self, description: impl Into<String>) {
        if let Some(user) = &self.current_user {
            self.activities.log(&user.id, description);
        }
    }

    /// Log against the signed-in user and write through. No-op without a session.
    pub fn log_current_activity(&mut self, description: impl Into<String>) -> SessionResult<()> {
        self.log_for_current(description);
        self.persist()?;
        Ok(())
    }

    pub fn get_activities(&self, user_id: &str) -> &[UserActivity] {
        self.activities.get_activities(user_id)
    }

    // --- SMTP ---

    pub fn smtp_configurations(&self) -> &[SmtpConfiguration] {
        self.smtp.all()
    }

    pub fn find_smtp_configuration(&self, id: &str) -> Option<&SmtpConfiguration> {
        self.smtp.find(id)
    }

    /// Replace the whole collection.
    pub fn save_smtp_configurations(&mut self, configs: Vec<SmtpConfiguration>) -> SessionResult<()> {
        let total = configs.len();
        self.smtp.save_all(configs);
        self.log_for_current(format!("Updated SMTP configurations. Total: {total}."));
        info!(total, "SMTP configurations saved");
        self.persist()?;
        Ok(())
    }

    /// Parse a `host:port:user:pass[:label]` block and append its valid lines.
    pub fn import_smtp_block(&mut self, text: &str) -> SessionResult<SmtpImportReport> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptySmtpInput);
        }
        let parsed = parse_smtp_block(text);
        let processed = parsed.len();
        let valid: Vec<SmtpConfiguration> =
            parsed.into_iter().filter(|c| c.is_valid_format()).collect();
        let report = SmtpImportReport {
            processed,
            saved: valid.len(),
            invalid: processed - valid.len(),
        };
        if report.invalid > 0 {
            warn!(invalid = report.invalid, "Dropped SMTP lines with invalid format");
        }

        // Append to what is already saved, then replace wholesale
        let mut combined = self.smtp.all().to_vec();
        combined.extend(valid);
        self.save_smtp_configurations(combined)?;

        self.log_for_current(format!(
            "Attempted to save {} new SMTP configurations. {} saved.",
            report.processed, report.saved
        ));
        self.persist()?;
        Ok(report)
    }

    // --- Drafts ---

    pub fn email_drafts(&self) -> &[EmailData] {
        self.drafts.all()
    }

    pub fn save_email_draft(&mut self, draft: EmailData) -> SessionResult<DraftSave> {
        let subject = draft.subject.clone();
        let outcome = self.drafts.save(draft);
        match outcome {
            DraftSave::Updated => self.log_for_current(format!("Updated email draft: {subject}")),
            DraftSave::Created => self.log_for_current(format!("Saved new email draft: {subject}")),
        }
        debug!(subject = %subject, ?outcome, "Draft saved");
        self.persist()?;
        Ok(outcome)
    }

    /// Delete every draft with this subject, whatever its recipient.
    pub fn delete_email_draft(&mut self, subject: &str) -> SessionResult<usize> {
        let removed = self.drafts.delete(subject);
        self.log_for_current(format!("Deleted email draft: {subject}"));
        debug!(subject, removed, "Drafts deleted");
        self.persist()?;
        Ok(removed)
    }
}

fn with_resolved_role(mut user: User) -> User {
    user.role = resolve_role(&user.email);
    user
}

fn default_admin() -> User {
    let email = "admin-0@surprisesender.com".to_string();
    User {
        id: "admin-0".to_string(),
        full_name: "Default Admin".to_string(),
        role: resolve_role(&email),
        email,
        registered_at: Some(Utc::now()),
        company: Some("Surprise Sender HQ".to_string()),
    }
}
