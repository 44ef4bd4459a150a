//! Durable key-value storage for the session records.
//!
//! Each record is a single JSON document under a fixed key in the `records`
//! tree, mirroring how the dashboard used browser local storage. Password
//! hashes live in a separate `credentials` tree keyed by email.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// Keys of the durable session records.
pub mod keys {
    pub const CURRENT_USER: &str = "surpriseSenderUser";
    pub const REGISTERED_USERS: &str = "surpriseSender_registeredUsers";
    pub const USER_ACTIVITIES: &str = "surpriseSender_userActivities";
    pub const SMTP_CONFIGS: &str = "surpriseSender_smtpConfigs";
    pub const EMAIL_DRAFTS: &str = "surpriseSender_emailDrafts";

    pub const ALL: [&str; 5] = [
        CURRENT_USER,
        REGISTERED_USERS,
        USER_ACTIVITIES,
        SMTP_CONFIGS,
        EMAIL_DRAFTS,
    ];
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("malformed record '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("json serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("credential for '{0}' is not valid utf-8")]
    BadCredential(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Clone)] // Sled handles are cheap to clone and thread-safe
pub struct Storage {
    db: Db,
    // Trees:
    // - records: one JSON document per session record key
    // - credentials: email -> bcrypt hash (utf-8)
    records: sled::Tree,
    credentials: sled::Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> StorageResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop. Used by tests and dry runs.
    pub fn temporary() -> StorageResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let records = db.open_tree("records")?;
        let credentials = db.open_tree("credentials")?;
        Ok(Self {
            db,
            records,
            credentials,
        })
    }

    /// Read and decode a record. `Ok(None)` means the key was never written.
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.records.get(key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StorageError::Malformed {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn put_record<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        // Serialize to JSON bytes, then replace the whole record
        let json_bytes = serde_json::to_vec(value)?;
        self.records.insert(key.as_bytes(), json_bytes)?;
        Ok(())
    }

    /// Store raw bytes under a record key, bypassing serialization.
    pub fn put_raw(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.records.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn has_record(&self, key: &str) -> StorageResult<bool> {
        Ok(self.records.contains_key(key.as_bytes())?)
    }

    pub fn remove_record(&self, key: &str) -> StorageResult<()> {
        self.records.remove(key.as_bytes())?;
        Ok(())
    }

    /// Drop all five session records. Credentials are left untouched.
    pub fn clear_records(&self) -> StorageResult<()> {
        for key in keys::ALL {
            self.remove_record(key)?;
        }
        Ok(())
    }

    // --- Credentials (kept apart from the records so a reset never drops them) ---

    pub fn put_credential(&self, email: &str, password_hash: &str) -> StorageResult<()> {
        self.credentials
            .insert(email.as_bytes(), password_hash.as_bytes())?;
        Ok(())
    }

    pub fn get_credential(&self, email: &str) -> StorageResult<Option<String>> {
        match self.credentials.get(email.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StorageError::BadCredential(email.to_string())),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
