// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Credential store abstraction with in-memory and flat-file implementations.
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashkit_common::{AccountStatus, Role};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs as tokio_fs, sync::Mutex};

/// Identity record owned by the credential store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Opaque, stable id carried in session claims
    pub id: String,
    /// Normalized sign-in identifier (email)
    pub identifier: String,
    /// PHC hash; `None` for accounts that can only sign in through a provider
    #[serde(default)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Fresh active record with a random id
    pub fn new(identifier: &str, password_hash: Option<String>, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identifier: normalize_identifier(identifier),
            password_hash,
            role,
            status: AccountStatus::Active,
            created_at: Utc::now(),
            last_sign_in_at: None,
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }
}

/// Identifiers compare case-insensitively and ignore surrounding whitespace
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Trait for credential store backends
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a record by sign-in identifier
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, AppError>;

    /// Insert a new record; an existing identifier is a `Conflict`
    async fn insert(&self, record: UserRecord) -> Result<(), AppError>;

    /// Change the role of an existing record
    async fn update_role(&self, identifier: &str, role: Role) -> Result<UserRecord, AppError>;

    /// Change the status of an existing record
    async fn update_status(
        &self,
        identifier: &str,
        status: AccountStatus,
    ) -> Result<UserRecord, AppError>;

    /// Note a successful sign-in. Stores may ignore this.
    async fn record_sign_in(&self, _identifier: &str, _at: DateTime<Utc>) -> Result<(), AppError> {
        Ok(())
    }
}

/// Store kept entirely in memory, keyed by normalized identifier
#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<DashMap<String, UserRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn update<F>(&self, identifier: &str, apply: F) -> Result<UserRecord, AppError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let key = normalize_identifier(identifier);
        let mut record = self
            .users
            .get_mut(&key)
            .ok_or_else(|| AppError::NotFound(format!("user {key}")))?;
        apply(&mut *record);
        Ok(record.value().clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, AppError> {
        let key = normalize_identifier(identifier);
        Ok(self.users.get(&key).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: UserRecord) -> Result<(), AppError> {
        let key = normalize_identifier(&record.identifier);
        match self.users.entry(key) {
            Entry::Occupied(e) => Err(AppError::Conflict(format!("user {}", e.key()))),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            },
        }
    }

    async fn update_role(&self, identifier: &str, role: Role) -> Result<UserRecord, AppError> {
        self.update(identifier, |r| r.role = role)
    }

    async fn update_status(
        &self,
        identifier: &str,
        status: AccountStatus,
    ) -> Result<UserRecord, AppError> {
        self.update(identifier, |r| r.status = status)
    }

    async fn record_sign_in(&self, identifier: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(identifier, |r| r.last_sign_in_at = Some(at))
            .map(|_| ())
    }
}

/// Flat-file implementation: one JSON document per user under `users/`.
///
/// File names are the hex SHA-256 of the normalized identifier: fixed length
/// whatever the identifier, and lookups never scan the directory.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("users"))?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(normalize_identifier(identifier).as_bytes()));
        self.root.join("users").join(format!("{key}.json"))
    }

    /// Stage `json` next to `path`; the caller moves it into place
    async fn write_tmp(path: &Path, json: &str) -> Result<PathBuf, AppError> {
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio_fs::write(&tmp, json).await {
            let _ = tokio_fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(tmp)
    }

    async fn read(&self, identifier: &str) -> Result<Option<UserRecord>, AppError> {
        let path = self.path_for(identifier);
        let content = match tokio_fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write through a temp file + rename so readers never see half a record
    async fn write(&self, record: &UserRecord) -> Result<(), AppError> {
        let path = self.path_for(&record.identifier);
        let json = serde_json::to_string_pretty(record)?;
        let tmp = Self::write_tmp(&path, &json).await?;
        tokio_fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update<F>(&self, identifier: &str, apply: F) -> Result<UserRecord, AppError>
    where
        F: FnOnce(&mut UserRecord) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let key = normalize_identifier(identifier);
        let mut record = self
            .read(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {key}")))?;
        apply(&mut record);
        self.write(&record).await?;
        Ok(record)
    }
}

#[async_trait]
impl CredentialStore for FlatFileStorage {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, AppError> {
        self.read(identifier).await
    }

    async fn insert(&self, mut record: UserRecord) -> Result<(), AppError> {
        record.identifier = normalize_identifier(&record.identifier);
        let path = self.path_for(&record.identifier);
        let json = serde_json::to_string_pretty(&record)?;

        let _guard = self.write_lock.lock().await;
        let tmp = Self::write_tmp(&path, &json).await?;
        // linking fails instead of replacing an existing record
        let linked = tokio_fs::hard_link(&tmp, &path).await;
        tokio_fs::remove_file(&tmp).await?;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(AppError::Conflict(format!("user {}", record.identifier)))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn update_role(&self, identifier: &str, role: Role) -> Result<UserRecord, AppError> {
        self.update(identifier, move |r| r.role = role).await
    }

    async fn update_status(
        &self,
        identifier: &str,
        status: AccountStatus,
    ) -> Result<UserRecord, AppError> {
        self.update(identifier, move |r| r.status = status).await
    }

    async fn record_sign_in(&self, identifier: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(identifier, move |r| r.last_sign_in_at = Some(at))
            .await
            .map(|_| ())
    }
}
