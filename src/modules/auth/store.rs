use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;

use super::directory::{DirectoryError, UserDirectory};
use super::password::{generate_random_salt, hash_secret};
use crate::PBKDF2_ITERATIONS;

/// Represents a single user with their authentication details
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,            // Original username as entered (for display)
    pub username_normalized: String, // Lowercase version for lookups and comparisons
    pub id: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub transient_credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub changes: UserChanges,
}

/// Fields modified on a `User` copy that have not been persisted yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub password: bool,
    pub transient_credential: bool,
}

impl User {
    /// Derive the stable identifier for a user from its name and creation time
    pub fn generate_id(username: &str, created_at: &DateTime<Utc>) -> String {
        let unique_id = format!("{}{}", username, created_at.timestamp_nanos_opt().unwrap_or_default());
        let digest = sha2::Sha256::digest(unique_id.as_bytes());

        // First 8 bytes are plenty to keep ids unique and filenames short
        hex::encode(&digest[..8])
    }
}

/// Container for all users plus the hashing parameters
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserStore {
    pub users: HashMap<String, User>,
    pub salt: Vec<u8>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    PBKDF2_ITERATIONS
}

impl Default for UserStore {
    fn default() -> Self {
        Self::with_iterations(PBKDF2_ITERATIONS)
    }
}

impl UserStore {
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            users: HashMap::new(),
            salt: generate_random_salt(),
            iterations,
        }
    }

    pub fn hash(&self, secret: &str) -> String {
        hash_secret(secret, &self.salt, self.iterations)
    }

    /// Function to add a new user to the store
    pub fn add_user(
        &mut self,
        username: &str,
        email: Option<String>,
        password: &str,
    ) -> Result<&User, DirectoryError> {
        if let Some(address) = &email {
            address
                .parse::<lettre::Address>()
                .map_err(|_| DirectoryError::InvalidEmail(address.clone()))?;
        }

        let original_username = username.trim().to_string();
        let username_normalized = original_username.to_lowercase();

        if self.users.contains_key(&username_normalized) {
            return Err(DirectoryError::AlreadyExists(original_username));
        }

        let created_at = Utc::now();
        let user = User {
            id: User::generate_id(&original_username, &created_at),
            username: original_username,
            username_normalized: username_normalized.clone(),
            email,
            password_hash: self.hash(password),
            transient_credential_hash: None,
            created_at,
            password_changed_at: None,
            changes: UserChanges::default(),
        };

        Ok(self.users.entry(username_normalized).or_insert(user))
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(&username.trim().to_lowercase())
    }

    /// Check a password against the stored hash
    pub fn verify_password(&self, username: &str, password: &str) -> bool {
        self.get(username)
            .map(|user| user.password_hash == self.hash(password))
            .unwrap_or(false)
    }

    /// Check a one-time credential (an outstanding reset PIN) against the stored hash
    pub fn verify_transient_credential(&self, username: &str, value: &str) -> bool {
        self.get(username)
            .and_then(|user| user.transient_credential_hash.as_ref())
            .map(|hash| *hash == self.hash(value))
            .unwrap_or(false)
    }
}

/// Load the user store from `path`, starting fresh if the file does not exist
pub fn load_user_store(path: &Path) -> Result<UserStore, DirectoryError> {
    match fs::read(path) {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No user store at {}, starting empty", path.display());
            Ok(UserStore::default())
        }
        Err(e) => Err(DirectoryError::Io(e)),
    }
}

/// Save the user store to `path`, replacing the file atomically
pub fn save_user_store(store: &UserStore, path: &Path) -> Result<(), DirectoryError> {
    let data = serde_json::to_vec_pretty(store)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut staged = NamedTempFile::new_in(&parent)?;
    staged.write_all(&data)?;
    staged.persist(path).map_err(|e| DirectoryError::Io(e.error))?;
    Ok(())
}

/// User directory persisted as a single JSON file
#[derive(Debug)]
pub struct FileUserDirectory {
    path: PathBuf,
    store: RwLock<UserStore>,
}

impl FileUserDirectory {
    /// Open the directory stored at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        let path = path.into();
        let store = load_user_store(&path)?;
        Ok(Self {
            path,
            store: RwLock::new(store),
        })
    }

    /// Wrap an existing store; nothing is written until the first save
    pub fn from_store(path: impl Into<PathBuf>, store: UserStore) -> Self {
        Self {
            path: path.into(),
            store: RwLock::new(store),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a user and save the directory
    pub fn add_user(
        &self,
        username: &str,
        email: Option<String>,
        password: &str,
    ) -> Result<User, DirectoryError> {
        let mut store = self.write_store();
        let user = store.add_user(username, email, password)?.clone();
        save_user_store(&store, &self.path)?;
        info!("Added user {}", crate::utils::format_sensitive(&user.username));
        Ok(user)
    }

    pub fn verify_password(&self, username: &str, password: &str) -> bool {
        self.read_store().verify_password(username, password)
    }

    pub fn verify_transient_credential(&self, username: &str, value: &str) -> bool {
        self.read_store().verify_transient_credential(username, value)
    }

    fn read_store(&self) -> RwLockReadGuard<'_, UserStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, UserStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl UserDirectory for FileUserDirectory {
    fn lookup_by_name(&self, name: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self.read_store().get(name).cloned())
    }

    fn change_password(&self, user: &mut User, new_password: &str) -> Result<(), DirectoryError> {
        user.password_hash = self.read_store().hash(new_password);
        user.password_changed_at = Some(Utc::now());
        user.changes.password = true;
        Ok(())
    }

    fn set_transient_credential(&self, user: &mut User, value: Option<&str>) {
        user.transient_credential_hash = value.map(|v| self.read_store().hash(v));
        user.changes.transient_credential = true;
    }

    fn persist_user_update(&self, user: &User) -> Result<(), DirectoryError> {
        let mut store = self.write_store();
        let existing = store
            .users
            .get_mut(&user.username_normalized)
            .ok_or_else(|| DirectoryError::UnknownUser(user.username.clone()))?;

        // Only fields changed on this copy are written, so a stale copy
        // cannot roll back another caller's update
        if user.changes.password {
            existing.password_hash = user.password_hash.clone();
            existing.password_changed_at = user.password_changed_at;
        }
        if user.changes.transient_credential {
            existing.transient_credential_hash = user.transient_credential_hash.clone();
        }

        save_user_store(&store, &self.path)?;
        debug!("Persisted user update to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_ITERATIONS: u32 = 1_000;

    fn setup_directory() -> (FileUserDirectory, TempDir) {
        let dir = TempDir::new().unwrap();
        let directory = FileUserDirectory::from_store(
            dir.path().join("users.json"),
            UserStore::with_iterations(TEST_ITERATIONS),
        );
        (directory, dir)
    }

    #[test]
    fn test_user_creation() {
        let mut store = UserStore::with_iterations(TEST_ITERATIONS);
        let user = store
            .add_user("TestUser", Some("test@example.com".to_string()), "Password123!")
            .unwrap()
            .clone();

        assert_eq!(user.username, "TestUser");
        assert_eq!(user.username_normalized, "testuser");
        assert_eq!(user.id.len(), 16);
        assert!(user.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.verify_password("testuser", "Password123!"));
        assert!(!store.verify_password("testuser", "Password124!"));

        assert!(matches!(
            store.add_user("TESTUSER", None, "Password123!"),
            Err(DirectoryError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_directory_persists_updates() {
        let (directory, _dir) = setup_directory();
        directory.add_user("alice", None, "Password123!").unwrap();

        let mut alice = directory.lookup_by_name("Alice").unwrap().unwrap();
        directory.change_password(&mut alice, "AB-12-CD-34").unwrap();
        directory.set_transient_credential(&mut alice, Some("AB-12-CD-34"));

        // Nothing is visible before the update is persisted
        assert!(directory.verify_password("alice", "Password123!"));

        directory.persist_user_update(&alice).unwrap();
        assert!(directory.verify_password("alice", "AB-12-CD-34"));
        assert!(directory.verify_transient_credential("alice", "AB-12-CD-34"));

        let reopened = FileUserDirectory::open(directory.path()).unwrap();
        assert!(reopened.verify_password("alice", "AB-12-CD-34"));
        assert!(reopened
            .lookup_by_name("alice")
            .unwrap()
            .unwrap()
            .password_changed_at
            .is_some());
    }

    #[test]
    fn test_clear_transient_credential() {
        let (directory, _dir) = setup_directory();
        directory.add_user("bob", None, "Password123!").unwrap();

        let mut bob = directory.lookup_by_name("bob").unwrap().unwrap();
        directory.set_transient_credential(&mut bob, Some("01-02-03-04"));
        directory.set_transient_credential(&mut bob, None);
        directory.persist_user_update(&bob).unwrap();

        assert!(!directory.verify_transient_credential("bob", "01-02-03-04"));
    }

    #[test]
    fn test_stale_copy_keeps_newer_password() {
        let (directory, _dir) = setup_directory();
        directory.add_user("alice", None, "Password123!").unwrap();

        // Two callers fetch alice before either writes
        let mut stale = directory.lookup_by_name("alice").unwrap().unwrap();
        let mut redeeming = directory.lookup_by_name("alice").unwrap().unwrap();

        directory.change_password(&mut redeeming, "AB-12-CD-34").unwrap();
        directory.set_transient_credential(&mut redeeming, None);
        directory.persist_user_update(&redeeming).unwrap();

        directory.set_transient_credential(&mut stale, Some("01-02-03-04"));
        directory.persist_user_update(&stale).unwrap();

        assert!(directory.verify_password("alice", "AB-12-CD-34"));
        assert!(!directory.verify_password("alice", "Password123!"));
        assert!(directory.verify_transient_credential("alice", "01-02-03-04"));

        let stored = directory.lookup_by_name("alice").unwrap().unwrap();
        assert!(stored.password_changed_at.is_some());
        assert_eq!(stored.changes, UserChanges::default());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let mut store = UserStore::with_iterations(TEST_ITERATIONS);
        for address in ["user example.com", "user", "", "user@@example.com"] {
            assert!(matches!(
                store.add_user("carol", Some(address.to_string()), "Password123!"),
                Err(DirectoryError::InvalidEmail(_))
            ));
        }
        assert!(store.get("carol").is_none());

        store
            .add_user("carol", Some("carol+reset@example.co.uk".to_string()), "Password123!")
            .unwrap();
    }

    #[test]
    fn test_persist_unknown_user() {
        let (directory, _dir) = setup_directory();
        let mut other = UserStore::with_iterations(TEST_ITERATIONS);
        let ghost = other.add_user("ghost", None, "Password123!").unwrap().clone();

        assert!(matches!(
            directory.persist_user_update(&ghost),
            Err(DirectoryError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_missing_store_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let directory = FileUserDirectory::open(dir.path().join("absent.json")).unwrap();
        assert!(directory.lookup_by_name("anyone").unwrap().is_none());
    }
}
