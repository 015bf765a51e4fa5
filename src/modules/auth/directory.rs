use std::io;
use thiserror::Error;

use super::store::User;

/// Errors raised by a user directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// The account directory a reset store acts upon
pub trait UserDirectory: Send + Sync {
    /// Resolve a user by name
    fn lookup_by_name(&self, name: &str) -> Result<Option<User>, DirectoryError>;

    /// Replace the user's password. Only the in-memory record changes until
    /// `persist_user_update` is called.
    fn change_password(&self, user: &mut User, new_password: &str) -> Result<(), DirectoryError>;

    /// Set or clear the one-time credential that lets a user log in with a PIN
    fn set_transient_credential(&self, user: &mut User, value: Option<&str>);

    /// Write the fields changed on `user` back to the directory, leaving
    /// everything else as currently stored
    fn persist_user_update(&self, user: &User) -> Result<(), DirectoryError>;
}

impl<T: UserDirectory + ?Sized> UserDirectory for std::sync::Arc<T> {
    fn lookup_by_name(&self, name: &str) -> Result<Option<User>, DirectoryError> {
        (**self).lookup_by_name(name)
    }

    fn change_password(&self, user: &mut User, new_password: &str) -> Result<(), DirectoryError> {
        (**self).change_password(user, new_password)
    }

    fn set_transient_credential(&self, user: &mut User, value: Option<&str>) {
        (**self).set_transient_credential(user, value)
    }

    fn persist_user_update(&self, user: &User) -> Result<(), DirectoryError> {
        (**self).persist_user_update(user)
    }
}
