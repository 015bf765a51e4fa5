pub mod directory;
pub mod password;
pub mod store;

// Re-export the main types and functions
pub use directory::{DirectoryError, UserDirectory};
pub use password::{validate_password, PasswordError};
pub use store::{load_user_store, save_user_store, FileUserDirectory, User, UserChanges, UserStore};
