// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, delivery, reset, storage, utils};

// Re-export commonly used types
pub use modules::auth::directory::UserDirectory;
pub use modules::auth::store::{FileUserDirectory, User, UserStore};
pub use modules::config::Settings;
pub use modules::delivery::PinDelivery;
pub use modules::reset::{
    ForgotPasswordAction, ForgotPasswordResult, PinRedeemResult, ResetError, ResetRecord,
    ResetTokenStore,
};
pub use modules::storage::{DirectoryStorage, MemoryStorage, RecordStorage, StorageError};

// Constants
pub const CONFIG_FILE: &str = "pin-reset.json";
pub const USERS_FILE: &str = "users.json";
pub const RECORDS_DIR: &str = "reset-requests";
pub const RECORD_BASE_NAME: &str = "passwordreset";
pub const PIN_TTL_MINUTES: i64 = 30;
pub const MAX_PIN_TTL_MINUTES: i64 = 7 * 24 * 60;
pub const PIN_BYTES: usize = 4;
pub const PIN_SEPARATOR: char = '-';
pub const PBKDF2_ITERATIONS: u32 = 100_000;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
