use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::HmacSha256;

/// Password strength violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least 8 characters long")]
    TooShort,
    #[error("password must contain an uppercase letter")]
    NoUppercase,
    #[error("password must contain a lowercase letter")]
    NoLowercase,
    #[error("password must contain a number")]
    NoNumber,
    #[error("password must contain a special character")]
    NoSpecialChar,
}

/// Function to validate password strength
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < 8 {
        return Err(PasswordError::TooShort);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::NoUppercase);
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::NoLowercase);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err(PasswordError::NoNumber);
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c))
    {
        return Err(PasswordError::NoSpecialChar);
    }
    Ok(())
}

/// Function to generate a random salt for PBKDF2
pub fn generate_random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a hex-encoded PBKDF2-HMAC-SHA256 hash of `secret`
pub fn hash_secret(secret: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = vec![0u8; 32];
    pbkdf2::<HmacSha256>(secret.as_bytes(), salt, iterations, &mut key);
    hex::encode(key)
}

/// Helper function to read a password without echoing it
pub fn read_password(prompt: &str) -> std::io::Result<String> {
    rpassword::prompt_password(prompt)
}
