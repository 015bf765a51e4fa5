//! Side channels that hand a freshly issued PIN to the person resetting.
//!
//! The PIN never travels back in a reset result, so every store is built
//! with exactly one `PinDelivery`.

mod console;
mod email;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::modules::auth::User;

pub use console::ConsoleDelivery;
pub use email::{reset_email_body, EmailDelivery, SmtpSettings};

/// Errors raised while delivering a PIN
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("user {0} has no email address on file")]
    MissingAddress(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel over which an issued PIN reaches the user
pub trait PinDelivery: Send + Sync {
    fn deliver(
        &self,
        user: &User,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<(), DeliveryError>;
}

impl<T: PinDelivery + ?Sized> PinDelivery for std::sync::Arc<T> {
    fn deliver(
        &self,
        user: &User,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        (**self).deliver(user, pin, expires_at)
    }
}

impl<T: PinDelivery + ?Sized> PinDelivery for Box<T> {
    fn deliver(
        &self,
        user: &User,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        (**self).deliver(user, pin, expires_at)
    }
}
