pub mod manager;
pub mod pin;
pub mod record;

pub use manager::{
    ForgotPasswordAction, ForgotPasswordResult, PendingRequest, PinRedeemResult, ResetError,
    ResetTokenStore,
};
pub use pin::{generate_pin, normalize_pin, pins_match};
pub use record::ResetRecord;
