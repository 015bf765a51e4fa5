use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pin::{generate_pin, pins_match};
use super::record::ResetRecord;
use crate::modules::auth::{DirectoryError, User, UserDirectory};
use crate::modules::delivery::{DeliveryError, PinDelivery};
use crate::modules::storage::{RecordStorage, StorageError};
use crate::modules::utils::logging::{format_sensitive, log_data_operation, log_reset_event};
use crate::modules::utils::time::{Clock, SystemClock};
use crate::{PIN_TTL_MINUTES, RECORD_BASE_NAME};

/// Errors surfaced by the reset token store
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("reset record storage failed: {0}")]
    IoFailure(#[from] StorageError),

    #[error("reset request references unknown user {0}")]
    UserNotFound(String),

    #[error("failed to update user {user}: {source}")]
    UserUpdateFailure {
        user: String,
        #[source]
        source: DirectoryError,
    },

    #[error("no matching password reset request")]
    NoMatchingRequest,

    #[error("failed to deliver reset PIN: {0}")]
    DeliveryFailure(#[from] DeliveryError),

    #[error("PIN lifetime {0} is out of range")]
    InvalidLifetime(Duration),
}

/// What the user has to do next to finish a reset
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgotPasswordAction {
    PinCode,
}

/// Returned by `start_reset`. Deliberately carries no PIN.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResult {
    pub action: ForgotPasswordAction,
    pub pin_expiration_date: DateTime<Utc>,
}

/// Returned by a successful `redeem_pin`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinRedeemResult {
    pub success: bool,
    pub users_reset: Vec<String>,
}

/// Outstanding request as shown to an operator; never includes the PIN
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub user_name: String,
    pub expires_at: DateTime<Utc>,
    pub storage_key: String,
}

/// Issues and redeems password reset PINs.
///
/// Every request is stored as its own record under `<base name><user id>`,
/// so a user has at most one outstanding PIN. Expired records are removed
/// lazily whenever a redemption scans the record set.
pub struct ResetTokenStore<S, D, P, C = SystemClock> {
    storage: S,
    users: D,
    delivery: P,
    clock: C,
    base_name: String,
    ttl: Duration,
}

impl<S, D, P> ResetTokenStore<S, D, P, SystemClock>
where
    S: RecordStorage,
    D: UserDirectory,
    P: PinDelivery,
{
    pub fn new(storage: S, users: D, delivery: P) -> Self {
        Self {
            storage,
            users,
            delivery,
            clock: SystemClock,
            base_name: RECORD_BASE_NAME.to_string(),
            ttl: Duration::minutes(PIN_TTL_MINUTES),
        }
    }
}

impl<S, D, P, C> ResetTokenStore<S, D, P, C>
where
    S: RecordStorage,
    D: UserDirectory,
    P: PinDelivery,
    C: Clock,
{
    /// Replace the time source
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ResetTokenStore<S, D, P, C2> {
        ResetTokenStore {
            storage: self.storage,
            users: self.users,
            delivery: self.delivery,
            clock,
            base_name: self.base_name,
            ttl: self.ttl,
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = base_name.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn users(&self) -> &D {
        &self.users
    }

    /// Issue a new PIN for `user`, replacing any request it already has.
    ///
    /// The PIN is persisted with the request, set as the user's transient
    /// credential and handed to the delivery channel. It is not returned.
    pub fn start_reset(
        &self,
        user: &mut User,
        is_trusted: bool,
    ) -> Result<ForgotPasswordResult, ResetError> {
        // Trusted and remote requests both get a PIN challenge for now
        debug!(
            "Starting reset for {} (trusted network: {})",
            format_sensitive(&user.username),
            is_trusted
        );

        let pin = generate_pin();
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .ok_or(ResetError::InvalidLifetime(self.ttl))?;
        let storage_key = ResetRecord::storage_key_for(&self.base_name, &user.id);

        let record = ResetRecord {
            expires_at,
            pin,
            storage_key,
            user_name: user.username.clone(),
        };
        let bytes = record.encode().map_err(StorageError::from)?;
        self.storage.write(&record.storage_key, &bytes)?;

        self.users
            .set_transient_credential(user, Some(record.pin.as_str()));
        if let Err(source) = self.users.persist_user_update(user) {
            // The written record is left to expire
            log_data_operation(
                "start_reset",
                &user.username,
                "user_directory",
                false,
                Some(&source.to_string()),
            );
            return Err(ResetError::UserUpdateFailure {
                user: user.username.clone(),
                source,
            });
        }

        self.delivery.deliver(user, &record.pin, &expires_at)?;

        log_reset_event(
            "start_reset",
            &user.username,
            true,
            Some(if is_trusted { "trusted network" } else { "remote network" }),
        );

        Ok(ForgotPasswordResult {
            action: ForgotPasswordAction::PinCode,
            pin_expiration_date: expires_at,
        })
    }

    /// Redeem `pin` against every live request.
    ///
    /// Expired records met during the scan are deleted. Every live record
    /// whose PIN matches has its user's password set to that PIN and is
    /// consumed. Unreadable records are skipped and left in place.
    pub fn redeem_pin(&self, pin: &str) -> Result<PinRedeemResult, ResetError> {
        let now = self.clock.now();
        let mut users_reset = Vec::new();

        for key in self.storage.enumerate(&self.base_name)? {
            let (record, bytes) = match self.load_record(&key) {
                Some(loaded) => loaded,
                None => continue,
            };

            if record.is_expired(&now) {
                if self.storage.delete(&key)? {
                    info!("Purged expired reset request {}", key);
                }
                continue;
            }

            if !pins_match(&record.pin, pin) {
                continue;
            }

            let mut user = self
                .users
                .lookup_by_name(&record.user_name)
                .map_err(|source| ResetError::UserUpdateFailure {
                    user: record.user_name.clone(),
                    source,
                })?
                .ok_or_else(|| {
                    error!(
                        "Reset request {} references missing user {}",
                        key,
                        format_sensitive(&record.user_name)
                    );
                    ResetError::UserNotFound(record.user_name.clone())
                })?;

            // Deleting is the claim: only the caller that removes the record may act on it
            if !self.storage.delete(&key)? {
                debug!("Reset request {} was claimed concurrently", key);
                continue;
            }

            if let Err(source) = self.apply_reset(&mut user, &record.pin) {
                self.restore_record(&key, &bytes);
                log_reset_event(
                    "redeem_pin",
                    &record.user_name,
                    false,
                    Some(&source.to_string()),
                );
                return Err(ResetError::UserUpdateFailure {
                    user: record.user_name,
                    source,
                });
            }

            log_reset_event("redeem_pin", &record.user_name, true, None);
            users_reset.push(record.user_name);
        }

        if users_reset.is_empty() {
            return Err(ResetError::NoMatchingRequest);
        }

        Ok(PinRedeemResult {
            success: true,
            users_reset,
        })
    }

    /// Live requests sorted by storage key, without purging anything
    pub fn pending_requests(&self) -> Result<Vec<PendingRequest>, ResetError> {
        let now = self.clock.now();
        let mut pending = Vec::new();

        for key in self.storage.enumerate(&self.base_name)? {
            if let Some((record, _)) = self.load_record(&key) {
                if !record.is_expired(&now) {
                    pending.push(PendingRequest {
                        user_name: record.user_name,
                        expires_at: record.expires_at,
                        storage_key: key,
                    });
                }
            }
        }

        Ok(pending)
    }

    /// Delete every expired request and return how many were removed
    pub fn purge_expired(&self) -> Result<usize, ResetError> {
        let now = self.clock.now();
        let mut purged = 0;

        for key in self.storage.enumerate(&self.base_name)? {
            if let Some((record, _)) = self.load_record(&key) {
                if record.is_expired(&now) && self.storage.delete(&key)? {
                    purged += 1;
                }
            }
        }

        if purged > 0 {
            info!("Purged {} expired reset request(s)", purged);
        }
        Ok(purged)
    }

    fn apply_reset(&self, user: &mut User, pin: &str) -> Result<(), DirectoryError> {
        self.users.change_password(user, pin)?;
        self.users.set_transient_credential(user, None);
        self.users.persist_user_update(user)
    }

    /// Read and decode one record. Unreadable or malformed records are skipped.
    fn load_record(&self, key: &str) -> Option<(ResetRecord, Vec<u8>)> {
        let bytes = match self.storage.read(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("Reset request {} disappeared during scan", key);
                return None;
            }
            Err(e) => {
                warn!("Skipping unreadable reset request {}: {}", key, e);
                return None;
            }
        };

        match ResetRecord::decode(&bytes) {
            Ok(record) => Some((record, bytes)),
            Err(e) => {
                warn!("Skipping malformed reset request {}: {}", key, e);
                None
            }
        }
    }

    /// Put a claimed record back after its reset could not be committed
    fn restore_record(&self, key: &str, bytes: &[u8]) {
        // A newer request for the same user wins over the restored one
        match self.storage.write_if_absent(key, bytes) {
            Ok(true) => info!("Restored reset request {} after failed update", key),
            Ok(false) => debug!("Reset request {} was replaced before it could be restored", key),
            Err(e) => error!("Failed to restore reset request {}: {}", key, e),
        }
    }
}
