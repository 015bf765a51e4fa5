use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DeliveryError, PinDelivery};
use crate::modules::auth::User;
use crate::modules::utils::format_sensitive;
use crate::modules::utils::time::format_timestamp;

/// SMTP relay used to mail reset PINs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Password Reset".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Mails the PIN to the address on the user's record
pub struct EmailDelivery {
    settings: SmtpSettings,
    mailer: SmtpTransport,
}

impl EmailDelivery {
    pub fn new(settings: SmtpSettings) -> Result<Self, DeliveryError> {
        let tls_parameters = TlsParameters::builder(settings.host.clone())
            .build()
            .map_err(|e| DeliveryError::Transport(format!("TLS parameters: {}", e)))?;

        let mailer = SmtpTransport::relay(&settings.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .port(settings.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(settings.timeout_secs)))
            .build();

        Ok(Self { settings, mailer })
    }

    fn build_message(
        &self,
        to: &str,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<Message, DeliveryError> {
        let from = format!("{} <{}>", self.settings.from_name, self.settings.username);
        Message::builder()
            .from(
                from.parse()
                    .map_err(|_| DeliveryError::InvalidAddress(from.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| DeliveryError::InvalidAddress(to.to_string()))?)
            .subject("Your password reset PIN")
            .header(ContentType::TEXT_PLAIN)
            .body(reset_email_body(pin, expires_at))
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

impl PinDelivery for EmailDelivery {
    fn deliver(
        &self,
        user: &User,
        pin: &str,
        expires_at: &DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let to = user
            .email
            .as_deref()
            .ok_or_else(|| DeliveryError::MissingAddress(user.username.clone()))?;

        let message = self.build_message(to, pin, expires_at)?;
        self.mailer
            .send(&message)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        info!("Reset PIN mailed to {}", format_sensitive(to));
        Ok(())
    }
}

/// Plain-text body of the reset email
pub fn reset_email_body(pin: &str, expires_at: &DateTime<Utc>) -> String {
    format!(
        "Hello,\n\n\
        A password reset was requested for your account.\n\n\
        Use the following PIN to complete the reset:\n\n\
        {}\n\n\
        The PIN expires at {}. Once redeemed, it also becomes your new \
        password, so change it after signing in.\n\n\
        If you did not request this reset, you can ignore this email.",
        pin,
        format_timestamp(expires_at)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> SmtpSettings {
        serde_json::from_str(
            r#"{"host":"smtp.example.com","username":"reset@example.com","password":"secret"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = test_settings();
        assert_eq!(settings.port, 587);
        assert_eq!(settings.from_name, "Password Reset");
        assert_eq!(settings.timeout_secs, 10);
    }

    #[test]
    fn test_email_body_contains_pin_and_expiry() {
        let expires_at = Utc::now();
        let body = reset_email_body("AB-12-CD-34", &expires_at);
        assert!(body.contains("AB-12-CD-34"));
        assert!(body.contains(&format_timestamp(&expires_at)));
    }

    #[test]
    fn test_missing_address_is_rejected() {
        let delivery = EmailDelivery::new(test_settings()).unwrap();
        let mut store = crate::modules::auth::UserStore::with_iterations(1_000);
        let user = store.add_user("carol", None, "Password123!").unwrap().clone();

        assert!(matches!(
            delivery.deliver(&user, "AB-12-CD-34", &Utc::now()),
            Err(DeliveryError::MissingAddress(_))
        ));
    }

    #[test]
    fn test_message_rejects_bad_recipient() {
        let delivery = EmailDelivery::new(test_settings()).unwrap();
        assert!(matches!(
            delivery.build_message("not an address", "AB-12-CD-34", &Utc::now()),
            Err(DeliveryError::InvalidAddress(_))
        ));
        assert!(delivery
            .build_message("dave@example.com", "AB-12-CD-34", &Utc::now())
            .is_ok());
    }
}
