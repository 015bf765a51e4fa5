use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outstanding password reset request as it is persisted
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResetRecord {
    #[serde(rename = "expirationDate")]
    pub expires_at: DateTime<Utc>,
    pub pin: String,
    #[serde(rename = "pinFile")]
    pub storage_key: String,
    #[serde(rename = "userName")]
    pub user_name: String,
}

impl ResetRecord {
    /// Storage key for a user's request: `base_name` followed by the user id
    pub fn storage_key_for(base_name: &str, user_id: &str) -> String {
        format!("{}{}", base_name, user_id)
    }

    pub fn is_expired(&self, now: &DateTime<Utc>) -> bool {
        self.expires_at < *now
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_record() -> ResetRecord {
        ResetRecord {
            expires_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            pin: "AB-12-CD-34".to_string(),
            storage_key: "passwordreset0011223344556677".to_string(),
            user_name: "alice".to_string(),
        }
    }

    #[test]
    fn test_persisted_field_names() {
        let encoded = sample_record().encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value["expirationDate"], "2024-05-01T12:30:00Z");
        assert_eq!(value["pin"], "AB-12-CD-34");
        assert_eq!(value["pinFile"], "passwordreset0011223344556677");
        assert_eq!(value["userName"], "alice");
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_decode_accepts_offset_timestamps() {
        let record = ResetRecord::decode(
            br#"{"expirationDate":"2024-05-01T14:30:00+02:00","pin":"AB-12-CD-34","pinFile":"k","userName":"alice"}"#,
        )
        .unwrap();
        assert_eq!(record.expires_at, sample_record().expires_at);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(ResetRecord::decode(b"not json").is_err());
        assert!(ResetRecord::decode(br#"{"pin":"AB-12-CD-34"}"#).is_err());
    }

    #[test]
    fn test_expiry_is_strict() {
        let record = sample_record();
        assert!(!record.is_expired(&record.expires_at));
        assert!(!record.is_expired(&(record.expires_at - Duration::seconds(1))));
        assert!(record.is_expired(&(record.expires_at + Duration::milliseconds(1))));
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(
            ResetRecord::storage_key_for("passwordreset", "0011223344556677"),
            "passwordreset0011223344556677"
        );
    }
}
