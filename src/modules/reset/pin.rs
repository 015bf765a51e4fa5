use rand::rngs::OsRng;
use rand::RngCore;

use crate::{PIN_BYTES, PIN_SEPARATOR};

/// Draw a new PIN from the operating system's CSPRNG.
///
/// The PIN is the uppercase hex rendering of `PIN_BYTES` random bytes with
/// each byte pair separated by `PIN_SEPARATOR`, e.g. `AB-12-CD-34`.
pub fn generate_pin() -> String {
    let mut bytes = [0u8; PIN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    render_pin(&bytes)
}

/// Render raw bytes in PIN form
pub fn render_pin(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(&PIN_SEPARATOR.to_string())
}

/// Remove every separator from a PIN
pub fn normalize_pin(pin: &str) -> String {
    pin.chars().filter(|&c| c != PIN_SEPARATOR).collect()
}

/// Compare two PINs ignoring separators and case.
///
/// Case folding is per-char simple uppercasing, independent of locale.
pub fn pins_match(stored: &str, supplied: &str) -> bool {
    let stored = normalize_pin(stored);
    let supplied = normalize_pin(supplied);
    stored
        .chars()
        .flat_map(char::to_uppercase)
        .eq(supplied.chars().flat_map(char::to_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_pin_format() {
        for _ in 0..64 {
            let pin = generate_pin();
            assert_eq!(pin.len(), PIN_BYTES * 3 - 1);

            let groups: Vec<&str> = pin.split(PIN_SEPARATOR).collect();
            assert_eq!(groups.len(), PIN_BYTES);
            for group in groups {
                assert_eq!(group.len(), 2);
                assert!(group
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
            }
        }
    }

    #[test]
    fn test_generated_pins_differ() {
        // 2^32 space; a repeat across a handful of draws means a broken source
        let pins: std::collections::HashSet<String> = (0..16).map(|_| generate_pin()).collect();
        assert!(pins.len() > 1);
    }

    #[test]
    fn test_render_pin() {
        assert_eq!(render_pin(&[0xAB, 0x12, 0xCD, 0x34]), "AB-12-CD-34");
        assert_eq!(render_pin(&[0x00, 0x0F]), "00-0F");
    }

    #[test]
    fn test_normalization_and_matching() {
        assert_eq!(normalize_pin("AB-12-CD-34"), "AB12CD34");
        assert!(pins_match("AB12CD34", "ab-12-cd-34"));
        assert!(pins_match("AB-12-CD-34", "ab12cd34"));
        assert!(pins_match("AB-12-CD-34", "-a-b-1-2-c-d-3-4-"));
        assert!(!pins_match("AB-12-CD-34", "AB-12-CD-35"));
        assert!(!pins_match("AB-12-CD-34", "AB 12 CD 34"));
        assert!(!pins_match("AB-12-CD-34", ""));
    }
}
