//! PII-safe log redaction, grounded on the teacher's `crypto::redact_for_log`.

use sha2::{Digest, Sha256};

/// Hashes a value (chat id, email, phone) down to a short stable token
/// suitable for correlating log lines without printing the raw PII.
pub fn redact(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    format!("h:{}", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_to_fixed_length() {
        let r = redact("111222333");
        assert_eq!(r.len(), 18); // "h:" + 16 hex chars
    }

    #[test]
    fn is_stable() {
        assert_eq!(redact("abc"), redact("abc"));
        assert_ne!(redact("abc"), redact("abd"));
    }
}
