//! Time-sortable opaque identifiers (spec GLOSSARY: "ksuid").
//!
//! A ksuid is 20 raw bytes — a 4-byte big-endian seconds timestamp (relative
//! to a custom epoch so the field doesn't roll over for another century)
//! followed by 16 bytes of randomness — base62-encoded to a fixed 27
//! characters. Lexicographic order on the encoded string coincides with
//! creation-time order, which is what `msgfetchbydays` relies on (spec §4.H).

use rand::RngCore;

const EPOCH: u64 = 1_400_000_000; // 2014-05-13T16:53:20Z, same as the reference KSUID epoch.
const BASE62_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ENCODED_LEN: usize = 27;

/// Generates a fresh ksuid string from the current wall-clock time.
pub fn generate() -> String {
    generate_at(now_unix())
}

/// Generates a ksuid for a caller-supplied timestamp. Exposed so tests and
/// seed scripts can construct ksuids with known creation times (see S3 in
/// spec §8: messages at specific ages).
pub fn generate_at(unix_seconds: i64) -> String {
    let mut raw = [0u8; 20];
    let ts = (unix_seconds.max(0) as u64).saturating_sub(EPOCH) as u32;
    raw[0..4].copy_from_slice(&ts.to_be_bytes());
    rand::thread_rng().fill_bytes(&mut raw[4..20]);
    encode(&raw)
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Base62-encode 20 raw bytes into the fixed 27-character ksuid form.
/// 20 bytes is 160 bits; 62^27 comfortably exceeds 2^160, so the encoding
/// never overflows and is always padded to 27 characters.
fn encode(raw: &[u8; 20]) -> String {
    let mut digits = [0u8; ENCODED_LEN];
    // Treat `raw` as a big-endian 160-bit integer and repeatedly divide by 62.
    let mut num = raw.to_vec();
    for slot in digits.iter_mut().rev() {
        let mut remainder: u32 = 0;
        for byte in num.iter_mut() {
            let acc = (remainder << 8) | *byte as u32;
            *byte = (acc / 62) as u8;
            remainder = acc % 62;
        }
        *slot = BASE62_ALPHABET[remainder as usize];
    }
    String::from_utf8(digits.to_vec()).expect("base62 alphabet is ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fixed_length() {
        let id = generate();
        assert_eq!(id.len(), ENCODED_LEN);
    }

    #[test]
    fn sorts_lexicographically_with_time() {
        let earlier = generate_at(1_700_000_000);
        let later = generate_at(1_700_000_100);
        assert!(earlier < later, "{earlier} should sort before {later}");
    }

    #[test]
    fn same_second_ids_are_distinct() {
        let a = generate_at(1_700_000_000);
        let b = generate_at(1_700_000_000);
        assert_ne!(a, b);
        assert_eq!(a.len(), b.len());
    }
}
