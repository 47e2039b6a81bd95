//! Six-digit one-time passcode generation (spec §3 I5).

use rand::Rng;

/// Generates a six-digit OTP string, zero-padded.
pub fn generate() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Extracts the first six-digit run from free text, as `/start` handling
/// does (original_source/pkg/awsapi/scenario.go: `CODE_REGEXP`).
pub fn extract(text: &str) -> Option<String> {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{6}").unwrap());
    CODE_RE.find(text).map(|m| m.as_str().to_string())
}

/// True when `text` is exactly a bare six-digit code.
pub fn is_bare_code(text: &str) -> bool {
    text.len() == 6 && text.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_six_digits() {
        for _ in 0..50 {
            let otp = generate();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn extracts_embedded_code() {
        assert_eq!(extract("/start 123456"), Some("123456".to_string()));
        assert_eq!(extract("/start"), None);
    }

    #[test]
    fn recognizes_bare_code() {
        assert!(is_bare_code("123456"));
        assert!(!is_bare_code("12345"));
        assert!(!is_bare_code("12345a"));
    }
}
