use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::Rng;

/// One-time passcodes are always six digits.
pub const OTP_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

/// Bytes of entropy in a password-reset token (256 bits).
pub const RESET_TOKEN_BYTES: usize = 32;

/// Generate a uniformly random six-digit passcode.
pub fn generate_otp_code() -> u32 {
    rand::rng().random_range(OTP_RANGE)
}

/// Generate an unguessable, URL-safe password-reset token.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random passphrase suitable for the message cipher.
pub fn generate_passphrase() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_otp_code();
            assert!(OTP_RANGE.contains(&code));
            assert_eq!(code.to_string().len(), 6);
        }
    }

    #[test]
    fn reset_tokens_are_unique_hex() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
