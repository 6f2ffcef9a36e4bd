use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hex-encoded SHA-256 digest of `payload`.
pub fn sha256_hex(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Compare two signature strings without leaking the mismatch position.
pub fn constant_time_eq(expected: &str, received: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let received_bytes = received.as_bytes();

    if expected_bytes.len() != received_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(received_bytes).into()
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison.
pub fn verify_hmac_sha256(
    secret: &str,
    payload: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(constant_time_eq(&expected, signature.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = "my_secret_key";
        let payload = "order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_hmac_sha256(secret, payload, &signature).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "my_secret_key";
        let payload = "order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        let first = if signature.starts_with('a') { "b" } else { "a" };
        let invalid_signature = format!("{}{}", first, &signature[1..]);

        assert!(!verify_hmac_sha256(secret, payload, &invalid_signature).unwrap());
    }

    #[test]
    fn test_tampered_payload() {
        let secret = "my_secret_key";
        let signature = hmac_sha256_hex(secret, r#"{"foo":"bar"}"#).unwrap();

        assert!(!verify_hmac_sha256(secret, r#"{"foo":"baz"}"#, &signature).unwrap());
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_length_mismatch_is_not_equal() {
        assert!(!constant_time_eq("abcd", "abc"));
        assert!(constant_time_eq("abcd", "abcd"));
    }
}
