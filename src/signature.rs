use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of the exact raw request bytes, lowercase hex. The raw body is
/// signed, not a re-serialized form: re-serialization is not byte-stable.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a provided hex signature against the computed one. Fails closed
/// on any mismatch, including length mismatch.
pub fn verify(secret: &str, raw_body: &[u8], provided_hex: &str) -> bool {
    let expected = sign(secret, raw_body);
    constant_time_eq(expected.as_bytes(), provided_hex.as_bytes())
}

/// Length check first, then every byte regardless of earlier mismatches, so
/// the comparison time does not leak how much of the signature matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_lowercase_hex() {
        let sig = sign("secret", b"payload");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = sign("secret", b"{\"event\":\"purchase.confirmed\"}");
        assert!(verify("secret", b"{\"event\":\"purchase.confirmed\"}", &sig));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let sig = sign("other", b"payload");
        assert!(!verify("secret", b"payload", &sig));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let sig = sign("secret", b"payload");
        assert!(!verify("secret", b"payload2", &sig));
    }

    #[test]
    fn verify_rejects_length_mismatch_and_empty() {
        let sig = sign("secret", b"payload");
        assert!(!verify("secret", b"payload", &sig[..10]));
        assert!(!verify("secret", b"payload", ""));
    }
}
