//! Confirmation signature verification.
//!
//! The gateway signs client-side checkout confirmations with
//! `HMAC-SHA256(secret, "<order_id>|<payment_id>")`, hex-encoded. A claim is
//! only trusted after this check passes; the comparison is constant time so
//! the verifier leaks nothing about the expected value.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a client-submitted payment confirmation signature.
///
/// Returns `false` for any mismatch or malformed input. Never panics and
/// never surfaces the secret in an error path.
pub fn verify_claim_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}

/// Constant-time byte comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let sig = sign("order_abc", "pay_123", "test_secret");
        assert!(verify_claim_signature(
            "order_abc",
            "pay_123",
            &sig,
            "test_secret"
        ));
    }

    #[test]
    fn any_single_character_mutation_fails() {
        let sig = sign("order_abc", "pay_123", "test_secret");
        for i in 0..sig.len() {
            let mut mutated: Vec<u8> = sig.bytes().collect();
            mutated[i] = if mutated[i] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(mutated).unwrap();
            if mutated == sig {
                continue;
            }
            assert!(
                !verify_claim_signature("order_abc", "pay_123", &mutated, "test_secret"),
                "mutation at index {} verified",
                i
            );
        }
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign("order_abc", "pay_123", "test_secret");
        assert!(!verify_claim_signature(
            "order_abc",
            "pay_123",
            &sig,
            "other_secret"
        ));
    }

    #[test]
    fn swapped_ids_fail() {
        let sig = sign("order_abc", "pay_123", "test_secret");
        assert!(!verify_claim_signature(
            "pay_123",
            "order_abc",
            &sig,
            "test_secret"
        ));
    }

    #[test]
    fn malformed_signature_fails_without_panicking() {
        assert!(!verify_claim_signature(
            "order_abc",
            "pay_123",
            "not even hex",
            "test_secret"
        ));
        assert!(!verify_claim_signature("order_abc", "pay_123", "", "test_secret"));
        assert!(!verify_claim_signature("", "", "", ""));
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        let sig = sign("order_abc", "pay_123", "test_secret");
        let padded = format!("{} \n", sig);
        assert!(verify_claim_signature(
            "order_abc",
            "pay_123",
            &padded,
            "test_secret"
        ));
    }

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }
}
