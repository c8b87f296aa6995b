//! Password hashing and verification utilities.
//!
//! Centralizes Argon2 password handling for administrators and registered
//! client accounts.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::OnceLock;
use subtle::ConstantTimeEq;

/// Hash a password using default Argon2 settings.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Verify a password against a stored PHC hash string.
///
/// An unparseable stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// Burn roughly the time of a real verification when the account is
/// unknown, so response timing does not reveal which names exist.
pub fn dummy_verify(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    if let Some(hash) = DUMMY.get_or_init(|| hash_password("slsvcd-dummy").ok()) {
        let _ = verify_password(password, hash);
    }
}

/// Canonical fingerprint form: lowercase hex, no separators.
pub fn normalize_fingerprint(fp: &str) -> String {
    fp.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Constant-time fingerprint comparison on normalized forms.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    let a = normalize_fingerprint(a);
    let b = normalize_fingerprint(b);
    !a.is_empty() && a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Constant-time comparison of two shared secrets (link passwords,
/// release codes).
pub fn secrets_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Random alphanumeric challenge code.
pub fn secret_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify_password("x", "not-a-phc-string"));
    }

    #[test]
    fn fingerprint_forms_compare_equal() {
        assert!(fingerprints_match("AB:CD:EF:01", "abcdef01"));
        assert!(!fingerprints_match("abcdef01", "abcdef02"));
        assert!(!fingerprints_match("", ""));
    }

    #[test]
    fn shared_secrets() {
        assert!(secrets_match("linkpass", "linkpass"));
        assert!(!secrets_match("linkpass", "linkpasS"));
        assert!(!secrets_match("short", "shorter"));
    }

    #[test]
    fn secret_codes_are_random_and_sized() {
        let a = secret_code(12);
        let b = secret_code(12);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
