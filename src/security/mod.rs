//! Credential handling: password hashing, certificate fingerprints and
//! release-challenge codes.

mod password;

pub use password::{
    dummy_verify, fingerprints_match, hash_password, normalize_fingerprint, secret_code,
    secrets_match, verify_password,
};
