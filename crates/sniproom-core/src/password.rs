//! One-way digest for optional room passwords.
//!
//! Rooms are short-lived and never stored at rest, so the password digest is
//! an integrity check against casual disclosure, not secure authentication:
//! it is an unsalted SHA-256 and offers no resistance to offline attack.
//! Comparison is plain string equality, not constant-time; acceptable for
//! this threat model and documented here in case that ever changes.

use sha2::{Digest, Sha256};

/// Hashes a plaintext room password to a lowercase hex SHA-256 digest.
///
/// Deterministic and unsalted so digests can be compared directly.
pub fn hash_password(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Verifies a supplied password against an optional stored digest.
///
/// - No stored digest: the room is unprotected, always true.
/// - Stored digest but no supplied password: false.
/// - Otherwise: digest equality.
pub fn verify_password(stored: Option<&str>, supplied: Option<&str>) -> bool {
    match stored {
        None => true,
        Some(hash) => match supplied {
            None => false,
            Some(plaintext) => hash_password(plaintext) == hash,
        },
    }
}
