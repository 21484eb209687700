//! Salted one-way password hashing with a tunable cost factor.
//!
//! Hashes are PBKDF2-HMAC-SHA256 in PHC string format
//! (`$pbkdf2-sha256$i=...$salt$digest`), so the salt and round count travel
//! inside the stored hash and the cost can be raised without migrating
//! existing rows. Verification is constant-time on the digest comparison.

use anyhow::Result;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::rngs::OsRng;

/// Digest length in bytes (SHA-256 output size).
const OUTPUT_LENGTH: usize = 32;

/// Password hashing and verification with a fixed round count.
pub struct PasswordVerifier {
    rounds: u32,
    /// Hash of a throwaway password, verified against when a login names an
    /// unknown user so both failure paths burn the same work.
    dummy_hash: String,
}

impl PasswordVerifier {
    /// Build a verifier with the given PBKDF2 round count (floored at 1).
    pub fn new(rounds: u32) -> Result<Self> {
        let mut verifier = Self {
            rounds: rounds.max(1),
            dummy_hash: String::new(),
        };
        verifier.dummy_hash = verifier.hash("timing-pad")?;
        Ok(verifier)
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_LENGTH,
        };
        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    /// Check a plaintext password against a stored PHC hash.
    /// Unparseable stored hashes verify as false rather than erroring.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
    }

    /// Burn the same work as a real verification without revealing whether
    /// any account matched.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

// ── Tests ───────────────────────────────────────────────────────────
