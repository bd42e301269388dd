use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version, ARGON2ID_IDENT,
};
use rand::rngs::OsRng;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password mismatch")]
    Mismatch,
    #[error("password hashing failed: {0}")]
    HashingFailed(String),
}

/// Argon2id hasher producing PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
#[derive(Clone)]
pub struct PasswordHasher {
    argon: Argon2<'static>,
    dummy: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy: Arc::new(OnceLock::new()),
        }
    }

    /// # Errors
    /// Returns `HashingFailed` if the primitive rejects the input or parameters.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Verify `plaintext` against a stored PHC string.
    ///
    /// Empty, malformed and non-Argon2id hashes are all reported as `Mismatch`.
    ///
    /// # Errors
    /// Returns `Mismatch` whenever the password is not accepted.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<(), PasswordError> {
        if hash.is_empty() {
            return Err(PasswordError::Mismatch);
        }
        let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::Mismatch)?;
        if parsed.algorithm != ARGON2ID_IDENT {
            return Err(PasswordError::Mismatch);
        }
        self.argon
            .verify_password(plaintext.as_bytes(), &parsed)
            .map_err(|_| PasswordError::Mismatch)
    }

    /// Spend one verification worth of work without a real hash, so unknown
    /// accounts cost the same as wrong passwords.
    pub fn verify_dummy(&self, plaintext: &str) {
        let dummy = self.dummy.get_or_init(|| {
            self.hash("techfeed-dummy-password").unwrap_or_default()
        });
        let _ = self.verify(plaintext, dummy);
    }

    #[cfg(test)]
    pub(crate) fn dummy_initialized(&self) -> bool {
        self.dummy.get().is_some()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", self.argon.params())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        // Minimal work factor keeps the suite fast.
        PasswordHasher::new(Params::new(8, 1, 1, None).expect("params"))
    }

    #[test]
    fn hash_then_verify() {
        let hasher = hasher();
        let hash = hasher.hash("hunter2").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter2"));
        assert!(hasher.verify("hunter2", &hash).is_ok());
        assert!(matches!(
            hasher.verify("wrong", &hash),
            Err(PasswordError::Mismatch)
        ));
    }

    #[test]
    fn salts_differ() {
        let hasher = hasher();
        let a = hasher.hash("hunter2").expect("hash");
        let b = hasher.hash("hunter2").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty_and_malformed_hashes() {
        let hasher = hasher();
        assert!(matches!(
            hasher.verify("", ""),
            Err(PasswordError::Mismatch)
        ));
        assert!(matches!(
            hasher.verify("hunter2", "not-a-phc-string"),
            Err(PasswordError::Mismatch)
        ));
    }

    #[test]
    fn rejects_algorithm_downgrade() {
        let hasher = hasher();
        let argon2i = Argon2::new(
            Algorithm::Argon2i,
            Version::V0x13,
            Params::new(8, 1, 1, None).expect("params"),
        );
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2i
            .hash_password(b"hunter2", &salt)
            .expect("hash")
            .to_string();
        assert!(hash.starts_with("$argon2i$"));
        assert!(matches!(
            hasher.verify("hunter2", &hash),
            Err(PasswordError::Mismatch)
        ));
    }

    #[test]
    fn verify_dummy_never_panics() {
        let hasher = hasher();
        hasher.verify_dummy("whatever");
        hasher.verify_dummy("");
    }
}
