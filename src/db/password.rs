//! Salted PBKDF2-HMAC-SHA256 password hashing.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const DEFAULT_ITERATIONS: u32 = 200_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Stored form of a password: hex digest, hex salt and the iteration count used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> HashedPassword {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        HashedPassword {
            hash: hex::encode(derive(password, &salt, self.iterations)),
            salt: hex::encode(salt),
            iterations: self.iterations,
        }
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Check `password` against a stored hash in constant time.
///
/// Malformed stored values never match.
pub fn verify_password(password: &str, stored: &HashedPassword) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&stored.salt), hex::decode(&stored.hash)) else {
        return false;
    };
    if expected.len() != HASH_LEN || stored.iterations == 0 {
        return false;
    }
    let actual = derive(password, &salt, stored.iterations);
    actual[..].ct_eq(&expected[..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let hasher = PasswordHasher::new(1_000);
        let stored = hasher.hash("s3cret!");
        assert_eq!(stored.salt.len(), SALT_LEN * 2);
        assert_eq!(stored.hash.len(), HASH_LEN * 2);
        assert!(verify_password("s3cret!", &stored));
        assert!(!verify_password("s3cret", &stored));
    }

    #[test]
    fn test_salt_is_unique() {
        let hasher = PasswordHasher::new(1_000);
        let a = hasher.hash("same");
        let b = hasher.hash("same");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_default_iterations() {
        let stored = PasswordHasher::default().hash("x");
        assert_eq!(stored.iterations, DEFAULT_ITERATIONS);
    }

    #[test]
    fn test_malformed_never_matches() {
        let bad = HashedPassword {
            hash: "zz".to_string(),
            salt: "00".to_string(),
            iterations: 1_000,
        };
        assert!(!verify_password("x", &bad));
    }
}
