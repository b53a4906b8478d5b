use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Salted one-way hash of a player secret.
///
/// One round of SHA-256 over a random 16-byte salt. This keeps plaintext out
/// of the store and stops precomputed-table lookups, but it is not a slow
/// hash: anyone holding a copy of the store can brute-force weak secrets
/// offline. Verification compares digests in constant time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHash {
    salt: String,
    digest: String,
}

impl CredentialHash {
    pub fn new(secret: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill(&mut salt);
        Self {
            digest: digest_hex(&salt, secret),
            salt: hex::encode(salt),
        }
    }

    pub fn verify(&self, secret: &str) -> bool {
        let Ok(salt) = hex::decode(&self.salt) else {
            return false;
        };
        constant_time_eq(
            digest_hex(&salt, secret).as_bytes(),
            self.digest.as_bytes(),
        )
    }
}

fn digest_hex(salt: &[u8], secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
