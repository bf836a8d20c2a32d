use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Entropy of the raw reset secret.
pub const RESET_SECRET_BYTES: usize = 20;

/// Validity window for a pending reset.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(15);

/// Generate a fresh reset secret. The hex-encoded secret goes to the user
/// (inside the reset link) exactly once; only the digest is persisted.
pub fn generate_reset_secret() -> (String, String) {
    let mut bytes = [0u8; RESET_SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);
    let digest = digest_secret(&secret);
    (secret, digest)
}

/// SHA-256 hex digest of a presented secret, for store lookup.
pub fn digest_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub fn reset_expiry(now: OffsetDateTime) -> OffsetDateTime {
    now + RESET_TOKEN_TTL
}
