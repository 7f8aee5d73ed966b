//! Stable seeds and identifiers derived from content hashes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Derive a 64-bit seed from ordered parts.
///
/// Parts are joined with a separator before hashing so `["ab", "c"]` and
/// `["a", "bc"]` produce different seeds.
pub fn derive_seed(parts: &[&str]) -> u64 {
    let digest = digest(parts);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Deterministic RNG for the given parts.
pub fn rng_for(parts: &[&str]) -> StdRng {
    StdRng::seed_from_u64(derive_seed(parts))
}

/// Uniform roll in `[0, 1)` for the given parts.
pub fn roll(parts: &[&str]) -> f64 {
    rng_for(parts).gen_range(0.0..1.0)
}

/// Short hex identifier (`len` hex chars) for the given parts.
pub fn short_hex(parts: &[&str], len: usize) -> String {
    let mut encoded = hex::encode(digest(parts));
    encoded.truncate(len);
    encoded
}

fn digest(parts: &[&str]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.finalize().into()
}
