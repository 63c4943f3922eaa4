use rand::rngs::OsRng;
use rand::RngCore;

use crate::errors::AppError;

/// Random bytes behind every token and request id (hex-encoded: 20 chars).
pub const ID_BYTES: usize = 10;

/// Collisions at 80 bits are not expected; hitting this cap means the RNG is broken.
pub const MAX_ID_ATTEMPTS: usize = 16;

pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Resample `generate` until it yields an id `exists` rejects, at most
/// [`MAX_ID_ATTEMPTS`] times.
pub fn generate_unique_id<G, E>(mut generate: G, exists: E) -> Result<String, AppError>
where
    G: FnMut() -> String,
    E: Fn(&str) -> bool,
{
    for attempt in 1..=MAX_ID_ATTEMPTS {
        let candidate = generate();
        if !exists(&candidate) {
            return Ok(candidate);
        }
        tracing::warn!(attempt, "generated id collided with a live id, resampling");
    }
    Err(AppError::IdSpaceExhausted)
}
