//! Public player index allocation
//!
//! Indices are random 6-digit numbers so they can be shared verbally; a
//! retry loop guarantees uniqueness against the already-registered set.

use crate::error::{LedgerError, Result};
use crate::types::PublicIndex;
use rand::Rng;

/// Smallest issued index
pub const MIN_PUBLIC_INDEX: u32 = 100_000;

/// Largest issued index
pub const MAX_PUBLIC_INDEX: u32 = 999_999;

/// Give up after this many collisions in a row
const MAX_ALLOCATION_ATTEMPTS: usize = 1_000;

/// Draw a random index from `100000..=999999`
pub fn random_public_index<R: Rng + ?Sized>(rng: &mut R) -> Result<PublicIndex> {
    let value = rng.gen_range(MIN_PUBLIC_INDEX..=MAX_PUBLIC_INDEX);
    PublicIndex::parse(&value.to_string())
}

/// Draw indices until one is not `taken`
pub fn allocate_public_index<R, F>(rng: &mut R, taken: F) -> Result<PublicIndex>
where
    R: Rng + ?Sized,
    F: Fn(&PublicIndex) -> bool,
{
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let candidate = random_public_index(rng)?;
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(LedgerError::InternalError {
        message: "Failed to allocate a unique player index".to_string(),
    }
    .into())
}
