//! Seed derivation for reproducible sampling.
//!
//! Every sampling pass owns a private generator derived from a master seed,
//! so passes are independent of each other and safe to distribute across
//! threads or processes without sharing mutable random state.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Derives an independent seed for sample `index` from a master seed.
///
/// SplitMix64 mixing; adjacent indexes produce uncorrelated streams.
#[must_use]
pub fn derive_seed(base: u64, index: u64) -> u64 {
    let mut x = base.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// One private sub-generator per sample from a master seed.
#[must_use]
pub fn derive_rng(base: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(base, index))
}
