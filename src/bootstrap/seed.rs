//! Random number generator derivation for resampling units
//!
//! Each `(cohort, iteration)` unit receives its own generator so results do
//! not depend on scheduling order. With a base seed the generators are
//! reproducible; without one they draw from OS entropy.

use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHasher;

/// Derives independent generators for every resampling unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSequence {
    base: Option<u64>,
}

fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn cohort_hash(cohort: &str) -> u64 {
    let mut hasher = FxHasher::default();
    cohort.hash(&mut hasher);
    hasher.finish()
}

impl SeedSequence {
    #[must_use]
    pub const fn new(base: Option<u64>) -> Self {
        Self { base }
    }

    /// Sequence seeded from a fixed value
    #[must_use]
    pub const fn seeded(base: u64) -> Self {
        Self { base: Some(base) }
    }

    /// Sequence drawing from OS entropy
    #[must_use]
    pub const fn entropy() -> Self {
        Self { base: None }
    }

    #[must_use]
    pub const fn base(&self) -> Option<u64> {
        self.base
    }

    /// Seed of one unit, `None` when drawing from entropy
    #[must_use]
    pub fn unit_seed(&self, cohort: &str, iteration: u32) -> Option<u64> {
        self.base.map(|base| {
            let cohort_seed = splitmix64(base ^ cohort_hash(cohort));
            splitmix64(cohort_seed.wrapping_add(u64::from(iteration)))
        })
    }

    /// Generator for one unit
    #[must_use]
    pub fn rng_for(&self, cohort: &str, iteration: u32) -> StdRng {
        match self.unit_seed(cohort, iteration) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
