//! Deterministic fallback predictor
//!
//! Used whenever no trained classifier is available. The identity string is
//! hashed once with SHA-256; one reduction of that hash picks a base scenario
//! and a second reduction seeds the jitter generator, so the same identity
//! always yields bit-identical probabilities, in this process or any other.

use radiolens_core::{ClassDistribution, ClassLabel, ImageIdentity, Result, NUM_CLASSES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Number of base scenarios
pub const SCENARIO_COUNT: u64 = 4;

/// Modulus for the jitter seed reduction
pub const JITTER_SEED_MODULUS: u64 = 1000;

/// Half-width of the uniform perturbation applied to each class
pub const JITTER: f64 = 0.05;

/// Lowest probability any class may receive
pub const PROBABILITY_FLOOR: f64 = 0.001;

/// Highest probability any class may receive
pub const PROBABILITY_CEILING: f64 = 0.999;

/// Base distributions in [`ClassLabel::ALL`] order, one per dominant class
pub const BASE_SCENARIOS: [[f64; NUM_CLASSES]; SCENARIO_COUNT as usize] = [
    [0.95, 0.03, 0.015, 0.005],
    [0.12, 0.82, 0.05, 0.01],
    [0.08, 0.15, 0.75, 0.02],
    [0.05, 0.10, 0.20, 0.65],
];

/// Stable 64-bit digest of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentitySeed(u64);

impl IdentitySeed {
    /// First eight bytes of the SHA-256 digest, big-endian
    pub fn of(identity: &ImageIdentity) -> Self {
        let digest = Sha256::digest(identity.as_str().as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(head))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Index into [`BASE_SCENARIOS`]
    pub fn scenario(self) -> usize {
        (self.0 % SCENARIO_COUNT) as usize
    }

    pub fn jitter_seed(self) -> u64 {
        self.0 % JITTER_SEED_MODULUS
    }
}

/// Hash-seeded synthetic predictor
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPredictor;

impl FallbackPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Reproducible distribution for `identity`
    pub fn predict(&self, identity: &ImageIdentity) -> Result<ClassDistribution> {
        let seed = IdentitySeed::of(identity);
        let mut rng = StdRng::seed_from_u64(seed.jitter_seed());
        self.predict_with_rng(seed.scenario(), &mut rng)
    }

    /// Jitter, clamp and renormalize one base scenario.
    ///
    /// `scenario` wraps around [`SCENARIO_COUNT`].
    pub fn predict_with_rng<R: Rng + ?Sized>(
        &self,
        scenario: usize,
        rng: &mut R,
    ) -> Result<ClassDistribution> {
        let base = BASE_SCENARIOS[scenario % BASE_SCENARIOS.len()];

        let mut values = base.map(|p| {
            (p + rng.gen_range(-JITTER..=JITTER)).clamp(PROBABILITY_FLOOR, PROBABILITY_CEILING)
        });

        let sum: f64 = values.iter().sum();
        for v in values.iter_mut() {
            *v /= sum;
        }

        restore_floor(&mut values);
        ClassDistribution::new(values)
    }

    /// Label the base scenario for `identity` favours
    pub fn scenario_label(&self, identity: &ImageIdentity) -> ClassLabel {
        ClassLabel::ALL[IdentitySeed::of(identity).scenario()]
    }
}

/// Lift the smallest value back to the floor after renormalization.
///
/// Mixing with the uniform distribution keeps the sum at one and the order of
/// the values, and can only pull the largest value down.
fn restore_floor(values: &mut [f64; NUM_CLASSES]) {
    let uniform = 1.0 / NUM_CLASSES as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if min >= PROBABILITY_FLOOR {
        return;
    }

    let lambda = (PROBABILITY_FLOOR - min) / (uniform - min);
    for v in values.iter_mut() {
        *v = ((1.0 - lambda) * *v + lambda * uniform).max(PROBABILITY_FLOOR);
    }
}
