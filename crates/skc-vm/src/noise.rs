use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::device::{Device, Word};

/// Hardware noise source: every read yields a fresh 32-bit sample, writes are ignored.
pub struct Noise {
    rng: Box<dyn RngCore>,
}

impl Noise {
    /// Noise backed by the operating system's entropy source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic noise, for tests and reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Noise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Noise").finish_non_exhaustive()
    }
}

impl Device for Noise {
    fn read(&mut self, _offset: u32) -> Word {
        // Low byte first.
        self.rng.next_u32().to_le_bytes()
    }

    fn write(&mut self, _offset: u32, _data: Word) {}
}
