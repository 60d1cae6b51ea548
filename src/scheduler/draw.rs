//! Injected random source for the natural-skip check

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of uniform draws in `[0, 1)`
pub trait UnitDraw {
    fn next_unit(&mut self) -> f64;
}

/// Draws backed by any `rand` generator
#[derive(Debug, Clone)]
pub struct RngDraw<R: RngCore> {
    rng: R,
}

impl<R: RngCore> RngDraw<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngDraw<ChaCha8Rng> {
    /// Production source seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy())
    }

    /// Reproducible source
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> UnitDraw for RngDraw<R> {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Constant draw, for tests and for observation-only evaluations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDraw(pub f64);

impl FixedDraw {
    /// A draw that never triggers a skip; 1.0 lies outside `[0, 1)`
    pub fn never_skip() -> Self {
        Self(1.0)
    }
}

impl UnitDraw for FixedDraw {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let mut a = RngDraw::seeded(42);
        let mut b = RngDraw::seeded(42);
        for _ in 0..10 {
            let x = a.next_unit();
            assert_eq!(x, b.next_unit());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_fixed_draw() {
        let mut draw = FixedDraw(0.25);
        assert_eq!(draw.next_unit(), 0.25);
        assert_eq!(FixedDraw::never_skip().next_unit(), 1.0);
    }
}
