//! Notification identifier generation.
//!
//! Identifiers are not guaranteed unique on their own; the dispatcher checks each
//! candidate against the correlation store and asks again on collision.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use herald_common::error::AppError;

/// Source of candidate notification identifiers.
pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self) -> u32;
}

/// Uniform random identifiers in `[0, 2^bits)`.
#[derive(Debug, Clone)]
pub struct RandomIdentifierGenerator {
    upper: u64,
}

impl RandomIdentifierGenerator {
    /// `bits` is clamped to `1..=32`.
    pub fn new(bits: u32) -> Self {
        let bits = bits.clamp(1, 32);
        Self { upper: 1u64 << bits }
    }
}

impl Default for RandomIdentifierGenerator {
    fn default() -> Self {
        Self::new(32)
    }
}

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn generate(&self) -> u32 {
        rand::rng().random_range(0..self.upper) as u32
    }
}

/// Replays a fixed list of identifiers, wrapping around at the end.
///
/// Used where identifiers must be predictable (replays, tests).
#[derive(Debug)]
pub struct SequenceIdentifierGenerator {
    values: Vec<u32>,
    next: AtomicUsize,
}

impl SequenceIdentifierGenerator {
    pub fn new(values: Vec<u32>) -> Result<Self, AppError> {
        if values.is_empty() {
            return Err(AppError::Validation(
                "identifier sequence must not be empty".to_string(),
            ));
        }
        Ok(Self {
            values,
            next: AtomicUsize::new(0),
        })
    }
}

impl IdentifierGenerator for SequenceIdentifierGenerator {
    fn generate(&self) -> u32 {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        self.values[idx % self.values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_respects_range() {
        let generator = RandomIdentifierGenerator::new(4);
        for _ in 0..1000 {
            assert!(generator.generate() < 16);
        }
    }

    #[test]
    fn test_random_bits_clamped() {
        let generator = RandomIdentifierGenerator::new(0);
        for _ in 0..100 {
            assert!(generator.generate() < 2);
        }
        // 64 would overflow the u32 cast without clamping
        let _ = RandomIdentifierGenerator::new(64).generate();
    }

    #[test]
    fn test_sequence_replays_and_wraps() {
        let generator = SequenceIdentifierGenerator::new(vec![100, 200]).unwrap();
        assert_eq!(generator.generate(), 100);
        assert_eq!(generator.generate(), 200);
        assert_eq!(generator.generate(), 100);
    }

    #[test]
    fn test_sequence_rejects_empty() {
        assert!(SequenceIdentifierGenerator::new(Vec::new()).is_err());
    }
}
