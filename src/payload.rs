//! Upload payload generation.
//!
//! Payloads are produced in 64 KiB blocks so generating a multi-megabyte
//! body never monopolizes the scheduler thread.

use rand::RngCore;

/// Size of one generation block.
const BLOCK_SIZE: usize = 64 * 1024;
/// Pattern length for the tiled strategy.
const PATTERN_SIZE: usize = 1024;

/// How upload payload bytes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PayloadStrategy {
    /// Every byte drawn independently. Defeats compression; required
    /// when the transport under test may compress payloads in transit.
    Random,
    /// One random 1 KiB pattern tiled across the buffer. Cheaper to
    /// produce, fine when the transport does not compress.
    #[default]
    Pattern,
}

/// Generate exactly `size_bytes` of payload using the given strategy.
pub fn generate(size_bytes: usize, strategy: PayloadStrategy) -> Vec<u8> {
    match strategy {
        PayloadStrategy::Random => fully_random(size_bytes),
        PayloadStrategy::Pattern => pattern_repeat(size_bytes),
    }
}

fn fully_random(size_bytes: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut data = vec![0u8; size_bytes];

    for block in data.chunks_mut(BLOCK_SIZE) {
        rng.fill_bytes(block);
    }

    data
}

fn pattern_repeat(size_bytes: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut pattern = [0u8; PATTERN_SIZE];
    rng.fill_bytes(&mut pattern);

    let mut data = vec![0u8; size_bytes];
    for block in data.chunks_mut(PATTERN_SIZE) {
        block.copy_from_slice(&pattern[..block.len()]);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_exact_sizes() {
        for size in [0, 1, 1023, 1024, 1025, 64 * 1024 + 7, 1024 * 1024] {
            assert_eq!(generate(size, PayloadStrategy::Random).len(), size);
            assert_eq!(generate(size, PayloadStrategy::Pattern).len(), size);
        }
    }

    #[test]
    fn pattern_tiles_the_first_kilobyte() {
        let data = generate(4096, PayloadStrategy::Pattern);
        assert_eq!(&data[..1024], &data[1024..2048]);
        assert_eq!(&data[..1024], &data[3072..]);
    }

    #[test]
    fn random_payload_is_not_tiled() {
        // 2 KiB of independent bytes colliding on both halves is
        // vanishingly unlikely.
        let data = generate(2048, PayloadStrategy::Random);
        assert_ne!(&data[..1024], &data[1024..]);
    }
}
