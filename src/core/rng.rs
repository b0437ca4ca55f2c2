//! Seeded Random Source
//!
//! Xorshift128+ seeded through SplitMix64. Tile spawning draws only from
//! this generator, so a seed fully determines where and what tiles appear.

/// Xorshift128+ generator.
///
/// # Example
///
/// ```
/// use twenty48::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(2048);
/// let mut b = DeterministicRng::new(2048);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterministicRng {
    s0: u64,
    s1: u64,
}

impl DeterministicRng {
    /// Seed the generator. Any seed, including 0, is usable.
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        let s0 = splitmix64(&mut mix);
        let s1 = splitmix64(&mut mix);
        // all-zero state would only ever yield zeros
        if s0 | s1 == 0 {
            return Self { s0: 1, s1: 1 };
        }
        Self { s0, s1 }
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let (a, mut b) = (self.s0, self.s1);
        let out = a.wrapping_add(b);
        b ^= a;
        self.s0 = a.rotate_left(24) ^ b ^ (b << 16);
        self.s1 = b.rotate_left(37);
        out
    }

    /// Uniform index in `0..bound`; 0 when `bound` is 0.
    #[inline]
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        // modulo bias is negligible for board-sized bounds
        (self.next_u64() % bound as u64) as usize
    }

    /// True with probability `numerator / denominator`.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        (self.below(denominator as usize) as u64) < numerator as u64
    }

    /// Uniformly pick one element, `None` if `items` is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.below(items.len()))
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draw a 64-bit seed from a random v4 UUID.
pub fn entropy_seed() -> u64 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_spawn_cells() {
        let cells: Vec<(usize, usize)> = (0..16).map(|i| (i / 4, i % 4)).collect();
        let mut a = DeterministicRng::new(99);
        let mut b = DeterministicRng::new(99);
        let picks_a: Vec<_> = (0..64).map(|_| *a.choose(&cells).unwrap()).collect();
        let picks_b: Vec<_> = (0..64).map(|_| *b.choose(&cells).unwrap()).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_seeds_diverge() {
        let mut a = DeterministicRng::new(1);
        let mut b = DeterministicRng::new(2);
        let a: Vec<u64> = (0..4).map(|_| a.next_u64()).collect();
        let b: Vec<u64> = (0..4).map(|_| b.next_u64()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut rng = DeterministicRng::new(0);
        assert!((0..8).any(|_| rng.next_u64() != 0));
    }

    #[test]
    fn test_below_bounds() {
        let mut rng = DeterministicRng::new(16);
        assert!((0..500).all(|_| rng.below(14) < 14));
        assert_eq!(rng.below(0), 0);
        assert_eq!(rng.below(1), 0);
    }

    #[test]
    fn test_every_cell_reachable() {
        let mut rng = DeterministicRng::new(3);
        let mut seen = [false; 16];
        for _ in 0..1_000 {
            seen[rng.below(16)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_four_tile_rate() {
        let mut rng = DeterministicRng::new(2048);
        let fours = (0..10_000).filter(|_| rng.chance(1, 10)).count();
        assert!((700..1300).contains(&fours), "fours = {}", fours);
    }

    #[test]
    fn test_choose_empty() {
        let mut rng = DeterministicRng::new(5);
        let none: [(usize, usize); 0] = [];
        assert!(rng.choose(&none).is_none());
    }

    #[test]
    fn test_entropy_seeds_differ() {
        assert_ne!(entropy_seed(), entropy_seed());
    }
}
