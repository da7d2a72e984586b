//! Zobrist hashing with a fixed-seed xorshift generator.
//!
//! The key tables must be reproducible across runs (and across processes
//! comparing a from-scratch key against the incrementally maintained one),
//! so a seeded xorshift64* generator is used in place of the crate's usual
//! `rand`-backed key generation: <http://vigna.di.unimi.it/ftp/papers/xorshift.pdf>.

use crate::types::Color;

struct Xorshift64Star {
    seed: u64,
}

impl Xorshift64Star {
    fn new(seed: u64) -> Self {
        Xorshift64Star { seed }
    }

    fn next(&mut self) -> u64 {
        self.seed ^= self.seed >> 12;
        self.seed ^= self.seed << 25;
        self.seed ^= self.seed >> 27;
        self.seed.wrapping_mul(2_685_821_657_736_338_717)
    }
}

pub struct ZobristKeys {
    /// `piece_keys[color][square]`
    pub piece_keys: [[u64; 64]; 2],
    pub side_key: u64,
}

impl ZobristKeys {
    fn new() -> Self {
        let mut rng = Xorshift64Star::new(1_070_372);

        let side_key = rng.next();

        let mut piece_keys = [[0u64; 64]; 2];
        for color in [Color::White, Color::Black] {
            for sq in 0..64 {
                piece_keys[color.index()][sq] = rng.next();
            }
        }

        ZobristKeys {
            piece_keys,
            side_key,
        }
    }

    #[inline]
    pub fn piece(&self, color: Color, sq: u8) -> u64 {
        self.piece_keys[color.index()][sq as usize]
    }
}

pub static ZOBRIST: once_cell::sync::Lazy<ZobristKeys> = once_cell::sync::Lazy::new(ZobristKeys::new);
