//! Byte substitution cipher protecting the directory table of 2947 archives.
//!
//! Two linear congruential generators drive the cipher. The first one shuffles a 256 entry
//! substitution box once, when the cipher is built. The second one produces a fresh keystream
//! for every [`Scrambler::encrypt`] / [`Scrambler::decrypt`] call.

const SEED_MULT: u32 = 0x0808_8405;

/// Regional key schedule parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherConfig {
    /// Russian retail release
    Ru,
    /// Worldwide retail release
    Ww,
}

impl CipherConfig {
    /// Seed of the keystream generator
    const fn seed(self) -> u32 {
        match self {
            CipherConfig::Ru => 0x0131_a9d3,
            CipherConfig::Ww => 0x016e_b2eb,
        }
    }

    /// Seed of the key schedule generator
    const fn seed0(self) -> u32 {
        match self {
            CipherConfig::Ru => 0x0132_9436,
            CipherConfig::Ww => 0x005b_bc4b,
        }
    }

    /// Number of shuffle rounds, in multiples of 256 swaps
    const fn size_mult(self) -> usize {
        match self {
            CipherConfig::Ru => 8,
            CipherConfig::Ww => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lcg(u32);

impl Lcg {
    fn next_byte(&mut self) -> u8 {
        self.0 = self.0.wrapping_mul(SEED_MULT).wrapping_add(1);
        (self.0 >> 24) as u8
    }
}

/// Cipher with a derived substitution box and its inverse
///
/// ```
/// use xray_db::scrambler::{CipherConfig, Scrambler};
///
/// let scrambler = Scrambler::new(CipherConfig::Ww);
/// let encrypted = scrambler.encrypt(b"gamedata");
/// assert_eq!(scrambler.decrypt(&encrypted), b"gamedata");
/// ```
#[derive(Clone)]
pub struct Scrambler {
    seed: u32,
    enc_table: [u8; 256],
    dec_table: [u8; 256],
}

impl std::fmt::Debug for Scrambler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scrambler")
            .field("seed", &format_args!("{:#x}", self.seed))
            .finish_non_exhaustive()
    }
}

impl Scrambler {
    /// Derive the substitution tables for a region
    pub fn new(config: CipherConfig) -> Self {
        let mut enc_table = [0u8; 256];
        for (i, v) in enc_table.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut lcg = Lcg(config.seed0());
        for _ in 0..config.size_mult() * 256 {
            let a = lcg.next_byte();
            let mut b = lcg.next_byte();
            while a == b {
                b = lcg.next_byte();
            }
            enc_table.swap(a as usize, b as usize);
        }

        let mut dec_table = [0u8; 256];
        for (i, v) in enc_table.iter().enumerate() {
            dec_table[*v as usize] = i as u8;
        }

        Self {
            seed: config.seed(),
            enc_table,
            dec_table,
        }
    }

    /// Encrypt a buffer, restarting the keystream
    pub fn encrypt(&self, src: &[u8]) -> Vec<u8> {
        let mut lcg = Lcg(self.seed);
        src.iter()
            .map(|&b| self.enc_table[b as usize] ^ lcg.next_byte())
            .collect()
    }

    /// Decrypt a buffer, restarting the keystream
    pub fn decrypt(&self, src: &[u8]) -> Vec<u8> {
        let mut lcg = Lcg(self.seed);
        src.iter()
            .map(|&b| self.dec_table[(b ^ lcg.next_byte()) as usize])
            .collect()
    }
}
