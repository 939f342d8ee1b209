use super::bits::{BitReader, BitWriter};
use super::{F, THRESHOLD};
use crate::error::Result;

/// Literal bytes plus one symbol per match length
const N_CHAR: usize = 256 - THRESHOLD + F;
/// Number of tree nodes
const T: usize = N_CHAR * 2 - 1;
/// Root node
const R: usize = T - 1;
/// Root frequency that triggers a rebuild
const MAX_FREQ: u32 = 0x4000;

/// Code length of the upper 6 bits of a match position
const P_LEN: [u8; 64] = [
    0x03, 0x04, 0x04, 0x04, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x06, 0x06, 0x06, 0x06,
    0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07,
    0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07,
    0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08,
];

/// Left aligned code of the upper 6 bits of a match position
const P_CODE: [u8; 64] = [
    0x00, 0x20, 0x30, 0x40, 0x50, 0x58, 0x60, 0x68, 0x70, 0x78, 0x80, 0x88, 0x90, 0x94, 0x98, 0x9C,
    0xA0, 0xA4, 0xA8, 0xAC, 0xB0, 0xB4, 0xB8, 0xBC, 0xC0, 0xC2, 0xC4, 0xC6, 0xC8, 0xCA, 0xCC, 0xCE,
    0xD0, 0xD2, 0xD4, 0xD6, 0xD8, 0xDA, 0xDC, 0xDE, 0xE0, 0xE2, 0xE4, 0xE6, 0xE8, 0xEA, 0xEC, 0xEE,
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

/// Decoding tables indexed by the next 8 bits of the stream: upper 6 bits and code length
const D_TABLES: ([u8; 256], [u8; 256]) = decode_tables();

const fn decode_tables() -> ([u8; 256], [u8; 256]) {
    let mut code = [0u8; 256];
    let mut len = [0u8; 256];
    let mut upper = 0;
    while upper < 64 {
        let start = P_CODE[upper] as usize;
        let span = 1usize << (8 - P_LEN[upper] as usize);
        let mut k = 0;
        while k < span {
            code[start + k] = upper as u8;
            len[start + k] = P_LEN[upper];
            k += 1;
        }
        upper += 1;
    }
    (code, len)
}

/// Emit a 12 bit window position
pub(super) fn encode_position(c: usize, out: &mut BitWriter) {
    let upper = c >> 6;
    out.put_code(P_LEN[upper] as u32, (P_CODE[upper] as u32) << 8);
    out.put_code(6, ((c & 0x3f) as u32) << 10);
}

/// Read a 12 bit window position
pub(super) fn decode_position(input: &mut BitReader) -> Result<usize> {
    let mut i = input.get_byte()?;
    let c = (D_TABLES.0[i] as usize) << 6;
    let extra = D_TABLES.1[i] - 2;
    for _ in 0..extra {
        i = (i << 1) + input.get_bit()?;
    }
    Ok(c | (i & 0x3f))
}

/// Adaptive Huffman tree over [`N_CHAR`] symbols
///
/// Nodes are kept in ascending frequency order; leaves are encoded as `T + symbol` in `son`.
pub(super) struct AdaptiveHuffman {
    freq: [u32; T + 1],
    prnt: [usize; T + N_CHAR],
    son: [usize; T],
}

impl AdaptiveHuffman {
    pub fn new() -> Self {
        let mut freq = [0u32; T + 1];
        let mut prnt = [0usize; T + N_CHAR];
        let mut son = [0usize; T];

        for i in 0..N_CHAR {
            freq[i] = 1;
            son[i] = i + T;
            prnt[i + T] = i;
        }

        let mut i = 0;
        for j in N_CHAR..=R {
            freq[j] = freq[i] + freq[i + 1];
            son[j] = i;
            prnt[i] = j;
            prnt[i + 1] = j;
            i += 2;
        }

        freq[T] = 0xffff;
        prnt[R] = 0;

        Self { freq, prnt, son }
    }

    /// Halve every leaf frequency and rebuild the internal nodes
    fn reconst(&mut self) {
        let mut j = 0;
        for i in 0..T {
            if self.son[i] >= T {
                self.freq[j] = (self.freq[i] + 1) / 2;
                self.son[j] = self.son[i];
                j += 1;
            }
        }

        let mut i = 0;
        for j in N_CHAR..T {
            let f = self.freq[i] + self.freq[i + 1];
            self.freq[j] = f;

            let mut k = j - 1;
            while f < self.freq[k] {
                k -= 1;
            }
            k += 1;

            self.freq.copy_within(k..j, k + 1);
            self.freq[k] = f;
            self.son.copy_within(k..j, k + 1);
            self.son[k] = i;
            i += 2;
        }

        for i in 0..T {
            let k = self.son[i];
            self.prnt[k] = i;
            if k < T {
                self.prnt[k + 1] = i;
            }
        }
    }

    /// Count one occurrence of symbol `c`, swapping nodes up the tree to keep the ordering
    fn update(&mut self, c: usize) {
        if self.freq[R] == MAX_FREQ {
            self.reconst();
        }

        let mut c = self.prnt[c + T];
        loop {
            self.freq[c] += 1;
            let k = self.freq[c];

            let mut l = c + 1;
            if k > self.freq[l] {
                l += 1;
                while k > self.freq[l] {
                    l += 1;
                }
                l -= 1;

                self.freq[c] = self.freq[l];
                self.freq[l] = k;

                let i = self.son[c];
                self.prnt[i] = l;
                if i < T {
                    self.prnt[i + 1] = l;
                }

                let j = self.son[l];
                self.son[l] = i;
                self.prnt[j] = c;
                if j < T {
                    self.prnt[j + 1] = c;
                }
                self.son[c] = j;

                c = l;
            }

            c = self.prnt[c];
            if c == 0 {
                break;
            }
        }
    }

    pub fn encode_char(&mut self, c: usize, out: &mut BitWriter) {
        let mut code = 0u32;
        let mut len = 0u32;
        let mut k = self.prnt[c + T];

        loop {
            code >>= 1;
            if k & 1 != 0 {
                code += 0x8000;
            }
            len += 1;
            k = self.prnt[k];
            if k == R {
                break;
            }
        }

        out.put_code(len, code);
        self.update(c);
    }

    pub fn decode_char(&mut self, input: &mut BitReader) -> Result<usize> {
        let mut c = self.son[R];
        while c < T {
            c += input.get_bit()?;
            c = self.son[c];
        }
        c -= T;
        self.update(c);
        Ok(c)
    }
}
