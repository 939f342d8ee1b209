//! Bounds-checked LZO1X decompression for 2215/2945/2947 payloads.
//!
//! Every instruction byte selects a literal run or one of four match classes:
//!
//! | First byte | Class | Length            | Distance                                   |
//! |------------|-------|-------------------|--------------------------------------------|
//! | `0..=15`   | M1    | 2 (3 after a run) | `1 + (t >> 2) + (next << 2)` (+ 0x800)     |
//! | `16..=31`  | M4    | `(t & 7) + 2`     | `0x4000 + ((t & 8) << 11) + (le16 >> 2)`   |
//! | `32..=63`  | M3    | `(t & 31) + 2`    | `1 + (le16 >> 2)`                          |
//! | `64..=255` | M2    | `(t >> 5) + 1`    | `1 + ((t >> 2) & 7) + (next << 3)`         |
//!
//! The low two bits of a match's last distance byte carry up to three trailing literals.
//! An M4 match with a zero distance terminates the stream.

use tracing::instrument;

use crate::error::{Error, Result};

/// Distance bias of the M1 match that follows a literal run
const M2_MAX_OFFSET: usize = 0x0800;

#[derive(Debug, Clone, Copy)]
enum State {
    /// Expecting a literal run or a match
    Literal,
    /// A literal run was just copied
    FirstLiteralRun,
    /// Instruction byte of a match
    Match(usize),
    /// Literals carried by the previous match
    Trailing(usize),
}

struct Decoder<'a> {
    input: &'a [u8],
    ip: usize,
    out: Vec<u8>,
    limit: usize,
}

impl Decoder<'_> {
    fn byte(&mut self) -> Result<usize> {
        let b = *self
            .input
            .get(self.ip)
            .ok_or(Error::Lzo("input overrun"))?;
        self.ip += 1;
        Ok(b as usize)
    }

    /// Zero bytes extend a length field by 255 each, the first non-zero byte ends it
    fn extended_length(&mut self, base: usize) -> Result<usize> {
        let mut t = 0usize;
        while *self.input.get(self.ip).ok_or(Error::Lzo("input overrun"))? == 0 {
            t += 255;
            self.ip += 1;
        }
        Ok(t + base + self.byte()?)
    }

    fn literals(&mut self, n: usize) -> Result<()> {
        let end = self.ip + n;
        let src = self
            .input
            .get(self.ip..end)
            .ok_or(Error::Lzo("input overrun"))?;
        if self.out.len() + n > self.limit {
            return Err(Error::Lzo("output overrun"));
        }
        self.out.extend_from_slice(src);
        self.ip = end;
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        if distance == 0 || distance > self.out.len() {
            return Err(Error::Lzo("lookbehind overrun"));
        }
        if self.out.len() + length > self.limit {
            return Err(Error::Lzo("output overrun"));
        }
        let start = self.out.len() - distance;
        for k in 0..length {
            let b = self.out[start + k];
            self.out.push(b);
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>> {
        if self.ip < self.input.len() {
            return Err(Error::Lzo("input not consumed"));
        }
        if self.out.len() != self.limit {
            return Err(Error::SizeMismatch {
                expected: self.limit as u64,
                actual: self.out.len() as u64,
            });
        }
        Ok(self.out)
    }
}

/// Decompress an LZO1X stream whose decoded size is known up front
#[instrument(level = "trace", skip(input), err, fields(compressed = input.len()))]
pub fn decompress(input: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut d = Decoder {
        input,
        ip: 0,
        out: Vec::with_capacity(size),
        limit: size,
    };

    let mut state = match input.first() {
        Some(&first) if first > 17 => {
            let t = d.byte()? - 17;
            if t < 4 {
                State::Trailing(t)
            } else {
                d.literals(t)?;
                State::FirstLiteralRun
            }
        }
        _ => State::Literal,
    };

    loop {
        state = match state {
            State::Literal => {
                let t = d.byte()?;
                if t >= 16 {
                    State::Match(t)
                } else {
                    let t = if t == 0 { d.extended_length(15)? } else { t };
                    d.literals(t + 3)?;
                    State::FirstLiteralRun
                }
            }
            State::FirstLiteralRun => {
                let t = d.byte()?;
                if t >= 16 {
                    State::Match(t)
                } else {
                    let distance = 1 + M2_MAX_OFFSET + (t >> 2) + (d.byte()? << 2);
                    d.copy_match(distance, 3)?;
                    trailing(t & 3)
                }
            }
            State::Match(t) => {
                let (distance, length, carry) = if t >= 64 {
                    let distance = 1 + ((t >> 2) & 7) + (d.byte()? << 3);
                    (distance, (t >> 5) + 1, t & 3)
                } else if t >= 32 {
                    let len = match t & 31 {
                        0 => d.extended_length(31)?,
                        len => len,
                    };
                    let (lo, hi) = (d.byte()?, d.byte()?);
                    (1 + (lo >> 2) + (hi << 6), len + 2, lo & 3)
                } else if t >= 16 {
                    let high = (t & 8) << 11;
                    let len = match t & 7 {
                        0 => d.extended_length(7)?,
                        len => len,
                    };
                    let (lo, hi) = (d.byte()?, d.byte()?);
                    let distance = high + (lo >> 2) + (hi << 6);
                    if distance == 0 {
                        return d.finish();
                    }
                    (distance + 0x4000, len + 2, lo & 3)
                } else {
                    (1 + (t >> 2) + (d.byte()? << 2), 2, t & 3)
                };
                d.copy_match(distance, length)?;
                trailing(carry)
            }
            State::Trailing(n) => {
                d.literals(n)?;
                State::Match(d.byte()?)
            }
        };
    }
}

fn trailing(carry: usize) -> State {
    if carry == 0 {
        State::Literal
    } else {
        State::Trailing(carry)
    }
}
