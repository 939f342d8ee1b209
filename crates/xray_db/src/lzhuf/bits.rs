use crate::error::{Error, Result};

/// Bytes the decoder may pull past the end of its input before the stream is considered truncated
const MAX_OVERRUN: usize = 4;

/// MSB-first bit packer
pub(super) struct BitWriter {
    out: Vec<u8>,
    buf: u32,
    len: u32,
}

impl BitWriter {
    pub fn new(out: Vec<u8>) -> Self {
        Self { out, buf: 0, len: 0 }
    }

    /// Append the top `l` bits of the 16 bit window `c`
    pub fn put_code(&mut self, l: u32, c: u32) {
        self.buf |= c.wrapping_shr(self.len);
        self.len += l;
        if self.len >= 8 {
            self.out.push((self.buf >> 8) as u8);
            self.len -= 8;
            if self.len >= 8 {
                self.out.push(self.buf as u8);
                self.len -= 8;
                self.buf = c.wrapping_shl(l.wrapping_sub(self.len));
            } else {
                self.buf <<= 8;
            }
        }
    }

    /// Flush the partial byte and return the buffer
    pub fn finish(mut self) -> Vec<u8> {
        if self.len != 0 {
            self.out.push((self.buf >> 8) as u8);
        }
        self.out
    }
}

/// MSB-first bit reader yielding zero bits past the end of the input
pub(super) struct BitReader<'a> {
    input: &'a [u8],
    pos: usize,
    overrun: usize,
    buf: u32,
    len: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            overrun: 0,
            buf: 0,
            len: 0,
        }
    }

    fn fill(&mut self) -> Result<()> {
        while self.len <= 8 {
            let byte = match self.input.get(self.pos) {
                Some(b) => {
                    self.pos += 1;
                    *b as u32
                }
                None => {
                    self.overrun += 1;
                    if self.overrun > MAX_OVERRUN {
                        return Err(Error::Lzhuf("unexpected end of bitstream"));
                    }
                    0
                }
            };
            self.buf |= byte << (8 - self.len);
            self.len += 8;
        }
        Ok(())
    }

    pub fn get_bit(&mut self) -> Result<usize> {
        self.fill()?;
        let i = self.buf;
        self.buf <<= 1;
        self.len -= 1;
        Ok(((i >> 15) & 1) as usize)
    }

    pub fn get_byte(&mut self) -> Result<usize> {
        self.fill()?;
        let i = self.buf;
        self.buf <<= 8;
        self.len -= 8;
        Ok(((i & 0xff00) >> 8) as usize)
    }
}
