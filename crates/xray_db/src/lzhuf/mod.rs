//! LZSS with adaptive Huffman coding, used for directory tables and 1114 payloads.
//!
//! A compressed buffer is a 4 byte little endian length of the decoded data followed by the
//! bitstream. Literals and match lengths share one adaptive Huffman alphabet; match positions
//! are coded as a table driven prefix for the upper 6 bits plus 6 raw bits.
//!
//! The encoder output is byte-for-byte identical to the legacy tools, which is what lets a
//! repacked archive reproduce the original file.
//!
//! ```
//! # fn doit() -> xray_db::error::Result<()>
//! # {
//! let packed = xray_db::lzhuf::compress(b"hello hello hello hello world")?;
//! assert_eq!(xray_db::lzhuf::decompress(&packed)?, b"hello hello hello hello world");
//! # Ok(())
//! # }
//! # doit().unwrap();
//! ```

mod bits;
mod huffman;
mod tree;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use bits::{BitReader, BitWriter};
use huffman::{decode_position, encode_position, AdaptiveHuffman};
use tree::MatchTree;

/// Size of the sliding window
const N: usize = 4096;
/// Longest match
const F: usize = 60;
/// Matches of this length or shorter are emitted as literals
const THRESHOLD: usize = 2;

/// Compress a buffer
#[instrument(level = "trace", skip_all, err, fields(size = input.len()))]
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(input.len()).map_err(|_| Error::Lzhuf("input exceeds 4 GiB"))?;

    let mut header = Vec::with_capacity(input.len() / 2 + 4);
    header.extend_from_slice(&size.to_le_bytes());
    let mut out = BitWriter::new(header);
    if input.is_empty() {
        return Ok(out.finish());
    }

    let mut huff = AdaptiveHuffman::new();
    let mut tree = MatchTree::new();
    let mut src = input.iter().copied();

    let mut s = 0;
    let mut r = N - F;
    let mut len = 0;
    while len < F {
        let Some(c) = src.next() else { break };
        tree.text_buf[r + len] = c;
        len += 1;
    }

    for i in 1..=F {
        tree.insert_node(r - i);
    }
    tree.insert_node(r);

    loop {
        let mut match_length = tree.match_length.min(len);
        if match_length <= THRESHOLD {
            match_length = 1;
            huff.encode_char(tree.text_buf[r] as usize, &mut out);
        } else {
            huff.encode_char(255 - THRESHOLD + match_length, &mut out);
            encode_position(tree.match_position, &mut out);
        }

        let mut i = 0;
        while i < match_length {
            let Some(c) = src.next() else { break };
            tree.delete_node(s);
            tree.text_buf[s] = c;
            if s < F - 1 {
                tree.text_buf[s + N] = c;
            }
            s = (s + 1) & (N - 1);
            r = (r + 1) & (N - 1);
            tree.insert_node(r);
            i += 1;
        }

        // input exhausted, drain the lookahead
        while i < match_length {
            i += 1;
            tree.delete_node(s);
            s = (s + 1) & (N - 1);
            r = (r + 1) & (N - 1);
            len -= 1;
            if len != 0 {
                tree.insert_node(r);
            }
        }

        if len == 0 {
            break;
        }
    }

    let output = out.finish();
    trace!(compressed = output.len(), "lzhuf");
    Ok(output)
}

/// Decompress a buffer produced by [`compress`]
#[instrument(level = "trace", skip_all, err, fields(size = input.len()))]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < 4 {
        return Err(Error::Lzhuf("missing length prefix"));
    }
    let size = LittleEndian::read_u32(input) as usize;

    let mut output = Vec::with_capacity(size.min(input.len().saturating_mul(64)));
    let mut bits = BitReader::new(&input[4..]);
    let mut huff = AdaptiveHuffman::new();

    let mut text_buf = [0u8; N];
    text_buf[..N - F].fill(b' ');
    let mut r = N - F;

    while output.len() < size {
        let c = huff.decode_char(&mut bits)?;
        if c < 256 {
            output.push(c as u8);
            text_buf[r] = c as u8;
            r = (r + 1) & (N - 1);
        } else {
            let start = r.wrapping_sub(decode_position(&mut bits)?).wrapping_sub(1) & (N - 1);
            let length = c - 255 + THRESHOLD;
            if output.len() + length > size {
                return Err(Error::Lzhuf("match runs past the declared length"));
            }
            for k in 0..length {
                let b = text_buf[(start + k) & (N - 1)];
                output.push(b);
                text_buf[r] = b;
                r = (r + 1) & (N - 1);
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod test {
    use pretty_assertions::{assert_eq, assert_str_eq};
    use tracing_test::traced_test;

    use super::*;

    fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (seed >> 16) as u8
            })
            .collect()
    }

    #[traced_test]
    #[test]
    fn compress_matches_legacy_encoder() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            0x1D, 0x00, 0x00, 0x00,
            0xFA, 0x7C, 0x7F, 0x18, 0x7F, 0xB9, 0xC0, 0x28, 0x1E, 0x17, 0xFA, 0xFF, 0xC0,
        ];

        let result = compress(b"hello hello hello hello world")?;
        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", expected));

        Ok(())
    }

    #[test]
    fn compress_repetition_matches_legacy_encoder() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            0x2A, 0x00, 0x00, 0x00,
            0xF6, 0xFB, 0xBD, 0xF6, 0x00, 0x20,
        ];

        let result = compress(&b"abc".repeat(14))?;
        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", expected));

        Ok(())
    }

    #[test]
    fn compress_single_byte() -> Result<()> {
        assert_eq!(compress(b"X")?, vec![0x01, 0x00, 0x00, 0x00, 0xF2, 0x00]);
        assert_eq!(decompress(&[0x01, 0x00, 0x00, 0x00, 0xF2, 0x00])?, b"X");

        Ok(())
    }

    #[test]
    fn empty_input() -> Result<()> {
        let packed = compress(b"")?;
        assert_eq!(packed, vec![0x00; 4]);
        assert!(decompress(&packed)?.is_empty());

        Ok(())
    }

    #[test]
    fn round_trip_text() -> Result<()> {
        let text = "[section]\nkey = value\n"
            .repeat(500)
            .into_bytes();
        let packed = compress(&text)?;
        assert!(packed.len() < text.len() / 10);
        assert_eq!(decompress(&packed)?, text);

        Ok(())
    }

    #[test]
    fn round_trip_random() -> Result<()> {
        for len in [1, 2, 3, 59, 60, 61, 119, 4095, 4096, 4097, 70_000] {
            let data = pseudo_random(len, len as u32);
            assert_eq!(decompress(&compress(&data)?)?, data, "length {len}");
        }

        Ok(())
    }

    #[test]
    fn round_trip_long_runs() -> Result<()> {
        let mut data = vec![0u8; 300_000];
        data.extend(std::iter::repeat(b'z').take(10_000));
        data.extend(pseudo_random(5_000, 7));
        data.extend(vec![0u8; 20_000]);
        assert_eq!(decompress(&compress(&data)?)?, data);

        Ok(())
    }

    #[test]
    fn truncated_prefix_is_rejected() {
        assert!(matches!(decompress(&[0x01, 0x00]), Err(Error::Lzhuf(_))));
    }

    #[test]
    fn truncated_stream_is_rejected() -> Result<()> {
        let data = pseudo_random(1000, 3);
        let packed = compress(&data)?;
        assert!(decompress(&packed[..packed.len() / 2]).is_err());

        Ok(())
    }

    #[test]
    fn overstated_length_is_rejected() -> Result<()> {
        let mut packed = compress(b"hello hello hello hello world")?;
        packed[0] = 0xFF;
        packed[1] = 0xFF;
        assert!(decompress(&packed).is_err());

        Ok(())
    }
}
