//! This library handles reading from and creating **DB** archives used by the *X-Ray* engine
//! (*S.T.A.L.K.E.R.*).
//!
//! # DB Archive Format Documentation
//!
//! A DB archive packs a game resource tree into a single file. Five generations of the format
//! shipped over the engine's lifetime; they share the chunk framing and differ in the layout of
//! the directory table and in how it is protected.
//!
//! | Version  | Extensions            | Table record                        | Table protection  | Write |
//! |----------|-----------------------|-------------------------------------|-------------------|-------|
//! | `11xx`   | `.xrp`                | name, flag, offset, size            | LZHUF             | no    |
//! | `2215`   | `.xp`, `.xp?`         | name, offset, real, compressed      | LZHUF             | no    |
//! | `2945`   | -                     | name, crc, offset, real, compressed | LZHUF             | no    |
//! | `2947ru` | -                     | see [`types::Record2947`]           | LZHUF + RU cipher | yes   |
//! | `2947ww` | -                     | see [`types::Record2947`]           | LZHUF + WW cipher | yes   |
//! | `xdb`    | `.db`, `.db?`, `.xdb?`| see [`types::Record2947`]           | LZHUF             | yes   |
//!
//! ## File Structure
//!
//! The archive is a flat sequence of chunks (see [`chunk`]):
//!
//! | Chunk id       | Name     | Contents                                                  |
//! |----------------|----------|-----------------------------------------------------------|
//! | `0x29a`        | USERDATA | Optional, XDB only: opaque bytes, usually an LTX section  |
//! | `0x0`          | DATA     | File payloads, back to back                               |
//! | `0x80000001`   | HEADER   | Directory table, LZHUF compressed and possibly encrypted  |
//!
//! ### Directory Table
//!
//! The decompressed HEADER chunk is a run of records, one per file or folder, with no count
//! and no terminator. Offsets are absolute positions in the archive file; since the DATA chunk
//! header occupies the first bytes of the payload area, an offset of `0` marks a folder.
//!
//! Names are stored with `\` separators and exposed with `/`.
//! They carry no declared encoding; legacy archives often use cp1251, so the stored bytes are
//! kept alongside the decoded form.
//!
//! ### Payloads
//!
//! - `11xx`: stored verbatim when the flag is set, LZHUF with a length prefix otherwise
//! - `2215` and later: LZO1X when the real and compressed sizes differ, verbatim otherwise
//!
//! Archives written by this crate always store payloads verbatim.
//!
//! ## Additional Information
//!
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Checksums**: CRC-32 (ISO-HDLC) over the stored bytes of each file
//!

use crc::{Crc, CRC_32_ISO_HDLC};

pub mod chunk;
pub mod error;
pub mod lzhuf;
pub mod lzo;
pub mod pack;
pub mod read;
pub mod scrambler;
pub mod table;
pub mod types;
pub mod unpack;
pub mod version;
pub mod write;

pub use pack::{PackOptions, PackReport, Packer};
pub use read::{DbArchive, DbFile};
pub use types::{FileEntry, PayloadCompression};
pub use unpack::{UnpackOptions, UnpackReport, Unpacker};
pub use version::DbVersion;
pub use write::DbWriter;

/// Checksum recorded for every file of a 2945 or later archive
pub(crate) static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
