//! Chunk framing shared by every DB archive revision.
//!
//! An archive is a flat sequence of chunks, each introduced by an 8 byte header:
//!
//! | Offset | Field | Description                                                      |
//! |--------|-------|------------------------------------------------------------------|
//! | 0x00   | id    | 4 bytes: chunk identifier, bit 31 marks an LZHUF payload          |
//! | 0x04   | size  | 4 bytes: number of payload bytes following the header            |
//!
//! Chunks are located by scanning from the start of the buffer. The compressed flag is
//! ignored while matching identifiers.

use std::borrow::Cow;
use std::io::{self, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::lzhuf;
use crate::scrambler::Scrambler;

/// Bit set in a chunk id when its payload is LZHUF compressed
pub const CHUNK_COMPRESSED: u32 = 0x8000_0000;

/// Chunk holding the concatenated file payloads
pub const DB_CHUNK_DATA: u32 = 0;

/// Chunk holding the directory table
pub const DB_CHUNK_HEADER: u32 = 1;

/// Chunk holding opaque user data (XDB only)
pub const DB_CHUNK_USERDATA: u32 = 0x29a;

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 8;

/// On-disk chunk header
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct ChunkHeader {
    /// Raw identifier, including the [`CHUNK_COMPRESSED`] flag
    pub id: u32,

    /// Payload size in bytes
    pub size: u32,
}

impl ChunkHeader {
    /// Identifier with the compressed flag masked off
    pub const fn chunk_id(&self) -> u32 {
        self.id & !CHUNK_COMPRESSED
    }

    /// Whether the payload is LZHUF compressed
    pub const fn is_compressed(&self) -> bool {
        self.id & CHUNK_COMPRESSED != 0
    }
}

/// A chunk located inside a buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk<'a> {
    /// Header as stored
    pub header: ChunkHeader,

    /// Offset of the header from the start of the buffer
    pub offset: usize,

    /// Raw payload, still compressed and/or encrypted
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Identifier with the compressed flag masked off
    pub const fn id(&self) -> u32 {
        self.header.chunk_id()
    }

    /// Whether the payload is LZHUF compressed
    pub const fn is_compressed(&self) -> bool {
        self.header.is_compressed()
    }

    /// Payload with LZHUF compression removed when flagged
    pub fn contents(&self) -> Result<Cow<'a, [u8]>> {
        if self.is_compressed() {
            Ok(Cow::Owned(lzhuf::decompress(self.data)?))
        } else {
            Ok(Cow::Borrowed(self.data))
        }
    }

    /// Payload decrypted with `scrambler` and then decompressed, when flagged as compressed.
    ///
    /// Uncompressed chunks are returned untouched.
    pub fn contents_scrambled(&self, scrambler: &Scrambler) -> Result<Cow<'a, [u8]>> {
        if self.is_compressed() {
            let decrypted = scrambler.decrypt(self.data);
            Ok(Cow::Owned(lzhuf::decompress(&decrypted)?))
        } else {
            Ok(Cow::Borrowed(self.data))
        }
    }
}

/// Read-only view over a chunked buffer
///
/// ```
/// # fn doit() -> xray_db::error::Result<()>
/// # {
/// use xray_db::chunk::{ChunkReader, DB_CHUNK_DATA};
///
/// let buffer = [0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD];
/// let reader = ChunkReader::new(&buffer);
///
/// let data = reader.open_chunk(DB_CHUNK_DATA)?.expect("data chunk");
/// assert_eq!(&*data, &[0xAB, 0xCD]);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
}

impl<'a> ChunkReader<'a> {
    /// Wrap a buffer holding a sequence of chunks
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Iterate over every chunk in file order
    pub fn chunks(&self) -> Chunks<'a> {
        Chunks {
            data: self.data,
            offset: 0,
            done: false,
        }
    }

    /// Locate the first chunk with the given id, ignoring the compressed flag.
    ///
    /// Returns `Ok(None)` when the scan reaches the end of the buffer without a match. A chunk
    /// that overruns the buffer before the match is found is reported as an error.
    #[instrument(level = "trace", skip(self), err)]
    pub fn find_chunk(&self, id: u32) -> Result<Option<Chunk<'a>>> {
        for chunk in self.chunks() {
            let chunk = chunk?;
            if chunk.id() == id {
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }

    /// Open a chunk, decompressing its payload when flagged
    pub fn open_chunk(&self, id: u32) -> Result<Option<Cow<'a, [u8]>>> {
        self.find_chunk(id)?.map(|c| c.contents()).transpose()
    }

    /// Open a chunk whose compressed payload is also encrypted
    pub fn open_chunk_scrambled(
        &self,
        id: u32,
        scrambler: &Scrambler,
    ) -> Result<Option<Cow<'a, [u8]>>> {
        self.find_chunk(id)?
            .map(|c| c.contents_scrambled(scrambler))
            .transpose()
    }
}

/// Sequential iterator over the chunks of a buffer, see [`ChunkReader::chunks`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }

        let offset = self.offset;
        let remaining = &self.data[offset..];
        if remaining.len() < CHUNK_HEADER_SIZE {
            self.done = true;
            return Some(Err(Error::TruncatedChunk { offset }));
        }

        let header = match ChunkHeader::read(&mut io::Cursor::new(remaining)) {
            Ok(header) => header,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };

        let available = remaining.len() - CHUNK_HEADER_SIZE;
        let size = header.size as usize;
        if size > available {
            self.done = true;
            return Some(Err(Error::ChunkOverrun {
                id: header.id,
                offset,
                size: header.size,
                available,
            }));
        }

        trace!(id = header.id, size, offset, "chunk");
        let start = offset + CHUNK_HEADER_SIZE;
        self.offset = start + size;
        Some(Ok(Chunk {
            header,
            offset,
            data: &self.data[start..start + size],
        }))
    }
}

/// Chunk writer over a seekable sink
///
/// Opened chunks form a stack. Closing a chunk seeks back to its header, patches the size and
/// returns to the end of the stream.
#[derive(Debug)]
pub struct ChunkWriter<W: Write + Seek> {
    inner: W,
    open_chunks: Vec<u64>,
}

impl<W: Write + Seek> ChunkWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            open_chunks: Vec::new(),
        }
    }

    /// Number of chunks currently open
    pub fn depth(&self) -> usize {
        self.open_chunks.len()
    }

    /// Current position in the underlying stream
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Write a chunk header with a placeholder size and push the payload start
    #[instrument(level = "trace", skip(self), err)]
    pub fn open_chunk(&mut self, id: u32) -> Result<()> {
        ChunkHeader { id, size: 0 }.write(&mut self.inner)?;
        let start = self.inner.stream_position()?;
        self.open_chunks.push(start);
        Ok(())
    }

    /// Patch the size of the most recently opened chunk
    #[instrument(level = "trace", skip(self), err)]
    pub fn close_chunk(&mut self) -> Result<()> {
        let start = self.open_chunks.pop().ok_or(Error::UnbalancedChunk)?;
        let end = self.inner.stream_position()?;
        let size = u32::try_from(end - start).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "chunk exceeds 4 GiB")
        })?;

        self.inner.seek(SeekFrom::Start(start - 4))?;
        self.inner.write_u32::<LittleEndian>(size)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Write a complete chunk in one go
    pub fn write_chunk(&mut self, id: u32, data: &[u8]) -> Result<()> {
        self.open_chunk(id)?;
        self.inner.write_all(data)?;
        self.close_chunk()
    }

    /// Return the inner writer, failing if any chunk is left open
    #[instrument(level = "trace", skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        if !self.open_chunks.is_empty() {
            return Err(Error::UnclosedChunks(self.open_chunks.len()));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
