//! Error types that can be emitted from this library

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::version::DbVersion;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// no archive format was selected and none could be detected
    #[error("archive format is not specified")]
    #[diagnostic(help("pass one of --11xx, --2215, --2945, --2947ru, --2947ww or --xdb"))]
    UnspecifiedVersion,

    /// the file extension does not map to a known archive format
    #[error("unable to detect the archive format of {}", .0.display())]
    UnknownExtension(PathBuf),

    /// the archive format can be read but not written
    #[error("writing {0} archives is not supported")]
    UnsupportedVersion(DbVersion),

    /// user data can only be stored in XDB archives
    #[error("{0} archives cannot carry user data")]
    UserdataNotSupported(DbVersion),

    /// source path does not exist
    #[error("source {} does not exist", .0.display())]
    SourceNotFound(PathBuf),

    /// a required chunk is absent
    #[error("chunk {id:#x} not found")]
    ChunkNotFound {
        /// identifier that was searched for
        id: u32,
    },

    /// fewer than 8 bytes remain where a chunk header was expected
    #[error("truncated chunk header at offset {offset}")]
    TruncatedChunk {
        /// offset of the partial header
        offset: usize,
    },

    /// a chunk claims more bytes than the buffer holds
    #[error("chunk {id:#x} at offset {offset} declares {size} bytes, only {available} available")]
    ChunkOverrun {
        /// raw identifier as stored, including the compressed flag
        id: u32,
        /// offset of the chunk header
        offset: usize,
        /// declared payload size
        size: u32,
        /// bytes remaining after the header
        available: usize,
    },

    /// `close_chunk` was called with nothing open
    #[error("close_chunk called with no open chunk")]
    UnbalancedChunk,

    /// the writer was finalized while chunks were still open
    #[error("{0} chunk(s) still open at finalization")]
    UnclosedChunks(usize),

    /// the directory table could not be decoded
    #[error("invalid directory table record at offset {offset}")]
    InvalidTable {
        /// offset of the record inside the decoded table
        offset: u64,
        /// underlying decode failure
        #[source]
        source: binrw::Error,
    },

    /// an entry points outside of the archive
    #[error("entry {name} spans {offset}..{end} outside of the {len} byte archive")]
    EntryOutOfBounds {
        /// entry name
        name: String,
        /// start of the payload
        offset: u64,
        /// end of the payload
        end: u64,
        /// archive size
        len: usize,
    },

    /// malformed LZHUF stream
    #[error("lzhuf: {0}")]
    Lzhuf(&'static str),

    /// malformed LZO stream
    #[error("lzo: {0}")]
    Lzo(&'static str),

    /// decompressed payload does not have the expected size
    #[error("decompressed {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// size recorded in the directory table
        expected: u64,
        /// size produced by the decoder
        actual: u64,
    },

    /// a path cannot be stored in a 16 bit record length
    #[error("name {0} is too long to be stored")]
    NameTooLong(String),

    /// a stored name has no equivalent path on this platform
    #[error("name {0} cannot be represented as a path on this platform")]
    UndecodableName(String),

    /// an entry path would escape the destination directory
    #[error("refusing to write unsafe path {0}")]
    UnsafePath(String),

    /// writing payload bytes before [`crate::DbWriter::start_file`]
    #[error("no file has been started")]
    NoFileStarted,

    /// user data must precede every file
    #[error("user data must be written before the first file")]
    UserdataAfterData,

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by name {0}
    #[error("by name {0}")]
    Name(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
