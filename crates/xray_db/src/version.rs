//! Archive generations and their capabilities

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::scrambler::CipherConfig;

/// One of the historical DB archive layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbVersion {
    /// Build 1114 (`.xrp`), LZHUF compressed payloads
    V1114,
    /// Build 2215 (`.xp`, `.xp?`)
    V2215,
    /// Build 2945, adds a CRC per record
    V2945,
    /// Build 2947 and the Russian retail release, encrypted table
    V2947Ru,
    /// Worldwide retail release, encrypted table
    V2947Ww,
    /// Clear Sky / Call of Pripyat archives (`.db?`, `.xdb?`), optional user data
    Xdb,
}

impl DbVersion {
    /// Every supported version
    pub const ALL: [DbVersion; 6] = [
        DbVersion::V1114,
        DbVersion::V2215,
        DbVersion::V2945,
        DbVersion::V2947Ru,
        DbVersion::V2947Ww,
        DbVersion::Xdb,
    ];

    /// Guess the version from an archive's file extension
    ///
    /// ```
    /// use xray_db::DbVersion;
    ///
    /// assert_eq!(DbVersion::from_path("gamedata.db0"), Some(DbVersion::Xdb));
    /// assert_eq!(DbVersion::from_path("levels.xp3"), Some(DbVersion::V2215));
    /// assert_eq!(DbVersion::from_path("resources.pak"), None);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<DbVersion> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();

        let with_suffix = |stem: &str| match ext.strip_prefix(stem) {
            Some("") => true,
            Some(rest) => rest.len() == 1 && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
            None => false,
        };

        if with_suffix("db") || with_suffix("xdb") {
            Some(DbVersion::Xdb)
        } else if ext == "xrp" {
            Some(DbVersion::V1114)
        } else if with_suffix("xp") {
            Some(DbVersion::V2215)
        } else {
            None
        }
    }

    /// Pick the explicit version, falling back to extension detection
    pub fn resolve(explicit: Option<DbVersion>, path: impl AsRef<Path>) -> Result<DbVersion> {
        if let Some(version) = explicit {
            return Ok(version);
        }
        let path = path.as_ref();
        DbVersion::from_path(path).ok_or_else(|| Error::UnknownExtension(path.to_path_buf()))
    }

    /// Whether archives of this version can be written
    pub const fn is_writable(self) -> bool {
        matches!(
            self,
            DbVersion::V2947Ru | DbVersion::V2947Ww | DbVersion::Xdb
        )
    }

    /// Cipher protecting the directory table, if any
    pub const fn cipher(self) -> Option<CipherConfig> {
        match self {
            DbVersion::V2947Ru => Some(CipherConfig::Ru),
            DbVersion::V2947Ww => Some(CipherConfig::Ww),
            _ => None,
        }
    }

    /// Whether the archive may carry a user data chunk
    pub const fn has_userdata(self) -> bool {
        matches!(self, DbVersion::Xdb)
    }

    /// Short name used on the command line
    pub const fn name(self) -> &'static str {
        match self {
            DbVersion::V1114 => "11xx",
            DbVersion::V2215 => "2215",
            DbVersion::V2945 => "2945",
            DbVersion::V2947Ru => "2947ru",
            DbVersion::V2947Ww => "2947ww",
            DbVersion::Xdb => "xdb",
        }
    }
}

impl fmt::Display for DbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown version name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown archive version {0}")]
pub struct ParseVersionError(String);

impl FromStr for DbVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        DbVersion::ALL
            .into_iter()
            .find(|v| v.name() == lower || (lower == "1114" && *v == DbVersion::V1114))
            .ok_or_else(|| ParseVersionError(s.to_owned()))
    }
}
