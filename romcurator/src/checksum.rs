//! File checksums.
//!
//! Every hashed file gets a CRC32. MD5, SHA1 and SHA256 are only computed
//! when a [`ChecksumBitmask`] asks for them, since they cost far more than
//! CRC32 on large disc images. The input is read once and fed to every
//! requested hasher.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Read buffer size for hashing.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Errors raised while hashing.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A checksum name was not recognised.
    #[error("Unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The blocking hash task panicked or was cancelled.
    #[error("Hash task failed: {0}")]
    TaskFailed(String),
}

pub type ChecksumResult<T> = Result<T, ChecksumError>;

/// A set of checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChecksumBitmask(u8);

impl ChecksumBitmask {
    pub const NONE: Self = Self(0);
    pub const CRC32: Self = Self(1);
    pub const MD5: Self = Self(1 << 1);
    pub const SHA1: Self = Self(1 << 2);
    pub const SHA256: Self = Self(1 << 3);

    /// Whether every algorithm in `other` is in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parses a comma separated list such as `"crc32,sha1"`.
    pub fn parse_list(list: &str) -> ChecksumResult<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Self::NONE, |mask, name| Ok(mask | name.parse::<Self>()?))
    }
}

impl BitOr for ChecksumBitmask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChecksumBitmask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromStr for ChecksumBitmask {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crc32" | "crc" => Ok(Self::CRC32),
            "md5" => Ok(Self::MD5),
            "sha1" => Ok(Self::SHA1),
            "sha256" => Ok(Self::SHA256),
            other => Err(ChecksumError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ChecksumBitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::CRC32, "crc32"),
            (Self::MD5, "md5"),
            (Self::SHA1, "sha1"),
            (Self::SHA256, "sha256"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join(","))
    }
}

/// Checksums of one file, as lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Checksums {
    pub crc32: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
}

impl Checksums {
    /// Checksums with only a CRC32.
    pub fn from_crc32(crc32: impl Into<String>) -> Self {
        Self {
            crc32: Some(crc32.into().to_ascii_lowercase()),
            ..Self::default()
        }
    }

    /// The algorithms present.
    pub fn bitmask(&self) -> ChecksumBitmask {
        let mut mask = ChecksumBitmask::NONE;
        if self.crc32.is_some() {
            mask |= ChecksumBitmask::CRC32;
        }
        if self.md5.is_some() {
            mask |= ChecksumBitmask::MD5;
        }
        if self.sha1.is_some() {
            mask |= ChecksumBitmask::SHA1;
        }
        if self.sha256.is_some() {
            mask |= ChecksumBitmask::SHA256;
        }
        mask
    }
}

/// Streams data through every requested hasher.
struct MultiHasher {
    crc32: crc32fast::Hasher,
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
}

impl MultiHasher {
    fn new(bitmask: ChecksumBitmask) -> Self {
        Self {
            crc32: crc32fast::Hasher::new(),
            md5: bitmask.contains(ChecksumBitmask::MD5).then(Md5::new),
            sha1: bitmask.contains(ChecksumBitmask::SHA1).then(Sha1::new),
            sha256: bitmask.contains(ChecksumBitmask::SHA256).then(Sha256::new),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.crc32.update(data);
        if let Some(md5) = self.md5.as_mut() {
            md5.update(data);
        }
        if let Some(sha1) = self.sha1.as_mut() {
            sha1.update(data);
        }
        if let Some(sha256) = self.sha256.as_mut() {
            sha256.update(data);
        }
    }

    fn finish(self) -> Checksums {
        Checksums {
            crc32: Some(format!("{:08x}", self.crc32.finalize())),
            md5: self.md5.map(|h| format!("{:x}", h.finalize())),
            sha1: self.sha1.map(|h| format!("{:x}", h.finalize())),
            sha256: self.sha256.map(|h| format!("{:x}", h.finalize())),
        }
    }
}

/// Hashes an in-memory buffer. CRC32 is always included.
pub fn hash_bytes(data: &[u8], bitmask: ChecksumBitmask) -> Checksums {
    let mut hasher = MultiHasher::new(bitmask);
    hasher.update(data);
    hasher.finish()
}

/// Hashes a file, returning its checksums and size in bytes.
pub fn hash_file(path: &Path, bitmask: ChecksumBitmask) -> ChecksumResult<(Checksums, u64)> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = MultiHasher::new(bitmask);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok((hasher.finish(), size))
}

/// [`hash_file`] on the blocking thread pool.
pub async fn hash_file_async(
    path: PathBuf,
    bitmask: ChecksumBitmask,
) -> ChecksumResult<(Checksums, u64)> {
    tokio::task::spawn_blocking(move || hash_file(&path, bitmask))
        .await
        .map_err(|e| ChecksumError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ALL: ChecksumBitmask = ChecksumBitmask(0b1111);

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            hash_bytes(b"123456789", ChecksumBitmask::CRC32).crc32.as_deref(),
            Some("cbf43926")
        );

        let empty = hash_bytes(b"", ALL);
        assert_eq!(empty.crc32.as_deref(), Some("00000000"));
        assert_eq!(empty.md5.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));

        let abc = hash_bytes(b"abc", ALL);
        assert_eq!(abc.sha1.as_deref(), Some("a9993e364706816aba3e25717850c26c9cd0d89d"));
        assert_eq!(
            abc.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_crc32_always_computed() {
        let checksums = hash_bytes(b"abc", ChecksumBitmask::NONE);
        assert!(checksums.crc32.is_some());
        assert!(checksums.md5.is_none());
        assert!(checksums.sha1.is_none());
        assert!(checksums.sha256.is_none());
    }

    #[test]
    fn test_parse_list() {
        let mask = ChecksumBitmask::parse_list("crc32, SHA1").unwrap();
        assert!(mask.contains(ChecksumBitmask::CRC32));
        assert!(mask.contains(ChecksumBitmask::SHA1));
        assert!(!mask.contains(ChecksumBitmask::MD5));
        assert_eq!(mask.to_string(), "crc32,sha1");

        assert!(matches!(
            ChecksumBitmask::parse_list("crc32,whirlpool"),
            Err(ChecksumError::UnknownAlgorithm(name)) if name == "whirlpool"
        ));
        assert!(ChecksumBitmask::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();

        let (checksums, size) = hash_file(file.path(), ChecksumBitmask::SHA1).unwrap();
        assert_eq!(size, data.len() as u64);
        assert_eq!(checksums, hash_bytes(&data, ChecksumBitmask::SHA1));
    }

    #[test]
    fn test_hash_missing_file() {
        let err = hash_file(Path::new("/nonexistent/file.rom"), ChecksumBitmask::CRC32).unwrap_err();
        assert!(matches!(err, ChecksumError::Io { .. }));
    }

    #[test]
    fn test_checksums_bitmask() {
        let checksums = Checksums {
            sha1: Some("x".into()),
            ..Checksums::from_crc32("ABCDEF01")
        };
        assert_eq!(checksums.crc32.as_deref(), Some("abcdef01"));
        assert_eq!(
            checksums.bitmask(),
            ChecksumBitmask::CRC32 | ChecksumBitmask::SHA1
        );
    }

    #[tokio::test]
    async fn test_hash_file_async() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"123456789").unwrap();

        let (checksums, size) = hash_file_async(file.path().to_path_buf(), ChecksumBitmask::CRC32)
            .await
            .unwrap();
        assert_eq!(size, 9);
        assert_eq!(checksums.crc32.as_deref(), Some("cbf43926"));
    }
}
