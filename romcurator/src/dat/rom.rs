use serde::{Deserialize, Serialize};

use crate::checksum::Checksums;
use crate::file::DiscoveredFile;

/// A file a catalog expects to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rom {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Rom {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            crc32: None,
            md5: None,
            sha1: None,
            sha256: None,
        }
    }

    pub fn with_crc32(mut self, crc32: impl Into<String>) -> Self {
        self.crc32 = Some(crc32.into().to_ascii_lowercase());
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into().to_ascii_lowercase());
        self
    }

    pub fn with_sha1(mut self, sha1: impl Into<String>) -> Self {
        self.sha1 = Some(sha1.into().to_ascii_lowercase());
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// Rebuilds a ROM from a file that will satisfy it.
    pub fn from_file(name: impl Into<String>, file: &DiscoveredFile) -> Self {
        let checksums = file.checksums();
        Self {
            name: name.into(),
            size: file.size(),
            crc32: checksums.crc32.clone(),
            md5: checksums.md5.clone(),
            sha1: checksums.sha1.clone(),
            sha256: checksums.sha256.clone(),
        }
    }

    /// The declared checksums.
    pub fn checksums(&self) -> Checksums {
        Checksums {
            crc32: self.crc32.clone(),
            md5: self.md5.clone(),
            sha1: self.sha1.clone(),
            sha256: self.sha256.clone(),
        }
    }

    /// Lowercases every declared checksum. Catalogs are not consistent
    /// about hex case.
    pub(crate) fn normalize(&mut self) {
        for checksum in [&mut self.crc32, &mut self.md5, &mut self.sha1, &mut self.sha256] {
            if let Some(value) = checksum.as_mut() {
                value.make_ascii_lowercase();
            }
        }
    }
}
