//! Checksum index over discovered files.

use std::collections::HashMap;
use std::sync::Arc;

use crate::checksum::ChecksumBitmask;
use crate::dat::Rom;
use crate::file::DiscoveredFile;

type Bucket = Vec<Arc<DiscoveredFile>>;

/// Discovered files indexed by checksum.
///
/// CRC32 is keyed together with the file size, since CRC32 alone collides
/// too easily across a large collection. Keys are lowercase hex on both
/// sides. Within a bucket files keep their discovery order.
#[derive(Debug, Default)]
pub struct IndexedFiles {
    files: Vec<Arc<DiscoveredFile>>,
    crc32: HashMap<String, Bucket>,
    md5: HashMap<String, Bucket>,
    sha1: HashMap<String, Bucket>,
    sha256: HashMap<String, Bucket>,
}

impl IndexedFiles {
    pub fn from_files(files: impl IntoIterator<Item = Arc<DiscoveredFile>>) -> Self {
        let mut index = Self::default();

        for file in files {
            let checksums = file.checksums();
            if let Some(crc32) = &checksums.crc32 {
                index
                    .crc32
                    .entry(crc32_key(crc32, file.size()))
                    .or_default()
                    .push(Arc::clone(&file));
            }
            if let Some(md5) = &checksums.md5 {
                index.md5.entry(md5.to_ascii_lowercase()).or_default().push(Arc::clone(&file));
            }
            if let Some(sha1) = &checksums.sha1 {
                index.sha1.entry(sha1.to_ascii_lowercase()).or_default().push(Arc::clone(&file));
            }
            if let Some(sha256) = &checksums.sha256 {
                index
                    .sha256
                    .entry(sha256.to_ascii_lowercase())
                    .or_default()
                    .push(Arc::clone(&file));
            }
            index.files.push(file);
        }

        tracing::debug!(
            files = index.files.len(),
            tiers = %index.tiers(),
            "Indexed discovered files"
        );
        index
    }

    /// Files matching `rom`, from the strongest checksum both sides have.
    ///
    /// Tries SHA256, SHA1, MD5, then CRC32 with size. A tier is only used if
    /// the ROM declares that checksum and some file matches it.
    pub fn find_files(&self, rom: &Rom) -> Option<&[Arc<DiscoveredFile>]> {
        let lookups = [
            (rom.sha256.as_deref(), &self.sha256),
            (rom.sha1.as_deref(), &self.sha1),
            (rom.md5.as_deref(), &self.md5),
        ];

        for (checksum, map) in lookups {
            if let Some(found) = checksum.and_then(|c| map.get(&c.to_ascii_lowercase())) {
                return Some(found.as_slice());
            }
        }

        rom.crc32
            .as_deref()
            .and_then(|crc32| self.crc32.get(&crc32_key(crc32, rom.size)))
            .map(Vec::as_slice)
    }

    /// Every indexed file, in discovery order.
    pub fn files(&self) -> &[Arc<DiscoveredFile>] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Which checksum tiers have at least one file.
    pub fn tiers(&self) -> ChecksumBitmask {
        let mut tiers = ChecksumBitmask::NONE;
        for (map, flag) in [
            (&self.crc32, ChecksumBitmask::CRC32),
            (&self.md5, ChecksumBitmask::MD5),
            (&self.sha1, ChecksumBitmask::SHA1),
            (&self.sha256, ChecksumBitmask::SHA256),
        ] {
            if !map.is_empty() {
                tiers |= flag;
            }
        }
        tiers
    }
}

fn crc32_key(crc32: &str, size: u64) -> String {
    format!("{}|{}", crc32.to_ascii_lowercase(), size)
}
