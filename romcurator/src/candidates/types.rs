use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::dat::{Parent, Rom, SingleValueGame};
use crate::file::DiscoveredFile;

/// A ROM paired with the file that satisfies it and the file it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomWithFiles {
    rom: Rom,
    input: Arc<DiscoveredFile>,
    output: DiscoveredFile,
}

impl RomWithFiles {
    pub fn new(rom: Rom, input: Arc<DiscoveredFile>, output: DiscoveredFile) -> Self {
        Self { rom, input, output }
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn input(&self) -> &Arc<DiscoveredFile> {
        &self.input
    }

    pub fn output(&self) -> &DiscoveredFile {
        &self.output
    }
}

/// A game variant whose every ROM has a matching input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCandidate {
    game: SingleValueGame,
    roms_with_files: Vec<RomWithFiles>,
}

impl WriteCandidate {
    pub fn new(game: SingleValueGame, roms_with_files: Vec<RomWithFiles>) -> Self {
        Self {
            game,
            roms_with_files,
        }
    }

    pub fn game(&self) -> &SingleValueGame {
        &self.game
    }

    pub fn name(&self) -> &str {
        self.game.name()
    }

    pub fn roms_with_files(&self) -> &[RomWithFiles] {
        &self.roms_with_files
    }

    pub fn rom_count(&self) -> usize {
        self.roms_with_files.len()
    }

    /// Whether any input has a patch to apply.
    pub fn is_patched(&self) -> bool {
        self.roms_with_files
            .iter()
            .any(|pair| pair.input.patch().is_some())
    }

    /// Sum of input sizes in bytes.
    pub fn total_input_size(&self) -> u64 {
        self.roms_with_files.iter().map(|pair| pair.input.size()).sum()
    }

    pub fn output_paths(&self) -> Vec<&Path> {
        self.roms_with_files
            .iter()
            .map(|pair| pair.output.path())
            .collect()
    }
}

impl fmt::Display for WriteCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ROM", self.name(), self.rom_count())?;
        if self.rom_count() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")
    }
}

/// Candidates grouped by parent, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ParentCandidates {
    entries: Vec<(Parent, Vec<Arc<WriteCandidate>>)>,
}

impl ParentCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: Parent, candidates: Vec<Arc<WriteCandidate>>) {
        self.entries.push((parent, candidates));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Parent, &[Arc<WriteCandidate>])> {
        self.entries
            .iter()
            .map(|(parent, candidates)| (parent, candidates.as_slice()))
    }

    /// Number of parents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every candidate, in order.
    pub fn candidates(&self) -> Vec<Arc<WriteCandidate>> {
        self.entries
            .iter()
            .flat_map(|(_, candidates)| candidates.iter().cloned())
            .collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.entries.iter().map(|(_, candidates)| candidates.len()).sum()
    }
}

impl IntoIterator for ParentCandidates {
    type Item = (Parent, Vec<Arc<WriteCandidate>>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
