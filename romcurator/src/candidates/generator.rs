//! Matches catalog games against discovered files.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{IndexedFiles, ParentCandidates, RomWithFiles, WriteCandidate};
use crate::dat::{Dat, Game, Parent, Rom, SingleValueGame};
use crate::file::DiscoveredFile;
use crate::output::OutputPathFormatter;

/// Builds write candidates for every game whose ROMs were all found.
pub struct CandidateGenerator {
    formatter: Arc<dyn OutputPathFormatter>,
}

impl CandidateGenerator {
    pub fn new(formatter: Arc<dyn OutputPathFormatter>) -> Self {
        Self { formatter }
    }

    /// Candidates for every parent of `dat`, in catalog order.
    ///
    /// Every parent appears in the result, with an empty list if none of its
    /// games could be satisfied.
    pub fn generate(&self, dat: &Dat, index: &IndexedFiles) -> ParentCandidates {
        let mut result = ParentCandidates::new();

        for parent in dat.parents() {
            let candidates = self.generate_for_parent(dat, parent, index);
            result.push(parent.clone(), candidates);
        }

        debug!(
            dat = %dat.name(),
            parents = result.len(),
            candidates = result.candidate_count(),
            "Generated candidates"
        );
        result
    }

    fn generate_for_parent(
        &self,
        dat: &Dat,
        parent: &Parent,
        index: &IndexedFiles,
    ) -> Vec<Arc<WriteCandidate>> {
        parent
            .games()
            .iter()
            .flat_map(|game| self.generate_for_game(dat, game, index))
            .map(Arc::new)
            .collect()
    }

    fn generate_for_game(
        &self,
        dat: &Dat,
        game: &Arc<Game>,
        index: &IndexedFiles,
    ) -> Vec<WriteCandidate> {
        if game.roms.is_empty() {
            trace!(dat = %dat.name(), game = %game.name, "Game has no ROMs");
            return Vec::new();
        }

        let mut found: Vec<(&Rom, Arc<DiscoveredFile>)> = Vec::with_capacity(game.roms.len());
        let mut missing: Vec<&str> = Vec::new();
        for rom in &game.roms {
            match index.find_files(rom).and_then(preferred_input) {
                Some(input) => found.push((rom, input)),
                None => missing.push(&rom.name),
            }
        }

        if !missing.is_empty() {
            if !found.is_empty() {
                debug!(
                    dat = %dat.name(),
                    game = %game.name,
                    found = found.len(),
                    missing = ?missing,
                    "Game is missing ROMs"
                );
            }
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        'variants: for variant in SingleValueGame::expand(game) {
            let mut pairs: Vec<RomWithFiles> = Vec::with_capacity(found.len());
            let mut pair_keys = HashSet::new();

            for (rom, input) in &found {
                let output_path = match self.formatter.format(dat, &variant, rom, input) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(
                            dat = %dat.name(),
                            game = %game.name,
                            rom = %rom.name,
                            error = %e,
                            "Skipping game, no output path"
                        );
                        continue 'variants;
                    }
                };

                if !pair_keys.insert((input.to_string(), output_path.clone())) {
                    continue;
                }

                let output = DiscoveredFile::new(output_path, rom.size, rom.checksums());
                pairs.push(RomWithFiles::new((*rom).clone(), Arc::clone(input), output));
            }

            // Variants that render to the same files are the same candidate.
            let mut identity: Vec<(String, std::path::PathBuf)> = pairs
                .iter()
                .map(|pair| (pair.input().to_string(), pair.output().path().to_path_buf()))
                .collect();
            identity.sort();
            if !seen.insert(identity) {
                continue;
            }

            candidates.push(WriteCandidate::new(variant, pairs));
        }

        candidates
    }
}

/// The first raw file if there is one, otherwise the first archive member.
fn preferred_input(files: &[Arc<DiscoveredFile>]) -> Option<Arc<DiscoveredFile>> {
    files
        .iter()
        .find(|file| !file.is_archive_entry())
        .or_else(|| files.first())
        .cloned()
}
