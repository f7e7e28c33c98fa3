//! Derives patched candidates.
//!
//! For every candidate whose input files match a known patch, a new game is
//! synthesized that writes the patched ROM instead. Every original candidate
//! is kept; each derived candidate gets a parent of its own, placed right
//! after the parent it was derived from.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, trace};

use super::{ParentCandidates, RomWithFiles, WriteCandidate};
use crate::checksum::Checksums;
use crate::dat::{Dat, Parent, Rom};
use crate::patch::Patch;

/// Generates patched candidates from a set of patches.
pub struct PatchCandidateGenerator;

impl PatchCandidateGenerator {
    pub fn generate(dat: &Dat, candidates: ParentCandidates, patches: &[Arc<Patch>]) -> ParentCandidates {
        if candidates.is_empty() || patches.is_empty() {
            return candidates;
        }

        let by_crc = index_by_crc_before(patches);
        trace!(dat = %dat.name(), unique_crcs = by_crc.len(), "Indexed patches");

        let mut result = ParentCandidates::new();
        let mut derived_count = 0usize;

        for (parent, parent_candidates) in candidates {
            let mut derived: Vec<(Parent, Vec<Arc<WriteCandidate>>)> = Vec::new();
            let mut seen_games: HashSet<String> = HashSet::new();

            for candidate in &parent_candidates {
                // One patched game per game, not per region/language variant.
                if !seen_games.insert(candidate.name().to_string()) {
                    continue;
                }

                for patch in matching_patches(candidate, &by_crc) {
                    let patched = patch_candidate(candidate, &patch);
                    debug!(
                        dat = %dat.name(),
                        game = %candidate.name(),
                        patched_game = %patched.name(),
                        patch = %patch.path().display(),
                        "Generated patched candidate"
                    );
                    let parent = Parent::new(patched.name(), vec![Arc::clone(patched.game().game())]);
                    derived.push((parent, vec![Arc::new(patched)]));
                }
            }

            derived_count += derived.len();
            result.push(parent, parent_candidates);
            for (parent, patched) in derived {
                result.push(parent, patched);
            }
        }

        debug!(dat = %dat.name(), derived = derived_count, "Generated patched candidates");
        result
    }
}

fn index_by_crc_before(patches: &[Arc<Patch>]) -> HashMap<&str, Vec<Arc<Patch>>> {
    let mut index: HashMap<&str, Vec<Arc<Patch>>> = HashMap::new();
    for patch in patches {
        index.entry(patch.crc_before()).or_default().push(Arc::clone(patch));
    }
    index
}

/// Patches applying to any input of `candidate`, in input order, each once.
fn matching_patches(
    candidate: &WriteCandidate,
    by_crc: &HashMap<&str, Vec<Arc<Patch>>>,
) -> Vec<Arc<Patch>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    candidate
        .roms_with_files()
        .iter()
        .filter_map(|pair| pair.input().crc32())
        .filter_map(|crc32| by_crc.get(crc32))
        .flatten()
        .filter(|patch| seen.insert(patch.path().to_path_buf()))
        .cloned()
        .collect()
}

/// Builds the candidate `patch` turns `candidate` into.
fn patch_candidate(candidate: &WriteCandidate, patch: &Arc<Patch>) -> WriteCandidate {
    let pairs: Vec<RomWithFiles> = candidate
        .roms_with_files()
        .iter()
        .map(|pair| {
            if pair.input().crc32() != Some(patch.crc_before()) {
                return pair.clone();
            }

            let file_name = format!("{}{}", patch.rom_name(), extension_of(&pair.rom().name));
            let output_path = pair
                .output()
                .path()
                .parent()
                .map(|dir| dir.join(&file_name))
                .unwrap_or_else(|| PathBuf::from(&file_name));

            let checksums = Checksums {
                crc32: patch.crc_after().map(str::to_string),
                ..Checksums::default()
            };
            let size = patch.size_after().unwrap_or_else(|| pair.output().size());
            let output = pair
                .output()
                .with_path(output_path)
                .with_contents(size, checksums);

            let rom_name = sibling_name(&pair.rom().name, &file_name);
            let rom = Rom::from_file(rom_name, &output);
            let input = Arc::new(pair.input().with_patch(Arc::clone(patch)));

            RomWithFiles::new(rom, input, output)
        })
        .collect();

    let roms = pairs.iter().map(|pair| pair.rom().clone()).collect();
    let game_name = sibling_name(candidate.name(), patch.rom_name());
    let game = candidate.game().renamed(game_name, roms);

    WriteCandidate::new(game, pairs)
}

/// Every trailing extension of a file name, e.g. `.nes` or `.tar.gz`.
fn extension_of(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"[^.]+((?:\.[a-zA-Z0-9]+)+)$").expect("valid extension regex")
    });

    let file_name = Path::new(&name.replace('\\', "/"))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    pattern
        .captures(&file_name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Replaces the last path segment of `name`, keeping its directories.
fn sibling_name(name: &str, new_last: &str) -> String {
    match name.replace('\\', "/").rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, new_last),
        None => new_last.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::{Game, Release, SingleValueGame};
    use crate::file::DiscoveredFile;
    use crate::patch::PatchFormat;

    fn two_rom_candidates() -> (Dat, ParentCandidates) {
        let game = Game::new("Game")
            .with_release(Release::new("Game", "USA", None))
            .with_rom(Rom::new("disc.bin", 4).with_crc32("11111111"))
            .with_rom(Rom::new("disc.cue", 4).with_crc32("22222222"));
        let dat = Dat::new("Test", vec![game]);
        let game = Arc::clone(&dat.games()[0]);

        let pairs = game
            .roms
            .iter()
            .map(|rom| {
                let input = Arc::new(DiscoveredFile::new(
                    format!("in/{}", rom.name),
                    rom.size,
                    rom.checksums(),
                ));
                let output = DiscoveredFile::new(format!("out/Game/{}", rom.name), rom.size, rom.checksums());
                RomWithFiles::new(rom.clone(), input, output)
            })
            .collect();

        let candidate = WriteCandidate::new(SingleValueGame::expand(&game).remove(0), pairs);
        let mut candidates = ParentCandidates::new();
        candidates.push(dat.parents()[0].clone(), vec![Arc::new(candidate)]);
        (dat, candidates)
    }

    #[test]
    fn test_two_patches_on_two_inputs() {
        let (dat, candidates) = two_rom_candidates();
        let patches = vec![
            Arc::new(Patch::new("p/Game Hack.ips", PatchFormat::Ips, "11111111", "Game Hack")),
            Arc::new(
                Patch::new("p/Game Fix.bps", PatchFormat::Bps, "22222222", "Game Fix")
                    .with_target("33333333", 6),
            ),
        ];

        let result = PatchCandidateGenerator::generate(&dat, candidates, &patches);
        assert_eq!(result.len(), 3);
        assert_eq!(result.candidate_count(), 3);

        let all = result.candidates();
        assert_eq!(all[0].name(), "Game");
        assert!(!all[0].is_patched());

        let hack = &all[1];
        assert_eq!(hack.name(), "Game Hack");
        assert!(hack.is_patched());
        let bin = &hack.roms_with_files()[0];
        assert_eq!(bin.output().path(), Path::new("out/Game/Game Hack.bin"));
        assert_eq!(bin.rom().name, "Game Hack.bin");
        assert_eq!(bin.input().patch().unwrap().rom_name(), "Game Hack");
        // The other ROM is untouched.
        assert_eq!(hack.roms_with_files()[1], all[0].roms_with_files()[1]);

        let fix = &all[2];
        let cue = &fix.roms_with_files()[1];
        assert_eq!(cue.output().path(), Path::new("out/Game/Game Fix.cue"));
        assert_eq!(cue.output().size(), 6);
        assert_eq!(cue.output().crc32(), Some("33333333"));
        assert_eq!(cue.rom().crc32.as_deref(), Some("33333333"));
    }

    #[test]
    fn test_release_renamed() {
        let (dat, candidates) = two_rom_candidates();
        let patches = vec![Arc::new(Patch::new(
            "p/Game Hack.ips",
            PatchFormat::Ips,
            "11111111",
            "Game Hack",
        ))];

        let result = PatchCandidateGenerator::generate(&dat, candidates, &patches);
        let (parent, patched) = result.iter().nth(1).unwrap();
        assert_eq!(parent.name(), "Game Hack");
        let release = patched[0].game().release().unwrap();
        assert_eq!(release.name, "Game Hack");
        assert_eq!(release.region, "USA");
        // Still the same catalog game.
        assert!(Arc::ptr_eq(patched[0].game().source(), &dat.games()[0]));
    }

    #[test]
    fn test_no_matching_patch_returns_originals() {
        let (dat, candidates) = two_rom_candidates();
        let patches = vec![Arc::new(Patch::new("p/x.ips", PatchFormat::Ips, "99999999", "Other"))];

        let result = PatchCandidateGenerator::generate(&dat, candidates, &patches);
        assert_eq!(result.len(), 1);
        assert_eq!(result.candidate_count(), 1);
    }

    #[test]
    fn test_variants_of_one_game_patched_once() {
        let (dat, mut candidates) = two_rom_candidates();
        let original = candidates.candidates()[0].clone();
        candidates = {
            let mut doubled = ParentCandidates::new();
            doubled.push(dat.parents()[0].clone(), vec![Arc::clone(&original), original]);
            doubled
        };
        let patches = vec![Arc::new(Patch::new("p/h.ips", PatchFormat::Ips, "11111111", "Hack"))];

        let result = PatchCandidateGenerator::generate(&dat, candidates, &patches);
        assert_eq!(result.len(), 2);
        assert_eq!(result.candidate_count(), 3);
    }

    #[test]
    fn test_inputs_sharing_a_crc_patched_once() {
        let game = Game::new("Game")
            .with_rom(Rom::new("track01.bin", 4).with_crc32("11111111"))
            .with_rom(Rom::new("track02.bin", 4).with_crc32("11111111"));
        let dat = Dat::new("Test", vec![game]);
        let game = Arc::clone(&dat.games()[0]);
        let input = Arc::new(DiscoveredFile::new("in/track.bin", 4, game.roms[0].checksums()));
        let pairs = game
            .roms
            .iter()
            .map(|rom| {
                let output = DiscoveredFile::new(format!("out/{}", rom.name), rom.size, rom.checksums());
                RomWithFiles::new(rom.clone(), Arc::clone(&input), output)
            })
            .collect();
        let mut candidates = ParentCandidates::new();
        candidates.push(
            dat.parents()[0].clone(),
            vec![Arc::new(WriteCandidate::new(SingleValueGame::expand(&game).remove(0), pairs))],
        );
        let patches = vec![Arc::new(Patch::new("p/Hack.ips", PatchFormat::Ips, "11111111", "Hack"))];

        let result = PatchCandidateGenerator::generate(&dat, candidates, &patches);
        assert_eq!(result.len(), 2);
        assert_eq!(result.candidate_count(), 2);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Game.nes"), ".nes");
        assert_eq!(extension_of("Game (USA).tar.gz"), ".tar.gz");
        assert_eq!(extension_of("dir\\track 01.bin"), ".bin");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn test_sibling_name() {
        assert_eq!(sibling_name("disc/track01.bin", "Hack.bin"), "disc/Hack.bin");
        assert_eq!(sibling_name("track01.bin", "Hack.bin"), "Hack.bin");
    }
}
