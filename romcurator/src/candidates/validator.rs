//! Output collision detection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::error;

use super::WriteCandidate;
use crate::concurrency::path_key;

/// Finds candidates of different catalog games that would write the same file.
pub struct CandidateValidator;

impl CandidateValidator {
    /// Returns every candidate involved in an output path conflict, in input
    /// order and without duplicates.
    ///
    /// Games are compared by the catalog game a candidate came from, so a
    /// patched candidate sharing unpatched ROMs with its source game is not a
    /// conflict. Each conflict is logged.
    pub fn validate(dat_name: &str, candidates: &[Arc<WriteCandidate>]) -> Vec<Arc<WriteCandidate>> {
        let mut by_output: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            for path in candidate.output_paths() {
                let owners = by_output.entry(path_key(path)).or_default();
                if owners.last() != Some(&index) {
                    owners.push(index);
                }
            }
        }

        let mut conflicting = BTreeSet::new();
        for (output_path, owners) in &by_output {
            let sources: BTreeSet<&str> = owners
                .iter()
                .map(|&i| candidates[i].game().source().name.as_str())
                .collect();
            if sources.len() > 1 {
                let games: BTreeSet<&str> = owners.iter().map(|&i| candidates[i].name()).collect();
                error!(
                    dat = %dat_name,
                    output_path = %output_path,
                    games = ?games,
                    "Multiple games write the same output file"
                );
                conflicting.extend(owners.iter().copied());
            }
        }

        conflicting
            .into_iter()
            .map(|index| Arc::clone(&candidates[index]))
            .collect()
    }
}
