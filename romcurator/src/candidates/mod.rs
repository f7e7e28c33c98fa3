//! Candidate resolution.
//!
//! Turns a catalog and a set of discovered files into write candidates:
//!
//! ```text
//! discovered files ──► IndexedFiles ──┐
//!                                     ▼
//! Dat ────────────────────────► CandidateGenerator ──► PatchCandidateGenerator
//!                                                              │
//!                                                              ▼
//!                                                     CandidateValidator
//! ```
//!
//! A candidate only exists when every ROM of its game was matched; games
//! with missing ROMs are skipped, not reported as errors.

mod generator;
mod index;
mod patches;
mod types;
mod validator;

pub use generator::CandidateGenerator;
pub use index::IndexedFiles;
pub use patches::PatchCandidateGenerator;
pub use types::{ParentCandidates, RomWithFiles, WriteCandidate};
pub use validator::CandidateValidator;
