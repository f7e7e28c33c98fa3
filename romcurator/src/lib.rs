//! romcurator - ROM collection curation
//!
//! This library matches files on disk against ROM catalogs (DATs) and
//! writes each fully-matched game to its output location, coordinating
//! concurrent reads and writes so that slow or shared volumes are never
//! overwhelmed and no two writers touch the same output file.
//!
//! The pipeline:
//!
//! 1. [`scanner::FileScanner`] expands input globs and hashes files.
//! 2. [`candidates::CandidateGenerator`] resolves every game of a
//!    [`dat::Dat`] against the indexed files.
//! 3. [`candidates::PatchCandidateGenerator`] adds patched variants.
//! 4. [`candidates::CandidateValidator`] reports output collisions.
//! 5. [`writer::CandidateWriter`] copies, moves, or links the files.

pub mod candidates;
pub mod checksum;
pub mod concurrency;
pub mod config;
pub mod dat;
pub mod file;
pub mod logging;
pub mod output;
pub mod patch;
pub mod scanner;
pub mod writer;
