//! Integration tests for the candidate writer.
//!
//! These tests write real files into temporary directories and check:
//! - Copy, move, and link modes
//! - Skipping of existing outputs and the overwrite flag
//! - Shared inputs across candidates in move mode
//! - Verification of written files
//! - Rejected inputs (archive members, patches without an applier)
//!
//! Run with: `cargo test --test writer_integration`

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use romcurator::candidates::{RomWithFiles, WriteCandidate};
use romcurator::checksum::{ChecksumBitmask, Checksums};
use romcurator::concurrency::{DriveScheduler, FileMoveTracker, MountPoint, WriteCoordinator};
use romcurator::dat::{Dat, Game, Rom, SingleValueGame};
use romcurator::file::DiscoveredFile;
use romcurator::patch::{BoxFuture, Patch, PatchApplier, PatchFormat};
use romcurator::writer::{CandidateWriter, WriteError, WriteMode, WriterOptions};

// ============================================================================
// Helper Functions
// ============================================================================

struct Fixture {
    dir: TempDir,
    moves: Arc<FileMoveTracker>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            moves: Arc::new(FileMoveTracker::new()),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    async fn input(&self, relative: &str, contents: &[u8]) -> Arc<DiscoveredFile> {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        Arc::new(DiscoveredFile::from_path(path, ChecksumBitmask::CRC32).await.unwrap())
    }

    fn writer(&self, options: WriterOptions) -> CandidateWriter {
        let drives = DriveScheduler::new(4).with_mount_points(vec![MountPoint::local("/")]);
        CandidateWriter::new(
            options,
            Arc::new(WriteCoordinator::new(2)),
            Arc::new(drives),
            Arc::clone(&self.moves),
        )
    }
}

/// A single-ROM candidate writing `input` to `output`, expecting the
/// input's own size and checksums.
fn candidate(name: &str, input: &Arc<DiscoveredFile>, output: &Path) -> Arc<WriteCandidate> {
    let expected = DiscoveredFile::new(output, input.size(), input.checksums().clone());
    candidate_expecting(name, input, expected)
}

fn candidate_expecting(
    name: &str,
    input: &Arc<DiscoveredFile>,
    expected: DiscoveredFile,
) -> Arc<WriteCandidate> {
    let rom = Rom::from_file("game.rom", &expected);
    let game = Arc::new(Game::new(name).with_rom(rom.clone()));
    Arc::new(WriteCandidate::new(
        SingleValueGame::from_game(game),
        vec![RomWithFiles::new(rom, Arc::clone(input), expected)],
    ))
}

fn dat() -> Dat {
    Dat::new("Test", Vec::new())
}

struct ReversingApplier;

impl PatchApplier for ReversingApplier {
    fn apply<'a>(
        &'a self,
        _patch: &'a Patch,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let mut data = tokio::fs::read(input).await?;
            data.reverse();
            tokio::fs::write(output, data).await
        })
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_copy_then_skip_up_to_date() {
    let fixture = Fixture::new();
    let input = fixture.input("in/foo.bin", b"ROM!").await;
    let output = fixture.path("out/game.rom");
    let writer = fixture.writer(WriterOptions::new(WriteMode::Copy).with_test(true));

    let report = writer.write(&dat(), vec![candidate("Foo", &input, &output)]).await;
    assert_eq!((report.written, report.skipped, report.failed()), (1, 0, 0));
    assert_eq!(std::fs::read(&output).unwrap(), b"ROM!");
    assert!(input.path().exists());

    let report = writer.write(&dat(), vec![candidate("Foo", &input, &output)]).await;
    assert_eq!((report.written, report.skipped, report.failed()), (0, 1, 0));
}

#[tokio::test]
async fn test_existing_output_respects_overwrite() {
    let fixture = Fixture::new();
    let input = fixture.input("in/foo.bin", b"ROM!").await;
    let output = fixture.path("out/game.rom");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"stale").unwrap();

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Copy))
        .write(&dat(), vec![candidate("Foo", &input, &output)])
        .await;
    assert_eq!(report.skipped, 1);
    assert_eq!(std::fs::read(&output).unwrap(), b"stale");

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Copy).with_overwrite(true))
        .write(&dat(), vec![candidate("Foo", &input, &output)])
        .await;
    assert_eq!(report.written, 1);
    assert_eq!(std::fs::read(&output).unwrap(), b"ROM!");
}

#[tokio::test]
async fn test_move_shared_input() {
    let fixture = Fixture::new();
    let input = fixture.input("in/shared.bin", b"SHARED").await;
    let first = fixture.path("out/a/game.rom");
    let second = fixture.path("out/b/game.rom");

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Move).with_test(true))
        .write(
            &dat(),
            vec![
                candidate("Alpha", &input, &first),
                candidate("Beta", &input, &second),
            ],
        )
        .await;

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.written, 2);
    assert!(!input.path().exists());
    assert_eq!(std::fs::read(&first).unwrap(), b"SHARED");
    assert_eq!(std::fs::read(&second).unwrap(), b"SHARED");
    assert!(fixture.moves.was_moved(input.path()).await);
    assert_eq!(fixture.moves.moved_count(), 1);
}

#[tokio::test]
async fn test_link_mode() {
    let fixture = Fixture::new();
    let input = fixture.input("in/foo.bin", b"LINK").await;
    let output = fixture.path("out/game.rom");

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Link))
        .write(&dat(), vec![candidate("Foo", &input, &output)])
        .await;
    assert_eq!(report.written, 1);
    assert!(input.path().exists());
    assert_eq!(std::fs::read(&output).unwrap(), b"LINK");
}

#[tokio::test]
async fn test_input_already_at_output_is_skipped() {
    let fixture = Fixture::new();
    let input = fixture.input("out/game.rom", b"HERE").await;

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Move))
        .write(&dat(), vec![candidate("Foo", &input, input.path())])
        .await;
    assert_eq!((report.written, report.skipped), (0, 1));
    assert!(input.path().exists());
}

#[tokio::test]
async fn test_verification_failure_reported() {
    let fixture = Fixture::new();
    let input = fixture.input("in/foo.bin", b"ROM!").await;
    let output = fixture.path("out/game.rom");
    let wrong = DiscoveredFile::new(&output, 4, Checksums::from_crc32("00000000"));

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Copy).with_test(true))
        .write(&dat(), vec![candidate_expecting("Foo", &input, wrong)])
        .await;

    assert_eq!(report.failed(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.candidate, "Foo");
    assert_eq!(failure.output, output);
    assert!(matches!(failure.error, WriteError::VerificationFailed { .. }));
}

#[tokio::test]
async fn test_archive_member_rejected() {
    let fixture = Fixture::new();
    let input = Arc::new(DiscoveredFile::archive_entry(
        fixture.path("in/set.zip"),
        "foo.bin",
        4,
        Checksums::from_crc32("aabbccdd"),
    ));
    let output = fixture.path("out/game.rom");

    let report = fixture
        .writer(WriterOptions::default())
        .write(&dat(), vec![candidate("Foo", &input, &output)])
        .await;
    assert!(matches!(
        report.failures[0].error,
        WriteError::ArchiveEntryUnsupported(_)
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_patched_input_needs_applier() {
    let fixture = Fixture::new();
    let raw = fixture.input("in/foo.bin", b"abcd").await;
    let patch = Arc::new(Patch::new(
        fixture.path("patches/Foo Hack.ips"),
        PatchFormat::Ips,
        raw.crc32().unwrap(),
        "Foo Hack",
    ));
    let patched = Arc::new(raw.with_patch(patch));
    let output = fixture.path("out/Foo Hack.rom");

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Move))
        .write(&dat(), vec![candidate("Foo Hack", &patched, &output)])
        .await;
    assert!(matches!(report.failures[0].error, WriteError::NoPatchApplier(_)));

    let report = fixture
        .writer(WriterOptions::new(WriteMode::Move))
        .with_patch_applier(Arc::new(ReversingApplier))
        .write(&dat(), vec![candidate("Foo Hack", &patched, &output)])
        .await;
    assert_eq!(report.written, 1);
    assert_eq!(std::fs::read(&output).unwrap(), b"dcba");
    // The unpatched input stays for other candidates.
    assert!(raw.path().exists());
}
