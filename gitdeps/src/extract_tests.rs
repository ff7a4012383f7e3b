//! Unit tests for pack extraction.
//!
//! These tests cover byte-range slicing, the bounds and path-safety checks
//! that reject a pack before anything is written, digest handling under each
//! hash policy, and file permissions.

use super::*;
use crate::events::MockEventSink;
use crate::test_utils::{PACK_HEADER, RecordingSink, pack_with_content, sha1_hex};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const CONTENT: &[u8] = b"abcdef";

#[fixture]
fn out() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn blob(offset: u64, size: u64) -> Blob {
    Blob::new("blob-1", "pack-1", offset, size)
}

fn header_blob() -> Blob {
    blob(PACK_HEADER.len() as u64, CONTENT.len() as u64)
}

fn file(name: &str) -> File {
    File::new(name, "blob-1").with_expected_hash(sha1_hex(CONTENT))
}

fn extract(
    pack: &[u8],
    blobs: &[Blob],
    files: &[File],
    root: &Path,
    options: &ExtractOptions,
    sink: &dyn EventSink,
) -> Result<ExtractSummary, ExtractionError> {
    let blob_refs: Vec<&Blob> = blobs.iter().collect();
    let file_refs: Vec<&File> = files.iter().collect();
    extract_pack(pack, &blob_refs, &file_refs, root, options, sink)
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[rstest]
fn extracts_blob_after_pack_header(out: TempDir) {
    let sink = RecordingSink::default();
    let summary = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("some-file")],
        out.path(),
        &ExtractOptions::default(),
        &sink,
    )
    .expect("extract");

    let written = std::fs::read(out.path().join("some-file")).expect("read output");
    assert_eq!(written, CONTENT);
    assert_eq!(
        summary,
        ExtractSummary {
            files_written: 1,
            blobs_missing: 0,
            hash_mismatches: 0,
            bytes_written: 6,
        }
    );
    assert!(sink.warnings().is_empty());
}

#[rstest]
fn creates_nested_directories(out: TempDir) {
    extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("Engine/Binaries/Win64/some.dll")],
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect("extract");
    assert!(out.path().join("Engine/Binaries/Win64/some.dll").is_file());
}

#[rstest]
fn overwrites_existing_file(out: TempDir) {
    std::fs::write(out.path().join("some-file"), b"stale content here").expect("seed");
    extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("some-file")],
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect("extract");
    assert_eq!(
        std::fs::read(out.path().join("some-file")).expect("read"),
        CONTENT
    );
}

#[rstest]
#[case::past_end(8, 100)]
#[case::offset_past_end(15, 0)]
#[case::overflowing(u64::MAX, 2)]
fn out_of_bounds_blob_fails_before_writing(out: TempDir, #[case] offset: u64, #[case] size: u64) {
    let err = extract(
        &pack_with_content(CONTENT),
        &[blob(offset, size)],
        &[file("some-file")],
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect_err("out of bounds");

    assert!(matches!(err, ExtractionError::OutOfBounds { pack_len: 14, .. }));
    assert!(is_empty_dir(out.path()));
}

#[rstest]
fn bad_range_later_in_pack_prevents_earlier_writes(out: TempDir) {
    let blobs = [header_blob(), Blob::new("blob-2", "pack-1", 10, 50)];
    let files = [file("first"), File::new("second", "blob-2")];
    let err = extract(
        &pack_with_content(CONTENT),
        &blobs,
        &files,
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect_err("second blob out of bounds");

    assert!(matches!(err, ExtractionError::OutOfBounds { ref blob, .. } if blob == "blob-2"));
    assert!(!out.path().join("first").exists());
}

#[rstest]
fn traversal_name_is_rejected(out: TempDir) {
    let root = out.path().join("target");
    std::fs::create_dir_all(&root).expect("mkdir");
    let err = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("../../etc/passwd")],
        &root,
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect_err("traversal");

    assert!(matches!(err, ExtractionError::PathTraversal { ref name } if name == "../../etc/passwd"));
    assert!(is_empty_dir(&root));
    assert!(!out.path().join("etc").exists());
}

#[rstest]
fn missing_blob_is_skipped_with_warning(out: TempDir) {
    let sink = RecordingSink::default();
    let files = [File::new("orphan", "no-such-blob"), file("some-file")];
    let summary = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &files,
        out.path(),
        &ExtractOptions::default(),
        &sink,
    )
    .expect("extract");

    assert_eq!(summary.blobs_missing, 1);
    assert_eq!(summary.files_written, 1);
    assert!(!out.path().join("orphan").exists());
    assert!(matches!(
        sink.warnings().as_slice(),
        [Event::BlobMissing { file, .. }] if file == "orphan"
    ));
}

#[rstest]
fn duplicate_blob_hash_uses_first_entry(out: TempDir) {
    let offset = PACK_HEADER.len() as u64;
    let blobs = [
        Blob::new("blob-1", "pack-1", offset, 3),
        Blob::new("blob-1", "pack-1", offset + 3, 3),
    ];
    extract(
        &pack_with_content(CONTENT),
        &blobs,
        &[File::new("first", "blob-1")],
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect("extract");

    assert_eq!(std::fs::read(out.path().join("first")).expect("read"), b"abc");
}

#[rstest]
fn resolves_each_file_to_its_own_blob(out: TempDir) {
    let offset = PACK_HEADER.len() as u64;
    let blobs: Vec<Blob> = (0..CONTENT.len() as u64)
        .map(|index| Blob::new(format!("blob-{index}"), "pack-1", offset + index, 1))
        .collect();
    let files: Vec<File> = (0..CONTENT.len())
        .rev()
        .map(|index| File::new(format!("byte-{index}"), format!("blob-{index}")))
        .collect();

    let summary = extract(
        &pack_with_content(CONTENT),
        &blobs,
        &files,
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect("extract");

    assert_eq!(summary.files_written, CONTENT.len());
    for (index, byte) in CONTENT.iter().enumerate() {
        let written = std::fs::read(out.path().join(format!("byte-{index}"))).expect("read");
        assert_eq!(written, [*byte]);
    }
}

#[rstest]
fn mismatch_warns_and_keeps_file(out: TempDir) {
    let sink = RecordingSink::default();
    let wrong = File::new("some-file", "blob-1").with_expected_hash("0".repeat(40));
    let summary = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[wrong],
        out.path(),
        &ExtractOptions::default(),
        &sink,
    )
    .expect("warn policy keeps going");

    assert_eq!(summary.hash_mismatches, 1);
    assert!(out.path().join("some-file").exists());
    assert!(matches!(
        sink.warnings().as_slice(),
        [Event::HashMismatch { actual, .. }] if *actual == sha1_hex(CONTENT)
    ));
}

#[rstest]
fn strict_policy_fails_pack_on_mismatch(out: TempDir) {
    let wrong = File::new("some-file", "blob-1").with_expected_hash("0".repeat(40));
    let options = ExtractOptions {
        hash_policy: HashPolicy::Strict,
        ..ExtractOptions::default()
    };
    let err = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[wrong],
        out.path(),
        &options,
        &RecordingSink::default(),
    )
    .expect_err("strict mismatch");

    assert!(matches!(err, ExtractionError::HashMismatch { .. }));
    assert!(!out.path().join("some-file").exists());
}

#[rstest]
fn skip_policy_ignores_digests(out: TempDir) {
    let sink = RecordingSink::default();
    let wrong = File::new("some-file", "blob-1").with_expected_hash("0".repeat(40));
    let options = ExtractOptions {
        hash_policy: HashPolicy::Skip,
        ..ExtractOptions::default()
    };
    let summary = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[wrong],
        out.path(),
        &options,
        &sink,
    )
    .expect("extract");
    assert_eq!(summary.hash_mismatches, 0);
    assert!(sink.warnings().is_empty());
}

#[rstest]
fn cancelled_token_stops_before_writing(out: TempDir) {
    let options = ExtractOptions::default();
    options.cancel.cancel();
    let err = extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("some-file")],
        out.path(),
        &options,
        &RecordingSink::default(),
    )
    .expect_err("cancelled");
    assert!(matches!(err, ExtractionError::Cancelled(Cancelled::Requested)));
    assert!(is_empty_dir(out.path()));
}

#[rstest]
fn emits_one_event_per_written_file(out: TempDir) {
    let mut sink = MockEventSink::new();
    sink.expect_emit()
        .withf(|event| matches!(event, Event::FileExtracted { file, bytes: 6 } if file == "some-file"))
        .times(1)
        .return_const(());
    extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[file("some-file")],
        out.path(),
        &ExtractOptions::default(),
        &sink,
    )
    .expect("extract");
}

#[cfg(unix)]
#[rstest]
#[case::regular(false, 0o644)]
#[case::executable(true, 0o755)]
fn applies_file_mode(out: TempDir, #[case] executable: bool, #[case] expected: u32) {
    use std::os::unix::fs::PermissionsExt;

    let entry = if executable {
        file("tool").executable()
    } else {
        file("tool")
    };
    extract(
        &pack_with_content(CONTENT),
        &[header_blob()],
        &[entry],
        out.path(),
        &ExtractOptions::default(),
        &RecordingSink::default(),
    )
    .expect("extract");

    let mode = std::fs::metadata(out.path().join("tool"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, expected);
}

#[cfg(unix)]
#[rstest]
fn symlinked_directory_out_of_root_is_rejected(out: TempDir) {
    let root = out.path().join("root");
    let outside = out.path().join("outside");
    std::fs::create_dir_all(&root).expect("mkdir root");
    std::fs::create_dir_all(&outside).expect("mkdir outside");
    std::os::unix::fs::symlink(&outside, root.join("link")).expect("symlink");

    let err = safe_destination(&root, "link/escaped.txt").expect_err("escapes via symlink");
    assert!(matches!(err, ExtractionError::PathTraversal { .. }));
}

#[rstest]
#[case::absolute("/etc/passwd")]
#[case::parent("../outside")]
#[case::nested_parent("Engine/../../outside")]
fn rejects_escaping_names(#[case] name: &str) {
    let err = safe_destination(Path::new("/nonexistent/root"), name).expect_err("escapes");
    assert!(matches!(err, ExtractionError::PathTraversal { .. }), "{name}");
}

#[rstest]
#[case::empty("")]
#[case::current_dir(".")]
#[case::collapses_to_root("Engine/..")]
fn rejects_names_without_a_file(#[case] name: &str) {
    let err = safe_destination(Path::new("/nonexistent/root"), name).expect_err("no file");
    assert!(matches!(err, ExtractionError::InvalidName { .. }), "{name:?}");
}

#[rstest]
#[case::plain("some-file", "some-file")]
#[case::inner_parent("Engine/../Content/a.uasset", "Content/a.uasset")]
#[case::current_dir("./Engine/a.dll", "Engine/a.dll")]
fn normalises_names_inside_root(#[case] name: &str, #[case] expected: &str) {
    let root = Path::new("/nonexistent/root");
    let destination = safe_destination(root, name).expect("inside root");
    assert_eq!(destination, root.join(expected));
}
