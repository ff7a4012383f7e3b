//! Materialising files from a decompressed pack.
//!
//! Each in-scope file names a blob; the blob names a byte range of the pack.
//! Extraction first plans every file (blob lookup, bounds check, destination
//! path check) and only then writes, so a pack with a bad range or an unsafe
//! name fails before anything touches the output tree.

use std::collections::HashMap;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use crate::cancel::{CancellationToken, Cancelled};
use crate::events::{Event, EventSink};
use crate::manifest::{Blob, File};
use crate::verification::{HashPolicy, verify_hash};

/// Errors arising from pack extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// A blob's byte range does not fit inside the decompressed pack.
    #[error("blob {blob} extends beyond pack data (offset={offset}, size={size}, pack length={pack_len})")]
    OutOfBounds {
        /// The blob hash.
        blob: String,
        /// The blob's offset.
        offset: u64,
        /// The blob's size.
        size: u64,
        /// Length of the decompressed pack.
        pack_len: usize,
    },

    /// A file name resolves outside the output root.
    #[error("illegal file path (path traversal detected): {name}")]
    PathTraversal {
        /// The offending manifest name.
        name: String,
    },

    /// A file name does not describe a file.
    #[error("invalid file name: {name:?}")]
    InvalidName {
        /// The offending manifest name.
        name: String,
    },

    /// Extracted content does not match the manifest digest.
    #[error("file {file} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The file name.
        file: String,
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest of the extracted bytes.
        actual: String,
    },

    /// Creating a directory or writing a file failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The run was cancelled or its deadline passed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Settings shared by every extraction in a run.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// What a digest mismatch means.
    pub hash_policy: HashPolicy,
    /// Checked between files.
    pub cancel: CancellationToken,
}

/// Counters describing one pack's extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Files written to the output tree.
    pub files_written: usize,
    /// Files skipped because their blob is not in the pack.
    pub blobs_missing: usize,
    /// Files whose digest did not match under [`HashPolicy::Warn`].
    pub hash_mismatches: usize,
    /// Total bytes written.
    pub bytes_written: u64,
}

struct PlannedFile<'a> {
    file: &'a File,
    blob: &'a Blob,
    range: Range<usize>,
    destination: PathBuf,
}

/// Extract `files` from the decompressed `pack_data` into `output_root`.
///
/// `blobs` are the blobs stored in this pack; when two share a hash the
/// first one listed is used. Files whose blob is absent are reported as
/// [`Event::BlobMissing`] and skipped. Existing files at a
/// destination are overwritten.
///
/// # Errors
///
/// Returns [`ExtractionError::OutOfBounds`], [`ExtractionError::PathTraversal`],
/// or [`ExtractionError::InvalidName`] before any file is written;
/// [`ExtractionError::HashMismatch`] under [`HashPolicy::Strict`];
/// [`ExtractionError::Io`] when writing fails; and
/// [`ExtractionError::Cancelled`] when the token fires between files.
pub fn extract_pack(
    pack_data: &[u8],
    blobs: &[&Blob],
    files: &[&File],
    output_root: &Path,
    options: &ExtractOptions,
    sink: &dyn EventSink,
) -> Result<ExtractSummary, ExtractionError> {
    let mut summary = ExtractSummary::default();
    let mut plan = Vec::with_capacity(files.len());
    let mut blobs_by_hash: HashMap<&str, &Blob> = HashMap::with_capacity(blobs.len());
    for &blob in blobs {
        blobs_by_hash.entry(blob.hash.as_str()).or_insert(blob);
    }

    for &file in files {
        let Some(&blob) = blobs_by_hash.get(file.content_hash.as_str()) else {
            sink.emit(&Event::BlobMissing {
                file: file.name.clone(),
                hash: file.content_hash.clone(),
            });
            summary.blobs_missing += 1;
            continue;
        };
        plan.push(PlannedFile {
            file,
            blob,
            range: blob_range(blob, pack_data.len())?,
            destination: safe_destination(output_root, &file.name)?,
        });
    }

    for planned in plan {
        options.cancel.check()?;
        let content = pack_data
            .get(planned.range.clone())
            .ok_or_else(|| out_of_bounds(planned.blob, pack_data.len()))?;
        if !check_digest(planned.file, content, options.hash_policy, sink)? {
            summary.hash_mismatches += 1;
        }
        write_file(&planned.destination, content, planned.file.is_executable)?;
        sink.emit(&Event::FileExtracted {
            file: planned.file.name.clone(),
            bytes: content.len(),
        });
        summary.files_written += 1;
        summary.bytes_written += content.len() as u64;
    }

    Ok(summary)
}

/// Byte range of `blob` inside a pack of `pack_len` bytes.
fn blob_range(blob: &Blob, pack_len: usize) -> Result<Range<usize>, ExtractionError> {
    let start = usize::try_from(blob.pack_offset).ok();
    let end = start
        .zip(usize::try_from(blob.size).ok())
        .and_then(|(start, size)| start.checked_add(size));
    match (start, end) {
        (Some(start), Some(end)) if end <= pack_len => Ok(start..end),
        _ => Err(out_of_bounds(blob, pack_len)),
    }
}

fn out_of_bounds(blob: &Blob, pack_len: usize) -> ExtractionError {
    ExtractionError::OutOfBounds {
        blob: blob.hash.clone(),
        offset: blob.pack_offset,
        size: blob.size,
        pack_len,
    }
}

/// Return whether `content` matches the file's digest, or the file has none.
fn check_digest(
    file: &File,
    content: &[u8],
    policy: HashPolicy,
    sink: &dyn EventSink,
) -> Result<bool, ExtractionError> {
    if !policy.verifies() || file.expected_hash.is_empty() {
        return Ok(true);
    }
    let (matches, actual) = verify_hash(content, &file.expected_hash);
    if matches {
        return Ok(true);
    }
    if policy.is_fatal() {
        return Err(ExtractionError::HashMismatch {
            file: file.name.clone(),
            expected: file.expected_hash.clone(),
            actual,
        });
    }
    sink.emit(&Event::HashMismatch {
        file: file.name.clone(),
        expected: file.expected_hash.clone(),
        actual,
    });
    Ok(false)
}

/// Join `name` onto `root`, refusing any result outside `root`.
///
/// Names are normalised lexically: `.` is dropped and `..` consumes the
/// previous component, so `a/../b` is accepted while `../b` is not. When
/// `root` already exists, the deepest existing ancestor of the destination
/// is canonicalised as well, which catches symlinked directories leading
/// out of the tree. An existing symlink at the destination is refused.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] for absolute names and names
/// escaping `root`, and [`ExtractionError::InvalidName`] for names that do
/// not name a file.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ue_gitdeps::extract::{ExtractionError, safe_destination};
///
/// let root = Path::new("/nonexistent/out");
/// let ok = safe_destination(root, "Engine/./Binaries/a.dll").expect("inside root");
/// assert_eq!(ok, root.join("Engine/Binaries/a.dll"));
///
/// let err = safe_destination(root, "../../etc/passwd").expect_err("escapes root");
/// assert!(matches!(err, ExtractionError::PathTraversal { .. }));
/// ```
pub fn safe_destination(root: &Path, name: &str) -> Result<PathBuf, ExtractionError> {
    let traversal = || ExtractionError::PathTraversal {
        name: name.to_owned(),
    };
    if name.is_empty() || name.contains('\0') {
        return Err(ExtractionError::InvalidName {
            name: name.to_owned(),
        });
    }

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(ExtractionError::InvalidName {
            name: name.to_owned(),
        });
    }

    let destination = root.join(&relative);
    if !stays_inside(root, &destination) {
        return Err(traversal());
    }
    Ok(destination)
}

fn stays_inside(root: &Path, destination: &Path) -> bool {
    let Ok(canonical_root) = root.canonicalize() else {
        return true;
    };
    if std::fs::symlink_metadata(destination).is_ok_and(|meta| meta.file_type().is_symlink()) {
        return false;
    }
    let mut ancestor = destination.parent();
    while let Some(dir) = ancestor {
        if !dir.starts_with(root) {
            break;
        }
        if let Ok(canonical) = dir.canonicalize() {
            return canonical.starts_with(&canonical_root);
        }
        ancestor = dir.parent();
    }
    true
}

fn write_file(destination: &Path, content: &[u8], executable: bool) -> Result<(), ExtractionError> {
    let io_error = |source| ExtractionError::Io {
        path: destination.to_path_buf(),
        source,
    };
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(file_mode(executable));
    }
    let mut handle = options.open(destination).map_err(io_error)?;
    handle.write_all(content).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            destination,
            std::fs::Permissions::from_mode(file_mode(executable)),
        )
        .map_err(io_error)?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    Ok(())
}

/// Unix permission bits for an extracted file.
#[cfg(unix)]
fn file_mode(executable: bool) -> u32 {
    if executable { 0o755 } else { 0o644 }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
