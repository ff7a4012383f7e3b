//! Locating and reading `.ue4dependencies` descriptors from disk.
//!
//! An input path may name the descriptor itself or a directory that holds a
//! file called [`MANIFEST_FILE_NAME`]. The loader only reads; it never writes
//! to the filesystem or touches the network.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::Manifest;
use super::parser::{ManifestParseError, parse_manifest_bytes};
use crate::events::{Event, EventSink};

/// File name of the descriptor inside a checkout.
pub const MANIFEST_FILE_NAME: &str = ".ue4dependencies";

/// Errors arising from manifest loading.
#[derive(Debug, thiserror::Error)]
pub enum ManifestLoadError {
    /// The input path or the descriptor inside it does not exist.
    #[error("manifest not found: {}", path.display())]
    NotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The descriptor exists but could not be read.
    #[error("failed to read manifest {}", path.display())]
    Io {
        /// The path being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The descriptor was read but does not match the expected schema.
    #[error("malformed manifest {}", path.display())]
    Malformed {
        /// The path that was decoded.
        path: PathBuf,
        /// The decoding failure.
        #[source]
        source: ManifestParseError,
    },

    /// Walking a directory tree for descriptors failed.
    #[error("failed to search {} for manifests", root.display())]
    Walk {
        /// The root of the search.
        root: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },
}

/// A descriptor found by [`discover_manifests`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredManifest {
    /// Path the descriptor was read from.
    pub path: PathBuf,
    /// The decoded manifest.
    pub manifest: Manifest,
}

/// Resolve `input` to the absolute path of a descriptor file.
///
/// Directories resolve to the [`MANIFEST_FILE_NAME`] they contain.
///
/// # Errors
///
/// Returns [`ManifestLoadError::NotFound`] when `input` or the descriptor it
/// implies does not exist, and [`ManifestLoadError::Io`] when the path cannot
/// be made absolute or inspected.
pub fn resolve_manifest_path(input: &Path) -> Result<PathBuf, ManifestLoadError> {
    let absolute = std::path::absolute(input).map_err(|source| ManifestLoadError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let metadata = stat(&absolute)?;
    if !metadata.is_dir() {
        return Ok(absolute);
    }

    let descriptor = absolute.join(MANIFEST_FILE_NAME);
    let descriptor_metadata = stat(&descriptor)?;
    if descriptor_metadata.is_dir() {
        return Err(ManifestLoadError::NotFound { path: descriptor });
    }
    Ok(descriptor)
}

fn stat(path: &Path) -> Result<std::fs::Metadata, ManifestLoadError> {
    std::fs::metadata(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ManifestLoadError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ManifestLoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Load the descriptor named by `input`, a file or a directory.
///
/// # Errors
///
/// Returns [`ManifestLoadError::NotFound`] or [`ManifestLoadError::Io`] for
/// filesystem problems and [`ManifestLoadError::Malformed`] when the bytes
/// do not decode.
pub fn load_manifest(input: impl AsRef<Path>) -> Result<Manifest, ManifestLoadError> {
    let path = resolve_manifest_path(input.as_ref())?;
    read_manifest(&path)
}

fn read_manifest(path: &Path) -> Result<Manifest, ManifestLoadError> {
    let bytes = std::fs::read(path).map_err(|source| ManifestLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest_bytes(&bytes).map_err(|source| ManifestLoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Find and load every descriptor beneath `root`, ordered by path.
///
/// Descriptors that cannot be read or decoded are reported to `sink` as
/// [`Event::ManifestSkipped`] and left out of the result.
///
/// # Errors
///
/// Returns [`ManifestLoadError::Walk`] when the directory tree itself
/// cannot be traversed.
pub fn discover_manifests(
    root: &Path,
    sink: &dyn EventSink,
) -> Result<Vec<DiscoveredManifest>, ManifestLoadError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ManifestLoadError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE_NAME {
            continue;
        }
        match read_manifest(entry.path()) {
            Ok(manifest) => found.push(DiscoveredManifest {
                path: entry.into_path(),
                manifest,
            }),
            Err(err) => sink.emit(&Event::ManifestSkipped {
                path: entry.path().display().to_string(),
                reason: error_chain(&err),
            }),
        }
    }
    Ok(found)
}

/// Render an error and its sources as one line.
///
/// Causes already spelled out by an outer message are not repeated.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, SAMPLE_MANIFEST_XML};
    use std::fs;

    #[test]
    fn loads_descriptor_from_directory() {
        let temp = tempfile::tempdir().expect("temp dir");
        fs::write(temp.path().join(MANIFEST_FILE_NAME), SAMPLE_MANIFEST_XML).expect("write");

        let manifest = load_manifest(temp.path()).expect("load from directory");
        assert_eq!(manifest.files().len(), 1);
    }

    #[test]
    fn loads_descriptor_from_explicit_path() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("Engine.gitdeps.xml");
        fs::write(&path, SAMPLE_MANIFEST_XML).expect("write");

        let manifest = load_manifest(&path).expect("load from file");
        assert_eq!(manifest.packs().len(), 1);
    }

    #[test]
    fn missing_input_is_not_found() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = load_manifest(temp.path().join("absent")).expect_err("missing input");
        assert!(matches!(err, ManifestLoadError::NotFound { .. }));
    }

    #[test]
    fn directory_without_descriptor_is_not_found() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = load_manifest(temp.path()).expect_err("no descriptor");
        match err {
            ManifestLoadError::NotFound { path } => {
                assert!(path.ends_with(MANIFEST_FILE_NAME));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let temp = tempfile::tempdir().expect("temp dir");
        fs::write(temp.path().join(MANIFEST_FILE_NAME), "not xml at all <").expect("write");
        let err = load_manifest(temp.path()).expect_err("malformed");
        assert!(matches!(err, ManifestLoadError::Malformed { .. }));
    }

    #[test]
    fn discovery_finds_nested_descriptors_and_skips_broken_ones() {
        let temp = tempfile::tempdir().expect("temp dir");
        let nested = temp.path().join("Engine").join("Plugins");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(temp.path().join(MANIFEST_FILE_NAME), SAMPLE_MANIFEST_XML).expect("write");
        fs::write(nested.join(MANIFEST_FILE_NAME), SAMPLE_MANIFEST_XML).expect("write");
        let broken = temp.path().join("Broken");
        fs::create_dir_all(&broken).expect("mkdir");
        fs::write(broken.join(MANIFEST_FILE_NAME), "<oops").expect("write");
        fs::write(temp.path().join("README.md"), "# readme").expect("write");

        let sink = RecordingSink::default();
        let found = discover_manifests(temp.path(), &sink).expect("discover");

        assert_eq!(found.len(), 2);
        assert!(
            found
                .iter()
                .all(|entry| entry.manifest.base_url() == "http://cdn.unrealengine.com/dependencies")
        );
        let skipped = sink.events();
        assert_eq!(skipped.len(), 1);
        assert!(matches!(&skipped[0], Event::ManifestSkipped { path, .. } if path.contains("Broken")));
    }

    #[test]
    fn discovery_of_empty_tree_finds_nothing() {
        let temp = tempfile::tempdir().expect("temp dir");
        let found = discover_manifests(temp.path(), &RecordingSink::default()).expect("discover");
        assert!(found.is_empty());
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = ManifestLoadError::Malformed {
            path: PathBuf::from("/tmp/.ue4dependencies"),
            source: ManifestParseError::UnexpectedRoot {
                found: "Other".to_owned(),
            },
        };
        let rendered = error_chain(&err);
        assert!(rendered.starts_with("malformed manifest"));
        assert!(rendered.contains("unexpected root element <Other>"));
    }
}
