//! Dependency manifest model, XML decoding, and loading.
//!
//! A manifest lists the logical [`File`]s of a checkout, the content-addressed
//! [`Blob`]s backing them, and the gzip-compressed [`Pack`]s those blobs live
//! in. The model is immutable once built: entities expose public fields for
//! reading, but the [`Manifest`] only ever hands out shared references.
//!
//! # Sub-modules
//!
//! - [`loader`] - Resolves an input path and reads the descriptor from disk.
//! - [`parser`] - Decodes the XML descriptor into a [`Manifest`].

pub mod loader;
pub mod parser;

pub use loader::{
    DiscoveredManifest, MANIFEST_FILE_NAME, ManifestLoadError, discover_manifests, load_manifest,
    resolve_manifest_path,
};
pub use parser::{ManifestParseError, parse_manifest, parse_manifest_bytes};

/// A logical output file and the blob that backs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    /// Repository-relative path the file is extracted to.
    pub name: String,
    /// Hash of the [`Blob`] holding this file's content.
    pub content_hash: String,
    /// Optional SHA-1 of the content; empty when the manifest omits it.
    pub expected_hash: String,
    /// Informational timestamp carried by the manifest.
    pub timestamp: u64,
    /// Whether the extracted file should be marked executable.
    pub is_executable: bool,
}

impl File {
    /// Create a file entry backed by the blob with `content_hash`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ue_gitdeps::manifest::File;
    ///
    /// let file = File::new("Engine/Binaries/a.dll", "blob-a").executable();
    /// assert!(file.is_executable);
    /// assert!(file.expected_hash.is_empty());
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_hash: content_hash.into(),
            ..Self::default()
        }
    }

    /// Attach an expected SHA-1 digest.
    #[must_use]
    pub fn with_expected_hash(mut self, expected_hash: impl Into<String>) -> Self {
        self.expected_hash = expected_hash.into();
        self
    }

    /// Mark the file as executable.
    #[must_use]
    pub fn executable(mut self) -> Self {
        self.is_executable = true;
        self
    }
}

/// A byte range inside the decompressed form of one pack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    /// Content hash; unique within a manifest.
    pub hash: String,
    /// Length of the blob's region in bytes.
    pub size: u64,
    /// Hash of the owning [`Pack`].
    pub pack_hash: String,
    /// Offset of the region within the decompressed pack.
    pub pack_offset: u64,
}

impl Blob {
    /// Create a blob occupying `[pack_offset, pack_offset + size)` of a pack.
    #[must_use]
    pub fn new(
        hash: impl Into<String>,
        pack_hash: impl Into<String>,
        pack_offset: u64,
        size: u64,
    ) -> Self {
        Self {
            hash: hash.into(),
            size,
            pack_hash: pack_hash.into(),
            pack_offset,
        }
    }
}

/// A gzip-compressed container of concatenated blob regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pack {
    /// Pack hash; also the object name on the CDN.
    pub hash: String,
    /// Decompressed size in bytes (informational).
    pub size: u64,
    /// Compressed size in bytes (informational).
    pub compressed_size: u64,
    /// Path segment between the base URL and the pack hash.
    pub remote_path: String,
}

impl Pack {
    /// Create a pack stored under `remote_path` on the CDN.
    #[must_use]
    pub fn new(hash: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            remote_path: remote_path.into(),
            ..Self::default()
        }
    }
}

/// A parsed `.ue4dependencies` descriptor.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::manifest::{Blob, File, Manifest, Pack};
///
/// let manifest = Manifest::new(
///     "https://cdn.example.test/dependencies",
///     vec![File::new("some-file", "blob")],
///     vec![Blob::new("blob", "pack", 8, 6)],
///     vec![Pack::new("pack", "UnrealEngine-1")],
/// );
/// assert_eq!(manifest.files().len(), 1);
/// assert_eq!(manifest.base_url(), "https://cdn.example.test/dependencies");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    base_url: String,
    files: Vec<File>,
    blobs: Vec<Blob>,
    packs: Vec<Pack>,
}

impl Manifest {
    /// Assemble a manifest from its parts.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        files: Vec<File>,
        blobs: Vec<Blob>,
        packs: Vec<Pack>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            files,
            blobs,
            packs,
        }
    }

    /// CDN base URL packs are served under.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Files in manifest order.
    #[must_use]
    pub fn files(&self) -> &[File] {
        &self.files
    }

    /// Blobs in manifest order.
    #[must_use]
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Packs in manifest order.
    #[must_use]
    pub fn packs(&self) -> &[Pack] {
        &self.packs
    }
}
