//! Pack selection for a manifest and an optional set of path prefixes.
//!
//! A [`ManifestIndex`] is built once per manifest and answers the lookups the
//! rest of the pipeline needs: file by content hash, blob by hash, blobs by
//! owning pack, and pack by hash. [`resolve`] then narrows the manifest to
//! the packs that must be fetched and groups the work per pack.

use std::collections::{HashMap, HashSet};

use crate::events::{Event, EventSink};
use crate::manifest::{Blob, File, Manifest, Pack};

/// Hash lookups over an immutable [`Manifest`].
///
/// When several entities share a hash the first one in manifest order wins.
#[derive(Debug)]
pub struct ManifestIndex<'m> {
    manifest: &'m Manifest,
    blobs_by_hash: HashMap<&'m str, &'m Blob>,
    blobs_by_pack: HashMap<&'m str, Vec<&'m Blob>>,
    packs_by_hash: HashMap<&'m str, &'m Pack>,
    files_by_name: HashMap<&'m str, &'m File>,
}

impl<'m> ManifestIndex<'m> {
    /// Index `manifest`.
    #[must_use]
    pub fn new(manifest: &'m Manifest) -> Self {
        let mut blobs_by_hash = HashMap::with_capacity(manifest.blobs().len());
        let mut blobs_by_pack: HashMap<&str, Vec<&Blob>> = HashMap::new();
        for blob in manifest.blobs() {
            if blobs_by_hash.contains_key(blob.hash.as_str()) {
                continue;
            }
            blobs_by_hash.insert(blob.hash.as_str(), blob);
            blobs_by_pack
                .entry(blob.pack_hash.as_str())
                .or_default()
                .push(blob);
        }

        let mut packs_by_hash = HashMap::with_capacity(manifest.packs().len());
        for pack in manifest.packs() {
            packs_by_hash.entry(pack.hash.as_str()).or_insert(pack);
        }

        let mut files_by_name = HashMap::with_capacity(manifest.files().len());
        for file in manifest.files() {
            files_by_name.entry(file.name.as_str()).or_insert(file);
        }

        Self {
            manifest,
            blobs_by_hash,
            blobs_by_pack,
            packs_by_hash,
            files_by_name,
        }
    }

    /// The indexed manifest.
    #[must_use]
    pub fn manifest(&self) -> &'m Manifest {
        self.manifest
    }

    /// Blob with content hash `hash`.
    #[must_use]
    pub fn blob(&self, hash: &str) -> Option<&'m Blob> {
        self.blobs_by_hash.get(hash).copied()
    }

    /// Pack with hash `hash`.
    #[must_use]
    pub fn pack(&self, hash: &str) -> Option<&'m Pack> {
        self.packs_by_hash.get(hash).copied()
    }

    /// File named `name`.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&'m File> {
        self.files_by_name.get(name).copied()
    }

    /// Blobs stored in the pack with hash `pack_hash`, in manifest order.
    #[must_use]
    pub fn blobs_in_pack(&self, pack_hash: &str) -> &[&'m Blob] {
        self.blobs_by_pack
            .get(pack_hash)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Path prefixes restricting which files are in scope.
///
/// An empty filter selects every file.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::resolver::PrefixFilter;
///
/// let filter = PrefixFilter::new(["Engine/Binaries"]);
/// assert!(filter.matches("Engine/Binaries/Win64/a.dll"));
/// assert!(!filter.matches("Engine/Source/a.h"));
/// assert!(PrefixFilter::default().matches("anything"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixFilter {
    prefixes: Vec<String>,
}

impl PrefixFilter {
    /// Build a filter from prefixes; empty strings are ignored.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        }
    }

    /// Return whether the filter selects every file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Return whether `name` starts with any prefix.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.is_empty() || self.prefixes.iter().any(|prefix| name.starts_with(prefix))
    }

    /// The prefixes in effect.
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// The outcome of [`resolve`]: packs to fetch and what to extract from them.
#[derive(Debug, Default)]
pub struct Resolution<'m> {
    packs_to_fetch: Vec<&'m Pack>,
    blobs_by_pack: HashMap<&'m str, Vec<&'m Blob>>,
    files_by_blob: HashMap<&'m str, Vec<&'m File>>,
    selected_files: usize,
}

/// Everything one worker needs to process a single pack.
#[derive(Debug, Clone)]
pub struct PackWork<'m> {
    /// The pack to fetch.
    pub pack: &'m Pack,
    /// Blobs stored in the pack that back in-scope files.
    pub blobs: Vec<&'m Blob>,
    /// In-scope files backed by those blobs.
    pub files: Vec<&'m File>,
}

impl<'m> Resolution<'m> {
    /// Packs selected for fetching, in manifest order.
    #[must_use]
    pub fn packs_to_fetch(&self) -> &[&'m Pack] {
        &self.packs_to_fetch
    }

    /// Number of files selected by the prefix filter.
    #[must_use]
    pub fn selected_files(&self) -> usize {
        self.selected_files
    }

    /// One [`PackWork`] per selected pack, in manifest order.
    #[must_use]
    pub fn work_units(&self) -> Vec<PackWork<'m>> {
        self.packs_to_fetch
            .iter()
            .map(|pack| {
                let blobs = self
                    .blobs_by_pack
                    .get(pack.hash.as_str())
                    .cloned()
                    .unwrap_or_default();
                let files = blobs
                    .iter()
                    .filter_map(|blob| self.files_by_blob.get(blob.hash.as_str()))
                    .flatten()
                    .copied()
                    .collect();
                PackWork { pack, blobs, files }
            })
            .collect()
    }
}

/// Select the packs and blobs needed to materialise the files in scope.
///
/// With an empty filter every pack referenced by a blob is selected. With a
/// non-empty filter only packs backing a matching file are. Files whose
/// content hash has no blob are reported as [`Event::BlobMissing`]; blobs
/// naming an unknown pack are reported as [`Event::PackUnknown`].
#[must_use]
pub fn resolve<'m>(
    index: &ManifestIndex<'m>,
    filter: &PrefixFilter,
    sink: &dyn EventSink,
) -> Resolution<'m> {
    let manifest = index.manifest();
    let mut resolution = Resolution::default();
    let mut needed_blobs: HashSet<&str> = HashSet::new();

    for file in manifest.files().iter().filter(|file| filter.matches(&file.name)) {
        resolution.selected_files += 1;
        match index.blob(&file.content_hash) {
            Some(blob) => {
                needed_blobs.insert(blob.hash.as_str());
                resolution
                    .files_by_blob
                    .entry(blob.hash.as_str())
                    .or_default()
                    .push(file);
            }
            None => sink.emit(&Event::BlobMissing {
                file: file.name.clone(),
                hash: file.content_hash.clone(),
            }),
        }
    }

    if !filter.is_empty() {
        sink.emit(&Event::PrefixFilterApplied {
            prefixes: filter.prefixes().to_vec(),
            selected: resolution.selected_files,
            total: manifest.files().len(),
        });
    }

    let mut needed_packs: HashSet<&str> = HashSet::new();
    let mut seen_blobs: HashSet<&str> = HashSet::new();
    for blob in manifest.blobs() {
        if !seen_blobs.insert(blob.hash.as_str()) {
            continue;
        }
        if !filter.is_empty() && !needed_blobs.contains(blob.hash.as_str()) {
            continue;
        }
        if index.pack(&blob.pack_hash).is_none() {
            sink.emit(&Event::PackUnknown {
                blob: blob.hash.clone(),
                pack: blob.pack_hash.clone(),
            });
            continue;
        }
        needed_packs.insert(blob.pack_hash.as_str());
        resolution
            .blobs_by_pack
            .entry(blob.pack_hash.as_str())
            .or_default()
            .push(blob);
    }

    let mut queued: HashSet<&str> = HashSet::new();
    resolution.packs_to_fetch = manifest
        .packs()
        .iter()
        .filter(|pack| needed_packs.contains(pack.hash.as_str()))
        .filter(|pack| queued.insert(pack.hash.as_str()))
        .collect();
    resolution
}

/// CDN URL of `pack`: `base_url/remote_path/hash`.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::manifest::Pack;
/// use ue_gitdeps::resolver::pack_url;
///
/// let pack = Pack::new("001a346e", "UnrealEngine-30001");
/// assert_eq!(
///     pack_url("http://cdn.unrealengine.com/dependencies", &pack),
///     "http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/001a346e",
/// );
/// ```
#[must_use]
pub fn pack_url(base_url: &str, pack: &Pack) -> String {
    format!("{base_url}/{}/{}", pack.remote_path, pack.hash)
}

/// URLs of the packs a run with `filter` would fetch, in manifest order.
///
/// An empty filter lists every pack in the manifest, including packs no
/// blob references.
#[must_use]
pub fn pack_urls(
    index: &ManifestIndex<'_>,
    base_url: &str,
    filter: &PrefixFilter,
    sink: &dyn EventSink,
) -> Vec<String> {
    if filter.is_empty() {
        return index
            .manifest()
            .packs()
            .iter()
            .map(|pack| pack_url(base_url, pack))
            .collect();
    }
    resolve(index, filter, sink)
        .packs_to_fetch()
        .iter()
        .map(|pack| pack_url(base_url, pack))
        .collect()
}

/// Follow file → blob → pack for the file named `name`.
#[must_use]
pub fn pack_for_file<'m>(index: &ManifestIndex<'m>, name: &str) -> Option<&'m Pack> {
    let file = index.file(name)?;
    let blob = index.blob(&file.content_hash)?;
    index.pack(&blob.pack_hash)
}
