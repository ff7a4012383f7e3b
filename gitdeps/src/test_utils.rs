//! Shared test utilities for the gitdeps crate.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::cancel::CancellationToken;
use crate::events::{Event, EventSink};
use crate::fetch::{FetchError, PackSource};
use crate::manifest::{Blob, File, Manifest, Pack};
pub use crate::verification::sha1_hex;

/// A descriptor in the shape the engine ships, with one entity of each kind.
pub const SAMPLE_MANIFEST_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<DependencyManifest xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" BaseUrl="http://cdn.unrealengine.com/dependencies">
  <Files>
    <File Name="some-file" Hash="d3d7bbcf9b2fc8b6e4f2965354a5633c4f175589" ExpectedHash="d3d7bbcf9b2fc8b6e4f2965354a5633c4f175589" Timestamp="637988041677261645" />
  </Files>
  <Blobs>
    <Blob Hash="fff6d7a22bd452cf4ac09b530266c5cb629923e0" Size="8152030" PackHash="11d5023ca81e6600e5546173c8ccee28fd7cf617" PackOffset="8" />
  </Blobs>
  <Packs>
    <Pack Hash="001a346e02100066dd078de2129dfe89c589aa23" Size="2095931" CompressedSize="629630" RemotePath="UnrealEngine-30001" />
  </Packs>
</DependencyManifest>
"#;

/// Header written at the start of synthetic packs.
pub const PACK_HEADER: &[u8] = b"UEPACK00";

/// An [`EventSink`] that records every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    /// Return a snapshot of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Return the recorded events at warning level or above.
    pub fn warnings(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.level() <= log::Level::Warn)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Gzip-compress `data`.
///
/// # Errors
///
/// Returns an error if the in-memory encoder fails.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// A pack holding [`PACK_HEADER`] followed by `content`.
pub fn pack_with_content(content: &[u8]) -> Vec<u8> {
    let mut pack = PACK_HEADER.to_vec();
    pack.extend_from_slice(content);
    pack
}

/// A manifest with one file stored after [`PACK_HEADER`] in one pack.
///
/// The file's expected hash is the SHA-1 of `content`.
pub fn single_file_manifest(name: &str, content: &[u8], pack_hash: &str) -> Manifest {
    let blob_hash = format!("blob-{pack_hash}");
    Manifest::new(
        "https://cdn.example.test/dependencies",
        vec![File::new(name, blob_hash.as_str()).with_expected_hash(sha1_hex(content))],
        vec![Blob::new(
            blob_hash.as_str(),
            pack_hash,
            PACK_HEADER.len() as u64,
            content.len() as u64,
        )],
        vec![Pack::new(pack_hash, "UnrealEngine-1")],
    )
}

/// Render `manifest` as a descriptor the parser accepts.
///
/// Names and hashes are written verbatim, so fixtures must not contain XML
/// metacharacters.
pub fn manifest_xml(manifest: &Manifest) -> String {
    use std::fmt::Write as _;

    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<DependencyManifest BaseUrl=\"{}\">\n  <Files>\n",
        manifest.base_url()
    );
    for file in manifest.files() {
        let _ = writeln!(
            xml,
            "    <File Name=\"{}\" Hash=\"{}\" ExpectedHash=\"{}\" Timestamp=\"{}\" IsExecutable=\"{}\" />",
            file.name, file.content_hash, file.expected_hash, file.timestamp, file.is_executable
        );
    }
    xml.push_str("  </Files>\n  <Blobs>\n");
    for blob in manifest.blobs() {
        let _ = writeln!(
            xml,
            "    <Blob Hash=\"{}\" Size=\"{}\" PackHash=\"{}\" PackOffset=\"{}\" />",
            blob.hash, blob.size, blob.pack_hash, blob.pack_offset
        );
    }
    xml.push_str("  </Blobs>\n  <Packs>\n");
    for pack in manifest.packs() {
        let _ = writeln!(
            xml,
            "    <Pack Hash=\"{}\" Size=\"{}\" CompressedSize=\"{}\" RemotePath=\"{}\" />",
            pack.hash, pack.size, pack.compressed_size, pack.remote_path
        );
    }
    xml.push_str("  </Packs>\n</DependencyManifest>\n");
    xml
}

/// Write `pack` gzip-compressed to the local cache layout under `packs_dir`.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_cached_pack(packs_dir: &Path, pack_hash: &str, pack: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(packs_dir)?;
    let path = packs_dir.join(format!("{pack_hash}.pack.gz"));
    std::fs::write(&path, gzip(pack)?)?;
    Ok(path)
}

/// A [`PackSource`] serving compressed packs from memory.
///
/// Packs that were never inserted are reported as missing, like an absent
/// cache entry.
#[derive(Debug, Default)]
pub struct MemoryPackSource {
    packs: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl MemoryPackSource {
    /// Store `pack` gzip-compressed under `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn insert(&mut self, hash: &str, pack: &[u8]) -> io::Result<()> {
        self.packs.insert(hash.to_owned(), gzip(pack)?);
        Ok(())
    }

    /// Store `compressed` verbatim under `hash`.
    pub fn insert_raw(&mut self, hash: &str, compressed: Vec<u8>) {
        self.packs.insert(hash.to_owned(), compressed);
    }

    /// Hashes of every pack requested so far, in request order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl PackSource for MemoryPackSource {
    fn location(&self, pack: &Pack) -> String {
        format!("memory://{}", pack.hash)
    }

    fn read_compressed(
        &self,
        pack: &Pack,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        cancel.check()?;
        self.requested
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(pack.hash.clone());
        Ok(self.packs.get(&pack.hash).cloned())
    }
}
