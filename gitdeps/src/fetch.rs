//! Pack retrieval from a local cache or the CDN.
//!
//! A [`PackSource`] produces the raw gzip bytes of a pack; [`fetch`] wraps a
//! source with cancellation checks and decompression. Sources are shared by
//! every worker thread, so they hold no per-request state.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use flate2::read::GzDecoder;

use crate::cancel::{CancellationToken, Cancelled};
use crate::manifest::Pack;
use crate::resolver::pack_url;

/// File name suffix of packs in the local cache.
pub const CACHED_PACK_SUFFIX: &str = ".pack.gz";

/// Errors arising from pack retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The run was cancelled or its deadline passed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Reading a cached pack failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The cached pack path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The CDN answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The request failed before a status was received, or the body could
    /// not be read.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The requested URL.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The pack bytes are not a valid gzip stream.
    #[error("failed to decompress pack {pack}: {source}")]
    Decompress {
        /// The pack hash.
        pack: String,
        /// The decoder error.
        #[source]
        source: io::Error,
    },
}

/// Where compressed packs come from.
///
/// Abstractions allow tests to substitute pack bytes without a cache
/// directory or network access.
#[cfg_attr(test, mockall::automock)]
pub trait PackSource: Send + Sync {
    /// Human-readable location of `pack`, used in diagnostics.
    fn location(&self, pack: &Pack) -> String;

    /// Read the compressed bytes of `pack`.
    ///
    /// Returns `Ok(None)` when the source does not hold the pack.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the pack exists but cannot be read.
    fn read_compressed(
        &self,
        pack: &Pack,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError>;
}

/// Reads packs from a pre-downloaded cache directory.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::fetch::{LocalPackSource, PackSource};
/// use ue_gitdeps::manifest::Pack;
///
/// let source = LocalPackSource::new("/var/cache/ue-packs");
/// let pack = Pack::new("001a346e", "UnrealEngine-30001");
/// assert_eq!(source.location(&pack), "/var/cache/ue-packs/001a346e.pack.gz");
/// ```
#[derive(Debug, Clone)]
pub struct LocalPackSource {
    packs_dir: PathBuf,
}

impl LocalPackSource {
    /// Create a source reading `<packs_dir>/<hash>.pack.gz`.
    #[must_use]
    pub fn new(packs_dir: impl Into<PathBuf>) -> Self {
        Self {
            packs_dir: packs_dir.into(),
        }
    }

    fn path_for(&self, pack: &Pack) -> PathBuf {
        self.packs_dir
            .join(format!("{}{CACHED_PACK_SUFFIX}", pack.hash))
    }
}

impl PackSource for LocalPackSource {
    fn location(&self, pack: &Pack) -> String {
        self.path_for(pack).display().to_string()
    }

    fn read_compressed(
        &self,
        pack: &Pack,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        cancel.check()?;
        let path = self.path_for(pack);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FetchError::Io { path, source }),
        }
    }
}

/// Upper bound on a single pack request when no timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Downloads packs from `<base_url>/<remote_path>/<hash>` using `ureq`.
///
/// Every request is bounded by the configured timeout and by whatever is
/// left of the cancellation token's deadline, whichever is shorter.
#[derive(Debug, Clone)]
pub struct HttpPackSource {
    base_url: String,
    timeout: Duration,
    agent: ureq::Agent,
}

impl HttpPackSource {
    /// Create a source for `base_url`; `timeout` bounds each request and
    /// defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let timeout = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            base_url: base_url.into(),
            timeout,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn request_budget(&self, cancel: &CancellationToken) -> Duration {
        cancel
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout))
    }
}

impl PackSource for HttpPackSource {
    fn location(&self, pack: &Pack) -> String {
        pack_url(&self.base_url, pack)
    }

    fn read_compressed(
        &self,
        pack: &Pack,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        cancel.check()?;
        let url = self.location(pack);
        let budget = self.request_budget(cancel);
        if budget.is_zero() {
            return Err(Cancelled::DeadlineExceeded.into());
        }
        let response = self
            .agent
            .get(&url)
            .config()
            .timeout_global(Some(budget))
            .build()
            .call()
            .map_err(|err| {
                cancel
                    .check()
                    .map_or_else(FetchError::from, |()| map_ureq_error(&url, &err))
            })?;
        let mut body = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|err| {
                cancel.check().map_or_else(FetchError::from, |()| FetchError::Http {
                    url: url.clone(),
                    reason: err.to_string(),
                })
            })?;
        Ok(Some(body))
    }
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::HttpStatus {
            url: url.to_owned(),
            status: *status,
        },
        other => FetchError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// The result of [`fetch`].
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The decompressed pack bytes.
    Fetched(Vec<u8>),
    /// The source does not hold the pack.
    Missing {
        /// Where the pack was expected.
        location: String,
    },
}

/// Retrieve and decompress `pack` from `source`.
///
/// # Errors
///
/// Returns [`FetchError::Cancelled`] when `cancel` fires before or after the
/// read, [`FetchError::Decompress`] for an invalid gzip stream, and any error
/// the source reports.
pub fn fetch(
    pack: &Pack,
    source: &dyn PackSource,
    cancel: &CancellationToken,
) -> Result<FetchOutcome, FetchError> {
    cancel.check()?;
    let Some(compressed) = source.read_compressed(pack, cancel)? else {
        return Ok(FetchOutcome::Missing {
            location: source.location(pack),
        });
    };
    cancel.check()?;
    decompress(&pack.hash, &compressed).map(FetchOutcome::Fetched)
}

/// Inflate a complete gzip stream into memory.
///
/// # Errors
///
/// Returns [`FetchError::Decompress`] when the stream is invalid.
pub fn decompress(pack_hash: &str, compressed: &[u8]) -> Result<Vec<u8>, FetchError> {
    let mut data = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut data)
        .map_err(|source| FetchError::Decompress {
            pack: pack_hash.to_owned(),
            source,
        })?;
    Ok(data)
}
