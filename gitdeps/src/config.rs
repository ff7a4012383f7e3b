//! Optional TOML configuration merged with command-line flags.
//!
//! Settings live in `gitdeps.toml`, either named with `--config` or found in
//! the current directory. Every key is optional. A value given on the command
//! line wins over the file, and the file wins over the built-in default.

use std::num::NonZeroUsize;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::cli::RunArgs;
use crate::coordinator::default_workers;
use crate::verification::HashPolicy;

/// File name looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "gitdeps.toml";

/// Errors arising from configuration loading and merging.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("invalid config {path}")]
    Parse {
        /// The file being parsed.
        path: Utf8PathBuf,
        /// The TOML decoding error.
        #[source]
        source: toml::de::Error,
    },

    /// A worker count of zero was requested.
    #[error("workers must be at least 1")]
    ZeroWorkers,

    /// `extract` needs a pack cache and none was configured.
    #[error("no pack cache configured; pass --packs-dir or set packs_dir in gitdeps.toml")]
    MissingPacksDir,
}

/// Contents of a `gitdeps.toml` file.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::config::FileConfig;
/// use ue_gitdeps::verification::HashPolicy;
///
/// let config = FileConfig::from_toml_str(r#"
/// packs_dir = "/var/cache/ue-packs"
/// prefixes = ["Engine/Binaries"]
/// verify = "strict"
/// "#).expect("valid config");
/// assert_eq!(config.verify, Some(HashPolicy::Strict));
/// assert_eq!(config.prefixes, ["Engine/Binaries"]);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding `<hash>.pack.gz` files.
    pub packs_dir: Option<Utf8PathBuf>,
    /// Root of the extracted file tree.
    pub output_dir: Option<Utf8PathBuf>,
    /// Path prefixes selecting the files to extract.
    pub prefixes: Vec<String>,
    /// Digest verification policy.
    pub verify: Option<HashPolicy>,
    /// Stop starting new packs after the first failure.
    pub fail_fast: Option<bool>,
    /// Overall deadline for a run, in seconds.
    pub timeout_secs: Option<u64>,
    /// Size of the worker pool.
    pub workers: Option<usize>,
    /// CDN base URL overriding the manifest's `BaseUrl`.
    pub base_url: Option<String>,
}

impl FileConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Read the file named by `explicit`, or [`DEFAULT_CONFIG_FILE`] when it
    /// exists in the current directory, or fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when an explicitly named file cannot be
    /// read and [`ConfigError::Parse`] when a file is malformed.
    pub fn discover(explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Utf8Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective settings for `extract` and `download` after merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSettings {
    /// Pack cache directory, when one is configured.
    pub packs_dir: Option<Utf8PathBuf>,
    /// Root of the extracted file tree.
    pub output_dir: Utf8PathBuf,
    /// Path prefixes selecting the files to extract.
    pub prefixes: Vec<String>,
    /// Digest verification policy.
    pub hash_policy: HashPolicy,
    /// Stop starting new packs after the first failure.
    pub fail_fast: bool,
    /// Overall deadline for the run.
    pub timeout: Option<Duration>,
    /// Size of the worker pool.
    pub workers: NonZeroUsize,
    /// CDN base URL overriding the manifest's.
    pub base_url: Option<String>,
}

impl RunSettings {
    /// Merge command-line arguments over file configuration.
    ///
    /// Prefixes from the command line replace those from the file rather
    /// than extending them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroWorkers`] when either source asks for zero
    /// workers.
    pub fn resolve(args: &RunArgs, file: &FileConfig) -> Result<Self, ConfigError> {
        let workers = match args.workers.or(file.workers) {
            Some(count) => NonZeroUsize::new(count).ok_or(ConfigError::ZeroWorkers)?,
            None => default_workers(),
        };
        let prefixes = if args.prefix.is_empty() {
            file.prefixes.clone()
        } else {
            args.prefix.clone()
        };
        Ok(Self {
            packs_dir: file.packs_dir.clone(),
            output_dir: args
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| Utf8PathBuf::from(".")),
            prefixes,
            hash_policy: args.verify.or(file.verify).unwrap_or_default(),
            fail_fast: args.fail_fast || file.fail_fast.unwrap_or(false),
            timeout: args
                .timeout_secs
                .or(file.timeout_secs)
                .map(Duration::from_secs),
            workers,
            base_url: file.base_url.clone(),
        })
    }

    /// Let a command-line pack directory win over the file's.
    #[must_use]
    pub fn with_packs_dir(mut self, packs_dir: Option<Utf8PathBuf>) -> Self {
        if packs_dir.is_some() {
            self.packs_dir = packs_dir;
        }
        self
    }

    /// Let a command-line base URL win over the file's.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if base_url.is_some() {
            self.base_url = base_url;
        }
        self
    }

    /// The configured pack directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPacksDir`] when none is set.
    pub fn require_packs_dir(&self) -> Result<&Utf8Path, ConfigError> {
        self.packs_dir.as_deref().ok_or(ConfigError::MissingPacksDir)
    }
}
