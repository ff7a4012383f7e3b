//! CLI argument definitions for the `gitdeps` binary.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the entrypoint so the binary stays focused on orchestration and the
//! argument surface can be tested directly.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::output::UrlFormat;
use crate::verification::HashPolicy;

/// Resolve, fetch, and extract Unreal Engine dependency packs.
#[derive(Parser, Debug)]
#[command(name = "gitdeps")]
#[command(version, about)]
#[command(long_about = concat!(
    "Resolve, fetch, and extract Unreal Engine dependency packs.\n\n",
    "A checkout's .ue4dependencies manifest lists the binary files the engine ",
    "needs, the content blobs backing them, and the gzip-compressed packs those ",
    "blobs live in. This tool selects the packs a set of path prefixes requires, ",
    "reads them from a local cache or the CDN, and writes the files into an ",
    "output tree, verifying SHA-1 digests along the way.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Extract binaries from pre-downloaded packs:\n",
    "    $ gitdeps extract -i UnrealEngine --packs-dir packs -o out --prefix Engine/Binaries\n\n",
    "  Download and extract everything:\n",
    "    $ gitdeps download -i UnrealEngine -o out\n\n",
    "  Print pack URLs as Bazel attributes:\n",
    "    $ gitdeps urls -i UnrealEngine --format bazel\n\n",
    "  Summarise every manifest in a tree:\n",
    "    $ gitdeps inspect -i UnrealEngine --recursive",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase diagnostic output (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only report errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract files from a directory of pre-downloaded packs.
    Extract(ExtractArgs),

    /// Download packs from the CDN and extract them.
    Download(DownloadArgs),

    /// Print the URLs of the packs a selection needs.
    Urls(UrlsArgs),

    /// Summarise one manifest or every manifest under a directory.
    Inspect(InspectArgs),
}

/// Options shared by `extract` and `download`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Manifest file, or a directory containing `.ue4dependencies`.
    #[arg(short = 'i', long = "manifest", alias = "input", value_name = "PATH", default_value = ".")]
    pub manifest: Utf8PathBuf,

    /// Root of the extracted file tree [default: current directory].
    #[arg(short, long = "output-dir", alias = "output", value_name = "DIR")]
    pub output_dir: Option<Utf8PathBuf>,

    /// Only extract files under this path prefix (repeatable).
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: Vec<String>,

    /// How to treat SHA-1 mismatches [default: warn].
    #[arg(long, value_enum, value_name = "POLICY")]
    pub verify: Option<HashPolicy>,

    /// Stop starting new packs after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Give up on the whole run after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Number of worker threads [default: available parallelism].
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Configuration file [default: ./gitdeps.toml when present].
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,
}

/// Arguments for the `extract` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,

    /// Directory holding `<hash>.pack.gz` files.
    #[arg(long, value_name = "DIR")]
    pub packs_dir: Option<Utf8PathBuf>,
}

/// Arguments for the `download` command.
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Shared run options.
    #[command(flatten)]
    pub run: RunArgs,

    /// CDN base URL [default: the manifest's BaseUrl].
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Arguments for the `urls` command.
#[derive(Args, Debug, Clone)]
pub struct UrlsArgs {
    /// Manifest file, or a directory containing `.ue4dependencies`.
    #[arg(short = 'i', long = "manifest", alias = "input", value_name = "PATH", default_value = ".")]
    pub manifest: Utf8PathBuf,

    /// Only list packs backing files under this path prefix (repeatable).
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: Vec<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = UrlFormat::Json)]
    pub format: UrlFormat,

    /// CDN base URL [default: the manifest's BaseUrl].
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Arguments for the `inspect` command.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Manifest file, or a directory containing `.ue4dependencies`.
    #[arg(short = 'i', long = "manifest", alias = "input", value_name = "PATH", default_value = ".")]
    pub manifest: Utf8PathBuf,

    /// Search the directory tree for every `.ue4dependencies` file.
    #[arg(short, long)]
    pub recursive: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
