//! Command implementations behind the `gitdeps` subcommands.
//!
//! The binary parses arguments and builds the event sink; everything else
//! happens here so commands can be driven from tests with an in-memory
//! writer and a recording sink.

use std::io::Write;
use std::path::Path;

use camino::Utf8Path;

use crate::cancel::CancellationToken;
use crate::cli::{Cli, Command, DownloadArgs, ExtractArgs, InspectArgs, RunArgs, UrlsArgs};
use crate::config::{FileConfig, RunSettings};
use crate::coordinator::{Coordinator, RunOptions, RunReport};
use crate::error::{GitDepsError, Result};
use crate::events::{Event, EventSink};
use crate::fetch::{HttpPackSource, LocalPackSource, PackSource};
use crate::manifest::{Manifest, discover_manifests, load_manifest, resolve_manifest_path};
use crate::output::{ManifestSummary, format_urls, run_summary, write_line};
use crate::resolver::{ManifestIndex, PrefixFilter, pack_urls};

/// Run the subcommand selected on the command line.
///
/// Command results are written to `stdout`; diagnostics go to `sink`.
///
/// # Errors
///
/// Returns the first error that ends the command, including an aggregated
/// [`crate::coordinator::CoordinatorError`] when packs fail.
pub fn dispatch(cli: &Cli, sink: &dyn EventSink, stdout: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Extract(args) => run_extract(args, cli.quiet, sink, stdout),
        Command::Download(args) => run_download(args, cli.quiet, sink, stdout),
        Command::Urls(args) => run_urls(args, sink, stdout),
        Command::Inspect(args) => run_inspect(args, sink, stdout),
    }
}

/// Extract from a directory of cached `<hash>.pack.gz` files.
///
/// # Errors
///
/// Fails when the manifest or configuration is unusable, when no pack
/// directory is configured, or when any pack fails.
pub fn run_extract(
    args: &ExtractArgs,
    quiet: bool,
    sink: &dyn EventSink,
    stdout: &mut dyn Write,
) -> Result<()> {
    let settings = settings_for(&args.run)?.with_packs_dir(args.packs_dir.clone());
    let source = LocalPackSource::new(settings.require_packs_dir()?);
    let manifest = load_reporting(&args.run.manifest, sink)?;
    let report = run_pipeline(&manifest, &settings, &source, sink)?;
    report_success(&report, quiet, stdout)
}

/// Download packs from the CDN and extract them.
///
/// The base URL comes from `--base-url`, then the configuration file, then
/// the manifest's `BaseUrl`.
///
/// # Errors
///
/// Fails when the manifest or configuration is unusable, when no base URL
/// is available, or when any pack fails.
pub fn run_download(
    args: &DownloadArgs,
    quiet: bool,
    sink: &dyn EventSink,
    stdout: &mut dyn Write,
) -> Result<()> {
    let settings = settings_for(&args.run)?.with_base_url(args.base_url.clone());
    let manifest = load_reporting(&args.run.manifest, sink)?;
    let base_url = effective_base_url(settings.base_url.as_deref(), &manifest, &args.run.manifest)?;
    let source = HttpPackSource::new(base_url, settings.timeout);
    let report = run_pipeline(&manifest, &settings, &source, sink)?;
    report_success(&report, quiet, stdout)
}

/// Print the URLs of the packs a selection needs.
///
/// # Errors
///
/// Fails when the manifest cannot be loaded, when no base URL is available,
/// or when stdout cannot be written.
pub fn run_urls(args: &UrlsArgs, sink: &dyn EventSink, stdout: &mut dyn Write) -> Result<()> {
    let manifest = load_reporting(&args.manifest, sink)?;
    let base_url = effective_base_url(args.base_url.as_deref(), &manifest, &args.manifest)?;
    let index = ManifestIndex::new(&manifest);
    let urls = pack_urls(&index, &base_url, &PrefixFilter::new(&args.prefix), sink);
    write_line(stdout, &format_urls(&urls, args.format))
        .map_err(|source| GitDepsError::WriteFailed { source })
}

/// Summarise one manifest, or every manifest beneath a directory.
///
/// # Errors
///
/// Fails when a named manifest cannot be loaded, when the tree cannot be
/// walked, or when stdout cannot be written. Broken manifests found during
/// a recursive search are reported to `sink` and skipped.
pub fn run_inspect(args: &InspectArgs, sink: &dyn EventSink, stdout: &mut dyn Write) -> Result<()> {
    let summaries = if args.recursive {
        discover_manifests(args.manifest.as_std_path(), sink)?
            .into_iter()
            .map(|found| {
                emit_loaded(&found.path, &found.manifest, sink);
                ManifestSummary::new(&found.path, &found.manifest)
            })
            .collect()
    } else {
        let path = resolve_manifest_path(args.manifest.as_std_path())?;
        let manifest = load_manifest(&path)?;
        emit_loaded(&path, &manifest, sink);
        vec![ManifestSummary::new(&path, &manifest)]
    };

    for summary in summaries {
        write_line(stdout, &summary.display_text())
            .map_err(|source| GitDepsError::WriteFailed { source })?;
    }
    Ok(())
}

fn settings_for(args: &RunArgs) -> Result<RunSettings> {
    let file = FileConfig::discover(args.config.as_deref())?;
    Ok(RunSettings::resolve(args, &file)?)
}

fn load_reporting(input: &Utf8Path, sink: &dyn EventSink) -> Result<Manifest> {
    let path = resolve_manifest_path(input.as_std_path())?;
    let manifest = load_manifest(&path)?;
    emit_loaded(&path, &manifest, sink);
    Ok(manifest)
}

fn emit_loaded(path: &Path, manifest: &Manifest, sink: &dyn EventSink) {
    sink.emit(&Event::ManifestLoaded {
        path: path.display().to_string(),
        files: manifest.files().len(),
        blobs: manifest.blobs().len(),
        packs: manifest.packs().len(),
    });
}

fn effective_base_url(
    configured: Option<&str>,
    manifest: &Manifest,
    input: &Utf8Path,
) -> Result<String> {
    let base_url = configured
        .unwrap_or_else(|| manifest.base_url())
        .trim()
        .trim_end_matches('/');
    if base_url.is_empty() {
        return Err(GitDepsError::MissingBaseUrl {
            manifest: input.to_string(),
        });
    }
    Ok(base_url.to_owned())
}

fn run_pipeline(
    manifest: &Manifest,
    settings: &RunSettings,
    source: &dyn PackSource,
    sink: &dyn EventSink,
) -> Result<RunReport> {
    let cancel = settings
        .timeout
        .map_or_else(CancellationToken::new, CancellationToken::with_timeout);
    let options = RunOptions {
        workers: settings.workers,
        stop_on_first_error: settings.fail_fast,
        hash_policy: settings.hash_policy,
        cancel,
    };
    let filter = PrefixFilter::new(&settings.prefixes);
    let report = Coordinator::new(source, sink, options).run(
        manifest,
        &filter,
        settings.output_dir.as_std_path(),
    )?;
    Ok(report)
}

fn report_success(report: &RunReport, quiet: bool, stdout: &mut dyn Write) -> Result<()> {
    if quiet {
        return Ok(());
    }
    write_line(stdout, &run_summary(report)).map_err(|source| GitDepsError::WriteFailed { source })
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
