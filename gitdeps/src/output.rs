//! Output formatting for the `gitdeps` CLI.
//!
//! Everything a command prints to stdout is rendered here so the command
//! layer only decides *what* to print. Diagnostics go through
//! [`crate::events`] instead.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use crate::coordinator::RunReport;
use crate::manifest::Manifest;
use crate::resolver::pack_url;

/// Output format for the `urls` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UrlFormat {
    /// A single-line JSON array of strings.
    #[default]
    Json,
    /// `urls = ["…"],` attribute fragments for a Bazel `http_archive`.
    Bazel,
}

/// Render pack URLs in the requested format.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::output::{UrlFormat, format_urls};
///
/// let urls = vec!["https://cdn/a/1".to_owned(), "https://cdn/a/2".to_owned()];
/// assert_eq!(
///     format_urls(&urls, UrlFormat::Json),
///     r#"["https://cdn/a/1","https://cdn/a/2"]"#,
/// );
/// assert_eq!(
///     format_urls(&urls, UrlFormat::Bazel),
///     r#"urls = ["https://cdn/a/1"],urls = ["https://cdn/a/2"],"#,
/// );
/// ```
#[must_use]
pub fn format_urls(urls: &[String], format: UrlFormat) -> String {
    match format {
        UrlFormat::Json => serde_json::to_string(urls).unwrap_or_else(|_| "[]".to_owned()),
        UrlFormat::Bazel => urls.iter().fold(String::new(), |mut out, url| {
            let quoted = serde_json::to_string(url).unwrap_or_else(|_| format!("\"{url}\""));
            let _ = write!(out, "urls = [{quoted}],");
            out
        }),
    }
}

/// Headline numbers for one manifest, as printed by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSummary {
    /// Where the descriptor was read from.
    pub path: String,
    /// The manifest's CDN base URL.
    pub base_url: String,
    /// Number of files listed.
    pub files: usize,
    /// Number of blobs listed.
    pub blobs: usize,
    /// Number of packs listed.
    pub packs: usize,
    /// URL and compressed size of the first pack, when there is one.
    pub first_pack: Option<(String, u64)>,
}

impl ManifestSummary {
    /// Summarise `manifest`, read from `path`.
    #[must_use]
    pub fn new(path: &Path, manifest: &Manifest) -> Self {
        Self {
            path: path.display().to_string(),
            base_url: manifest.base_url().to_owned(),
            files: manifest.files().len(),
            blobs: manifest.blobs().len(),
            packs: manifest.packs().len(),
            first_pack: manifest
                .packs()
                .first()
                .map(|pack| (pack_url(manifest.base_url(), pack), pack.compressed_size)),
        }
    }

    /// Multi-line text for terminal output.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut text = format!(
            "{}\n  base url: {}\n  files: {}, blobs: {}, packs: {}",
            self.path, self.base_url, self.files, self.blobs, self.packs
        );
        if let Some((url, compressed_size)) = &self.first_pack {
            let _ = write!(text, "\n  url: {url}, compressed size: {compressed_size}");
        }
        text
    }
}

/// One-line summary of a successful run.
#[must_use]
pub fn run_summary(report: &RunReport) -> String {
    let mut text = format!(
        "Extracted {} files ({} bytes) from {} of {} packs",
        report.files_written, report.bytes_written, report.packs_extracted, report.packs_total
    );
    if !report.packs_skipped.is_empty() {
        let _ = write!(text, "; {} not cached", report.packs_skipped.len());
    }
    if report.hash_mismatches > 0 {
        let _ = write!(text, "; {} hash mismatches", report.hash_mismatches);
    }
    if report.blobs_missing > 0 {
        let _ = write!(text, "; {} files without a blob", report.blobs_missing);
    }
    text
}

/// Write `message` and a newline to `out`.
///
/// # Errors
///
/// Returns the underlying I/O error; stdout output is the command's result,
/// so a failed write is reported rather than ignored.
pub fn write_line(out: &mut dyn Write, message: &str) -> std::io::Result<()> {
    writeln!(out, "{message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Pack;
    use rstest::rstest;

    fn urls() -> Vec<String> {
        vec![
            "http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/001a346e".to_owned(),
            "http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/ff00".to_owned(),
        ]
    }

    #[test]
    fn json_is_a_compact_array() {
        assert_eq!(
            format_urls(&urls(), UrlFormat::Json),
            concat!(
                r#"["http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/001a346e","#,
                r#""http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/ff00"]"#,
            )
        );
    }

    #[test]
    fn bazel_fragments_are_concatenated() {
        assert_eq!(
            format_urls(&urls(), UrlFormat::Bazel),
            concat!(
                r#"urls = ["http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/001a346e"],"#,
                r#"urls = ["http://cdn.unrealengine.com/dependencies/UnrealEngine-30001/ff00"],"#,
            )
        );
    }

    #[rstest]
    #[case::json(UrlFormat::Json, "[]")]
    #[case::bazel(UrlFormat::Bazel, "")]
    fn empty_lists(#[case] format: UrlFormat, #[case] expected: &str) {
        assert_eq!(format_urls(&[], format), expected);
    }

    #[test]
    fn summary_reports_first_pack() {
        let mut pack = Pack::new("001a346e", "UnrealEngine-30001");
        pack.compressed_size = 1_048_576;
        let manifest = Manifest::new("http://cdn.example.test", vec![], vec![], vec![pack]);

        let summary = ManifestSummary::new(Path::new("UE/.ue4dependencies"), &manifest);
        let text = summary.display_text();

        assert!(text.starts_with("UE/.ue4dependencies\n"));
        assert!(text.contains("files: 0, blobs: 0, packs: 1"));
        assert!(text.ends_with(
            "url: http://cdn.example.test/UnrealEngine-30001/001a346e, compressed size: 1048576"
        ));
    }

    #[test]
    fn summary_of_packless_manifest_omits_url() {
        let summary = ManifestSummary::new(Path::new("m"), &Manifest::default());
        assert!(summary.first_pack.is_none());
        assert_eq!(
            summary.display_text(),
            "m\n  base url: \n  files: 0, blobs: 0, packs: 0"
        );
    }

    #[rstest]
    #[case::clean(RunReport { files_written: 3, bytes_written: 42, packs_extracted: 2, packs_total: 2, ..RunReport::default() },
        "Extracted 3 files (42 bytes) from 2 of 2 packs")]
    #[case::skipped(RunReport { packs_total: 2, packs_extracted: 1, packs_skipped: vec!["p".to_owned()], ..RunReport::default() },
        "Extracted 0 files (0 bytes) from 1 of 2 packs; 1 not cached")]
    #[case::mismatch(RunReport { hash_mismatches: 2, ..RunReport::default() },
        "Extracted 0 files (0 bytes) from 0 of 0 packs; 2 hash mismatches")]
    fn run_summary_lines(#[case] report: RunReport, #[case] expected: &str) {
        assert_eq!(run_summary(&report), expected);
    }
}
