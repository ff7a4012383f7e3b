//! Structured progress, warning, and error events.
//!
//! Every component receives an [`EventSink`] explicitly instead of reaching
//! for a process-wide logger. The CLI renders events to stderr through a
//! [`WriterSink`]; library consumers that already run a `log` backend can
//! use [`LogSink`]; tests record events and assert on them.

use log::{Level, LevelFilter};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Log target used when events are forwarded to the `log` facade.
pub const LOG_TARGET: &str = "ue_gitdeps";

/// A structured diagnostic emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A descriptor was loaded.
    ManifestLoaded {
        /// Path the descriptor was read from.
        path: String,
        /// Number of files it lists.
        files: usize,
        /// Number of blobs it lists.
        blobs: usize,
        /// Number of packs it lists.
        packs: usize,
    },
    /// A descriptor found during discovery could not be loaded.
    ManifestSkipped {
        /// Path of the descriptor.
        path: String,
        /// Why it was skipped.
        reason: String,
    },
    /// A prefix filter narrowed the set of files in scope.
    PrefixFilterApplied {
        /// The prefixes in effect.
        prefixes: Vec<String>,
        /// Files selected by the filter.
        selected: usize,
        /// Files in the manifest.
        total: usize,
    },
    /// A file names a content hash that no blob carries.
    BlobMissing {
        /// The file that cannot be extracted.
        file: String,
        /// The unmatched content hash.
        hash: String,
    },
    /// A blob names a pack hash that no pack carries.
    PackUnknown {
        /// The orphaned blob.
        blob: String,
        /// The unmatched pack hash.
        pack: String,
    },
    /// The coordinator is about to process packs.
    RunStarted {
        /// Packs selected for fetching.
        packs: usize,
        /// Worker threads in the pool.
        workers: usize,
    },
    /// A pack is absent from the local cache and was skipped.
    PackMissing {
        /// Pack hash.
        pack: String,
        /// Where the pack was expected.
        location: String,
    },
    /// A pack was fetched and decompressed.
    PackFetched {
        /// Pack hash.
        pack: String,
        /// Decompressed size in bytes.
        bytes: usize,
    },
    /// A file was written to the output tree.
    FileExtracted {
        /// File name relative to the output root.
        file: String,
        /// Bytes written.
        bytes: usize,
    },
    /// The SHA-1 of extracted content differs from the manifest.
    HashMismatch {
        /// File name.
        file: String,
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest of the extracted bytes.
        actual: String,
    },
    /// Every in-scope file of a pack was processed.
    PackExtracted {
        /// Pack hash.
        pack: String,
        /// Files written from the pack.
        files: usize,
    },
    /// A pack failed to fetch or extract.
    PackFailed {
        /// Pack hash.
        pack: String,
        /// Rendered error.
        reason: String,
    },
    /// Periodic progress report.
    Progress {
        /// Packs processed so far.
        completed: usize,
        /// Packs selected for processing.
        total: usize,
    },
    /// The coordinator finished.
    RunFinished {
        /// Packs extracted successfully.
        extracted: usize,
        /// Packs skipped because they were not cached locally.
        skipped: usize,
        /// Packs that failed.
        failed: usize,
        /// Packs never started because the run stopped early.
        not_run: usize,
    },
}

impl Event {
    /// Severity of the event.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::PackFetched { .. } | Self::FileExtracted { .. } | Self::PackExtracted { .. } => {
                Level::Debug
            }
            Self::ManifestLoaded { .. }
            | Self::PrefixFilterApplied { .. }
            | Self::RunStarted { .. }
            | Self::Progress { .. }
            | Self::RunFinished { .. } => Level::Info,
            Self::ManifestSkipped { .. }
            | Self::BlobMissing { .. }
            | Self::PackUnknown { .. }
            | Self::PackMissing { .. }
            | Self::HashMismatch { .. } => Level::Warn,
            Self::PackFailed { .. } => Level::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestLoaded {
                path,
                files,
                blobs,
                packs,
            } => write!(
                f,
                "loaded manifest {path}: {files} files, {blobs} blobs, {packs} packs"
            ),
            Self::ManifestSkipped { path, reason } => {
                write!(f, "skipping manifest {path}: {reason}")
            }
            Self::PrefixFilterApplied {
                prefixes,
                selected,
                total,
            } => write!(
                f,
                "prefix filters [{}]: extracting {selected}/{total} files",
                prefixes.join(", ")
            ),
            Self::BlobMissing { file, hash } => {
                write!(f, "no blob found for file {file} (hash {hash})")
            }
            Self::PackUnknown { blob, pack } => {
                write!(f, "blob {blob} references unknown pack {pack}")
            }
            Self::RunStarted { packs, workers } => {
                write!(f, "extracting {packs} packs using {workers} workers")
            }
            Self::PackMissing { pack, location } => {
                write!(f, "pack {pack} not found at {location}")
            }
            Self::PackFetched { pack, bytes } => {
                write!(f, "fetched pack {pack} ({bytes} bytes decompressed)")
            }
            Self::FileExtracted { file, bytes } => write!(f, "extracted {file} ({bytes} bytes)"),
            Self::HashMismatch {
                file,
                expected,
                actual,
            } => write!(
                f,
                "file {file} hash mismatch: expected {expected}, got {actual}"
            ),
            Self::PackExtracted { pack, files } => {
                write!(f, "extracted {files} files from pack {pack}")
            }
            Self::PackFailed { pack, reason } => write!(f, "pack {pack} failed: {reason}"),
            Self::Progress { completed, total } => {
                write!(f, "processed {completed}/{total} packs")
            }
            Self::RunFinished {
                extracted,
                skipped,
                failed,
                not_run,
            } => {
                write!(
                    f,
                    "finished: {extracted} extracted, {skipped} skipped, {failed} failed"
                )?;
                if *not_run > 0 {
                    write!(f, ", {not_run} not started")?;
                }
                Ok(())
            }
        }
    }
}

/// Receiver for pipeline events.
///
/// Sinks are shared by every worker thread, so implementations must be
/// thread-safe and must not block for long.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Record one event.
    fn emit(&self, event: &Event);
}

/// Forwards events to the `log` facade under [`LOG_TARGET`].
///
/// # Examples
///
/// ```
/// use ue_gitdeps::events::{Event, EventSink, LogSink};
///
/// LogSink.emit(&Event::Progress { completed: 100, total: 250 });
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &Event) {
        log::log!(target: LOG_TARGET, event.level(), "{event}");
    }
}

/// Writes events at or above a level threshold as lines to a writer.
///
/// Warnings and errors are prefixed with their level so they stand out in
/// terminal output; informational lines are written bare.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
    max_level: LevelFilter,
}

impl<W: Write + Send> WriterSink<W> {
    /// Create a sink that writes events up to `max_level` verbosity.
    #[must_use]
    pub fn new(writer: W, max_level: LevelFilter) -> Self {
        Self {
            writer: Mutex::new(writer),
            max_level,
        }
    }

    /// Choose the threshold from CLI verbosity flags.
    ///
    /// `quiet` keeps errors only; otherwise one `-v` enables debug output and
    /// two or more enable trace output.
    #[must_use]
    pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
        match (quiet, verbosity) {
            (true, _) => LevelFilter::Error,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        }
    }

    /// Consume the sink and return the writer.
    ///
    /// A poisoned lock still yields the writer; lines written before the
    /// panic are kept.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for WriterSink<W> {
    fn emit(&self, event: &Event) {
        let level = event.level();
        if level > self.max_level {
            return;
        }
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = match level {
            Level::Error | Level::Warn => writeln!(writer, "{level}: {event}"),
            Level::Info | Level::Debug | Level::Trace => writeln!(writer, "{event}"),
        };
        if result.is_err() {
            // Best-effort output; ignore write failures.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mismatch() -> Event {
        Event::HashMismatch {
            file: "Engine/a.dll".to_owned(),
            expected: "aa".to_owned(),
            actual: "bb".to_owned(),
        }
    }

    #[rstest]
    #[case::debug(Event::FileExtracted { file: "a".to_owned(), bytes: 1 }, Level::Debug)]
    #[case::info(Event::Progress { completed: 100, total: 200 }, Level::Info)]
    #[case::warn(mismatch(), Level::Warn)]
    #[case::error(Event::PackFailed { pack: "p".to_owned(), reason: "boom".to_owned() }, Level::Error)]
    fn events_carry_expected_level(#[case] event: Event, #[case] expected: Level) {
        assert_eq!(event.level(), expected);
    }

    #[test]
    fn writer_sink_filters_below_threshold() {
        let sink = WriterSink::new(Vec::new(), LevelFilter::Info);
        sink.emit(&Event::FileExtracted {
            file: "hidden".to_owned(),
            bytes: 3,
        });
        sink.emit(&Event::Progress {
            completed: 100,
            total: 300,
        });
        let output = String::from_utf8(sink.into_inner()).expect("UTF-8 output");
        assert!(!output.contains("hidden"));
        assert_eq!(output, "processed 100/300 packs\n");
    }

    #[test]
    fn writer_sink_prefixes_warnings() {
        let sink = WriterSink::new(Vec::new(), LevelFilter::Error);
        sink.emit(&mismatch());
        sink.emit(&Event::PackFailed {
            pack: "p1".to_owned(),
            reason: "gzip header invalid".to_owned(),
        });
        let output = String::from_utf8(sink.into_inner()).expect("UTF-8 output");
        assert_eq!(output, "ERROR: pack p1 failed: gzip header invalid\n");
    }

    #[rstest]
    #[case::quiet(0, true, LevelFilter::Error)]
    #[case::quiet_wins(2, true, LevelFilter::Error)]
    #[case::default(0, false, LevelFilter::Info)]
    #[case::verbose(1, false, LevelFilter::Debug)]
    #[case::very_verbose(3, false, LevelFilter::Trace)]
    fn level_for_maps_flags(#[case] verbosity: u8, #[case] quiet: bool, #[case] expected: LevelFilter) {
        assert_eq!(WriterSink::<Vec<u8>>::level_for(verbosity, quiet), expected);
    }

    #[test]
    fn log_sink_forwards_to_log_facade() {
        let mut logger = logtest::Logger::start();
        LogSink.emit(&mismatch());

        let mut found = false;
        while let Some(record) = logger.pop() {
            if record.target() == LOG_TARGET && record.args().contains("hash mismatch") {
                assert_eq!(record.level(), Level::Warn);
                found = true;
            }
        }
        assert!(found, "expected a forwarded warning record");
    }

    #[test]
    fn run_finished_mentions_unstarted_packs_only_when_present() {
        let finished = Event::RunFinished {
            extracted: 3,
            skipped: 1,
            failed: 0,
            not_run: 0,
        };
        assert_eq!(
            finished.to_string(),
            "finished: 3 extracted, 1 skipped, 0 failed"
        );

        let stopped = Event::RunFinished {
            extracted: 1,
            skipped: 0,
            failed: 1,
            not_run: 4,
        };
        assert!(stopped.to_string().ends_with(", 4 not started"));
    }
}
