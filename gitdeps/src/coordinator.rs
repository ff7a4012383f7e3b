//! Parallel fetch-and-extract over the packs a manifest needs.
//!
//! The coordinator resolves the manifest, queues one unit of work per pack on
//! a bounded channel, and runs a fixed pool of scoped worker threads. Each
//! worker fetches a pack, extracts its files, and reports the outcome on a
//! second channel that is drained once every worker has joined. Work inside
//! a pack is sequential; packs complete in no particular order.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::cancel::{CancellationToken, Cancelled};
use crate::events::{Event, EventSink};
use crate::extract::{ExtractOptions, ExtractSummary, ExtractionError, extract_pack};
use crate::fetch::{FetchError, FetchOutcome, PackSource, fetch};
use crate::manifest::Manifest;
use crate::manifest::loader::error_chain;
use crate::resolver::{ManifestIndex, PackWork, PrefixFilter, resolve};
use crate::verification::HashPolicy;

/// A progress event is emitted each time this many packs have completed.
pub const PROGRESS_INTERVAL: usize = 100;

/// Worker count used when none is configured.
#[must_use]
pub fn default_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Settings for one coordinator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Size of the worker pool.
    pub workers: NonZeroUsize,
    /// Stop starting new packs after the first failure.
    pub stop_on_first_error: bool,
    /// What a digest mismatch means.
    pub hash_policy: HashPolicy,
    /// Cancels the run from outside; may carry a deadline.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            stop_on_first_error: false,
            hash_policy: HashPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Why a single pack failed.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Retrieving or decompressing the pack failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Materialising the pack's files failed.
    #[error(transparent)]
    Extract(#[from] ExtractionError),
}

impl PackError {
    fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Cancelled(_)) | Self::Extract(ExtractionError::Cancelled(_))
        )
    }
}

/// A failed pack and its error.
#[derive(Debug)]
pub struct PackFailure {
    /// The pack hash.
    pub pack: String,
    /// What went wrong.
    pub error: PackError,
}

impl fmt::Display for PackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pack, error_chain(&self.error))
    }
}

/// Errors returned by [`Coordinator::run`].
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// One or more packs failed; every failure is listed.
    #[error("{} of {total} packs failed: {}", .failures.len(), join_failures(.failures))]
    PacksFailed {
        /// Every failed pack, in manifest order.
        failures: Vec<PackFailure>,
        /// Packs selected for the run.
        total: usize,
        /// Packs never started because the run stopped early.
        not_run: usize,
    },

    /// The cancellation token fired before every pack was processed.
    #[error("run cancelled after {completed} of {total} packs: {reason}")]
    Cancelled {
        /// Why the token fired.
        reason: Cancelled,
        /// Packs processed before cancellation.
        completed: usize,
        /// Packs selected for the run.
        total: usize,
        /// Packs that failed for reasons other than cancellation.
        failures: Vec<PackFailure>,
    },
}

fn join_failures(failures: &[PackFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Totals for a run in which no pack failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Packs selected for the run.
    pub packs_total: usize,
    /// Packs fetched and extracted.
    pub packs_extracted: usize,
    /// Hashes of packs the source did not hold, in manifest order.
    pub packs_skipped: Vec<String>,
    /// Files written across all packs.
    pub files_written: usize,
    /// Bytes written across all packs.
    pub bytes_written: u64,
    /// Files skipped because their blob was absent.
    pub blobs_missing: usize,
    /// Digest mismatches reported as warnings.
    pub hash_mismatches: usize,
}

enum PackOutcome {
    Extracted(ExtractSummary),
    Skipped,
    Failed(PackError),
}

/// Drives fetch and extract for every selected pack.
pub struct Coordinator<'a> {
    source: &'a dyn PackSource,
    sink: &'a dyn EventSink,
    options: RunOptions,
}

impl<'a> Coordinator<'a> {
    /// Create a coordinator reading packs from `source`.
    #[must_use]
    pub fn new(source: &'a dyn PackSource, sink: &'a dyn EventSink, options: RunOptions) -> Self {
        Self {
            source,
            sink,
            options,
        }
    }

    /// Extract every file `filter` selects from `manifest` into `output_root`.
    ///
    /// Packs missing from the source are skipped with a warning. Without
    /// `stop_on_first_error` every pack is attempted and all failures are
    /// reported together.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Cancelled`] when the token fired before
    /// the run finished, otherwise [`CoordinatorError::PacksFailed`] when
    /// any pack failed.
    pub fn run(
        &self,
        manifest: &Manifest,
        filter: &PrefixFilter,
        output_root: &Path,
    ) -> Result<RunReport, CoordinatorError> {
        let index = ManifestIndex::new(manifest);
        let units = resolve(&index, filter, self.sink).work_units();
        let total = units.len();
        let workers = self.options.workers.get().min(total.max(1));
        self.sink.emit(&Event::RunStarted {
            packs: total,
            workers,
        });

        let completed = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (work_tx, work_rx) = crossbeam_channel::bounded::<(usize, PackWork<'_>)>(workers * 2);
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let outcome_tx = outcome_tx.clone();
                let (completed, stop) = (&completed, &stop);
                scope.spawn(move || {
                    self.work(&work_rx, &outcome_tx, output_root, completed, stop, total);
                });
            }
            drop(work_rx);
            drop(outcome_tx);

            for unit in units.into_iter().enumerate() {
                if self.halted(&stop) || work_tx.send(unit).is_err() {
                    break;
                }
            }
            drop(work_tx);
        });

        let mut outcomes: Vec<(usize, String, PackOutcome)> = outcome_rx.try_iter().collect();
        outcomes.sort_by_key(|(position, _, _)| *position);
        self.finish(outcomes, total)
    }

    fn halted(&self, stop: &AtomicBool) -> bool {
        stop.load(Ordering::SeqCst) || self.options.cancel.is_cancelled()
    }

    fn work(
        &self,
        queue: &Receiver<(usize, PackWork<'_>)>,
        outcomes: &Sender<(usize, String, PackOutcome)>,
        output_root: &Path,
        completed: &AtomicUsize,
        stop: &AtomicBool,
        total: usize,
    ) {
        for (position, unit) in queue {
            if self.halted(stop) {
                continue;
            }
            let outcome = self.process(&unit, output_root);
            if let PackOutcome::Failed(error) = &outcome {
                self.sink.emit(&Event::PackFailed {
                    pack: unit.pack.hash.clone(),
                    reason: error_chain(error),
                });
                if self.options.stop_on_first_error && !error.is_cancellation() {
                    stop.store(true, Ordering::SeqCst);
                }
            }
            if outcomes
                .send((position, unit.pack.hash.clone(), outcome))
                .is_err()
            {
                return;
            }

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % PROGRESS_INTERVAL == 0 {
                self.sink.emit(&Event::Progress {
                    completed: done,
                    total,
                });
            }
        }
    }

    fn process(&self, unit: &PackWork<'_>, output_root: &Path) -> PackOutcome {
        let cancel = &self.options.cancel;
        let data = match fetch(unit.pack, self.source, cancel) {
            Ok(FetchOutcome::Fetched(data)) => data,
            Ok(FetchOutcome::Missing { location }) => {
                self.sink.emit(&Event::PackMissing {
                    pack: unit.pack.hash.clone(),
                    location,
                });
                return PackOutcome::Skipped;
            }
            Err(err) => return PackOutcome::Failed(err.into()),
        };
        self.sink.emit(&Event::PackFetched {
            pack: unit.pack.hash.clone(),
            bytes: data.len(),
        });

        let options = ExtractOptions {
            hash_policy: self.options.hash_policy,
            cancel: cancel.clone(),
        };
        match extract_pack(
            &data,
            &unit.blobs,
            &unit.files,
            output_root,
            &options,
            self.sink,
        ) {
            Ok(summary) => {
                self.sink.emit(&Event::PackExtracted {
                    pack: unit.pack.hash.clone(),
                    files: summary.files_written,
                });
                PackOutcome::Extracted(summary)
            }
            Err(err) => PackOutcome::Failed(err.into()),
        }
    }

    fn finish(
        &self,
        outcomes: Vec<(usize, String, PackOutcome)>,
        total: usize,
    ) -> Result<RunReport, CoordinatorError> {
        let completed = outcomes.len();
        let not_run = total.saturating_sub(completed);
        let mut report = RunReport {
            packs_total: total,
            ..RunReport::default()
        };
        let mut failures = Vec::new();
        let mut interrupted = not_run > 0;

        for (_, pack, outcome) in outcomes {
            match outcome {
                PackOutcome::Extracted(summary) => {
                    report.packs_extracted += 1;
                    report.files_written += summary.files_written;
                    report.bytes_written += summary.bytes_written;
                    report.blobs_missing += summary.blobs_missing;
                    report.hash_mismatches += summary.hash_mismatches;
                }
                PackOutcome::Skipped => report.packs_skipped.push(pack),
                PackOutcome::Failed(error) if error.is_cancellation() => interrupted = true,
                PackOutcome::Failed(error) => failures.push(PackFailure { pack, error }),
            }
        }

        self.sink.emit(&Event::RunFinished {
            extracted: report.packs_extracted,
            skipped: report.packs_skipped.len(),
            failed: failures.len(),
            not_run,
        });

        if interrupted && let Err(reason) = self.options.cancel.check() {
            return Err(CoordinatorError::Cancelled {
                reason,
                completed,
                total,
                failures,
            });
        }
        if !failures.is_empty() {
            return Err(CoordinatorError::PacksFailed {
                failures,
                total,
                not_run,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
