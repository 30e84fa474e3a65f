use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::lru::{LruCache, Outcome};
use crate::stats::Stats;
use crate::trace::{Operation, TraceError, TraceReader, TraceRecord};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("{}: unable to open trace file", .path.display())]
    TraceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("failed to write verbose output")]
    Output(#[source] std::io::Error),
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Options {
    /// print one line per data record with the outcome of each of its accesses
    pub verbose: bool,
}

/// Outcome of a whole replay.
///
/// All counts cover only the replayed trace, even when the cache was used before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub stats: Stats,
    pub data_records: u64,
    pub instruction_records: u64,
    pub skipped_lines: u64,
}

/// A replayed data record with the outcomes of its one or two accesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayed {
    pub op: Operation,
    pub address: u64,
    pub size: u32,
    pub outcomes: Vec<Outcome>,
}

impl std::fmt::Display for Replayed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{} {:x},{}",
            self.op.letter(),
            self.address,
            self.size
        ))?;
        for outcome in &self.outcomes {
            f.write_fmt(format_args!(" {outcome}"))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Simulation<'c> {
    cache: &'c mut LruCache,
    options: Options,
    start: Stats,
    report: Report,
}

impl<'c> Simulation<'c> {
    pub fn new(cache: &'c mut LruCache, options: Options) -> Self {
        Self {
            start: cache.stats(),
            cache,
            options,
            report: Report::default(),
        }
    }

    /// Applies a single record to the cache.
    ///
    /// Instruction fetches are ignored and leave the cache untouched, a modify
    /// performs a load and then a store to the same address.
    pub fn apply(&mut self, record: TraceRecord) -> Option<Replayed> {
        match record {
            TraceRecord::Instruction { .. } => {
                self.report.instruction_records += 1;
                None
            }
            TraceRecord::Data { op, address, size } => {
                self.report.data_records += 1;
                let outcomes = op
                    .accesses()
                    .iter()
                    .map(|&kind| self.cache.access(address, kind))
                    .collect();

                Some(Replayed {
                    op,
                    address,
                    size,
                    outcomes,
                })
            }
        }
    }

    /// Replays `trace` in order, writing verbose lines to `out` when enabled.
    ///
    /// Lines that can not be decoded are logged and skipped, only a failing
    /// read of the trace or of `out` stops the replay.
    pub fn run<R: BufRead, W: Write>(
        mut self,
        trace: TraceReader<R>,
        out: &mut W,
    ) -> Result<Report, SimulationError> {
        for record in trace {
            let record = match record {
                Ok(record) => record,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("skipping {e}");
                    self.report.skipped_lines += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(replayed) = self.apply(record) {
                if self.options.verbose {
                    writeln!(out, "{replayed}").map_err(SimulationError::Output)?;
                }
            }
        }

        self.report.stats = self.cache.stats().since(self.start);
        tracing::debug!(
            data_records = self.report.data_records,
            instruction_records = self.report.instruction_records,
            skipped_lines = self.report.skipped_lines,
            percent_hit = self.report.stats.percent_hit(),
            "{}",
            self.report.stats
        );
        if self.report.skipped_lines > 0 {
            tracing::warn!("{} trace lines were skipped", self.report.skipped_lines);
        }

        Ok(self.report)
    }
}

pub fn simulate_file<W: Write>(
    cache: &mut LruCache,
    file: impl AsRef<Path>,
    options: Options,
    out: &mut W,
) -> Result<Report, SimulationError> {
    let path = file.as_ref();
    let trace_file = File::open(path).map_err(|source| SimulationError::TraceFile {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "replaying trace file");

    Simulation::new(cache, options).run(TraceReader::new(BufReader::new(trace_file)), out)
}

pub fn simulate<W: Write>(
    cache: &mut LruCache,
    trace: &str,
    options: Options,
    out: &mut W,
) -> Result<Report, SimulationError> {
    Simulation::new(cache, options).run(TraceReader::new(trace.as_bytes()), out)
}
