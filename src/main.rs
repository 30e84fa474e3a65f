use std::io::{Write, stdout};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use csim::geometry::Geometry;
use csim::lru::LruCache;
use csim::simulation::{self, Options};

#[derive(Parser, Debug)]
#[command(
    name = "csim",
    version,
    about = "Replays a valgrind memory trace against a set-associative LRU cache",
    after_help = "Examples:\n  csim -s 4 -E 1 -b 4 -t traces/yi.trace\n  csim -v -s 8 -E 2 -b 4 -t traces/yi.trace"
)]
struct Args {
    /// Print the outcome of every data access
    #[arg(short)]
    verbose: bool,

    /// Number of set index bits (the cache has 2^s sets)
    #[arg(short = 's', value_name = "NUM")]
    set_index_bits: u32,

    /// Number of lines per set
    #[arg(short = 'E', value_name = "NUM")]
    lines_per_set: usize,

    /// Number of block offset bits (lines hold 2^b bytes)
    #[arg(short = 'b', value_name = "NUM")]
    block_offset_bits: u32,

    /// Trace file to replay
    #[arg(short = 't', value_name = "FILE")]
    trace: PathBuf,

    /// Also write "<hits> <misses> <evictions>" to this file
    #[arg(long, value_name = "FILE")]
    results: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let geometry = Geometry::new(args.set_index_bits, args.lines_per_set, args.block_offset_bits)
        .context("invalid cache geometry")?;
    tracing::info!("{}", geometry.format_info());

    let mut lru_cache = LruCache::new(geometry);
    let mut stdout = stdout().lock();

    let report = simulation::simulate_file(
        &mut lru_cache,
        &args.trace,
        Options {
            verbose: args.verbose,
        },
        &mut stdout,
    )?;

    writeln!(stdout, "{}", report.stats)?;
    stdout.flush()?;

    if let Some(results) = args.results {
        std::fs::write(&results, report.stats.format_results())
            .with_context(|| format!("failed to write results to {}", results.display()))?;
    }

    Ok(())
}
