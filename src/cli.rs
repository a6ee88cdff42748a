// src/cli.rs

use clap::{Args as ClapArgs, Parser, Subcommand};
use crash_sift::analyzer::DEFAULT_RESERVED_THREADS;
use crash_sift::coverage::{DEFAULT_INTERVAL, DEFAULT_LENGTH};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON object mapping app names to package names, replacing the built-in table
    #[arg(long, global = true)]
    pub apps: Option<PathBuf>,

    /// Threads to leave idle while abstracting logs
    #[arg(long, global = true, default_value_t = DEFAULT_RESERVED_THREADS)]
    pub reserve: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract and deduplicate crash signatures from a corpus of bug logs
    Faults {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// 0 = count only, 1 = list keys, 2 = list keys with examples
        #[arg(long, default_value_t = 1)]
        detail: u8,

        /// Also print the result of every single file
        #[arg(long)]
        show_each: bool,

        /// Write the combined signature dict as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-tag fault counts with unique and random-combination columns
    Table {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Seed for the random run combinations
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// How long each app took to find each share of its faults
    FaultConvergence {
        #[command(flatten)]
        corpus: CorpusArgs,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// How long a coverage series took to reach each share of its final rate
    CoverageConvergence {
        /// Coverage JSON file (metric -> series)
        input: PathBuf,

        #[command(flatten)]
        grid: GridArgs,

        /// Print the aligned series before the convergence table
        #[arg(long)]
        show_series: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Average several coverage runs onto the standard grid
    CombineCoverage {
        /// Coverage JSON files, one per run
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        grid: GridArgs,

        /// Attach standard deviation bands
        #[arg(long)]
        need_std: bool,

        /// Average the runs' existing std bands instead of computing new ones
        #[arg(long)]
        keep_std: bool,

        /// Average the runs' rates instead of dividing averaged counts
        #[arg(long)]
        mean_rate: bool,

        /// Allow runs with different totals
        #[arg(long)]
        mixed_packages: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct CorpusArgs {
    /// Corpus root holding one directory per run tag
    #[arg(short, long)]
    pub root: PathBuf,

    /// Only analyze logs of this app
    #[arg(long)]
    pub app: Option<String>,

    /// Only analyze tags matching this pattern (e.g. `ape*`, `ape**-120`)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Analyze exactly these tags instead of every directory under the root
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Ignore records logged later than this many seconds into a run
    #[arg(long)]
    pub target_time: Option<f64>,
}

#[derive(ClapArgs, Debug)]
pub struct GridArgs {
    /// Length of the standard grid in seconds
    #[arg(long, default_value_t = DEFAULT_LENGTH)]
    pub length: i64,

    /// Spacing of the standard grid in seconds
    #[arg(long, default_value_t = DEFAULT_INTERVAL)]
    pub interval: i64,
}
