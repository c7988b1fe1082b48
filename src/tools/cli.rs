//! Command line handling for the parbzip2 binary, built on the clap derive
//! interface.

use clap::Parser;
use log::LevelFilter;

/// How many workers to run when the user does not say.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Parser, Debug)]
#[clap(
    name = "parbzip2",
    version,
    about = "A parallel bzip2 compressor",
    long_about = None)]
pub struct Args {
    /// Files to compress; reads stdin and writes stdout when empty
    #[clap()]
    files: Vec<String>,

    /// Write to stdout instead of FILE.bz2
    #[clap(short = 'c', long = "stdout")]
    stdout: bool,

    /// Keep (don't delete) input files
    #[clap(short = 'k', long = "keep")]
    keep: bool,

    /// Overwrite existing output files
    #[clap(short = 'f', long = "force")]
    force: bool,

    /// Worker threads; 0 compresses on the calling thread
    #[clap(short = 'p', long = "threads")]
    threads: Option<usize>,

    /// Block size, 1 (100k) through 9 (900k)
    #[clap(short = 'b', long = "block-size", default_value_t = 9)]
    block_size: usize,

    /// Alias for -b1
    #[clap(long)]
    fast: bool,

    /// Alias for -b9
    #[clap(long)]
    best: bool,

    /// Verbosity; repeat for more (-v info, -vv debug, -vvv trace)
    #[clap(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Where compressed output goes.
#[derive(Debug, PartialEq, Eq)]
pub enum Output {
    File,
    Stdout,
}

/// Resolved program options.
#[derive(Debug)]
pub struct BzOpts {
    /// Block size in 100k units, 1-9
    pub block_size: usize,
    /// Names of files to compress
    pub files: Vec<String>,
    /// Silently overwrite existing output files
    pub force_overwrite: bool,
    /// Don't remove input files after compressing them
    pub keep_input_files: bool,
    /// Where output is sent
    pub output: Output,
    /// Worker thread count
    pub threads: usize,
    /// Log level implied by the -v count
    pub log_level: LevelFilter,
}

/// Parse the command line into a BzOpts.
pub fn bzopts_init() -> BzOpts {
    let args = Args::parse();

    let mut block_size = args.block_size.clamp(1, 9);
    if args.fast {
        block_size = 1;
    }
    if args.best {
        block_size = 9;
    }

    let output = if args.stdout || args.files.is_empty() {
        Output::Stdout
    } else {
        Output::File
    };

    BzOpts {
        block_size,
        files: args.files,
        force_overwrite: args.force,
        keep_input_files: args.keep,
        output,
        threads: args.threads.unwrap_or_else(default_workers).min(128),
        log_level: match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        },
    }
}
