use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::process::ExitCode;
use std::time::Instant;

use log::{error, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use parbzip2::compress_stream;
use parbzip2::tools::cli::{bzopts_init, BzOpts, Output};

fn main() -> ExitCode {
    let opts = bzopts_init();

    TermLogger::init(
        opts.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("logger init cannot fail this early");

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &BzOpts) -> io::Result<()> {
    if opts.files.is_empty() {
        let stdin = io::stdin().lock();
        let stdout = io::stdout().lock();
        return compress_stream(stdin, BufWriter::new(stdout), opts.block_size, opts.threads);
    }

    for name in &opts.files {
        compress_file(opts, name)?;
    }
    Ok(())
}

fn compress_file(opts: &BzOpts, name: &str) -> io::Result<()> {
    let fin = BufReader::new(File::open(name)?);
    let raw_len = fs::metadata(name)?.len();
    let started = Instant::now();

    let out_name = format!("{}.bz2", name);
    let compressed_len = if opts.output == Output::Stdout {
        let stdout = io::stdout().lock();
        compress_stream(fin, BufWriter::new(stdout), opts.block_size, opts.threads)?;
        None
    } else {
        if !opts.force_overwrite && fs::metadata(&out_name).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("output file {} exists; use --force to overwrite", out_name),
            ));
        }
        let mut f_out = BufWriter::new(File::create(&out_name)?);
        compress_stream(fin, &mut f_out, opts.block_size, opts.threads)?;
        f_out.flush()?;
        Some(fs::metadata(&out_name)?.len())
    };

    if let Some(out_len) = compressed_len {
        info!(
            "{}: {} -> {} bytes ({:.3}:1) in {:.2?}",
            name,
            raw_len,
            out_len,
            raw_len as f64 / out_len.max(1) as f64,
            started.elapsed(),
        );
        if !opts.keep_input_files {
            fs::remove_file(name)?;
        }
    }

    Ok(())
}
