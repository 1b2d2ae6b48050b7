//! mcopy - Command-line interface for the mirrorcopy engine.
//!
//! Maps robocopy-style flags onto a `JobConfig`, renders progress to stderr,
//! prints the run summary (or JSON) to stdout and turns the result into an
//! exit code: 0 on success, 1 if any file failed, 2 on a setup error.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::Parser;
use mirrorcopy_engine::{
    model::CandidateFile,
    progress::ProgressCallback,
    result::format_bytes,
    ChecksumAlgorithm, CopyEngine, JobConfig, OperationOutcome, RunResult,
};
use tracing_subscriber::EnvFilter;

/// mcopy - Mirror and copy directory trees
#[derive(Parser, Debug)]
#[command(name = "mcopy")]
#[command(version)]
#[command(about = "Copy or mirror a directory tree with resume, retry and parallel transfers")]
struct Args {
    /// Source directory
    #[arg(value_name = "SOURCE")]
    source: Option<PathBuf>,

    /// Destination directory
    #[arg(value_name = "DEST")]
    destination: Option<PathBuf>,

    /// Load options from a JSON job file; flags given here override it
    #[arg(long, value_name = "FILE")]
    job: Option<PathBuf>,

    /// Write the effective options to a JSON job file
    #[arg(long, value_name = "FILE")]
    save_job: Option<PathBuf>,

    /// Copy subdirectories
    #[arg(short = 's', long)]
    recursive: bool,

    /// Copy subdirectories, including empty ones
    #[arg(short = 'e', long)]
    empty_dirs: bool,

    /// Mirror the tree: copy recursively and delete extra destination entries
    #[arg(long)]
    mirror: bool,

    /// Delete destination entries that no longer exist in the source
    #[arg(long)]
    purge: bool,

    /// Skip files whose destination copy is not older than the source
    #[arg(long)]
    exclude_older: bool,

    /// Never delete extra destination entries
    #[arg(long)]
    exclude_extra: bool,

    /// Copy files even when size and modification time match
    #[arg(long)]
    include_same: bool,

    /// Attempts per file
    #[arg(short = 'r', long, value_name = "N")]
    retry: Option<u32>,

    /// Seconds to wait between attempts
    #[arg(short = 'w', long, value_name = "SECS")]
    wait: Option<u64>,

    /// Number of parallel transfers
    #[arg(long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Restart interrupted transfers instead of resuming them
    #[arg(long)]
    no_resume: bool,

    /// Only copy files matching these name patterns
    #[arg(long = "include", value_name = "GLOB", num_args = 1..)]
    include_files: Vec<String>,

    /// Exclude files matching these name patterns
    #[arg(long = "exclude-file", value_name = "GLOB", num_args = 1..)]
    exclude_files: Vec<String>,

    /// Exclude directories matching these name patterns
    #[arg(long = "exclude-dir", value_name = "GLOB", num_args = 1..)]
    exclude_dirs: Vec<String>,

    /// Skip hidden files and directories
    #[arg(long)]
    skip_hidden: bool,

    /// Minimum file size in bytes
    #[arg(long, value_name = "BYTES")]
    min_size: Option<u64>,

    /// Maximum file size in bytes
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Do not copy timestamps
    #[arg(long)]
    no_timestamps: bool,

    /// Copy POSIX permission bits
    #[arg(long)]
    permissions: bool,

    /// Copy extended attributes
    #[arg(long)]
    xattrs: bool,

    /// Delete source files after copying
    #[arg(long = "move")]
    move_files: bool,

    /// Delete source files and emptied directories after copying
    #[arg(long)]
    move_all: bool,

    /// List what would be done without changing anything
    #[arg(short = 'l', long)]
    dry_run: bool,

    /// Verify each copy with a checksum: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<ChecksumAlgorithm>,

    /// Print the run result as JSON instead of the summary table
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Build the job: the loaded job file (or defaults) with flags on top.
    fn to_config(&self) -> Result<JobConfig, String> {
        let mut config = match &self.job {
            Some(path) => JobConfig::load(path).map_err(|e| e.to_string())?,
            None => JobConfig::default(),
        };

        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if config.source.as_os_str().is_empty() || config.destination.as_os_str().is_empty() {
            return Err("source and destination are required (or use --job)".to_string());
        }

        config.recursive |= self.recursive || self.empty_dirs;
        config.include_empty_dirs |= self.empty_dirs;
        config.mirror |= self.mirror;
        config.purge |= self.purge;
        config.exclude_older |= self.exclude_older;
        config.exclude_extra |= self.exclude_extra;
        config.force_copy_identical |= self.include_same;
        config.skip_hidden |= self.skip_hidden;
        config.copy_permissions |= self.permissions;
        config.copy_xattrs |= self.xattrs;
        config.move_files |= self.move_files;
        config.move_all |= self.move_all;
        config.dry_run |= self.dry_run;
        if self.no_resume {
            config.resume = false;
        }
        if self.no_timestamps {
            config.copy_timestamps = false;
        }

        if let Some(retry) = self.retry {
            config.retry_count = retry;
        }
        if let Some(wait) = self.wait {
            config.retry_wait_secs = wait;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if self.min_size.is_some() {
            config.min_size = self.min_size;
        }
        if self.max_size.is_some() {
            config.max_size = self.max_size;
        }
        if self.verify.is_some() {
            config.verify = self.verify;
        }

        config.include_files.extend(self.include_files.iter().cloned());
        config.exclude_files.extend(self.exclude_files.iter().cloned());
        config.exclude_dirs.extend(self.exclude_dirs.iter().cloned());

        Ok(config)
    }
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    verbose: bool,
    quiet: bool,
    last_progress_update: Mutex<Instant>,
}

impl CliProgress {
    fn new(verbose: bool, quiet: bool) -> Self {
        CliProgress {
            verbose,
            quiet,
            last_progress_update: Mutex::new(Instant::now()),
        }
    }

    /// Throttle progress updates to avoid spam (max once per 200ms)
    fn should_redraw(&self) -> bool {
        let Ok(mut last) = self.last_progress_update.lock() else {
            return false;
        };
        if last.elapsed() < Duration::from_millis(200) {
            return false;
        }
        *last = Instant::now();
        true
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl ProgressCallback for CliProgress {
    fn on_scan_progress(&self, scanned: u64, found: u64) {
        if !self.quiet && self.should_redraw() {
            eprint!("\rScanning: {} entries, {} to copy", scanned, found);
        }
    }

    fn on_file_started(&self, candidate: &CandidateFile) {
        if self.verbose {
            eprintln!("Starting: {}", candidate.relative_path.display());
        }
    }

    fn on_file_progress(&self, path: &std::path::Path, written: u64, total: u64) {
        if self.quiet || total == 0 || !self.should_redraw() {
            return;
        }
        let percent = (written as f64 / total as f64 * 100.0) as u32;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("(unknown)");
        eprint!(
            "\r{} {} {}/{}",
            name,
            Self::print_progress_bar(percent),
            format_bytes(written),
            format_bytes(total)
        );
    }

    fn on_outcome(&self, outcome: &OperationOutcome) {
        if outcome.is_failure() {
            eprintln!("\rFailed: {}", outcome);
        } else if self.verbose {
            eprintln!("\r{}", outcome);
        }
    }

    fn on_run_completed(&self, _result: &RunResult) {
        if !self.quiet {
            eprintln!();
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Exit code tracking
    let exit_code = match run_cli(&args) {
        Ok(result) => {
            if args.json {
                match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Error: cannot serialize result: {}", e),
                }
            } else {
                print!("{}", result.summary());
            }
            if result.has_failures() {
                1
            } else {
                0
            }
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<RunResult, String> {
    let config = args.to_config()?;

    if let Some(path) = &args.save_job {
        config.save(path).map_err(|e| e.to_string())?;
        tracing::info!("job saved to {}", path.display());
    }

    let engine = CopyEngine::new(config).map_err(|e| e.to_string())?;
    let progress = CliProgress::new(args.verbose > 0, args.json);
    engine.run(&progress).map_err(|e| e.to_string())
}
