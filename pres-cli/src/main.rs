use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::env::VarError;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pres_core::options::DEFAULT_BUFFER_SIZE;
use pres_core::progress::Progress;
use pres_core::{
    create_archive, restore_archive, restore_archive_into, restore_archive_to_path,
    verify_archive, ArchiveOptions, ErrorKind, Health, PresError, VerifyReport,
};

const NO_PROBLEMS: &str = "No problems found.";
const IMPOSSIBLE: &str = "Restoration impossible: not enough shards are intact.";
const ADVICE: &str =
    "Restore the file and create a new archive from it to regain full protection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "PRES_LOG_FORMAT";

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => <Self as ValueEnum>::from_str(value.trim(), true)
                .map(Some)
                .map_err(|_| {
                    anyhow::anyhow!(
                        "invalid {key}={value:?}; expected one of: human, json",
                        key = Self::ENV_KEY
                    )
                }),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(log_format_override: Option<LogFormat>) -> Result<()> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(default_env_filter())
            .with_writer(io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "pres", version, about = "Self-healing single-file archives")]
struct Cli {
    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `PRES_LOG_FORMAT` > `human`.
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
    /// Report stage and byte counts every few seconds.
    #[arg(long, global = true, default_value_t = false)]
    progress: bool,
    #[arg(long, global = true, hide = true, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Turn a file into a self-healing archive (<input>.pres)
    #[command(visible_alias = "c")]
    Create { input: PathBuf },
    /// Check an archive and report whether it can be restored
    #[command(visible_alias = "v")]
    Verify {
        archive: PathBuf,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Recover the original file, repairing damaged shards on the way
    #[command(visible_alias = "r")]
    Restore {
        archive: PathBuf,
        /// Output path; defaults to the archive name without its suffix. `-` means stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the restored bytes to stdout
        #[arg(long, default_value_t = false, conflicts_with = "output")]
        stdout: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error:#}");
        std::process::exit(exit_code(&error));
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.log_format)?;
    let opts = ArchiveOptions {
        buffer_size: cli.buffer_size,
        progress: Progress::new(cli.progress),
        ..Default::default()
    };
    tracing::debug!(buffer_size = opts.buffer_size, progress = cli.progress, "starting");
    match cli.cmd {
        Cmd::Create { input } => create(&input, &opts),
        Cmd::Verify { archive, json } => verify(&archive, json, &opts),
        Cmd::Restore { archive, output, stdout } => restore(&archive, output, stdout, &opts),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(pres) = err.chain().find_map(|e| e.downcast_ref::<PresError>()) else {
        return 1;
    };
    match pres.kind() {
        ErrorKind::Usage => 1,
        ErrorKind::InputTooSmall => 3,
        ErrorKind::MetadataUnreadable => 4,
        ErrorKind::TooManyDamagedShards => 5,
        ErrorKind::ReconstructionVerificationFailed => 6,
        ErrorKind::Io => 7,
        ErrorKind::Codec => 8,
    }
}

fn create(input: &Path, opts: &ArchiveOptions) -> Result<()> {
    let archive = create_archive(input, opts)
        .with_context(|| format!("create archive from {}", input.display()))?;
    println!("{}", archive.display());
    Ok(())
}

fn verify(archive: &Path, json: bool, opts: &ArchiveOptions) -> Result<()> {
    let report =
        verify_archive(archive, opts).with_context(|| format!("verify {}", archive.display()))?;
    if json {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        print_verdict(&report);
    }
    report
        .ensure_recoverable()
        .with_context(|| format!("verify {}", archive.display()))?;
    Ok(())
}

fn print_verdict(report: &VerifyReport) {
    for w in &report.warnings {
        println!("Warning: {w}.");
    }
    match report.health {
        Health::Healthy if report.warnings.is_empty() => println!("{NO_PROBLEMS}"),
        Health::Healthy | Health::Repairable => {
            if !report.damaged_shards.is_empty() {
                let list: Vec<String> =
                    report.damaged_shards.iter().map(|i| (i + 1).to_string()).collect();
                println!(
                    "{} of {} shards intact; damaged: {}",
                    report.intact_shards,
                    report.total_shards(),
                    list.join(", ")
                );
            }
            println!("{ADVICE}");
        }
        Health::Unrecoverable => println!("{IMPOSSIBLE}"),
    }
}

fn restore(
    archive: &Path,
    output: Option<PathBuf>,
    to_stdout: bool,
    opts: &ArchiveOptions,
) -> Result<()> {
    let ctx = || format!("restore {}", archive.display());
    let to_stdout = to_stdout || output.as_deref() == Some(Path::new("-"));
    if to_stdout {
        let mut out = BufWriter::new(io::stdout().lock());
        restore_archive_into(archive, &mut out, opts).with_context(ctx)?;
        out.flush().context("flush stdout")?;
        return Ok(());
    }
    let report = match output {
        Some(path) => restore_archive_to_path(archive, &path, opts),
        None => restore_archive(archive, opts),
    }
    .with_context(ctx)?;
    if let Some(path) = &report.output {
        println!("{}", path.display());
    }
    Ok(())
}
