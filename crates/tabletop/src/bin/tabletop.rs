//! tabletop CLI: run the detector over recorded depth frames.

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use tabletop::frames::{load_png_depth, load_raw_depth};
use tabletop::{DepthFrame, DetectorConfig, FrameInput, FrameReport, TabletopDetector};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tabletop")]
#[command(about = "Detect tokens and miniatures on a tabletop from depth frames")]
#[command(version)]
struct Cli {
    /// Log per-stage details.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a sequence of depth frames, in order.
    Detect(DetectArgs),

    /// Print the default detector configuration as JSON.
    DefaultConfig {
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Depth frames: 16-bit PNG, or raw little-endian u16 with --width/--height.
    #[arg(required = true)]
    frames: Vec<PathBuf>,

    /// Detector configuration (JSON); missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Width of raw frames.
    #[arg(long, requires = "height")]
    width: Option<usize>,

    /// Height of raw frames.
    #[arg(long, requires = "width")]
    height: Option<usize>,

    /// Lock the table depth after this many processed frames.
    #[arg(long)]
    lock_after: Option<u64>,

    /// Write every frame report as a JSON array here; defaults to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Detect(args) => run_detect(args),
        Commands::DefaultConfig { out } => {
            let json = serde_json::to_string_pretty(&DetectorConfig::default())?;
            emit(out.as_deref(), &json)
        }
    }
}

/// Logs go to stderr so JSON reports on stdout stay clean. `RUST_LOG`
/// overrides the level picked by `--verbose`.
fn init_logging(verbose: bool) -> CliResult<()> {
    let level = if verbose { "debug" } else { "warn" };

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::fmt::format::FmtSpan;
        use tracing_subscriber::EnvFilter;

        // one line per closed stage span, with its busy time
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| err as CliError)?;
    }
    #[cfg(not(feature = "tracing"))]
    {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
            .format_timestamp_millis()
            .try_init()?;
    }
    Ok(())
}

fn run_detect(args: DetectArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => DetectorConfig::load_json(path)?,
        None => DetectorConfig::default(),
    };

    let mut detector: Option<TabletopDetector> = None;
    let mut reports: Vec<FrameReport> = Vec::with_capacity(args.frames.len());
    for path in &args.frames {
        let frame = load_frame(path, args.width.zip(args.height))?;
        let det = detector.get_or_insert_with(|| {
            TabletopDetector::for_resolution(config.clone(), frame.width, frame.height)
        });
        let report = det.process_frame(FrameInput::depth(frame.view()));
        log::info!(
            "{}: {} tokens, table {} mm",
            path.display(),
            report.tokens.len(),
            report.table_depth_mm
        );
        if args.lock_after == Some(det.context().frames_processed()) && !det.is_table_locked() {
            det.lock_table();
        }
        reports.push(report);
    }

    let json = serde_json::to_string_pretty(&reports)?;
    emit(args.out.as_deref(), &json)
}

fn load_frame(path: &Path, raw_size: Option<(usize, usize)>) -> CliResult<DepthFrame> {
    let frame = match raw_size {
        Some((w, h)) => load_raw_depth(path, w, h)?,
        None => load_png_depth(path)?,
    };
    Ok(frame)
}

fn emit(out: Option<&Path>, json: &str) -> CliResult<()> {
    match out {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}
