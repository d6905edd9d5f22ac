//! Command-line front end for bundle intake.
//!
//! ```bash
//! bundle-intake decode-code 00007001001193849
//! bundle-intake encode-code --paper 7 --page 1 --version-id 1 --corner 1 --public-code 93849
//! bundle-intake classify --spec spec.json page0.json page1.json
//! bundle-intake extract --image page.png --symbols page.json --top 0.1 --bottom 0.5 --out q1.png
//! ```

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bundle_intake::core::sha256_hex;
use bundle_intake::fiducial::{decode, encode, FiducialCode, PageCode};
use bundle_intake::{
    init_with_level, BundleId, ExamSpec, IntakeConfig, IntakeService, MemoryStore, SymbolSidecar,
    TaskLedger,
};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "bundle-intake", version, about = "Scanned exam bundle intake tools")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode one fiducial text and print it as JSON
    DecodeCode {
        text: String,
    },
    /// Print the fiducial text for a page corner
    EncodeCode(EncodeArgs),
    /// Classify the pages of a bundle from symbol sidecar files
    Classify(ClassifyArgs),
    /// Rectify a page image and cut out a region of it
    #[cfg(feature = "image")]
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Emit the extra-page sentinel instead of a page code
    #[arg(long, conflicts_with_all = ["paper", "page", "version_id", "corner", "public_code"])]
    extra: bool,
    #[arg(long, required_unless_present = "extra")]
    paper: Option<u32>,
    #[arg(long, required_unless_present = "extra")]
    page: Option<u32>,
    #[arg(long, required_unless_present = "extra")]
    version_id: Option<u32>,
    /// 1 = NE, 2 = NW, 3 = SW, 4 = SE
    #[arg(long, required_unless_present = "extra")]
    corner: Option<u8>,
    #[arg(long, required_unless_present = "extra")]
    public_code: Option<String>,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Assessment spec JSON; falls back to `spec_path` in the config
    #[arg(long)]
    spec: Option<PathBuf>,
    /// Intake config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    /// One symbol sidecar per page, in bundle order
    #[arg(required = true)]
    sidecars: Vec<PathBuf>,
}

#[cfg(feature = "image")]
#[derive(Args, Debug)]
struct ExtractArgs {
    #[arg(long)]
    image: PathBuf,
    /// Symbol sidecar read from the same image
    #[arg(long)]
    symbols: PathBuf,
    #[arg(long, default_value_t = 0.0)]
    top: f32,
    #[arg(long, default_value_t = 1.0)]
    bottom: f32,
    #[arg(long, default_value_t = 0.0)]
    left: f32,
    #[arg(long, default_value_t = 1.0)]
    right: f32,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Serialize)]
struct PageReport {
    position: usize,
    category: &'static str,
    rotation: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
}

#[derive(Serialize)]
struct ClassifyReport {
    bundle: BundleId,
    pages: Vec<PageReport>,
    internal_collisions: usize,
    ready: bool,
}

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.json_logs {
        bundle_intake::init_tracing(true);
        return;
    }
    init_log_level(cli.verbose);
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    init_log_level(cli.verbose);
}

fn init_log_level(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(err) = init_with_level(level) {
        eprintln!("warning: logger already installed: {err}");
    }
}

fn run(command: Command) -> CliResult<()> {
    match command {
        Command::DecodeCode { text } => {
            let code = decode(&text)?;
            println!("{}", serde_json::to_string_pretty(&code)?);
        }
        Command::EncodeCode(args) => println!("{}", encode_code(args)?),
        Command::Classify(args) => classify(args)?,
        #[cfg(feature = "image")]
        Command::Extract(args) => extract(args)?,
    }
    Ok(())
}

fn encode_code(args: EncodeArgs) -> CliResult<String> {
    let code = if args.extra {
        FiducialCode::Extra
    } else {
        let missing = |name: &str| format!("--{name} is required without --extra");
        FiducialCode::Page(PageCode {
            paper_id: args.paper.ok_or_else(|| missing("paper"))?,
            page_id: args.page.ok_or_else(|| missing("page"))?,
            version_id: args.version_id.ok_or_else(|| missing("version-id"))?,
            corner: args.corner.ok_or_else(|| missing("corner"))?,
            public_code: args.public_code.ok_or_else(|| missing("public-code"))?,
        })
    };
    Ok(encode(&code)?)
}

fn load_config(path: Option<&Path>) -> CliResult<IntakeConfig> {
    Ok(match path {
        Some(path) => IntakeConfig::load_json(path)?,
        None => IntakeConfig::default(),
    })
}

fn classify(args: ClassifyArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let spec_path = args
        .spec
        .or_else(|| config.spec_path.clone())
        .ok_or("no assessment spec: pass --spec or set spec_path in the config")?;
    let spec = ExamSpec::load_json(&spec_path)?;

    let mut bundle_bytes = Vec::new();
    let mut hashes = Vec::with_capacity(args.sidecars.len());
    let mut sidecars = Vec::with_capacity(args.sidecars.len());
    for path in &args.sidecars {
        let raw = fs::read(path)?;
        hashes.push(sha256_hex(&raw));
        bundle_bytes.extend_from_slice(&raw);
        sidecars.push(SymbolSidecar::load_json(path)?);
    }

    let ledger = Arc::new(TaskLedger::new());
    let service = IntakeService::new(
        MemoryStore::new(),
        Arc::new(spec),
        ledger.clone(),
        ledger,
        &config,
    );
    let bundle = service.upload_bundle(&bundle_bytes, "cli", "cli")?;
    service.stage_page_hashes(bundle.id, &hashes)?;
    for (position, sidecar) in sidecars.iter().enumerate() {
        service.process_symbols(
            bundle.id,
            position,
            sidecar.width,
            sidecar.height,
            &sidecar.symbols,
        )?;
    }
    let progress = service.bundle_progress(bundle.id)?;

    let pages = service
        .staged_pages(bundle.id)
        .into_iter()
        .map(|page| PageReport {
            position: page.position,
            category: page.category.name(),
            rotation: page.rotation,
            error_reason: page.error_reason(),
        })
        .collect();
    let report = ClassifyReport {
        bundle: bundle.id,
        pages,
        internal_collisions: progress.collisions_flagged,
        ready: progress.is_ready(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    match args.out {
        Some(path) => {
            fs::write(&path, json)?;
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(feature = "image")]
fn extract(args: ExtractArgs) -> CliResult<()> {
    use bundle_intake::fiducial::extract_region;
    use bundle_intake::{load_gray, save_gray, RegionFractions};

    let config = load_config(args.config.as_deref())?;
    let image = load_gray(&args.image, 0)?;
    let sidecar = SymbolSidecar::load_json(&args.symbols)?;
    let scan = config
        .decoder()
        .decode_symbols(image.width, image.height, &sidecar.symbols);
    info!(
        "{} corner(s), rotation {}",
        scan.corners.len(),
        scan.rotation()
    );

    let region = RegionFractions {
        top: args.top,
        bottom: args.bottom,
        left: args.left,
        right: args.right,
    };
    let transform = scan.rectifying_transform(&config.template);
    let out = extract_region(&image.view(), &transform, &config.template, region);
    save_gray(&out, &args.out)?;
    info!("wrote {}x{} to {}", out.width, out.height, args.out.display());
    Ok(())
}
