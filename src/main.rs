use clap::{Parser, ValueEnum};
use docscan::{imwrite, DocumentScanner, ScanConfig, ScanOutput, ScanSummary, ThresholdMethod};
use image::DynamicImage;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "docscan")]
#[command(about = "docscan - find, flatten and binarize documents in photographs", long_about = None)]
struct Cli {
    /// Input image paths
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory for <stem>_scanned.png (and <stem>_warped.png)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write the flattened page before binarization
    #[arg(long)]
    save_warped: bool,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Height of the downscaled detection image
    #[arg(long)]
    working_height: Option<u32>,

    #[arg(long)]
    canny_low: Option<f32>,

    #[arg(long)]
    canny_high: Option<f32>,

    /// Contour approximation tolerance as a fraction of perimeter
    #[arg(long)]
    epsilon: Option<f64>,

    /// Number of largest contours to examine
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Dilate the edge map before contour search to close small gaps
    #[arg(long)]
    dilate: bool,

    /// Odd neighbourhood size of the local threshold
    #[arg(long)]
    block_size: Option<u32>,

    /// Subtracted from the local mean
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<f32>,

    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON array with one entry per image
    Json,
    /// One line per image
    Text,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Gaussian,
    Mean,
}

impl From<MethodArg> for ThresholdMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Gaussian => ThresholdMethod::Gaussian,
            MethodArg::Mean => ThresholdMethod::Mean,
        }
    }
}

fn build_config(cli: &Cli) -> docscan::Result<ScanConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ScanConfig::from_json_file(path)?,
        None => ScanConfig::default(),
    };

    if let Some(v) = cli.working_height {
        cfg.detect.working_height = v;
    }
    if let Some(v) = cli.canny_low {
        cfg.detect.canny_low = v;
    }
    if let Some(v) = cli.canny_high {
        cfg.detect.canny_high = v;
    }
    if let Some(v) = cli.epsilon {
        cfg.detect.approx_epsilon = v;
    }
    if let Some(v) = cli.max_candidates {
        cfg.detect.max_candidates = v;
    }
    if cli.dilate {
        cfg.detect.use_dilation = true;
    }
    if let Some(v) = cli.block_size {
        cfg.binarize.block_size = v;
    }
    if let Some(v) = cli.offset {
        cfg.binarize.offset = v;
    }
    if let Some(m) = cli.method {
        cfg.binarize.method = m.into();
    }

    cfg.validate()?;
    Ok(cfg)
}

fn output_path(dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    dir.join(format!("{}_{}.png", stem, suffix))
}

/// Write the outputs of one scan; any failure is that image's failure.
fn write_outputs(
    dir: &Path,
    input: &Path,
    out: &ScanOutput,
    save_warped: bool,
) -> docscan::Result<()> {
    let scanned_path = output_path(dir, input, "scanned");
    imwrite(&scanned_path, &DynamicImage::ImageLuma8(out.scanned.clone()))?;
    info!("Wrote {}", scanned_path.display());
    if save_warped {
        let warped_path = output_path(dir, input, "warped");
        imwrite(&warped_path, &out.warped)?;
        info!("Wrote {}", warped_path.display());
    }
    Ok(())
}

/// Scan one image and write its outputs. Nothing is kept once this returns
/// but the summary.
fn process(scanner: &DocumentScanner, cli: &Cli, path: &Path) -> docscan::Result<ScanSummary> {
    let out = scanner.run(path)?;
    if let Some(dir) = &cli.output_dir {
        write_outputs(dir, path, &out, cli.save_warped)?;
    }
    Ok(out.summary())
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = build_config(&cli)?;
    let scanner = DocumentScanner::new(config)?;

    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut failed = 0usize;
    let mut json_items = Vec::with_capacity(cli.images.len());

    for path in &cli.images {
        match process(&scanner, &cli, path) {
            Ok(summary) => match cli.format {
                OutputFormat::Json => json_items.push(serde_json::json!({
                    "path": path.display().to_string(),
                    "ok": true,
                    "summary": summary,
                })),
                OutputFormat::Text => {
                    let c = summary.corners;
                    println!(
                        "{}\tok\t{}x{}\t{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1}",
                        path.display(),
                        summary.output_width,
                        summary.output_height,
                        c[0].0,
                        c[0].1,
                        c[1].0,
                        c[1].1,
                        c[2].0,
                        c[2].1,
                        c[3].0,
                        c[3].1,
                    );
                }
            },
            Err(e) => {
                failed += 1;
                warn!("{}: {}", path.display(), e);
                match cli.format {
                    OutputFormat::Json => json_items.push(serde_json::json!({
                        "path": path.display().to_string(),
                        "ok": false,
                        "error": e.to_string(),
                    })),
                    OutputFormat::Text => println!("{}\terror\t{}", path.display(), e),
                }
            }
        }
    }

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    }

    let total = cli.images.len();
    info!("{} of {} images scanned", total - failed, total);
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
