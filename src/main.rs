//! bilingual-ocr - Hindi/English OCR for signage and scanned documents
//!
//! Prints exactly one JSON record on stdout; logs go to stderr.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bilingual_ocr::config::{load_config, AppConfig};
use bilingual_ocr::storage::default_config_path;
use bilingual_ocr::{generate_report, Collaborators, Language, OcrPipeline, OcrResult, OutputRecord};

/// Zone-aware Hindi/English OCR
#[derive(Parser, Debug)]
#[command(name = "bilingual-ocr")]
#[command(about = "Extract Hindi and English text from a photographed or scanned page")]
struct Args {
    /// Image to read
    image: PathBuf,

    /// Language hint for the whole-image mode; in zone mode, skips probing
    #[arg(short, long, value_enum)]
    lang: Option<LangArg>,

    /// Zone-by-zone reading or one pass over the whole image
    #[arg(short, long, value_enum, default_value_t = Mode::Zones)]
    mode: Mode,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the plain-text report instead of the JSON record
    #[arg(long)]
    report: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Zones,
    Whole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LangArg {
    English,
    Hindi,
}

impl From<LangArg> for Language {
    fn from(lang: LangArg) -> Self {
        match lang {
            LangArg::English => Language::English,
            LangArg::Hindi => Language::Hindi,
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging on stderr; stdout carries the record
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging already initialized");
    }

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&args)))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("OCR pipeline panicked")));

    match outcome {
        Ok(result) if args.report => print!("{}", generate_report(&result)),
        Ok(result) => println!("{}", OutputRecord::from_result(&result).to_json()),
        Err(e) => {
            error!("OCR failed: {:#}", e);
            let record = OutputRecord::failure(format!("{:#}", e), started.elapsed().as_secs_f64());
            println!("{}", record.to_json());
        }
    }
}

fn run(args: &Args) -> Result<OcrResult> {
    let mut config = resolve_config(args.config.as_deref())?;
    config.apply_env_overrides();

    let hint = args.lang.map(Language::from);
    if args.mode == Mode::Zones && hint.is_some() {
        config.language.force_language = hint;
    }

    let collaborators = Collaborators::probe(&config);
    let pipeline = OcrPipeline::new(&config, collaborators);

    match args.mode {
        Mode::Zones => pipeline
            .process_image(&args.image)
            .with_context(|| format!("Failed to process {:?}", args.image)),
        Mode::Whole => {
            let output = pipeline
                .process_whole_image(&args.image, hint.unwrap_or(Language::English))
                .with_context(|| format!("Failed to process {:?}", args.image))?;
            info!("Text produced by backend '{}'", output.backend_id());
            Ok(output.result)
        }
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading configuration from {:?}", path);
            load_config(&path)
        }
        _ => Ok(AppConfig::default()),
    }
}
