use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facefind::{config, validator, MatchEngine, MatchPolicy, Pipeline, ReportDriver, SkipList};
use log::info;

#[derive(Parser)]
#[command(name = "facefind")]
#[command(version, about = "Find the photos in a directory tree that show a given face")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every image under a directory against a reference face
    Find {
        /// Image containing the reference face
        #[arg(short, long, default_value = "base.jpg")]
        base: PathBuf,
        /// Directory to scan
        #[arg(short, long, default_value = "images")]
        dir: PathBuf,
        /// Directory name to leave out (repeatable), added to the config list
        #[arg(short, long)]
        skip: Vec<String>,
        /// Maximum embedding distance counted as a match
        #[arg(short, long)]
        tolerance: Option<f32>,
        /// Match when any face in an image matches, not just the first
        #[arg(long)]
        any_face: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show whether an image is usable and how many faces it has
    Faces {
        image: PathBuf,
    },
    /// Open config file in editor
    Config {
        /// Write the default config first if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(level)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Find {
            base,
            dir,
            skip,
            tolerance,
            any_face,
            json,
        } => {
            let policy = if any_face {
                MatchPolicy::AnyFace
            } else {
                cfg.policy
            };
            let engine = MatchEngine::new(tolerance.unwrap_or(cfg.tolerance), policy);
            let skip: SkipList = cfg.skip.iter().cloned().chain(skip).collect();
            find(&cfg, engine, &base, &dir, &skip, json)
        }
        Commands::Faces { image } => faces(&cfg, &image),
        Commands::Config { init } => open_config(cli.config.as_deref(), init),
    }
}

fn pipeline(cfg: &config::Config) -> Result<Pipeline> {
    Ok(Pipeline::new(&cfg.model_paths())
        .context("Failed to initialize face recognition pipeline")?
        .with_thresholds(cfg.score_threshold, cfg.nms_threshold))
}

fn find(
    cfg: &config::Config,
    engine: MatchEngine,
    base: &Path,
    dir: &Path,
    skip: &SkipList,
    json: bool,
) -> Result<()> {
    info!("Reference image: {}", base.display());
    info!("Scanning: {} (skipping {} folder name(s))", dir.display(), skip.len());

    let mut driver = ReportDriver::new(pipeline(cfg)?, engine);
    let report = driver
        .run(base, dir, skip)
        .with_context(|| format!("Failed to compare {} against {}", dir.display(), base.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for verdict in &report.verdicts {
            println!("{}", verdict);
        }
    }
    Ok(())
}

fn faces(cfg: &config::Config, image: &Path) -> Result<()> {
    if !validator::is_valid_image(image)? {
        anyhow::bail!("{} is not a usable image", image.display());
    }
    let img = validator::decode_image(image)?
        .with_context(|| format!("Failed to decode {}", image.display()))?;

    let mut pipeline = pipeline(cfg)?;
    let found = pipeline.embed_faces(&img)?;
    println!("{}: {} face(s)", image.display(), found.len());
    for (i, (detection, embedding)) in found.iter().enumerate() {
        let [x, y, w, h] = detection.bbox;
        println!(
            "  #{} score {:.3} at ({:.0}, {:.0}) {:.0}x{:.0}, {}-d embedding",
            i + 1,
            detection.score,
            x,
            y,
            w,
            h,
            embedding.dim()
        );
    }
    Ok(())
}

fn open_config(path: Option<&Path>, init: bool) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if init && !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
        info!("Wrote default config: {}", config_path.display());
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
