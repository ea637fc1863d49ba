use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fpvzoom_cam::{doctor as cam_doctor, CamConfig, ConfigDocument, CropController, SystemRunner};
use fpvzoom_fc::{doctor as fc_doctor, FcConfig, SerialTransport, TelemetryLoop};

#[derive(Debug, Parser)]
#[command(name = "fpvzoom", version, about = "FPV companion: STATUSTEXT zoom commands to Majestic crop")]
struct Cli {
    /// TOML config. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Majestic YAML to edit. Overrides camera.config_path.
    #[arg(long, env = "MAJESTIC_CONFIG_PATH")]
    majestic_config: Option<String>,

    /// Log filter, e.g. `debug` or `fpvzoom_fc=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the FC link and serve zoom commands until the link fails or Ctrl-C.
    Run,
    /// Validate config and the Majestic file.
    Doctor,
    /// Write the crop for one zoom level and reload the video service.
    Apply { level: usize },
    /// Print where the crop field lives and its current value.
    Show,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    fc: FcConfig,
    camera: CamConfig,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

fn majestic_path(cli: &Cli, cfg: &Config) -> PathBuf {
    cli.majestic_config
        .as_deref()
        .unwrap_or(&cfg.camera.config_path)
        .into()
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).with_context(|| format!("bad --log-level {:?}", l))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let cfg = load_config(cli.config.as_deref())?;
    let majestic = majestic_path(&cli, &cfg);

    match cli.cmd {
        Command::Run => run(cfg, majestic).await?,
        Command::Doctor => doctor(&cfg, &majestic)?,
        Command::Apply { level } => apply(&cfg, majestic, level)?,
        Command::Show => show(&cfg, &majestic)?,
    }
    Ok(())
}

async fn run(cfg: Config, majestic: PathBuf) -> Result<()> {
    info!("run: starting, majestic config {}", majestic.display());
    fc_doctor::check_fc(&cfg.fc).context("fc config")?;

    let mut crop = CropController::new(&cfg.camera, majestic, SystemRunner)?;
    let link = SerialTransport::open(&cfg.fc.serial_dev, cfg.fc.baud).context("FC open")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut telemetry = TelemetryLoop::new(link, &cfg.fc).with_shutdown(shutdown.clone());

    // Serial reads block; keep them off the async workers.
    let mut handle = tokio::task::spawn_blocking(move || telemetry.run(&mut crop));

    tokio::select! {
        res = &mut handle => res.context("telemetry task panicked")?,
        sig = tokio::signal::ctrl_c() => {
            sig.context("listen for ctrl-c")?;
            info!("ctrl-c: stopping");
            shutdown.store(true, Ordering::Relaxed);
            handle.await.context("telemetry task panicked")?
        }
    }
}

fn doctor(cfg: &Config, majestic: &Path) -> Result<()> {
    info!("doctor: starting");

    fc_doctor::check_fc(&cfg.fc)?;
    cam_doctor::check_crops(&cfg.camera.crops)?;
    let loc = cam_doctor::check_document(majestic, &cfg.camera.field_key())?;
    info!(?loc, "doctor: {} OK", majestic.display());

    if cfg.camera.modes.is_none() {
        info!("doctor: night_mode/day_mode disabled (no [camera.modes])");
    }

    info!("doctor: OK");
    Ok(())
}

fn apply(cfg: &Config, majestic: PathBuf, level: usize) -> Result<()> {
    let mut crop = CropController::new(&cfg.camera, majestic, SystemRunner)?;
    if level > crop.levels().last_index() {
        warn!("level {} clamped to {}", level, crop.levels().last_index());
    }
    let edit = crop.apply_level(level)?;
    println!("level={} crop={} edit={:?}", crop.level(), crop.crop(), edit);
    Ok(())
}

fn show(cfg: &Config, majestic: &Path) -> Result<()> {
    let doc = ConfigDocument::load(majestic)?;
    let key = cfg.camera.field_key();
    let loc = doc.locate(&key);
    let value = doc.field_value(&key);

    println!("file={}", majestic.display());
    println!(
        "section={} header_row={:?} indent={}",
        key.section,
        loc.insert_row.map(|r| r - 1),
        loc.section_indent
    );
    println!("field={} row={:?}", key.field, loc.field_row);
    println!("value={}", value.as_deref().unwrap_or("<missing>"));
    let level = value
        .as_deref()
        .and_then(|v| cfg.camera.crops.iter().position(|c| c == v));
    println!("level={:?}", level);
    Ok(())
}
