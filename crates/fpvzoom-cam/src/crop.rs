use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::document::{ConfigDocument, Edit, FieldKey};
use crate::modes::{self, LightMode, ModesConfig};
use crate::runner::{self, ProcessRunner};
use crate::CamConfig;

/// Commands recognised in STATUSTEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ZoomIn,
    ZoomOut,
    NightMode,
    DayMode,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zoom_in" => Ok(Command::ZoomIn),
            "zoom_out" => Ok(Command::ZoomOut),
            "night_mode" => Ok(Command::NightMode),
            "day_mode" => Ok(Command::DayMode),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Ordered crop rectangles, widest (level 0) first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomLevels {
    crops: Vec<String>,
}

impl ZoomLevels {
    pub fn new(crops: Vec<String>) -> Result<Self> {
        anyhow::ensure!(!crops.is_empty(), "at least one crop level is required");
        Ok(Self { crops })
    }

    pub fn last_index(&self) -> usize {
        self.crops.len() - 1
    }

    /// Crop for `level`, clamped to the last level.
    pub fn crop(&self, level: usize) -> &str {
        &self.crops[level.min(self.last_index())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Level changed and the new crop was written.
    Zoomed { level: usize, edit: Edit },
    /// Already at the limit; nothing written.
    AtLimit { level: usize },
    ModeSwitched(LightMode),
    /// Mode commands arrived but this deployment has no mode API.
    ModesUnsupported,
}

/// Owns the current zoom level and turns commands into config edits.
///
/// The Majestic file is re-read before every write so external edits made
/// between commands are preserved.
pub struct CropController<R: ProcessRunner> {
    path: PathBuf,
    key: FieldKey,
    levels: ZoomLevels,
    level: usize,
    runner: R,
    reload_commands: Vec<Vec<String>>,
    modes: Option<ModesConfig>,
}

impl<R: ProcessRunner> CropController<R> {
    pub fn new(cfg: &CamConfig, path: impl Into<PathBuf>, runner: R) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            key: cfg.field_key(),
            levels: ZoomLevels::new(cfg.crops.clone()).context("camera.crops")?,
            level: 0,
            runner,
            reload_commands: cfg.reload_commands.clone(),
            modes: cfg.modes.clone(),
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn crop(&self) -> &str {
        self.levels.crop(self.level)
    }

    pub fn levels(&self) -> &ZoomLevels {
        &self.levels
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Back to the widest crop. Always writes, even if the file already
    /// holds that value.
    pub fn reset_to_default(&mut self) -> Result<Edit> {
        self.apply_level(0)
    }

    /// Jump to `level` (clamped) and write it. Only the default level may
    /// create a missing field.
    pub fn apply_level(&mut self, level: usize) -> Result<Edit> {
        self.level = level.min(self.levels.last_index());
        self.persist(self.level == 0)
    }

    pub fn execute(&mut self, cmd: Command) -> Result<Outcome> {
        match cmd {
            Command::ZoomIn => {
                if self.level >= self.levels.last_index() {
                    return Ok(Outcome::AtLimit { level: self.level });
                }
                self.level += 1;
                let edit = self.persist(false)?;
                Ok(Outcome::Zoomed { level: self.level, edit })
            }
            Command::ZoomOut => {
                if self.level == 0 {
                    return Ok(Outcome::AtLimit { level: 0 });
                }
                self.level -= 1;
                let edit = self.persist(false)?;
                Ok(Outcome::Zoomed { level: self.level, edit })
            }
            Command::NightMode => self.switch_mode(LightMode::Night),
            Command::DayMode => self.switch_mode(LightMode::Day),
        }
    }

    /// Parse and execute a command string. Unknown text yields `None`.
    pub fn handle_text(&mut self, text: &str) -> Option<Result<Outcome>> {
        let cmd = text.parse::<Command>().ok()?;
        Some(self.execute(cmd))
    }

    fn switch_mode(&mut self, mode: LightMode) -> Result<Outcome> {
        let Some(cfg) = &self.modes else {
            return Ok(Outcome::ModesUnsupported);
        };
        anyhow::ensure!(modes::trigger(&mut self.runner, cfg, mode), "{:?} mode switch failed", mode);
        Ok(Outcome::ModeSwitched(mode))
    }

    fn persist(&mut self, ensure_exists: bool) -> Result<Edit> {
        let crop = self.levels.crop(self.level).to_string();
        let mut doc = ConfigDocument::load(&self.path)?;
        let edit = doc
            .set_field(&self.key, &crop, ensure_exists)
            .with_context(|| format!("no changes written to {}", self.path.display()))?;
        doc.save(&self.path)?;
        info!(level = self.level, crop = %crop, ?edit, "crop updated");

        if !runner::reload_service(&mut self.runner, &self.reload_commands) {
            warn!("crop {} written but video service not reloaded", crop);
        }
        Ok(edit)
    }
}
