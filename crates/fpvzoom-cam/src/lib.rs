pub mod crop;
pub mod doctor;
pub mod document;
pub mod modes;
pub mod runner;

use serde::Deserialize;

pub use crop::{Command, CropController, Outcome, ZoomLevels};
pub use document::{ConfigDocument, DocumentError, Edit, FieldKey, Location};
pub use modes::{LightMode, ModesConfig};
pub use runner::{ProcessRunner, SystemRunner};

pub const DEFAULT_MAJESTIC_CONFIG: &str = "/etc/majestic.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CamConfig {
    /// Majestic YAML path. `MAJESTIC_CONFIG_PATH` / `--majestic-config` win over this.
    pub config_path: String,

    /// Stream section holding the crop, e.g. `video0` or `video1`.
    pub section: String,
    pub field: String,

    /// Zoom levels, widest first. Format: `XxYxWxH`.
    pub crops: Vec<String>,

    /// Tried in order until one exits 0.
    pub reload_commands: Vec<Vec<String>>,

    /// Present only on firmware with the night/day HTTP API.
    pub modes: Option<ModesConfig>,
}

impl Default for CamConfig {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_MAJESTIC_CONFIG.into(),
            section: "video1".into(),
            field: "crop".into(),
            crops: vec![
                "0x0x1920x1080".into(),
                "480x270x960x540".into(),
                "720x405x480x270".into(),
                "840x472x240x135".into(),
            ],
            reload_commands: vec![
                vec!["killall".into(), "-1".into(), "majestic".into()],
                vec!["killall".into(), "majestic".into()],
            ],
            modes: None,
        }
    }
}

impl CamConfig {
    pub fn field_key(&self) -> FieldKey {
        FieldKey::new(&self.section, &self.field)
    }
}
