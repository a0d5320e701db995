// src/config/mod.rs - Typed settings store, TOML-backed
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// All tuning parameters the engine reads. Every field has a default so a
/// missing or partial file still yields a usable configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub printer: PrinterSettings,

    #[serde(default)]
    pub exposure: ExposureSettings,

    #[serde(default)]
    pub motor: MotorSettings,

    #[serde(default)]
    pub first_layer: LayerProfile,

    #[serde(default)]
    pub burn_in_layer: LayerProfile,

    #[serde(default)]
    pub model_layer: LayerProfile,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Board-level wiring and identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterSettings {
    /// Hardware revision; rev 0 boards have the door switch wired inverted.
    #[serde(default = "default_hardware_rev")]
    pub hardware_rev: u32,

    /// False only in debug builds, for bench runs without boards attached.
    #[serde(default = "default_true")]
    pub have_hardware: bool,

    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    #[serde(default = "default_motor_address")]
    pub motor_slave_address: u16,

    #[serde(default = "default_frontpanel_address")]
    pub frontpanel_slave_address: u16,

    #[serde(default = "default_door_pin")]
    pub door_pin: u8,

    #[serde(default = "default_button_pin")]
    pub button_interrupt_pin: u8,

    #[serde(default = "default_motor_pin")]
    pub motor_interrupt_pin: u8,
}

/// Exposure schedule for the three layer classes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExposureSettings {
    #[serde(default = "default_first_exposure")]
    pub first_exposure_sec: f64,

    #[serde(default = "default_burn_in_exposure")]
    pub burn_in_exposure_sec: f64,

    #[serde(default = "default_model_exposure")]
    pub model_exposure_sec: f64,

    /// Number of burn-in layers after the first layer; zero disables them.
    #[serde(default = "default_burn_in_layers")]
    pub burn_in_layers: u32,
}

/// Motor-board programming: axis geometry, homing and start-position
/// profiles, and the per-print settings sent during the start handshake.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorSettings {
    /// Watchdog armed before every interrupt-terminated command batch.
    #[serde(default = "default_motor_timeout")]
    pub timeout_sec: f64,

    #[serde(default = "default_step_angle")]
    pub z_step_angle: i32,
    #[serde(default = "default_z_microns_per_rev")]
    pub z_microns_per_rev: i32,
    #[serde(default = "default_microstepping")]
    pub z_micro_step: i32,

    #[serde(default = "default_step_angle")]
    pub r_step_angle: i32,
    #[serde(default = "default_r_millidegrees_per_rev")]
    pub r_millidegrees_per_rev: i32,
    #[serde(default = "default_microstepping")]
    pub r_micro_step: i32,

    #[serde(default = "default_z_homing_jerk")]
    pub z_homing_jerk: i32,
    #[serde(default = "default_z_homing_speed")]
    pub z_homing_speed: i32,
    #[serde(default = "default_r_homing_jerk")]
    pub r_homing_jerk: i32,
    #[serde(default = "default_r_homing_speed")]
    pub r_homing_speed: i32,
    /// Backoff rotation applied after the rotary home, millidegrees.
    #[serde(default = "default_r_homing_angle")]
    pub r_homing_angle: i32,

    #[serde(default = "default_z_start_jerk")]
    pub z_start_print_jerk: i32,
    #[serde(default = "default_z_start_speed")]
    pub z_start_print_speed: i32,
    #[serde(default = "default_r_start_jerk")]
    pub r_start_print_jerk: i32,
    #[serde(default = "default_r_start_speed")]
    pub r_start_print_speed: i32,
    #[serde(default = "default_r_start_angle")]
    pub r_start_print_angle: i32,
    /// Z travel from home down to the PDMS, microns.
    #[serde(default = "default_z_start_position")]
    pub z_start_print_position: i32,

    /// Build-head lift for pause-and-inspect, microns.
    #[serde(default = "default_inspection_height")]
    pub inspection_height: i32,

    #[serde(default = "default_separation_rpm")]
    pub separation_rpm: i32,

    /// Nominal layer thickness, microns.
    #[serde(default = "default_layer_thickness")]
    pub layer_thickness: i32,
}

/// Separation/approach motion profile for one layer class.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerProfile {
    #[serde(default = "default_sep_r_jerk")]
    pub separation_r_jerk: i32,
    #[serde(default = "default_sep_r_speed")]
    pub separation_r_speed: i32,
    /// Tray rotation away from the build area, millidegrees.
    #[serde(default = "default_rotation")]
    pub rotation_millidegrees: i32,
    #[serde(default = "default_sep_z_jerk")]
    pub separation_z_jerk: i32,
    #[serde(default = "default_sep_z_speed")]
    pub separation_z_speed: i32,
    /// Build-head lift during separation, microns.
    #[serde(default = "default_z_lift")]
    pub z_lift_microns: i32,
    #[serde(default = "default_app_r_jerk")]
    pub approach_r_jerk: i32,
    #[serde(default = "default_app_r_speed")]
    pub approach_r_speed: i32,
    #[serde(default = "default_app_z_jerk")]
    pub approach_z_jerk: i32,
    #[serde(default = "default_app_z_speed")]
    pub approach_z_speed: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    #[serde(default = "default_status_pipe")]
    pub status_pipe: PathBuf,
    #[serde(default = "default_print_data_dir")]
    pub print_data_dir: PathBuf,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_print_settings_file")]
    pub print_settings_file: PathBuf,
}

/// Per-print overrides shipped alongside print data, JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PrintFileSettings {
    pub first_exposure_sec: Option<f64>,
    pub burn_in_exposure_sec: Option<f64>,
    pub model_exposure_sec: Option<f64>,
    pub burn_in_layers: Option<u32>,
    pub layer_thickness: Option<i32>,
    pub job_name: Option<String>,
}

impl Settings {
    /// Load from a TOML file, remembering the path for `reload` and `save`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&text)?;
        settings.source = Some(path.to_path_buf());
        settings.validate()?;
        Ok(settings)
    }

    /// Re-read the file this store was loaded from. A store built from
    /// defaults has nothing to reload.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = self.source.clone() {
            *self = Settings::load(&path)?;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.source {
            std::fs::write(path, toml::to_string_pretty(self)?)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exposure.first_exposure_sec <= 0.0
            || self.exposure.burn_in_exposure_sec <= 0.0
            || self.exposure.model_exposure_sec <= 0.0
        {
            return Err(ConfigError::Invalid(
                "exposure times must be positive".into(),
            ));
        }
        if self.motor.timeout_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "motor timeout must be positive".into(),
            ));
        }
        if self.motor.layer_thickness <= 0 {
            return Err(ConfigError::Invalid(
                "layer thickness must be positive".into(),
            ));
        }
        if self.motor.z_microns_per_rev <= 0 || self.motor.r_millidegrees_per_rev <= 0 {
            return Err(ConfigError::Invalid(
                "axis units per revolution must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply per-print overrides on top of the stored values.
    pub fn apply_print_file(&mut self, overrides: &PrintFileSettings) {
        if let Some(v) = overrides.first_exposure_sec {
            self.exposure.first_exposure_sec = v;
        }
        if let Some(v) = overrides.burn_in_exposure_sec {
            self.exposure.burn_in_exposure_sec = v;
        }
        if let Some(v) = overrides.model_exposure_sec {
            self.exposure.model_exposure_sec = v;
        }
        if let Some(v) = overrides.burn_in_layers {
            self.exposure.burn_in_layers = v;
        }
        if let Some(v) = overrides.layer_thickness {
            self.motor.layer_thickness = v;
        }
    }

    /// One-line JSON dump of everything, logged at print start so every job
    /// records the parameters it ran with.
    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// An empty TOML document deserializes to the per-field defaults, so the
// Default impls stay in lockstep with the serde attributes.
impl Default for PrinterSettings {
    fn default() -> Self {
        toml::from_str("").expect("defaults are complete")
    }
}
impl Default for ExposureSettings {
    fn default() -> Self {
        toml::from_str("").expect("defaults are complete")
    }
}
impl Default for MotorSettings {
    fn default() -> Self {
        toml::from_str("").expect("defaults are complete")
    }
}
impl Default for LayerProfile {
    fn default() -> Self {
        toml::from_str("").expect("defaults are complete")
    }
}
impl Default for PathSettings {
    fn default() -> Self {
        toml::from_str("").expect("defaults are complete")
    }
}

fn default_hardware_rev() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_i2c_bus() -> u8 {
    1
}
fn default_motor_address() -> u16 {
    0x10
}
fn default_frontpanel_address() -> u16 {
    0x11
}
fn default_door_pin() -> u8 {
    47
}
fn default_button_pin() -> u8 {
    60
}
fn default_motor_pin() -> u8 {
    27
}
fn default_first_exposure() -> f64 {
    8.0
}
fn default_burn_in_exposure() -> f64 {
    4.0
}
fn default_model_exposure() -> f64 {
    2.5
}
fn default_burn_in_layers() -> u32 {
    5
}
fn default_motor_timeout() -> f64 {
    30.0
}
fn default_step_angle() -> i32 {
    1800
}
fn default_z_microns_per_rev() -> i32 {
    2000
}
fn default_microstepping() -> i32 {
    6
}
fn default_r_millidegrees_per_rev() -> i32 {
    360_000
}
fn default_z_homing_jerk() -> i32 {
    500_000
}
fn default_z_homing_speed() -> i32 {
    4500
}
fn default_r_homing_jerk() -> i32 {
    100_000
}
fn default_r_homing_speed() -> i32 {
    5
}
fn default_r_homing_angle() -> i32 {
    -60_000
}
fn default_z_start_jerk() -> i32 {
    100_000
}
fn default_z_start_speed() -> i32 {
    4500
}
fn default_r_start_jerk() -> i32 {
    100_000
}
fn default_r_start_speed() -> i32 {
    5
}
fn default_r_start_angle() -> i32 {
    60_000
}
fn default_z_start_position() -> i32 {
    -165_000
}
fn default_inspection_height() -> i32 {
    60_000
}
fn default_separation_rpm() -> i32 {
    6
}
fn default_layer_thickness() -> i32 {
    25
}
fn default_sep_r_jerk() -> i32 {
    100_000
}
fn default_sep_r_speed() -> i32 {
    6
}
fn default_rotation() -> i32 {
    60_000
}
fn default_sep_z_jerk() -> i32 {
    500_000
}
fn default_sep_z_speed() -> i32 {
    3000
}
fn default_z_lift() -> i32 {
    2000
}
fn default_app_r_jerk() -> i32 {
    100_000
}
fn default_app_r_speed() -> i32 {
    6
}
fn default_app_z_jerk() -> i32 {
    500_000
}
fn default_app_z_speed() -> i32 {
    3000
}
fn default_status_pipe() -> PathBuf {
    PathBuf::from("/tmp/lithos/status")
}
fn default_print_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/lithos/print_data")
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("/var/lib/lithos/staging")
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("/var/lib/lithos/download")
}
fn default_print_settings_file() -> PathBuf {
    PathBuf::from("/var/lib/lithos/print_settings.json")
}
