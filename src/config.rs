use std::path::{Path, PathBuf};

use color_eyre::eyre::{self, WrapErr};
use orrery::{
    bodies::SceneScale,
    frame::SimulationConfig,
    navigation::NavigationConfig,
    quality::QualityThresholds,
    registry::PlanetMotion,
    time::SimTime,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Looked for in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG: &str = "orrery.toml";

/// Settings of a headless run, read from TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Scene units per AU.
    pub au_scale: f64,
    /// Frames to run.
    pub frames: u64,
    /// Simulated frame rate of the host loop.
    pub frame_rate: f64,
    /// Simulated seconds per real second.
    pub time_scale: f64,
    /// Start date, `YYYY-MM-DD`. J2000 when unset.
    pub start: Option<String>,
    /// Seed for moon phases.
    pub seed: u64,
    /// Frames before anything has a renderable.
    pub load_delay_frames: u64,
    pub quality_subject: String,
    /// `accumulated` steps every body per tick; `ephemeris` places the
    /// planets by date.
    pub planet_motion: PlanetMotion,
    pub navigation: NavigationConfig,
    pub quality: QualityThresholds,
    /// Catalogue in RON, replacing the built-in one.
    pub catalogue: Option<PathBuf>,
    pub commands: Vec<ScriptedCommand>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            au_scale: SceneScale::default().units_per_au,
            frames: 600,
            frame_rate: 60.0,
            time_scale: 86_400.0,
            start: None,
            seed: 0,
            load_delay_frames: 0,
            quality_subject: "sun".to_owned(),
            planet_motion: PlanetMotion::default(),
            navigation: NavigationConfig::default(),
            quality: QualityThresholds::default(),
            catalogue: None,
            commands: Vec::new(),
        }
    }
}

/// A user input replayed at a given frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    pub frame: u64,
    pub action: Command,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Command {
    Travel { target: String },
    Speed { value: f64 },
    Stop,
    ToggleOrbits,
    Pause,
    Resume,
    TimeScale { value: f64 },
    /// Change the simulated host frame rate, e.g. to exercise quality control.
    FrameRate { value: f64 },
}

impl DriverConfig {
    /// Read `path`, or [`DEFAULT_CONFIG`] if it exists, or fall back to
    /// defaults.
    pub fn load(path: Option<&Path>) -> eyre::Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml(&text).wrap_err_with(|| format!("in {}", path.display()))?;
        debug!(path = %path.display(), commands = config.commands.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> eyre::Result<Self> {
        let mut config: Self = toml::from_str(text).wrap_err("invalid config")?;
        config.commands.sort_by_key(|c| c.frame);
        if !(config.frame_rate.is_finite() && config.frame_rate > 0.0) {
            eyre::bail!("frame_rate must be positive, got {}", config.frame_rate);
        }
        if !(config.au_scale.is_finite() && config.au_scale > 0.0) {
            eyre::bail!("au_scale must be positive, got {}", config.au_scale);
        }
        config.navigation.validate().wrap_err("invalid [navigation]")?;
        Ok(config)
    }

    pub fn start_time(&self) -> eyre::Result<SimTime> {
        self.start
            .as_deref()
            .map_or(Ok(SimTime::J2000), SimTime::parse_date)
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            scale: SceneScale::new(self.au_scale),
            navigation: self.navigation.clone(),
            quality: self.quality.clone(),
            quality_subject: self.quality_subject.clone(),
            assumed_fps: self.frame_rate,
            planet_motion: self.planet_motion,
            ..SimulationConfig::default()
        }
    }
}

#[test]
fn config_reads_commands_in_frame_order() {
    let config = DriverConfig::from_toml(
        r#"
        frames = 120
        start = "2024-03-01"

        [navigation]
        retry_interval_ticks = 3

        [[commands]]
        frame = 30
        action = { kind = "travel", target = "moon" }

        [[commands]]
        frame = 10
        action = { kind = "speed", value = 4.0 }

        [[commands]]
        frame = 50
        action = { kind = "toggle-orbits" }
        "#,
    )
    .unwrap();
    assert_eq!(config.frames, 120);
    assert_eq!(config.navigation.retry_interval_ticks, 3);
    assert_eq!(config.navigation.arrival_threshold, 0.1);
    let frames: Vec<_> = config.commands.iter().map(|c| c.frame).collect();
    assert_eq!(frames, [10, 30, 50]);
    assert_eq!(config.commands[2].action, Command::ToggleOrbits);
    assert!(config.start_time().unwrap() > SimTime::J2000);
}

#[test]
fn config_rejects_bad_rates() {
    assert!(DriverConfig::from_toml("frame_rate = 0.0").is_err());
    assert!(DriverConfig::from_toml("au_scale = -1.0").is_err());
    assert!(DriverConfig::from_toml("[navigation.offsets]\nfov = 0.0").is_err());
    assert!(DriverConfig::from_toml("[navigation.offsets]\nfill = 0.0").is_err());
    let dated = DriverConfig::from_toml("planet_motion = \"ephemeris\"").unwrap();
    assert_eq!(dated.simulation().planet_motion, PlanetMotion::Ephemeris);
    assert_eq!(DriverConfig::from_toml("").unwrap(), DriverConfig::default());
}
