//! Definitions of celestial bodies.

use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::orbits::ephemeris::OrbitalElements;

/// Scene units per astronomical unit, unless configured otherwise.
pub const DEFAULT_AU_SCALE: f64 = 100.0;

/// Conversion between astronomical units and scene units.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneScale {
    pub units_per_au: f64,
}

impl SceneScale {
    pub fn new(units_per_au: f64) -> Self {
        Self { units_per_au }
    }

    pub fn au(&self, au: f64) -> f64 {
        au * self.units_per_au
    }
}

impl Default for SceneScale {
    fn default() -> Self {
        Self::new(DEFAULT_AU_SCALE)
    }
}

/// Broad category of a body. Drives how the camera frames it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyClass {
    Star,
    Planet,
    GasGiant,
    Moon,
    DwarfPlanet,
    Comet,
    Asteroid,
}

/// Orbit of a satellite around a parent body that is not the central star.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteOrbit {
    /// The body this satellite orbits.
    pub parent: Arc<str>,
    /// Tilt of the orbital plane relative to the parent's frame (`rad`).
    pub inclination: f64,
}

/// Static parameters of a celestial body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyParams {
    /// Stable key, unique across bodies and missions.
    pub id: Arc<str>,
    /// Human-readable label.
    pub name: Arc<str>,
    pub class: BodyClass,
    /// Distance from the centre of the system (`AU`), or from the parent for
    /// satellites. `None` for the central star and other fixed bodies.
    pub orbital_radius: Option<f64>,
    /// Angle advanced per tick (`rad`). Negative values orbit retrograde.
    pub angular_velocity: f64,
    /// Angle at creation (`rad`).
    #[serde(default)]
    pub initial_angle: f64,
    /// Visual size in scene units, unrelated to physical size.
    pub render_scale: f64,
    /// Set for moons and other satellites.
    #[serde(default)]
    pub satellite: Option<SatelliteOrbit>,
    /// Where a fixed body sits (scene units).
    #[serde(default = "Vector3::zeros")]
    pub anchor: Vector3<f64>,
    /// Mean elements for placing the body by date instead of by tick count.
    #[serde(default)]
    pub ephemeris: Option<OrbitalElements>,
}

impl BodyParams {
    pub fn is_satellite(&self) -> bool {
        self.satellite.is_some()
    }

    pub fn parent(&self) -> Option<&Arc<str>> {
        self.satellite.as_ref().map(|s| &s.parent)
    }

    /// Bodies without an orbital radius never move.
    pub fn is_fixed(&self) -> bool {
        self.orbital_radius.is_none()
    }
}
