//! Spacecraft missions and the trajectory families they fly.

use std::{collections::VecDeque, sync::Arc};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::time::SimTime;

/// Number of points kept in a mission's trailing path.
pub const HISTORY_CAPACITY: usize = 100;

/// Periodic wobble added to an orbiter's offset from its target.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jitter {
    /// Radius of the wobble (scene units).
    pub amplitude: f64,
    /// Time for one full wobble (`days`).
    pub period_days: f64,
}

/// How a mission's position is derived. Each variant carries only what its
/// solver needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrajectoryModel {
    /// Straight-line escape from the system, e.g. interstellar probes.
    Escape {
        /// Distance from the centre at launch epoch (`AU`).
        base_distance: f64,
        /// Radial speed (`km/s`).
        speed: f64,
        /// Direction in the orbital plane (`rad`).
        bearing: f64,
        /// Angle above the orbital plane (`rad`).
        elevation: f64,
    },
    /// Conic orbit about the central star.
    Eccentric {
        /// `AU`
        perihelion: f64,
        /// `AU`
        aphelion: f64,
        /// `days`
        period_days: f64,
    },
    /// Parked at, or orbiting close to, another body.
    TargetRelative {
        target: Arc<str>,
        /// Constant offset from the target (scene units).
        offset: Vector3<f64>,
        /// `None` for landers.
        #[serde(default)]
        jitter: Option<Jitter>,
    },
    /// Circular, period-driven orbit around a parent body.
    StationOrbit {
        parent: Arc<str>,
        /// Physical radius of the parent (`km`).
        parent_radius_km: f64,
        /// Height above the parent's surface (`km`).
        altitude_km: f64,
        /// `rad`
        inclination: f64,
        /// `min`
        period_minutes: f64,
    },
    /// Held beyond a planet along the star-planet line.
    LagrangePoint {
        target: Arc<str>,
        /// Distance past the planet (`AU`).
        offset: f64,
    },
}

impl TrajectoryModel {
    /// The body whose live position this model depends on, if any.
    pub fn reference_body(&self) -> Option<&Arc<str>> {
        match self {
            Self::Escape { .. } | Self::Eccentric { .. } => None,
            Self::TargetRelative { target, .. } | Self::LagrangePoint { target, .. } => Some(target),
            Self::StationOrbit { parent, .. } => Some(parent),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Escape { .. } => "escape",
            Self::Eccentric { .. } => "eccentric",
            Self::TargetRelative { .. } => "target-relative",
            Self::StationOrbit { .. } => "station",
            Self::LagrangePoint { .. } => "lagrange",
        }
    }
}

/// Bounded FIFO of past positions; the oldest point is evicted first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionHistory {
    points: VecDeque<Vector3<f64>>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            points: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    pub fn push(&mut self, point: Vector3<f64>) {
        self.points.push_back(point);
        while self.points.len() > HISTORY_CAPACITY {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn oldest(&self) -> Option<&Vector3<f64>> {
        self.points.front()
    }

    pub fn latest(&self) -> Option<&Vector3<f64>> {
        self.points.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.points.iter()
    }
}

/// A spacecraft mission and its live position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpacecraftMission {
    pub id: Arc<str>,
    pub name: Arc<str>,
    /// Origin of the mission's own elapsed time.
    pub launch: SimTime,
    pub model: TrajectoryModel,
    /// Visual size in scene units.
    pub render_scale: f64,
    #[serde(skip)]
    pub position: Option<Vector3<f64>>,
    #[serde(skip)]
    pub history: PositionHistory,
}

impl SpacecraftMission {
    pub fn new(
        id: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        launch: SimTime,
        model: TrajectoryModel,
        render_scale: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            launch,
            model,
            render_scale,
            position: None,
            history: PositionHistory::new(),
        }
    }

    pub fn is_station(&self) -> bool {
        matches!(self.model, TrajectoryModel::StationOrbit { .. })
    }

    /// Record a freshly solved position.
    pub fn record(&mut self, position: Vector3<f64>) {
        self.position = Some(position);
        self.history.push(position);
    }
}

#[test]
fn history_keeps_the_newest_hundred() {
    let mut history = PositionHistory::new();
    for i in 0..250 {
        history.push(Vector3::new(i as f64, 0.0, 0.0));
    }
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history.oldest().map(|p| p.x), Some(150.0));
    assert_eq!(history.latest().map(|p| p.x), Some(249.0));
    assert!(history.iter().zip(history.iter().skip(1)).all(|(a, b)| a.x < b.x));
}

#[test]
fn reference_body_follows_the_variant() {
    let lander = TrajectoryModel::TargetRelative {
        target: "mars".into(),
        offset: Vector3::zeros(),
        jitter: None,
    };
    assert_eq!(lander.reference_body().map(|s| &**s), Some("mars"));

    let escape = TrajectoryModel::Escape {
        base_distance: 1.0,
        speed: 1.0,
        bearing: 0.0,
        elevation: 0.0,
    };
    assert!(escape.reference_body().is_none());
}
