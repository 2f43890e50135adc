//! Live state of every body and mission, keyed by id.

use std::{
    collections::{HashMap, HashSet},
    f64::consts,
    sync::Arc,
};

use color_eyre::eyre::{self, bail};
use itertools::Itertools;
use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    bodies::{BodyClass, BodyParams, SceneScale},
    mission::SpacecraftMission,
    orbits::{
        circular::{self, BOB_PERIOD},
        ephemeris,
        trajectory::{self, Reference},
    },
    time::SimTime,
};

/// A body plus the state it accumulates tick by tick.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyState {
    pub params: Arc<BodyParams>,
    /// Wrapped into `[0, 2π)`.
    pub angle: f64,
    /// Satellite bob phase, wrapped into `[0, BOB_PERIOD)`.
    phase: f64,
    /// Scene units.
    pub position: Vector3<f64>,
}

/// What kind of thing an id refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Body(BodyClass),
    Spacecraft { station: bool },
}

/// How bodies that carry orbital elements are placed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanetMotion {
    /// Every body advances its angle by a fixed step per tick.
    #[default]
    Accumulated,
    /// Bodies with orbital elements sit where they are on the clock's date.
    /// The rest keep accumulating.
    Ephemeris,
}

#[derive(Clone, Debug)]
pub struct Registry {
    bodies: HashMap<Arc<str>, BodyState>,
    /// Parents always come before their satellites.
    body_order: Vec<Arc<str>>,
    missions: HashMap<Arc<str>, SpacecraftMission>,
    mission_order: Vec<Arc<str>>,
    /// Missions whose reference body could not be resolved on the last tick.
    stalled: HashSet<Arc<str>>,
    scale: SceneScale,
    motion: PlanetMotion,
    /// Instant of the last advance.
    now: SimTime,
}

impl Registry {
    pub fn new(scale: SceneScale) -> Self {
        Self {
            bodies: HashMap::new(),
            body_order: Vec::new(),
            missions: HashMap::new(),
            mission_order: Vec::new(),
            stalled: HashSet::new(),
            scale,
            motion: PlanetMotion::default(),
            now: SimTime::J2000,
        }
    }

    /// Build a registry from unordered bodies and missions. Satellites may be
    /// listed before their parents.
    pub fn with_contents(
        bodies: impl IntoIterator<Item = BodyParams>,
        missions: impl IntoIterator<Item = SpacecraftMission>,
        scale: SceneScale,
    ) -> eyre::Result<Self> {
        let mut registry = Self::new(scale);
        let mut pending: Vec<BodyParams> = bodies.into_iter().collect();
        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|b| b.parent().map_or(true, |p| registry.bodies.contains_key(p)));
            if ready.is_empty() {
                bail!(
                    "satellites with unknown or cyclic parents: {}",
                    blocked.iter().map(|b| &*b.id).join(", ")
                );
            }
            for body in ready {
                registry.add_body(body)?;
            }
            pending = blocked;
        }
        for mission in missions {
            registry.add_mission(mission)?;
        }
        Ok(registry)
    }

    pub fn scale(&self) -> SceneScale {
        self.scale
    }

    pub fn planet_motion(&self) -> PlanetMotion {
        self.motion
    }

    /// Takes effect on the next advance.
    pub fn set_planet_motion(&mut self, motion: PlanetMotion) {
        if motion != self.motion {
            debug!(?motion, "planet motion changed");
            self.motion = motion;
        }
    }

    /// Register a body. A satellite's parent must already be present.
    pub fn add_body(&mut self, params: BodyParams) -> eyre::Result<()> {
        if self.contains(&params.id) {
            bail!("duplicate id {}", params.id);
        }
        let parent = match params.parent() {
            Some(parent) => match self.bodies.get(parent) {
                Some(state) => Some(state.position),
                None => bail!("{} orbits unknown body {parent}", params.id),
            },
            None => None,
        };

        let mut state = BodyState {
            angle: circular::wrap(params.initial_angle, 2.0 * consts::PI),
            phase: circular::wrap(params.initial_angle, BOB_PERIOD),
            position: params.anchor,
            params: Arc::new(params),
        };
        state.position = dated_position(&state.params, self.motion, self.now, self.scale)
            .unwrap_or_else(|| body_position(&state, parent, self.scale));

        debug!(id = %state.params.id, position = ?state.position, "added body");
        let id = state.params.id.clone();
        self.body_order.push(id.clone());
        self.bodies.insert(id, state);
        Ok(())
    }

    /// Register a mission. Its reference body may arrive later; until then the
    /// mission has no position.
    pub fn add_mission(&mut self, mission: SpacecraftMission) -> eyre::Result<()> {
        if self.contains(&mission.id) {
            bail!("duplicate id {}", mission.id);
        }
        debug!(id = %mission.id, model = mission.model.kind(), "added mission");
        let id = mission.id.clone();
        self.mission_order.push(id.clone());
        self.missions.insert(id, mission);
        Ok(())
    }

    /// Advance every body one tick and re-solve every mission at `now`.
    ///
    /// Bodies go parent-first, then missions, so nothing reads a stale
    /// position. Returns the ids whose position changed.
    pub fn advance(&mut self, now: SimTime) -> Vec<Arc<str>> {
        let mut changed = Vec::new();
        self.now = now;

        for id in &self.body_order {
            let parent = self.bodies[id]
                .params
                .parent()
                .and_then(|p| self.bodies.get(p))
                .map(|p| p.position);
            let Some(state) = self.bodies.get_mut(id) else {
                continue;
            };
            if state.params.is_fixed() {
                continue;
            }
            let w = state.params.angular_velocity;
            state.phase = circular::wrap(state.phase + w, BOB_PERIOD);
            let position = match dated_position(&state.params, self.motion, now, self.scale) {
                Some(position) => {
                    state.angle = circular::wrap(libm::atan2(position.z, position.x), 2.0 * consts::PI);
                    position
                }
                None => {
                    state.angle = circular::advance_angle(state.angle, w);
                    body_position(state, parent, self.scale)
                }
            };
            if position != state.position {
                state.position = position;
                changed.push(id.clone());
            }
        }

        for id in &self.mission_order {
            let Some(mission) = self.missions.get(id) else {
                continue;
            };
            let solved = trajectory::solve(mission, now, self.scale, |target| {
                self.bodies.get(target).map(|b| Reference {
                    position: b.position,
                    render_scale: b.params.render_scale,
                })
            });
            match solved {
                Some(position) => {
                    if self.stalled.remove(id) {
                        debug!(%id, "reference body resolved");
                    }
                    if let Some(mission) = self.missions.get_mut(id) {
                        trace!(%id, ?position);
                        mission.record(position);
                        changed.push(id.clone());
                    }
                }
                None => {
                    if self.stalled.insert(id.clone()) {
                        warn!(
                            %id,
                            reference = ?mission.model.reference_body(),
                            "reference body unavailable, holding position"
                        );
                    }
                }
            }
        }

        changed
    }

    /// The registry's own handle for `id`, if anything is registered under it.
    pub fn canonical_id(&self, id: &str) -> Option<Arc<str>> {
        self.bodies
            .get_key_value(id)
            .map(|(k, _)| k)
            .or_else(|| self.missions.get_key_value(id).map(|(k, _)| k))
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bodies.contains_key(id) || self.missions.contains_key(id)
    }

    /// Live position in scene units. Missions have none until first solved.
    pub fn position(&self, id: &str) -> Option<Vector3<f64>> {
        match self.bodies.get(id) {
            Some(body) => Some(body.position),
            None => self.missions.get(id).and_then(|m| m.position),
        }
    }

    pub fn kind(&self, id: &str) -> Option<ObjectKind> {
        match self.bodies.get(id) {
            Some(body) => Some(ObjectKind::Body(body.params.class)),
            None => self.missions.get(id).map(|m| ObjectKind::Spacecraft {
                station: m.is_station(),
            }),
        }
    }

    pub fn render_scale(&self, id: &str) -> Option<f64> {
        match self.bodies.get(id) {
            Some(body) => Some(body.params.render_scale),
            None => self.missions.get(id).map(|m| m.render_scale),
        }
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        match self.bodies.get(id) {
            Some(body) => Some(&body.params.name),
            None => self.missions.get(id).map(|m| &*m.name),
        }
    }

    pub fn body(&self, id: &str) -> Option<&BodyState> {
        self.bodies.get(id)
    }

    pub fn mission(&self, id: &str) -> Option<&SpacecraftMission> {
        self.missions.get(id)
    }

    /// Bodies in update order.
    pub fn bodies(&self) -> impl Iterator<Item = &BodyState> {
        self.body_order.iter().filter_map(|id| self.bodies.get(id))
    }

    /// Missions in registration order.
    pub fn missions(&self) -> impl Iterator<Item = &SpacecraftMission> {
        self.mission_order.iter().filter_map(|id| self.missions.get(id))
    }

    /// Ids of bodies and missions, bodies first.
    pub fn ids(&self) -> impl Iterator<Item = &Arc<str>> {
        self.body_order.iter().chain(self.mission_order.iter())
    }

    /// The body or positioned mission closest to `point`, with its distance.
    pub fn nearest(&self, point: &Vector3<f64>) -> Option<(Arc<str>, f64)> {
        self.ids()
            .filter_map(|id| Some((id, self.position(id)?)))
            .map(|(id, p)| (id, (p - point).norm()))
            .min_by_key(|&(_, d)| OrderedFloat(d))
            .map(|(id, d)| (id.clone(), d))
    }
}

/// Where a body with orbital elements sits at `now`, when placing by date.
fn dated_position(
    params: &BodyParams,
    motion: PlanetMotion,
    now: SimTime,
    scale: SceneScale,
) -> Option<Vector3<f64>> {
    match motion {
        PlanetMotion::Ephemeris if !params.is_satellite() => params
            .ephemeris
            .as_ref()
            .map(|el| ephemeris::scene_position(el, now, scale)),
        _ => None,
    }
}

fn body_position(state: &BodyState, parent: Option<Vector3<f64>>, scale: SceneScale) -> Vector3<f64> {
    let params = &state.params;
    let Some(radius) = params.orbital_radius else {
        return params.anchor;
    };
    let radius = scale.au(radius);
    match (&params.satellite, parent) {
        (Some(orbit), Some(parent)) => {
            circular::satellite_position(&parent, radius, state.phase, orbit.inclination)
        }
        _ => circular::planar_position(radius, state.angle),
    }
}

#[cfg(test)]
fn planet(id: &str, radius: f64, w: f64) -> BodyParams {
    BodyParams {
        id: id.into(),
        name: id.into(),
        class: BodyClass::Planet,
        orbital_radius: Some(radius),
        angular_velocity: w,
        initial_angle: 0.0,
        render_scale: 0.2,
        satellite: None,
        anchor: Vector3::zeros(),
        ephemeris: None,
    }
}

#[cfg(test)]
fn moon(id: &str, parent: &str) -> BodyParams {
    BodyParams {
        class: BodyClass::Moon,
        satellite: Some(crate::bodies::SatelliteOrbit {
            parent: parent.into(),
            inclination: 0.1,
        }),
        ..planet(id, 0.02, 0.01)
    }
}

#[cfg(test)]
fn lander(target: &str) -> SpacecraftMission {
    SpacecraftMission::new(
        "lander",
        "Lander",
        SimTime::J2000,
        crate::mission::TrajectoryModel::TargetRelative {
            target: target.into(),
            offset: Vector3::new(0.0, 0.5, 0.0),
            jitter: None,
        },
        0.003,
    )
}

#[test]
fn planet_angle_and_radius_hold_over_many_ticks() {
    let mut registry =
        Registry::with_contents([planet("mars", 1.52, 0.00053)], [], SceneScale::default()).unwrap();
    for _ in 0..10_000 {
        registry.advance(SimTime::J2000);
    }
    let mars = registry.body("mars").unwrap();
    let expected = circular::wrap(10_000.0 * 0.00053, 2.0 * consts::PI);
    assert!((mars.angle - expected).abs() < 1e-9);
    let p = mars.position;
    assert!((libm::sqrt(p.x * p.x + p.z * p.z) - 152.0).abs() / 152.0 < 1e-6);
}

#[test]
fn satellites_are_ordered_after_parents_and_follow_them() {
    let mut registry = Registry::with_contents(
        [moon("moon", "earth"), planet("earth", 1.0, 0.001)],
        [],
        SceneScale::default(),
    )
    .unwrap();
    let order: Vec<_> = registry.bodies().map(|b| &*b.params.id).collect();
    assert_eq!(order, ["earth", "moon"]);

    for _ in 0..500 {
        let changed = registry.advance(SimTime::J2000);
        assert_eq!(changed.len(), 2);
        let earth = registry.position("earth").unwrap();
        let d = registry.position("moon").unwrap() - earth;
        assert!((libm::sqrt(d.x * d.x + d.z * d.z) - 2.0).abs() < 1e-9);
    }
}

#[test]
fn rejects_duplicates_and_orphans() {
    assert!(Registry::with_contents([moon("moon", "earth")], [], SceneScale::default()).is_err());
    let twice = [planet("earth", 1.0, 0.001), planet("earth", 2.0, 0.001)];
    assert!(Registry::with_contents(twice, [], SceneScale::default()).is_err());
    let clash = [planet("lander", 1.0, 0.001)];
    assert!(Registry::with_contents(clash, [lander("mars")], SceneScale::default()).is_err());
}

#[test]
fn missing_reference_holds_position_until_it_appears() {
    let mut registry = Registry::with_contents([], [lander("mars")], SceneScale::default()).unwrap();
    let changed = registry.advance(SimTime::J2000);
    assert!(changed.is_empty());
    assert_eq!(registry.position("lander"), None);
    assert!(registry.mission("lander").unwrap().history.is_empty());

    registry.add_body(planet("mars", 1.52, 0.0)).unwrap();
    registry.advance(SimTime::J2000);
    let at = registry.position("lander").unwrap();
    assert!((at - Vector3::new(152.0, 0.5, 0.0)).norm() < 1e-9);
    assert_eq!(registry.mission("lander").unwrap().history.len(), 1);
}

#[test]
fn mission_history_is_bounded_through_ticks() {
    let mut registry =
        Registry::with_contents([planet("mars", 1.52, 0.01)], [lander("mars")], SceneScale::default())
            .unwrap();
    let mut solved = Vec::new();
    for _ in 0..150 {
        registry.advance(SimTime::J2000);
        solved.push(registry.position("lander").unwrap());
    }
    let history = &registry.mission("lander").unwrap().history;
    assert_eq!(history.len(), 100);
    assert_eq!(history.oldest(), Some(&solved[50]));
    assert_eq!(history.latest(), solved.last());
}

#[test]
fn nearest_picks_the_closest_object() {
    let registry = Registry::with_contents(
        [planet("venus", 0.72, 0.0), planet("earth", 1.0, 0.0)],
        [],
        SceneScale::default(),
    )
    .unwrap();
    let (id, d) = registry.nearest(&Vector3::new(95.0, 0.0, 0.0)).unwrap();
    assert_eq!(&*id, "earth");
    assert!((d - 5.0).abs() < 1e-12);
}

#[test]
fn dated_planets_follow_the_clock_and_carry_their_moons() {
    let earth = BodyParams {
        ephemeris: ephemeris::planet("earth"),
        ..planet("earth", 1.0, 0.001)
    };
    let mut registry =
        Registry::with_contents([earth, moon("moon", "earth")], [], SceneScale::default()).unwrap();
    registry.set_planet_motion(PlanetMotion::Ephemeris);

    let day = SimTime::from_calendar(2024, 3, 20).unwrap();
    registry.advance(day);
    let at = registry.position("earth").unwrap();
    let expected = ephemeris::scene_position(&ephemeris::planet("earth").unwrap(), day, SceneScale::default());
    assert_eq!(at, expected);
    // the same date gives the same place however many ticks pass
    for _ in 0..10 {
        registry.advance(day);
    }
    assert_eq!(registry.position("earth"), Some(at));
    let d = registry.position("moon").unwrap() - at;
    assert!((libm::sqrt(d.x * d.x + d.z * d.z) - 2.0).abs() < 1e-9);

    registry.set_planet_motion(PlanetMotion::Accumulated);
    registry.advance(day);
    let p = registry.position("earth").unwrap();
    assert!((libm::sqrt(p.x * p.x + p.z * p.z) - 100.0).abs() < 1e-9);
}