//! Static configuration: which bodies and missions exist and how they move.

use std::{collections::HashSet, f64::consts, sync::Arc};

use color_eyre::eyre::{self, bail, OptionExt, WrapErr};
use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bodies::{BodyClass, BodyParams, SatelliteOrbit, SceneScale, DEFAULT_AU_SCALE},
    mission::{Jitter, SpacecraftMission, TrajectoryModel},
    orbits::{ephemeris, trajectory::AU_KM},
    registry::Registry,
    time::SimTime,
};

/// Render size of the central star.
pub const SUN_SIZE: f64 = 20.0;
/// Reference size the small-body ratios are taken against.
const SMALL_BODY_SUN_SIZE: f64 = 3.0;
/// Per-tick angle of a body completing one orbit per year.
const YEAR_RATE: f64 = 0.001;
/// Scene units per km of moon orbit distance, and of moon radius.
const MOON_KM_SCALE: f64 = 0.0001;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    #[serde(default)]
    pub bodies: Vec<BodyParams>,
    #[serde(default)]
    pub missions: Vec<SpacecraftMission>,
}

impl Catalogue {
    /// Parse a catalogue from RON text and validate it.
    pub fn from_ron(text: &str) -> eyre::Result<Self> {
        let catalogue: Self = ron::from_str(text).wrap_err("failed to parse catalogue")?;
        catalogue.validate()?;
        Ok(catalogue)
    }

    pub fn to_ron(&self) -> eyre::Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .wrap_err("failed to serialize catalogue")
    }

    /// The full built-in system.
    pub fn builtin() -> eyre::Result<Self> {
        let mut bodies = vec![BodyParams {
            id: "sun".into(),
            name: "Sun".into(),
            class: BodyClass::Star,
            orbital_radius: None,
            angular_velocity: 0.0,
            initial_angle: 0.0,
            render_scale: SUN_SIZE,
            satellite: None,
            anchor: Vector3::zeros(),
            ephemeris: None,
        }];

        for &(id, name, class, radius, w, ratio) in PLANETS {
            bodies.push(BodyParams {
                ephemeris: ephemeris::planet(id),
                ..orbiting(id, name, class, radius, w, SUN_SIZE * ratio)
            });
        }
        bodies.push(BodyParams {
            satellite: Some(SatelliteOrbit {
                parent: "earth".into(),
                // bobs 0.2 units on a 2 unit orbit
                inclination: libm::asin(0.1),
            }),
            ..orbiting("moon", "Moon", BodyClass::Moon, 0.02, 0.01, SUN_SIZE * 0.0025)
        });
        for &(parent, moons) in MOON_SYSTEMS {
            let parent_size = bodies
                .iter()
                .find(|b| &*b.id == parent)
                .map(|b| b.render_scale)
                .ok_or_eyre("moon system without a planet")?;
            bodies.extend(moons.iter().map(|m| m.params(parent, parent_size)));
        }
        for &(id, name, class, radius, w, ratio) in SMALL_BODIES {
            bodies.push(orbiting(id, name, class, radius, w, SMALL_BODY_SUN_SIZE * ratio));
        }

        let missions = missions()?;
        let catalogue = Self { bodies, missions };
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// Scatter every moon to a random starting angle.
    pub fn scatter_moons(&mut self, rng: &mut impl Rng) {
        for body in &mut self.bodies {
            if body.class == BodyClass::Moon {
                body.initial_angle = rng.gen_range(0.0..2.0 * consts::PI);
            }
        }
    }

    pub fn into_registry(self, scale: SceneScale) -> eyre::Result<Registry> {
        debug!(
            bodies = self.bodies.len(),
            missions = self.missions.len(),
            "building registry"
        );
        Registry::with_contents(self.bodies, self.missions, scale)
    }

    /// Reject anything the solvers could not make sense of.
    pub fn validate(&self) -> eyre::Result<()> {
        let mut ids = HashSet::new();
        for id in self
            .bodies
            .iter()
            .map(|b| &b.id)
            .chain(self.missions.iter().map(|m| &m.id))
        {
            if !ids.insert(id.clone()) {
                bail!("duplicate id {id}");
            }
        }
        let body_ids: HashSet<&str> = self.bodies.iter().map(|b| &*b.id).collect();

        for body in &self.bodies {
            let id = &body.id;
            finite(id, "angular velocity", body.angular_velocity)?;
            finite(id, "initial angle", body.initial_angle)?;
            non_negative(id, "render scale", body.render_scale)?;
            if let Some(radius) = body.orbital_radius {
                non_negative(id, "orbital radius", radius)?;
            }
            if !body.anchor.iter().all(|c| c.is_finite()) {
                bail!("{id}: anchor must be finite");
            }
            if body.ephemeris.is_some_and(|el| !el.is_valid()) {
                bail!("{id}: orbital elements must be finite with 0 <= e < 1 and a > 0");
            }
            if let Some(orbit) = &body.satellite {
                finite(id, "inclination", orbit.inclination)?;
                if !body_ids.contains(&*orbit.parent) {
                    bail!("{id} orbits unknown body {}", orbit.parent);
                }
            }
        }
        self.check_parent_cycles()?;

        for mission in &self.missions {
            validate_mission(mission, &body_ids)?;
        }
        Ok(())
    }

    fn check_parent_cycles(&self) -> eyre::Result<()> {
        for body in &self.bodies {
            let mut seen = HashSet::new();
            let mut at = body;
            while let Some(parent) = at.parent() {
                if !seen.insert(parent.clone()) {
                    bail!("{} is part of a satellite cycle", body.id);
                }
                match self.bodies.iter().find(|b| b.id == *parent) {
                    Some(next) => at = next,
                    None => break,
                }
            }
        }
        Ok(())
    }
}

fn validate_mission(mission: &SpacecraftMission, bodies: &HashSet<&str>) -> eyre::Result<()> {
    let id = &mission.id;
    non_negative(id, "render scale", mission.render_scale)?;
    if let Some(reference) = mission.model.reference_body() {
        if !bodies.contains(&**reference) {
            bail!("{id} references unknown body {reference}");
        }
    }
    match &mission.model {
        TrajectoryModel::Escape {
            base_distance,
            speed,
            bearing,
            elevation,
        } => {
            non_negative(id, "base distance", *base_distance)?;
            finite(id, "speed", *speed)?;
            finite(id, "bearing", *bearing)?;
            finite(id, "elevation", *elevation)?;
        }
        TrajectoryModel::Eccentric {
            perihelion,
            aphelion,
            period_days,
        } => {
            non_negative(id, "perihelion", *perihelion)?;
            non_negative(id, "aphelion", *aphelion)?;
            positive(id, "period", *period_days)?;
        }
        TrajectoryModel::TargetRelative { offset, jitter, .. } => {
            if !offset.iter().all(|c| c.is_finite()) {
                bail!("{id}: offset must be finite");
            }
            if let Some(jitter) = jitter {
                non_negative(id, "jitter amplitude", jitter.amplitude)?;
                positive(id, "jitter period", jitter.period_days)?;
            }
        }
        TrajectoryModel::StationOrbit {
            parent_radius_km,
            altitude_km,
            inclination,
            period_minutes,
            ..
        } => {
            positive(id, "parent radius", *parent_radius_km)?;
            non_negative(id, "altitude", *altitude_km)?;
            finite(id, "inclination", *inclination)?;
            positive(id, "period", *period_minutes)?;
        }
        TrajectoryModel::LagrangePoint { offset, .. } => finite(id, "offset", *offset)?,
    }
    Ok(())
}

fn finite(id: &str, what: &str, value: f64) -> eyre::Result<()> {
    if !value.is_finite() {
        bail!("{id}: {what} must be finite, got {value}");
    }
    Ok(())
}

fn non_negative(id: &str, what: &str, value: f64) -> eyre::Result<()> {
    finite(id, what, value)?;
    if value < 0.0 {
        bail!("{id}: {what} must not be negative, got {value}");
    }
    Ok(())
}

fn positive(id: &str, what: &str, value: f64) -> eyre::Result<()> {
    finite(id, what, value)?;
    if value <= 0.0 {
        bail!("{id}: {what} must be positive, got {value}");
    }
    Ok(())
}

fn orbiting(id: &str, name: &str, class: BodyClass, radius: f64, w: f64, size: f64) -> BodyParams {
    BodyParams {
        id: id.into(),
        name: name.into(),
        class,
        orbital_radius: Some(radius),
        angular_velocity: w,
        initial_angle: 0.0,
        render_scale: size,
        satellite: None,
        anchor: Vector3::zeros(),
        ephemeris: None,
    }
}

type Orbiter = (&'static str, &'static str, BodyClass, f64, f64, f64);

/// id, name, class, radius (AU), angle per tick, size relative to the sun.
const PLANETS: &[Orbiter] = &[
    ("mercury", "Mercury", BodyClass::Planet, 0.39, 0.004, 0.0035),
    ("venus", "Venus", BodyClass::Planet, 0.72, 0.0015, 0.0087),
    ("earth", "Earth", BodyClass::Planet, 1.0, 0.001, 0.0092),
    ("mars", "Mars", BodyClass::Planet, 1.52, 0.00053, 0.0049),
    ("jupiter", "Jupiter", BodyClass::GasGiant, 5.2, 0.000_08, 0.1),
    ("saturn", "Saturn", BodyClass::GasGiant, 9.54, 0.000_03, 0.084),
    ("uranus", "Uranus", BodyClass::GasGiant, 19.19, 0.000_01, 0.036),
    ("neptune", "Neptune", BodyClass::GasGiant, 30.07, 0.000_006, 0.035),
];

const SMALL_BODIES: &[Orbiter] = &[
    ("ceres", "Ceres", BodyClass::DwarfPlanet, 2.77, 0.000_01, 0.008),
    ("pluto", "Pluto", BodyClass::DwarfPlanet, 39.5, 0.000_004, 0.018),
    ("eris", "Eris", BodyClass::DwarfPlanet, 67.7, 0.000_002, 0.019),
    ("haumea", "Haumea", BodyClass::DwarfPlanet, 43.3, 0.000_003_5, 0.012),
    ("makemake", "Makemake", BodyClass::DwarfPlanet, 45.8, 0.000_003_3, 0.011),
    ("halley", "Halley's Comet", BodyClass::Comet, 35.0, 0.000_005, 0.001),
    ("encke", "Encke's Comet", BodyClass::Comet, 2.2, 0.000_03, 0.0005),
    ("hale-bopp", "Hale-Bopp", BodyClass::Comet, 150.0, 0.000_000_8, 0.003),
    ("vesta", "Vesta", BodyClass::Asteroid, 2.36, 0.000_015, 0.006),
    ("pallas", "Pallas", BodyClass::Asteroid, 2.77, 0.000_012, 0.006),
];

struct MoonData {
    id: &'static str,
    name: &'static str,
    radius_km: f64,
    distance_km: f64,
    /// Negative for retrograde orbits.
    period_days: f64,
}

impl MoonData {
    fn params(&self, parent: &str, parent_size: f64) -> BodyParams {
        let scene_radius = self.distance_km * MOON_KM_SCALE + parent_size * 1.5;
        let size = (self.radius_km * MOON_KM_SCALE).max(parent_size * 0.05);
        BodyParams {
            satellite: Some(SatelliteOrbit {
                parent: Arc::from(parent),
                inclination: 0.0,
            }),
            ..orbiting(
                self.id,
                self.name,
                BodyClass::Moon,
                scene_radius / DEFAULT_AU_SCALE,
                YEAR_RATE * 365.25 / self.period_days,
                size,
            )
        }
    }
}

const fn moon(id: &'static str, name: &'static str, radius_km: f64, distance_km: f64, period_days: f64) -> MoonData {
    MoonData {
        id,
        name,
        radius_km,
        distance_km,
        period_days,
    }
}

const MOON_SYSTEMS: &[(&str, &[MoonData])] = &[
    (
        "jupiter",
        &[
            moon("io", "Io", 1821.6, 421_800.0, 1.769),
            moon("europa", "Europa", 1560.8, 671_100.0, 3.551),
            moon("ganymede", "Ganymede", 2634.1, 1_070_400.0, 7.155),
            moon("callisto", "Callisto", 2410.3, 1_882_700.0, 16.689),
        ],
    ),
    (
        "saturn",
        &[
            moon("mimas", "Mimas", 198.2, 185_539.0, 0.942),
            moon("enceladus", "Enceladus", 252.1, 238_037.0, 1.370),
            moon("tethys", "Tethys", 531.0, 294_672.0, 1.888),
            moon("dione", "Dione", 561.4, 377_415.0, 2.737),
            moon("rhea", "Rhea", 763.8, 527_068.0, 4.518),
            moon("titan", "Titan", 2574.7, 1_221_865.0, 15.945),
            moon("iapetus", "Iapetus", 734.5, 3_560_854.0, 79.322),
        ],
    ),
    (
        "uranus",
        &[
            moon("miranda", "Miranda", 235.8, 129_900.0, 1.413),
            moon("ariel", "Ariel", 578.9, 190_900.0, 2.520),
            moon("umbriel", "Umbriel", 584.7, 266_000.0, 4.144),
            moon("titania", "Titania", 788.9, 436_300.0, 8.706),
            moon("oberon", "Oberon", 761.4, 583_500.0, 13.463),
        ],
    ),
    (
        "neptune",
        &[
            moon("triton", "Triton", 1353.4, 354_759.0, -5.877),
            moon("nereid", "Nereid", 170.0, 5_513_818.0, 360.13),
        ],
    ),
];

/// Elevation of an escape path whose rise is a tenth of its sideways run.
fn shallow_elevation(bearing: f64) -> f64 {
    libm::atan(0.1 * libm::sin(bearing))
}

fn escape(base_km: f64, speed: f64, bearing_deg: f64) -> TrajectoryModel {
    let bearing = bearing_deg.to_radians();
    TrajectoryModel::Escape {
        base_distance: base_km / AU_KM,
        speed,
        bearing,
        elevation: shallow_elevation(bearing),
    }
}

fn missions() -> eyre::Result<Vec<SpacecraftMission>> {
    let launch = SimTime::from_calendar;
    Ok(vec![
        SpacecraftMission::new(
            "voyager1",
            "Voyager 1",
            launch(1977, 9, 5)?,
            escape(23.5e9, 17.0, 35.0),
            SUN_SIZE * 0.0005,
        ),
        SpacecraftMission::new(
            "voyager2",
            "Voyager 2",
            launch(1977, 8, 20)?,
            escape(19.5e9, 15.4, -48.0),
            SUN_SIZE * 0.0005,
        ),
        SpacecraftMission::new(
            "newHorizons",
            "New Horizons",
            launch(2006, 1, 19)?,
            escape(7.5e9, 14.0, -80.0),
            SUN_SIZE * 0.0004,
        ),
        SpacecraftMission::new(
            "parker",
            "Parker Solar Probe",
            launch(2018, 8, 12)?,
            TrajectoryModel::Eccentric {
                perihelion: 0.046,
                aphelion: 0.98,
                period_days: 88.0,
            },
            SUN_SIZE * 0.000_25,
        ),
        SpacecraftMission::new(
            "juno",
            "Juno",
            launch(2011, 8, 5)?,
            TrajectoryModel::TargetRelative {
                target: "jupiter".into(),
                offset: Vector3::new(2.5, 0.0, 2.5),
                jitter: Some(Jitter {
                    amplitude: 2.5,
                    period_days: 53.0,
                }),
            },
            SUN_SIZE * 0.000_35,
        ),
        SpacecraftMission::new(
            "perseverance",
            "Perseverance",
            launch(2020, 7, 30)?,
            TrajectoryModel::TargetRelative {
                target: "mars".into(),
                offset: Vector3::new(0.0, SUN_SIZE * 0.0049, 0.0),
                jitter: None,
            },
            SUN_SIZE * 0.000_15,
        ),
        SpacecraftMission::new(
            "jwst",
            "James Webb Space Telescope",
            launch(2021, 12, 25)?,
            TrajectoryModel::LagrangePoint {
                target: "earth".into(),
                offset: 0.01,
            },
            SUN_SIZE * 0.0001,
        ),
        SpacecraftMission::new(
            "iss",
            "International Space Station",
            launch(1998, 11, 20)?,
            TrajectoryModel::StationOrbit {
                parent: "earth".into(),
                parent_radius_km: 6371.0,
                altitude_km: 408.0,
                inclination: 51.6f64.to_radians(),
                period_minutes: 92.68,
            },
            SUN_SIZE * 0.000_001,
        ),
    ])
}

#[test]
fn builtin_catalogue_is_valid() {
    let catalogue = Catalogue::builtin().unwrap();
    assert_eq!(catalogue.missions.len(), 8);
    assert_eq!(
        catalogue.bodies.iter().filter(|b| b.class == BodyClass::Moon).count(),
        19
    );
    let triton = catalogue.bodies.iter().find(|b| &*b.id == "triton").unwrap();
    assert!(triton.angular_velocity < 0.0);
    let dated = catalogue.bodies.iter().filter(|b| b.ephemeris.is_some());
    assert_eq!(dated.count(), 8);

    let registry = catalogue.into_registry(SceneScale::default()).unwrap();
    let earth = registry.position("earth").unwrap();
    assert!((earth - Vector3::new(100.0, 0.0, 0.0)).norm() < 1e-12);
}

#[test]
fn catalogue_survives_ron() {
    let mut catalogue = Catalogue::builtin().unwrap();
    catalogue.scatter_moons(&mut rand::rngs::mock::StepRng::new(1 << 40, 1 << 52));
    let text = catalogue.to_ron().unwrap();
    assert_eq!(Catalogue::from_ron(&text).unwrap(), catalogue);
}

#[test]
fn invalid_catalogues_are_rejected() {
    let orphan = r#"(
        bodies: [(
            id: "moon", name: "Moon", class: Moon,
            orbital_radius: Some(0.02), angular_velocity: 0.01, render_scale: 0.05,
            satellite: Some((parent: "earth", inclination: 0.1)),
        )],
    )"#;
    assert!(Catalogue::from_ron(orphan).is_err());

    let mut catalogue = Catalogue::builtin().unwrap();
    catalogue.missions[3].model = TrajectoryModel::Eccentric {
        perihelion: 0.1,
        aphelion: 0.2,
        period_days: 0.0,
    };
    assert!(catalogue.validate().is_err());

    let mut catalogue = Catalogue::builtin().unwrap();
    catalogue.bodies[1].orbital_radius = Some(-1.0);
    assert!(catalogue.validate().is_err());

    let mut catalogue = Catalogue::builtin().unwrap();
    catalogue.bodies[2].id = "earth".into();
    assert!(catalogue.validate().is_err());

    let mut catalogue = Catalogue::builtin().unwrap();
    let mars = catalogue.bodies.iter_mut().find(|b| &*b.id == "mars").unwrap();
    if let Some(elements) = &mut mars.ephemeris {
        elements.epoch.e = 1.2;
    }
    assert!(catalogue.validate().is_err());
}

#[test]
fn satellite_cycles_are_rejected() {
    let mut catalogue = Catalogue::builtin().unwrap();
    let earth = catalogue.bodies.iter_mut().find(|b| &*b.id == "earth").unwrap();
    earth.satellite = Some(SatelliteOrbit {
        parent: "moon".into(),
        inclination: 0.0,
    });
    assert!(catalogue.validate().is_err());
}
