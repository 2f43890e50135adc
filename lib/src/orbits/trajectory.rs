//! Spacecraft trajectory solvers, one per [`TrajectoryModel`] variant.

use std::f64::consts;

use nalgebra::Vector3;

use crate::{
    bodies::SceneScale,
    mission::{Jitter, SpacecraftMission, TrajectoryModel},
    time::{SimTime, SECONDS_PER_DAY},
};

/// Kilometres per astronomical unit.
pub const AU_KM: f64 = 149_597_870.7;

/// What a trajectory needs to know about the body it is tied to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reference {
    /// Live position (scene units).
    pub position: Vector3<f64>,
    /// Visual size of the body (scene units).
    pub render_scale: f64,
}

/// Solve a mission's position at `now`.
///
/// Returns `None` when the model depends on a body that `lookup` cannot
/// resolve yet; the caller keeps the previous position.
pub fn solve<F>(
    mission: &SpacecraftMission,
    now: SimTime,
    scale: SceneScale,
    lookup: F,
) -> Option<Vector3<f64>>
where
    F: Fn(&str) -> Option<Reference>,
{
    let elapsed = now - mission.launch;
    let seconds = elapsed.as_seconds_f64();
    let days = seconds / SECONDS_PER_DAY;

    match &mission.model {
        TrajectoryModel::Escape {
            base_distance,
            speed,
            bearing,
            elevation,
        } => {
            let distance = escape_distance(*base_distance, *speed, seconds);
            Some(escape_direction(*bearing, *elevation) * scale.au(distance))
        }
        TrajectoryModel::Eccentric {
            perihelion,
            aphelion,
            period_days,
        } => {
            let theta = mean_angle(days, *period_days);
            let r = conic_radius(*perihelion, *aphelion, theta);
            Some(Vector3::new(
                scale.au(r) * libm::cos(theta),
                0.0,
                scale.au(r) * libm::sin(theta),
            ))
        }
        TrajectoryModel::TargetRelative {
            target,
            offset,
            jitter,
        } => {
            let target = lookup(target)?;
            let wobble = jitter.map_or_else(Vector3::zeros, |j| jitter_offset(&j, days));
            Some(target.position + offset + wobble)
        }
        TrajectoryModel::StationOrbit {
            parent,
            parent_radius_km,
            altitude_km,
            inclination,
            period_minutes,
        } => {
            let parent = lookup(parent)?;
            let radius = station_radius(parent.render_scale, *parent_radius_km, *altitude_km);
            let angle = mean_angle(seconds / 60.0, *period_minutes);
            Some(parent.position + station_offset(radius, angle, *inclination))
        }
        TrajectoryModel::LagrangePoint { target, offset } => {
            let planet = lookup(target)?;
            Some(lagrange_position(&planet.position, scale.au(*offset)))
        }
    }
}

/// Distance from the centre (`AU`) after `seconds` of flight at `speed` km/s.
pub fn escape_distance(base_distance: f64, speed: f64, seconds: f64) -> f64 {
    (base_distance + speed * seconds / AU_KM).max(0.0)
}

/// Unit vector for a launch bearing and elevation.
pub fn escape_direction(bearing: f64, elevation: f64) -> Vector3<f64> {
    let flat = libm::cos(elevation);
    Vector3::new(
        flat * libm::cos(bearing),
        libm::sin(elevation),
        flat * libm::sin(bearing),
    )
}

/// Angle swept after `elapsed` time units on an orbit of `period` units.
/// A non-positive period leaves the body at its starting angle.
pub fn mean_angle(elapsed: f64, period: f64) -> f64 {
    if period > 0.0 {
        2.0 * consts::PI * (elapsed / period)
    } else {
        0.0
    }
}

/// Semi-major axis and eccentricity from the apsides. Equal apsides give a
/// circle; a degenerate zero-size orbit is also treated as circular.
pub fn conic_elements(perihelion: f64, aphelion: f64) -> (f64, f64) {
    let a = (perihelion + aphelion) / 2.0;
    let sum = aphelion + perihelion;
    let e = if sum.abs() > f64::EPSILON {
        (aphelion - perihelion) / sum
    } else {
        0.0
    };
    (a, e)
}

/// Polar form of the conic, `r(θ) = a(1 - e²) / (1 + e cos θ)`.
pub fn conic_radius(perihelion: f64, aphelion: f64, theta: f64) -> f64 {
    let (a, e) = conic_elements(perihelion, aphelion);
    a * (1.0 - e.powi(2)) / (1.0 + e * libm::cos(theta))
}

pub fn jitter_offset(jitter: &Jitter, elapsed_days: f64) -> Vector3<f64> {
    let phase = mean_angle(elapsed_days, jitter.period_days);
    Vector3::new(
        jitter.amplitude * libm::sin(phase),
        0.0,
        jitter.amplitude * libm::cos(phase),
    )
}

/// Station orbit radius in scene units, scaled off the parent's visual size
/// so the station clears the rendered surface by the right proportion.
pub fn station_radius(parent_render_scale: f64, parent_radius_km: f64, altitude_km: f64) -> f64 {
    if parent_radius_km > 0.0 {
        parent_render_scale * (parent_radius_km + altitude_km) / parent_radius_km
    } else {
        parent_render_scale
    }
}

pub fn station_offset(radius: f64, angle: f64, inclination: f64) -> Vector3<f64> {
    Vector3::new(
        radius * libm::cos(angle),
        radius * libm::sin(angle) * libm::sin(inclination),
        radius * libm::sin(angle) * libm::cos(inclination),
    )
}

/// A point `offset` scene units beyond `planet` on the ray from the centre.
/// A planet sitting exactly at the centre has no ray; +X is used instead.
pub fn lagrange_position(planet: &Vector3<f64>, offset: f64) -> Vector3<f64> {
    let direction = planet
        .try_normalize(f64::EPSILON)
        .unwrap_or_else(Vector3::x);
    planet + direction * offset
}

#[cfg(test)]
fn mission(model: TrajectoryModel) -> SpacecraftMission {
    SpacecraftMission::new("probe", "Probe", SimTime::J2000, model, 0.01)
}

#[cfg(test)]
fn no_bodies(_: &str) -> Option<Reference> {
    None
}

#[test]
fn eccentric_extremes_hit_the_apsides() {
    let (peri, aph) = (0.046, 0.98);
    assert!((conic_radius(peri, aph, 0.0) - peri).abs() < 1e-12);
    assert!((conic_radius(peri, aph, consts::PI) - aph).abs() < 1e-12);
    for i in 0..360 {
        let r = conic_radius(peri, aph, (i as f64).to_radians());
        assert!(r >= peri - 1e-12 && r <= aph + 1e-12);
    }
}

#[test]
fn equal_apsides_make_a_circle() {
    let (a, e) = conic_elements(0.5, 0.5);
    assert_eq!((a, e), (0.5, 0.0));
    assert!((conic_radius(0.5, 0.5, 1.234) - 0.5).abs() < 1e-12);
    assert_eq!(conic_elements(0.0, 0.0), (0.0, 0.0));
}

#[test]
fn eccentric_mission_starts_at_perihelion() {
    let probe = mission(TrajectoryModel::Eccentric {
        perihelion: 0.046,
        aphelion: 0.98,
        period_days: 88.0,
    });
    let scale = SceneScale::new(1.0);
    let at_launch = solve(&probe, SimTime::J2000, scale, no_bodies).unwrap();
    assert!((at_launch.norm() - 0.046).abs() < 1e-12);
    let half = solve(&probe, SimTime::new_days(44.0), scale, no_bodies).unwrap();
    assert!((half.norm() - 0.98).abs() < 1e-9);
}

#[test]
fn escape_distance_grows_monotonically() {
    let probe = mission(TrajectoryModel::Escape {
        base_distance: 157.0,
        speed: 17.0,
        bearing: 35f64.to_radians(),
        elevation: 3f64.to_radians(),
    });
    let scale = SceneScale::default();
    let mut last = 0.0;
    for day in 0..50 {
        let p = solve(&probe, SimTime::new_days(day as f64 * 365.0), scale, no_bodies).unwrap();
        assert!(p.norm() > last);
        last = p.norm();
    }
    let start = solve(&probe, SimTime::J2000, scale, no_bodies).unwrap();
    assert!((start.norm() - 15_700.0).abs() < 1e-6);
    assert!((escape_direction(1.0, -0.4).norm() - 1.0).abs() < 1e-12);
}

#[test]
fn target_relative_skips_without_target() {
    let orbiter = mission(TrajectoryModel::TargetRelative {
        target: "jupiter".into(),
        offset: Vector3::new(2.5, 0.0, 2.5),
        jitter: Some(Jitter {
            amplitude: 2.5,
            period_days: 53.0,
        }),
    });
    let scale = SceneScale::default();
    assert!(solve(&orbiter, SimTime::J2000, scale, no_bodies).is_none());

    let jupiter = Vector3::new(520.0, 0.0, 0.0);
    let lookup = |id: &str| {
        (id == "jupiter").then_some(Reference {
            position: jupiter,
            render_scale: 2.0,
        })
    };
    for day in 0..200 {
        let p = solve(&orbiter, SimTime::new_days(day as f64), scale, lookup).unwrap();
        let centre = jupiter + Vector3::new(2.5, 0.0, 2.5);
        assert!((p - centre).norm() <= 2.5 + 1e-9);
    }
}

#[test]
fn station_keeps_its_altitude() {
    let iss = mission(TrajectoryModel::StationOrbit {
        parent: "earth".into(),
        parent_radius_km: 6371.0,
        altitude_km: 408.0,
        inclination: 51.6f64.to_radians(),
        period_minutes: 92.68,
    });
    let earth = Vector3::new(100.0, 0.0, 0.0);
    let lookup = |_: &str| {
        Some(Reference {
            position: earth,
            render_scale: 0.184,
        })
    };
    let expected = 0.184 * 6779.0 / 6371.0;
    for minute in 0..200 {
        let now = SimTime::new_seconds(minute as f64 * 60.0);
        let p = solve(&iss, now, SceneScale::default(), lookup).unwrap();
        assert!(((p - earth).norm() - expected).abs() < 1e-12);
    }
    let full_orbit = SimTime::new_seconds(92.68 * 60.0);
    let p = solve(&iss, full_orbit, SceneScale::default(), lookup).unwrap();
    assert!((p - (earth + Vector3::new(expected, 0.0, 0.0))).norm() < 1e-9);
}

#[test]
fn lagrange_point_sits_beyond_the_planet() {
    let planet = Vector3::new(60.0, 0.0, 80.0);
    let l2 = lagrange_position(&planet, 1.0);
    assert!((l2.norm() - 101.0).abs() < 1e-12);
    assert!((l2.normalize() - planet.normalize()).norm() < 1e-12);
    assert_eq!(lagrange_position(&Vector3::zeros(), 2.0), Vector3::new(2.0, 0.0, 0.0));
}
