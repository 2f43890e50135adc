//! Circular orbits advanced by a fixed angle every tick.

use std::f64::consts;

use nalgebra::Vector3;

/// Ratio between a satellite's vertical bobbing and its orbital angle.
pub const BOB_FACTOR: f64 = 0.1;

/// Angle after which the bobbing term repeats. A whole multiple of `2π`, so
/// wrapping a satellite's phase to this range leaves its planar position
/// untouched.
pub const BOB_PERIOD: f64 = 2.0 * consts::PI / BOB_FACTOR;

/// Wrap `angle` into `[0, period)`.
pub fn wrap(angle: f64, period: f64) -> f64 {
    let wrapped = angle.rem_euclid(period);
    // rem_euclid rounds tiny negative inputs up to `period`
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}

/// One tick of angular accumulation, wrapped into `[0, 2π)`.
pub fn advance_angle(angle: f64, angular_velocity: f64) -> f64 {
    wrap(angle + angular_velocity, 2.0 * consts::PI)
}

/// Position on a circle of `radius` in the XZ plane.
pub fn planar_position(radius: f64, angle: f64) -> Vector3<f64> {
    Vector3::new(libm::cos(angle) * radius, 0.0, libm::sin(angle) * radius)
}

/// Offset of a satellite from its parent.
///
/// The vertical component is a slow bob standing in for a tilted orbital
/// plane: its amplitude is `distance * sin(inclination)` and it completes one
/// cycle every [`BOB_PERIOD`] radians of `phase`. Pass the satellite's
/// unwrapped (or [`BOB_PERIOD`]-wrapped) phase so the bob stays continuous.
pub fn satellite_offset(distance: f64, phase: f64, inclination: f64) -> Vector3<f64> {
    let tilt = distance * libm::sin(inclination);
    Vector3::new(
        libm::cos(phase) * distance,
        libm::sin(phase * BOB_FACTOR) * tilt,
        libm::sin(phase) * distance,
    )
}

pub fn satellite_position(
    parent: &Vector3<f64>,
    distance: f64,
    phase: f64,
    inclination: f64,
) -> Vector3<f64> {
    parent + satellite_offset(distance, phase, inclination)
}

#[cfg(test)]
fn angular_gap(a: f64, b: f64) -> f64 {
    let d = wrap(a - b, 2.0 * consts::PI);
    d.min(2.0 * consts::PI - d)
}

#[test]
fn angle_accumulation_matches_closed_form() {
    for &(initial, w) in &[(0.0, 0.001), (1.3, 0.004), (6.0, -0.0123), (0.5, 0.206)] {
        let mut angle = initial;
        let n = 5000;
        for _ in 0..n {
            angle = advance_angle(angle, w);
            assert!((0.0..2.0 * consts::PI).contains(&angle));
        }
        let expected = wrap(initial + n as f64 * w, 2.0 * consts::PI);
        assert!(angular_gap(angle, expected) < 1e-9, "{angle} vs {expected}");
    }
}

#[test]
fn static_body_keeps_its_angle() {
    assert_eq!(advance_angle(2.5, 0.0), 2.5);
    assert_eq!(wrap(-1e-18, 2.0 * consts::PI), 0.0);
}

#[test]
fn planar_orbit_radius_is_invariant() {
    let radius = 30.07;
    let mut angle = 0.0;
    for _ in 0..2000 {
        angle = advance_angle(angle, 0.0173);
        let p = planar_position(radius, angle);
        let r = libm::sqrt(p.x * p.x + p.z * p.z);
        assert!((r - radius).abs() / radius < 1e-6);
        assert_eq!(p.y, 0.0);
    }
}

#[test]
fn satellite_bob_is_bounded_and_centred_on_parent() {
    let parent = Vector3::new(100.0, 2.0, -40.0);
    let inclination = 0.1;
    let bound = 2.0 * libm::sin(inclination);
    let mut phase = 0.0;
    for _ in 0..20_000 {
        phase = wrap(phase + 0.01, BOB_PERIOD);
        let p = satellite_position(&parent, 2.0, phase, inclination);
        let d = p - parent;
        assert!((libm::sqrt(d.x * d.x + d.z * d.z) - 2.0).abs() < 1e-9);
        assert!(d.y.abs() <= bound + 1e-12);
    }
}

#[test]
fn bob_is_continuous_across_the_wrap() {
    let before = satellite_offset(1.0, BOB_PERIOD - 1e-9, 0.3);
    let after = satellite_offset(1.0, wrap(BOB_PERIOD + 1e-9, BOB_PERIOD), 0.3);
    assert!((before - after).norm() < 1e-6);
}
