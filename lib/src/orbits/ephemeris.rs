//! Planet positions for a date from mean Keplerian elements.
//!
//! The elements are the J2000 mean elements with linear rates per Julian
//! century, good to a fraction of a degree for the major planets over a few
//! centuries around 2000. Output is heliocentric ecliptic (`AU`).

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{bodies::SceneScale, time::SimTime};

pub const DAYS_PER_CENTURY: f64 = 36_525.0;

/// One set of mean elements. Angles in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elements {
    /// Semi-major axis (`AU`).
    pub a: f64,
    pub e: f64,
    pub i: f64,
    /// Mean longitude.
    pub l: f64,
    /// Longitude of perihelion.
    pub w: f64,
    /// Longitude of the ascending node.
    pub node: f64,
}

/// Elements at J2000 and their change per Julian century.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub epoch: Elements,
    pub rate: Elements,
}

impl OrbitalElements {
    /// Elements `centuries` after J2000.
    pub fn at(&self, centuries: f64) -> Elements {
        let (e0, d) = (&self.epoch, &self.rate);
        Elements {
            a: e0.a + d.a * centuries,
            e: e0.e + d.e * centuries,
            i: e0.i + d.i * centuries,
            l: e0.l + d.l * centuries,
            w: e0.w + d.w * centuries,
            node: e0.node + d.node * centuries,
        }
    }

    pub fn is_valid(&self) -> bool {
        let finite = |e: &Elements| {
            [e.a, e.e, e.i, e.l, e.w, e.node]
                .iter()
                .all(|v| v.is_finite())
        };
        finite(&self.epoch)
            && finite(&self.rate)
            && self.epoch.a > 0.0
            && (0.0..1.0).contains(&self.epoch.e)
    }
}

/// Solve Kepler's equation `M = E - e sin E` for `E` by Newton iteration.
pub fn eccentric_anomaly(mean_anomaly: f64, e: f64) -> f64 {
    let m = mean_anomaly;
    let mut ea = if e > 0.8 { consts::PI.copysign(m) } else { m };
    for _ in 0..30 {
        let delta = (m - ea + e * libm::sin(ea)) / (1.0 - e * libm::cos(ea));
        ea += delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }
    ea
}

/// Heliocentric ecliptic position at `now` (`AU`).
pub fn heliocentric(elements: &OrbitalElements, now: SimTime) -> Vector3<f64> {
    let el = elements.at(now.as_days() / DAYS_PER_CENTURY);
    // drift over long spans must not push the orbit open
    let e = el.e.clamp(0.0, 0.99);
    let i = el.i.to_radians();
    let node = el.node.to_radians();
    let arg = (el.w - el.node).to_radians();
    let m = (el.l - el.w).to_radians().rem_euclid(2.0 * consts::PI);
    let m = if m > consts::PI { m - 2.0 * consts::PI } else { m };

    let ea = eccentric_anomaly(m, e);
    let xp = el.a * (libm::cos(ea) - e);
    let yp = el.a * libm::sqrt(1.0 - e * e) * libm::sin(ea);

    let (sn, cn) = (libm::sin(node), libm::cos(node));
    let (sw, cw) = (libm::sin(arg), libm::cos(arg));
    let (si, ci) = (libm::sin(i), libm::cos(i));
    Vector3::new(
        (cw * cn - sw * sn * ci) * xp + (-sw * cn - cw * sn * ci) * yp,
        (cw * sn + sw * cn * ci) * xp + (-sw * sn + cw * cn * ci) * yp,
        sw * si * xp + cw * si * yp,
    )
}

/// Scene position at `now`. The ecliptic plane maps to the scene's XZ plane
/// with ecliptic north as +Y.
pub fn scene_position(elements: &OrbitalElements, now: SimTime, scale: SceneScale) -> Vector3<f64> {
    let p = heliocentric(elements, now);
    Vector3::new(scale.au(p.x), scale.au(p.z), scale.au(p.y))
}

const fn elements(a: f64, e: f64, i: f64, l: f64, w: f64, node: f64) -> Elements {
    Elements { a, e, i, l, w, node }
}

/// Mean elements of the major planets, keyed by body id.
pub const PLANETS: &[(&str, OrbitalElements)] = &[
    (
        "mercury",
        OrbitalElements {
            epoch: elements(0.387_099_27, 0.205_635_93, 7.004_979_02, 252.250_323_5, 77.457_796_28, 48.330_765_93),
            rate: elements(0.000_000_37, 0.000_019_06, -0.005_947_49, 149_472.674_111_75, 0.160_476_89, -0.125_340_81),
        },
    ),
    (
        "venus",
        OrbitalElements {
            epoch: elements(0.723_335_66, 0.006_776_72, 3.394_676_05, 181.979_099_5, 131.602_467_18, 76.679_842_55),
            rate: elements(0.000_003_9, -0.000_041_07, -0.000_788_9, 58_517.815_387_29, 0.002_683_29, -0.277_694_18),
        },
    ),
    (
        "earth",
        OrbitalElements {
            epoch: elements(1.000_002_61, 0.016_711_23, -0.000_015_31, 100.464_571_66, 102.937_681_93, 0.0),
            rate: elements(0.000_005_62, -0.000_043_92, -0.012_946_68, 35_999.372_449_81, 0.323_273_64, 0.0),
        },
    ),
    (
        "mars",
        OrbitalElements {
            epoch: elements(1.523_710_34, 0.093_394_1, 1.849_691_42, -4.553_432_05, -23.943_629_59, 49.559_538_91),
            rate: elements(0.000_018_47, 0.000_078_82, -0.008_131_31, 19_140.302_684_99, 0.444_410_88, -0.292_573_43),
        },
    ),
    (
        "jupiter",
        OrbitalElements {
            epoch: elements(5.202_887, 0.048_386_24, 1.304_396_95, 34.396_440_51, 14.728_479_83, 100.473_909_09),
            rate: elements(-0.000_116_07, -0.000_132_53, -0.001_837_14, 3_034.746_127_75, 0.212_526_68, 0.204_691_06),
        },
    ),
    (
        "saturn",
        OrbitalElements {
            epoch: elements(9.536_675_94, 0.053_861_79, 2.485_991_87, 49.954_244_23, 92.598_878_31, 113.662_424_48),
            rate: elements(-0.001_250_6, -0.000_509_91, 0.001_936_09, 1_222.493_622_01, -0.418_972_16, -0.288_677_94),
        },
    ),
    (
        "uranus",
        OrbitalElements {
            epoch: elements(19.189_164_64, 0.047_257_44, 0.772_637_83, 313.238_104_51, 170.954_276_3, 74.016_925_03),
            rate: elements(-0.001_961_76, -0.000_043_97, -0.002_429_39, 428.482_027_85, 0.408_052_81, 0.042_405_89),
        },
    ),
    (
        "neptune",
        OrbitalElements {
            epoch: elements(30.069_922_76, 0.008_590_48, 1.770_043_47, -55.120_029_69, 44.964_762_27, 131.784_225_74),
            rate: elements(0.000_262_91, 0.000_051_05, 0.000_353_72, 218.459_453_25, -0.322_414_64, -0.005_086_64),
        },
    ),
];

/// Mean elements for a major planet.
pub fn planet(id: &str) -> Option<OrbitalElements> {
    PLANETS.iter().find(|(name, _)| *name == id).map(|&(_, el)| el)
}

#[test]
fn kepler_solution_satisfies_the_equation() {
    for e in [0.0, 0.0167, 0.2056, 0.9] {
        for m in [-3.0, -1.0, 0.0, 0.5, 2.9] {
            let ea = eccentric_anomaly(m, e);
            assert!((ea - e * libm::sin(ea) - m).abs() < 1e-10, "e={e} m={m}");
        }
    }
}

#[test]
fn earth_at_j2000_matches_the_almanac() {
    let earth = planet("earth").unwrap();
    let p = heliocentric(&earth, SimTime::J2000);
    assert!((p.x + 0.1772).abs() < 0.005, "{p:?}");
    assert!((p.y - 0.9672).abs() < 0.005, "{p:?}");
    assert!(p.z.abs() < 1e-4);
    assert!((p.norm() - 0.9833).abs() < 0.001);
}

#[test]
fn earth_is_opposite_the_sun_point_at_the_march_equinox() {
    let earth = planet("earth").unwrap();
    let equinox = SimTime::from_calendar(2024, 3, 20).unwrap();
    let p = heliocentric(&earth, equinox);
    let longitude = libm::atan2(p.y, p.x);
    assert!((longitude.abs() - consts::PI).abs() < 0.02, "{longitude}");

    let scene = scene_position(&earth, equinox, SceneScale::default());
    assert!((scene - Vector3::new(p.x, p.z, p.y) * 100.0).norm() < 1e-9);
}

#[test]
fn planets_keep_their_distances_over_a_century() {
    for &(id, el) in PLANETS {
        assert!(el.is_valid(), "{id}");
        for year in [-50.0, 0.0, 37.5, 100.0] {
            let r = heliocentric(&el, SimTime::new_days(year * 365.25)).norm();
            let (a, e) = (el.epoch.a, el.epoch.e);
            assert!(r > a * (1.0 - e) * 0.99 && r < a * (1.0 + e) * 1.01, "{id} {year}: {r}");
        }
    }
}
