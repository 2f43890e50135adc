use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use orrery::{
    catalogue::Catalogue,
    frame::{Simulation, SimulationConfig},
    mission::{SpacecraftMission, TrajectoryModel},
    navigation::{NavStatus, TravelOutcome},
    quality::EffectLayer,
    registry::{PlanetMotion, Registry},
    scene::{LabelSink, SceneSink, CAMERA_ID},
    time::{Clock, SimTime},
};

#[derive(Default)]
struct Recorder {
    positions: HashMap<String, Vector3<f64>>,
    orientations: HashMap<String, Vector3<f64>>,
    visible: HashMap<String, bool>,
    /// Ids without a renderable yet.
    loading: HashSet<String>,
}

impl SceneSink for Recorder {
    fn set_object_position(&mut self, id: &str, position: Vector3<f64>) {
        self.positions.insert(id.to_owned(), position);
    }

    fn set_object_orientation(&mut self, id: &str, look_at: Vector3<f64>) {
        self.orientations.insert(id.to_owned(), look_at);
    }

    fn set_object_visible(&mut self, id: &str, visible: bool) {
        self.visible.insert(id.to_owned(), visible);
    }

    fn has_renderable(&self, id: &str) -> bool {
        !self.loading.contains(id)
    }
}

#[derive(Default)]
struct Labels(HashMap<String, (String, Vector3<f64>)>);

impl LabelSink for Labels {
    fn notify(&mut self, id: &str, display_name: &str, position: Vector3<f64>) {
        self.0.insert(id.to_owned(), (display_name.to_owned(), position));
    }
}

const DT: f64 = 1.0 / 60.0;

fn simulation() -> Simulation {
    let start = SimTime::from_calendar(2024, 3, 1).unwrap();
    Simulation::from_catalogue(
        Catalogue::builtin().unwrap(),
        Clock::new(start),
        SimulationConfig::default(),
    )
    .unwrap()
}

#[test]
fn positions_reach_the_scene_and_labels() {
    let mut sim = simulation();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());
    sim.publish(&mut scene, &mut labels);
    assert!(scene.positions.contains_key("sun"));
    // missions have not been solved yet
    assert!(!scene.positions.contains_key("iss"));

    let report = sim.frame(DT, &mut scene, &mut labels);
    assert!(report.moved.iter().any(|id| &**id == "iss"));
    assert!(!report.moved.iter().any(|id| &**id == "sun"));
    for id in ["earth", "moon", "triton", "voyager1", "jwst"] {
        assert_eq!(scene.positions.get(id).copied(), sim.registry().position(id), "{id}");
    }
    let (name, at) = &labels.0["iss"];
    assert_eq!(name, "International Space Station");
    assert_eq!(Some(*at), sim.registry().position("iss"));
}

#[test]
fn camera_tracks_a_moving_moon_in_the_same_frame() {
    let mut sim = simulation();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());
    sim.set_speed(50.0);
    assert_eq!(sim.request_travel("moon", &scene), TravelOutcome::Started);

    let mut looked_at = Vec::new();
    for _ in 0..120 {
        let report = sim.frame(DT, &mut scene, &mut labels);
        let moon = sim.registry().position("moon").unwrap();
        assert_eq!(report.camera.look_at, moon);
        assert_eq!(scene.orientations[CAMERA_ID], moon);
        assert_eq!(report.status, NavStatus::Arrived);
        looked_at.push(moon);
    }
    assert_ne!(looked_at.first(), looked_at.last());
}

#[test]
fn travel_waits_for_a_loading_target() {
    let mut sim = simulation();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());
    scene.loading.insert("iss".to_owned());
    sim.frame(DT, &mut scene, &mut labels);

    assert_eq!(sim.request_travel("iss", &scene), TravelOutcome::Deferred);
    for _ in 0..60 {
        let report = sim.frame(DT, &mut scene, &mut labels);
        assert_eq!(report.status, NavStatus::Idle);
    }
    assert_eq!(sim.request_travel("atlantis", &scene), TravelOutcome::UnknownTarget);
    assert!(sim.navigator().pending_target().is_some());

    scene.loading.clear();
    for _ in 0..sim.navigator().config().retry_interval_ticks {
        sim.frame(DT, &mut scene, &mut labels);
    }
    assert_eq!(sim.navigator().state().target.as_deref(), Some("iss"));
    assert_ne!(sim.navigator().status(), NavStatus::Idle);
}

#[test]
fn missions_hold_position_until_their_reference_loads() {
    let catalogue = Catalogue::builtin().unwrap();
    let jupiter = catalogue
        .bodies
        .iter()
        .find(|b| &*b.id == "jupiter")
        .cloned()
        .unwrap();
    let juno = SpacecraftMission::new(
        "juno",
        "Juno",
        SimTime::J2000,
        TrajectoryModel::TargetRelative {
            target: "jupiter".into(),
            offset: Vector3::new(2.5, 0.0, 2.5),
            jitter: None,
        },
        0.007,
    );
    let registry = Registry::with_contents([], [juno], Default::default()).unwrap();
    let mut sim = Simulation::new(registry, Clock::default(), SimulationConfig::default());
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());

    for _ in 0..10 {
        let report = sim.frame(DT, &mut scene, &mut labels);
        assert!(report.moved.is_empty());
    }
    assert!(sim.registry().mission("juno").unwrap().history.is_empty());

    sim.registry_mut().add_body(jupiter).unwrap();
    for _ in 0..150 {
        sim.frame(DT, &mut scene, &mut labels);
    }
    let juno = sim.registry().mission("juno").unwrap();
    assert_eq!(juno.history.len(), 100);
    let offset = juno.position.unwrap() - sim.registry().position("jupiter").unwrap();
    assert!((offset - Vector3::new(2.5, 0.0, 2.5)).norm() < 1e-9);
}

#[test]
fn effects_follow_the_frame_rate() {
    let mut sim = simulation();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());

    let report = sim.frame(1.0 / 15.0, &mut scene, &mut labels);
    assert!(report.quality.performance_mode);
    assert!(report.quality.effects.is_empty());
    assert_eq!(scene.visible.get("sun:flares"), Some(&false));
    assert_eq!(scene.visible.get("sun:corona:0"), Some(&false));

    let mut report = report;
    for _ in 0..60 {
        report = sim.frame(DT, &mut scene, &mut labels);
    }
    assert!((report.fps - 60.0).abs() < 1e-6);
    assert_eq!(report.quality.lod_level, 1.0);
    for effect in [EffectLayer::Corona(2), EffectLayer::Flares, EffectLayer::Prominences] {
        assert_eq!(scene.visible.get(&effect.id()), Some(&true));
    }
}

#[test]
fn orbit_toggle_covers_paths_and_trails() {
    let mut sim = simulation();
    let mut scene = Recorder::default();
    assert!(sim.orbits_visible());
    sim.toggle_orbits(&mut scene);
    assert!(!sim.orbits_visible());
    assert_eq!(scene.visible.get("orbit:earth"), Some(&false));
    assert_eq!(scene.visible.get("orbit:titan"), Some(&false));
    assert_eq!(scene.visible.get("trail:voyager2"), Some(&false));
    assert!(!scene.visible.contains_key("orbit:sun"));

    sim.toggle_orbits(&mut scene);
    assert_eq!(scene.visible.get("trail:voyager2"), Some(&true));
}

#[test]
fn reversed_time_runs_trajectories_backwards() {
    let mut sim = simulation();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());
    sim.clock_mut().set_time_scale(-86_400.0 * 365.0);
    let first = sim.frame(DT, &mut scene, &mut labels);
    let d0 = sim.registry().position("voyager1").unwrap().norm();
    for _ in 0..30 {
        sim.frame(DT, &mut scene, &mut labels);
    }
    let d1 = sim.registry().position("voyager1").unwrap().norm();
    assert!(d1 < d0);
    assert!(sim.clock().now() < first.now);
}

/// Fly to `target` at the default speed and return the frames it took.
fn fly_to(sim: &mut Simulation, target: &str) -> usize {
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());
    // missions have no position before their first frame
    sim.frame(DT, &mut scene, &mut labels);
    assert_eq!(sim.request_travel(target, &scene), TravelOutcome::Started);
    let mut last = f64::INFINITY;
    for frame in 1..=3000 {
        let report = sim.frame(DT, &mut scene, &mut labels);
        let live = sim.registry().position(target).unwrap();
        assert_eq!(report.camera.look_at, live);
        if report.status == NavStatus::Arrived {
            return frame;
        }
        assert_eq!(report.status, NavStatus::Traveling);
        let remaining = (live + sim.navigator().state().target_offset - report.camera.position).norm();
        assert!(remaining < last, "{target}: {remaining} >= {last} at frame {frame}");
        last = remaining;
    }
    panic!("{target} not reached, still {last} away");
}

#[test]
fn default_speed_travel_reaches_orbiting_bodies() {
    for target in ["earth", "moon", "mars", "jupiter", "neptune", "iss"] {
        let mut sim = simulation();
        assert_eq!(sim.navigator().speed(), 1.0);
        let frames = fly_to(&mut sim, target);
        assert!(frames > 60, "{target} arrived after {frames} frames");

        // translation stops but the view stays on the moving target
        let (mut scene, mut labels) = (Recorder::default(), Labels::default());
        let parked = sim.navigator().camera().position;
        for _ in 0..30 {
            let report = sim.frame(DT, &mut scene, &mut labels);
            assert_eq!(report.status, NavStatus::Arrived);
            assert_eq!(report.camera.position, parked);
            assert_eq!(report.camera.look_at, sim.registry().position(target).unwrap());
        }
    }
}

#[test]
fn dated_planets_move_with_the_clock() {
    let start = SimTime::from_calendar(2024, 3, 1).unwrap();
    let config = SimulationConfig {
        planet_motion: PlanetMotion::Ephemeris,
        ..SimulationConfig::default()
    };
    let mut sim =
        Simulation::from_catalogue(Catalogue::builtin().unwrap(), Clock::new(start), config).unwrap();
    let (mut scene, mut labels) = (Recorder::default(), Labels::default());

    sim.clock_mut().pause();
    sim.frame(DT, &mut scene, &mut labels);
    let earth = sim.registry().position("earth").unwrap();
    let report = sim.frame(DT, &mut scene, &mut labels);
    assert!(!report.moved.iter().any(|id| &**id == "earth"));
    assert!(report.moved.iter().any(|id| &**id == "moon"));
    assert!((earth.norm() - 99.1).abs() < 0.5, "{earth:?}");

    sim.clock_mut().resume();
    sim.clock_mut().set_time_scale(86_400.0 * 60.0);
    let report = sim.frame(DT, &mut scene, &mut labels);
    assert!(report.moved.iter().any(|id| &**id == "earth"));
    fly_to(&mut sim, "mars");
}