use std::collections::HashSet;

use color_eyre::eyre::{self, OptionExt};
use itertools::Itertools;
use nalgebra::Vector3;
use orrery::{
    frame::{FrameReport, Simulation},
    navigation::{NavStatus, TravelOutcome},
    scene::{LabelSink, SceneSink},
};
use tracing::{debug, info, trace, warn};

use crate::config::{Command, DriverConfig, ScriptedCommand};

/// Scene that only logs. Renderables become available after a fixed number
/// of frames, standing in for asset loading.
#[derive(Debug, Default)]
pub struct TracingScene {
    frame: u64,
    ready_at: u64,
    /// Ids last set invisible.
    hidden: HashSet<String>,
}

impl TracingScene {
    pub fn new(ready_at: u64) -> Self {
        Self {
            ready_at,
            ..Self::default()
        }
    }

    pub fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }
}

impl SceneSink for TracingScene {
    fn set_object_position(&mut self, id: &str, position: Vector3<f64>) {
        trace!(id, x = position.x, y = position.y, z = position.z, "position");
    }

    fn set_object_orientation(&mut self, id: &str, look_at: Vector3<f64>) {
        trace!(id, x = look_at.x, y = look_at.y, z = look_at.z, "look at");
    }

    fn set_object_visible(&mut self, id: &str, visible: bool) {
        if visible {
            self.hidden.remove(id);
        } else {
            self.hidden.insert(id.to_owned());
        }
        debug!(id, visible, "visibility");
    }

    fn has_renderable(&self, _id: &str) -> bool {
        self.frame >= self.ready_at
    }
}

#[derive(Debug, Default)]
pub struct TracingLabels {
    pub updates: u64,
}

impl LabelSink for TracingLabels {
    fn notify(&mut self, id: &str, display_name: &str, position: Vector3<f64>) {
        self.updates += 1;
        trace!(id, display_name, ?position, "label");
    }
}

/// Run the scripted frames and return the last report.
pub fn run(sim: &mut Simulation, config: &DriverConfig) -> eyre::Result<FrameReport> {
    let mut scene = TracingScene::new(config.load_delay_frames);
    let mut labels = TracingLabels::default();
    let mut dt = 1.0 / config.frame_rate;
    let mut commands = config.commands.iter().peekable();
    let mut last = None;
    let mut status = sim.navigator().status();

    sim.publish(&mut scene, &mut labels);
    for frame in 0..config.frames {
        scene.set_frame(frame);
        for command in commands.peeking_take_while(|c| c.frame <= frame) {
            apply(sim, command, &mut scene, &mut dt);
        }

        let report = sim.frame(dt, &mut scene, &mut labels);
        if report.status != status {
            info!(frame, from = ?status, to = ?report.status, "navigation");
            status = report.status;
        }
        last = Some(report);
    }

    let report = last.ok_or_eyre("no frames were run")?;
    summarize(sim, &report, &scene, &labels);
    Ok(report)
}

fn apply(sim: &mut Simulation, command: &ScriptedCommand, scene: &mut TracingScene, dt: &mut f64) {
    debug!(frame = command.frame, action = ?command.action, "command");
    match &command.action {
        Command::Travel { target: id } => match sim.request_travel(id, &*scene) {
            TravelOutcome::UnknownTarget => warn!(id, "no such target"),
            outcome => info!(id, ?outcome, "travel"),
        },
        Command::Speed { value } => sim.set_speed(*value),
        Command::Stop => sim.stop(),
        Command::ToggleOrbits => sim.toggle_orbits(scene),
        Command::Pause => sim.clock_mut().pause(),
        Command::Resume => sim.clock_mut().resume(),
        Command::TimeScale { value } => sim.clock_mut().set_time_scale(*value),
        Command::FrameRate { value } => {
            if value.is_finite() && *value > 0.0 {
                *dt = 1.0 / value;
            } else {
                warn!(value, "ignoring frame rate");
            }
        }
    }
}

fn summarize(sim: &Simulation, report: &FrameReport, scene: &TracingScene, labels: &TracingLabels) {
    let nearest = sim
        .registry()
        .nearest(&report.camera.position)
        .map(|(id, d)| format!("{id} at {d:.3}"));
    info!(
        frames = report.frame,
        time = %report.now,
        status = ?report.status,
        destination = ?sim.navigator().state().target,
        nearest = ?nearest,
        label_updates = labels.updates,
        hidden = scene.hidden.len(),
        "run finished"
    );
    info!(
        lod = report.quality.lod_level,
        performance = report.quality.performance_mode,
        effects = %report.quality.effects.iter().join(", "),
        fps = report.fps,
        distance = report.subject_distance,
        "quality"
    );
    if report.status == NavStatus::Traveling {
        debug!(position = ?report.camera.position, "camera still traveling");
    }
}

#[test]
fn scripted_run_reaches_its_target() {
    use orrery::{catalogue::Catalogue, time::Clock};

    let config = DriverConfig::from_toml(
        r#"
        frames = 700
        load_delay_frames = 20
        time_scale = 3600.0

        [[commands]]
        frame = 5
        action = { kind = "speed", value = 2.0 }

        [[commands]]
        frame = 10
        action = { kind = "travel", target = "iss" }

        [[commands]]
        frame = 600
        action = { kind = "frame-rate", value = 15.0 }
        "#,
    )
    .unwrap();
    let mut sim = Simulation::from_catalogue(
        Catalogue::builtin().unwrap(),
        Clock::new(config.start_time().unwrap()),
        config.simulation(),
    )
    .unwrap();
    let report = run(&mut sim, &config).unwrap();
    assert_eq!(report.frame, 700);
    assert_eq!(report.status, NavStatus::Arrived);
    assert_eq!(report.camera.look_at, sim.registry().position("iss").unwrap());
    assert!(report.quality.effects.is_empty());
}
