//! The per-frame pipeline: positions, then camera, then quality.

use std::{collections::BTreeSet, sync::Arc};

use color_eyre::eyre;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    bodies::SceneScale,
    catalogue::Catalogue,
    navigation::{Camera, NavStatus, NavigationConfig, Navigator, TravelOutcome},
    quality::{EffectLayer, FrameRateSampler, QualityState, QualityThresholds},
    registry::{PlanetMotion, Registry},
    scene::{orbit_path_id, trail_id, LabelSink, SceneSink, CAMERA_ID},
    time::{Clock, SimTime},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scale: SceneScale,
    pub navigation: NavigationConfig,
    pub quality: QualityThresholds,
    /// Body whose distance from the camera drives quality.
    pub quality_subject: String,
    /// Frame rate assumed until the sampler has data.
    pub assumed_fps: f64,
    /// Where the camera starts.
    pub camera_start: Vector3<f64>,
    pub planet_motion: PlanetMotion,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scale: SceneScale::default(),
            navigation: NavigationConfig::default(),
            quality: QualityThresholds::default(),
            quality_subject: "sun".to_owned(),
            assumed_fps: 60.0,
            camera_start: Vector3::new(0.0, 50.0, 150.0),
            planet_motion: PlanetMotion::default(),
        }
    }
}

/// What happened during one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub now: SimTime,
    /// Ids whose position changed this frame.
    pub moved: Vec<Arc<str>>,
    pub status: NavStatus,
    pub camera: Camera,
    /// Camera distance from the quality subject.
    pub subject_distance: f64,
    pub fps: f64,
    pub quality: QualityState,
}

pub struct Simulation {
    clock: Clock,
    registry: Registry,
    navigator: Navigator,
    sampler: FrameRateSampler,
    thresholds: QualityThresholds,
    quality_subject: String,
    assumed_fps: f64,
    /// Effects currently shown, `None` before the first frame.
    effects: Option<BTreeSet<EffectLayer>>,
    orbits_visible: bool,
    frame: u64,
}

impl Simulation {
    pub fn new(mut registry: Registry, clock: Clock, config: SimulationConfig) -> Self {
        registry.set_planet_motion(config.planet_motion);
        let camera = Camera {
            position: config.camera_start,
            look_at: Vector3::zeros(),
        };
        Self {
            clock,
            registry,
            navigator: Navigator::new(config.navigation, camera),
            sampler: FrameRateSampler::new(),
            thresholds: config.quality,
            quality_subject: config.quality_subject,
            assumed_fps: config.assumed_fps,
            effects: None,
            orbits_visible: true,
            frame: 0,
        }
    }

    pub fn from_catalogue(
        catalogue: Catalogue,
        clock: Clock,
        config: SimulationConfig,
    ) -> eyre::Result<Self> {
        let registry = catalogue.into_registry(config.scale)?;
        Ok(Self::new(registry, clock, config))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// For bodies that finish loading after startup.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn orbits_visible(&self) -> bool {
        self.orbits_visible
    }

    pub fn request_travel<S: SceneSink + ?Sized>(&mut self, target: &str, scene: &S) -> TravelOutcome {
        self.navigator.request_travel(target, &self.registry, scene)
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.navigator.set_speed(speed);
    }

    pub fn stop(&mut self) {
        self.navigator.stop();
    }

    /// Show or hide every orbit path and mission trail.
    pub fn set_orbits_visible<S: SceneSink + ?Sized>(&mut self, visible: bool, scene: &mut S) {
        self.orbits_visible = visible;
        for body in self.registry.bodies().filter(|b| !b.params.is_fixed()) {
            scene.set_object_visible(&orbit_path_id(&body.params.id), visible);
        }
        for mission in self.registry.missions() {
            scene.set_object_visible(&trail_id(&mission.id), visible);
        }
        debug!(visible, "orbit visibility changed");
    }

    pub fn toggle_orbits<S: SceneSink + ?Sized>(&mut self, scene: &mut S) {
        self.set_orbits_visible(!self.orbits_visible, scene);
    }

    /// Push every known position out, e.g. right after startup.
    pub fn publish<S, L>(&self, scene: &mut S, labels: &mut L)
    where
        S: SceneSink + ?Sized,
        L: LabelSink + ?Sized,
    {
        for id in self.registry.ids() {
            self.publish_one(id, scene, labels);
        }
    }

    fn publish_one<S, L>(&self, id: &str, scene: &mut S, labels: &mut L)
    where
        S: SceneSink + ?Sized,
        L: LabelSink + ?Sized,
    {
        if let Some(position) = self.registry.position(id) {
            scene.set_object_position(id, position);
            let name = self.registry.display_name(id).unwrap_or(id);
            labels.notify(id, name, position);
        }
    }

    /// Run one frame `real_dt` seconds after the previous one.
    pub fn frame<S, L>(&mut self, real_dt: f64, scene: &mut S, labels: &mut L) -> FrameReport
    where
        S: SceneSink + ?Sized,
        L: LabelSink + ?Sized,
    {
        self.frame += 1;
        self.sampler.record(real_dt);
        let now = self.clock.tick(real_dt);

        let moved = self.registry.advance(now);
        for id in &moved {
            self.publish_one(id, scene, labels);
        }

        self.navigator.tick(&self.registry, &*scene);
        let camera = *self.navigator.camera();
        if self.navigator.status() != NavStatus::Idle {
            scene.set_object_position(CAMERA_ID, camera.position);
            scene.set_object_orientation(CAMERA_ID, camera.look_at);
        }

        let subject = self
            .registry
            .position(&self.quality_subject)
            .unwrap_or_else(Vector3::zeros);
        let subject_distance = (camera.position - subject).norm();
        let fps = self.sampler.fps().unwrap_or(self.assumed_fps);
        let quality = self.thresholds.evaluate(subject_distance, fps);
        self.apply_effects(&quality, scene);

        trace!(
            frame = self.frame,
            %now,
            moved = moved.len(),
            lod = quality.lod_level,
            "frame done"
        );
        FrameReport {
            frame: self.frame,
            now,
            moved,
            status: self.navigator.status(),
            camera,
            subject_distance,
            fps,
            quality,
        }
    }

    /// Send visibility only for effects whose state changed.
    fn apply_effects<S: SceneSink + ?Sized>(&mut self, quality: &QualityState, scene: &mut S) {
        let all = self.thresholds.all_effects();
        for effect in &all {
            let shown = quality.effects.contains(effect);
            let was = self.effects.as_ref().map(|e| e.contains(effect));
            if was != Some(shown) {
                scene.set_object_visible(&effect.id(), shown);
            }
        }
        if self.effects.as_ref() != Some(&quality.effects) {
            debug!(
                effects = quality.effects.len(),
                performance = quality.performance_mode,
                "effect layers changed"
            );
        }
        self.effects = Some(quality.effects.clone());
    }
}
