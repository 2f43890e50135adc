//! Adaptive quality: detail and secondary effects traded off against frame
//! rate and camera distance.

use std::{
    collections::{BTreeSet, VecDeque},
    fmt,
};

use serde::{Deserialize, Serialize};

/// Frames averaged by [`FrameRateSampler`].
pub const SAMPLE_WINDOW: usize = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Beyond this distance lod drops to `medium_lod`.
    pub medium_distance: f64,
    /// Beyond this distance lod drops to `far_lod`.
    pub far_distance: f64,
    /// Beyond this distance performance mode is forced.
    pub extreme_distance: f64,
    pub medium_lod: f64,
    pub far_lod: f64,
    /// Below this frame rate only part of the effects are shown.
    pub moderate_fps: f64,
    /// Below this frame rate lod is multiplied by `low_fps_factor`.
    pub low_fps: f64,
    pub low_fps_factor: f64,
    /// Below this frame rate performance mode is forced.
    pub critical_fps: f64,
    /// Below this frame rate every effect is hidden.
    pub effects_off_fps: f64,
    pub corona_layers: u8,
    /// Corona layers kept between `effects_off_fps` and `moderate_fps`.
    pub reduced_corona_layers: u8,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            medium_distance: 2000.0,
            far_distance: 5000.0,
            extreme_distance: 8000.0,
            medium_lod: 0.6,
            far_lod: 0.3,
            moderate_fps: 40.0,
            low_fps: 30.0,
            low_fps_factor: 0.5,
            critical_fps: 25.0,
            effects_off_fps: 20.0,
            corona_layers: 3,
            reduced_corona_layers: 2,
        }
    }
}

/// A secondary effect that can be switched off to save frame time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectLayer {
    /// Corona shell, innermost first.
    Corona(u8),
    Flares,
    Prominences,
}

impl EffectLayer {
    /// Scene id of the effect.
    pub fn id(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EffectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectLayer::Corona(n) => write!(f, "sun:corona:{n}"),
            EffectLayer::Flares => write!(f, "sun:flares"),
            EffectLayer::Prominences => write!(f, "sun:prominences"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QualityState {
    /// In `[0, 1]`.
    pub lod_level: f64,
    pub performance_mode: bool,
    pub effects: BTreeSet<EffectLayer>,
}

impl QualityThresholds {
    /// Every effect layer, shown or not.
    pub fn all_effects(&self) -> BTreeSet<EffectLayer> {
        (0..self.corona_layers)
            .map(EffectLayer::Corona)
            .chain([EffectLayer::Flares, EffectLayer::Prominences])
            .collect()
    }

    /// Quality for a camera `distance` from the subject at `fps`. Depends on
    /// nothing but its arguments.
    pub fn evaluate(&self, distance: f64, fps: f64) -> QualityState {
        // an unknown frame rate is treated as the worst case
        let fps = if fps.is_nan() { 0.0 } else { fps };

        let mut lod_level = if distance > self.far_distance {
            self.far_lod
        } else if distance > self.medium_distance {
            self.medium_lod
        } else {
            1.0
        };
        if fps < self.low_fps {
            lod_level *= self.low_fps_factor;
        }

        let performance_mode = fps < self.critical_fps || distance > self.extreme_distance;

        let effects = if fps < self.effects_off_fps {
            BTreeSet::new()
        } else if fps < self.moderate_fps {
            (0..self.reduced_corona_layers.min(self.corona_layers))
                .map(EffectLayer::Corona)
                .collect()
        } else {
            self.all_effects()
        };

        QualityState {
            lod_level: lod_level.clamp(0.0, 1.0),
            performance_mode,
            effects,
        }
    }
}

/// Rolling average frame rate over the last [`SAMPLE_WINDOW`] frames.
#[derive(Clone, Debug, Default)]
pub struct FrameRateSampler {
    durations: VecDeque<f64>,
    total: f64,
}

impl FrameRateSampler {
    pub fn new() -> Self {
        Self {
            durations: VecDeque::with_capacity(SAMPLE_WINDOW),
            total: 0.0,
        }
    }

    /// Record one frame's duration in seconds. Non-positive or non-finite
    /// durations are ignored.
    pub fn record(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.durations.push_back(dt);
        self.total += dt;
        if self.durations.len() > SAMPLE_WINDOW {
            if let Some(old) = self.durations.pop_front() {
                self.total -= old;
            }
        }
    }

    /// Frames per second, or `None` before the first sample.
    pub fn fps(&self) -> Option<f64> {
        if self.durations.is_empty() || self.total <= 0.0 {
            None
        } else {
            Some(self.durations.len() as f64 / self.total)
        }
    }
}

#[test]
fn lod_never_rises_with_distance_or_falling_fps() {
    let thresholds = QualityThresholds::default();
    let distances: Vec<f64> = (0..200).map(|i| i as f64 * 50.0).collect();
    let rates: Vec<f64> = (0..90).map(|i| i as f64).collect();
    for &fps in &rates {
        for pair in distances.windows(2) {
            let near = thresholds.evaluate(pair[0], fps).lod_level;
            let far = thresholds.evaluate(pair[1], fps).lod_level;
            assert!(far <= near, "fps {fps}: {} -> {}", pair[0], pair[1]);
        }
    }
    for &distance in &distances {
        for pair in rates.windows(2) {
            let slow = thresholds.evaluate(distance, pair[0]).lod_level;
            let fast = thresholds.evaluate(distance, pair[1]).lod_level;
            assert!(slow <= fast, "distance {distance}: {} -> {}", pair[1], pair[0]);
        }
    }
}

#[test]
fn evaluation_is_idempotent() {
    let thresholds = QualityThresholds::default();
    for &(distance, fps) in &[(10.0, 60.0), (2500.0, 35.0), (9000.0, 10.0), (0.0, f64::NAN)] {
        assert_eq!(thresholds.evaluate(distance, fps), thresholds.evaluate(distance, fps));
    }
}

#[test]
fn bands_and_performance_mode() {
    let thresholds = QualityThresholds::default();
    assert_eq!(thresholds.evaluate(100.0, 60.0).lod_level, 1.0);
    assert_eq!(thresholds.evaluate(3000.0, 60.0).lod_level, 0.6);
    assert_eq!(thresholds.evaluate(6000.0, 60.0).lod_level, 0.3);
    assert_eq!(thresholds.evaluate(6000.0, 29.0).lod_level, 0.15);

    assert!(!thresholds.evaluate(7999.0, 26.0).performance_mode);
    assert!(thresholds.evaluate(8001.0, 60.0).performance_mode);
    assert!(thresholds.evaluate(10.0, 24.0).performance_mode);
}

#[test]
fn effects_shrink_with_frame_rate() {
    let thresholds = QualityThresholds::default();
    let all = thresholds.evaluate(0.0, 60.0).effects;
    assert_eq!(all.len(), 5);
    assert!(all.contains(&EffectLayer::Prominences));

    let some = thresholds.evaluate(0.0, 30.0).effects;
    assert_eq!(
        some.into_iter().collect::<Vec<_>>(),
        [EffectLayer::Corona(0), EffectLayer::Corona(1)]
    );
    assert!(thresholds.evaluate(0.0, 19.0).effects.is_empty());
    assert_eq!(EffectLayer::Corona(2).id(), "sun:corona:2");
}

#[test]
fn sampler_averages_the_last_window() {
    let mut sampler = FrameRateSampler::new();
    assert_eq!(sampler.fps(), None);
    for _ in 0..200 {
        sampler.record(1.0 / 20.0);
    }
    for _ in 0..SAMPLE_WINDOW {
        sampler.record(1.0 / 60.0);
    }
    sampler.record(0.0);
    sampler.record(f64::NAN);
    assert!((sampler.fps().unwrap() - 60.0).abs() < 1e-6);
}
