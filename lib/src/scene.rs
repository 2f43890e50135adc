//! Boundaries to the rendering side. The core pushes transforms and
//! visibility out through these and only ever asks one question back: whether
//! an id has something to draw yet.

use nalgebra::Vector3;

/// Id under which the viewpoint's transform is published.
pub const CAMERA_ID: &str = "camera";

pub trait SceneSink {
    fn set_object_position(&mut self, id: &str, position: Vector3<f64>);

    /// Orient `id` to look at a point.
    fn set_object_orientation(&mut self, id: &str, look_at: Vector3<f64>);

    fn set_object_visible(&mut self, id: &str, visible: bool);

    /// Whether `id` currently has an associated renderable.
    fn has_renderable(&self, id: &str) -> bool;
}

/// Receives label placement updates. Fire and forget.
pub trait LabelSink {
    fn notify(&mut self, id: &str, display_name: &str, position: Vector3<f64>);
}

/// Id of the drawn orbit path of a body.
pub fn orbit_path_id(id: &str) -> String {
    format!("orbit:{id}")
}

/// Id of the drawn trailing path of a mission.
pub fn trail_id(id: &str) -> String {
    format!("trail:{id}")
}
