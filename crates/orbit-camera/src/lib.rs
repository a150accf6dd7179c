//! Orbit camera driven by pointer drags and scrolling
//!
//! Windowing agnostic: the caller samples its input backend into a
//! [`PointerState`] once per frame and forwards scroll events.

use hair_math::{Mat4, Vec3, PI};

pub const MIN_DISTANCE: f32 = 0.01;
/// Keeps pitch strictly inside (-90°, 90°) so the view basis never degenerates.
pub const PITCH_EPSILON: f32 = 0.00001;

/// What a drag does, fixed by the button that started it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragMode {
    Rotate,
    Pan,
}

/// Pointer sample for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerState {
    /// Cursor position in window pixels, y pointing down.
    pub x: f32,
    pub y: f32,
    /// Right button.
    pub secondary: bool,
    /// Middle button.
    pub tertiary: bool,
}

#[derive(Clone, Copy, Debug)]
struct Drag {
    mode: DragMode,
    previous: (f32, f32),
}

#[derive(Clone, Debug)]
pub struct OrbitCamera {
    target: Vec3,
    distance: f32,
    pitch: f32,
    yaw: f32,
    sensitivity: f32,
    zoom_sensitivity: f32,
    drag: Option<Drag>,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 0.5,
            pitch: 0.0,
            yaw: 0.0,
            sensitivity: 0.005,
            zoom_sensitivity: 0.05,
            drag: None,
        }
    }
}

impl OrbitCamera {
    pub fn new(target: Vec3, distance: f32) -> Self {
        let mut camera = Self {
            target,
            ..Default::default()
        };
        camera.set_distance(distance);
        camera
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Mode of the drag in progress, if any.
    pub fn drag_mode(&self) -> Option<DragMode> {
        self.drag.map(|d| d.mode)
    }

    /// Camera position: `(0, 0, distance)` pitched about X, then yawed about Y,
    /// then offset by the target.
    pub fn position(&self) -> Vec3 {
        let rotation = Mat4::rotate_y(-self.yaw) * Mat4::rotate_x(-self.pitch);
        self.target + rotation.transform_vector(Vec3::new(0.0, 0.0, self.distance))
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position(), self.target, Vec3::Y)
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.max(MIN_DISTANCE);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        let limit = PI / 2.0;
        self.pitch = if pitch >= limit {
            limit - PITCH_EPSILON
        } else if pitch <= -limit {
            -limit + PITCH_EPSILON
        } else {
            pitch
        };
    }

    /// Yaw beyond a full turn resets to zero rather than wrapping.
    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = if yaw > PI * 2.0 { 0.0 } else { yaw };
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.max(0.0);
    }

    pub fn set_zoom_sensitivity(&mut self, zoom_sensitivity: f32) {
        self.zoom_sensitivity = zoom_sensitivity.max(0.0);
    }

    /// Feeds one frame of pointer input.
    pub fn update(&mut self, pointer: &PointerState) {
        self.set_distance(self.distance);

        if !(pointer.secondary || pointer.tertiary) {
            self.drag = None;
            return;
        }

        let current = (pointer.x, pointer.y);
        let drag = *self.drag.get_or_insert(Drag {
            mode: if pointer.secondary {
                DragMode::Rotate
            } else {
                DragMode::Pan
            },
            previous: current,
        });
        self.on_drag(current.0 - drag.previous.0, current.1 - drag.previous.1, drag.mode);
        self.drag = Some(Drag {
            previous: current,
            ..drag
        });
    }

    /// Additive zoom, `delta_y` in scroll lines.
    pub fn on_scroll(&mut self, delta_y: f32) {
        self.set_distance(self.distance - delta_y * self.zoom_sensitivity);
    }

    fn on_drag(&mut self, dx: f32, dy: f32, mode: DragMode) {
        match mode {
            DragMode::Rotate => {
                self.set_pitch(self.pitch + dy * self.sensitivity);
                self.set_yaw(self.yaw + dx * self.sensitivity);
            }
            DragMode::Pan => self.pan(dx, dy),
        }
    }

    fn pan(&mut self, dx: f32, dy: f32) {
        let forward = (self.target - self.position()).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward);
        self.target += up * (dy * self.sensitivity) - right * (dx * self.sensitivity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    fn pointer(x: f32, y: f32, secondary: bool, tertiary: bool) -> PointerState {
        PointerState {
            x,
            y,
            secondary,
            tertiary,
        }
    }

    #[test]
    fn test_default_position() {
        let camera = OrbitCamera::default();
        assert!(approx(camera.position(), Vec3::new(0.0, 0.0, 0.5)));
        assert_eq!(
            camera.view_matrix(),
            Mat4::look_at(Vec3::new(0.0, 0.0, 0.5), Vec3::ZERO, Vec3::Y)
        );
    }

    #[test]
    fn test_position_keeps_distance() {
        let mut camera = OrbitCamera::new(Vec3::new(1.0, 2.0, 3.0), 2.0);
        camera.set_pitch(0.4);
        camera.set_yaw(1.3);
        let offset = camera.position() - camera.target();
        assert!((offset.length() - 2.0).abs() < 1e-5);
        // Pitch alone lifts the camera without leaving the YZ plane.
        camera.set_yaw(0.0);
        let offset = camera.position() - camera.target();
        assert!(offset.x.abs() < 1e-6);
        assert!((offset.y - 2.0 * 0.4f32.sin()).abs() < 1e-5);
    }

    #[test]
    fn test_pitch_stays_inside_open_interval() {
        let mut rng = rand::rng();
        let mut camera = OrbitCamera::default();
        for _ in 0..1000 {
            camera.set_pitch(rng.random_range(-10.0 * PI..10.0 * PI));
            assert!(camera.pitch() > -PI / 2.0 && camera.pitch() < PI / 2.0, "{}", camera.pitch());
        }
        camera.set_pitch(PI / 2.0);
        assert!(camera.pitch() < PI / 2.0);
        camera.set_pitch(-PI / 2.0);
        assert!(camera.pitch() > -PI / 2.0);
    }

    #[test]
    fn test_yaw_resets_past_full_turn() {
        let mut rng = rand::rng();
        let mut camera = OrbitCamera::default();
        for _ in 0..100 {
            camera.set_yaw(PI * 2.0 + rng.random_range(0.001..100.0));
            assert_eq!(camera.yaw(), 0.0);
        }
        camera.set_yaw(PI);
        assert_eq!(camera.yaw(), PI);
        camera.set_yaw(PI * 2.0);
        assert_eq!(camera.yaw(), PI * 2.0);
    }

    #[test]
    fn test_distance_floor() {
        let mut rng = rand::rng();
        let mut camera = OrbitCamera::new(Vec3::ZERO, -3.0);
        assert_eq!(camera.distance(), MIN_DISTANCE);
        for _ in 0..500 {
            if rng.random_bool(0.5) {
                camera.set_distance(rng.random_range(-5.0..5.0));
            } else {
                camera.on_scroll(rng.random_range(-50.0..50.0));
            }
            assert!(camera.distance() >= MIN_DISTANCE);
        }
    }

    #[test]
    fn test_scroll_is_additive() {
        let mut camera = OrbitCamera::default();
        camera.on_scroll(2.0);
        assert!((camera.distance() - 0.4).abs() < 1e-6);
        camera.on_scroll(-4.0);
        assert!((camera.distance() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_drag() {
        let mut camera = OrbitCamera::default();
        camera.update(&pointer(100.0, 100.0, true, false));
        assert_eq!(camera.drag_mode(), Some(DragMode::Rotate));
        // The first sample only anchors the drag.
        assert_eq!((camera.pitch(), camera.yaw()), (0.0, 0.0));

        camera.update(&pointer(110.0, 120.0, true, false));
        assert!((camera.yaw() - 10.0 * 0.005).abs() < 1e-6);
        assert!((camera.pitch() - 20.0 * 0.005).abs() < 1e-6);

        camera.update(&pointer(110.0, 120.0, false, false));
        assert_eq!(camera.drag_mode(), None);
    }

    #[test]
    fn test_drag_mode_is_latched() {
        let mut camera = OrbitCamera::default();
        camera.update(&pointer(0.0, 0.0, false, true));
        assert_eq!(camera.drag_mode(), Some(DragMode::Pan));

        // Adding the rotate button mid-drag keeps panning.
        camera.update(&pointer(5.0, 0.0, true, true));
        assert_eq!(camera.drag_mode(), Some(DragMode::Pan));
        assert_eq!((camera.pitch(), camera.yaw()), (0.0, 0.0));

        // Releasing everything and pressing both starts a rotate drag.
        camera.update(&pointer(5.0, 0.0, false, false));
        camera.update(&pointer(5.0, 0.0, true, true));
        assert_eq!(camera.drag_mode(), Some(DragMode::Rotate));
    }

    #[test]
    fn test_pan_moves_target_in_view_plane() {
        let mut camera = OrbitCamera::default();
        camera.update(&pointer(0.0, 0.0, false, true));
        camera.update(&pointer(10.0, 0.0, false, true));
        // Looking down -Z, right is +X. The target moves against the drag so the
        // scene follows the pointer.
        assert!(approx(camera.target(), Vec3::new(-10.0 * 0.005, 0.0, 0.0)), "{:?}", camera.target());

        camera.update(&pointer(10.0, 10.0, false, true));
        assert!(approx(camera.target(), Vec3::new(-0.05, 0.05, 0.0)), "{:?}", camera.target());
        // Panning never changes the orbit itself.
        assert!((camera.distance() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sensitivities_are_non_negative() {
        let mut camera = OrbitCamera::default();
        camera.set_sensitivity(-1.0);
        camera.set_zoom_sensitivity(-1.0);
        camera.update(&pointer(0.0, 0.0, true, false));
        camera.update(&pointer(50.0, 50.0, true, false));
        camera.on_scroll(3.0);
        assert_eq!((camera.pitch(), camera.yaw(), camera.distance()), (0.0, 0.0, 0.5));
    }
}
