use glam::{Mat4, Vec3};

use crate::config::{CameraSettings, SensitivitySettings, ViewerConfig};
use crate::controller::input::{CursorDelta, InputTracker, LogicalKey};
use crate::model::{BoundingBox, TransformState};

/// Headroom so a framed model does not touch the viewport edges.
const FIT_HEADROOM: f32 = 1.6;

/// Smallest multiplicative step any scale gesture may apply, so a huge
/// frame delta or wheel burst can never flip or collapse the model.
const MIN_SCALE_STEP: f32 = 0.01;

/// Whether a model is framed by the current view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewState {
    /// No model loaded.
    Default,
    /// Model loaded and auto-fit to its bounds.
    Framed(BoundingBox),
}

/// Owns the model transform and integrates input into it.
pub struct CameraController {
    camera: CameraSettings,
    sensitivity: SensitivitySettings,
    width: u32,
    height: u32,
    state: ViewState,
    transform: TransformState,
}

impl CameraController {
    pub fn new(config: &ViewerConfig, width: u32, height: u32) -> Self {
        let mut controller = Self {
            camera: config.camera.clone(),
            sensitivity: config.sensitivity.clone(),
            width,
            height,
            state: ViewState::Default,
            transform: TransformState::default(),
        };
        controller.reset_view();
        controller
    }

    /// Adopt reloaded settings. The transform is kept as is.
    pub fn apply_settings(&mut self, config: &ViewerConfig) {
        self.camera = config.camera.clone();
        self.sensitivity = config.sensitivity.clone();
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn transform(&self) -> &TransformState {
        &self.transform
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fov_degrees(&self) -> f32 {
        self.camera.fov_degrees
    }

    pub fn set_fov_degrees(&mut self, fov: f32) {
        self.camera.fov_degrees = fov;
    }

    /// Enter the Framed state for a freshly loaded model.
    pub fn on_model_loaded(&mut self, bounds: BoundingBox) {
        self.state = ViewState::Framed(bounds);
        self.reset_view();
    }

    /// Return to the Default state.
    pub fn on_model_unloaded(&mut self) {
        self.state = ViewState::Default;
        self.reset_view();
    }

    /// Window resized. Does not re-frame; only projection and pan speed
    /// follow the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Scale that frames `bounds` at the default camera distance, or `None`
    /// when the viewport or bounds are degenerate.
    pub fn fit_scale(&self, bounds: &BoundingBox) -> Option<f32> {
        if self.height == 0 {
            return None;
        }
        let fov = self.camera.fov_degrees;
        // Narrower of the configured FOV and its height-corrected equivalent,
        // so tall windows are not over-zoomed
        let effective_fov = fov.min(fov * self.width as f32 / self.height as f32);
        let model_size = bounds.origin_extent();
        if effective_fov <= 0.0 || model_size <= 0.0 || !model_size.is_finite() {
            return None;
        }
        let optimal_distance = model_size / effective_fov.to_radians().atan() * FIT_HEADROOM;
        Some(self.camera.default_distance / optimal_distance)
    }

    /// Restore the default view and, when framing a model, auto-fit it.
    /// A degenerate viewport keeps the previous scale.
    pub fn reset_view(&mut self) {
        let previous_scale = self.transform.scale;

        self.transform = TransformState::default();
        self.transform.translate(Vec3::new(0.0, 0.0, -self.camera.default_distance));
        self.transform.set_pitch(self.camera.default_pitch_degrees);
        self.transform.set_yaw(0.0);

        if let ViewState::Framed(bounds) = self.state {
            match self.fit_scale(&bounds) {
                Some(scale) => self.transform.scale_by(scale),
                None => {
                    tracing::warn!("skipping auto-fit for degenerate viewport {}x{}", self.width, self.height);
                    self.transform.scale = previous_scale;
                }
            }
        }
    }

    /// Integrate held keys over `delta_seconds`.
    pub fn update(&mut self, delta_seconds: f32, input: &InputTracker) {
        let held = |key| input.is_pressed(key);

        let mut speed = self.sensitivity.movement * delta_seconds;
        // Both modifiers compose: holding both nets ×factor÷factor
        if held(LogicalKey::SpeedUp) {
            speed *= self.sensitivity.modifier_factor;
        }
        if held(LogicalKey::SlowDown) {
            speed /= self.sensitivity.modifier_factor;
        }

        if held(LogicalKey::ElevateUp) {
            self.transform.translate(Vec3::new(0.0, speed, 0.0));
        }
        if held(LogicalKey::ElevateDown) {
            self.transform.translate(Vec3::new(0.0, -speed, 0.0));
        }
        if held(LogicalKey::StrafeLeft) {
            self.transform.translate(Vec3::new(-speed, 0.0, 0.0));
        }
        if held(LogicalKey::StrafeRight) {
            self.transform.translate(Vec3::new(speed, 0.0, 0.0));
        }

        // Scale instead of dollying so the view never crosses the model
        if held(LogicalKey::ScaleUp) {
            self.transform.scale_by((1.0 + speed / 2.0).max(MIN_SCALE_STEP));
        }
        if held(LogicalKey::ScaleDown) {
            self.transform.scale_by((1.0 - speed / 2.0).max(MIN_SCALE_STEP));
        }

        let rot_speed = speed.to_degrees();
        if held(LogicalKey::PitchUp) {
            self.transform.add_pitch(rot_speed);
        }
        if held(LogicalKey::PitchDown) {
            self.transform.add_pitch(-rot_speed);
        }
        if held(LogicalKey::YawLeft) {
            self.transform.add_yaw(-rot_speed);
        }
        if held(LogicalKey::YawRight) {
            self.transform.add_yaw(rot_speed);
        }
    }

    /// Left-button drag.
    pub fn rotate_drag(&mut self, delta: CursorDelta) {
        self.transform.add_yaw(-delta.dx * self.sensitivity.x_rotate);
        self.transform.add_pitch(-delta.dy * self.sensitivity.y_rotate);
    }

    /// Right-button drag. Pan speed is normalised against window height and
    /// FOV so the perceived rate stays constant.
    pub fn pan_drag(&mut self, delta: CursorDelta) {
        let Some(adjust) = self.pan_adjust() else {
            return;
        };
        self.transform.translate(Vec3::new(-delta.dx * self.sensitivity.pan_x * adjust, 0.0, 0.0));
        self.transform.translate(Vec3::new(0.0, delta.dy * self.sensitivity.pan_y * adjust, 0.0));
    }

    pub fn pan_adjust(&self) -> Option<f32> {
        if self.height == 0 || self.sensitivity.reference_fov == 0.0 {
            return None;
        }
        Some(
            (self.sensitivity.reference_height / self.height as f32)
                * (self.camera.fov_degrees / self.sensitivity.reference_fov),
        )
    }

    /// Mouse wheel, in lines.
    pub fn zoom(&mut self, wheel_delta: f32) {
        let factor = 1.0 + wheel_delta * self.sensitivity.zoom;
        self.transform.scale_by(factor.max(MIN_SCALE_STEP));
    }

    /// `translation × rotation(pitch, yaw) × scale`
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.model_matrix()
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.camera.fov_degrees.to_radians(),
            self.aspect(),
            self.camera.near,
            self.camera.far,
        )
    }

    pub fn scale_matrix(&self) -> Mat4 {
        self.transform.scale
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        self.transform.rotation()
    }

    pub fn translation_matrix(&self) -> Mat4 {
        self.transform.translation
    }

    /// Replace the scale with a uniform `scale`.
    pub fn set_scale(&mut self, scale: f32) {
        self.transform.scale = Mat4::from_scale(Vec3::splat(scale));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input::KeyBindings;

    fn controller(width: u32, height: u32) -> CameraController {
        CameraController::new(&ViewerConfig::default(), width, height)
    }

    fn unit_cube() -> BoundingBox {
        BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn holding(keys: &[LogicalKey]) -> InputTracker {
        let mut input = InputTracker::new(&KeyBindings::default());
        for key in keys {
            input.on_key_down(*key);
        }
        input
    }

    /// Largest |NDC| coordinate over the eight box corners.
    fn worst_ndc(cam: &CameraController, b: &BoundingBox) -> f32 {
        let mvp = cam.projection_matrix() * cam.model_matrix();
        let mut worst: f32 = 0.0;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { b.min.x } else { b.max.x },
                if i & 2 == 0 { b.min.y } else { b.max.y },
                if i & 4 == 0 { b.min.z } else { b.max.z },
            );
            let clip = mvp * corner.extend(1.0);
            assert!(clip.w > 0.0, "corner behind the eye");
            let ndc = clip.truncate() / clip.w;
            worst = worst.max(ndc.x.abs()).max(ndc.y.abs());
            assert!(ndc.z >= 0.0 && ndc.z <= 1.0, "corner clipped by depth range");
        }
        worst
    }

    #[test]
    fn test_default_view() {
        let cam = controller(640, 480);
        assert_eq!(cam.state(), ViewState::Default);
        assert_eq!(cam.scale_matrix(), Mat4::IDENTITY);
        assert_eq!(cam.transform().pitch(), 30.0);
        assert_eq!(cam.transform().yaw(), 0.0);
        assert_eq!(cam.transform().translation_offset(), Vec3::new(0.0, 0.0, -4.0));
    }

    #[test]
    fn test_unit_cube_fit_matches_formula() {
        let mut cam = controller(640, 480);
        cam.on_model_loaded(unit_cube());

        let model_size = 3f32.sqrt();
        let optimal_distance = model_size / 45f32.to_radians().atan() * 1.6;
        let expected = 4.0 / optimal_distance;
        assert!((cam.transform().scale_factor() - expected).abs() < 1e-6);
        assert_eq!(cam.scale_matrix(), Mat4::from_scale(Vec3::splat(cam.transform().scale_factor())));
    }

    #[test]
    fn test_tall_window_narrows_effective_fov() {
        let mut wide = controller(640, 480);
        let mut tall = controller(480, 640);
        wide.on_model_loaded(unit_cube());
        tall.on_model_loaded(unit_cube());

        let effective = 45.0 * 480.0 / 640.0_f32;
        let expected = 4.0 / (3f32.sqrt() / effective.to_radians().atan() * 1.6);
        assert!((tall.transform().scale_factor() - expected).abs() < 1e-6);
        assert!(tall.transform().scale_factor() < wide.transform().scale_factor());
    }

    #[test]
    fn test_framed_boxes_stay_inside_frustum() {
        let cases = [
            (unit_cube(), 640, 480, 45.0),
            (unit_cube(), 480, 640, 45.0),
            (BoundingBox::new(Vec3::new(-3.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0)), 800, 600, 60.0),
            (BoundingBox::new(Vec3::new(-10.0, -0.1, -10.0), Vec3::new(10.0, 0.1, 10.0)), 640, 480, 45.0),
            (BoundingBox::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0)), 1024, 768, 50.0),
        ];
        for (bounds, w, h, fov) in cases {
            let mut config = ViewerConfig::default();
            config.camera.fov_degrees = fov;
            let mut cam = CameraController::new(&config, w, h);
            cam.on_model_loaded(bounds);
            let worst = worst_ndc(&cam, &bounds);
            assert!(worst <= 1.0 + 1e-4, "{bounds:?} at {w}x{h} fov {fov}: {worst}");
        }
    }

    #[test]
    fn test_zero_height_keeps_previous_scale() {
        let mut cam = controller(640, 480);
        cam.on_model_loaded(unit_cube());
        let framed = cam.scale_matrix();

        cam.resize(640, 0);
        cam.reset_view();
        assert_eq!(cam.scale_matrix(), framed);
        assert_eq!(cam.aspect(), 1.0);
    }

    #[test]
    fn test_unload_returns_to_identity_scale() {
        let mut cam = controller(640, 480);
        cam.on_model_loaded(unit_cube());
        cam.on_model_unloaded();
        assert_eq!(cam.state(), ViewState::Default);
        assert_eq!(cam.scale_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_strafe_right_one_second() {
        let mut config = ViewerConfig::default();
        config.sensitivity.movement = 4.0;
        let mut cam = CameraController::new(&config, 640, 480);
        let input = holding(&[LogicalKey::StrafeRight]);

        let before = cam.transform().translation_offset();
        cam.update(1.0, &input);
        let after = cam.transform().translation_offset();
        assert_eq!(after.x - before.x, 4.0);
        assert_eq!(after.y, before.y);
        assert_eq!(after.z, before.z);
    }

    #[test]
    fn test_modifiers_compose() {
        let mut cam = controller(640, 480);
        cam.update(1.0, &holding(&[LogicalKey::ElevateUp, LogicalKey::SpeedUp]));
        assert!((cam.transform().translation_offset().y - 3.0).abs() < 1e-6);

        let mut cam = controller(640, 480);
        cam.update(1.0, &holding(&[LogicalKey::ElevateDown, LogicalKey::SlowDown]));
        assert!((cam.transform().translation_offset().y + 1.0 / 3.0).abs() < 1e-6);

        let mut cam = controller(640, 480);
        cam.update(1.0, &holding(&[LogicalKey::StrafeLeft, LogicalKey::SpeedUp, LogicalKey::SlowDown]));
        assert!((cam.transform().translation_offset().x + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_keys_multiply() {
        let mut cam = controller(640, 480);
        cam.update(0.5, &holding(&[LogicalKey::ScaleUp]));
        assert!((cam.transform().scale_factor() - 1.25).abs() < 1e-6);
        cam.update(0.5, &holding(&[LogicalKey::ScaleDown]));
        assert!((cam.transform().scale_factor() - 1.25 * 0.75).abs() < 1e-6);
        // A huge step cannot collapse or mirror the model
        cam.update(100.0, &holding(&[LogicalKey::ScaleDown]));
        assert!(cam.transform().scale_factor() > 0.0);
    }

    #[test]
    fn test_simultaneous_keys_apply_in_one_tick() {
        let mut cam = controller(640, 480);
        let input = holding(&[LogicalKey::StrafeRight, LogicalKey::ElevateUp, LogicalKey::YawRight]);
        cam.update(0.25, &input);
        let t = cam.transform();
        assert!((t.translation_offset().x - 0.25).abs() < 1e-6);
        assert!((t.translation_offset().y - 0.25).abs() < 1e-6);
        assert!((t.yaw() - 0.25f32.to_degrees()).abs() < 1e-4);
    }

    #[test]
    fn test_pitch_clamped_under_any_sequence() {
        let mut cam = controller(640, 480);
        let up = holding(&[LogicalKey::PitchUp, LogicalKey::SpeedUp]);
        let down = holding(&[LogicalKey::PitchDown]);
        for step in 0..50 {
            if step % 3 == 0 {
                cam.rotate_drag(CursorDelta { dx: 3.0, dy: -400.0 });
            } else if step % 3 == 1 {
                cam.update(0.7, &up);
            } else {
                cam.update(2.5, &down);
                cam.rotate_drag(CursorDelta { dx: 0.0, dy: 900.0 });
            }
            let pitch = cam.transform().pitch();
            assert!((-90.0..=90.0).contains(&pitch), "pitch {pitch} at step {step}");
        }
    }

    #[test]
    fn test_rotate_drag_signs() {
        let mut cam = controller(640, 480);
        cam.rotate_drag(CursorDelta { dx: -10.0, dy: 5.0 });
        assert_eq!(cam.transform().yaw(), 10.0);
        assert_eq!(cam.transform().pitch(), 25.0);
    }

    #[test]
    fn test_pan_normalised_by_height_and_fov() {
        // At the reference height and FOV the adjustment is exactly 1
        let mut config = ViewerConfig::default();
        config.camera.fov_degrees = 60.0;
        let mut cam = CameraController::new(&config, 640, 480);
        assert_eq!(cam.pan_adjust(), Some(1.0));

        cam.pan_drag(CursorDelta { dx: -100.0, dy: -50.0 });
        let offset = cam.transform().translation_offset();
        assert!((offset.x - 1.0).abs() < 1e-6);
        assert!((offset.y + 0.5).abs() < 1e-6);

        // Twice the height halves the pan distance
        let mut tall = CameraController::new(&config, 640, 960);
        tall.pan_drag(CursorDelta { dx: -100.0, dy: 0.0 });
        assert!((tall.transform().translation_offset().x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_scales_multiplicatively() {
        let mut cam = controller(640, 480);
        cam.zoom(2.0);
        assert!((cam.transform().scale_factor() - 1.2).abs() < 1e-6);
        cam.zoom(-1000.0);
        assert!(cam.transform().scale_factor() > 0.0);
    }

    #[test]
    fn test_no_keys_no_motion() {
        let mut cam = controller(640, 480);
        let before = *cam.transform();
        cam.update(1.0, &holding(&[]));
        assert_eq!(*cam.transform(), before);
    }
}
