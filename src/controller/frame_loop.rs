use std::time::Instant;

use glam::{Mat4, Vec3};

use crate::config::ViewerConfig;
use crate::controller::camera_controller::CameraController;
use crate::controller::frame_timer::FrameTimer;
use crate::controller::input::InputTracker;
use crate::model::Model;
use crate::shader::{FlatUniforms, FrameUniforms};

/// Text drawn over the viewport each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText {
    pub fps: u32,
    /// Bounding-box size of the loaded model.
    pub model_size: Option<Vec3>,
}

impl OverlayText {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("FPS: {}", self.fps)];
        if let Some(size) = self.model_size {
            lines.push(format!("Size: {:.3} x {:.3} x {:.3}", size.x, size.y, size.z));
        }
        lines
    }
}

/// Everything the GPU side needs to draw one frame, computed without a GPU.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub frame: u64,
    pub delta_seconds: f32,
    pub projection: Mat4,
    pub model: Mat4,
    pub mvp: Mat4,
    pub uniforms: FrameUniforms,
    /// Grid and axes, placed at the model's lower bounding-box extent.
    pub grid: FlatUniforms,
    /// Whether sub-mesh draws should be issued at all.
    pub draw_model: bool,
    pub overlay: OverlayText,
}

/// Per-tick orchestration: timer, camera integration, matrix composition.
#[derive(Debug, Default)]
pub struct FrameLoop {
    frame_count: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Run one tick at `now` and describe the frame to draw.
    pub fn update(
        &mut self,
        now: Instant,
        timer: &mut FrameTimer,
        camera: &mut CameraController,
        input: &InputTracker,
        model: Option<&Model>,
        config: &ViewerConfig,
    ) -> FramePlan {
        let delta_seconds = timer.tick_at(now);
        camera.update(delta_seconds, input);

        let projection = camera.projection_matrix();
        let model_matrix = camera.model_matrix();
        let mvp = projection * model_matrix;
        let uniforms = FrameUniforms::new(mvp, model_matrix, &config.lighting, &config.user_uniforms);

        let valid = model.filter(|m| m.is_valid());
        let floor = valid.map_or(0.0, |m| m.bounds.min.y);
        let grid_transform = model_matrix * Mat4::from_translation(Vec3::new(0.0, floor, 0.0));
        let grid = FlatUniforms { mvp: (projection * grid_transform).to_cols_array_2d() };

        let overlay = OverlayText {
            fps: timer.fps(),
            model_size: valid.map(|m| m.bounds.size()),
        };

        let frame = self.frame_count;
        self.frame_count += 1;

        FramePlan {
            frame,
            delta_seconds,
            projection,
            model: model_matrix,
            mvp,
            uniforms,
            grid,
            draw_model: valid.is_some(),
            overlay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input::{KeyBindings, LogicalKey};
    use crate::model::SubMesh;
    use std::path::PathBuf;
    use std::time::Duration;

    fn triangle_at(y: f32) -> Model {
        let mesh = SubMesh {
            positions: vec![[0.0, y, 0.0], [1.0, y + 2.0, 0.0], [0.0, y, 1.0]],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        Model::new(PathBuf::from("tri.obj"), vec![mesh])
    }

    #[test]
    fn test_tick_order_and_counter() {
        let config = ViewerConfig::default();
        let mut camera = CameraController::new(&config, 640, 480);
        let mut input = InputTracker::new(&KeyBindings::default());
        input.on_key_down(LogicalKey::StrafeRight);
        let mut timer = FrameTimer::new();
        let mut frames = FrameLoop::new();
        let start = Instant::now();

        let first = frames.update(start, &mut timer, &mut camera, &input, None, &config);
        assert_eq!(first.frame, 0);
        assert_eq!(first.delta_seconds, 0.0);
        let x0 = camera.transform().translation_offset().x;

        let second = frames.update(start + Duration::from_millis(500), &mut timer, &mut camera, &input, None, &config);
        assert_eq!(second.frame, 1);
        assert_eq!(frames.frame_count(), 2);
        assert!((camera.transform().translation_offset().x - x0 - 0.5).abs() < 1e-5);
        // Uniforms carry the matrices computed after integration
        assert_eq!(second.model, camera.model_matrix());
        assert_eq!(second.uniforms.mvp, (camera.projection_matrix() * camera.model_matrix()).to_cols_array_2d());
    }

    #[test]
    fn test_no_model_draws_grid_only() {
        let config = ViewerConfig::default();
        let mut camera = CameraController::new(&config, 640, 480);
        let input = InputTracker::new(&KeyBindings::default());
        let plan = FrameLoop::new().update(Instant::now(), &mut FrameTimer::new(), &mut camera, &input, None, &config);

        assert!(!plan.draw_model);
        assert_eq!(plan.overlay.model_size, None);
        assert_eq!(plan.overlay.lines(), vec!["FPS: 0".to_string()]);
        assert_eq!(plan.grid.mvp, plan.mvp.to_cols_array_2d());
    }

    #[test]
    fn test_grid_sits_at_model_floor() {
        let config = ViewerConfig::default();
        let model = triangle_at(-1.5);
        let mut camera = CameraController::new(&config, 640, 480);
        camera.on_model_loaded(model.bounds);
        let input = InputTracker::new(&KeyBindings::default());
        let plan = FrameLoop::new().update(Instant::now(), &mut FrameTimer::new(), &mut camera, &input, Some(&model), &config);

        assert!(plan.draw_model);
        assert_eq!(plan.overlay.model_size, Some(Vec3::new(1.0, 2.0, 1.0)));
        let expected = plan.projection * plan.model * Mat4::from_translation(Vec3::new(0.0, -1.5, 0.0));
        let grid = Mat4::from_cols_array_2d(&plan.grid.mvp);
        assert!(grid.abs_diff_eq(expected, 1e-6));
    }
}
