use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::{LightingSettings, UserUniforms, ViewerConfig};
use crate::controller::camera_controller::CameraController;
use crate::controller::events::{EventQueue, ViewerEvent};
use crate::controller::frame_loop::{FrameLoop, FramePlan};
use crate::controller::frame_timer::FrameTimer;
use crate::controller::input::{Gesture, InputEvent, InputTracker, MouseButtons};
use crate::error::{ExportError, ModelError, ShaderError, ViewerError};
use crate::model::{primitive_path, Model, ModelLoader, ObjLoader};
use crate::shader::{ShaderManager, ShaderStage};

/// One viewing session: owns every core component and is the only place
/// that mutates them. The GPU front end reads from it once per frame.
pub struct Viewer {
    config: ViewerConfig,
    settings_path: Option<PathBuf>,
    camera: CameraController,
    input: InputTracker,
    timer: FrameTimer,
    frames: FrameLoop,
    shaders: ShaderManager,
    model: Option<Model>,
    model_generation: u64,
    loader: Box<dyn ModelLoader>,
    primitives: Vec<String>,
    events: EventQueue,
}

impl Viewer {
    pub fn new(config: ViewerConfig, width: u32, height: u32) -> Result<Self, ViewerError> {
        Self::with_loader(config, width, height, Box::new(ObjLoader))
    }

    pub fn with_loader(
        config: ViewerConfig,
        width: u32,
        height: u32,
        loader: Box<dyn ModelLoader>,
    ) -> Result<Self, ViewerError> {
        let shaders = ShaderManager::new(&config.shaders.vertex, &config.shaders.fragment)?;
        let primitives = scan_primitives(&config.paths.primitives);
        Ok(Self {
            camera: CameraController::new(&config, width, height),
            input: InputTracker::new(&config.keys),
            timer: FrameTimer::new(),
            frames: FrameLoop::new(),
            shaders,
            model: None,
            model_generation: 0,
            loader,
            primitives,
            events: EventQueue::new(),
            settings_path: None,
            config,
        })
    }

    /// Remember where settings came from so they can be reloaded.
    pub fn set_settings_path(&mut self, path: impl Into<PathBuf>) {
        self.settings_path = Some(path.into());
    }

    // --- model session ---

    /// Load a model through the loader. A failed load, or a model with no
    /// drawable geometry, leaves no model and resets the view. An empty path
    /// changes nothing.
    pub fn load_model(&mut self, path: &Path) -> Result<(), ViewerError> {
        if path.as_os_str().is_empty() {
            return Err(ModelError::EmptyPath.into());
        }
        self.events.push(ViewerEvent::ModelLoadStarted(path.to_path_buf()));
        self.model_generation += 1;

        match self.loader.load(path) {
            Ok(model) if model.is_valid() => {
                self.camera.on_model_loaded(model.bounds);
                self.model = Some(model);
                self.events.push(ViewerEvent::ModelLoaded { path: path.to_path_buf(), valid: true });
                Ok(())
            }
            Ok(_) => {
                // Nothing drawable: only the grid is shown
                tracing::warn!("model {:?} has no drawable geometry", path);
                self.model = None;
                self.camera.on_model_unloaded();
                self.events.push(ViewerEvent::ModelLoaded { path: path.to_path_buf(), valid: false });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("model load failed: {e}");
                self.model = None;
                self.camera.on_model_unloaded();
                self.events.push(ViewerEvent::ModelLoaded { path: path.to_path_buf(), valid: false });
                self.events.push(ViewerEvent::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub fn unload_model(&mut self) {
        if self.model.take().is_some() {
            self.model_generation += 1;
        }
        self.camera.on_model_unloaded();
        self.events.push(ViewerEvent::ModelUnloaded);
    }

    /// Load a named shape from the primitives directory.
    pub fn add_primitive(&mut self, name: &str) -> Result<(), ViewerError> {
        if name.is_empty() {
            return Err(ModelError::EmptyPath.into());
        }
        let path = primitive_path(&self.config.paths.primitives, name);
        self.load_model(&path)
    }

    /// Primitive file names found at the last scan of the primitives
    /// directory.
    pub fn primitives(&self) -> &[String] {
        &self.primitives
    }

    /// Re-scan the primitives directory.
    pub fn refresh_primitives(&mut self) {
        self.primitives = scan_primitives(&self.config.paths.primitives);
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn is_model_valid(&self) -> bool {
        self.model.as_ref().is_some_and(Model::is_valid)
    }

    /// Changes whenever the loaded model does.
    pub fn model_generation(&self) -> u64 {
        self.model_generation
    }

    // --- shaders ---

    pub fn load_vertex_shader(&mut self, path: &Path) -> Result<(), ViewerError> {
        self.load_shader(ShaderStage::Vertex, path)
    }

    pub fn load_fragment_shader(&mut self, path: &Path) -> Result<(), ViewerError> {
        self.load_shader(ShaderStage::Fragment, path)
    }

    fn load_shader(&mut self, stage: ShaderStage, path: &Path) -> Result<(), ViewerError> {
        let result = self.shaders.load_stage(stage, path);
        self.report_shader_result(result)
    }

    pub fn reload_shaders(&mut self) -> Result<(), ViewerError> {
        let result = self.shaders.reload();
        self.report_shader_result(result)
    }

    fn report_shader_result(&mut self, result: Result<(), ShaderError>) -> Result<(), ViewerError> {
        match result {
            Ok(()) => {
                self.events.push(ViewerEvent::ErrorCleared);
                Ok(())
            }
            Err(ShaderError::EmptyPath) => Err(ShaderError::EmptyPath.into()),
            Err(e) => {
                self.events.push(ViewerEvent::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    /// The GPU built the current program.
    pub fn shader_program_accepted(&mut self) {
        self.shaders.confirm();
    }

    /// The GPU refused the current program: roll back and report it.
    pub fn shader_program_rejected(&mut self, reason: &str) {
        let error = self.shaders.reject(reason);
        self.events.push(ViewerEvent::Error(error.to_string()));
    }

    // --- view and input ---

    pub fn reset_view(&mut self) {
        self.camera.reset_view();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
    }

    /// Record an input event and apply the drag/wheel gesture it forms.
    pub fn handle_input(&mut self, event: &InputEvent) {
        match self.input.process_event(event) {
            Some(Gesture::Drag { delta, buttons }) => {
                if buttons.left {
                    self.camera.rotate_drag(delta);
                }
                if buttons.right {
                    self.camera.pan_drag(delta);
                }
            }
            Some(Gesture::Wheel(lines)) => self.camera.zoom(lines),
            None => {}
        }
    }

    /// Drop held keys and buttons, e.g. before a menu or dialog opens.
    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    pub fn mouse_buttons(&self) -> MouseButtons {
        self.input.buttons()
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    // --- settings ---

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn lighting(&self) -> &LightingSettings {
        &self.config.lighting
    }

    pub fn set_lighting(&mut self, lighting: LightingSettings) {
        self.config.lighting = lighting;
    }

    pub fn user_uniforms(&self) -> &UserUniforms {
        &self.config.user_uniforms
    }

    pub fn set_user_uniforms(&mut self, user: UserUniforms) {
        self.config.user_uniforms = user;
    }

    /// Re-read the settings file and hand the new values to the camera and
    /// input tracker. The transform and loaded model are kept.
    pub fn reload_settings(&mut self) -> Result<(), ViewerError> {
        let Some(path) = self.settings_path.clone() else {
            self.apply_settings(ViewerConfig::default());
            return Ok(());
        };
        match ViewerConfig::load(&path) {
            Ok(config) => {
                self.apply_settings(config);
                Ok(())
            }
            Err(e) => {
                self.events.push(ViewerEvent::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    fn apply_settings(&mut self, config: ViewerConfig) {
        self.camera.apply_settings(&config);
        self.input.set_bindings(&config.keys);
        self.config = config;
        self.refresh_primitives();
        self.events.push(ViewerEvent::SettingsReloaded);
    }

    // --- frames ---

    pub fn tick(&mut self) -> FramePlan {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FramePlan {
        self.frames.update(
            now,
            &mut self.timer,
            &mut self.camera,
            &self.input,
            self.model.as_ref(),
            &self.config,
        )
    }

    pub fn fps(&self) -> u32 {
        self.timer.fps()
    }

    /// Timestamped destination for the next screenshot.
    pub fn screenshot_path(&self) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.config.paths.screenshots.join(format!("screenshot-{millis}.png"))
    }

    /// Report how a screenshot export went.
    pub fn screenshot_finished(&mut self, result: Result<PathBuf, ExportError>) {
        match result {
            Ok(path) => self.events.push(ViewerEvent::ScreenshotSaved(path)),
            Err(e) => {
                tracing::warn!("screenshot failed: {e}");
                self.events.push(ViewerEvent::Error(e.to_string()));
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.events.drain()
    }
}

fn scan_primitives(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::debug!("no primitives directory at {:?}", dir);
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.to_ascii_lowercase().ends_with(".obj"))
        .collect();
    names.sort();
    names
}
