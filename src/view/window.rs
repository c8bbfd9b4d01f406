use std::path::{Path, PathBuf};
use std::sync::Arc;

use winit::event::WindowEvent;
use winit::window::Window;

use crate::controller::{native, FramePlan, InputEvent, Viewer, ViewerEvent};
use crate::error::{ExportError, ViewerError};
use crate::view::export::{capture_texture, FrameExporter, PngExporter};
use crate::view::gpu_init::GpuContext;
use crate::view::grid::GridRenderer;
use crate::view::render::{create_depth_texture, ModelRenderer, DEPTH_FORMAT};
use crate::view::ui::{build_ui, UiAction, UiFrame};
use crate::view::viewport::Viewport;

const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.12, g: 0.12, b: 0.14, a: 1.0 };

/// The single concrete viewport: a winit window rendering a `Viewer`.
pub struct ViewerWindow {
    window: Arc<Window>,
    gpu: GpuContext,
    depth_view: wgpu::TextureView,
    models: ModelRenderer,
    grid: Option<GridRenderer>,

    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    viewer: Viewer,
    exporter: Box<dyn FrameExporter>,
    cursor: (f32, f32),
    last_error: Option<String>,
    status: Option<String>,
    screenshot_requested: bool,
    menu_was_open: bool,
    quit_requested: bool,
}

impl ViewerWindow {
    pub async fn new(window: Arc<Window>, viewer: Viewer) -> Result<Self, ViewerError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| ViewerError::Gpu(format!("failed to create surface: {e}")))?;
        let gpu = GpuContext::new(&instance, surface, size.width, size.height).await?;

        let (_, depth_view) = create_depth_texture(&gpu.device, gpu.config.width, gpu.config.height);
        let models = ModelRenderer::new(&gpu.device, gpu.format);

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(egui_ctx.clone(), egui::ViewportId::ROOT, &window, None, None, None);
        let egui_renderer = egui_wgpu::Renderer::new(&gpu.device, gpu.format, egui_wgpu::RendererOptions::default());

        Ok(Self {
            window,
            gpu,
            depth_view,
            models,
            grid: None,
            egui_ctx,
            egui_state,
            egui_renderer,
            viewer,
            exporter: Box::new(PngExporter),
            cursor: (0.0, 0.0),
            last_error: None,
            status: None,
            screenshot_requested: false,
            menu_was_open: false,
            quit_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer {
        &mut self.viewer
    }

    pub fn should_exit(&self) -> bool {
        self.quit_requested
    }

    fn present_events(&mut self) {
        for event in self.viewer.drain_events() {
            match event {
                ViewerEvent::Error(message) => self.last_error = Some(message),
                ViewerEvent::ErrorCleared => self.last_error = None,
                ViewerEvent::ModelLoaded { path, valid: true } => {
                    self.status = Some(format!("loaded {}", path.display()));
                }
                ViewerEvent::ModelUnloaded => self.status = None,
                ViewerEvent::ScreenshotSaved(path) => {
                    self.status = Some(format!("saved {}", path.display()));
                }
                ViewerEvent::SettingsReloaded => self.status = Some("settings reloaded".into()),
                ViewerEvent::ModelLoadStarted(_) | ViewerEvent::ModelLoaded { .. } => {}
            }
        }
    }

    /// Ask for a file, dropping held input first so nothing drifts while
    /// the dialog is open. A cancelled dialog yields an empty path.
    fn pick_file(&mut self, title: &str, filter: &str, extensions: &[&str], directory: &Path) -> PathBuf {
        self.viewer.clear_input();
        rfd::FileDialog::new()
            .set_title(title)
            .add_filter(filter, extensions)
            .set_directory(directory)
            .pick_file()
            .unwrap_or_default()
    }

    fn handle_action(&mut self, action: UiAction) {
        let result = match action {
            UiAction::LoadModel => {
                let path = self.pick_file("Load Model", "Wavefront OBJ", &["obj"], Path::new("."));
                self.viewer.load_model(&path)
            }
            UiAction::AddPrimitive(name) => self.viewer.add_primitive(&name),
            UiAction::UnloadModel => {
                self.viewer.unload_model();
                Ok(())
            }
            UiAction::LoadVertexShader => {
                let dir = parent_dir(self.viewer.shaders().vertex_path());
                let path = self.pick_file("Load Vertex Shader", "WGSL", &["wgsl"], &dir);
                self.viewer.load_vertex_shader(&path)
            }
            UiAction::LoadFragmentShader => {
                let dir = parent_dir(self.viewer.shaders().fragment_path());
                let path = self.pick_file("Load Fragment Shader", "WGSL", &["wgsl"], &dir);
                self.viewer.load_fragment_shader(&path)
            }
            UiAction::ReloadShaders => self.viewer.reload_shaders(),
            UiAction::Screenshot => {
                self.screenshot_requested = true;
                Ok(())
            }
            UiAction::ReloadSettings => self.viewer.reload_settings(),
            UiAction::ResetView => {
                self.viewer.reset_view();
                Ok(())
            }
            UiAction::SetLighting(lighting) => {
                self.viewer.set_lighting(lighting);
                Ok(())
            }
            UiAction::DismissError => {
                self.last_error = None;
                Ok(())
            }
            UiAction::Quit => {
                self.quit_requested = true;
                Ok(())
            }
        };
        // Failures are already queued as events for the error panel
        if let Err(e) = result {
            tracing::debug!("action not completed: {e}");
        }
    }

    fn run_ui(&mut self, plan: &FramePlan) -> (Vec<egui::ClippedPrimitive>, egui::TexturesDelta, Vec<UiAction>) {
        let raw_input = self.egui_state.take_egui_input(&self.window);
        let vertex_shader = file_name(self.viewer.shaders().vertex_path());
        let fragment_shader = file_name(self.viewer.shaders().fragment_path());
        let frame = UiFrame {
            overlay: &plan.overlay,
            lighting: self.viewer.lighting(),
            primitives: self.viewer.primitives(),
            vertex_shader: &vertex_shader,
            fragment_shader: &fragment_shader,
            error: self.last_error.as_deref(),
            status: self.status.as_deref(),
        };

        let mut ui_output = None;
        let output = self.egui_ctx.run(raw_input, |ctx| {
            ui_output = Some(build_ui(ctx, &frame));
        });
        self.egui_state.handle_platform_output(&self.window, output.platform_output);

        let ui_output = ui_output.unwrap_or_default();
        if ui_output.menu_open {
            self.viewer.clear_input();
            if !self.menu_was_open {
                self.viewer.refresh_primitives();
            }
        }
        self.menu_was_open = ui_output.menu_open;
        let primitives = self.egui_ctx.tessellate(output.shapes, output.pixels_per_point);
        (primitives, output.textures_delta, ui_output.actions)
    }

    /// Build the current program on the GPU. A refused program is rolled
    /// back and the restored one built in the same frame.
    fn sync_program(&mut self) {
        let device = self.gpu.device.clone();
        for _ in 0..2 {
            match self.models.sync_program(&device, self.viewer.shaders()) {
                Ok(true) => {
                    self.viewer.shader_program_accepted();
                    return;
                }
                Ok(false) => return,
                Err(e) => self.viewer.shader_program_rejected(&e.to_string()),
            }
        }
    }

    fn save_screenshot(&mut self, texture: &wgpu::Texture) {
        let path = self.viewer.screenshot_path();
        let result = if self.gpu.can_capture {
            capture_texture(&self.gpu.device, &self.gpu.queue, texture, self.gpu.format)
                .and_then(|(pixels, w, h)| self.exporter.export(&pixels, w, h, &path))
        } else {
            Err(ExportError::Map("surface does not support copying frames".into()))
        };
        self.viewer.screenshot_finished(result);
    }
}

impl Viewport for ViewerWindow {
    fn initialize(&mut self) -> Result<(), ViewerError> {
        self.grid = Some(GridRenderer::new(&self.gpu.device, self.gpu.format, DEPTH_FORMAT));
        self.sync_program();
        let size = self.window.inner_size();
        self.viewer.resize(size.width, size.height);
        self.present_events();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewer.resize(width, height);
        if width == 0 || height == 0 {
            return;
        }
        self.gpu.resize(width, height);
        let (_, depth_view) = create_depth_texture(&self.gpu.device, width, height);
        self.depth_view = depth_view;
    }

    fn render_frame(&mut self) -> Result<(), ViewerError> {
        let plan = self.viewer.tick();

        let device = self.gpu.device.clone();
        let queue = self.gpu.queue.clone();
        self.sync_program();
        self.models.sync_model(&device, self.viewer.model_generation(), self.viewer.model());
        self.models.update(&queue, &plan.uniforms);
        if let Err(e) = self.models.prepare(&device) {
            self.viewer.shader_program_rejected(&e.to_string());
        }
        if let Some(grid) = &self.grid {
            grid.update(&queue, &plan.grid);
        }
        self.present_events();

        let (primitives, textures_delta, actions) = self.run_ui(&plan);

        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (w, h) = (self.gpu.config.width, self.gpu.config.height);
                self.gpu.resize(w, h);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(e) => return Err(ViewerError::Gpu(format!("surface error: {e}"))),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.config.width, self.gpu.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("render_encoder") });
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer.update_texture(&device, &queue, *id, image_delta);
        }
        self.egui_renderer
            .update_buffers(&device, &queue, &mut encoder, &primitives, &screen_descriptor);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(CLEAR_COLOR), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if plan.draw_model {
                self.models.draw(&mut pass);
            }
            if let Some(grid) = &self.grid {
                grid.draw(&mut pass);
            }
        }

        {
            let egui_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.egui_renderer
                .render(&mut egui_pass.forget_lifetime(), &primitives, &screen_descriptor);
        }
        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        queue.submit(std::iter::once(encoder.finish()));
        if std::mem::take(&mut self.screenshot_requested) {
            self.save_screenshot(&frame.texture);
        }
        frame.present();

        for action in actions {
            self.handle_action(action);
        }
        Ok(())
    }

    fn on_input(&mut self, event: &WindowEvent) -> bool {
        let consumed = self.egui_state.on_window_event(&self.window, event).consumed;
        match native::window_event_to_input(event, &mut self.cursor) {
            Some(input) => route_input(&mut self.viewer, &input, consumed) || consumed,
            None => consumed,
        }
    }
}

/// Releases, cursor motion and focus loss reach the viewer even over the UI,
/// so a drag ending on a panel cannot leave a button or key held.
fn passes_through_ui(input: &InputEvent) -> bool {
    matches!(
        input,
        InputEvent::MouseUp { .. } | InputEvent::MouseMove { .. } | InputEvent::KeyUp(_) | InputEvent::FocusLost
    )
}

/// Hand `input` to the viewer unless the UI took it. Returns whether the
/// viewer saw it.
pub fn route_input(viewer: &mut Viewer, input: &InputEvent, ui_consumed: bool) -> bool {
    if ui_consumed && !passes_through_ui(input) {
        return false;
    }
    viewer.handle_input(input);
    true
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| p.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
