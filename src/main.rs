use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use winit::{event::*, event_loop::EventLoop, window::Window};

// Import from the library crate
use model_viewer::{logging, view, Viewer, ViewerConfig};

use view::{Viewport, ViewerWindow};

const DEFAULT_SETTINGS: &str = "viewer.toml";

#[allow(deprecated)]
fn main() -> anyhow::Result<()> {
    logging::init();

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS));
    let config = ViewerConfig::load_or_default(&settings_path);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window_attributes = Window::default_attributes()
        .with_title(config.window.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(config.window.width, config.window.height));
    let window = event_loop
        .create_window(window_attributes)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let mut viewer = Viewer::new(config, size.width, size.height)?;
    viewer.set_settings_path(settings_path);

    let mut app = pollster::block_on(ViewerWindow::new(window.clone(), viewer))?;
    app.initialize()?;

    event_loop.run(move |event, elwt| {
        match event {
            Event::WindowEvent {
                ref event,
                window_id,
            } if window_id == app.window().id() => {
                if !app.on_input(event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(physical_size) => {
                            app.resize(physical_size.width, physical_size.height);
                        }
                        WindowEvent::RedrawRequested => {
                            if let Err(e) = app.render_frame() {
                                tracing::error!("frame failed: {e}");
                            }
                            if app.should_exit() {
                                elwt.exit();
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::AboutToWait => {
                app.window().request_redraw();
            }
            _ => {}
        }
    })?;

    tracing::info!("viewer closed");
    Ok(())
}
