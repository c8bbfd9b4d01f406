use winit::event::WindowEvent;

use crate::error::ViewerError;

/// Hooks a windowing front end drives a viewer through.
pub trait Viewport {
    /// Build GPU resources that depend on the session.
    fn initialize(&mut self) -> Result<(), ViewerError>;
    fn resize(&mut self, width: u32, height: u32);
    /// Tick the session and draw one frame.
    fn render_frame(&mut self) -> Result<(), ViewerError>;
    /// Returns true when the event was consumed.
    fn on_input(&mut self, event: &WindowEvent) -> bool;
}
