// VIEW: GPU setup, drawing, overlay UI and frame export
pub mod export;
pub mod gpu_init;
pub mod grid;
pub mod render;
pub mod ui;
pub mod viewport;
pub mod window;

pub use export::{FrameExporter, PngExporter};
pub use gpu_init::GpuContext;
pub use grid::GridRenderer;
pub use render::ModelRenderer;
pub use ui::{UiAction, UiFrame, UiOutput};
pub use viewport::Viewport;
pub use window::ViewerWindow;
