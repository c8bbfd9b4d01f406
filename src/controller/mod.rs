// CONTROLLER: input, timing, camera integration and the viewing session
pub mod camera_controller;
pub mod events;
pub mod frame_loop;
pub mod frame_timer;
pub mod input;
pub mod viewer;

pub use camera_controller::{CameraController, ViewState};
pub use events::{EventQueue, ViewerEvent};
pub use frame_loop::{FrameLoop, FramePlan, OverlayText};
pub use frame_timer::{FrameTimer, FPS_WINDOW};
pub use input::{
    native, CursorDelta, Gesture, InputEvent, InputTracker, KeyBindings, LogicalKey, MouseButton, MouseButtons,
};
pub use viewer::Viewer;
