/// Platform-agnostic input tracking
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Platform-independent input events
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    // Keyboard events, carrying the physical key name (e.g. "KeyW")
    KeyDown(String),
    KeyUp(String),

    // Mouse events, positions in physical pixels
    MouseDown { button: MouseButton, x: f32, y: f32 },
    MouseUp { button: MouseButton, x: f32, y: f32 },
    MouseMove { x: f32, y: f32 },
    MouseWheel { delta_y: f32 },

    // Window events
    FocusLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Input actions the camera understands, decoupled from physical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalKey {
    ElevateUp,
    ElevateDown,
    StrafeLeft,
    StrafeRight,
    ScaleUp,
    ScaleDown,
    PitchUp,
    PitchDown,
    YawLeft,
    YawRight,
    SpeedUp,
    SlowDown,
}

impl LogicalKey {
    pub const ALL: [LogicalKey; 12] = [
        LogicalKey::ElevateUp,
        LogicalKey::ElevateDown,
        LogicalKey::StrafeLeft,
        LogicalKey::StrafeRight,
        LogicalKey::ScaleUp,
        LogicalKey::ScaleDown,
        LogicalKey::PitchUp,
        LogicalKey::PitchDown,
        LogicalKey::YawLeft,
        LogicalKey::YawRight,
        LogicalKey::SpeedUp,
        LogicalKey::SlowDown,
    ];

    fn default_key(self) -> &'static str {
        match self {
            LogicalKey::ElevateUp => "KeyW",
            LogicalKey::ElevateDown => "KeyS",
            LogicalKey::StrafeLeft => "KeyA",
            LogicalKey::StrafeRight => "KeyD",
            LogicalKey::ScaleUp => "KeyE",
            LogicalKey::ScaleDown => "KeyQ",
            LogicalKey::PitchUp => "ArrowUp",
            LogicalKey::PitchDown => "ArrowDown",
            LogicalKey::YawLeft => "ArrowLeft",
            LogicalKey::YawRight => "ArrowRight",
            LogicalKey::SpeedUp => "ShiftLeft",
            LogicalKey::SlowDown => "ControlLeft",
        }
    }
}

/// Key mapping configuration: logical action → physical key name.
///
/// The reverse table is precomputed whenever the bindings change so event
/// translation never re-parses settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub bindings: BTreeMap<LogicalKey, String>,
    #[serde(skip)]
    key_to_action: HashMap<String, LogicalKey>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut keys = Self {
            bindings: BTreeMap::new(),
            key_to_action: HashMap::new(),
        };
        keys.rebuild();
        keys
    }
}

impl KeyBindings {
    /// Fill unbound actions with their defaults and rebuild the reverse map.
    pub fn rebuild(&mut self) {
        for action in LogicalKey::ALL {
            let taken = self.bindings.values().any(|k| k == action.default_key());
            if !self.bindings.contains_key(&action) && !taken {
                self.bindings.insert(action, action.default_key().to_string());
            }
        }
        self.key_to_action = self
            .bindings
            .iter()
            .map(|(action, key)| (key.clone(), *action))
            .collect();
    }

    /// Bind `action` to `key`, replacing any previous binding of either.
    pub fn bind(&mut self, action: LogicalKey, key: &str) {
        self.bindings.retain(|_, k| k != key);
        self.bindings.insert(action, key.to_string());
        self.key_to_action = self
            .bindings
            .iter()
            .map(|(action, key)| (key.clone(), *action))
            .collect();
    }

    /// Logical action bound to a physical key name.
    pub fn resolve(&self, key: &str) -> Option<LogicalKey> {
        self.key_to_action.get(key).copied()
    }

    /// Physical key name bound to a logical action.
    pub fn physical(&self, action: LogicalKey) -> Option<&str> {
        self.bindings.get(&action).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseButtons {
    pub left: bool,
    pub right: bool,
}

/// Cursor motion: previous recorded position minus the new one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CursorDelta {
    pub dx: f32,
    pub dy: f32,
}

/// Camera gesture derived from a mouse event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Drag { delta: CursorDelta, buttons: MouseButtons },
    Wheel(f32),
}

/// Records held logical keys and mouse state. Purely a recorder: no timers,
/// no validation.
#[derive(Debug, Clone)]
pub struct InputTracker {
    bindings: KeyBindings,
    pressed_keys: HashSet<LogicalKey>,
    buttons: MouseButtons,
    last_cursor: (f32, f32),
}

impl InputTracker {
    pub fn new(bindings: &KeyBindings) -> Self {
        Self {
            bindings: bindings.clone(),
            pressed_keys: HashSet::new(),
            buttons: MouseButtons::default(),
            last_cursor: (0.0, 0.0),
        }
    }

    /// Process an input event and update state. Mouse motion and wheel
    /// events yield the camera gesture they describe.
    pub fn process_event(&mut self, event: &InputEvent) -> Option<Gesture> {
        match event {
            InputEvent::KeyDown(key) => {
                if let Some(action) = self.bindings.resolve(key) {
                    self.on_key_down(action);
                }
                None
            }
            InputEvent::KeyUp(key) => {
                if let Some(action) = self.bindings.resolve(key) {
                    self.on_key_up(action);
                }
                None
            }
            InputEvent::MouseDown { button, x, y } => {
                self.on_mouse_down(*button, (*x, *y));
                None
            }
            InputEvent::MouseUp { button, x, y } => {
                self.on_mouse_up(*button, (*x, *y));
                None
            }
            InputEvent::MouseMove { x, y } => {
                let delta = self.on_mouse_move((*x, *y));
                if self.buttons.left || self.buttons.right {
                    Some(Gesture::Drag { delta, buttons: self.buttons })
                } else {
                    None
                }
            }
            InputEvent::MouseWheel { delta_y } => Some(Gesture::Wheel(*delta_y)),
            InputEvent::FocusLost => {
                self.clear();
                None
            }
        }
    }

    pub fn on_key_down(&mut self, key: LogicalKey) {
        self.pressed_keys.insert(key);
    }

    pub fn on_key_up(&mut self, key: LogicalKey) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_down(&mut self, button: MouseButton, pos: (f32, f32)) {
        match button {
            MouseButton::Left => self.buttons.left = true,
            MouseButton::Right => self.buttons.right = true,
            MouseButton::Middle => {}
        }
        // Set before the next move so the first drag delta is correct
        self.last_cursor = pos;
    }

    pub fn on_mouse_up(&mut self, button: MouseButton, pos: (f32, f32)) {
        match button {
            MouseButton::Left => self.buttons.left = false,
            MouseButton::Right => self.buttons.right = false,
            MouseButton::Middle => {}
        }
        self.last_cursor = pos;
    }

    /// Delta since the last recorded position. The position is recorded
    /// even when no button is held.
    pub fn on_mouse_move(&mut self, pos: (f32, f32)) -> CursorDelta {
        let delta = CursorDelta {
            dx: self.last_cursor.0 - pos.0,
            dy: self.last_cursor.1 - pos.1,
        };
        self.last_cursor = pos;
        delta
    }

    /// Forget every held key and button. Called on focus loss and before any
    /// modal UI is shown so nothing keeps moving the camera.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.buttons = MouseButtons::default();
    }

    pub fn is_pressed(&self, key: LogicalKey) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn pressed_keys(&self) -> &HashSet<LogicalKey> {
        &self.pressed_keys
    }

    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    pub fn last_cursor(&self) -> (f32, f32) {
        self.last_cursor
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Swap in new bindings after a settings reload. Held keys are dropped
    /// since their physical keys may now mean something else.
    pub fn set_bindings(&mut self, bindings: &KeyBindings) {
        self.bindings = bindings.clone();
        self.clear();
    }
}

pub mod native {
    use super::*;
    use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
    use winit::keyboard::PhysicalKey;

    /// Pixels per wheel "line" for touchpads reporting pixel deltas.
    const PIXELS_PER_LINE: f32 = 40.0;

    fn map_button(button: winit::event::MouseButton) -> Option<MouseButton> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }

    /// Translate a winit window event, tracking the cursor position needed
    /// for button events.
    pub fn window_event_to_input(event: &WindowEvent, cursor: &mut (f32, f32)) -> Option<InputEvent> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                let key = format!("{code:?}");
                Some(match event.state {
                    ElementState::Pressed => InputEvent::KeyDown(key),
                    ElementState::Released => InputEvent::KeyUp(key),
                })
            }
            WindowEvent::CursorMoved { position, .. } => {
                *cursor = (position.x as f32, position.y as f32);
                Some(InputEvent::MouseMove { x: cursor.0, y: cursor.1 })
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = map_button(*button)?;
                let (x, y) = *cursor;
                Some(match state {
                    ElementState::Pressed => InputEvent::MouseDown { button, x, y },
                    ElementState::Released => InputEvent::MouseUp { button, x, y },
                })
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                Some(InputEvent::MouseWheel { delta_y })
            }
            WindowEvent::Focused(false) => Some(InputEvent::FocusLost),
            _ => None,
        }
    }
}
