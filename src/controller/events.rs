use std::collections::VecDeque;
use std::path::PathBuf;

/// State changes observers care about.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    ModelLoadStarted(PathBuf),
    ModelLoaded { path: PathBuf, valid: bool },
    ModelUnloaded,
    /// Something failed and was rolled back; show this to the user.
    Error(String),
    /// The last reported error no longer applies.
    ErrorCleared,
    ScreenshotSaved(PathBuf),
    SettingsReloaded,
}

/// Message queue drained once per tick by whoever presents events.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<ViewerEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ViewerEvent) {
        tracing::debug!("event: {:?}", event);
        self.pending.push_back(event);
    }

    /// Take every pending event, oldest first.
    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
