use crate::chart::{TimeRange, Viewport};
use crate::display::PresentationSink;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Input from whatever surface hosts the dashboard.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    KeyDown {
        key: char,
        ctrl: bool,
        in_text_input: bool,
    },
    Click(String),
    RangeSelected(TimeRange),
    Resize(Viewport),
    FullscreenChanged(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Shortcut {
    ToggleTheme,
    ToggleFullscreen,
    ToggleRecording,
    ShowHelp,
}

impl Shortcut {
    pub const ALL: [Shortcut; 4] = [
        Shortcut::ToggleTheme,
        Shortcut::ToggleFullscreen,
        Shortcut::ToggleRecording,
        Shortcut::ShowHelp,
    ];

    /// Keys typed into a text input never trigger a shortcut.
    pub fn from_key(key: char, ctrl: bool, in_text_input: bool) -> Option<Self> {
        if in_text_input {
            return None;
        }
        match (key, ctrl) {
            ('t', false) => Some(Shortcut::ToggleTheme),
            ('f', false) => Some(Shortcut::ToggleFullscreen),
            ('r', true) => Some(Shortcut::ToggleRecording),
            ('?', _) => Some(Shortcut::ShowHelp),
            _ => None,
        }
    }

    pub fn key_label(self) -> &'static str {
        match self {
            Shortcut::ToggleTheme => "t",
            Shortcut::ToggleFullscreen => "f",
            Shortcut::ToggleRecording => "Ctrl+r",
            Shortcut::ShowHelp => "?",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Shortcut::ToggleTheme => "Toggle theme",
            Shortcut::ToggleFullscreen => "Toggle fullscreen camera",
            Shortcut::ToggleRecording => "Toggle recording",
            Shortcut::ShowHelp => "Show this help",
        }
    }
}

pub fn help_text() -> String {
    let lines: Vec<String> = Shortcut::ALL
        .iter()
        .map(|s| format!("{} - {}", s.key_label(), s.description()))
        .collect();
    format!("Keyboard Shortcuts:\n\n{}", lines.join("\n"))
}

pub struct RecordingControl {
    recording: AtomicBool,
    sink: Arc<dyn PresentationSink>,
}

impl RecordingControl {
    pub fn new(sink: Arc<dyn PresentationSink>) -> Self {
        let control = Self {
            recording: AtomicBool::new(false),
            sink,
        };
        control.render(false);
        control
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn toggle(&self) -> bool {
        let now = !self.recording.fetch_xor(true, Ordering::SeqCst);
        self.render(now);
        info!("Recording {}", if now { "started" } else { "stopped" });
        now
    }

    pub fn start(&self) {
        if !self.recording.swap(true, Ordering::SeqCst) {
            self.render(true);
        }
    }

    pub fn stop(&self) {
        if self.recording.swap(false, Ordering::SeqCst) {
            self.render(false);
        }
    }

    fn render(&self, recording: bool) {
        let (button, dot, text) = if recording {
            ("recording", "recording-dot", "Recording…")
        } else {
            ("", "recording-dot-hollow", "Record")
        };
        self.sink.display_class("recording-control", button);
        self.sink.display_class("recording-dot", dot);
        self.sink.display_field("recording-text", text);
    }
}

/// Tracks whether the camera widget is fullscreen. The platform owns the
/// actual transition; this only mirrors it on the button.
pub struct FullscreenState {
    active: AtomicBool,
    sink: Arc<dyn PresentationSink>,
}

impl FullscreenState {
    pub fn new(sink: Arc<dyn PresentationSink>) -> Self {
        let state = Self {
            active: AtomicBool::new(false),
            sink,
        };
        state.render(false);
        state
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Requests the opposite state and reports it as applied.
    pub fn toggle(&self) -> bool {
        let next = !self.is_active();
        self.changed(next);
        next
    }

    pub fn changed(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.render(active);
    }

    fn render(&self, active: bool) {
        let (icon, label) = if active {
            ("⤓", "Exit Fullscreen")
        } else {
            ("⤢", "Fullscreen")
        };
        self.sink.display_field("camera-fullscreen-icon", icon);
        self.sink.display_field("camera-fullscreen-label", label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FieldStore;

    #[test]
    fn shortcuts_skip_text_inputs() {
        assert_eq!(Shortcut::from_key('t', false, false), Some(Shortcut::ToggleTheme));
        assert_eq!(Shortcut::from_key('t', false, true), None);
        assert_eq!(Shortcut::from_key('r', false, false), None);
        assert_eq!(Shortcut::from_key('r', true, false), Some(Shortcut::ToggleRecording));
    }

    #[test]
    fn help_lists_every_shortcut() {
        let help = help_text();
        assert!(help.starts_with("Keyboard Shortcuts:"));
        assert!(help.contains("Ctrl+r - Toggle recording"));
        assert_eq!(help.lines().count(), 6);
    }

    #[test]
    fn recording_toggle_updates_button() {
        let fields = Arc::new(FieldStore::default());
        let rec = RecordingControl::new(fields.clone());
        assert_eq!(fields.field("recording-text").as_deref(), Some("Record"));

        assert!(rec.toggle());
        assert_eq!(fields.field("recording-text").as_deref(), Some("Recording…"));
        assert_eq!(fields.class("recording-dot").as_deref(), Some("recording-dot"));

        rec.start();
        assert!(rec.is_recording());
        rec.stop();
        assert!(!rec.is_recording());
        assert_eq!(fields.class("recording-control").as_deref(), Some(""));
    }

    #[test]
    fn fullscreen_mirrors_platform_changes() {
        let fields = Arc::new(FieldStore::default());
        let fs = FullscreenState::new(fields.clone());
        assert!(fs.toggle());
        assert_eq!(fields.field("camera-fullscreen-label").as_deref(), Some("Exit Fullscreen"));
        fs.changed(false);
        assert!(!fs.is_active());
        assert_eq!(fields.field("camera-fullscreen-icon").as_deref(), Some("⤢"));
    }
}
