//! Input handling for keyboard and mouse.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Map a winit button, ignoring the extra side buttons.
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Editor commands bound to single key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorAction {
    /// Step MSAA to the next supported sample count.
    CycleMsaa,
    ToggleVsync,
    Quit,
}

impl EditorAction {
    pub const ALL: [EditorAction; 3] = [
        EditorAction::CycleMsaa,
        EditorAction::ToggleVsync,
        EditorAction::Quit,
    ];

    pub fn binding(self) -> KeyCode {
        match self {
            EditorAction::CycleMsaa => KeyCode::KeyM,
            EditorAction::ToggleVsync => KeyCode::KeyV,
            EditorAction::Quit => KeyCode::Escape,
        }
    }

    pub fn from_key(key: KeyCode) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.binding() == key)
    }
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    /// Keys that went down since the last `begin_frame`
    just_pressed_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,

    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last `begin_frame`
    mouse_delta: (f32, f32),
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call once per rendered frame.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = 0.0;
    }

    /// Record a key press. Returns the bound action on the initial press only,
    /// so holding a key does not repeat it.
    pub fn on_key_pressed(&mut self, key: KeyCode) -> Option<EditorAction> {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
            EditorAction::from_key(key)
        } else {
            None
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Forget the cursor position, e.g. when it leaves the window.
    pub fn on_mouse_left(&mut self) {
        self.mouse_position = None;
    }

    pub fn on_scroll(&mut self, lines: f32) {
        self.scroll_delta += lines;
    }

    /// Drop every held key and button, e.g. when focus is lost.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Option<(f32, f32)> {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_bindings() {
        assert_eq!(EditorAction::from_key(KeyCode::KeyM), Some(EditorAction::CycleMsaa));
        assert_eq!(EditorAction::from_key(KeyCode::KeyV), Some(EditorAction::ToggleVsync));
        assert_eq!(EditorAction::from_key(KeyCode::Escape), Some(EditorAction::Quit));
        assert_eq!(EditorAction::from_key(KeyCode::KeyW), None);
    }

    #[test]
    fn test_held_key_fires_once() {
        let mut input = InputState::new();
        assert_eq!(input.on_key_pressed(KeyCode::KeyM), Some(EditorAction::CycleMsaa));
        // OS key repeat
        assert_eq!(input.on_key_pressed(KeyCode::KeyM), None);
        assert!(input.is_key_pressed(KeyCode::KeyM));

        input.on_key_released(KeyCode::KeyM);
        assert_eq!(input.on_key_pressed(KeyCode::KeyM), Some(EditorAction::CycleMsaa));
    }

    #[test]
    fn test_begin_frame_clears_transients() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyV);
        input.on_mouse_moved(10.0, 10.0);
        input.on_mouse_moved(14.0, 7.0);
        input.on_scroll(1.5);

        assert!(input.is_key_just_pressed(KeyCode::KeyV));
        assert_eq!(input.mouse_delta(), (4.0, -3.0));
        assert_eq!(input.scroll_delta(), 1.5);

        input.begin_frame();
        assert!(!input.is_key_just_pressed(KeyCode::KeyV));
        assert!(input.is_key_pressed(KeyCode::KeyV));
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
        assert_eq!(input.scroll_delta(), 0.0);
    }

    #[test]
    fn test_first_move_has_no_delta() {
        let mut input = InputState::new();
        input.on_mouse_moved(300.0, 200.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_left();
        input.on_mouse_moved(0.0, 0.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.on_mouse_pressed(MouseButton::Left);
        input.release_all();
        assert!(!input.is_key_pressed(KeyCode::KeyA));
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
