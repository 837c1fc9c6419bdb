use bitflags::bitflags;
use glam::Vec2;
use std::collections::HashSet;

/// Keys the front-end reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    Q,
    E,
    F2,
    F3,
    Escape,
}

bitflags! {
    /// Mouse buttons currently held.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MouseButtons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
    }
}

/// Snapshot of keyboard and mouse state consumed once per frame.
///
/// Key and button state is level-triggered. The mouse delta accumulates
/// between frames and is reset by [`InputState::end_frame`].
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: HashSet<Key>,
    buttons: MouseButtons,
    mouse_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: Key) {
        self.keys.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.keys.remove(&key);
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    pub fn set_button(&mut self, button: MouseButtons, down: bool) {
        self.buttons.set(button, down);
    }

    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    pub fn add_mouse_delta(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    /// Relative mouse motion since the last [`end_frame`](Self::end_frame).
    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    pub fn end_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }

    /// Drop all held keys and buttons, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.buttons = MouseButtons::empty();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.press(key);
        self
    }

    pub fn with_buttons(mut self, buttons: MouseButtons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_mouse_delta(mut self, delta: Vec2) -> Self {
        self.mouse_delta = delta;
        self
    }
}
