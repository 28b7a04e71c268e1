use std::collections::VecDeque;

use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::pose::ESCAPE;

/// Most keys held back for later frames. Further presses other than
/// [`ESCAPE`] are dropped.
pub const MAX_PENDING_KEYS: usize = 4;

/// Queues keypresses so the session can take at most one per frame.
///
/// Keys are reported as the characters they produce, so `+` works whether it
/// comes from the main row or the keypad. Escape is reported as
/// [`ESCAPE`]. Held keys repeat, but an auto-repeat is only queued when
/// nothing is pending, so a held key stops acting once it is released.
#[derive(Debug, Default)]
pub struct Input {
    pending: VecDeque<char>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a window event and queue any key it produced.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if let Some(key) = key_char(event) {
                self.queue(key, event.repeat);
            }
        }
    }

    /// Queues a fresh key press.
    pub fn push_key(&mut self, key: char) {
        self.queue(key, false);
    }

    fn queue(&mut self, key: char, repeat: bool) {
        if repeat && self.has_key() {
            return;
        }
        if self.pending.len() >= MAX_PENDING_KEYS && key != ESCAPE {
            log::debug!("input queue full, dropping {:?}", key);
            return;
        }
        self.pending.push_back(key);
    }

    /// Oldest unhandled key, if any.
    pub fn take_key(&mut self) -> Option<char> {
        self.pending.pop_front()
    }

    pub fn has_key(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// The character a key press produces, ignoring releases.
pub fn key_char(event: &KeyEvent) -> Option<char> {
    if event.state != ElementState::Pressed {
        return None;
    }
    logical_key_char(&event.logical_key)
}

fn logical_key_char(key: &Key) -> Option<char> {
    match key {
        Key::Named(NamedKey::Escape) => Some(ESCAPE),
        Key::Character(text) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
        _ => None,
    }
}
