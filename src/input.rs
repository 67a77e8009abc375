//! Per-frame input, passed by reference to whoever reacts to it.

use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

// Pixels of trackpad scrolling that count as one wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

/// Keys the tuning panels react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Up,
    Down,
    Left,
    Right,
    Enter,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    /// Wheel lines scrolled this frame, positive away from the user.
    pub wheel_delta: f32,
    pub mouse_position: [f32; 2],
    /// Cursor motion this frame, in pixels.
    pub mouse_delta: [f32; 2],
    // Held buttons.
    pub rotate: bool,
    pub translate: bool,
    /// Space was pressed this frame.
    pub pause: bool,
    /// Panel keys pressed this frame, in order.
    pub keys: Vec<Key>,
}

macro_rules! bind_keys {
    ($code:expr, $($pat:pat => $key:expr),*) => (
        match $code {
            $($pat => Some($key),)*
            _ => None,
        }
    );
}

impl InputState {
    /// Folds a window event into the state. Returns whether it was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(code) if event.state == ElementState::Pressed => {
                    self.key_pressed(code, event.repeat)
                }
                _ => false,
            },
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_button(*button, *state == ElementState::Pressed)
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.wheel_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                true
            }
            _ => false,
        }
    }

    pub fn key_pressed(&mut self, code: KeyCode, repeat: bool) -> bool {
        if code == KeyCode::Space {
            if !repeat {
                self.pause = true;
            }
            return true;
        }
        let key = bind_keys!(code,
            KeyCode::Tab => Key::Tab,
            KeyCode::ArrowUp => Key::Up,
            KeyCode::ArrowDown => Key::Down,
            KeyCode::ArrowLeft => Key::Left,
            KeyCode::ArrowRight => Key::Right,
            KeyCode::Enter => Key::Enter);
        match key {
            Some(key) => {
                self.keys.push(key);
                true
            }
            None => false,
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) -> bool {
        match button {
            MouseButton::Left => self.rotate = pressed,
            MouseButton::Right | MouseButton::Middle => self.translate = pressed,
            _ => return false,
        }
        true
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        self.mouse_delta[0] += x - self.mouse_position[0];
        self.mouse_delta[1] += y - self.mouse_position[1];
        self.mouse_position = [x, y];
    }

    /// Clears everything that only lasts one frame. Held buttons and the
    /// cursor position carry over.
    pub fn end_frame(&mut self) {
        self.wheel_delta = 0.0;
        self.mouse_delta = [0.0, 0.0];
        self.pause = false;
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_collected_until_the_frame_ends() {
        let mut input = InputState::default();
        assert!(input.key_pressed(KeyCode::Tab, false));
        assert!(input.key_pressed(KeyCode::ArrowRight, true));
        assert!(!input.key_pressed(KeyCode::KeyZ, false));
        assert_eq!(input.keys, vec![Key::Tab, Key::Right]);

        input.end_frame();
        assert!(input.keys.is_empty());
    }

    #[test]
    fn pause_ignores_key_repeat() {
        let mut input = InputState::default();
        input.key_pressed(KeyCode::Space, true);
        assert!(!input.pause);
        input.key_pressed(KeyCode::Space, false);
        assert!(input.pause);
        input.end_frame();
        assert!(!input.pause);
    }

    #[test]
    fn mouse_motion_accumulates() {
        let mut input = InputState::default();
        input.cursor_moved(10.0, 10.0);
        input.end_frame();
        input.mouse_button(MouseButton::Left, true);
        input.cursor_moved(14.0, 9.0);
        input.cursor_moved(20.0, 5.0);
        assert_eq!(input.mouse_delta, [10.0, -5.0]);
        assert_eq!(input.mouse_position, [20.0, 5.0]);

        input.end_frame();
        assert_eq!(input.mouse_delta, [0.0, 0.0]);
        assert!(input.rotate);
        input.mouse_button(MouseButton::Left, false);
        assert!(!input.rotate);
    }
}
