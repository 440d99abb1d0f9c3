//! Display backends
//!
//! The server only needs four things from the device it draws on: its size,
//! a batch of input events per frame, a way to present a dirty rectangle and
//! whether it is still open.

use anyhow::{Context, Result};
use minifb::{Key, MouseButton, MouseMode, Scale, Window, WindowOptions};

use crate::compositor::Framebuffer;
use crate::devices::EVDEV_OFFSET;
use crate::rect::Rect;

/// Input read from the backend, in screen coordinates and X11 keycodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Motion { x: i64, y: i64 },
    RelativeMotion { dx: i64, dy: i64 },
    Button { button: u8, pressed: bool },
    /// One wheel step; buttons 4 (up) and 5 (down).
    Scroll { up: bool },
    Key { keycode: u8, pressed: bool },
}

pub trait Backend {
    fn size(&self) -> (u16, u16);
    fn poll(&mut self) -> Result<Vec<InputEvent>>;
    fn display(&mut self, framebuffer: &Framebuffer, dirty: Rect) -> Result<()>;
    fn is_open(&self) -> bool;
}

const BUTTONS: [(MouseButton, u8); 3] = [(MouseButton::Left, 1), (MouseButton::Middle, 2), (MouseButton::Right, 3)];

/// A desktop window showing the framebuffer.
pub struct MinifbBackend {
    window: Window,
    width: u16,
    height: u16,
    mouse: Option<(i64, i64)>,
    buttons: [bool; 3],
    keys: Vec<Key>,
    presented: bool,
}

impl MinifbBackend {
    pub fn new(width: u16, height: u16, display: u32) -> Result<Self> {
        let mut window = Window::new(
            &format!("x11qd :{} - {}x{}", display, width, height),
            width as usize,
            height as usize,
            WindowOptions {
                resize: false,
                scale: Scale::X1,
                ..Default::default()
            },
        )
        .context("failed to open display window")?;
        // pacing comes from the server's frame tick
        window.set_target_fps(0);
        Ok(Self {
            window,
            width,
            height,
            mouse: None,
            buttons: [false; 3],
            keys: Vec::new(),
            presented: false,
        })
    }
}

impl Backend for MinifbBackend {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn poll(&mut self) -> Result<Vec<InputEvent>> {
        // update_with_buffer already pumped the event queue this frame
        if !std::mem::take(&mut self.presented) {
            self.window.update();
        }
        let mut events = Vec::new();

        if let Some((mx, my)) = self.window.get_mouse_pos(MouseMode::Clamp) {
            let pos = (mx as i64, my as i64);
            if self.mouse != Some(pos) {
                self.mouse = Some(pos);
                events.push(InputEvent::Motion { x: pos.0, y: pos.1 });
            }
        }

        for (i, (mb, button)) in BUTTONS.iter().enumerate() {
            let down = self.window.get_mouse_down(*mb);
            if down != self.buttons[i] {
                self.buttons[i] = down;
                events.push(InputEvent::Button {
                    button: *button,
                    pressed: down,
                });
            }
        }

        if let Some((_, dy)) = self.window.get_scroll_wheel() {
            if dy != 0.0 {
                events.push(InputEvent::Scroll { up: dy > 0.0 });
            }
        }

        let keys = self.window.get_keys();
        for key in &keys {
            if !self.keys.contains(key) {
                if let Some(keycode) = x11_keycode(*key) {
                    events.push(InputEvent::Key { keycode, pressed: true });
                }
            }
        }
        for key in &self.keys {
            if !keys.contains(key) {
                if let Some(keycode) = x11_keycode(*key) {
                    events.push(InputEvent::Key { keycode, pressed: false });
                }
            }
        }
        self.keys = keys;
        Ok(events)
    }

    fn display(&mut self, framebuffer: &Framebuffer, _dirty: Rect) -> Result<()> {
        // minifb always uploads the whole buffer
        self.window
            .update_with_buffer(framebuffer.pixels(), framebuffer.width(), framebuffer.height())
            .context("failed to present frame")?;
        self.presented = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.window.is_open()
    }
}

/// Linux evdev code for a minifb key. Keycodes are these plus
/// [`EVDEV_OFFSET`], matching the default keysym table.
fn evdev_code(key: Key) -> Option<u8> {
    use Key::*;
    const LETTERS: [Key; 26] = [A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z];
    const LETTER_CODES: [u8; 26] = [
        30, 48, 46, 32, 18, 33, 34, 35, 23, 36, 37, 38, 50, 49, 24, 25, 16, 19, 31, 20, 22, 47, 17, 45, 21, 44,
    ];
    const DIGITS: [Key; 10] = [Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9];
    const KEYPAD: [Key; 10] = [
        NumPad0, NumPad1, NumPad2, NumPad3, NumPad4, NumPad5, NumPad6, NumPad7, NumPad8, NumPad9,
    ];
    const KEYPAD_CODES: [u8; 10] = [82, 79, 80, 81, 75, 76, 77, 71, 72, 73];
    const FUNCTION: [Key; 15] = [F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12, F13, F14, F15];
    const FUNCTION_CODES: [u8; 15] = [59, 60, 61, 62, 63, 64, 65, 66, 67, 68, 87, 88, 183, 184, 185];

    let find = |keys: &[Key], codes: &[u8]| keys.iter().position(|&k| k == key).map(|i| codes[i]);
    if let Some(code) = find(&LETTERS, &LETTER_CODES)
        .or_else(|| find(&KEYPAD, &KEYPAD_CODES))
        .or_else(|| find(&FUNCTION, &FUNCTION_CODES))
    {
        return Some(code);
    }
    if let Some(i) = DIGITS.iter().position(|&k| k == key) {
        // KEY_1 is 2 and KEY_0 follows KEY_9
        return Some(if i == 0 { 11 } else { i as u8 + 1 });
    }
    Some(match key {
        Escape => 1,
        Minus => 12,
        Equal => 13,
        Backspace => 14,
        Tab => 15,
        LeftBracket => 26,
        RightBracket => 27,
        Enter => 28,
        LeftCtrl => 29,
        Semicolon => 39,
        Apostrophe => 40,
        Backquote => 41,
        LeftShift => 42,
        Backslash => 43,
        Comma => 51,
        Period => 52,
        Slash => 53,
        RightShift => 54,
        NumPadAsterisk => 55,
        LeftAlt => 56,
        Space => 57,
        CapsLock => 58,
        NumLock => 69,
        ScrollLock => 70,
        NumPadMinus => 74,
        NumPadPlus => 78,
        NumPadDot => 83,
        NumPadEnter => 96,
        RightCtrl => 97,
        NumPadSlash => 98,
        RightAlt => 100,
        Home => 102,
        Up => 103,
        PageUp => 104,
        Left => 105,
        Right => 106,
        End => 107,
        Down => 108,
        PageDown => 109,
        Insert => 110,
        Delete => 111,
        Pause => 119,
        LeftSuper => 125,
        RightSuper => 126,
        Menu => 127,
        _ => return None,
    })
}

fn x11_keycode(key: Key) -> Option<u8> {
    evdev_code(key).map(|c| c + EVDEV_OFFSET)
}

/// In-memory backend for tests and `--headless`. Input is queued by the
/// caller; presented rectangles are recorded.
pub struct HeadlessBackend {
    width: u16,
    height: u16,
    queued: Vec<InputEvent>,
    presented: Vec<Rect>,
}

impl HeadlessBackend {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            queued: Vec::new(),
            presented: Vec::new(),
        }
    }

    /// Queue input for the next `poll`.
    pub fn push(&mut self, event: InputEvent) {
        self.queued.push(event);
    }

    pub fn presented(&self) -> &[Rect] {
        &self.presented
    }
}

impl Backend for HeadlessBackend {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn poll(&mut self) -> Result<Vec<InputEvent>> {
        Ok(std::mem::take(&mut self.queued))
    }

    fn display(&mut self, _framebuffer: &Framebuffer, dirty: Rect) -> Result<()> {
        self.presented.push(dirty);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}
