//! Keyboard and pointer settings
//!
//! The keysym table, modifier map and device controls that clients query
//! and change through the core protocol, and the handlers for those
//! requests. Keycodes are evdev codes offset by [`EVDEV_OFFSET`].

use tracing::debug;

use crate::error::{Flow, RequestResult, XError};
use crate::events::Event;
use crate::input::NUM_BUTTONS;
use crate::proto::{KeyButMask, MAX_KEYCODE, MIN_KEYCODE};
use crate::requests::Call;
use crate::ringbuf::{Reader, Writer};
use crate::server::Server;

pub const EVDEV_OFFSET: u8 = 8;

/// Largest keysyms-per-keycode accepted from clients.
const MAX_SYMS_PER_CODE: u8 = 8;

const NO_SYMBOL: u32 = 0;

pub const MAPPING_MODIFIER: u8 = 0;
pub const MAPPING_KEYBOARD: u8 = 1;
pub const MAPPING_POINTER: u8 = 2;

pub const MAPPING_SUCCESS: u8 = 0;
pub const MAPPING_BUSY: u8 = 1;

/// Unshifted and shifted keysym for each evdev code the backends produce.
const DEFAULT_KEYSYMS: &[(u8, u32, u32)] = &[
    (1, 0xff1b, NO_SYMBOL), // Escape
    (2, b'1' as u32, b'!' as u32),
    (3, b'2' as u32, b'@' as u32),
    (4, b'3' as u32, b'#' as u32),
    (5, b'4' as u32, b'$' as u32),
    (6, b'5' as u32, b'%' as u32),
    (7, b'6' as u32, b'^' as u32),
    (8, b'7' as u32, b'&' as u32),
    (9, b'8' as u32, b'*' as u32),
    (10, b'9' as u32, b'(' as u32),
    (11, b'0' as u32, b')' as u32),
    (12, b'-' as u32, b'_' as u32),
    (13, b'=' as u32, b'+' as u32),
    (14, 0xff08, NO_SYMBOL), // BackSpace
    (15, 0xff09, NO_SYMBOL), // Tab
    (16, b'q' as u32, b'Q' as u32),
    (17, b'w' as u32, b'W' as u32),
    (18, b'e' as u32, b'E' as u32),
    (19, b'r' as u32, b'R' as u32),
    (20, b't' as u32, b'T' as u32),
    (21, b'y' as u32, b'Y' as u32),
    (22, b'u' as u32, b'U' as u32),
    (23, b'i' as u32, b'I' as u32),
    (24, b'o' as u32, b'O' as u32),
    (25, b'p' as u32, b'P' as u32),
    (26, b'[' as u32, b'{' as u32),
    (27, b']' as u32, b'}' as u32),
    (28, 0xff0d, NO_SYMBOL), // Return
    (29, 0xffe3, NO_SYMBOL), // Control_L
    (30, b'a' as u32, b'A' as u32),
    (31, b's' as u32, b'S' as u32),
    (32, b'd' as u32, b'D' as u32),
    (33, b'f' as u32, b'F' as u32),
    (34, b'g' as u32, b'G' as u32),
    (35, b'h' as u32, b'H' as u32),
    (36, b'j' as u32, b'J' as u32),
    (37, b'k' as u32, b'K' as u32),
    (38, b'l' as u32, b'L' as u32),
    (39, b';' as u32, b':' as u32),
    (40, b'\'' as u32, b'"' as u32),
    (41, b'`' as u32, b'~' as u32),
    (42, 0xffe1, NO_SYMBOL), // Shift_L
    (43, b'\\' as u32, b'|' as u32),
    (44, b'z' as u32, b'Z' as u32),
    (45, b'x' as u32, b'X' as u32),
    (46, b'c' as u32, b'C' as u32),
    (47, b'v' as u32, b'V' as u32),
    (48, b'b' as u32, b'B' as u32),
    (49, b'n' as u32, b'N' as u32),
    (50, b'm' as u32, b'M' as u32),
    (51, b',' as u32, b'<' as u32),
    (52, b'.' as u32, b'>' as u32),
    (53, b'/' as u32, b'?' as u32),
    (54, 0xffe2, NO_SYMBOL), // Shift_R
    (55, 0xffaa, NO_SYMBOL), // KP_Multiply
    (56, 0xffe9, NO_SYMBOL), // Alt_L
    (57, b' ' as u32, NO_SYMBOL),
    (58, 0xffe5, NO_SYMBOL), // Caps_Lock
    (59, 0xffbe, NO_SYMBOL), // F1
    (60, 0xffbf, NO_SYMBOL),
    (61, 0xffc0, NO_SYMBOL),
    (62, 0xffc1, NO_SYMBOL),
    (63, 0xffc2, NO_SYMBOL),
    (64, 0xffc3, NO_SYMBOL),
    (65, 0xffc4, NO_SYMBOL),
    (66, 0xffc5, NO_SYMBOL),
    (67, 0xffc6, NO_SYMBOL),
    (68, 0xffc7, NO_SYMBOL), // F10
    (69, 0xff7f, NO_SYMBOL), // Num_Lock
    (70, 0xff14, NO_SYMBOL), // Scroll_Lock
    (71, 0xffb7, 0xffb7),    // KP_7
    (72, 0xffb8, 0xffb8),
    (73, 0xffb9, 0xffb9),
    (74, 0xffad, NO_SYMBOL), // KP_Subtract
    (75, 0xffb4, 0xffb4),
    (76, 0xffb5, 0xffb5),
    (77, 0xffb6, 0xffb6),
    (78, 0xffab, NO_SYMBOL), // KP_Add
    (79, 0xffb1, 0xffb1),
    (80, 0xffb2, 0xffb2),
    (81, 0xffb3, 0xffb3),
    (82, 0xffb0, 0xffb0),    // KP_0
    (83, 0xffae, 0xffae),    // KP_Decimal
    (87, 0xffc8, NO_SYMBOL), // F11
    (88, 0xffc9, NO_SYMBOL), // F12
    (96, 0xff8d, NO_SYMBOL), // KP_Enter
    (97, 0xffe4, NO_SYMBOL), // Control_R
    (98, 0xffaf, NO_SYMBOL), // KP_Divide
    (100, 0xffea, NO_SYMBOL), // Alt_R
    (102, 0xff50, NO_SYMBOL), // Home
    (103, 0xff52, NO_SYMBOL), // Up
    (104, 0xff55, NO_SYMBOL), // Prior
    (105, 0xff51, NO_SYMBOL), // Left
    (106, 0xff53, NO_SYMBOL), // Right
    (107, 0xff57, NO_SYMBOL), // End
    (108, 0xff54, NO_SYMBOL), // Down
    (109, 0xff56, NO_SYMBOL), // Next
    (110, 0xff63, NO_SYMBOL), // Insert
    (111, 0xffff, NO_SYMBOL), // Delete
    (119, 0xff13, NO_SYMBOL), // Pause
    (125, 0xffeb, NO_SYMBOL), // Super_L
    (126, 0xffec, NO_SYMBOL), // Super_R
    (127, 0xff67, NO_SYMBOL), // Menu
    (183, 0xffca, NO_SYMBOL), // F13
    (184, 0xffcb, NO_SYMBOL),
    (185, 0xffcc, NO_SYMBOL),
];

/// Default modifier rows, Shift through Mod5, as keycodes.
const DEFAULT_MODIFIERS: [[u8; 2]; 8] = [
    [50, 62],   // Shift
    [66, 0],    // Lock
    [37, 105],  // Control
    [64, 108],  // Mod1
    [77, 0],    // Mod2
    [0, 0],     // Mod3
    [133, 134], // Mod4
    [0, 0],     // Mod5
];

const KEYCODE_COUNT: usize = (MAX_KEYCODE - MIN_KEYCODE) as usize + 1;

fn keycode_in_range(k: u8) -> bool {
    (MIN_KEYCODE..=MAX_KEYCODE).contains(&k)
}

/// Keysyms per keycode, `per_code` entries for every keycode in range.
#[derive(Debug, Clone)]
pub struct KeySyms {
    per_code: u8,
    syms: Vec<u32>,
}

impl KeySyms {
    pub fn per_code(&self) -> u8 {
        self.per_code
    }

    pub fn syms(&self, keycode: u8) -> &[u32] {
        let per = self.per_code as usize;
        let at = (keycode - MIN_KEYCODE) as usize * per;
        &self.syms[at..at + per]
    }

    /// Replace the keysyms of `count` keycodes from `first`, each given with
    /// `per` symbols. The table widens when `per` exceeds its current width.
    pub fn change(&mut self, first: u8, per: u8, syms: &[u32]) {
        if per > self.per_code {
            let (old, new) = (self.per_code as usize, per as usize);
            let mut wide = vec![NO_SYMBOL; KEYCODE_COUNT * new];
            for (i, row) in self.syms.chunks(old).enumerate() {
                wide[i * new..i * new + old].copy_from_slice(row);
            }
            self.syms = wide;
            self.per_code = per;
        }
        let width = self.per_code as usize;
        for (i, row) in syms.chunks(per as usize).enumerate() {
            let at = (first - MIN_KEYCODE) as usize * width + i * width;
            let slot = &mut self.syms[at..at + width];
            slot.fill(NO_SYMBOL);
            slot[..row.len()].copy_from_slice(row);
        }
    }
}

impl Default for KeySyms {
    fn default() -> Self {
        let mut syms = vec![NO_SYMBOL; KEYCODE_COUNT * 2];
        for &(code, lower, upper) in DEFAULT_KEYSYMS {
            let at = (code + EVDEV_OFFSET - MIN_KEYCODE) as usize * 2;
            syms[at] = lower;
            syms[at + 1] = upper;
        }
        Self { per_code: 2, syms }
    }
}

/// Keycodes bound to each of the eight modifiers; zero entries are unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierMap {
    per_modifier: u8,
    codes: Vec<u8>,
}

impl ModifierMap {
    pub fn new(per_modifier: u8, codes: Vec<u8>) -> Self {
        Self { per_modifier, codes }
    }

    pub fn per_modifier(&self) -> u8 {
        self.per_modifier
    }

    /// All rows, Shift first, as sent in GetModifierMapping.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    pub fn row(&self, index: usize) -> &[u8] {
        let per = self.per_modifier as usize;
        &self.codes[index * per..(index + 1) * per]
    }

    /// Modifier bits that `keycode` drives.
    pub fn modifiers_of(&self, keycode: u8) -> KeyButMask {
        if keycode == 0 {
            return KeyButMask::empty();
        }
        (0..8)
            .filter(|&i| self.row(i).contains(&keycode))
            .fold(KeyButMask::empty(), |acc, i| acc | KeyButMask::from_bits_truncate(1 << i))
    }
}

impl Default for ModifierMap {
    fn default() -> Self {
        Self::new(2, DEFAULT_MODIFIERS.iter().flatten().copied().collect())
    }
}

#[derive(Debug, Clone)]
pub struct KeyboardControl {
    pub key_click_percent: u8,
    pub bell_percent: u8,
    pub bell_pitch: u16,
    pub bell_duration: u16,
    pub led_mask: u32,
    pub global_auto_repeat: bool,
    /// One bit per keycode.
    pub auto_repeats: [u8; 32],
}

impl Default for KeyboardControl {
    fn default() -> Self {
        Self {
            key_click_percent: 0,
            bell_percent: 50,
            bell_pitch: 400,
            bell_duration: 100,
            led_mask: 0,
            global_auto_repeat: true,
            auto_repeats: [0xff; 32],
        }
    }
}

/// Acceleration of relative pointer motion: moves longer than `threshold`
/// are scaled by `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerControl {
    pub numerator: u16,
    pub denominator: u16,
    pub threshold: u16,
}

impl Default for PointerControl {
    fn default() -> Self {
        Self {
            numerator: 1,
            denominator: 1,
            threshold: 0,
        }
    }
}

impl PointerControl {
    pub fn accelerate(&self, dx: i64, dy: i64) -> (i64, i64) {
        if self.threshold == 0 || dx.abs() + dy.abs() <= self.threshold as i64 {
            return (dx, dy);
        }
        let (n, d) = (self.numerator as i64, self.denominator.max(1) as i64);
        (dx * n / d, dy * n / d)
    }
}

bitflags::bitflags! {
    /// ChangeKeyboardControl value-mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct KbAttr: u32 {
        const KEY_CLICK_PERCENT = 1 << 0;
        const BELL_PERCENT = 1 << 1;
        const BELL_PITCH = 1 << 2;
        const BELL_DURATION = 1 << 3;
        const LED = 1 << 4;
        const LED_MODE = 1 << 5;
        const KEY = 1 << 6;
        const AUTO_REPEAT_MODE = 1 << 7;
    }
}

/// A percentage where -1 restores the default.
fn percent(v: i16, default: u8) -> Result<u8, XError> {
    match v {
        -1 => Ok(default),
        0..=100 => Ok(v as u8),
        _ => Err(XError::Value(v as u16 as u32)),
    }
}

/// A non-negative setting where -1 restores the default.
fn setting(v: i16, default: u16) -> Result<u16, XError> {
    match v {
        -1 => Ok(default),
        v if v >= 0 => Ok(v as u16),
        _ => Err(XError::Value(v as u16 as u32)),
    }
}

impl Server {
    /// Tell every client that a mapping changed.
    fn mapping_notify(&mut self, request: u8, first_keycode: u8, count: u8) {
        let event = Event::MappingNotify {
            request,
            first_keycode,
            count,
        };
        let ids: Vec<_> = self.clients.keys().copied().collect();
        for id in ids {
            self.send_event(id, &event);
        }
    }

    pub(crate) fn handle_change_keyboard_mapping(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let count = call.detail;
        let first = r.u8()?;
        let per = r.u8()?;
        r.pad(2)?;
        if r.remaining() != count as usize * per as usize * 4 {
            return Err(XError::Length.into());
        }
        if first < MIN_KEYCODE || first as usize + count as usize > MAX_KEYCODE as usize + 1 {
            return Err(XError::Value(first as u32).into());
        }
        if per == 0 || per > MAX_SYMS_PER_CODE {
            return Err(XError::Value(per as u32).into());
        }
        let mut syms = Vec::with_capacity(r.remaining() / 4);
        while r.remaining() > 0 {
            syms.push(r.u32()?);
        }
        self.input.keysyms.change(first, per, &syms);
        self.mapping_notify(MAPPING_KEYBOARD, first, count);
        Ok(Flow::Handled)
    }

    pub(crate) fn get_keyboard_mapping(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let first = r.u8()?;
        let count = r.u8()?;
        if first < MIN_KEYCODE {
            return Err(XError::Value(first as u32).into());
        }
        if first as usize + count as usize > MAX_KEYCODE as usize + 1 {
            return Err(XError::Value(count as u32).into());
        }
        let keysyms = &self.input.keysyms;
        let per = keysyms.per_code();
        let mut body = Writer::with_capacity(call.order, 24 + count as usize * per as usize * 4);
        body.pad(24);
        for k in first as usize..first as usize + count as usize {
            for &s in keysyms.syms(k as u8) {
                body.u32(s);
            }
        }
        self.reply(call, per, body)
    }

    pub(crate) fn handle_set_modifier_mapping(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let per = call.detail;
        let codes = r.bytes(per as usize * 8)?.to_vec();
        if let Some(&bad) = codes.iter().find(|&&k| k != 0 && !keycode_in_range(k)) {
            return Err(XError::Value(bad as u32).into());
        }
        let map = ModifierMap::new(per, codes);
        let old = &self.input.modifier_map;
        let busy = old
            .codes()
            .iter()
            .chain(map.codes())
            .any(|&k| k != 0 && self.input.key_down(k) && old.modifiers_of(k) != map.modifiers_of(k));
        if busy {
            return self.reply(call, MAPPING_BUSY, Writer::new(call.order));
        }
        self.input.modifier_map = map;
        self.input.recompute_modifiers();
        self.mapping_notify(MAPPING_MODIFIER, 0, 0);
        self.reply(call, MAPPING_SUCCESS, Writer::new(call.order))
    }

    pub(crate) fn get_modifier_mapping(&mut self, call: &Call) -> RequestResult {
        let map = &self.input.modifier_map;
        let mut body = Writer::new(call.order);
        body.pad(24).bytes(map.codes());
        let per = map.per_modifier();
        self.reply(call, per, body)
    }

    pub(crate) fn handle_set_pointer_mapping(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let len = call.detail as usize;
        let map = r.bytes(len)?;
        if len != NUM_BUTTONS {
            return Err(XError::Value(len as u32).into());
        }
        let mut seen = [false; NUM_BUTTONS + 1];
        for &b in map.iter().filter(|&&b| b != 0) {
            if b as usize > NUM_BUTTONS || std::mem::replace(&mut seen[b as usize], true) {
                return Err(XError::Value(b as u32).into());
            }
        }
        let busy = self
            .input
            .button_map
            .iter()
            .zip(map)
            .any(|(&old, &new)| old != new && old != 0 && self.input.buttons & (1 << (old - 1)) != 0);
        if busy {
            return self.reply(call, MAPPING_BUSY, Writer::new(call.order));
        }
        self.input.button_map.copy_from_slice(map);
        self.mapping_notify(MAPPING_POINTER, 0, 0);
        self.reply(call, MAPPING_SUCCESS, Writer::new(call.order))
    }

    pub(crate) fn get_pointer_mapping(&mut self, call: &Call) -> RequestResult {
        let map = self.input.button_map;
        let mut body = Writer::new(call.order);
        body.pad(24).bytes(&map);
        self.reply(call, map.len() as u8, body)
    }

    pub(crate) fn handle_change_keyboard_control(&mut self, r: &mut Reader) -> RequestResult {
        let bits = r.u32()?;
        let mask = KbAttr::from_bits(bits).ok_or(XError::Value(bits))?;
        let defaults = KeyboardControl::default();
        let mut kc = self.input.keyboard_control.clone();
        let (mut led, mut led_mode, mut key, mut auto_repeat) = (None, None, None, None);
        for bit in mask.iter() {
            if bit == KbAttr::KEY_CLICK_PERCENT {
                kc.key_click_percent = percent(r.value_i16()?, defaults.key_click_percent)?;
            } else if bit == KbAttr::BELL_PERCENT {
                kc.bell_percent = percent(r.value_i16()?, defaults.bell_percent)?;
            } else if bit == KbAttr::BELL_PITCH {
                kc.bell_pitch = setting(r.value_i16()?, defaults.bell_pitch)?;
            } else if bit == KbAttr::BELL_DURATION {
                kc.bell_duration = setting(r.value_i16()?, defaults.bell_duration)?;
            } else if bit == KbAttr::LED {
                let v = r.value_u8()?;
                if !(1..=32).contains(&v) {
                    return Err(XError::Value(v as u32).into());
                }
                led = Some(v);
            } else if bit == KbAttr::LED_MODE {
                let v = r.value_u8()?;
                if v > 1 {
                    return Err(XError::Value(v as u32).into());
                }
                led_mode = Some(v == 1);
            } else if bit == KbAttr::KEY {
                let v = r.value_u8()?;
                if !keycode_in_range(v) {
                    return Err(XError::Value(v as u32).into());
                }
                key = Some(v);
            } else if bit == KbAttr::AUTO_REPEAT_MODE {
                let v = r.value_u8()?;
                if v > 2 {
                    return Err(XError::Value(v as u32).into());
                }
                auto_repeat = Some(v);
            }
        }
        if (led.is_some() && led_mode.is_none()) || (key.is_some() && auto_repeat.is_none()) {
            return Err(XError::Match.into());
        }

        if let Some(on) = led_mode {
            let bits = led.map_or(u32::MAX, |l| 1 << (l - 1));
            if on {
                kc.led_mask |= bits;
            } else {
                kc.led_mask &= !bits;
            }
        }
        match (key, auto_repeat) {
            (Some(k), Some(mode)) => {
                let on = match mode {
                    0 => false,
                    1 => true,
                    _ => defaults.auto_repeats[k as usize / 8] & (1 << (k % 8)) != 0,
                };
                let bit = 1 << (k % 8);
                if on {
                    kc.auto_repeats[k as usize / 8] |= bit;
                } else {
                    kc.auto_repeats[k as usize / 8] &= !bit;
                }
            }
            (None, Some(mode)) => kc.global_auto_repeat = mode != 0,
            _ => {}
        }
        self.input.keyboard_control = kc;
        Ok(Flow::Handled)
    }

    pub(crate) fn get_keyboard_control(&mut self, call: &Call) -> RequestResult {
        let kc = &self.input.keyboard_control;
        let mut body = Writer::new(call.order);
        body.u32(kc.led_mask)
            .u8(kc.key_click_percent)
            .u8(kc.bell_percent)
            .u16(kc.bell_pitch)
            .u16(kc.bell_duration)
            .pad(2)
            .bytes(&kc.auto_repeats);
        let global = kc.global_auto_repeat as u8;
        self.reply(call, global, body)
    }

    pub(crate) fn handle_bell(&mut self, call: &Call) -> RequestResult {
        let percent = call.detail as i8;
        if !(-100..=100).contains(&percent) {
            return Err(XError::Value(call.detail as u32).into());
        }
        debug!(client = call.client.0, percent, "bell");
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_change_pointer_control(&mut self, r: &mut Reader) -> RequestResult {
        let numerator = r.i16()?;
        let denominator = r.i16()?;
        let threshold = r.i16()?;
        let do_accel = r.u8()? != 0;
        let do_threshold = r.u8()? != 0;
        let defaults = PointerControl::default();
        let mut pc = self.input.pointer_control;
        if do_accel {
            if denominator == 0 {
                return Err(XError::Value(0).into());
            }
            pc.numerator = setting(numerator, defaults.numerator)?;
            pc.denominator = setting(denominator, defaults.denominator)?;
        }
        if do_threshold {
            pc.threshold = setting(threshold, defaults.threshold)?;
        }
        self.input.pointer_control = pc;
        Ok(Flow::Handled)
    }

    pub(crate) fn get_pointer_control(&mut self, call: &Call) -> RequestResult {
        let pc = self.input.pointer_control;
        let mut body = Writer::new(call.order);
        body.u16(pc.numerator).u16(pc.denominator).u16(pc.threshold);
        self.reply(call, 0, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InputEvent;
    use crate::proto::opcodes as op;
    use crate::requests::tests::{body, request, u32_at};
    use crate::server::tests::{connect, test_server};

    #[test]
    fn test_default_keysyms() {
        let syms = KeySyms::default();
        assert_eq!(syms.per_code(), 2);
        // evdev KEY_A is 30
        assert_eq!(syms.syms(38), &[b'a' as u32, b'A' as u32]);
        assert_eq!(syms.syms(9), &[0xff1b, NO_SYMBOL]);
        assert_eq!(syms.syms(MAX_KEYCODE), &[NO_SYMBOL, NO_SYMBOL]);
    }

    #[test]
    fn test_change_widens_table() {
        let mut syms = KeySyms::default();
        syms.change(38, 3, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(syms.per_code(), 3);
        assert_eq!(syms.syms(38), &[1, 2, 3]);
        assert_eq!(syms.syms(39), &[4, 5, 6]);
        // untouched rows keep their symbols, padded
        assert_eq!(syms.syms(40), &[b'd' as u32, b'D' as u32, NO_SYMBOL]);
        syms.change(40, 1, &[7]);
        assert_eq!(syms.syms(40), &[7, NO_SYMBOL, NO_SYMBOL]);
    }

    #[test]
    fn test_modifier_map_rows() {
        let map = ModifierMap::default();
        assert_eq!(map.per_modifier(), 2);
        assert_eq!(map.codes().len(), 16);
        assert_eq!(map.modifiers_of(62), KeyButMask::SHIFT);
        assert_eq!(map.modifiers_of(105), KeyButMask::CONTROL);
        assert_eq!(map.modifiers_of(134), KeyButMask::MOD4);
        assert!(map.modifiers_of(38).is_empty());
        assert!(map.modifiers_of(0).is_empty());
        assert_eq!(map.row(2), &[37, 105]);
    }

    #[test]
    fn test_pointer_acceleration() {
        let pc = PointerControl::default();
        assert_eq!(pc.accelerate(10, -3), (10, -3));
        let fast = PointerControl {
            numerator: 2,
            denominator: 1,
            threshold: 4,
        };
        assert_eq!(fast.accelerate(2, 2), (2, 2));
        assert_eq!(fast.accelerate(3, -2), (6, -4));
    }

    #[test]
    fn test_keyboard_mapping_requests() {
        let mut server = test_server();
        let c = connect(&mut server);
        let mut b = body();
        b.u8(38).u8(2).pad(2);
        let out = request(&mut server, c, op::GET_KEYBOARD_MAPPING, 0, b);
        assert_eq!((out[0], out[1]), (1, 2));
        assert_eq!(u32_at(&out, 4), 4);
        assert_eq!(u32_at(&out, 32), b'a' as u32);
        assert_eq!(u32_at(&out, 36), b'A' as u32);
        assert_eq!(u32_at(&out, 40), b's' as u32);

        let mut b = body();
        b.u8(38).u8(1).pad(2).u32(0x1234);
        let out = request(&mut server, c, op::CHANGE_KEYBOARD_MAPPING, 1, b);
        assert_eq!(&out[..1], &[34]);
        assert_eq!(&out[4..7], &[MAPPING_KEYBOARD, 38, 1]);
        assert_eq!(server.input.keysyms.syms(38), &[0x1234, NO_SYMBOL]);

        // past the last keycode
        let mut b = body();
        b.u8(250).u8(10).pad(2);
        let out = request(&mut server, c, op::GET_KEYBOARD_MAPPING, 0, b);
        assert_eq!((out[0], out[1]), (0, 2));
    }

    #[test]
    fn test_modifier_mapping_requests() {
        let mut server = test_server();
        let c = connect(&mut server);
        let out = request(&mut server, c, op::GET_MODIFIER_MAPPING, 0, body());
        assert_eq!((out[0], out[1]), (1, 2));
        assert_eq!(u32_at(&out, 4), 4);
        assert_eq!(&out[32..34], &[50, 62]);

        // one key per modifier, Shift on the right shift key only
        let mut b = body();
        b.bytes(&[62, 0, 0, 0, 0, 0, 0, 0]);
        let out = request(&mut server, c, op::SET_MODIFIER_MAPPING, 1, b);
        // MappingNotify first, then the reply
        assert_eq!(out[0], 34);
        assert_eq!((out[32], out[33]), (1, MAPPING_SUCCESS));
        assert_eq!(server.input.modifier_map.modifiers_of(50), KeyButMask::empty());

        server.handle_input(InputEvent::Key {
            keycode: 62,
            pressed: true,
        });
        assert_eq!(server.input.modifiers, KeyButMask::SHIFT);
        let mut b = body();
        b.bytes(&[0, 0, 0, 0, 0, 0, 0, 0]);
        let out = request(&mut server, c, op::SET_MODIFIER_MAPPING, 1, b);
        assert_eq!(out[1], MAPPING_BUSY);
    }

    #[test]
    fn test_pointer_mapping_requests() {
        let mut server = test_server();
        let c = connect(&mut server);
        let out = request(&mut server, c, op::GET_POINTER_MAPPING, 0, body());
        assert_eq!(out[1] as usize, NUM_BUTTONS);
        assert_eq!(&out[32..35], &[1, 2, 3]);

        let mut map: Vec<u8> = (1..=NUM_BUTTONS as u8).collect();
        map.swap(0, 2);
        let mut b = body();
        b.bytes(&map);
        let out = request(&mut server, c, op::SET_POINTER_MAPPING, NUM_BUTTONS as u8, b);
        assert_eq!((out[32], out[33]), (1, MAPPING_SUCCESS));
        assert_eq!(server.input.button_map[0], 3);

        // duplicates are rejected
        map[1] = 3;
        let mut b = body();
        b.bytes(&map);
        let out = request(&mut server, c, op::SET_POINTER_MAPPING, NUM_BUTTONS as u8, b);
        assert_eq!((out[0], out[1]), (0, 2));
    }

    #[test]
    fn test_keyboard_control_and_bell() {
        let mut server = test_server();
        let c = connect(&mut server);
        let mut b = body();
        b.u32((KbAttr::BELL_PERCENT | KbAttr::LED | KbAttr::LED_MODE).bits())
            .u32(80)
            .u32(3)
            .u32(1);
        assert!(request(&mut server, c, op::CHANGE_KEYBOARD_CONTROL, 0, b).is_empty());
        let out = request(&mut server, c, op::GET_KEYBOARD_CONTROL, 0, body());
        assert_eq!((out[0], out[1]), (1, 1));
        assert_eq!(u32_at(&out, 4), 5);
        assert_eq!(u32_at(&out, 8), 0b100);
        assert_eq!(out[13], 80);

        // a key without an auto-repeat mode
        let mut b = body();
        b.u32(KbAttr::KEY.bits()).u32(38);
        let out = request(&mut server, c, op::CHANGE_KEYBOARD_CONTROL, 0, b);
        assert_eq!((out[0], out[1]), (0, 8));

        assert!(request(&mut server, c, op::BELL, (-100i8) as u8, body()).is_empty());
        let out = request(&mut server, c, op::BELL, 101, body());
        assert_eq!((out[0], out[1]), (0, 2));
    }

    #[test]
    fn test_pointer_control_requests() {
        let mut server = test_server();
        let c = connect(&mut server);
        let mut b = body();
        b.i16(3).i16(2).i16(4).u8(1).u8(1);
        assert!(request(&mut server, c, op::CHANGE_POINTER_CONTROL, 0, b).is_empty());
        let out = request(&mut server, c, op::GET_POINTER_CONTROL, 0, body());
        assert_eq!(&out[8..14], &[3, 0, 2, 0, 4, 0]);

        let (x, y) = (server.input.x, server.input.y);
        server.handle_input(InputEvent::RelativeMotion { dx: 4, dy: 2 });
        assert_eq!((server.input.x, server.input.y), (x + 6, y + 3));

        let mut b = body();
        b.i16(1).i16(0).i16(0).u8(1).u8(0);
        let out = request(&mut server, c, op::CHANGE_POINTER_CONTROL, 0, b);
        assert_eq!((out[0], out[1]), (0, 2));
    }
}
