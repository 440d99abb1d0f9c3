//! Pointer, keyboard and focus
//!
//! Device input enters through [`Server::pointer_motion`],
//! [`Server::button_event`] and [`Server::key_event`]. Enter/leave and focus
//! events both come from the same tree walk, [`crossing_path`].

use tracing::debug;

use crate::client::ClientId;
use crate::devices::{KeyboardControl, KeySyms, ModifierMap, PointerControl};
use crate::events::{Event, InputFields};
use crate::object::{Handle, Registry};
use crate::proto::{
    EventMask, GrabStatus, KeyButMask, NotifyDetail, RevertTo, ANY_BUTTON, ANY_MODIFIER, CURRENT_TIME,
    MIN_KEYCODE, NONE, NOTIFY_NORMAL,
};
use crate::rect::Rect;
use crate::server::Server;

pub const NUM_BUTTONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    None,
    PointerRoot,
    Window(Handle),
}

/// Active pointer grab. `window`, `confine_to` and `cursor` are retained.
#[derive(Debug, Clone)]
pub struct PointerGrab {
    pub client: ClientId,
    pub window: Handle,
    pub owner_events: bool,
    pub event_mask: EventMask,
    pub confine_to: Option<Handle>,
    pub cursor: Option<Handle>,
    pub time: u32,
    /// Started by a button press; ends when the last button is released.
    pub from_button: bool,
}

pub struct Input {
    /// Pointer position in screen coordinates.
    pub x: i64,
    pub y: i64,
    /// Window under the pointer. Retained.
    pub pointer_window: Handle,
    /// Cursor currently shown. Retained.
    pub cursor: Option<Handle>,
    pub grab: Option<PointerGrab>,
    pub last_grab_time: u32,
    /// A `Focus::Window` handle is retained.
    pub focus: Focus,
    pub revert_to: RevertTo,
    pub focus_time: u32,
    /// Logical buttons held, bit `n - 1` for button `n`.
    pub buttons: u32,
    pub modifiers: KeyButMask,
    pub keymap: [u8; 32],
    /// Physical to logical button numbers; 0 disables a button.
    pub button_map: [u8; NUM_BUTTONS],
    pub keysyms: KeySyms,
    pub modifier_map: ModifierMap,
    pub keyboard_control: KeyboardControl,
    pub pointer_control: PointerControl,
}

impl Input {
    pub fn new(root: Handle, cursor: Handle, x: i64, y: i64) -> Self {
        let mut button_map = [0u8; NUM_BUTTONS];
        for (i, b) in button_map.iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        Self {
            x,
            y,
            pointer_window: root,
            cursor: Some(cursor),
            grab: None,
            last_grab_time: 0,
            focus: Focus::PointerRoot,
            revert_to: RevertTo::None,
            focus_time: 0,
            buttons: 0,
            modifiers: KeyButMask::empty(),
            keymap: [0; 32],
            button_map,
            keysyms: KeySyms::default(),
            modifier_map: ModifierMap::default(),
            keyboard_control: KeyboardControl::default(),
            pointer_control: PointerControl::default(),
        }
    }

    /// Key and button state as carried in events.
    pub fn state(&self) -> u16 {
        self.modifiers.bits() | ((self.buttons & 0xff) << 8) as u16
    }

    pub fn key_down(&self, keycode: u8) -> bool {
        self.keymap[keycode as usize / 8] & (1 << (keycode % 8)) != 0
    }

    fn set_key(&mut self, keycode: u8, down: bool) {
        let bit = 1 << (keycode % 8);
        if down {
            self.keymap[keycode as usize / 8] |= bit;
        } else {
            self.keymap[keycode as usize / 8] &= !bit;
        }
        if !self.modifier_map.modifiers_of(keycode).is_empty() {
            self.recompute_modifiers();
        }
    }

    /// Derive the modifier state from held keys and the modifier map.
    pub fn recompute_modifiers(&mut self) {
        for i in 0..8 {
            let held = self
                .modifier_map
                .row(i)
                .iter()
                .any(|&k| k != 0 && self.key_down(k));
            self.modifiers.set(KeyButMask::from_bits_truncate(1 << i), held);
        }
    }

    /// Keymap bytes for keycodes 8 to 255.
    pub fn keymap_keys(&self) -> [u8; 31] {
        let mut keys = [0u8; 31];
        keys.copy_from_slice(&self.keymap[1..]);
        keys
    }
}

/// One step of a crossing or focus transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub window: Handle,
    pub detail: NotifyDetail,
    pub enter: bool,
}

/// Leave and enter steps for moving from `from` to `to`, in delivery order.
/// `None` lies outside the tree, above the root.
pub fn crossing_path(reg: &Registry, from: Option<Handle>, to: Option<Handle>) -> Vec<Crossing> {
    let mut out = Vec::new();
    if from == to {
        return out;
    }
    let common = reg.common_ancestor(from, to);
    // strict ancestors of `w` below `stop`, nearest first
    let between = |w: Handle, stop: Option<Handle>| -> Vec<Handle> {
        reg.ancestors(w).into_iter().take_while(|&a| Some(a) != stop).collect()
    };
    let leave = |window, detail| Crossing {
        window,
        detail,
        enter: false,
    };
    let enter = |window, detail| Crossing {
        window,
        detail,
        enter: true,
    };

    match (from, to) {
        (Some(f), Some(t)) if common == Some(t) => {
            out.push(leave(f, NotifyDetail::Ancestor));
            out.extend(between(f, Some(t)).into_iter().map(|w| leave(w, NotifyDetail::Virtual)));
            out.push(enter(t, NotifyDetail::Inferior));
        }
        (Some(f), Some(t)) if common == Some(f) => {
            out.push(leave(f, NotifyDetail::Inferior));
            out.extend(between(t, Some(f)).into_iter().rev().map(|w| enter(w, NotifyDetail::Virtual)));
            out.push(enter(t, NotifyDetail::Ancestor));
        }
        _ => {
            if let Some(f) = from {
                out.push(leave(f, NotifyDetail::Nonlinear));
                out.extend(between(f, common).into_iter().map(|w| leave(w, NotifyDetail::NonlinearVirtual)));
            }
            if let Some(t) = to {
                out.extend(
                    between(t, common)
                        .into_iter()
                        .rev()
                        .map(|w| enter(w, NotifyDetail::NonlinearVirtual)),
                );
                out.push(enter(t, NotifyDetail::Nonlinear));
            }
        }
    }
    out
}

impl Server {
    fn input_fields(&self, window: Handle, child: Option<Handle>, detail: u8) -> InputFields {
        let (ox, oy) = self.objects.interior_origin(window);
        InputFields {
            detail,
            time: self.now(),
            root: self.screen.root,
            event: self.objects.id(window),
            child: child.map_or(NONE, |c| self.objects.id(c)),
            root_x: self.input.x as i16,
            root_y: self.input.y as i16,
            event_x: (self.input.x - ox) as i16,
            event_y: (self.input.y - oy) as i16,
            state: self.input.state(),
        }
    }

    /// Deliver a device event to the first window from `start` upwards that
    /// some client selects it on. Returns that window.
    fn propagate(
        &mut self,
        start: Handle,
        mask: EventMask,
        make: fn(InputFields) -> Event,
        detail: u8,
    ) -> Option<Handle> {
        let mut child = None;
        let mut cur = Some(start);
        while let Some(w) = cur {
            if self.objects.all_event_masks(w).intersects(mask) {
                let event = make(self.input_fields(w, child, detail));
                self.deliver(w, mask, &event);
                return Some(w);
            }
            if self.objects.window(w).attributes.do_not_propagate as u32 & mask.bits() != 0 {
                return None;
            }
            child = Some(w);
            cur = self.objects.parent(w);
        }
        None
    }

    /// Route a pointer event to the grabbing client. Returns false when no
    /// grab takes it.
    fn deliver_grabbed(&mut self, mask: EventMask, make: fn(InputFields) -> Event, detail: u8) -> bool {
        let Some(grab) = self.input.grab.clone() else {
            return false;
        };
        if grab.owner_events {
            let mut child = None;
            let mut cur = Some(self.input.pointer_window);
            while let Some(w) = cur {
                if self.objects.window(w).mask_for(grab.client).intersects(mask) {
                    let event = make(self.input_fields(w, child, detail));
                    self.send_event(grab.client, &event);
                    return true;
                }
                child = Some(w);
                cur = self.objects.parent(w);
            }
        }
        if grab.event_mask.intersects(mask) {
            let event = make(self.input_fields(grab.window, None, detail));
            self.send_event(grab.client, &event);
            return true;
        }
        false
    }

    fn keymap_notify(&mut self, window: Handle) {
        let event = Event::KeymapNotify {
            keys: self.input.keymap_keys(),
        };
        self.deliver(window, EventMask::KEYMAP_STATE, &event);
    }

    fn focus_window(&self) -> Option<Handle> {
        match self.input.focus {
            Focus::None => None,
            Focus::PointerRoot => Some(self.root),
            Focus::Window(h) => Some(h),
        }
    }

    /// `window` is the focus window or one of its inferiors.
    fn has_focus(&self, window: Handle) -> bool {
        self.focus_window()
            .is_some_and(|f| f == window || self.objects.is_inferior(window, f))
    }

    fn send_crossings(&mut self, from: Option<Handle>, to: Option<Handle>) {
        for step in crossing_path(&self.objects, from, to) {
            let fields = self.input_fields(step.window, None, step.detail as u8);
            let focus = self.has_focus(step.window);
            if step.enter {
                let event = Event::EnterNotify {
                    fields,
                    mode: NOTIFY_NORMAL,
                    focus,
                };
                self.deliver(step.window, EventMask::ENTER_WINDOW, &event);
                self.keymap_notify(step.window);
            } else {
                let event = Event::LeaveNotify {
                    fields,
                    mode: NOTIFY_NORMAL,
                    focus,
                };
                self.deliver(step.window, EventMask::LEAVE_WINDOW, &event);
            }
        }
    }

    fn cursor_rect(&self) -> Option<Rect> {
        let overlay = self.cursor_overlay()?;
        Some(self.objects.cursor_bounds(overlay.cursor).translate(overlay.x, overlay.y))
    }

    pub(crate) fn damage_cursor(&mut self) {
        if let Some(r) = self.cursor_rect() {
            self.redraw(r);
        }
    }

    /// Show the grab cursor, or the pointer window's inherited cursor.
    pub(crate) fn update_cursor(&mut self) {
        let cursor = self
            .input
            .grab
            .as_ref()
            .and_then(|g| g.cursor)
            .or_else(|| self.objects.effective_cursor(self.input.pointer_window));
        if cursor == self.input.cursor {
            return;
        }
        self.damage_cursor();
        if let Some(c) = cursor {
            self.objects.retain(c);
        }
        if let Some(old) = std::mem::replace(&mut self.input.cursor, cursor) {
            self.objects.release(old);
        }
        self.damage_cursor();
    }

    /// Move the pointer to screen `(x, y)`.
    pub fn pointer_motion(&mut self, x: i64, y: i64) {
        let mut bounds = self.framebuffer.bounds();
        if let Some(c) = self.input.grab.as_ref().and_then(|g| g.confine_to) {
            let r = self.objects.full_rect(c).intersect(&bounds);
            if !r.is_empty() {
                bounds = r;
            }
        }
        let x = x.clamp(bounds.left, bounds.right - 1);
        let y = y.clamp(bounds.top, bounds.bottom - 1);
        let moved = (x, y) != (self.input.x, self.input.y);
        if moved {
            self.damage_cursor();
            self.input.x = x;
            self.input.y = y;
            self.damage_cursor();
        }

        let hit = self.objects.window_at(self.root, x, y);
        let old = self.input.pointer_window;
        if hit != old {
            self.send_crossings(Some(old), Some(hit));
            self.objects.retain(hit);
            self.input.pointer_window = hit;
            self.objects.release(old);
        }

        if moved {
            let mut mask = EventMask::POINTER_MOTION;
            let held = self.input.buttons & 0x1f;
            if held != 0 {
                mask |= EventMask::BUTTON_MOTION;
                mask |= EventMask::from_bits_retain(held << EventMask::BUTTON1_MOTION.bits().trailing_zeros());
            }
            if !self.deliver_grabbed(mask, Event::MotionNotify, 0) {
                self.propagate(hit, mask, Event::MotionNotify, 0);
            }
        }
        self.update_cursor();
    }

    /// Re-evaluate the pointer window after the tree changed.
    pub(crate) fn refresh_pointer(&mut self) {
        let (x, y) = (self.input.x, self.input.y);
        self.pointer_motion(x, y);
    }

    pub fn button_event(&mut self, physical: u8, pressed: bool) {
        if physical == 0 || physical as usize > NUM_BUTTONS {
            return;
        }
        let button = self.input.button_map[physical as usize - 1];
        if button == 0 {
            return;
        }
        let bit = 1u32 << (button - 1);
        let pointer = self.input.pointer_window;

        if pressed {
            if self.input.buttons & bit != 0 {
                return;
            }
            if self.input.grab.is_none() {
                self.activate_button_grab(button);
            }
            if !self.deliver_grabbed(EventMask::BUTTON_PRESS, Event::ButtonPress, button) {
                let delivered = self.propagate(pointer, EventMask::BUTTON_PRESS, Event::ButtonPress, button);
                if let (Some(w), None) = (delivered, &self.input.grab) {
                    self.implicit_grab(w);
                }
            }
            self.input.buttons |= bit;
        } else {
            if self.input.buttons & bit == 0 {
                return;
            }
            if !self.deliver_grabbed(EventMask::BUTTON_RELEASE, Event::ButtonRelease, button) {
                self.propagate(pointer, EventMask::BUTTON_RELEASE, Event::ButtonRelease, button);
            }
            self.input.buttons &= !bit;
            if self.input.buttons == 0 && self.input.grab.as_ref().is_some_and(|g| g.from_button) {
                self.ungrab_pointer();
            }
        }
    }

    /// Activate the outermost passive grab matching `button` and the current
    /// modifiers, from the root down to the pointer window.
    fn activate_button_grab(&mut self, button: u8) {
        let modifiers = self.input.modifiers.bits();
        let mut path = self.objects.ancestors(self.input.pointer_window);
        path.reverse();
        path.push(self.input.pointer_window);
        for w in path {
            let found = self
                .objects
                .window(w)
                .button_grabs
                .iter()
                .find(|g| {
                    (g.button == button || g.button == ANY_BUTTON)
                        && (g.modifiers == ANY_MODIFIER || g.modifiers == modifiers)
                })
                .cloned();
            if let Some(g) = found {
                if g.confine_to.is_some_and(|c| !self.objects.viewable(c)) {
                    continue;
                }
                debug!(client = g.client.0, button, "passive grab activated");
                let time = self.now();
                self.start_grab(PointerGrab {
                    client: g.client,
                    window: w,
                    owner_events: g.owner_events,
                    event_mask: g.event_mask,
                    confine_to: g.confine_to,
                    cursor: g.cursor,
                    time,
                    from_button: true,
                });
                return;
            }
        }
    }

    /// A delivered press grabs the pointer for the receiving client until
    /// all buttons are up.
    fn implicit_grab(&mut self, window: Handle) {
        let Some(sub) = self
            .objects
            .window(window)
            .events
            .iter()
            .find(|s| s.mask.contains(EventMask::BUTTON_PRESS))
            .copied()
        else {
            return;
        };
        let time = self.now();
        self.start_grab(PointerGrab {
            client: sub.client,
            window,
            owner_events: sub.mask.contains(EventMask::OWNER_GRAB_BUTTON),
            event_mask: sub.mask,
            confine_to: None,
            cursor: None,
            time,
            from_button: true,
        });
    }

    fn start_grab(&mut self, grab: PointerGrab) {
        self.drop_grab();
        for h in std::iter::once(grab.window).chain(grab.confine_to).chain(grab.cursor) {
            self.objects.retain(h);
        }
        self.input.last_grab_time = grab.time;
        self.input.grab = Some(grab);
        self.update_cursor();
    }

    fn drop_grab(&mut self) -> bool {
        let Some(grab) = self.input.grab.take() else {
            return false;
        };
        self.objects.release(grab.window);
        self.release_grab_refs(grab.confine_to, grab.cursor);
        true
    }

    #[allow(clippy::too_many_arguments)]
    pub fn grab_pointer(
        &mut self,
        client: ClientId,
        window: Handle,
        owner_events: bool,
        event_mask: EventMask,
        confine_to: Option<Handle>,
        cursor: Option<Handle>,
        time: u32,
    ) -> GrabStatus {
        if self.input.grab.as_ref().is_some_and(|g| g.client != client) {
            return GrabStatus::AlreadyGrabbed;
        }
        if !self.objects.viewable(window) || confine_to.is_some_and(|c| !self.objects.viewable(c)) {
            return GrabStatus::NotViewable;
        }
        let now = self.now();
        let time = if time == CURRENT_TIME { now } else { time };
        if time < self.input.last_grab_time || time > now {
            return GrabStatus::InvalidTime;
        }
        self.start_grab(PointerGrab {
            client,
            window,
            owner_events,
            event_mask,
            confine_to,
            cursor,
            time,
            from_button: false,
        });
        if confine_to.is_some() {
            self.refresh_pointer();
        }
        GrabStatus::Success
    }

    /// Release the pointer grab, if any.
    pub fn ungrab_pointer(&mut self) {
        if self.drop_grab() {
            self.refresh_pointer();
        }
    }

    pub fn key_event(&mut self, keycode: u8, pressed: bool) {
        if keycode < MIN_KEYCODE {
            return;
        }
        let pointer = self.input.pointer_window;
        let target = match self.input.focus {
            Focus::None => None,
            Focus::PointerRoot => Some(pointer),
            Focus::Window(f) if pointer == f || self.objects.is_inferior(pointer, f) => Some(pointer),
            Focus::Window(f) => Some(f),
        };
        if let Some(w) = target {
            let (mask, make): (EventMask, fn(InputFields) -> Event) = if pressed {
                (EventMask::KEY_PRESS, Event::KeyPress)
            } else {
                (EventMask::KEY_RELEASE, Event::KeyRelease)
            };
            self.propagate(w, mask, make, keycode);
        }
        self.input.set_key(keycode, pressed);
    }

    pub fn set_focus(&mut self, focus: Focus, revert_to: RevertTo, time: u32) {
        let from = self.focus_window();
        let to = match focus {
            Focus::None => None,
            Focus::PointerRoot => Some(self.root),
            Focus::Window(h) => Some(h),
        };
        for step in crossing_path(&self.objects, from, to) {
            let event_window = self.objects.id(step.window);
            let detail = step.detail as u8;
            if step.enter {
                let event = Event::FocusIn {
                    detail,
                    event: event_window,
                    mode: NOTIFY_NORMAL,
                };
                self.deliver(step.window, EventMask::FOCUS_CHANGE, &event);
                self.keymap_notify(step.window);
            } else {
                let event = Event::FocusOut {
                    detail,
                    event: event_window,
                    mode: NOTIFY_NORMAL,
                };
                self.deliver(step.window, EventMask::FOCUS_CHANGE, &event);
            }
        }
        if let Focus::Window(h) = focus {
            self.objects.retain(h);
        }
        if let Focus::Window(old) = std::mem::replace(&mut self.input.focus, focus) {
            self.objects.release(old);
        }
        self.input.revert_to = revert_to;
        self.input.focus_time = time;
    }

    fn revert_focus(&mut self, lost: Handle) {
        let time = self.now();
        match self.input.revert_to {
            RevertTo::Parent => {
                let target = self
                    .objects
                    .ancestors(lost)
                    .into_iter()
                    .find(|&a| self.objects.viewable(a));
                let focus = target.map_or(Focus::None, Focus::Window);
                self.set_focus(focus, RevertTo::None, time);
            }
            RevertTo::PointerRoot => self.set_focus(Focus::PointerRoot, RevertTo::PointerRoot, time),
            RevertTo::None => self.set_focus(Focus::None, RevertTo::None, time),
        }
    }

    /// `window` just stopped being viewable: drop grabs and focus that
    /// depended on it and move the pointer out.
    pub(crate) fn window_hidden(&mut self, window: Handle) {
        let within = |reg: &Registry, w: Handle| w == window || reg.is_inferior(w, window);
        let grab_lost = self.input.grab.as_ref().is_some_and(|g| {
            within(&self.objects, g.window) || g.confine_to.is_some_and(|c| within(&self.objects, c))
        });
        if grab_lost {
            self.drop_grab();
        }
        if let Focus::Window(f) = self.input.focus {
            if within(&self.objects, f) {
                self.revert_focus(f);
            }
        }
        self.refresh_pointer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::{connect, test_server};
    use crate::window::tests::add_window;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn events(server: &mut Server, client: ClientId) -> Vec<[u8; 32]> {
        let out = server.clients.get_mut(&client).unwrap().take_output();
        out.chunks(32).map(|c| c.try_into().unwrap()).collect()
    }

    #[test]
    fn test_crossing_symmetry() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let mut all = vec![root];
        let mut rng = StdRng::seed_from_u64(7);
        for id in 2..40 {
            let parent = all[rng.gen_range(0..all.len())];
            all.push(add_window(&mut reg, id, Some(parent), 0, 0, 10, 10, 0));
        }
        let pick = |rng: &mut StdRng| {
            if rng.gen_ratio(1, 10) {
                None
            } else {
                Some(all[rng.gen_range(0..all.len())])
            }
        };
        for _ in 0..500 {
            let (a, b) = (pick(&mut rng), pick(&mut rng));
            let forward = crossing_path(&reg, a, b);
            if a == b {
                assert!(forward.is_empty());
                continue;
            }
            let mut mirrored: Vec<Crossing> = crossing_path(&reg, b, a)
                .into_iter()
                .map(|c| Crossing { enter: !c.enter, ..c })
                .collect();
            mirrored.reverse();
            assert_eq!(forward, mirrored);
            let enters = forward.iter().filter(|c| c.enter).count();
            let leaves = forward.len() - enters;
            assert!(b.is_none() || enters >= 1);
            assert!(a.is_none() || leaves >= 1);
        }
    }

    #[test]
    fn test_crossing_into_inferior() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let a = add_window(&mut reg, 2, Some(root), 0, 0, 50, 50, 0);
        let b = add_window(&mut reg, 3, Some(a), 0, 0, 20, 20, 0);
        let c = add_window(&mut reg, 4, Some(b), 0, 0, 5, 5, 0);
        let path = crossing_path(&reg, Some(root), Some(c));
        let steps: Vec<_> = path.iter().map(|s| (s.window, s.detail, s.enter)).collect();
        assert_eq!(
            steps,
            vec![
                (root, NotifyDetail::Inferior, false),
                (a, NotifyDetail::Virtual, true),
                (b, NotifyDetail::Virtual, true),
                (c, NotifyDetail::Ancestor, true),
            ]
        );
    }

    #[test]
    fn test_enter_on_motion() {
        let mut server = test_server();
        let client = connect(&mut server);
        let root = server.root;
        let w = add_window(&mut server.objects, 0x800001, Some(root), 10, 10, 50, 50, 0);
        server
            .objects
            .window_mut(w)
            .set_mask(client, EventMask::ENTER_WINDOW | EventMask::LEAVE_WINDOW);
        server.pointer_motion(20, 25);
        assert_eq!(server.input.pointer_window, w);
        let evs = events(&mut server, client);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0][0], 7);
        assert_eq!(evs[0][1], NotifyDetail::Ancestor as u8);
        // event_x/event_y relative to w
        assert_eq!(i16::from_le_bytes([evs[0][24], evs[0][25]]), 10);
        assert_eq!(i16::from_le_bytes([evs[0][26], evs[0][27]]), 15);

        server.pointer_motion(200, 200);
        let evs = events(&mut server, client);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0][0], 8);
    }

    #[test]
    fn test_already_grabbed() {
        let mut server = test_server();
        let a = connect(&mut server);
        let b = connect(&mut server);
        let root = server.root;
        let status = server.grab_pointer(a, root, false, EventMask::BUTTON_PRESS, None, None, CURRENT_TIME);
        assert_eq!(status, GrabStatus::Success);
        let status = server.grab_pointer(b, root, false, EventMask::BUTTON_PRESS, None, None, CURRENT_TIME);
        assert_eq!(status, GrabStatus::AlreadyGrabbed);
        // the holder may replace its own grab
        let status = server.grab_pointer(a, root, true, EventMask::empty(), None, None, CURRENT_TIME);
        assert_eq!(status, GrabStatus::Success);
        server.ungrab_pointer();
        server.ungrab_pointer();
        let status = server.grab_pointer(b, root, false, EventMask::BUTTON_PRESS, None, None, CURRENT_TIME);
        assert_eq!(status, GrabStatus::Success);
        assert_eq!(server.input.grab.as_ref().unwrap().client, b);
    }

    #[test]
    fn test_grab_rejects_unviewable_and_future_time() {
        let mut server = test_server();
        let a = connect(&mut server);
        let root = server.root;
        let w = add_window(&mut server.objects, 0x800001, Some(root), 0, 0, 10, 10, 0);
        server.objects.window_mut(w).mapped = false;
        let status = server.grab_pointer(a, w, false, EventMask::empty(), None, None, CURRENT_TIME);
        assert_eq!(status, GrabStatus::NotViewable);
        let future = server.now() + 60_000;
        let status = server.grab_pointer(a, root, false, EventMask::empty(), None, None, future);
        assert_eq!(status, GrabStatus::InvalidTime);
        assert!(server.input.grab.is_none());
    }

    #[test]
    fn test_press_grabs_until_release() {
        let mut server = test_server();
        let client = connect(&mut server);
        let root = server.root;
        let w = add_window(&mut server.objects, 0x800001, Some(root), 0, 0, 100, 100, 0);
        server
            .objects
            .window_mut(w)
            .set_mask(client, EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE);
        server.pointer_motion(50, 50);
        server.button_event(1, true);
        assert!(server.input.grab.as_ref().is_some_and(|g| g.window == w));
        // release outside the window still reaches the grabbing client
        server.pointer_motion(200, 200);
        server.button_event(1, false);
        assert!(server.input.grab.is_none());
        let evs = events(&mut server, client);
        let codes: Vec<u8> = evs.iter().map(|e| e[0]).collect();
        assert_eq!(codes, vec![4, 5]);
        // the release carries button 1 in its state
        assert_eq!(u16::from_le_bytes([evs[1][28], evs[1][29]]), 0x100);
    }

    #[test]
    fn test_key_state_and_focus() {
        let mut server = test_server();
        let client = connect(&mut server);
        let root = server.root;
        let w = add_window(&mut server.objects, 0x800001, Some(root), 200, 200, 50, 30, 0);
        server.objects.window_mut(w).set_mask(client, EventMask::KEY_PRESS);
        server.set_focus(Focus::Window(w), RevertTo::Parent, 0);
        server.key_event(50, true);
        server.key_event(38, true);
        assert!(server.input.key_down(38));
        assert_eq!(server.input.modifiers, KeyButMask::SHIFT);
        let evs = events(&mut server, client);
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[1][0], 2);
        assert_eq!(evs[1][1], 38);
        assert_eq!(u16::from_le_bytes([evs[1][28], evs[1][29]]), KeyButMask::SHIFT.bits());
        server.key_event(50, false);
        assert!(server.input.modifiers.is_empty());
    }

    #[test]
    fn test_focus_reverts_to_parent() {
        let mut server = test_server();
        let root = server.root;
        let p = add_window(&mut server.objects, 0x800001, Some(root), 0, 0, 100, 100, 0);
        let w = add_window(&mut server.objects, 0x800002, Some(p), 0, 0, 10, 10, 0);
        server.set_focus(Focus::Window(w), RevertTo::Parent, 0);
        server.objects.window_mut(w).mapped = false;
        server.window_hidden(w);
        assert_eq!(server.input.focus, Focus::Window(p));
        assert_eq!(server.input.revert_to, RevertTo::None);
        server.objects.window_mut(p).mapped = false;
        server.window_hidden(p);
        assert_eq!(server.input.focus, Focus::None);
    }

    #[test]
    fn test_unmap_drops_grab() {
        let mut server = test_server();
        let client = connect(&mut server);
        let root = server.root;
        let w = add_window(&mut server.objects, 0x800001, Some(root), 0, 0, 100, 100, 0);
        assert_eq!(
            server.grab_pointer(client, w, false, EventMask::empty(), None, None, CURRENT_TIME),
            GrabStatus::Success
        );
        server.objects.window_mut(w).mapped = false;
        server.window_hidden(w);
        assert!(server.input.grab.is_none());
        assert_eq!(server.input.pointer_window, root);
    }

    #[test]
    fn test_modifier_state_follows_map() {
        let mut server = test_server();
        server.key_event(50, true);
        assert_eq!(server.input.modifiers, KeyButMask::SHIFT);
        server.key_event(62, true);
        server.key_event(50, false);
        assert_eq!(server.input.modifiers, KeyButMask::SHIFT, "right shift still held");
        server.key_event(62, false);
        assert!(server.input.modifiers.is_empty());

        // a remapped key drives the modifier once the map changes
        server.key_event(38, true);
        assert!(server.input.modifiers.is_empty());
        server.input.modifier_map = ModifierMap::new(1, vec![38, 0, 0, 0, 0, 0, 0, 0]);
        server.input.recompute_modifiers();
        assert_eq!(server.input.modifiers, KeyButMask::SHIFT);
    }
}
