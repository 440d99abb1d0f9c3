//! Window tree
//!
//! A window is a drawable with a place in the tree. Children are ordered
//! front to back. Parent links are plain handles; the parent always outlives
//! its children because destruction is bottom-up.

use crate::client::ClientId;
use crate::drawable::Drawable;
use crate::object::{Handle, Registry};
use crate::proto::{EventMask, Gravity};
use crate::rect::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WindowClass {
    InputOutput = 1,
    InputOnly = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    None,
    ParentRelative,
    Pixel(u32),
    Pixmap(Handle),
}

impl Background {
    pub fn take_pixmap(&mut self) -> Option<Handle> {
        match std::mem::take(self) {
            Background::Pixmap(h) => Some(h),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    Pixel(u32),
    Pixmap(Handle),
}

impl Border {
    pub fn take_pixmap(&mut self) -> Option<Handle> {
        match *self {
            Border::Pixmap(h) => {
                *self = Border::Pixel(0);
                Some(h)
            }
            Border::Pixel(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowAttributes {
    pub background: Background,
    pub border: Border,
    pub bit_gravity: Gravity,
    pub win_gravity: Gravity,
    pub backing_store: u8,
    pub backing_planes: u32,
    pub backing_pixel: u32,
    pub override_redirect: bool,
    pub save_under: bool,
    pub do_not_propagate: u16,
    pub colormap: Option<Handle>,
    pub cursor: Option<Handle>,
}

impl Default for WindowAttributes {
    fn default() -> Self {
        Self {
            background: Background::None,
            border: Border::Pixel(0),
            bit_gravity: Gravity::Forget,
            win_gravity: Gravity::NorthWest,
            backing_store: 0,
            backing_planes: u32::MAX,
            backing_pixel: 0,
            override_redirect: false,
            save_under: false,
            do_not_propagate: 0,
            colormap: None,
            cursor: None,
        }
    }
}

/// One client's selection of events on a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSub {
    pub client: ClientId,
    pub mask: EventMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: u32,
    pub type_: u32,
    pub format: u8,
    pub data: Vec<u8>,
}

impl Property {
    /// Length in format units.
    pub fn items(&self) -> u32 {
        match self.format {
            8 => self.data.len() as u32,
            16 => (self.data.len() / 2) as u32,
            _ => (self.data.len() / 4) as u32,
        }
    }
}

/// Passive grab registered by GrabButton.
#[derive(Debug, Clone)]
pub struct ButtonGrab {
    pub client: ClientId,
    pub button: u8,
    pub modifiers: u16,
    pub owner_events: bool,
    pub event_mask: EventMask,
    pub pointer_mode: u8,
    pub keyboard_mode: u8,
    pub confine_to: Option<Handle>,
    pub cursor: Option<Handle>,
}

#[derive(Debug)]
pub struct Window {
    pub drawable: Drawable,
    pub parent: Option<Handle>,
    /// Front first.
    pub children: Vec<Handle>,
    pub tree_depth: u32,
    pub x: i16,
    pub y: i16,
    pub border_width: u16,
    pub class: WindowClass,
    pub visual: u32,
    pub attributes: WindowAttributes,
    pub mapped: bool,
    pub events: Vec<EventSub>,
    pub properties: Vec<Property>,
    pub button_grabs: Vec<ButtonGrab>,
}

impl Window {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        drawable: Drawable,
        parent: Option<Handle>,
        tree_depth: u32,
        x: i16,
        y: i16,
        border_width: u16,
        class: WindowClass,
        visual: u32,
    ) -> Self {
        Self {
            drawable,
            parent,
            children: Vec::new(),
            tree_depth,
            x,
            y,
            border_width,
            class,
            visual,
            attributes: WindowAttributes::default(),
            mapped: false,
            events: Vec::new(),
            properties: Vec::new(),
            button_grabs: Vec::new(),
        }
    }

    pub fn width(&self) -> u16 {
        self.drawable.width
    }

    pub fn height(&self) -> u16 {
        self.drawable.height
    }

    /// Border-inclusive rectangle in the parent's interior coordinates.
    pub fn outer_rect(&self) -> Rect {
        let b = self.border_width as i64;
        Rect::new(
            self.x as i64,
            self.y as i64,
            self.width() as i64 + 2 * b,
            self.height() as i64 + 2 * b,
        )
    }

    /// Interior rectangle in the window's own coordinates.
    pub fn interior(&self) -> Rect {
        Rect::new(0, 0, self.width() as i64, self.height() as i64)
    }

    pub fn mask_for(&self, client: ClientId) -> EventMask {
        self.events
            .iter()
            .find(|s| s.client == client)
            .map(|s| s.mask)
            .unwrap_or_default()
    }

    /// Replace `client`'s selection; an empty mask removes it.
    pub fn set_mask(&mut self, client: ClientId, mask: EventMask) {
        match self.events.iter().position(|s| s.client == client) {
            Some(i) if mask.is_empty() => {
                self.events.remove(i);
            }
            Some(i) => self.events[i].mask = mask,
            None if mask.is_empty() => {}
            None => self.events.push(EventSub { client, mask }),
        }
    }

    /// The background pixel used to fill newly exposed areas.
    pub fn background_pixel(&self) -> Option<u32> {
        match self.attributes.background {
            Background::Pixel(p) => Some(p),
            _ => None,
        }
    }

    pub fn property(&self, name: u32) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Tree queries. These walk parent links iteratively and never take
/// references.
impl Registry {
    pub fn parent(&self, h: Handle) -> Option<Handle> {
        self.window(h).parent
    }

    /// Strict ancestors of `h`, nearest first.
    pub fn ancestors(&self, h: Handle) -> Vec<Handle> {
        let mut out = Vec::new();
        let mut cur = self.parent(h);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    /// Mapped, with every ancestor mapped.
    pub fn viewable(&self, h: Handle) -> bool {
        let mut cur = Some(h);
        while let Some(w) = cur {
            let win = self.window(w);
            if !win.mapped {
                return false;
            }
            cur = win.parent;
        }
        true
    }

    /// True if `h` is a strict descendant of `of`.
    pub fn is_inferior(&self, h: Handle, of: Handle) -> bool {
        let mut cur = self.parent(h);
        while let Some(p) = cur {
            if p == of {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Deepest window that is `a` or an ancestor of `a`, and likewise of `b`.
    /// `None` on either side is outside the tree.
    pub fn common_ancestor(&self, a: Option<Handle>, b: Option<Handle>) -> Option<Handle> {
        let (mut a, mut b) = (a?, b?);
        while self.window(a).tree_depth > self.window(b).tree_depth {
            a = self.parent(a)?;
        }
        while self.window(b).tree_depth > self.window(a).tree_depth {
            b = self.parent(b)?;
        }
        while a != b {
            a = self.parent(a)?;
            b = self.parent(b)?;
        }
        Some(a)
    }

    /// Screen position of the interior origin of `h`.
    pub fn interior_origin(&self, h: Handle) -> (i64, i64) {
        let (mut x, mut y) = (0i64, 0i64);
        let mut cur = Some(h);
        while let Some(w) = cur {
            let win = self.window(w);
            let b = win.border_width as i64;
            x += win.x as i64 + b;
            y += win.y as i64 + b;
            cur = win.parent;
        }
        (x, y)
    }

    /// Border-inclusive rectangle of `h` in screen coordinates, clipped by
    /// every ancestor's interior. Empty if an ancestor is unmapped.
    pub fn full_rect(&self, h: Handle) -> Rect {
        let win = self.window(h);
        let mut r = win.outer_rect();
        let mut cur = win.parent;
        while let Some(p) = cur {
            let parent = self.window(p);
            if !parent.mapped {
                return Rect::EMPTY;
            }
            r = r.intersect(&parent.interior());
            if r.is_empty() {
                return Rect::EMPTY;
            }
            let b = parent.border_width as i64;
            r = r.translate(parent.x as i64 + b, parent.y as i64 + b);
            cur = parent.parent;
        }
        r
    }

    /// Topmost viewable window under screen point `(x, y)`, starting at
    /// `root`.
    pub fn window_at(&self, root: Handle, x: i64, y: i64) -> Handle {
        let mut hit = root;
        // point in the interior coordinates of `hit`
        let (mut px, mut py) = (x, y);
        'descend: loop {
            let win = self.window(hit);
            if !win.interior().contains_point(px, py) {
                return hit;
            }
            for &child in &win.children {
                let c = self.window(child);
                if c.mapped && c.outer_rect().contains_point(px, py) {
                    let b = c.border_width as i64;
                    px -= c.x as i64 + b;
                    py -= c.y as i64 + b;
                    hit = child;
                    continue 'descend;
                }
            }
            return hit;
        }
    }

    /// Cursor attribute of `h` or its nearest ancestor that has one.
    pub fn effective_cursor(&self, h: Handle) -> Option<Handle> {
        let mut cur = Some(h);
        while let Some(w) = cur {
            let win = self.window(w);
            if win.attributes.cursor.is_some() {
                return win.attributes.cursor;
            }
            cur = win.parent;
        }
        None
    }

    /// Recompute `tree_depth` for `h` and its whole subtree.
    pub fn update_tree_depth(&mut self, h: Handle) {
        let depth = match self.parent(h) {
            Some(p) => self.window(p).tree_depth + 1,
            None => 0,
        };
        let mut stack = vec![(h, depth)];
        while let Some((w, d)) = stack.pop() {
            let win = self.window_mut(w);
            win.tree_depth = d;
            stack.extend(win.children.iter().map(|&c| (c, d + 1)));
        }
    }

    /// Every window in the subtree of `h`, `h` included, parents before
    /// children.
    pub fn subtree(&self, h: Handle) -> Vec<Handle> {
        let mut out = vec![h];
        let mut i = 0;
        while i < out.len() {
            out.extend(self.window(out[i]).children.iter().copied());
            i += 1;
        }
        out
    }

    /// Unlink `child` from its parent's child list.
    pub fn detach(&mut self, child: Handle) {
        if let Some(p) = self.parent(child) {
            self.window_mut(p).children.retain(|&c| c != child);
        }
        self.window_mut(child).parent = None;
    }

    /// Make `child` the frontmost child of `parent`.
    pub fn attach_front(&mut self, parent: Handle, child: Handle) {
        self.window_mut(parent).children.insert(0, child);
        self.window_mut(child).parent = Some(parent);
        self.update_tree_depth(child);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::object::ObjectKind;

    pub(crate) fn add_window(
        reg: &mut Registry,
        id: u32,
        parent: Option<Handle>,
        x: i16,
        y: i16,
        w: u16,
        h: u16,
        border: u16,
    ) -> Handle {
        let depth = parent.map_or(0, |p| reg.window(p).tree_depth + 1);
        let drawable = Drawable::new(w, h, 24, 1, 0).unwrap();
        let mut win = Window::new(drawable, parent, depth, x, y, border, WindowClass::InputOutput, 0x21);
        win.mapped = true;
        let handle = reg.insert(id, None, ObjectKind::Window(Box::new(win)));
        if let Some(p) = parent {
            reg.window_mut(p).children.insert(0, handle);
        }
        handle
    }

    #[test]
    fn test_tree_depth_after_reparent() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let a = add_window(&mut reg, 2, Some(root), 0, 0, 50, 50, 0);
        let b = add_window(&mut reg, 3, Some(a), 0, 0, 10, 10, 0);
        let c = add_window(&mut reg, 4, Some(b), 0, 0, 5, 5, 0);
        assert_eq!(reg.window(c).tree_depth, 3);
        reg.detach(b);
        reg.attach_front(root, b);
        assert_eq!(reg.window(b).tree_depth, 1);
        assert_eq!(reg.window(c).tree_depth, 2);
        assert_eq!(reg.window(root).children, vec![b, a]);
        for w in reg.subtree(root) {
            if let Some(p) = reg.parent(w) {
                assert_eq!(reg.window(w).tree_depth, reg.window(p).tree_depth + 1);
            }
        }
    }

    #[test]
    fn test_full_rect_is_clipped_by_ancestors() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 200, 200, 0);
        let a = add_window(&mut reg, 2, Some(root), 10, 10, 50, 40, 2);
        let b = add_window(&mut reg, 3, Some(a), -5, 30, 100, 100, 1);
        assert_eq!(reg.full_rect(a), Rect::new(10, 10, 54, 44));
        // b starts at a's interior (-5, 30), clipped to a's 50x40 interior
        assert_eq!(reg.full_rect(b), Rect::new(12, 42, 50, 10));
        assert!(reg.full_rect(a).contains(&reg.full_rect(b)));
    }

    #[test]
    fn test_full_rect_subset_of_parent() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 64, 48, 0);
        let cases: [(i16, i16, u16, u16, u16); 6] = [
            (-20, -20, 10, 10, 0),
            (-3, -3, 10, 10, 4),
            (60, 40, 30, 30, 1),
            (0, 0, 0, 0, 0),
            (30, 30, 1, 1, 100),
            (i16::MIN, i16::MAX, 1000, 1000, 2000),
        ];
        let mut id = 10;
        for (x, y, w, h, b) in cases {
            let mid = add_window(&mut reg, id, Some(root), x, y, w, h, b);
            let leaf = add_window(&mut reg, id + 1, Some(mid), -1, 2, 5, 7, 3);
            id += 2;
            assert!(reg.full_rect(root).contains(&reg.full_rect(mid)));
            assert!(reg.full_rect(mid).contains(&reg.full_rect(leaf)));
        }
    }

    #[test]
    fn test_full_rect_unmapped_ancestor_is_empty() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let a = add_window(&mut reg, 2, Some(root), 0, 0, 50, 50, 0);
        let b = add_window(&mut reg, 3, Some(a), 0, 0, 10, 10, 0);
        reg.window_mut(a).mapped = false;
        assert!(reg.full_rect(b).is_empty());
        assert!(!reg.viewable(b));
    }

    #[test]
    fn test_common_ancestor_and_window_at() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let a = add_window(&mut reg, 2, Some(root), 0, 0, 50, 50, 0);
        let a1 = add_window(&mut reg, 3, Some(a), 10, 10, 10, 10, 0);
        let b = add_window(&mut reg, 4, Some(root), 40, 40, 50, 50, 5);
        assert_eq!(reg.common_ancestor(Some(a1), Some(b)), Some(root));
        assert_eq!(reg.common_ancestor(Some(a1), Some(a)), Some(a));
        assert_eq!(reg.common_ancestor(None, Some(a)), None);
        assert!(reg.is_inferior(a1, root));
        assert!(!reg.is_inferior(a, a1));
        // b is in front of a
        assert_eq!(reg.window_at(root, 45, 45), b);
        assert_eq!(reg.window_at(root, 15, 15), a1);
        assert_eq!(reg.window_at(root, 95, 5), root);
        assert_eq!(reg.interior_origin(b), (45, 45));
    }
}
