//! Resource registry
//!
//! Every server resource lives in an arena slot addressed by a [`Handle`] and
//! is indexed by its protocol id through a bucketed hash table. Objects are
//! reference counted: `insert` hands out the first reference, `lookup` and
//! `retain` add one, `release` drops one. `unlink` takes an object out of the
//! id index so it can no longer be found; the slot itself is reclaimed when the
//! last reference goes away.

use crate::client::ClientId;
use crate::drawable::Drawable;
use crate::fatal;
use crate::proto::EventMask;
use crate::rect::Rect;
use crate::window::Window;

const INITIAL_BUCKETS: usize = 1024;

/// Stable index of an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Window,
    Pixmap,
    /// Window or pixmap.
    Drawable,
    Cursor,
    Font,
    Colormap,
    GContext,
}

#[derive(Debug)]
pub struct Cursor {
    pub source: Handle,
    pub mask: Option<Handle>,
    pub foreground: u32,
    pub background: u32,
    /// Hotspot, relative to the source bitmap's origin.
    pub hot_x: i32,
    pub hot_y: i32,
    /// Where the mask bitmap's origin falls in source coordinates.
    pub mask_x: i32,
    pub mask_y: i32,
}

/// An opened built-in font.
#[derive(Debug, Clone, Copy)]
pub struct Font {
    /// Index into the server's font table.
    pub face: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Colormap {
    pub visual: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct GContext {
    pub depth: u8,
    pub function: u8,
    pub plane_mask: u32,
    pub foreground: u32,
    pub background: u32,
    pub line_width: u16,
    /// EvenOdd 0, Winding 1.
    pub fill_rule: u8,
    /// Chord 0, PieSlice 1.
    pub arc_mode: u8,
    pub graphics_exposures: bool,
}

impl GContext {
    /// Protocol defaults for a context on a drawable of `depth`.
    pub fn new(depth: u8) -> Self {
        Self {
            depth,
            function: 3,
            plane_mask: u32::MAX,
            foreground: 0,
            background: 1,
            line_width: 0,
            fill_rule: 0,
            arc_mode: 1,
            graphics_exposures: true,
        }
    }
}

#[derive(Debug)]
pub enum ObjectKind {
    Window(Box<Window>),
    Pixmap(Drawable),
    Cursor(Cursor),
    Font(Font),
    Colormap(Colormap),
    GContext(GContext),
}

impl ObjectKind {
    pub fn is(&self, ty: ObjectType) -> bool {
        matches!(
            (self, ty),
            (ObjectKind::Window(_), ObjectType::Window | ObjectType::Drawable)
                | (ObjectKind::Pixmap(_), ObjectType::Pixmap | ObjectType::Drawable)
                | (ObjectKind::Cursor(_), ObjectType::Cursor)
                | (ObjectKind::Font(_), ObjectType::Font)
                | (ObjectKind::Colormap(_), ObjectType::Colormap)
                | (ObjectKind::GContext(_), ObjectType::GContext)
        )
    }

    /// References this object keeps on others, dropped when it is freed.
    fn held_refs(&mut self) -> Vec<Handle> {
        match self {
            ObjectKind::Window(w) => {
                let attrs = &mut w.attributes;
                let mut held: Vec<Handle> = [
                    attrs.background.take_pixmap(),
                    attrs.border.take_pixmap(),
                    attrs.colormap.take(),
                    attrs.cursor.take(),
                ]
                .into_iter()
                .flatten()
                .collect();
                for grab in w.button_grabs.drain(..) {
                    held.extend(grab.confine_to);
                    held.extend(grab.cursor);
                }
                held
            }
            ObjectKind::Cursor(c) => std::iter::once(c.source).chain(c.mask).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    /// Protocol id; zero once unlinked.
    pub id: u32,
    pub refs: u32,
    pub owner: Option<ClientId>,
    pub kind: ObjectKind,
}

pub struct Registry {
    slots: Vec<Option<Object>>,
    free: Vec<u32>,
    buckets: Vec<Vec<Handle>>,
    linked: usize,
}

fn bucket_of(id: u32, buckets: usize) -> usize {
    // fibonacci hashing, scaled into the table
    ((id.wrapping_mul(0x9e37_79b1) as u64 * buckets as u64) >> 32) as usize
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![Vec::new(); INITIAL_BUCKETS],
            linked: 0,
        }
    }

    /// Number of objects reachable by id.
    pub fn len(&self) -> usize {
        self.linked
    }

    pub fn is_empty(&self) -> bool {
        self.linked == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Register a new object holding one reference.
    pub fn insert(&mut self, id: u32, owner: Option<ClientId>, kind: ObjectKind) -> Handle {
        if id == 0 || self.find(id).is_some() {
            fatal!("registering duplicate or null id {:#x}", id);
        }
        let object = Object {
            id,
            refs: 1,
            owner,
            kind,
        };
        let handle = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(object);
                Handle(i)
            }
            None => {
                self.slots.push(Some(object));
                Handle(self.slots.len() as u32 - 1)
            }
        };
        let n = self.buckets.len();
        self.buckets[bucket_of(id, n)].push(handle);
        self.linked += 1;
        if self.linked * 2 > self.buckets.len() {
            self.grow();
        }
        handle
    }

    fn grow(&mut self) {
        let n = self.buckets.len() * 2;
        let mut buckets = vec![Vec::new(); n];
        for h in std::mem::take(&mut self.buckets).into_iter().flatten() {
            let id = self.get(h).id;
            buckets[bucket_of(id, n)].push(h);
        }
        self.buckets = buckets;
    }

    /// Find by id without taking a reference.
    pub fn find(&self, id: u32) -> Option<Handle> {
        if id == 0 {
            return None;
        }
        self.buckets[bucket_of(id, self.buckets.len())]
            .iter()
            .copied()
            .find(|h| self.get(*h).id == id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.find(id).is_some()
    }

    /// Find by id and take a reference.
    pub fn lookup(&mut self, id: u32) -> Option<Handle> {
        let h = self.find(id)?;
        self.retain(h);
        Some(h)
    }

    /// As `lookup`, but only for objects of type `ty`.
    pub fn lookup_typed(&mut self, id: u32, ty: ObjectType) -> Option<Handle> {
        let h = self.lookup(id)?;
        if self.get(h).kind.is(ty) {
            Some(h)
        } else {
            self.release(h);
            None
        }
    }

    pub fn retain(&mut self, h: Handle) {
        self.get_mut(h).refs += 1;
    }

    /// Drop one reference. At zero the object must already be unlinked; its
    /// slot is reclaimed and the references it held are dropped in turn.
    pub fn release(&mut self, h: Handle) {
        let mut work = vec![h];
        while let Some(h) = work.pop() {
            let obj = self.get_mut(h);
            if obj.refs == 0 {
                fatal!("release of object {:?} with no references", h);
            }
            obj.refs -= 1;
            if obj.refs > 0 {
                continue;
            }
            if obj.id != 0 {
                fatal!("freeing live object {:#x}", obj.id);
            }
            let Some(mut obj) = self.slots[h.index()].take() else {
                fatal!("freeing empty slot {:?}", h);
            };
            work.extend(obj.kind.held_refs());
            self.free.push(h.0);
        }
    }

    /// Remove an object from the id index. It stays addressable by handle
    /// until its last reference is released.
    pub fn unlink(&mut self, h: Handle) {
        let id = self.get(h).id;
        if id == 0 {
            fatal!("destroying object {:?} twice", h);
        }
        let n = self.buckets.len();
        self.buckets[bucket_of(id, n)].retain(|&b| b != h);
        self.get_mut(h).id = 0;
        self.linked -= 1;
    }

    pub fn is_live(&self, h: Handle) -> bool {
        matches!(self.slots.get(h.index()), Some(Some(o)) if o.id != 0)
    }

    pub fn get(&self, h: Handle) -> &Object {
        match self.slots.get(h.index()) {
            Some(Some(obj)) => obj,
            _ => fatal!("dangling handle {:?}", h),
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut Object {
        match self.slots.get_mut(h.index()) {
            Some(Some(obj)) => obj,
            _ => fatal!("dangling handle {:?}", h),
        }
    }

    pub fn id(&self, h: Handle) -> u32 {
        self.get(h).id
    }

    pub fn window(&self, h: Handle) -> &Window {
        match &self.get(h).kind {
            ObjectKind::Window(w) => w,
            other => fatal!("{:?} is not a window: {:?}", h, kind_name(other)),
        }
    }

    pub fn window_mut(&mut self, h: Handle) -> &mut Window {
        match &mut self.get_mut(h).kind {
            ObjectKind::Window(w) => w,
            other => fatal!("{:?} is not a window: {:?}", h, kind_name(other)),
        }
    }

    pub fn is_window(&self, h: Handle) -> bool {
        matches!(self.get(h).kind, ObjectKind::Window(_))
    }

    /// Pixel storage of a window or pixmap.
    pub fn drawable(&self, h: Handle) -> &Drawable {
        match &self.get(h).kind {
            ObjectKind::Window(w) => &w.drawable,
            ObjectKind::Pixmap(d) => d,
            other => fatal!("{:?} is not drawable: {:?}", h, kind_name(other)),
        }
    }

    pub fn drawable_mut(&mut self, h: Handle) -> &mut Drawable {
        match &mut self.get_mut(h).kind {
            ObjectKind::Window(w) => &mut w.drawable,
            ObjectKind::Pixmap(d) => d,
            other => fatal!("{:?} is not drawable: {:?}", h, kind_name(other)),
        }
    }

    pub fn cursor(&self, h: Handle) -> &Cursor {
        match &self.get(h).kind {
            ObjectKind::Cursor(c) => c,
            other => fatal!("{:?} is not a cursor: {:?}", h, kind_name(other)),
        }
    }

    pub fn cursor_mut(&mut self, h: Handle) -> &mut Cursor {
        match &mut self.get_mut(h).kind {
            ObjectKind::Cursor(c) => c,
            other => fatal!("{:?} is not a cursor: {:?}", h, kind_name(other)),
        }
    }

    pub fn font(&self, h: Handle) -> &Font {
        match &self.get(h).kind {
            ObjectKind::Font(f) => f,
            other => fatal!("{:?} is not a font: {:?}", h, kind_name(other)),
        }
    }

    /// Screen footprint of a cursor in source coordinates: the mask when
    /// there is one, otherwise the whole source.
    pub fn cursor_bounds(&self, h: Handle) -> Rect {
        let c = self.cursor(h);
        match c.mask {
            Some(m) => self.drawable(m).bounds().translate(c.mask_x as i64, c.mask_y as i64),
            None => self.drawable(c.source).bounds(),
        }
    }

    pub fn gcontext(&self, h: Handle) -> &GContext {
        match &self.get(h).kind {
            ObjectKind::GContext(g) => g,
            other => fatal!("{:?} is not a gcontext: {:?}", h, kind_name(other)),
        }
    }

    pub fn gcontext_mut(&mut self, h: Handle) -> &mut GContext {
        match &mut self.get_mut(h).kind {
            ObjectKind::GContext(g) => g,
            other => fatal!("{:?} is not a gcontext: {:?}", h, kind_name(other)),
        }
    }

    /// Handles of all linked windows, in slot order.
    pub fn windows(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(o) if o.id != 0 && matches!(o.kind, ObjectKind::Window(_)) => Some(Handle(i as u32)),
                _ => None,
            })
            .collect()
    }

    /// Drop every event subscription `client` holds on any window.
    pub fn drop_subscriptions(&mut self, client: ClientId) {
        for slot in self.slots.iter_mut().flatten() {
            if let ObjectKind::Window(w) = &mut slot.kind {
                w.events.retain(|s| s.client != client);
            }
        }
    }

    /// Union of every client's event mask on `h`.
    pub fn all_event_masks(&self, h: Handle) -> EventMask {
        self.window(h)
            .events
            .iter()
            .fold(EventMask::empty(), |acc, s| acc | s.mask)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_name(kind: &ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Window(_) => "window",
        ObjectKind::Pixmap(_) => "pixmap",
        ObjectKind::Cursor(_) => "cursor",
        ObjectKind::Font(_) => "font",
        ObjectKind::Colormap(_) => "colormap",
        ObjectKind::GContext(_) => "gcontext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pixmap() -> ObjectKind {
        ObjectKind::Pixmap(Drawable::new(2, 2, 24, 1, 0).unwrap())
    }

    fn font() -> ObjectKind {
        ObjectKind::Font(Font { face: 0 })
    }

    #[test]
    fn test_insert_lookup_release() {
        let mut reg = Registry::new();
        let h = reg.insert(0x200001, Some(ClientId(1)), pixmap());
        assert_eq!(reg.get(h).refs, 1);
        let found = reg.lookup(0x200001).unwrap();
        assert_eq!(found, h);
        assert_eq!(reg.get(h).refs, 2);
        reg.release(found);
        assert_eq!(reg.get(h).refs, 1);
        assert!(reg.lookup(0x200002).is_none());
    }

    #[test]
    fn test_lookup_typed_mismatch_releases() {
        let mut reg = Registry::new();
        let h = reg.insert(0x10, None, font());
        assert!(reg.lookup_typed(0x10, ObjectType::Window).is_none());
        assert_eq!(reg.get(h).refs, 1);
        assert!(reg.lookup_typed(0x10, ObjectType::Drawable).is_none());
        let f = reg.lookup_typed(0x10, ObjectType::Font).unwrap();
        reg.release(f);
    }

    #[test]
    fn test_unlinked_object_survives_until_last_release() {
        let mut reg = Registry::new();
        let h = reg.insert(0x20, None, pixmap());
        let held = reg.lookup(0x20).unwrap();
        reg.unlink(h);
        assert!(!reg.contains(0x20));
        assert!(!reg.is_live(h));
        reg.release(h);
        // still addressable through the remaining reference
        assert_eq!(reg.drawable(held).width, 2);
        reg.release(held);
        let again = reg.insert(0x21, None, pixmap());
        assert_eq!(again, h);
    }

    #[test]
    fn test_cursor_release_frees_pixmaps() {
        let mut reg = Registry::new();
        let src = reg.insert(0x30, None, pixmap());
        let mask = reg.insert(0x31, None, pixmap());
        reg.retain(src);
        reg.retain(mask);
        let cur = reg.insert(
            0x32,
            None,
            ObjectKind::Cursor(Cursor {
                source: src,
                mask: Some(mask),
                foreground: 0,
                background: 0xffffff,
                hot_x: 0,
                hot_y: 0,
                mask_x: 0,
                mask_y: 0,
            }),
        );
        assert_eq!(reg.cursor_bounds(cur), Rect::new(0, 0, 2, 2));
        for h in [src, mask] {
            reg.unlink(h);
            reg.release(h);
        }
        assert_eq!(reg.get(src).refs, 1);
        reg.unlink(cur);
        reg.release(cur);
        assert_eq!(reg.free.len(), 3);
    }

    #[test]
    fn test_table_grows() {
        let mut reg = Registry::new();
        for id in 1..=600u32 {
            reg.insert(id, None, font());
        }
        assert_eq!(reg.bucket_count(), 2048);
        assert_eq!(reg.len(), 600);
        assert!((1..=600u32).all(|id| reg.contains(id)));
    }

    #[test]
    fn test_random_refcount_sequences() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut reg = Registry::new();
        // (handle, linked, extra references held by the test)
        let mut live: Vec<(Handle, bool, u32)> = Vec::new();
        let mut next_id = 1u32;
        for _ in 0..5000 {
            match rng.gen_range(0..4) {
                0 => {
                    let h = reg.insert(next_id, None, font());
                    next_id += 1;
                    live.push((h, true, 0));
                }
                1 if !live.is_empty() => {
                    let i = rng.gen_range(0..live.len());
                    if live[i].1 {
                        let id = reg.id(live[i].0);
                        let h = reg.lookup(id).unwrap();
                        assert_eq!(h, live[i].0);
                        live[i].2 += 1;
                    }
                }
                2 if !live.is_empty() => {
                    let i = rng.gen_range(0..live.len());
                    if live[i].2 > 0 {
                        reg.release(live[i].0);
                        live[i].2 -= 1;
                    }
                }
                3 if !live.is_empty() => {
                    let i = rng.gen_range(0..live.len());
                    if live[i].1 {
                        reg.unlink(live[i].0);
                        reg.release(live[i].0);
                        live[i].1 = false;
                    }
                }
                _ => {}
            }
            live.retain(|&(h, linked, extra)| {
                let gone = !linked && extra == 0;
                if !gone {
                    assert_eq!(reg.get(h).refs, extra + linked as u32);
                }
                !gone
            });
        }
        assert_eq!(reg.len(), live.iter().filter(|e| e.1).count());
    }

    #[test]
    #[should_panic]
    fn test_mispaired_release_panics() {
        let mut reg = Registry::new();
        let h = reg.insert(0x40, None, font());
        // the creation reference dropped while the id is still linked
        reg.release(h);
    }

    #[test]
    #[should_panic]
    fn test_double_unlink_panics() {
        let mut reg = Registry::new();
        let h = reg.insert(0x41, None, font());
        reg.retain(h);
        reg.unlink(h);
        reg.unlink(h);
    }
}
