//! Request handlers
//!
//! `dispatch` routes each opcode to a handler. Handlers decode their body with
//! a [`Reader`], look objects up through the `*_arg` helpers (which keep a
//! reference until the dispatcher finishes the request) and answer through
//! [`Server::reply`].

use tracing::debug;

use crate::client::{ClientId, PendingRequest, BUFFER_SIZE};
use crate::drawable::Drawable;
use crate::error::{Flow, RequestError, RequestResult, XError};
use crate::events::Event;
use crate::font::glyph_cursor;
use crate::input::Focus;
use crate::manage::ConfigureValues;
use crate::object::{Cursor, Font, GContext, Handle, ObjectKind, ObjectType};
use crate::proto::{
    find_visual, format_for_depth, opcodes as op, rgb16_to_pixel, ConfigMask, EventMask, GcAttr, Gravity,
    RevertTo, StackMode, WindowAttr, ANY_BUTTON, ANY_MODIFIER, ANY_PROPERTY_TYPE, COPY_FROM_PARENT,
    CURRENT_TIME, GRAB_MODE_ASYNC, GRAB_MODE_SYNC, IMAGE_FORMAT_BITMAP, IMAGE_FORMAT_XY_PIXMAP,
    IMAGE_FORMAT_Z_PIXMAP, MAP_STATE_UNMAPPED, MAP_STATE_UNVIEWABLE, MAP_STATE_VIEWABLE, NONE,
    PARENT_RELATIVE, POINTER_ROOT, PROPERTY_DELETE, PROPERTY_NEW_VALUE, PROP_MODE_APPEND,
    PROP_MODE_PREPEND, PROP_MODE_REPLACE,
};
use crate::rect::Rect;
use crate::ringbuf::{pad4, ByteOrder, Reader, Writer};
use crate::server::Server;
use crate::window::{Background, Border, ButtonGrab, Property, Window, WindowClass};

const QUERY_CURSOR: u8 = 0;
const QUERY_TILE: u8 = 1;
const QUERY_STIPPLE: u8 = 2;
const MAX_CURSOR_SIZE: u16 = 256;


/// Attributes an InputOnly window may not carry.
const INPUT_OUTPUT_ATTRS: WindowAttr = WindowAttr::BACK_PIXMAP
    .union(WindowAttr::BACK_PIXEL)
    .union(WindowAttr::BORDER_PIXMAP)
    .union(WindowAttr::BORDER_PIXEL)
    .union(WindowAttr::BIT_GRAVITY)
    .union(WindowAttr::BACKING_STORE)
    .union(WindowAttr::BACKING_PLANES)
    .union(WindowAttr::BACKING_PIXEL)
    .union(WindowAttr::SAVE_UNDER)
    .union(WindowAttr::COLORMAP);

/// Events that may appear in a do-not-propagate mask.
const DEVICE_EVENTS: EventMask = EventMask::KEY_PRESS
    .union(EventMask::KEY_RELEASE)
    .union(EventMask::BUTTON_PRESS)
    .union(EventMask::BUTTON_RELEASE)
    .union(EventMask::POINTER_MOTION)
    .union(EventMask::BUTTON1_MOTION)
    .union(EventMask::BUTTON2_MOTION)
    .union(EventMask::BUTTON3_MOTION)
    .union(EventMask::BUTTON4_MOTION)
    .union(EventMask::BUTTON5_MOTION)
    .union(EventMask::BUTTON_MOTION);

/// The request being handled.
pub(crate) struct Call {
    pub client: ClientId,
    pub detail: u8,
    pub sequence: u16,
    pub order: ByteOrder,
}

/// Decoded window attribute value-list.
#[derive(Default)]
struct AttrValues {
    background: Option<Background>,
    border: Option<Border>,
    bit_gravity: Option<Gravity>,
    win_gravity: Option<Gravity>,
    backing_store: Option<u8>,
    backing_planes: Option<u32>,
    backing_pixel: Option<u32>,
    override_redirect: Option<bool>,
    save_under: Option<bool>,
    event_mask: Option<EventMask>,
    do_not_propagate: Option<u16>,
    colormap: Option<Option<Handle>>,
    cursor: Option<Option<Handle>>,
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn to_latin1(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

pub(crate) fn bool_value(r: &mut Reader) -> Result<bool, XError> {
    match r.value_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(XError::Value(v as u32)),
    }
}

/// Case-insensitive match with `*` and `?` wildcards.
fn pattern_matches(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((&b'*', rest)) => (0..=name.len()).any(|i| pattern_matches(rest, &name[i..])),
        Some((&b'?', rest)) => !name.is_empty() && pattern_matches(rest, &name[1..]),
        Some((&c, rest)) => name
            .split_first()
            .is_some_and(|(n, tail)| n.eq_ignore_ascii_case(&c) && pattern_matches(rest, tail)),
    }
}

impl Server {
    pub(crate) fn dispatch(&mut self, client: ClientId, req: &PendingRequest, body: &[u8]) -> RequestResult {
        let Some(order) = self.clients.get(&client).map(|c| c.order) else {
            return Err(RequestError::Fatal("unknown client".into()));
        };
        let call = Call {
            client,
            detail: req.detail,
            sequence: req.sequence,
            order,
        };
        let r = &mut Reader::new(body, order);
        match req.opcode {
            op::CREATE_WINDOW => self.handle_create_window(&call, r),
            op::CHANGE_WINDOW_ATTRIBUTES => self.handle_change_window_attributes(&call, r),
            op::GET_WINDOW_ATTRIBUTES => self.get_window_attributes(&call, r),
            op::DESTROY_WINDOW => self.handle_destroy_window(r),
            op::DESTROY_SUBWINDOWS => self.handle_destroy_subwindows(r),
            op::REPARENT_WINDOW => self.handle_reparent_window(&call, r),
            op::MAP_WINDOW => self.handle_map_window(&call, r),
            op::MAP_SUBWINDOWS => self.handle_map_subwindows(&call, r),
            op::UNMAP_WINDOW => self.handle_unmap_window(r),
            op::UNMAP_SUBWINDOWS => self.handle_unmap_subwindows(r),
            op::CONFIGURE_WINDOW => self.handle_configure_window(&call, r),
            op::GET_GEOMETRY => self.get_geometry(&call, r),
            op::QUERY_TREE => self.query_tree(&call, r),
            op::INTERN_ATOM => self.intern_atom(&call, r),
            op::GET_ATOM_NAME => self.get_atom_name(&call, r),
            op::CHANGE_PROPERTY => self.handle_change_property(&call, r),
            op::DELETE_PROPERTY => self.handle_delete_property(r),
            op::GET_PROPERTY => self.get_property(&call, r),
            op::LIST_PROPERTIES => self.list_properties(&call, r),
            op::GRAB_POINTER => self.handle_grab_pointer(&call, r),
            op::UNGRAB_POINTER => self.handle_ungrab_pointer(&call, r),
            op::GRAB_BUTTON => self.handle_grab_button(&call, r),
            op::UNGRAB_BUTTON => self.handle_ungrab_button(&call, r),
            op::GRAB_SERVER => self.handle_grab_server(&call),
            op::UNGRAB_SERVER => self.handle_ungrab_server(&call),
            op::QUERY_POINTER => self.query_pointer(&call, r),
            op::WARP_POINTER => self.handle_warp_pointer(r),
            op::SET_INPUT_FOCUS => self.handle_set_input_focus(&call, r),
            op::GET_INPUT_FOCUS => self.get_input_focus(&call),
            op::OPEN_FONT => self.handle_open_font(&call, r),
            op::CLOSE_FONT => self.handle_close_font(r),
            op::LIST_FONTS => self.list_fonts(&call, r),
            op::CREATE_PIXMAP => self.handle_create_pixmap(&call, r),
            op::FREE_PIXMAP => self.handle_free_pixmap(r),
            op::CREATE_GC => self.handle_create_gc(&call, r),
            op::CHANGE_GC => self.handle_change_gc(r),
            op::FREE_GC => self.handle_free_gc(r),
            op::COPY_GC => self.handle_copy_gc(r),
            op::CLEAR_AREA => self.handle_clear_area(&call, r),
            op::COPY_AREA => self.handle_copy_area(&call, r),
            op::POLY_POINT => self.handle_poly_point(&call, r),
            op::POLY_LINE => self.handle_poly_line(&call, r),
            op::POLY_SEGMENT => self.handle_poly_segment(r),
            op::POLY_RECTANGLE => self.handle_poly_rectangle(r),
            op::POLY_ARC => self.handle_poly_arc(r),
            op::FILL_POLY => self.handle_fill_poly(r),
            op::POLY_FILL_RECTANGLE => self.handle_poly_fill_rectangle(r),
            op::POLY_FILL_ARC => self.handle_poly_fill_arc(r),
            op::PUT_IMAGE => self.handle_put_image(&call, r),
            op::GET_IMAGE => self.get_image(&call, r),
            op::CREATE_CURSOR => self.handle_create_cursor(&call, r),
            op::CREATE_GLYPH_CURSOR => self.handle_create_glyph_cursor(&call, r),
            op::FREE_CURSOR => self.handle_free_cursor(r),
            op::RECOLOR_CURSOR => self.handle_recolor_cursor(r),
            op::QUERY_BEST_SIZE => self.query_best_size(&call, r),
            op::QUERY_EXTENSION => self.query_extension(&call, r),
            op::LIST_EXTENSIONS => self.list_extensions(&call),
            op::CHANGE_KEYBOARD_MAPPING => self.handle_change_keyboard_mapping(&call, r),
            op::GET_KEYBOARD_MAPPING => self.get_keyboard_mapping(&call, r),
            op::CHANGE_KEYBOARD_CONTROL => self.handle_change_keyboard_control(r),
            op::GET_KEYBOARD_CONTROL => self.get_keyboard_control(&call),
            op::BELL => self.handle_bell(&call),
            op::CHANGE_POINTER_CONTROL => self.handle_change_pointer_control(r),
            op::GET_POINTER_CONTROL => self.get_pointer_control(&call),
            op::SET_POINTER_MAPPING => self.handle_set_pointer_mapping(&call, r),
            op::GET_POINTER_MAPPING => self.get_pointer_mapping(&call),
            op::SET_MODIFIER_MAPPING => self.handle_set_modifier_mapping(&call, r),
            op::GET_MODIFIER_MAPPING => self.get_modifier_mapping(&call),
            op::NO_OPERATION => Ok(Flow::Handled),
            _ => Err(XError::Request.into()),
        }
    }

    // -- helpers --

    /// Queue a reply: the 8-byte header, then `body` padded to at least 24
    /// bytes and to a multiple of four.
    pub(crate) fn reply(&mut self, call: &Call, detail: u8, body: Writer) -> RequestResult {
        let mut bytes = body.finish();
        if bytes.len() < 24 {
            bytes.resize(24, 0);
        }
        bytes.resize(bytes.len() + pad4(bytes.len()), 0);
        if 8 + bytes.len() > BUFFER_SIZE {
            return Err(XError::Alloc.into());
        }
        let mut w = Writer::with_capacity(call.order, 8 + bytes.len());
        w.u8(1)
            .u8(detail)
            .u16(call.sequence)
            .u32(((bytes.len() - 24) / 4) as u32)
            .bytes(&bytes);
        match self.clients.get_mut(&call.client) {
            Some(c) => {
                if c.write(&w.finish()) {
                    Ok(Flow::Handled)
                } else {
                    Ok(Flow::WouldBlock)
                }
            }
            None => Err(RequestError::Fatal("reply to a removed client".into())),
        }
    }

    pub(crate) fn has_room(&self, call: &Call, bytes: usize) -> bool {
        self.clients.get(&call.client).is_some_and(|c| c.output_free() >= bytes)
    }

    fn lookup(&mut self, id: u32, ty: ObjectType) -> Option<Handle> {
        let h = self.objects.lookup_typed(id, ty)?;
        Some(self.hold(h))
    }

    pub(crate) fn window_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Window).ok_or(XError::Window(id))
    }

    pub(crate) fn drawable_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Drawable).ok_or(XError::Drawable(id))
    }

    pub(crate) fn pixmap_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Pixmap).ok_or(XError::Pixmap(id))
    }

    pub(crate) fn cursor_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Cursor).ok_or(XError::Cursor(id))
    }

    pub(crate) fn font_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Font).ok_or(XError::Font(id))
    }

    fn colormap_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::Colormap).ok_or(XError::Colormap(id))
    }

    pub(crate) fn gc_arg(&mut self, id: u32) -> Result<Handle, XError> {
        self.lookup(id, ObjectType::GContext).ok_or(XError::GContext(id))
    }

    fn atom_arg(&self, atom: u32) -> Result<u32, XError> {
        if self.atoms.exists(atom) {
            Ok(atom)
        } else {
            Err(XError::Atom(atom))
        }
    }

    pub(crate) fn new_id(&self, call: &Call, id: u32) -> Result<(), XError> {
        if self.client_has_free_id(call.client, id) {
            Ok(())
        } else {
            Err(XError::IdChoice(id))
        }
    }

    /// Damage the screen area behind `rect` of drawable `h`, if it is a
    /// viewable window.
    pub(crate) fn damage_drawable(&mut self, h: Handle, rect: Rect) {
        if !self.objects.is_window(h) || !self.objects.viewable(h) {
            return;
        }
        let (ox, oy) = self.objects.interior_origin(h);
        let r = rect.translate(ox, oy).intersect(&self.objects.full_rect(h));
        self.redraw(r);
    }

    // -- windows --

    fn read_attributes(
        &mut self,
        r: &mut Reader,
        mask: WindowAttr,
        depth: u8,
        parent: Option<Handle>,
    ) -> Result<AttrValues, XError> {
        let mut a = AttrValues::default();
        if mask.contains(WindowAttr::BACK_PIXMAP) {
            a.background = Some(match r.u32()? {
                NONE => Background::None,
                PARENT_RELATIVE => Background::ParentRelative,
                id => {
                    let h = self.pixmap_arg(id)?;
                    if self.objects.drawable(h).depth != depth {
                        return Err(XError::Match);
                    }
                    Background::Pixmap(h)
                }
            });
        }
        if mask.contains(WindowAttr::BACK_PIXEL) {
            a.background = Some(Background::Pixel(r.u32()?));
        }
        if mask.contains(WindowAttr::BORDER_PIXMAP) {
            a.border = Some(match r.u32()? {
                COPY_FROM_PARENT => parent.map_or(Border::Pixel(0), |p| self.objects.window(p).attributes.border),
                id => {
                    let h = self.pixmap_arg(id)?;
                    if self.objects.drawable(h).depth != depth {
                        return Err(XError::Match);
                    }
                    Border::Pixmap(h)
                }
            });
        }
        if mask.contains(WindowAttr::BORDER_PIXEL) {
            a.border = Some(Border::Pixel(r.u32()?));
        }
        for (bit, slot) in [
            (WindowAttr::BIT_GRAVITY, &mut a.bit_gravity),
            (WindowAttr::WIN_GRAVITY, &mut a.win_gravity),
        ] {
            if mask.contains(bit) {
                let v = r.value_u8()?;
                *slot = Some(Gravity::from_u8(v).ok_or(XError::Value(v as u32))?);
            }
        }
        if mask.contains(WindowAttr::BACKING_STORE) {
            let v = r.value_u8()?;
            if v > 2 {
                return Err(XError::Value(v as u32));
            }
            a.backing_store = Some(v);
        }
        if mask.contains(WindowAttr::BACKING_PLANES) {
            a.backing_planes = Some(r.u32()?);
        }
        if mask.contains(WindowAttr::BACKING_PIXEL) {
            a.backing_pixel = Some(r.u32()?);
        }
        if mask.contains(WindowAttr::OVERRIDE_REDIRECT) {
            a.override_redirect = Some(bool_value(r)?);
        }
        if mask.contains(WindowAttr::SAVE_UNDER) {
            a.save_under = Some(bool_value(r)?);
        }
        if mask.contains(WindowAttr::EVENT_MASK) {
            let v = r.u32()?;
            a.event_mask = Some(EventMask::from_bits(v).ok_or(XError::Value(v))?);
        }
        if mask.contains(WindowAttr::DONT_PROPAGATE) {
            let v = r.u32()?;
            if v & !DEVICE_EVENTS.bits() != 0 {
                return Err(XError::Value(v));
            }
            a.do_not_propagate = Some(v as u16);
        }
        if mask.contains(WindowAttr::COLORMAP) {
            a.colormap = Some(match r.u32()? {
                COPY_FROM_PARENT => parent.and_then(|p| self.objects.window(p).attributes.colormap),
                id => Some(self.colormap_arg(id)?),
            });
        }
        if mask.contains(WindowAttr::CURSOR) {
            a.cursor = Some(match r.u32()? {
                NONE => None,
                id => Some(self.cursor_arg(id)?),
            });
        }
        Ok(a)
    }

    /// Store decoded attributes on `w`, trading references for any pixmap,
    /// colormap or cursor they replace.
    fn apply_attributes(&mut self, client: ClientId, w: Handle, a: AttrValues) -> Result<(), XError> {
        if let Some(mask) = a.event_mask {
            let exclusive = mask & EventMask::EXCLUSIVE;
            let taken = self
                .objects
                .window(w)
                .events
                .iter()
                .any(|s| s.client != client && s.mask.intersects(exclusive));
            if taken {
                return Err(XError::Access);
            }
        }

        if let Some(bg) = a.background {
            if let Background::Pixmap(p) = bg {
                self.objects.retain(p);
            }
            let attrs = &mut self.objects.window_mut(w).attributes;
            let old = attrs.background.take_pixmap();
            attrs.background = bg;
            if let Some(p) = old {
                self.objects.release(p);
            }
        }
        if let Some(border) = a.border {
            if let Border::Pixmap(p) = border {
                self.objects.retain(p);
            }
            let attrs = &mut self.objects.window_mut(w).attributes;
            let old = attrs.border.take_pixmap();
            attrs.border = border;
            if let Some(p) = old {
                self.objects.release(p);
            }
            self.redraw_window(w);
        }
        if let Some(colormap) = a.colormap {
            if let Some(c) = colormap {
                self.objects.retain(c);
            }
            let old = std::mem::replace(&mut self.objects.window_mut(w).attributes.colormap, colormap);
            if let Some(c) = old {
                self.objects.release(c);
            }
        }
        if let Some(cursor) = a.cursor {
            if let Some(c) = cursor {
                self.objects.retain(c);
            }
            let old = std::mem::replace(&mut self.objects.window_mut(w).attributes.cursor, cursor);
            if let Some(c) = old {
                self.objects.release(c);
            }
        }

        let win = self.objects.window_mut(w);
        let attrs = &mut win.attributes;
        if let Some(v) = a.bit_gravity {
            attrs.bit_gravity = v;
        }
        if let Some(v) = a.win_gravity {
            attrs.win_gravity = v;
        }
        if let Some(v) = a.backing_store {
            attrs.backing_store = v;
        }
        if let Some(v) = a.backing_planes {
            attrs.backing_planes = v;
        }
        if let Some(v) = a.backing_pixel {
            attrs.backing_pixel = v;
        }
        if let Some(v) = a.override_redirect {
            attrs.override_redirect = v;
        }
        if let Some(v) = a.save_under {
            attrs.save_under = v;
        }
        if let Some(v) = a.do_not_propagate {
            attrs.do_not_propagate = v;
        }
        if let Some(mask) = a.event_mask {
            win.set_mask(client, mask);
        }
        if a.cursor.is_some() {
            self.update_cursor();
        }
        Ok(())
    }

    fn handle_create_window(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let wid = r.u32()?;
        let parent_id = r.u32()?;
        let x = r.i16()?;
        let y = r.i16()?;
        let width = r.u16()?;
        let height = r.u16()?;
        let border_width = r.u16()?;
        let class = r.u16()?;
        let visual = r.u32()?;
        let mask = r.u32()?;

        self.new_id(call, wid)?;
        let parent = self.window_arg(parent_id)?;
        let mask = WindowAttr::from_bits(mask).ok_or(XError::Value(mask))?;
        if width == 0 || height == 0 {
            return Err(XError::Value(0).into());
        }
        let p = self.objects.window(parent);
        let class = match class {
            0 => p.class,
            1 => WindowClass::InputOutput,
            2 => WindowClass::InputOnly,
            v => return Err(XError::Value(v as u32).into()),
        };
        let visual = if visual == COPY_FROM_PARENT { p.visual } else { visual };
        let (visual_depth, _) = find_visual(visual).ok_or(XError::Match)?;
        let depth = match class {
            WindowClass::InputOnly => {
                if call.detail != 0 || border_width != 0 || mask.intersects(INPUT_OUTPUT_ATTRS) {
                    return Err(XError::Match.into());
                }
                0
            }
            WindowClass::InputOutput => {
                let depth = if call.detail == 0 { p.drawable.depth } else { call.detail };
                if p.class == WindowClass::InputOnly || depth != visual_depth {
                    return Err(XError::Match.into());
                }
                depth
            }
        };
        let tree_depth = p.tree_depth + 1;

        let attrs = self.read_attributes(r, mask, depth, Some(parent))?;
        let drawable = match class {
            WindowClass::InputOnly => Drawable::without_pixels(width, height, self.screen.root),
            WindowClass::InputOutput => {
                let fill = match attrs.background {
                    Some(Background::Pixel(p)) => p,
                    _ => 0,
                };
                Drawable::new(width, height, depth, self.screen.root, fill)?
            }
        };
        let win = Window::new(drawable, Some(parent), tree_depth, x, y, border_width, class, visual);
        let h = self.register(wid, Some(call.client), ObjectKind::Window(Box::new(win)));
        self.objects.attach_front(parent, h);
        let inherit_colormap = attrs.colormap.is_none() && class == WindowClass::InputOutput;
        self.apply_attributes(call.client, h, attrs)?;
        if inherit_colormap {
            if let Some(c) = self.objects.window(parent).attributes.colormap {
                self.objects.retain(c);
                self.objects.window_mut(h).attributes.colormap = Some(c);
            }
        }

        let override_redirect = self.objects.window(h).attributes.override_redirect;
        let event = Event::CreateNotify {
            parent: parent_id,
            window: wid,
            x,
            y,
            width,
            height,
            border_width,
            override_redirect,
        };
        if let Some(sub) = self
            .objects
            .window(parent)
            .events
            .iter()
            .find(|s| s.mask.contains(EventMask::SUBSTRUCTURE_NOTIFY))
            .map(|s| s.client)
        {
            self.send_event(sub, &event);
        }
        debug!(client = call.client.0, window = wid, width, height, "window created");
        Ok(Flow::Handled)
    }

    fn handle_change_window_attributes(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let mask = r.u32()?;
        let mask = WindowAttr::from_bits(mask).ok_or(XError::Value(mask))?;
        let win = self.objects.window(w);
        if win.class == WindowClass::InputOnly && mask.intersects(INPUT_OUTPUT_ATTRS) {
            return Err(XError::Match.into());
        }
        let (depth, parent) = (win.drawable.depth, win.parent);
        let mut attrs = self.read_attributes(r, mask, depth, parent)?;
        if w == self.root {
            // the root keeps its look; only selections and the cursor change
            let cursor = attrs.cursor.map(|c| c.or(Some(self.default_cursor)));
            attrs = AttrValues {
                event_mask: attrs.event_mask,
                cursor,
                ..Default::default()
            };
        }
        self.apply_attributes(call.client, w, attrs)?;
        Ok(Flow::Handled)
    }

    fn get_window_attributes(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let win = self.objects.window(w);
        let map_state = if !win.mapped {
            MAP_STATE_UNMAPPED
        } else if self.objects.viewable(w) {
            MAP_STATE_VIEWABLE
        } else {
            MAP_STATE_UNVIEWABLE
        };
        let a = &win.attributes;
        let mut body = Writer::new(call.order);
        body.u32(win.visual)
            .u16(win.class as u16)
            .u8(a.bit_gravity as u8)
            .u8(a.win_gravity as u8)
            .u32(a.backing_planes)
            .u32(a.backing_pixel)
            .u8(a.save_under as u8)
            .u8(1)
            .u8(map_state)
            .u8(a.override_redirect as u8)
            .u32(a.colormap.map_or(NONE, |c| self.objects.id(c)))
            .u32(self.objects.all_event_masks(w).bits())
            .u32(win.mask_for(call.client).bits())
            .u16(a.do_not_propagate)
            .pad(2);
        let backing_store = a.backing_store;
        self.reply(call, backing_store, body)
    }

    fn handle_destroy_window(&mut self, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        if w == self.root {
            return Err(XError::Match.into());
        }
        self.destroy_window(w);
        Ok(Flow::Handled)
    }

    fn handle_destroy_subwindows(&mut self, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        self.destroy_subwindows(w);
        Ok(Flow::Handled)
    }

    fn handle_reparent_window(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let parent = self.window_arg(r.u32()?)?;
        let x = r.i16()?;
        let y = r.i16()?;
        if w == self.root || parent == w || self.objects.is_inferior(parent, w) {
            return Err(XError::Match.into());
        }
        if self.objects.window(parent).class == WindowClass::InputOnly
            && self.objects.window(w).class == WindowClass::InputOutput
        {
            return Err(XError::Match.into());
        }
        self.reparent_window(call.client, w, parent, x, y);
        Ok(Flow::Handled)
    }

    fn handle_map_window(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        self.map_window(call.client, w);
        Ok(Flow::Handled)
    }

    fn handle_map_subwindows(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        self.map_subwindows(call.client, w);
        Ok(Flow::Handled)
    }

    fn handle_unmap_window(&mut self, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        if w == self.root {
            return Err(XError::Match.into());
        }
        self.unmap_window(w);
        Ok(Flow::Handled)
    }

    fn handle_unmap_subwindows(&mut self, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        self.unmap_subwindows(w);
        Ok(Flow::Handled)
    }

    fn handle_configure_window(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let bits = r.u16()?;
        r.pad(2)?;
        let mask = ConfigMask::from_bits(bits).ok_or(XError::Value(bits as u32))?;

        let mut values = ConfigureValues::default();
        if mask.contains(ConfigMask::X) {
            values.x = Some(r.value_i16()?);
        }
        if mask.contains(ConfigMask::Y) {
            values.y = Some(r.value_i16()?);
        }
        for (bit, slot) in [
            (ConfigMask::WIDTH, &mut values.width),
            (ConfigMask::HEIGHT, &mut values.height),
        ] {
            if mask.contains(bit) {
                let v = r.value_u16()?;
                if v == 0 {
                    return Err(XError::Value(0).into());
                }
                *slot = Some(v);
            }
        }
        if mask.contains(ConfigMask::BORDER_WIDTH) {
            values.border_width = Some(r.value_u16()?);
        }
        if mask.contains(ConfigMask::SIBLING) {
            let s = self.window_arg(r.u32()?)?;
            if !mask.contains(ConfigMask::STACK_MODE)
                || s == w
                || self.objects.parent(s) != self.objects.parent(w)
            {
                return Err(XError::Match.into());
            }
            values.sibling = Some(s);
        }
        if mask.contains(ConfigMask::STACK_MODE) {
            let v = r.value_u8()?;
            values.stack_mode = Some(StackMode::from_u8(v).ok_or(XError::Value(v as u32))?);
        }
        let win = self.objects.window(w);
        if win.class == WindowClass::InputOnly && values.border_width.is_some_and(|b| b != 0) {
            return Err(XError::Match.into());
        }
        self.configure_window(call.client, w, mask, values)?;
        Ok(Flow::Handled)
    }

    fn get_geometry(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let h = self.drawable_arg(r.u32()?)?;
        let (depth, x, y, width, height, border) = match &self.objects.get(h).kind {
            ObjectKind::Window(w) => (w.drawable.depth, w.x, w.y, w.width(), w.height(), w.border_width),
            ObjectKind::Pixmap(d) => (d.depth, 0, 0, d.width, d.height, 0),
            _ => return Err(XError::Drawable(self.objects.id(h)).into()),
        };
        let mut body = Writer::new(call.order);
        body.u32(self.screen.root)
            .i16(x)
            .i16(y)
            .u16(width)
            .u16(height)
            .u16(border);
        self.reply(call, depth, body)
    }

    fn query_tree(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let win = self.objects.window(w);
        let mut body = Writer::new(call.order);
        body.u32(self.screen.root)
            .u32(win.parent.map_or(NONE, |p| self.objects.id(p)))
            .u16(win.children.len() as u16)
            .pad(14);
        // bottom to top
        for &c in win.children.iter().rev() {
            body.u32(self.objects.id(c));
        }
        self.reply(call, 0, body)
    }

    // -- atoms and properties --

    fn intern_atom(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let only_if_exists = call.detail != 0;
        let len = r.u16()? as usize;
        r.pad(2)?;
        let name = latin1(r.bytes(len)?);
        let atom = self.atoms.intern(&name, only_if_exists).unwrap_or(NONE);
        let mut body = Writer::new(call.order);
        body.u32(atom);
        self.reply(call, 0, body)
    }

    fn get_atom_name(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let atom = self.atom_arg(r.u32()?)?;
        let name = to_latin1(self.atoms.name(atom).unwrap_or_default());
        let mut body = Writer::new(call.order);
        body.u16(name.len() as u16).pad(22).bytes(&name);
        self.reply(call, 0, body)
    }

    fn property_notify(&mut self, w: Handle, atom: u32, state: u8) {
        let event = Event::PropertyNotify {
            window: self.objects.id(w),
            atom,
            time: self.now(),
            state,
        };
        self.deliver(w, EventMask::PROPERTY_CHANGE, &event);
    }

    fn handle_change_property(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let mode = call.detail;
        let w = self.window_arg(r.u32()?)?;
        let name = self.atom_arg(r.u32()?)?;
        let type_ = self.atom_arg(r.u32()?)?;
        let format = r.u8()?;
        r.pad(3)?;
        let items = r.u32()? as usize;
        if mode > PROP_MODE_APPEND {
            return Err(XError::Value(mode as u32).into());
        }
        if !matches!(format, 8 | 16 | 32) {
            return Err(XError::Value(format as u32).into());
        }
        let len = items
            .checked_mul(format as usize / 8)
            .ok_or(XError::Length)?;
        let data = r.bytes(len)?;

        let win = self.objects.window_mut(w);
        match win.properties.iter_mut().find(|p| p.name == name) {
            Some(p) if mode == PROP_MODE_REPLACE => {
                p.type_ = type_;
                p.format = format;
                p.data = data.to_vec();
            }
            Some(p) => {
                if p.type_ != type_ || p.format != format {
                    return Err(XError::Match.into());
                }
                if mode == PROP_MODE_PREPEND {
                    p.data.splice(0..0, data.iter().copied());
                } else {
                    p.data.extend_from_slice(data);
                }
            }
            None => win.properties.push(Property {
                name,
                type_,
                format,
                data: data.to_vec(),
            }),
        }
        self.property_notify(w, name, PROPERTY_NEW_VALUE);
        Ok(Flow::Handled)
    }

    fn handle_delete_property(&mut self, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let name = self.atom_arg(r.u32()?)?;
        let props = &mut self.objects.window_mut(w).properties;
        if let Some(i) = props.iter().position(|p| p.name == name) {
            props.remove(i);
            self.property_notify(w, name, PROPERTY_DELETE);
        }
        Ok(Flow::Handled)
    }

    fn get_property(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let delete = call.detail != 0;
        let w = self.window_arg(r.u32()?)?;
        let name = self.atom_arg(r.u32()?)?;
        let type_ = r.u32()?;
        if type_ != ANY_PROPERTY_TYPE {
            self.atom_arg(type_)?;
        }
        let offset = r.u32()? as usize;
        let length = r.u32()? as usize;

        let mut body = Writer::new(call.order);
        let Some(prop) = self.objects.window(w).property(name) else {
            body.u32(NONE).u32(0).u32(0);
            return self.reply(call, 0, body);
        };
        if type_ != ANY_PROPERTY_TYPE && type_ != prop.type_ {
            body.u32(prop.type_).u32(prop.data.len() as u32).u32(0);
            let format = prop.format;
            return self.reply(call, format, body);
        }

        let total = prop.data.len();
        let start = offset.saturating_mul(4);
        if start > total {
            return Err(XError::Value(offset as u32).into());
        }
        let end = start + (total - start).min(length.saturating_mul(4));
        let after = total - end;
        let unit = prop.format as usize / 8;
        let format = prop.format;
        body.u32(prop.type_)
            .u32(after as u32)
            .u32(((end - start) / unit) as u32)
            .pad(12)
            .bytes(&prop.data[start..end]);
        match self.reply(call, format, body)? {
            Flow::Handled if delete && after == 0 => {
                self.objects.window_mut(w).properties.retain(|p| p.name != name);
                self.property_notify(w, name, PROPERTY_DELETE);
                Ok(Flow::Handled)
            }
            flow => Ok(flow),
        }
    }

    fn list_properties(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let props = &self.objects.window(w).properties;
        let mut body = Writer::new(call.order);
        body.u16(props.len() as u16).pad(22);
        for p in props {
            body.u32(p.name);
        }
        self.reply(call, 0, body)
    }

    // -- grabs and focus --

    fn grab_mode(v: u8) -> Result<(), XError> {
        match v {
            GRAB_MODE_ASYNC => Ok(()),
            GRAB_MODE_SYNC => Err(XError::Implementation),
            v => Err(XError::Value(v as u32)),
        }
    }

    fn handle_grab_pointer(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let owner_events = call.detail != 0;
        let window = self.window_arg(r.u32()?)?;
        let bits = r.u16()?;
        let pointer_mode = r.u8()?;
        let keyboard_mode = r.u8()?;
        let confine_to = match r.u32()? {
            NONE => None,
            id => Some(self.window_arg(id)?),
        };
        let cursor = match r.u32()? {
            NONE => None,
            id => Some(self.cursor_arg(id)?),
        };
        let time = r.u32()?;
        let event_mask = EventMask::from_bits(bits as u32).ok_or(XError::Value(bits as u32))?;
        Self::grab_mode(pointer_mode)?;
        Self::grab_mode(keyboard_mode)?;
        if !self.has_room(call, 32) {
            return Ok(Flow::WouldBlock);
        }
        let status = self.grab_pointer(call.client, window, owner_events, event_mask, confine_to, cursor, time);
        debug!(client = call.client.0, ?status, "grab pointer");
        self.reply(call, status as u8, Writer::new(call.order))
    }

    fn handle_ungrab_pointer(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let time = r.u32()?;
        let Some(grab) = &self.input.grab else {
            return Ok(Flow::Handled);
        };
        let in_range = time == CURRENT_TIME || (time >= grab.time && time <= self.now());
        if grab.client == call.client && in_range {
            self.ungrab_pointer();
        }
        Ok(Flow::Handled)
    }

    fn handle_grab_button(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let owner_events = call.detail != 0;
        let w = self.window_arg(r.u32()?)?;
        let bits = r.u16()?;
        let pointer_mode = r.u8()?;
        let keyboard_mode = r.u8()?;
        let confine_to = match r.u32()? {
            NONE => None,
            id => Some(self.window_arg(id)?),
        };
        let cursor = match r.u32()? {
            NONE => None,
            id => Some(self.cursor_arg(id)?),
        };
        let button = r.u8()?;
        r.pad(1)?;
        let modifiers = r.u16()?;
        let event_mask = EventMask::from_bits(bits as u32).ok_or(XError::Value(bits as u32))?;
        Self::grab_mode(pointer_mode)?;
        Self::grab_mode(keyboard_mode)?;
        if button == ANY_BUTTON {
            return Err(XError::Value(ANY_BUTTON as u32).into());
        }
        if modifiers != ANY_MODIFIER && modifiers & 0xff00 != 0 {
            return Err(XError::Value(modifiers as u32).into());
        }
        let win = self.objects.window(w);
        if win.button_grabs.iter().any(|g| g.button == button && g.modifiers == modifiers) {
            return Err(XError::Access.into());
        }
        for h in confine_to.into_iter().chain(cursor) {
            self.objects.retain(h);
        }
        self.objects.window_mut(w).button_grabs.push(ButtonGrab {
            client: call.client,
            button,
            modifiers,
            owner_events,
            event_mask,
            pointer_mode,
            keyboard_mode,
            confine_to,
            cursor,
        });
        Ok(Flow::Handled)
    }

    fn handle_ungrab_button(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let button = call.detail;
        let w = self.window_arg(r.u32()?)?;
        let modifiers = r.u16()?;
        let removed: Vec<ButtonGrab> = {
            let win = self.objects.window_mut(w);
            let (gone, kept): (Vec<ButtonGrab>, Vec<ButtonGrab>) = win.button_grabs.drain(..).partition(|g| {
                g.client == call.client
                    && (button == ANY_BUTTON || g.button == button)
                    && (modifiers == ANY_MODIFIER || g.modifiers == modifiers)
            });
            win.button_grabs = kept;
            gone
        };
        for g in removed {
            self.release_grab_refs(g.confine_to, g.cursor);
        }
        Ok(Flow::Handled)
    }

    fn handle_grab_server(&mut self, call: &Call) -> RequestResult {
        match self.server_grab.holder {
            Some(holder) if holder != call.client => {
                return Err(RequestError::Fatal("GrabServer while another client holds the server".into()));
            }
            _ => {}
        }
        self.server_grab.holder = Some(call.client);
        self.server_grab.depth += 1;
        Ok(Flow::Handled)
    }

    fn handle_ungrab_server(&mut self, call: &Call) -> RequestResult {
        match self.server_grab.holder {
            None => {}
            Some(holder) if holder != call.client => {
                return Err(RequestError::Fatal("UngrabServer while another client holds the server".into()));
            }
            Some(_) => {
                self.server_grab.depth -= 1;
                if self.server_grab.depth == 0 {
                    self.server_grab.holder = None;
                }
            }
        }
        Ok(Flow::Handled)
    }

    fn query_pointer(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let w = self.window_arg(r.u32()?)?;
        let pointer = self.input.pointer_window;
        // child of `w` on the path to the pointer window
        let child = std::iter::once(pointer)
            .chain(self.objects.ancestors(pointer))
            .find(|&a| self.objects.parent(a) == Some(w));
        let (ox, oy) = self.objects.interior_origin(w);
        let mut body = Writer::new(call.order);
        body.u32(self.screen.root)
            .u32(child.map_or(NONE, |c| self.objects.id(c)))
            .i16(self.input.x as i16)
            .i16(self.input.y as i16)
            .i16((self.input.x - ox) as i16)
            .i16((self.input.y - oy) as i16)
            .u16(self.input.state());
        self.reply(call, 1, body)
    }

    fn handle_warp_pointer(&mut self, r: &mut Reader) -> RequestResult {
        let src = match r.u32()? {
            NONE => None,
            id => Some(self.window_arg(id)?),
        };
        let dst = match r.u32()? {
            NONE => None,
            id => Some(self.window_arg(id)?),
        };
        let src_x = r.i16()? as i64;
        let src_y = r.i16()? as i64;
        let src_w = r.u16()? as i64;
        let src_h = r.u16()? as i64;
        let dst_x = r.i16()? as i64;
        let dst_y = r.i16()? as i64;

        if let Some(s) = src {
            let win = self.objects.window(s);
            let (ox, oy) = self.objects.interior_origin(s);
            let w = if src_w == 0 { win.width() as i64 - src_x } else { src_w };
            let h = if src_h == 0 { win.height() as i64 - src_y } else { src_h };
            let area = Rect::new(ox + src_x, oy + src_y, w, h).intersect(&self.objects.full_rect(s));
            if !area.contains_point(self.input.x, self.input.y) {
                return Ok(Flow::Handled);
            }
        }
        let (x, y) = match dst {
            Some(d) => {
                let (ox, oy) = self.objects.interior_origin(d);
                (ox + dst_x, oy + dst_y)
            }
            None => (self.input.x + dst_x, self.input.y + dst_y),
        };
        self.pointer_motion(x, y);
        Ok(Flow::Handled)
    }

    fn handle_set_input_focus(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let revert_to = RevertTo::from_u8(call.detail).ok_or(XError::Value(call.detail as u32))?;
        let focus = match r.u32()? {
            NONE => Focus::None,
            POINTER_ROOT => Focus::PointerRoot,
            id => {
                let w = self.window_arg(id)?;
                if !self.objects.viewable(w) {
                    return Err(XError::Match.into());
                }
                Focus::Window(w)
            }
        };
        let now = self.now();
        let time = match r.u32()? {
            CURRENT_TIME => now,
            t => t,
        };
        if time < self.input.focus_time || time > now {
            return Ok(Flow::Handled);
        }
        self.set_focus(focus, revert_to, time);
        Ok(Flow::Handled)
    }

    fn get_input_focus(&mut self, call: &Call) -> RequestResult {
        let focus = match self.input.focus {
            Focus::None => NONE,
            Focus::PointerRoot => POINTER_ROOT,
            Focus::Window(w) => self.objects.id(w),
        };
        let mut body = Writer::new(call.order);
        body.u32(focus);
        let revert_to = self.input.revert_to as u8;
        self.reply(call, revert_to, body)
    }

    // -- fonts --

    fn handle_open_font(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let fid = r.u32()?;
        let len = r.u16()? as usize;
        r.pad(2)?;
        let name = r.bytes(len)?;
        self.new_id(call, fid)?;
        let face = self.fonts.find(name).ok_or(XError::Name)?;
        self.register(fid, Some(call.client), ObjectKind::Font(Font { face }));
        Ok(Flow::Handled)
    }

    fn handle_close_font(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.font_arg(r.u32()?)?;
        self.free_resource(h);
        Ok(Flow::Handled)
    }

    fn list_fonts(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let max = r.u16()? as usize;
        let len = r.u16()? as usize;
        let pattern = r.bytes(len)?;
        let names: Vec<&str> = self
            .fonts
            .names()
            .filter(|f| pattern_matches(pattern, f.as_bytes()))
            .take(max)
            .collect();
        let mut body = Writer::new(call.order);
        body.u16(names.len() as u16).pad(22);
        for n in names {
            body.u8(n.len() as u8).bytes(n.as_bytes());
        }
        self.reply(call, 0, body)
    }

    // -- pixmaps, graphics contexts and drawing --

    fn handle_create_pixmap(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let depth = call.detail;
        let pid = r.u32()?;
        let drawable = r.u32()?;
        let width = r.u16()?;
        let height = r.u16()?;
        self.new_id(call, pid)?;
        self.drawable_arg(drawable)?;
        if width == 0 || height == 0 {
            return Err(XError::Value(0).into());
        }
        if format_for_depth(depth).is_none() {
            return Err(XError::Value(depth as u32).into());
        }
        let pixmap = Drawable::new(width, height, depth, self.screen.root, 0)?;
        self.register(pid, Some(call.client), ObjectKind::Pixmap(pixmap));
        Ok(Flow::Handled)
    }

    fn handle_free_pixmap(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.pixmap_arg(r.u32()?)?;
        self.free_resource(h);
        Ok(Flow::Handled)
    }

    pub(crate) fn read_gc_values(r: &mut Reader, gc: &mut GContext) -> Result<(), XError> {
        let bits = r.u32()?;
        let mask = GcAttr::from_bits(bits).ok_or(XError::Value(bits))?;
        for bit in mask.iter() {
            let v = r.u32()?;
            if bit == GcAttr::FUNCTION {
                if v > 15 {
                    return Err(XError::Value(v));
                }
                gc.function = v as u8;
            } else if bit == GcAttr::PLANE_MASK {
                gc.plane_mask = v;
            } else if bit == GcAttr::FOREGROUND {
                gc.foreground = v;
            } else if bit == GcAttr::BACKGROUND {
                gc.background = v;
            } else if bit == GcAttr::LINE_WIDTH {
                gc.line_width = v as u16;
            } else if bit == GcAttr::FILL_RULE || bit == GcAttr::ARC_MODE || bit == GcAttr::GRAPHICS_EXPOSURES {
                if v > 1 {
                    return Err(XError::Value(v));
                }
                if bit == GcAttr::FILL_RULE {
                    gc.fill_rule = v as u8;
                } else if bit == GcAttr::ARC_MODE {
                    gc.arc_mode = v as u8;
                } else {
                    gc.graphics_exposures = v == 1;
                }
            }
            // other components are accepted and not rendered
        }
        Ok(())
    }

    fn handle_create_gc(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let cid = r.u32()?;
        let d = self.drawable_arg(r.u32()?)?;
        self.new_id(call, cid)?;
        let mut gc = GContext::new(self.objects.drawable(d).depth);
        Self::read_gc_values(r, &mut gc)?;
        self.register(cid, Some(call.client), ObjectKind::GContext(gc));
        Ok(Flow::Handled)
    }

    fn handle_change_gc(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.gc_arg(r.u32()?)?;
        let mut gc = *self.objects.gcontext(h);
        Self::read_gc_values(r, &mut gc)?;
        *self.objects.gcontext_mut(h) = gc;
        Ok(Flow::Handled)
    }

    fn handle_free_gc(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.gc_arg(r.u32()?)?;
        self.free_resource(h);
        Ok(Flow::Handled)
    }

    /// Drawable and GC for a drawing request; depths must agree.
    pub(crate) fn draw_args(&mut self, r: &mut Reader) -> Result<(Handle, GContext), XError> {
        let d = self.drawable_arg(r.u32()?)?;
        let g = self.gc_arg(r.u32()?)?;
        let gc = *self.objects.gcontext(g);
        let drawable = self.objects.drawable(d);
        if !drawable.has_pixels() || drawable.depth != gc.depth {
            return Err(XError::Match);
        }
        Ok((d, gc))
    }

    /// Background for ClearArea, following ParentRelative up the tree.
    fn clear_source(&self, w: Handle) -> Option<Background> {
        let mut cur = w;
        loop {
            let win = self.objects.window(cur);
            match win.attributes.background {
                Background::ParentRelative => cur = win.parent?,
                bg => return Some(bg),
            }
        }
    }

    fn handle_clear_area(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let exposures = call.detail != 0;
        let w = self.window_arg(r.u32()?)?;
        let x = r.i16()? as i64;
        let y = r.i16()? as i64;
        let width = r.u16()? as i64;
        let height = r.u16()? as i64;
        let win = self.objects.window(w);
        if win.class == WindowClass::InputOnly {
            return Err(XError::Match.into());
        }
        let width = if width == 0 { win.width() as i64 - x } else { width };
        let height = if height == 0 { win.height() as i64 - y } else { height };
        let area = Rect::new(x, y, width, height).intersect(&win.interior());
        if area.is_empty() {
            return Ok(Flow::Handled);
        }

        match self.clear_source(w) {
            Some(Background::Pixel(p)) => self.objects.window_mut(w).drawable.fill_rect(area, p),
            Some(Background::Pixmap(tile)) => {
                let t = self.objects.drawable(tile);
                let (tw, th) = (t.width as i64, t.height as i64);
                let mut rows = Vec::with_capacity(area.height() as usize);
                for yy in area.top..area.bottom {
                    let row: Vec<u32> = (area.left..area.right)
                        .map(|xx| t.pixel((xx % tw) as usize, (yy % th) as usize))
                        .collect();
                    rows.push(row);
                }
                let d = &mut self.objects.window_mut(w).drawable;
                for (yy, row) in (area.top..area.bottom).zip(rows) {
                    for (xx, v) in (area.left..area.right).zip(row) {
                        d.set_pixel(xx as usize, yy as usize, v);
                    }
                }
            }
            _ => {}
        }
        self.damage_drawable(w, area);
        if exposures && self.objects.viewable(w) {
            let event = Event::Expose {
                window: self.objects.id(w),
                x: area.left as u16,
                y: area.top as u16,
                width: area.width() as u16,
                height: area.height() as u16,
                count: 0,
            };
            self.deliver(w, EventMask::EXPOSURE, &event);
        }
        Ok(Flow::Handled)
    }

    fn handle_poly_fill_rectangle(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        if r.remaining() % 8 != 0 {
            return Err(XError::Length.into());
        }
        while r.remaining() > 0 {
            let rect = Rect::new(r.i16()? as i64, r.i16()? as i64, r.u16()? as i64, r.u16()? as i64);
            self.objects.drawable_mut(d).fill_rect(rect, gc.foreground);
            self.damage_drawable(d, rect);
        }
        Ok(Flow::Handled)
    }

    fn handle_put_image(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let format = call.detail;
        let (d, gc) = self.draw_args(r)?;
        let width = r.u16()?;
        let height = r.u16()?;
        let dst_x = r.i16()?;
        let dst_y = r.i16()?;
        let left_pad = r.u8()?;
        let depth = r.u8()?;
        r.pad(2)?;
        let drawable_depth = self.objects.drawable(d).depth;

        match format {
            IMAGE_FORMAT_Z_PIXMAP => {
                if left_pad != 0 || depth != drawable_depth || !matches!(depth, 24 | 32) {
                    return Err(XError::Match.into());
                }
                let data = r.bytes(width as usize * height as usize * 4)?;
                self.objects
                    .drawable_mut(d)
                    .put_z_pixmap(dst_x, dst_y, width, height, data);
            }
            IMAGE_FORMAT_BITMAP | IMAGE_FORMAT_XY_PIXMAP => {
                if depth != 1 || (format == IMAGE_FORMAT_XY_PIXMAP && drawable_depth != 1) || left_pad >= 32 {
                    return Err(XError::Match.into());
                }
                let stride = (width as usize + left_pad as usize).div_ceil(32) * 4;
                let data = r.bytes(stride * height as usize)?;
                let (one, zero) = if format == IMAGE_FORMAT_BITMAP {
                    (gc.foreground, gc.background)
                } else {
                    (1, 0)
                };
                self.objects
                    .drawable_mut(d)
                    .put_bits(dst_x, dst_y, width, height, left_pad, data, one, zero);
            }
            v => return Err(XError::Value(v as u32).into()),
        }
        let rect = Rect::new(dst_x as i64, dst_y as i64, width as i64, height as i64);
        self.damage_drawable(d, rect);
        Ok(Flow::Handled)
    }

    // -- cursors --

    fn handle_create_cursor(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let cid = r.u32()?;
        let source = self.pixmap_arg(r.u32()?)?;
        let mask = match r.u32()? {
            NONE => None,
            id => Some(self.pixmap_arg(id)?),
        };
        let fore = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        let back = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        let hot_x = r.u16()?;
        let hot_y = r.u16()?;
        self.new_id(call, cid)?;

        let src = self.objects.drawable(source);
        let (width, height) = (src.width, src.height);
        if src.depth != 1 || hot_x >= width || hot_y >= height {
            return Err(XError::Match.into());
        }
        if let Some(m) = mask {
            let m = self.objects.drawable(m);
            if m.depth != 1 || m.width != width || m.height != height {
                return Err(XError::Match.into());
            }
        }
        for h in std::iter::once(source).chain(mask) {
            self.objects.retain(h);
        }
        self.register(
            cid,
            Some(call.client),
            ObjectKind::Cursor(Cursor {
                source,
                mask,
                foreground: fore,
                background: back,
                hot_x: hot_x as i32,
                hot_y: hot_y as i32,
                mask_x: 0,
                mask_y: 0,
            }),
        );
        Ok(Flow::Handled)
    }

    fn handle_create_glyph_cursor(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let cid = r.u32()?;
        let source_font = self.font_arg(r.u32()?)?;
        let mask_font = match r.u32()? {
            NONE => None,
            id => Some(self.font_arg(id)?),
        };
        let source_char = r.u16()?;
        let mask_char = r.u16()?;
        let fore = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        let back = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        self.new_id(call, cid)?;

        let glyph = |server: &Self, font: Handle, ch: u16| {
            let face = server.objects.font(font).face;
            server.fonts.face(face).glyph(ch).ok_or(XError::Value(ch as u32))
        };
        let source = glyph(self, source_font, source_char)?;
        let mask = match mask_font {
            Some(m) => Some(glyph(self, m, mask_char)?),
            None => None,
        };
        let cursor = glyph_cursor(&mut self.objects, source, mask, fore, back);
        self.register(cid, Some(call.client), ObjectKind::Cursor(cursor));
        Ok(Flow::Handled)
    }

    fn handle_free_cursor(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.cursor_arg(r.u32()?)?;
        self.free_resource(h);
        Ok(Flow::Handled)
    }

    fn handle_recolor_cursor(&mut self, r: &mut Reader) -> RequestResult {
        let h = self.cursor_arg(r.u32()?)?;
        let fore = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        let back = rgb16_to_pixel(r.u16()?, r.u16()?, r.u16()?);
        let c = self.objects.cursor_mut(h);
        c.foreground = fore;
        c.background = back;
        if self.input.cursor == Some(h) {
            self.damage_cursor();
        }
        Ok(Flow::Handled)
    }

    /// Cursor 0 is limited to 256 square; tiles and stipples take any size.
    fn query_best_size(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let class = call.detail;
        let d = self.drawable_arg(r.u32()?)?;
        let width = r.u16()?;
        let height = r.u16()?;
        let (width, height) = match class {
            QUERY_CURSOR => (width.min(MAX_CURSOR_SIZE), height.min(MAX_CURSOR_SIZE)),
            QUERY_TILE | QUERY_STIPPLE => {
                if !self.objects.drawable(d).has_pixels() {
                    return Err(XError::Match.into());
                }
                (width, height)
            }
            v => return Err(XError::Value(v as u32).into()),
        };
        let mut body = Writer::new(call.order);
        body.u16(width).u16(height);
        self.reply(call, 0, body)
    }

    // -- extensions --

    fn query_extension(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let len = r.u16()? as usize;
        r.pad(2)?;
        let name = r.bytes(len)?;
        debug!(client = call.client.0, name = %latin1(name), "extension not present");
        let mut body = Writer::new(call.order);
        body.u8(0).u8(0).u8(0).u8(0);
        self.reply(call, 0, body)
    }

    fn list_extensions(&mut self, call: &Call) -> RequestResult {
        self.reply(call, 0, Writer::new(call.order))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::atom;
    use crate::server::tests::{connect, test_server};

    /// Send one little-endian request and return everything queued for the
    /// client afterwards.
    pub(crate) fn request(server: &mut Server, client: ClientId, opcode: u8, detail: u8, body: Writer) -> Vec<u8> {
        let body = body.finish();
        assert_eq!(body.len() % 4, 0);
        let mut bytes = vec![opcode, detail];
        bytes.extend_from_slice(&((body.len() / 4 + 1) as u16).to_le_bytes());
        bytes.extend_from_slice(&body);
        server.clients.get_mut(&client).unwrap().feed(&bytes);
        server.service_client(client);
        server.clients.get_mut(&client).unwrap().take_output()
    }

    pub(crate) fn body() -> Writer {
        Writer::new(ByteOrder::Little)
    }

    pub(crate) fn u32_at(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    pub(crate) fn create_window(
        server: &mut Server,
        client: ClientId,
        wid: u32,
        parent: u32,
        geometry: (i16, i16, u16, u16),
        mask: u32,
        values: &[u32],
    ) -> Vec<u8> {
        let mut b = body();
        b.u32(wid)
            .u32(parent)
            .i16(geometry.0)
            .i16(geometry.1)
            .u16(geometry.2)
            .u16(geometry.3)
            .u16(0)
            .u16(1)
            .u32(0)
            .u32(mask);
        for &v in values {
            b.u32(v);
        }
        request(server, client, op::CREATE_WINDOW, 0, b)
    }

    pub(crate) fn map(server: &mut Server, client: ClientId, wid: u32) -> Vec<u8> {
        let mut b = body();
        b.u32(wid);
        request(server, client, op::MAP_WINDOW, 0, b)
    }

    pub(crate) fn change_property(server: &mut Server, client: ClientId, mode: u8, wid: u32, name: u32, type_: u32, data: &[u8]) -> Vec<u8> {
        let mut b = body();
        b.u32(wid)
            .u32(name)
            .u32(type_)
            .u8(8)
            .pad(3)
            .u32(data.len() as u32)
            .bytes(data)
            .align();
        request(server, client, op::CHANGE_PROPERTY, mode, b)
    }

    #[test]
    fn test_properties_round_trip_in_order() {
        let mut server = test_server();
        let c = connect(&mut server);
        let wid = server.clients[&c].id_base + 1;
        assert!(create_window(&mut server, c, wid, 1, (0, 0, 100, 100), 0, &[]).is_empty());

        assert!(change_property(&mut server, c, PROP_MODE_REPLACE, wid, atom::WM_NAME, atom::STRING, b"hello").is_empty());
        assert!(change_property(&mut server, c, PROP_MODE_REPLACE, wid, 37, atom::STRING, b"icon").is_empty());
        assert!(change_property(&mut server, c, PROP_MODE_APPEND, wid, atom::WM_NAME, atom::STRING, b" world").is_empty());

        let mut b = body();
        b.u32(wid).u32(atom::WM_NAME).u32(ANY_PROPERTY_TYPE).u32(0).u32(100);
        let out = request(&mut server, c, op::GET_PROPERTY, 0, b);
        assert_eq!(out[0], 1);
        assert_eq!(out[1], 8);
        assert_eq!(u32_at(&out, 8), atom::STRING);
        assert_eq!(u32_at(&out, 12), 0);
        assert_eq!(u32_at(&out, 16), 11);
        assert_eq!(&out[32..43], b"hello world");
        assert_eq!(out.len(), 32 + 12);

        let mut b = body();
        b.u32(wid);
        let out = request(&mut server, c, op::LIST_PROPERTIES, 0, b);
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 2);
        assert_eq!(u32_at(&out, 32), atom::WM_NAME);
        assert_eq!(u32_at(&out, 36), 37);

        // appending with another type is a Match error
        let out = change_property(&mut server, c, PROP_MODE_APPEND, wid, atom::WM_NAME, atom::ATOM, b"x");
        assert_eq!(out[0], 0);
        assert_eq!(out[1], XError::Match.code());
    }

    #[test]
    fn test_get_property_partial_and_delete() {
        let mut server = test_server();
        let c = connect(&mut server);
        let wid = server.clients[&c].id_base + 1;
        create_window(&mut server, c, wid, 1, (0, 0, 10, 10), 0, &[]);
        change_property(&mut server, c, PROP_MODE_REPLACE, wid, atom::WM_NAME, atom::STRING, b"abcdefgh");

        let mut b = body();
        b.u32(wid).u32(atom::WM_NAME).u32(atom::STRING).u32(1).u32(1);
        let out = request(&mut server, c, op::GET_PROPERTY, 1, b);
        assert_eq!(u32_at(&out, 12), 0, "nothing left after the second word");
        assert_eq!(&out[32..36], b"efgh");
        let w = server.objects.find(wid).unwrap();
        assert!(server.objects.window(w).properties.is_empty());
    }

    #[test]
    fn test_nw_gravity_resize() {
        let mut server = test_server();
        let c = connect(&mut server);
        let wid = server.clients[&c].id_base + 1;
        let gc = wid + 1;
        let mask = (WindowAttr::BACK_PIXEL | WindowAttr::BIT_GRAVITY | WindowAttr::EVENT_MASK).bits();
        let events = (EventMask::STRUCTURE_NOTIFY | EventMask::EXPOSURE).bits();
        let out = create_window(&mut server, c, wid, 1, (10, 10, 100, 100), mask, &[0x0000ff, 1, events]);
        assert!(out.is_empty());
        let out = map(&mut server, c, wid);
        let codes: Vec<u8> = out.chunks(32).map(|e| e[0]).collect();
        assert_eq!(codes, vec![19, 12]);

        let mut b = body();
        b.u32(gc).u32(wid).u32(GcAttr::FOREGROUND.bits()).u32(0xff0000);
        assert!(request(&mut server, c, op::CREATE_GC, 0, b).is_empty());
        let mut b = body();
        b.u32(wid).u32(gc).i16(0).i16(0).u16(10).u16(10);
        assert!(request(&mut server, c, op::POLY_FILL_RECTANGLE, 0, b).is_empty());

        let mut b = body();
        b.u32(wid)
            .u16((ConfigMask::WIDTH | ConfigMask::HEIGHT).bits())
            .pad(2)
            .u32(200)
            .u32(50);
        let out = request(&mut server, c, op::CONFIGURE_WINDOW, 0, b);
        let codes: Vec<u8> = out.chunks(32).map(|e| e[0]).collect();
        assert_eq!(codes, vec![22, 12]);
        assert_eq!(u16::from_le_bytes([out[20], out[21]]), 200);
        assert_eq!(u16::from_le_bytes([out[22], out[23]]), 50);

        let w = server.objects.find(wid).unwrap();
        let d = &server.objects.window(w).drawable;
        assert_eq!((d.width, d.height), (200, 50));
        assert_eq!(d.pixel(5, 5), 0xff0000);
        assert_eq!(d.pixel(9, 9), 0xff0000);
        assert_eq!(d.pixel(10, 10), 0x0000ff);
        assert_eq!(d.pixel(150, 20), 0x0000ff);
    }

    #[test]
    fn test_front_sibling_occludes() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let back_pixel = WindowAttr::BACK_PIXEL.bits();
        create_window(&mut server, c, base + 1, 1, (0, 0, 50, 50), back_pixel, &[0x111111]);
        create_window(&mut server, c, base + 2, 1, (25, 25, 50, 50), back_pixel, &[0x222222]);
        map(&mut server, c, base + 1);
        map(&mut server, c, base + 2);
        server.composite_damage();
        assert_eq!(server.framebuffer.pixel(10, 10), 0x111111);
        assert_eq!(server.framebuffer.pixel(30, 30), 0x222222);
        assert_eq!(server.framebuffer.pixel(60, 60), 0x222222);

        // raise the first window
        let mut b = body();
        b.u32(base + 1).u16(ConfigMask::STACK_MODE.bits()).pad(2).u32(StackMode::Above as u32);
        request(&mut server, c, op::CONFIGURE_WINDOW, 0, b);
        server.composite_damage();
        assert_eq!(server.framebuffer.pixel(30, 30), 0x111111);
    }

    #[test]
    fn test_exclusive_selection() {
        let mut server = test_server();
        let wm = connect(&mut server);
        let other = connect(&mut server);
        let mask = WindowAttr::EVENT_MASK.bits();
        let mut b = body();
        b.u32(1).u32(mask).u32(EventMask::SUBSTRUCTURE_REDIRECT.bits());
        assert!(request(&mut server, wm, op::CHANGE_WINDOW_ATTRIBUTES, 0, b).is_empty());
        let mut b = body();
        b.u32(1).u32(mask).u32(EventMask::SUBSTRUCTURE_REDIRECT.bits());
        let out = request(&mut server, other, op::CHANGE_WINDOW_ATTRIBUTES, 0, b);
        assert_eq!(out[1], XError::Access.code());
    }

    #[test]
    fn test_map_request_redirect() {
        let mut server = test_server();
        let wm = connect(&mut server);
        let app = connect(&mut server);
        let mut b = body();
        b.u32(1)
            .u32(WindowAttr::EVENT_MASK.bits())
            .u32(EventMask::SUBSTRUCTURE_REDIRECT.bits());
        request(&mut server, wm, op::CHANGE_WINDOW_ATTRIBUTES, 0, b);

        let wid = server.clients[&app].id_base + 1;
        create_window(&mut server, app, wid, 1, (0, 0, 10, 10), 0, &[]);
        map(&mut server, app, wid);
        let out = server.clients.get_mut(&wm).unwrap().take_output();
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 20);
        assert_eq!(u32_at(&out, 8), wid);
        let w = server.objects.find(wid).unwrap();
        assert!(!server.objects.window(w).mapped);

        // the window manager's own map goes through
        map(&mut server, wm, wid);
        assert!(server.objects.window(w).mapped);
    }

    #[test]
    fn test_destroy_and_client_cleanup() {
        let mut server = test_server();
        let baseline = server.objects.len();
        let watcher = connect(&mut server);
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;

        let mut b = body();
        b.u32(1)
            .u32(WindowAttr::EVENT_MASK.bits())
            .u32(EventMask::SUBSTRUCTURE_NOTIFY.bits());
        request(&mut server, watcher, op::CHANGE_WINDOW_ATTRIBUTES, 0, b);

        create_window(&mut server, c, base + 1, 1, (0, 0, 40, 40), 0, &[]);
        create_window(&mut server, c, base + 2, base + 1, (0, 0, 10, 10), 0, &[]);
        let mut b = body();
        b.u32(base + 3).u32(1).u16(8).u16(8);
        request(&mut server, c, op::CREATE_PIXMAP, 24, b);
        assert_eq!(server.objects.len(), baseline + 3);
        let out = server.clients.get_mut(&watcher).unwrap().take_output();
        assert_eq!(out.len(), 32, "CreateNotify for the top-level window only");
        assert_eq!(out[0], 16);

        let mut b = body();
        b.u32(base + 1);
        request(&mut server, c, op::DESTROY_WINDOW, 0, b);
        assert!(!server.objects.contains(base + 1));
        assert!(!server.objects.contains(base + 2));
        let out = server.clients.get_mut(&watcher).unwrap().take_output();
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 17);
        assert_eq!(u32_at(&out, 8), base + 1);

        create_window(&mut server, c, base + 4, 1, (0, 0, 40, 40), 0, &[]);
        server.remove_client(c);
        assert_eq!(server.objects.len(), baseline);
    }

    #[test]
    fn test_bad_window_and_id_choice() {
        let mut server = test_server();
        let c = connect(&mut server);
        let out = map(&mut server, c, 0x1234567);
        assert_eq!(out[1], XError::Window(0).code());
        assert_eq!(u32_at(&out, 4), 0x1234567);

        // ids outside the client's range are rejected
        let out = create_window(&mut server, c, 0x42, 1, (0, 0, 10, 10), 0, &[]);
        assert_eq!(out[1], XError::IdChoice(0).code());
    }

    #[test]
    fn test_intern_atom() {
        let mut server = test_server();
        let c = connect(&mut server);
        let mut b = body();
        b.u16(7).pad(2).bytes(b"WM_NAME").align();
        let out = request(&mut server, c, op::INTERN_ATOM, 1, b);
        assert_eq!(u32_at(&out, 8), atom::WM_NAME);

        let mut b = body();
        b.u16(4).pad(2).bytes(b"_NEW");
        let out = request(&mut server, c, op::INTERN_ATOM, 1, b);
        assert_eq!(u32_at(&out, 8), NONE);
        let mut b = body();
        b.u16(4).pad(2).bytes(b"_NEW");
        let out = request(&mut server, c, op::INTERN_ATOM, 0, b);
        let id = u32_at(&out, 8);
        assert_ne!(id, NONE);

        let mut b = body();
        b.u32(id);
        let out = request(&mut server, c, op::GET_ATOM_NAME, 0, b);
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 4);
        assert_eq!(&out[32..36], b"_NEW");
    }

    #[test]
    fn test_grab_button_rules() {
        let mut server = test_server();
        let c = connect(&mut server);
        let grab = |button: u8, modifiers: u16| {
            let mut b = body();
            b.u32(1)
                .u16(EventMask::BUTTON_PRESS.bits() as u16)
                .u8(GRAB_MODE_ASYNC)
                .u8(GRAB_MODE_ASYNC)
                .u32(0)
                .u32(0)
                .u8(button)
                .pad(1)
                .u16(modifiers);
            b
        };
        let out = request(&mut server, c, op::GRAB_BUTTON, 0, grab(ANY_BUTTON, 0));
        assert_eq!(out[1], XError::Value(0).code());
        assert!(request(&mut server, c, op::GRAB_BUTTON, 0, grab(1, ANY_MODIFIER)).is_empty());
        let out = request(&mut server, c, op::GRAB_BUTTON, 0, grab(1, ANY_MODIFIER));
        assert_eq!(out[1], XError::Access.code());

        let mut b = body();
        b.u32(1).u16(ANY_MODIFIER).pad(2);
        request(&mut server, c, op::UNGRAB_BUTTON, ANY_BUTTON, b);
        let root = server.root;
        assert!(server.objects.window(root).button_grabs.is_empty());
    }

    #[test]
    fn test_server_grab_blocks_others() {
        let mut server = test_server();
        let a = connect(&mut server);
        let b_client = connect(&mut server);
        request(&mut server, a, op::GRAB_SERVER, 0, body());
        request(&mut server, a, op::GRAB_SERVER, 0, body());
        assert_eq!(server.server_grab.depth, 2);

        // b's request waits until the grab ends
        let out = request(&mut server, b_client, op::GET_INPUT_FOCUS, 0, body());
        assert!(out.is_empty());
        request(&mut server, a, op::UNGRAB_SERVER, 0, body());
        request(&mut server, a, op::UNGRAB_SERVER, 0, body());
        assert!(server.server_grab.holder.is_none());
        server.service_client(b_client);
        let out = server.clients.get_mut(&b_client).unwrap().take_output();
        assert_eq!(out[0], 1);
    }

    #[test]
    fn test_list_fonts_pattern() {
        assert!(pattern_matches(b"*", b"fixed"));
        assert!(pattern_matches(b"FIX?D", b"fixed"));
        assert!(!pattern_matches(b"c*x", b"cursor"));
        let mut server = test_server();
        let c = connect(&mut server);
        let mut b = body();
        b.u16(10).u16(1).bytes(b"*").align();
        let out = request(&mut server, c, op::LIST_FONTS, 0, b);
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 2);
        assert_eq!(&out[32..39], b"\x06cursor");
    }

    fn open_font(server: &mut Server, client: ClientId, fid: u32, name: &[u8]) -> Vec<u8> {
        let mut b = body();
        b.u32(fid).u16(name.len() as u16).pad(2).bytes(name).align();
        request(server, client, op::OPEN_FONT, 0, b)
    }

    fn glyph_cursor_request(server: &mut Server, client: ClientId, cid: u32, fonts: (u32, u32), chars: (u16, u16)) -> Vec<u8> {
        let mut b = body();
        b.u32(cid)
            .u32(fonts.0)
            .u32(fonts.1)
            .u16(chars.0)
            .u16(chars.1)
            .u16(0)
            .u16(0)
            .u16(0)
            .u16(0xffff)
            .u16(0xffff)
            .u16(0xffff);
        request(server, client, op::CREATE_GLYPH_CURSOR, 0, b)
    }

    #[test]
    fn test_create_glyph_cursor() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (cursor_font, fixed, cid) = (base + 1, base + 2, base + 3);
        assert!(open_font(&mut server, c, cursor_font, b"cursor").is_empty());
        assert!(open_font(&mut server, c, fixed, b"Fixed").is_empty());
        let out = open_font(&mut server, c, base + 9, b"helvetica");
        assert_eq!((out[0], out[1]), (0, 15));

        assert!(glyph_cursor_request(&mut server, c, cid, (cursor_font, cursor_font), (152, 153)).is_empty());
        let h = server.objects.find(cid).unwrap();
        let cursor = server.objects.cursor(h);
        assert_eq!((cursor.hot_x, cursor.hot_y), (7, 8));
        assert_eq!((cursor.foreground, cursor.background), (0x000000, 0xffffff));
        assert_eq!(server.objects.cursor_bounds(h), Rect::new(0, 0, 16, 16));

        // mask from another font, aligned on the glyph origin
        assert!(glyph_cursor_request(&mut server, c, base + 4, (cursor_font, fixed), (152, b'M' as u16)).is_empty());
        let mixed = server.objects.find(base + 4).unwrap();
        let m = server.objects.cursor(mixed);
        assert_eq!((m.mask_x, m.mask_y), (7, -6));
        assert_eq!(server.objects.cursor_bounds(mixed), Rect::new(7, -6, 8, 16));

        // no mask font: the whole source shows
        assert!(glyph_cursor_request(&mut server, c, base + 5, (fixed, NONE), (b'A' as u16, 0)).is_empty());
        let plain = server.objects.find(base + 5).unwrap();
        assert!(server.objects.cursor(plain).mask.is_none());
        assert_eq!(server.objects.cursor_bounds(plain), Rect::new(0, 0, 8, 16));

        let out = glyph_cursor_request(&mut server, c, base + 6, (fixed, NONE), (3, 0));
        assert_eq!((out[0], out[1]), (0, 2));
        let out = glyph_cursor_request(&mut server, c, base + 6, (base + 40, NONE), (65, 0));
        assert_eq!((out[0], out[1]), (0, 7));
    }

    #[test]
    fn test_recolor_cursor_and_best_size() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        assert!(open_font(&mut server, c, base + 1, b"cursor").is_empty());
        assert!(glyph_cursor_request(&mut server, c, base + 2, (base + 1, base + 1), (68, 69)).is_empty());
        let mut b = body();
        b.u32(base + 2).u16(0xffff).u16(0).u16(0).u16(0).u16(0).u16(0xffff);
        assert!(request(&mut server, c, op::RECOLOR_CURSOR, 0, b).is_empty());
        let h = server.objects.find(base + 2).unwrap();
        let cursor = server.objects.cursor(h);
        assert_eq!((cursor.foreground, cursor.background), (0xff0000, 0x0000ff));

        let mut b = body();
        b.u32(1).u16(1000).u16(20);
        let out = request(&mut server, c, op::QUERY_BEST_SIZE, QUERY_CURSOR, b);
        assert_eq!(out[0], 1);
        assert_eq!(&out[8..12], &[0, 1, 20, 0]);

        let mut b = body();
        b.u32(1).u16(1000).u16(20);
        let out = request(&mut server, c, op::QUERY_BEST_SIZE, QUERY_TILE, b);
        assert_eq!(&out[8..12], &[0xe8, 0x03, 20, 0]);

        let mut b = body();
        b.u32(1).u16(1).u16(1);
        let out = request(&mut server, c, op::QUERY_BEST_SIZE, 3, b);
        assert_eq!((out[0], out[1]), (0, 2));
    }
}
