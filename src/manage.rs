//! Window lifecycle
//!
//! Mapping, unmapping, reconfiguring, restacking, reparenting and destroying
//! windows, along with the structure events, damage and input updates each
//! one implies.

use crate::client::ClientId;
use crate::error::XError;
use crate::events::Event;
use crate::object::Handle;
use crate::proto::{ConfigMask, EventMask, StackMode, NONE};
use crate::server::Server;
use crate::window::WindowClass;

/// Requested ConfigureWindow changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigureValues {
    pub x: Option<i16>,
    pub y: Option<i16>,
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub border_width: Option<u16>,
    pub sibling: Option<Handle>,
    pub stack_mode: Option<StackMode>,
}

impl Server {
    /// Expose every viewable window in the subtree of `h`.
    pub(crate) fn expose_subtree(&mut self, h: Handle) {
        for w in self.objects.subtree(h) {
            if !self.objects.viewable(w) {
                continue;
            }
            let win = self.objects.window(w);
            if win.class == WindowClass::InputOnly {
                continue;
            }
            let event = Event::Expose {
                window: self.objects.id(w),
                x: 0,
                y: 0,
                width: win.width(),
                height: win.height(),
                count: 0,
            };
            self.deliver(w, EventMask::EXPOSURE, &event);
        }
    }

    pub fn map_window(&mut self, client: ClientId, w: Handle) {
        let win = self.objects.window(w);
        if win.mapped {
            return;
        }
        let override_redirect = win.attributes.override_redirect;
        let wid = self.objects.id(w);
        if let Some(parent) = win.parent {
            if !override_redirect {
                if let Some(wm) = self.redirect_target(parent, EventMask::SUBSTRUCTURE_REDIRECT, client) {
                    let event = Event::MapRequest {
                        parent: self.objects.id(parent),
                        window: wid,
                    };
                    self.send_event(wm, &event);
                    return;
                }
            }
        }

        self.objects.window_mut(w).mapped = true;
        self.deliver_structure(w, true, |event| Event::MapNotify {
            event,
            window: wid,
            override_redirect,
        });
        if self.objects.viewable(w) {
            self.redraw_window(w);
            self.expose_subtree(w);
            self.refresh_pointer();
        }
    }

    /// Map unmapped children, front to back.
    pub fn map_subwindows(&mut self, client: ClientId, w: Handle) {
        let children = self.objects.window(w).children.clone();
        for c in children {
            self.map_window(client, c);
        }
    }

    pub fn unmap_window(&mut self, w: Handle) {
        if !self.objects.window(w).mapped {
            return;
        }
        let was_viewable = self.objects.viewable(w);
        let rect = self.objects.full_rect(w);
        self.objects.window_mut(w).mapped = false;
        let wid = self.objects.id(w);
        self.deliver_structure(w, false, |event| Event::UnmapNotify {
            event,
            window: wid,
            from_configure: false,
        });
        if was_viewable {
            self.redraw(rect);
            self.window_hidden(w);
        }
    }

    /// Unmap mapped children, back to front.
    pub fn unmap_subwindows(&mut self, w: Handle) {
        let children = self.objects.window(w).children.clone();
        for c in children.into_iter().rev() {
            self.unmap_window(c);
        }
    }

    /// Destroy `h` and its subtree, children first, and drop the creation
    /// references.
    pub fn destroy_window(&mut self, h: Handle) {
        self.unmap_window(h);
        for w in self.objects.subtree(h).into_iter().rev() {
            let wid = self.objects.id(w);
            self.deliver_structure(w, false, |event| Event::DestroyNotify { event, window: wid });
            let grabs = {
                let win = self.objects.window_mut(w);
                win.properties.clear();
                win.events.clear();
                std::mem::take(&mut win.button_grabs)
            };
            for g in grabs {
                self.release_grab_refs(g.confine_to, g.cursor);
            }
            self.objects.detach(w);
            self.destroy_object(w);
            self.objects.release(w);
        }
    }

    /// Destroy all children, front to back.
    pub fn destroy_subwindows(&mut self, w: Handle) {
        let children = self.objects.window(w).children.clone();
        for c in children {
            if self.objects.is_live(c) && self.objects.get(c).id != 0 {
                self.destroy_window(c);
            }
        }
    }

    pub fn reparent_window(&mut self, client: ClientId, w: Handle, parent: Handle, x: i16, y: i16) {
        let was_mapped = self.objects.window(w).mapped;
        if was_mapped {
            self.unmap_window(w);
        }
        let old_parent = self.objects.parent(w);
        self.objects.detach(w);
        self.objects.attach_front(parent, w);
        let override_redirect = {
            let win = self.objects.window_mut(w);
            win.x = x;
            win.y = y;
            win.attributes.override_redirect
        };

        let (wid, pid) = (self.objects.id(w), self.objects.id(parent));
        let make = |event| Event::ReparentNotify {
            event,
            window: wid,
            parent: pid,
            x,
            y,
            override_redirect,
        };
        self.deliver(w, EventMask::STRUCTURE_NOTIFY, &make(wid));
        if let Some(op) = old_parent.filter(|&op| op != parent) {
            let opid = self.objects.id(op);
            self.deliver(op, EventMask::SUBSTRUCTURE_NOTIFY, &make(opid));
        }
        self.deliver(parent, EventMask::SUBSTRUCTURE_NOTIFY, &make(pid));

        if was_mapped {
            self.map_window(client, w);
        }
    }

    /// Apply ConfigureWindow, or hand it to the window manager when the
    /// parent is redirected.
    pub fn configure_window(
        &mut self,
        client: ClientId,
        w: Handle,
        mask: ConfigMask,
        values: ConfigureValues,
    ) -> Result<(), XError> {
        let win = self.objects.window(w);
        let Some(parent) = win.parent else {
            return Ok(());
        };
        let override_redirect = win.attributes.override_redirect;
        let (cur_w, cur_h) = (win.width(), win.height());
        let wid = self.objects.id(w);

        if !override_redirect {
            if let Some(wm) = self.redirect_target(parent, EventMask::SUBSTRUCTURE_REDIRECT, client) {
                let event = Event::ConfigureRequest {
                    stack_mode: values.stack_mode.map_or(StackMode::Above as u8, |m| m as u8),
                    parent: self.objects.id(parent),
                    window: wid,
                    sibling: values.sibling.map_or(NONE, |s| self.objects.id(s)),
                    x: values.x.unwrap_or(win.x),
                    y: values.y.unwrap_or(win.y),
                    width: values.width.unwrap_or(cur_w),
                    height: values.height.unwrap_or(cur_h),
                    border_width: values.border_width.unwrap_or(win.border_width),
                    value_mask: mask.bits(),
                };
                self.send_event(wm, &event);
                return Ok(());
            }
        }

        let mut size = (values.width.unwrap_or(cur_w), values.height.unwrap_or(cur_h));
        if size != (cur_w, cur_h) {
            if let Some(other) = self.redirect_target(w, EventMask::RESIZE_REDIRECT, client) {
                let event = Event::ResizeRequest {
                    window: wid,
                    width: size.0,
                    height: size.1,
                };
                self.send_event(other, &event);
                size = (cur_w, cur_h);
            }
        }

        let viewable = self.objects.viewable(w);
        let old_rect = self.objects.full_rect(w);
        let resized = size != (cur_w, cur_h);
        if resized {
            let win = self.objects.window_mut(w);
            let gravity = win.attributes.bit_gravity;
            let background = win.background_pixel().unwrap_or(0);
            win.drawable.resize(size.0, size.1, gravity, background)?;
        }
        {
            let win = self.objects.window_mut(w);
            if let Some(x) = values.x {
                win.x = x;
            }
            if let Some(y) = values.y {
                win.y = y;
            }
            if let Some(b) = values.border_width {
                win.border_width = b;
            }
        }
        if let Some(mode) = values.stack_mode {
            self.restack(w, values.sibling, mode);
        }

        let siblings = &self.objects.window(parent).children;
        let above_sibling = siblings
            .iter()
            .position(|&c| c == w)
            .and_then(|i| siblings.get(i + 1))
            .map_or(NONE, |&s| self.objects.id(s));
        let win = self.objects.window(w);
        let (x, y, width, height, border_width) = (win.x, win.y, win.width(), win.height(), win.border_width);
        self.deliver_structure(w, false, |event| Event::ConfigureNotify {
            event,
            window: wid,
            above_sibling,
            x,
            y,
            width,
            height,
            border_width,
            override_redirect,
        });

        if viewable {
            self.redraw(old_rect);
            self.redraw_window(w);
            if resized {
                self.expose_subtree(w);
            }
            self.refresh_pointer();
        }
        Ok(())
    }

    /// Move `w` within its parent's stacking order.
    pub fn restack(&mut self, w: Handle, sibling: Option<Handle>, mode: StackMode) {
        let Some(parent) = self.objects.parent(w) else {
            return;
        };
        let children = self.objects.window(parent).children.clone();
        let pos = |h: Handle| children.iter().position(|&c| c == h).unwrap_or(usize::MAX);
        let overlaps = |a: Handle, b: Handle| {
            let (wa, wb) = (self.objects.window(a), self.objects.window(b));
            wa.mapped && wb.mapped && wa.outer_rect().intersects(&wb.outer_rect())
        };
        let others: Vec<Handle> = match sibling {
            Some(s) => vec![s],
            None => children.iter().copied().filter(|&c| c != w).collect(),
        };
        let occluded = others.iter().any(|&o| pos(o) < pos(w) && overlaps(o, w));
        let occludes = others.iter().any(|&o| pos(o) > pos(w) && overlaps(w, o));

        enum Place {
            Front,
            Back,
            Before(Handle),
            After(Handle),
        }
        let place = match (mode, sibling) {
            (StackMode::Above, None) => Place::Front,
            (StackMode::Above, Some(s)) => Place::Before(s),
            (StackMode::Below, None) => Place::Back,
            (StackMode::Below, Some(s)) => Place::After(s),
            (StackMode::TopIf, _) if occluded => Place::Front,
            (StackMode::BottomIf, _) if occludes => Place::Back,
            (StackMode::Opposite, _) if occluded => Place::Front,
            (StackMode::Opposite, _) if occludes => Place::Back,
            _ => return,
        };

        let list = &mut self.objects.window_mut(parent).children;
        list.retain(|&c| c != w);
        let at = match place {
            Place::Front => 0,
            Place::Back => list.len(),
            Place::Before(s) => list.iter().position(|&c| c == s).unwrap_or(0),
            Place::After(s) => list.iter().position(|&c| c == s).map_or(list.len(), |i| i + 1),
        };
        list.insert(at, w);
    }
}
