//! Event and error packet encoding
//!
//! Every event is 32 bytes. The sequence number is filled in at delivery
//! time from the receiving client's last request.

use crate::error::XError;
use crate::proto::event_codes as ev;
use crate::ringbuf::{ByteOrder, Writer};

pub const EVENT_SIZE: usize = 32;

/// Pointer and key events share one layout (codes 2 to 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFields {
    pub detail: u8,
    pub time: u32,
    pub root: u32,
    pub event: u32,
    pub child: u32,
    pub root_x: i16,
    pub root_y: i16,
    pub event_x: i16,
    pub event_y: i16,
    pub state: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    KeyPress(InputFields),
    KeyRelease(InputFields),
    ButtonPress(InputFields),
    ButtonRelease(InputFields),
    MotionNotify(InputFields),
    EnterNotify {
        fields: InputFields,
        mode: u8,
        focus: bool,
    },
    LeaveNotify {
        fields: InputFields,
        mode: u8,
        focus: bool,
    },
    FocusIn {
        detail: u8,
        event: u32,
        mode: u8,
    },
    FocusOut {
        detail: u8,
        event: u32,
        mode: u8,
    },
    /// Keys 8..=255 of the 256-bit keymap.
    KeymapNotify {
        keys: [u8; 31],
    },
    Expose {
        window: u32,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        count: u16,
    },
    /// Part of a CopyArea destination whose source was unavailable.
    GraphicsExpose {
        drawable: u32,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        minor_opcode: u16,
        count: u16,
        major_opcode: u8,
    },
    NoExpose {
        drawable: u32,
        minor_opcode: u16,
        major_opcode: u8,
    },
    CreateNotify {
        parent: u32,
        window: u32,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        override_redirect: bool,
    },
    DestroyNotify {
        event: u32,
        window: u32,
    },
    UnmapNotify {
        event: u32,
        window: u32,
        from_configure: bool,
    },
    MapNotify {
        event: u32,
        window: u32,
        override_redirect: bool,
    },
    MapRequest {
        parent: u32,
        window: u32,
    },
    ReparentNotify {
        event: u32,
        window: u32,
        parent: u32,
        x: i16,
        y: i16,
        override_redirect: bool,
    },
    ConfigureNotify {
        event: u32,
        window: u32,
        above_sibling: u32,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        override_redirect: bool,
    },
    ConfigureRequest {
        stack_mode: u8,
        parent: u32,
        window: u32,
        sibling: u32,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        value_mask: u16,
    },
    ResizeRequest {
        window: u32,
        width: u16,
        height: u16,
    },
    PropertyNotify {
        window: u32,
        atom: u32,
        time: u32,
        state: u8,
    },
    /// Sent to every client; `request` is Modifier 0, Keyboard 1 or
    /// Pointer 2.
    MappingNotify {
        request: u8,
        first_keycode: u8,
        count: u8,
    },
}

fn input(w: &mut Writer, code: u8, seq: u16, f: &InputFields) {
    w.u8(code)
        .u8(f.detail)
        .u16(seq)
        .u32(f.time)
        .u32(f.root)
        .u32(f.event)
        .u32(f.child)
        .i16(f.root_x)
        .i16(f.root_y)
        .i16(f.event_x)
        .i16(f.event_y)
        .u16(f.state);
}

impl Event {
    pub fn code(&self) -> u8 {
        match self {
            Event::KeyPress(_) => ev::KEY_PRESS,
            Event::KeyRelease(_) => ev::KEY_RELEASE,
            Event::ButtonPress(_) => ev::BUTTON_PRESS,
            Event::ButtonRelease(_) => ev::BUTTON_RELEASE,
            Event::MotionNotify(_) => ev::MOTION_NOTIFY,
            Event::EnterNotify { .. } => ev::ENTER_NOTIFY,
            Event::LeaveNotify { .. } => ev::LEAVE_NOTIFY,
            Event::FocusIn { .. } => ev::FOCUS_IN,
            Event::FocusOut { .. } => ev::FOCUS_OUT,
            Event::KeymapNotify { .. } => ev::KEYMAP_NOTIFY,
            Event::Expose { .. } => ev::EXPOSE,
            Event::GraphicsExpose { .. } => ev::GRAPHICS_EXPOSE,
            Event::NoExpose { .. } => ev::NO_EXPOSE,
            Event::CreateNotify { .. } => ev::CREATE_NOTIFY,
            Event::DestroyNotify { .. } => ev::DESTROY_NOTIFY,
            Event::UnmapNotify { .. } => ev::UNMAP_NOTIFY,
            Event::MapNotify { .. } => ev::MAP_NOTIFY,
            Event::MapRequest { .. } => ev::MAP_REQUEST,
            Event::ReparentNotify { .. } => ev::REPARENT_NOTIFY,
            Event::ConfigureNotify { .. } => ev::CONFIGURE_NOTIFY,
            Event::ConfigureRequest { .. } => ev::CONFIGURE_REQUEST,
            Event::ResizeRequest { .. } => ev::RESIZE_REQUEST,
            Event::PropertyNotify { .. } => ev::PROPERTY_NOTIFY,
            Event::MappingNotify { .. } => ev::MAPPING_NOTIFY,
        }
    }

    pub fn encode(&self, order: ByteOrder, seq: u16) -> [u8; EVENT_SIZE] {
        let mut w = Writer::with_capacity(order, EVENT_SIZE);
        let code = self.code();
        match self {
            Event::KeyPress(f)
            | Event::KeyRelease(f)
            | Event::ButtonPress(f)
            | Event::ButtonRelease(f)
            | Event::MotionNotify(f) => {
                input(&mut w, code, seq, f);
                w.u8(1);
            }
            Event::EnterNotify { fields, mode, focus } | Event::LeaveNotify { fields, mode, focus } => {
                input(&mut w, code, seq, fields);
                // same-screen bit is always set
                w.u8(*mode).u8(0x02 | *focus as u8);
            }
            Event::FocusIn { detail, event, mode } | Event::FocusOut { detail, event, mode } => {
                w.u8(code).u8(*detail).u16(seq).u32(*event).u8(*mode);
            }
            Event::KeymapNotify { keys } => {
                w.u8(code).bytes(keys);
            }
            Event::Expose {
                window,
                x,
                y,
                width,
                height,
                count,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*window)
                    .u16(*x)
                    .u16(*y)
                    .u16(*width)
                    .u16(*height)
                    .u16(*count);
            }
            Event::GraphicsExpose {
                drawable,
                x,
                y,
                width,
                height,
                minor_opcode,
                count,
                major_opcode,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*drawable)
                    .u16(*x)
                    .u16(*y)
                    .u16(*width)
                    .u16(*height)
                    .u16(*minor_opcode)
                    .u16(*count)
                    .u8(*major_opcode);
            }
            Event::NoExpose {
                drawable,
                minor_opcode,
                major_opcode,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*drawable)
                    .u16(*minor_opcode)
                    .u8(*major_opcode);
            }
            Event::CreateNotify {
                parent,
                window,
                x,
                y,
                width,
                height,
                border_width,
                override_redirect,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*parent)
                    .u32(*window)
                    .i16(*x)
                    .i16(*y)
                    .u16(*width)
                    .u16(*height)
                    .u16(*border_width)
                    .u8(*override_redirect as u8);
            }
            Event::DestroyNotify { event, window } => {
                w.u8(code).pad(1).u16(seq).u32(*event).u32(*window);
            }
            Event::UnmapNotify {
                event,
                window,
                from_configure,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*event)
                    .u32(*window)
                    .u8(*from_configure as u8);
            }
            Event::MapNotify {
                event,
                window,
                override_redirect,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*event)
                    .u32(*window)
                    .u8(*override_redirect as u8);
            }
            Event::MapRequest { parent, window } => {
                w.u8(code).pad(1).u16(seq).u32(*parent).u32(*window);
            }
            Event::ReparentNotify {
                event,
                window,
                parent,
                x,
                y,
                override_redirect,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*event)
                    .u32(*window)
                    .u32(*parent)
                    .i16(*x)
                    .i16(*y)
                    .u8(*override_redirect as u8);
            }
            Event::ConfigureNotify {
                event,
                window,
                above_sibling,
                x,
                y,
                width,
                height,
                border_width,
                override_redirect,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*event)
                    .u32(*window)
                    .u32(*above_sibling)
                    .i16(*x)
                    .i16(*y)
                    .u16(*width)
                    .u16(*height)
                    .u16(*border_width)
                    .u8(*override_redirect as u8);
            }
            Event::ConfigureRequest {
                stack_mode,
                parent,
                window,
                sibling,
                x,
                y,
                width,
                height,
                border_width,
                value_mask,
            } => {
                w.u8(code)
                    .u8(*stack_mode)
                    .u16(seq)
                    .u32(*parent)
                    .u32(*window)
                    .u32(*sibling)
                    .i16(*x)
                    .i16(*y)
                    .u16(*width)
                    .u16(*height)
                    .u16(*border_width)
                    .u16(*value_mask);
            }
            Event::ResizeRequest { window, width, height } => {
                w.u8(code).pad(1).u16(seq).u32(*window).u16(*width).u16(*height);
            }
            Event::PropertyNotify {
                window,
                atom,
                time,
                state,
            } => {
                w.u8(code)
                    .pad(1)
                    .u16(seq)
                    .u32(*window)
                    .u32(*atom)
                    .u32(*time)
                    .u8(*state);
            }
            Event::MappingNotify {
                request,
                first_keycode,
                count,
            } => {
                w.u8(code).pad(1).u16(seq).u8(*request).u8(*first_keycode).u8(*count);
            }
        }
        let mut out = [0u8; EVENT_SIZE];
        let bytes = w.finish();
        out[..bytes.len()].copy_from_slice(&bytes);
        out
    }
}

/// 32-byte error packet.
pub fn encode_error(order: ByteOrder, err: XError, seq: u16, major: u8) -> [u8; EVENT_SIZE] {
    let mut w = Writer::with_capacity(order, EVENT_SIZE);
    w.u8(0).u8(err.code()).u16(seq).u32(err.bad_value()).u16(0).u8(major);
    let mut out = [0u8; EVENT_SIZE];
    let bytes = w.finish();
    out[..bytes.len()].copy_from_slice(&bytes);
    out
}
