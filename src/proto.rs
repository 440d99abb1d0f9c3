//! Core protocol constants: opcodes, event codes, masks and the static
//! screen description sent in the connection reply.

use bitflags::bitflags;

pub const MAJOR_VERSION: u16 = 11;
pub const MINOR_VERSION: u16 = 0;
pub const RELEASE_NUMBER: u32 = 1_000_000;
pub const VENDOR: &str = "x11qd";
pub const MOTION_BUFFER_SIZE: u32 = 256;
pub const MAX_REQUEST_LENGTH: u16 = 65535;
pub const MIN_KEYCODE: u8 = 8;
pub const MAX_KEYCODE: u8 = 255;
pub const LSB_FIRST: u8 = 0;

/// Special request values.
pub const NONE: u32 = 0;
pub const POINTER_ROOT: u32 = 1;
pub const CURRENT_TIME: u32 = 0;
pub const COPY_FROM_PARENT: u32 = 0;
pub const PARENT_RELATIVE: u32 = 1;
pub const ANY_PROPERTY_TYPE: u32 = 0;
pub const ANY_BUTTON: u8 = 0;
pub const ANY_MODIFIER: u16 = 0x8000;

/// Core request opcodes
pub mod opcodes {
    pub const CREATE_WINDOW: u8 = 1;
    pub const CHANGE_WINDOW_ATTRIBUTES: u8 = 2;
    pub const GET_WINDOW_ATTRIBUTES: u8 = 3;
    pub const DESTROY_WINDOW: u8 = 4;
    pub const DESTROY_SUBWINDOWS: u8 = 5;
    pub const REPARENT_WINDOW: u8 = 7;
    pub const MAP_WINDOW: u8 = 8;
    pub const MAP_SUBWINDOWS: u8 = 9;
    pub const UNMAP_WINDOW: u8 = 10;
    pub const UNMAP_SUBWINDOWS: u8 = 11;
    pub const CONFIGURE_WINDOW: u8 = 12;
    pub const GET_GEOMETRY: u8 = 14;
    pub const QUERY_TREE: u8 = 15;
    pub const INTERN_ATOM: u8 = 16;
    pub const GET_ATOM_NAME: u8 = 17;
    pub const CHANGE_PROPERTY: u8 = 18;
    pub const DELETE_PROPERTY: u8 = 19;
    pub const GET_PROPERTY: u8 = 20;
    pub const LIST_PROPERTIES: u8 = 21;
    pub const GRAB_POINTER: u8 = 26;
    pub const UNGRAB_POINTER: u8 = 27;
    pub const GRAB_BUTTON: u8 = 28;
    pub const UNGRAB_BUTTON: u8 = 29;
    pub const GRAB_SERVER: u8 = 36;
    pub const UNGRAB_SERVER: u8 = 37;
    pub const QUERY_POINTER: u8 = 38;
    pub const WARP_POINTER: u8 = 41;
    pub const SET_INPUT_FOCUS: u8 = 42;
    pub const GET_INPUT_FOCUS: u8 = 43;
    pub const OPEN_FONT: u8 = 45;
    pub const CLOSE_FONT: u8 = 46;
    pub const LIST_FONTS: u8 = 49;
    pub const CREATE_PIXMAP: u8 = 53;
    pub const FREE_PIXMAP: u8 = 54;
    pub const CREATE_GC: u8 = 55;
    pub const CHANGE_GC: u8 = 56;
    pub const FREE_GC: u8 = 60;
    pub const COPY_GC: u8 = 57;
    pub const CLEAR_AREA: u8 = 61;
    pub const COPY_AREA: u8 = 62;
    pub const POLY_POINT: u8 = 64;
    pub const POLY_LINE: u8 = 65;
    pub const POLY_SEGMENT: u8 = 66;
    pub const POLY_RECTANGLE: u8 = 67;
    pub const POLY_ARC: u8 = 68;
    pub const FILL_POLY: u8 = 69;
    pub const POLY_FILL_RECTANGLE: u8 = 70;
    pub const POLY_FILL_ARC: u8 = 71;
    pub const PUT_IMAGE: u8 = 72;
    pub const GET_IMAGE: u8 = 73;
    pub const CREATE_CURSOR: u8 = 93;
    pub const CREATE_GLYPH_CURSOR: u8 = 94;
    pub const FREE_CURSOR: u8 = 95;
    pub const RECOLOR_CURSOR: u8 = 96;
    pub const QUERY_BEST_SIZE: u8 = 97;
    pub const QUERY_EXTENSION: u8 = 98;
    pub const LIST_EXTENSIONS: u8 = 99;
    pub const CHANGE_KEYBOARD_MAPPING: u8 = 100;
    pub const GET_KEYBOARD_MAPPING: u8 = 101;
    pub const CHANGE_KEYBOARD_CONTROL: u8 = 102;
    pub const GET_KEYBOARD_CONTROL: u8 = 103;
    pub const BELL: u8 = 104;
    pub const CHANGE_POINTER_CONTROL: u8 = 105;
    pub const GET_POINTER_CONTROL: u8 = 106;
    pub const SET_POINTER_MAPPING: u8 = 116;
    pub const GET_POINTER_MAPPING: u8 = 117;
    pub const SET_MODIFIER_MAPPING: u8 = 118;
    pub const GET_MODIFIER_MAPPING: u8 = 119;
    pub const NO_OPERATION: u8 = 127;
}

/// Event type codes
pub mod event_codes {
    pub const KEY_PRESS: u8 = 2;
    pub const KEY_RELEASE: u8 = 3;
    pub const BUTTON_PRESS: u8 = 4;
    pub const BUTTON_RELEASE: u8 = 5;
    pub const MOTION_NOTIFY: u8 = 6;
    pub const ENTER_NOTIFY: u8 = 7;
    pub const LEAVE_NOTIFY: u8 = 8;
    pub const FOCUS_IN: u8 = 9;
    pub const FOCUS_OUT: u8 = 10;
    pub const KEYMAP_NOTIFY: u8 = 11;
    pub const EXPOSE: u8 = 12;
    pub const GRAPHICS_EXPOSE: u8 = 13;
    pub const NO_EXPOSE: u8 = 14;
    pub const CREATE_NOTIFY: u8 = 16;
    pub const DESTROY_NOTIFY: u8 = 17;
    pub const UNMAP_NOTIFY: u8 = 18;
    pub const MAP_NOTIFY: u8 = 19;
    pub const MAP_REQUEST: u8 = 20;
    pub const REPARENT_NOTIFY: u8 = 21;
    pub const CONFIGURE_NOTIFY: u8 = 22;
    pub const CONFIGURE_REQUEST: u8 = 23;
    pub const RESIZE_REQUEST: u8 = 25;
    pub const PROPERTY_NOTIFY: u8 = 28;
    pub const MAPPING_NOTIFY: u8 = 34;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const KEY_PRESS = 1 << 0;
        const KEY_RELEASE = 1 << 1;
        const BUTTON_PRESS = 1 << 2;
        const BUTTON_RELEASE = 1 << 3;
        const ENTER_WINDOW = 1 << 4;
        const LEAVE_WINDOW = 1 << 5;
        const POINTER_MOTION = 1 << 6;
        const POINTER_MOTION_HINT = 1 << 7;
        const BUTTON1_MOTION = 1 << 8;
        const BUTTON2_MOTION = 1 << 9;
        const BUTTON3_MOTION = 1 << 10;
        const BUTTON4_MOTION = 1 << 11;
        const BUTTON5_MOTION = 1 << 12;
        const BUTTON_MOTION = 1 << 13;
        const KEYMAP_STATE = 1 << 14;
        const EXPOSURE = 1 << 15;
        const VISIBILITY_CHANGE = 1 << 16;
        const STRUCTURE_NOTIFY = 1 << 17;
        const RESIZE_REDIRECT = 1 << 18;
        const SUBSTRUCTURE_NOTIFY = 1 << 19;
        const SUBSTRUCTURE_REDIRECT = 1 << 20;
        const FOCUS_CHANGE = 1 << 21;
        const PROPERTY_CHANGE = 1 << 22;
        const COLORMAP_CHANGE = 1 << 23;
        const OWNER_GRAB_BUTTON = 1 << 24;
    }
}

impl EventMask {
    /// Masks only one client may select on a given window.
    pub const EXCLUSIVE: EventMask = EventMask::SUBSTRUCTURE_REDIRECT
        .union(EventMask::RESIZE_REDIRECT)
        .union(EventMask::BUTTON_PRESS);
}

bitflags! {
    /// Modifier and button state carried in input events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyButMask: u16 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;
    }
}

bitflags! {
    /// CreateWindow / ChangeWindowAttributes value-mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowAttr: u32 {
        const BACK_PIXMAP = 1 << 0;
        const BACK_PIXEL = 1 << 1;
        const BORDER_PIXMAP = 1 << 2;
        const BORDER_PIXEL = 1 << 3;
        const BIT_GRAVITY = 1 << 4;
        const WIN_GRAVITY = 1 << 5;
        const BACKING_STORE = 1 << 6;
        const BACKING_PLANES = 1 << 7;
        const BACKING_PIXEL = 1 << 8;
        const OVERRIDE_REDIRECT = 1 << 9;
        const SAVE_UNDER = 1 << 10;
        const EVENT_MASK = 1 << 11;
        const DONT_PROPAGATE = 1 << 12;
        const COLORMAP = 1 << 13;
        const CURSOR = 1 << 14;
    }
}

bitflags! {
    /// ConfigureWindow value-mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigMask: u16 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const WIDTH = 1 << 2;
        const HEIGHT = 1 << 3;
        const BORDER_WIDTH = 1 << 4;
        const SIBLING = 1 << 5;
        const STACK_MODE = 1 << 6;
    }
}

impl ConfigMask {
    pub const GEOMETRY: ConfigMask = ConfigMask::X
        .union(ConfigMask::Y)
        .union(ConfigMask::WIDTH)
        .union(ConfigMask::HEIGHT)
        .union(ConfigMask::BORDER_WIDTH);
}

bitflags! {
    /// CreateGC / ChangeGC value-mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GcAttr: u32 {
        const FUNCTION = 1 << 0;
        const PLANE_MASK = 1 << 1;
        const FOREGROUND = 1 << 2;
        const BACKGROUND = 1 << 3;
        const LINE_WIDTH = 1 << 4;
        const LINE_STYLE = 1 << 5;
        const CAP_STYLE = 1 << 6;
        const JOIN_STYLE = 1 << 7;
        const FILL_STYLE = 1 << 8;
        const FILL_RULE = 1 << 9;
        const TILE = 1 << 10;
        const STIPPLE = 1 << 11;
        const TILE_STIPPLE_X = 1 << 12;
        const TILE_STIPPLE_Y = 1 << 13;
        const FONT = 1 << 14;
        const SUBWINDOW_MODE = 1 << 15;
        const GRAPHICS_EXPOSURES = 1 << 16;
        const CLIP_X = 1 << 17;
        const CLIP_Y = 1 << 18;
        const CLIP_MASK = 1 << 19;
        const DASH_OFFSET = 1 << 20;
        const DASHES = 1 << 21;
        const ARC_MODE = 1 << 22;
    }
}

/// Crossing and focus event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotifyDetail {
    Ancestor = 0,
    Virtual = 1,
    Inferior = 2,
    Nonlinear = 3,
    NonlinearVirtual = 4,
    Pointer = 5,
    PointerRoot = 6,
    DetailNone = 7,
}

pub const NOTIFY_NORMAL: u8 = 0;

/// Bit and window gravity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Gravity {
    #[default]
    Forget = 0,
    NorthWest = 1,
    North = 2,
    NorthEast = 3,
    West = 4,
    Center = 5,
    East = 6,
    SouthWest = 7,
    South = 8,
    SouthEast = 9,
    Static = 10,
}

impl Gravity {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Gravity::Forget,
            1 => Gravity::NorthWest,
            2 => Gravity::North,
            3 => Gravity::NorthEast,
            4 => Gravity::West,
            5 => Gravity::Center,
            6 => Gravity::East,
            7 => Gravity::SouthWest,
            8 => Gravity::South,
            9 => Gravity::SouthEast,
            10 => Gravity::Static,
            _ => return None,
        })
    }
}

/// ConfigureWindow stack mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StackMode {
    Above = 0,
    Below = 1,
    TopIf = 2,
    BottomIf = 3,
    Opposite = 4,
}

impl StackMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => StackMode::Above,
            1 => StackMode::Below,
            2 => StackMode::TopIf,
            3 => StackMode::BottomIf,
            4 => StackMode::Opposite,
            _ => return None,
        })
    }
}

/// GrabPointer reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GrabStatus {
    Success = 0,
    AlreadyGrabbed = 1,
    InvalidTime = 2,
    NotViewable = 3,
    Frozen = 4,
}

pub const GRAB_MODE_SYNC: u8 = 0;
pub const GRAB_MODE_ASYNC: u8 = 1;

/// SetInputFocus revert-to policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RevertTo {
    #[default]
    None = 0,
    PointerRoot = 1,
    Parent = 2,
}

impl RevertTo {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => RevertTo::None,
            1 => RevertTo::PointerRoot,
            2 => RevertTo::Parent,
            _ => return None,
        })
    }
}

pub const PROPERTY_NEW_VALUE: u8 = 0;
pub const PROPERTY_DELETE: u8 = 1;

pub const PROP_MODE_REPLACE: u8 = 0;
pub const PROP_MODE_PREPEND: u8 = 1;
pub const PROP_MODE_APPEND: u8 = 2;

pub const MAP_STATE_UNMAPPED: u8 = 0;
pub const MAP_STATE_UNVIEWABLE: u8 = 1;
pub const MAP_STATE_VIEWABLE: u8 = 2;

pub const IMAGE_FORMAT_BITMAP: u8 = 0;
pub const IMAGE_FORMAT_XY_PIXMAP: u8 = 1;
pub const IMAGE_FORMAT_Z_PIXMAP: u8 = 2;

/// Pixmap format advertised in the connection reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub depth: u8,
    pub bpp: u8,
    pub scanline_pad: u8,
}

pub const FORMATS: &[Format] = &[
    Format { depth: 1, bpp: 1, scanline_pad: 32 },
    Format { depth: 4, bpp: 8, scanline_pad: 32 },
    Format { depth: 8, bpp: 8, scanline_pad: 32 },
    Format { depth: 15, bpp: 16, scanline_pad: 32 },
    Format { depth: 16, bpp: 16, scanline_pad: 32 },
    Format { depth: 24, bpp: 32, scanline_pad: 32 },
    Format { depth: 32, bpp: 32, scanline_pad: 32 },
];

pub fn format_for_depth(depth: u8) -> Option<&'static Format> {
    FORMATS.iter().find(|f| f.depth == depth)
}

pub const VISUAL_CLASS_TRUE_COLOR: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visual {
    pub id: u32,
    pub class: u8,
    pub bits_per_rgb: u8,
    pub colormap_entries: u16,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Depth {
    pub depth: u8,
    pub visuals: &'static [Visual],
}

const fn true_color(id: u32) -> Visual {
    Visual {
        id,
        class: VISUAL_CLASS_TRUE_COLOR,
        bits_per_rgb: 8,
        colormap_entries: 256,
        red_mask: 0x00ff_0000,
        green_mask: 0x0000_ff00,
        blue_mask: 0x0000_00ff,
    }
}

pub const ROOT_VISUAL: u32 = 0x21;

pub const VISUALS_24: &[Visual] = &[true_color(ROOT_VISUAL)];
pub const VISUALS_32: &[Visual] = &[true_color(0x22), true_color(0x23)];

pub const DEPTHS: &[Depth] = &[
    Depth { depth: 1, visuals: &[] },
    Depth { depth: 24, visuals: VISUALS_24 },
    Depth { depth: 32, visuals: VISUALS_32 },
];

pub fn find_visual(id: u32) -> Option<(u8, &'static Visual)> {
    DEPTHS
        .iter()
        .flat_map(|d| d.visuals.iter().map(move |v| (d.depth, v)))
        .find(|(_, v)| v.id == id)
}

/// Pack a 16-bit-per-channel color into a framebuffer pixel.
pub fn rgb16_to_pixel(r: u16, g: u16, b: u16) -> u32 {
    ((r as u32 & 0xff00) << 8) | (g as u32 & 0xff00) | ((b as u32 & 0xff00) >> 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb16_to_pixel() {
        assert_eq!(rgb16_to_pixel(0xffff, 0, 0), 0x00ff0000);
        assert_eq!(rgb16_to_pixel(0, 0xffff, 0), 0x0000ff00);
        assert_eq!(rgb16_to_pixel(0, 0, 0xffff), 0x000000ff);
        assert_eq!(rgb16_to_pixel(0x1234, 0x5678, 0x9abc), 0x0012569a);
    }

    #[test]
    fn test_visual_lookup() {
        let (depth, visual) = find_visual(ROOT_VISUAL).unwrap();
        assert_eq!(depth, 24);
        assert_eq!(visual.class, VISUAL_CLASS_TRUE_COLOR);
        assert_eq!(find_visual(0x22).unwrap().0, 32);
        assert!(find_visual(0x99).is_none());
    }

    #[test]
    fn test_exclusive_masks() {
        assert!(EventMask::EXCLUSIVE.contains(EventMask::SUBSTRUCTURE_REDIRECT));
        assert!(!EventMask::EXCLUSIVE.contains(EventMask::EXPOSURE));
        assert_eq!(EventMask::from_bits(1 << 25), None);
    }

    #[test]
    fn test_gravity_range() {
        assert_eq!(Gravity::from_u8(10), Some(Gravity::Static));
        assert_eq!(Gravity::from_u8(11), None);
    }
}
