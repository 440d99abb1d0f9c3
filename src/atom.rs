//! Atom table: interned names with dense ids

use std::collections::HashMap;

/// Names of the predefined atoms, id = index + 1.
const PREDEFINED: [&str; 68] = [
    "PRIMARY",
    "SECONDARY",
    "ARC",
    "ATOM",
    "BITMAP",
    "CARDINAL",
    "COLORMAP",
    "CURSOR",
    "CUT_BUFFER0",
    "CUT_BUFFER1",
    "CUT_BUFFER2",
    "CUT_BUFFER3",
    "CUT_BUFFER4",
    "CUT_BUFFER5",
    "CUT_BUFFER6",
    "CUT_BUFFER7",
    "DRAWABLE",
    "FONT",
    "INTEGER",
    "PIXMAP",
    "POINT",
    "RECTANGLE",
    "RESOURCE_MANAGER",
    "RGB_COLOR_MAP",
    "RGB_BEST_MAP",
    "RGB_BLUE_MAP",
    "RGB_DEFAULT_MAP",
    "RGB_GRAY_MAP",
    "RGB_GREEN_MAP",
    "RGB_RED_MAP",
    "STRING",
    "VISUALID",
    "WINDOW",
    "WM_COMMAND",
    "WM_HINTS",
    "WM_CLIENT_MACHINE",
    "WM_ICON_NAME",
    "WM_ICON_SIZE",
    "WM_NAME",
    "WM_NORMAL_HINTS",
    "WM_SIZE_HINTS",
    "WM_ZOOM_HINTS",
    "MIN_SPACE",
    "NORM_SPACE",
    "MAX_SPACE",
    "END_SPACE",
    "SUPERSCRIPT_X",
    "SUPERSCRIPT_Y",
    "SUBSCRIPT_X",
    "SUBSCRIPT_Y",
    "UNDERLINE_POSITION",
    "UNDERLINE_THICKNESS",
    "STRIKEOUT_ASCENT",
    "STRIKEOUT_DESCENT",
    "ITALIC_ANGLE",
    "X_HEIGHT",
    "QUAD_WIDTH",
    "WEIGHT",
    "POINT_SIZE",
    "RESOLUTION",
    "COPYRIGHT",
    "NOTICE",
    "FONT_NAME",
    "FAMILY_NAME",
    "FULL_NAME",
    "CAP_HEIGHT",
    "WM_CLASS",
    "WM_TRANSIENT_FOR",
];

pub const ATOM: u32 = 4;
pub const CARDINAL: u32 = 6;
pub const STRING: u32 = 31;
pub const WINDOW: u32 = 33;
pub const WM_NAME: u32 = 39;

/// Append-only atom store. Atoms are never freed.
pub struct AtomTable {
    by_name: HashMap<String, u32>,
    by_id: Vec<String>,
}

impl AtomTable {
    pub fn new() -> Self {
        let mut table = Self {
            by_name: HashMap::with_capacity(256),
            by_id: Vec::with_capacity(256),
        };
        for name in PREDEFINED {
            table.push(name);
        }
        table
    }

    fn push(&mut self, name: &str) -> u32 {
        self.by_id.push(name.to_string());
        let id = self.by_id.len() as u32;
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Intern `name`. With `only_if_exists`, unknown names yield `None`.
    pub fn intern(&mut self, name: &str, only_if_exists: bool) -> Option<u32> {
        if let Some(&id) = self.by_name.get(name) {
            Some(id)
        } else if only_if_exists {
            None
        } else {
            Some(self.push(name))
        }
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        let idx = (id as usize).checked_sub(1)?;
        self.by_id.get(idx).map(String::as_str)
    }

    pub fn exists(&self, id: u32) -> bool {
        id != 0 && (id as usize) <= self.by_id.len()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}
