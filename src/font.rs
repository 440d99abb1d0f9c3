//! Built-in fonts
//!
//! Two faces are compiled in: "fixed", an 8x16 cell font covering printable
//! ASCII, and "cursor", the commonly used shapes of the standard cursor font
//! at their usual code points. Each glyph keeps its bitmap in a server-owned
//! depth-1 pixmap so a glyph cursor can use it like any other cursor source.
//! The pixmaps are unlinked from the id index; clients never see them.

use crate::drawable::Drawable;
use crate::error::XError;
use crate::object::{Cursor, Handle, ObjectKind, Registry};

pub const X_CURSOR: u16 = 0;
pub const CROSSHAIR: u16 = 34;
pub const LEFT_PTR: u16 = 68;
pub const SB_H_DOUBLE_ARROW: u16 = 108;
pub const SB_V_DOUBLE_ARROW: u16 = 116;
pub const XTERM: u16 = 152;

const GLYPH_SLOTS: usize = 256;

/// 8x8 cells for 0x20..=0x7e, one byte per row, bit 0 leftmost.
const FIXED_CELLS: [[u8; 8]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x18, 0x3c, 0x3c, 0x18, 0x18, 0x00, 0x18, 0x00],
    [0x36, 0x36, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x36, 0x36, 0x7f, 0x36, 0x7f, 0x36, 0x36, 0x00],
    [0x0c, 0x3e, 0x03, 0x1e, 0x30, 0x1f, 0x0c, 0x00],
    [0x00, 0x63, 0x33, 0x18, 0x0c, 0x66, 0x63, 0x00],
    [0x1c, 0x36, 0x1c, 0x6e, 0x3b, 0x33, 0x6e, 0x00],
    [0x06, 0x06, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x18, 0x0c, 0x06, 0x06, 0x06, 0x0c, 0x18, 0x00],
    [0x06, 0x0c, 0x18, 0x18, 0x18, 0x0c, 0x06, 0x00],
    [0x00, 0x66, 0x3c, 0xff, 0x3c, 0x66, 0x00, 0x00],
    [0x00, 0x0c, 0x0c, 0x3f, 0x0c, 0x0c, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x0c, 0x06],
    [0x00, 0x00, 0x00, 0x3f, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x0c, 0x00],
    [0x60, 0x30, 0x18, 0x0c, 0x06, 0x03, 0x01, 0x00],
    [0x3e, 0x63, 0x73, 0x7b, 0x6f, 0x67, 0x3e, 0x00], // 0
    [0x0c, 0x0e, 0x0c, 0x0c, 0x0c, 0x0c, 0x3f, 0x00],
    [0x1e, 0x33, 0x30, 0x1c, 0x06, 0x33, 0x3f, 0x00],
    [0x1e, 0x33, 0x30, 0x1c, 0x30, 0x33, 0x1e, 0x00],
    [0x38, 0x3c, 0x36, 0x33, 0x7f, 0x30, 0x78, 0x00],
    [0x3f, 0x03, 0x1f, 0x30, 0x30, 0x33, 0x1e, 0x00],
    [0x1c, 0x06, 0x03, 0x1f, 0x33, 0x33, 0x1e, 0x00],
    [0x3f, 0x33, 0x30, 0x18, 0x0c, 0x0c, 0x0c, 0x00],
    [0x1e, 0x33, 0x33, 0x1e, 0x33, 0x33, 0x1e, 0x00],
    [0x1e, 0x33, 0x33, 0x3e, 0x30, 0x18, 0x0e, 0x00],
    [0x00, 0x0c, 0x0c, 0x00, 0x00, 0x0c, 0x0c, 0x00],
    [0x00, 0x0c, 0x0c, 0x00, 0x00, 0x0c, 0x0c, 0x06],
    [0x18, 0x0c, 0x06, 0x03, 0x06, 0x0c, 0x18, 0x00],
    [0x00, 0x00, 0x3f, 0x00, 0x00, 0x3f, 0x00, 0x00],
    [0x06, 0x0c, 0x18, 0x30, 0x18, 0x0c, 0x06, 0x00],
    [0x1e, 0x33, 0x30, 0x18, 0x0c, 0x00, 0x0c, 0x00],
    [0x3e, 0x63, 0x7b, 0x7b, 0x7b, 0x03, 0x1e, 0x00],
    [0x0c, 0x1e, 0x33, 0x33, 0x3f, 0x33, 0x33, 0x00], // A
    [0x3f, 0x66, 0x66, 0x3e, 0x66, 0x66, 0x3f, 0x00],
    [0x3c, 0x66, 0x03, 0x03, 0x03, 0x66, 0x3c, 0x00],
    [0x1f, 0x36, 0x66, 0x66, 0x66, 0x36, 0x1f, 0x00],
    [0x7f, 0x46, 0x16, 0x1e, 0x16, 0x46, 0x7f, 0x00],
    [0x7f, 0x46, 0x16, 0x1e, 0x16, 0x06, 0x0f, 0x00],
    [0x3c, 0x66, 0x03, 0x03, 0x73, 0x66, 0x7c, 0x00],
    [0x33, 0x33, 0x33, 0x3f, 0x33, 0x33, 0x33, 0x00],
    [0x1e, 0x0c, 0x0c, 0x0c, 0x0c, 0x0c, 0x1e, 0x00],
    [0x78, 0x30, 0x30, 0x30, 0x33, 0x33, 0x1e, 0x00],
    [0x67, 0x66, 0x36, 0x1e, 0x36, 0x66, 0x67, 0x00],
    [0x0f, 0x06, 0x06, 0x06, 0x46, 0x66, 0x7f, 0x00],
    [0x63, 0x77, 0x7f, 0x7f, 0x6b, 0x63, 0x63, 0x00],
    [0x63, 0x67, 0x6f, 0x7b, 0x73, 0x63, 0x63, 0x00],
    [0x1c, 0x36, 0x63, 0x63, 0x63, 0x36, 0x1c, 0x00],
    [0x3f, 0x66, 0x66, 0x3e, 0x06, 0x06, 0x0f, 0x00],
    [0x1e, 0x33, 0x33, 0x33, 0x3b, 0x1e, 0x38, 0x00],
    [0x3f, 0x66, 0x66, 0x3e, 0x36, 0x66, 0x67, 0x00],
    [0x1e, 0x33, 0x07, 0x0e, 0x38, 0x33, 0x1e, 0x00],
    [0x3f, 0x2d, 0x0c, 0x0c, 0x0c, 0x0c, 0x1e, 0x00],
    [0x33, 0x33, 0x33, 0x33, 0x33, 0x33, 0x3f, 0x00],
    [0x33, 0x33, 0x33, 0x33, 0x33, 0x1e, 0x0c, 0x00],
    [0x63, 0x63, 0x63, 0x6b, 0x7f, 0x77, 0x63, 0x00],
    [0x63, 0x63, 0x36, 0x1c, 0x1c, 0x36, 0x63, 0x00],
    [0x33, 0x33, 0x33, 0x1e, 0x0c, 0x0c, 0x1e, 0x00],
    [0x7f, 0x63, 0x31, 0x18, 0x4c, 0x66, 0x7f, 0x00],
    [0x1e, 0x06, 0x06, 0x06, 0x06, 0x06, 0x1e, 0x00],
    [0x03, 0x06, 0x0c, 0x18, 0x30, 0x60, 0x40, 0x00],
    [0x1e, 0x18, 0x18, 0x18, 0x18, 0x18, 0x1e, 0x00],
    [0x08, 0x1c, 0x36, 0x63, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff],
    [0x0c, 0x0c, 0x18, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x1e, 0x30, 0x3e, 0x33, 0x6e, 0x00], // a
    [0x07, 0x06, 0x06, 0x3e, 0x66, 0x66, 0x3b, 0x00],
    [0x00, 0x00, 0x1e, 0x33, 0x03, 0x33, 0x1e, 0x00],
    [0x38, 0x30, 0x30, 0x3e, 0x33, 0x33, 0x6e, 0x00],
    [0x00, 0x00, 0x1e, 0x33, 0x3f, 0x03, 0x1e, 0x00],
    [0x1c, 0x36, 0x06, 0x0f, 0x06, 0x06, 0x0f, 0x00],
    [0x00, 0x00, 0x6e, 0x33, 0x33, 0x3e, 0x30, 0x1f],
    [0x07, 0x06, 0x36, 0x6e, 0x66, 0x66, 0x67, 0x00],
    [0x0c, 0x00, 0x0e, 0x0c, 0x0c, 0x0c, 0x1e, 0x00],
    [0x30, 0x00, 0x30, 0x30, 0x30, 0x33, 0x33, 0x1e],
    [0x07, 0x06, 0x66, 0x36, 0x1e, 0x36, 0x67, 0x00],
    [0x0e, 0x0c, 0x0c, 0x0c, 0x0c, 0x0c, 0x1e, 0x00],
    [0x00, 0x00, 0x33, 0x7f, 0x7f, 0x6b, 0x63, 0x00],
    [0x00, 0x00, 0x1f, 0x33, 0x33, 0x33, 0x33, 0x00],
    [0x00, 0x00, 0x1e, 0x33, 0x33, 0x33, 0x1e, 0x00],
    [0x00, 0x00, 0x3b, 0x66, 0x66, 0x3e, 0x06, 0x0f],
    [0x00, 0x00, 0x6e, 0x33, 0x33, 0x3e, 0x30, 0x78],
    [0x00, 0x00, 0x3b, 0x6e, 0x66, 0x06, 0x0f, 0x00],
    [0x00, 0x00, 0x3e, 0x03, 0x1e, 0x30, 0x1f, 0x00],
    [0x08, 0x0c, 0x3e, 0x0c, 0x0c, 0x2c, 0x18, 0x00],
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x33, 0x6e, 0x00],
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x1e, 0x0c, 0x00],
    [0x00, 0x00, 0x63, 0x6b, 0x7f, 0x7f, 0x36, 0x00],
    [0x00, 0x00, 0x63, 0x36, 0x1c, 0x36, 0x63, 0x00],
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x3e, 0x30, 0x1f],
    [0x00, 0x00, 0x3f, 0x19, 0x0c, 0x26, 0x3f, 0x00],
    [0x38, 0x0c, 0x0c, 0x07, 0x0c, 0x0c, 0x38, 0x00],
    [0x18, 0x18, 0x18, 0x00, 0x18, 0x18, 0x18, 0x00],
    [0x07, 0x0c, 0x0c, 0x38, 0x0c, 0x0c, 0x07, 0x00],
    [0x6e, 0x3b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
];

/// A 16x16 cursor shape: `X` is drawn in the foreground, `#` in the
/// background. Shapes without `#` get a one pixel background outline.
struct CursorArt {
    code: u16,
    hot: (i16, i16),
    rows: [&'static str; 16],
}

const CURSOR_ART: [CursorArt; 6] = [
    CursorArt {
        code: X_CURSOR,
        hot: (7, 7),
        rows: [
            "X.............X.",
            ".X...........X..",
            "..X.........X...",
            "...X.......X....",
            "....X.....X.....",
            ".....X...X......",
            "......X.X.......",
            ".......X........",
            "......X.X.......",
            ".....X...X......",
            "....X.....X.....",
            "...X.......X....",
            "..X.........X...",
            ".X...........X..",
            "X.............X.",
            "................",
        ],
    },
    CursorArt {
        code: CROSSHAIR,
        hot: (7, 7),
        rows: [
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            "XXXXXXXXXXXXXXX.",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            "................",
        ],
    },
    CursorArt {
        code: LEFT_PTR,
        hot: (0, 0),
        rows: [
            "X...............",
            "XX..............",
            "X#X.............",
            "X##X............",
            "X###X...........",
            "X####X..........",
            "X#####X.........",
            "X######X........",
            "X#######X.......",
            "X########X......",
            "X#####XXXXX.....",
            "X##X##X.........",
            "X#X.X##X........",
            "XX..X##X........",
            "X....X##X.......",
            ".....XXX........",
        ],
    },
    CursorArt {
        code: SB_H_DOUBLE_ARROW,
        hot: (7, 7),
        rows: [
            "................",
            "................",
            "................",
            "................",
            "...X.......X....",
            "..XX.......XX...",
            ".XXXXXXXXXXXXX..",
            "XXXXXXXXXXXXXXX.",
            ".XXXXXXXXXXXXX..",
            "..XX.......XX...",
            "...X.......X....",
            "................",
            "................",
            "................",
            "................",
            "................",
        ],
    },
    CursorArt {
        code: SB_V_DOUBLE_ARROW,
        hot: (7, 7),
        rows: [
            ".......X........",
            "......XXX.......",
            ".....XXXXX......",
            "....XXXXXXX.....",
            "......XXX.......",
            "......XXX.......",
            "......XXX.......",
            "......XXX.......",
            "......XXX.......",
            "......XXX.......",
            "......XXX.......",
            "....XXXXXXX.....",
            ".....XXXXX......",
            "......XXX.......",
            ".......X........",
            "................",
        ],
    },
    CursorArt {
        code: XTERM,
        hot: (7, 8),
        rows: [
            "....XXX.XXX.....",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            ".......X........",
            "....XXX.XXX.....",
        ],
    },
];

/// Glyph metrics relative to the drawing origin, plus the bitmap holding
/// its `width() x height()` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub left_bearing: i16,
    pub right_bearing: i16,
    pub ascent: i16,
    pub descent: i16,
    pub bitmap: Handle,
}

impl Glyph {
    pub fn width(&self) -> u16 {
        (self.right_bearing - self.left_bearing) as u16
    }

    pub fn height(&self) -> u16 {
        (self.ascent + self.descent) as u16
    }
}

#[derive(Debug)]
pub struct FontFace {
    pub name: &'static str,
    pub ascent: i16,
    pub descent: i16,
    glyphs: Vec<Option<Glyph>>,
}

impl FontFace {
    fn new(name: &'static str, ascent: i16, descent: i16) -> Self {
        Self {
            name,
            ascent,
            descent,
            glyphs: vec![None; GLYPH_SLOTS],
        }
    }

    pub fn glyph(&self, ch: u16) -> Option<Glyph> {
        self.glyphs.get(ch as usize).copied().flatten()
    }
}

/// The faces OpenFont can name, indexed by [`crate::object::Font::face`].
#[derive(Debug, Default)]
pub struct FontTable {
    faces: Vec<FontFace>,
}

/// Store a glyph bitmap as a private server pixmap. The table keeps the
/// creation reference.
fn store(objects: &mut Registry, next_id: &mut u32, bitmap: Drawable) -> Handle {
    *next_id += 1;
    let h = objects.insert(*next_id, None, ObjectKind::Pixmap(bitmap));
    objects.unlink(h);
    h
}

fn fixed_face(objects: &mut Registry, root: u32, next_id: &mut u32) -> Result<FontFace, XError> {
    let mut face = FontFace::new("fixed", 14, 2);
    for (i, cell) in FIXED_CELLS.iter().enumerate() {
        let mut bitmap = Drawable::new(8, 16, 1, root, 0)?;
        for (y, bits) in cell.iter().enumerate() {
            for x in (0..8).filter(|x| bits & (1 << x) != 0) {
                bitmap.set_pixel(x, y * 2, 1);
                bitmap.set_pixel(x, y * 2 + 1, 1);
            }
        }
        face.glyphs[0x20 + i] = Some(Glyph {
            left_bearing: 0,
            right_bearing: 8,
            ascent: face.ascent,
            descent: face.descent,
            bitmap: store(objects, next_id, bitmap),
        });
    }
    Ok(face)
}

fn cursor_face(objects: &mut Registry, root: u32, next_id: &mut u32) -> Result<FontFace, XError> {
    let mut face = FontFace::new("cursor", 16, 0);
    for art in &CURSOR_ART {
        let set = |c: u8| -> Vec<(usize, usize)> {
            art.rows
                .iter()
                .enumerate()
                .flat_map(|(y, row)| row.bytes().enumerate().filter(move |&(_, b)| b == c).map(move |(x, _)| (x, y)))
                .collect()
        };
        let shape = set(b'X');
        let fill = set(b'#');
        let mut source = Drawable::new(16, 16, 1, root, 0)?;
        let mut mask = Drawable::new(16, 16, 1, root, 0)?;
        for &(x, y) in &shape {
            source.set_pixel(x, y, 1);
        }
        if fill.is_empty() {
            for &(x, y) in &shape {
                for my in y.saturating_sub(1)..=(y + 1).min(15) {
                    for mx in x.saturating_sub(1)..=(x + 1).min(15) {
                        mask.set_pixel(mx, my, 1);
                    }
                }
            }
        } else {
            for &(x, y) in shape.iter().chain(&fill) {
                mask.set_pixel(x, y, 1);
            }
        }
        let (hx, hy) = art.hot;
        for (code, bitmap) in [(art.code, source), (art.code + 1, mask)] {
            face.glyphs[code as usize] = Some(Glyph {
                left_bearing: -hx,
                right_bearing: 16 - hx,
                ascent: hy,
                descent: 16 - hy,
                bitmap: store(objects, next_id, bitmap),
            });
        }
    }
    Ok(face)
}

impl FontTable {
    /// Render every built-in face. Ids for the glyph pixmaps are taken from
    /// `next_id`, which is left at the last id used.
    pub fn build(objects: &mut Registry, root: u32, next_id: &mut u32) -> Result<Self, XError> {
        let cursor = cursor_face(objects, root, next_id)?;
        let fixed = fixed_face(objects, root, next_id)?;
        Ok(Self {
            faces: vec![cursor, fixed],
        })
    }

    /// Face index for a case-insensitive font name.
    pub fn find(&self, name: &[u8]) -> Option<usize> {
        self.faces.iter().position(|f| f.name.as_bytes().eq_ignore_ascii_case(name))
    }

    pub fn face(&self, index: usize) -> &FontFace {
        &self.faces[index]
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.faces.iter().map(|f| f.name)
    }
}

/// Cursor drawn from glyph bitmaps. The source glyph's origin becomes the
/// hotspot and the mask glyph is placed so the two origins coincide.
pub fn glyph_cursor(objects: &mut Registry, source: Glyph, mask: Option<Glyph>, foreground: u32, background: u32) -> Cursor {
    objects.retain(source.bitmap);
    if let Some(m) = mask {
        objects.retain(m.bitmap);
    }
    Cursor {
        source: source.bitmap,
        mask: mask.map(|m| m.bitmap),
        foreground,
        background,
        hot_x: -source.left_bearing as i32,
        hot_y: source.ascent as i32,
        mask_x: mask.map_or(0, |m| (m.left_bearing - source.left_bearing) as i32),
        mask_y: mask.map_or(0, |m| (source.ascent - m.ascent) as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (Registry, FontTable) {
        let mut objects = Registry::new();
        let mut next_id = 2;
        let fonts = FontTable::build(&mut objects, 1, &mut next_id).unwrap();
        (objects, fonts)
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let (_, fonts) = table();
        assert_eq!(fonts.find(b"FIXED"), Some(1));
        assert_eq!(fonts.find(b"cursor"), Some(0));
        assert_eq!(fonts.find(b"8x13"), None);
        assert_eq!(fonts.names().collect::<Vec<_>>(), ["cursor", "fixed"]);
    }

    #[test]
    fn test_fixed_glyphs_are_doubled_cells() {
        let (objects, fonts) = table();
        let face = fonts.face(fonts.find(b"fixed").unwrap());
        assert!(face.glyph(0x1f).is_none());
        assert!(face.glyph(0x7f).is_none());
        let a = face.glyph(b'A' as u16).unwrap();
        assert_eq!((a.width(), a.height()), (8, 16));
        assert_eq!(a.ascent + a.descent, 16);
        let bitmap = objects.drawable(a.bitmap);
        // first row of 'A' is 0x0c: pixels 2 and 3
        for y in 0..2 {
            assert_eq!(bitmap.pixel(2, y), 1);
            assert_eq!(bitmap.pixel(3, y), 1);
            assert_eq!(bitmap.pixel(1, y), 0);
        }
        // the pixmaps are private to the table
        assert_eq!(objects.len(), 0);
    }

    #[test]
    fn test_cursor_glyph_metrics() {
        let (objects, fonts) = table();
        let face = fonts.face(fonts.find(b"cursor").unwrap());
        let xterm = face.glyph(XTERM).unwrap();
        assert_eq!((xterm.left_bearing, xterm.right_bearing), (-7, 9));
        assert_eq!((xterm.ascent, xterm.descent), (8, 8));
        assert!(face.glyph(XTERM + 1).is_some());
        assert!(face.glyph(XTERM + 2).is_none());

        // an outline-only shape gets a dilated mask
        let cross = face.glyph(CROSSHAIR).unwrap();
        let cross_mask = face.glyph(CROSSHAIR + 1).unwrap();
        assert_eq!(objects.drawable(cross.bitmap).pixel(6, 0), 0);
        assert_eq!(objects.drawable(cross_mask.bitmap).pixel(6, 0), 1);
        assert_eq!(objects.drawable(cross_mask.bitmap).pixel(5, 0), 0);
    }

    #[test]
    fn test_glyph_cursor_aligns_origins() {
        let (mut objects, fonts) = table();
        let cursor_face = fonts.face(fonts.find(b"cursor").unwrap());
        let fixed = fonts.face(fonts.find(b"fixed").unwrap());
        let source = cursor_face.glyph(XTERM).unwrap();
        let refs = objects.get(source.bitmap).refs;

        let same = glyph_cursor(&mut objects, source, cursor_face.glyph(XTERM + 1), 0, 0xffffff);
        assert_eq!((same.hot_x, same.hot_y), (7, 8));
        assert_eq!((same.mask_x, same.mask_y), (0, 0));
        assert_eq!(objects.get(source.bitmap).refs, refs + 1);

        // a mask from another font lines up on the shared origin
        let mixed = glyph_cursor(&mut objects, source, fixed.glyph(b'M' as u16), 0, 0xffffff);
        assert_eq!((mixed.mask_x, mixed.mask_y), (7, -6));
    }
}
