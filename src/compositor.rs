//! Software compositor
//!
//! Turns a dirty rectangle into pixel writes. Each screen pixel in the dirty
//! rectangle is written exactly once per pass: a window paints only the parts
//! of the rectangle not covered by a mapped child in front of it.

use crate::object::{Handle, Registry};
use crate::rect::Rect;
use crate::window::{Border, WindowClass};

/// Destination of composited pixels, in screen coordinates.
pub trait Target {
    fn fill(&mut self, rect: Rect, pixel: u32);
    /// Copy one row of pixels starting at `(x, y)`.
    fn copy_row(&mut self, x: i64, y: i64, row: &[u32]);
    fn put(&mut self, x: i64, y: i64, pixel: u32);
}

/// The screen image handed to the backend. Rows are `width` pixels.
pub struct Framebuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i64, self.height as i64)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }
}

impl Target for Framebuffer {
    fn fill(&mut self, rect: Rect, pixel: u32) {
        let r = rect.intersect(&self.bounds());
        for y in r.top as usize..r.bottom as usize {
            let base = y * self.width;
            self.pixels[base + r.left as usize..base + r.right as usize].fill(pixel);
        }
    }

    fn copy_row(&mut self, x: i64, y: i64, row: &[u32]) {
        let r = Rect::new(x, y, row.len() as i64, 1).intersect(&self.bounds());
        if r.is_empty() {
            return;
        }
        let skip = (r.left - x) as usize;
        let base = r.top as usize * self.width;
        self.pixels[base + r.left as usize..base + r.right as usize]
            .copy_from_slice(&row[skip..skip + r.width() as usize]);
    }

    fn put(&mut self, x: i64, y: i64, pixel: u32) {
        if self.bounds().contains_point(x, y) {
            self.pixels[y as usize * self.width + x as usize] = pixel;
        }
    }
}

/// Cursor image placed with its top-left corner at screen `(x, y)`.
#[derive(Debug, Clone, Copy)]
pub struct CursorOverlay {
    pub cursor: Handle,
    pub x: i64,
    pub y: i64,
}

/// Recomposite `dirty` (screen coordinates) from the tree under `root`.
pub fn composite(
    reg: &Registry,
    root: Handle,
    target: &mut impl Target,
    dirty: Rect,
    cursor: Option<CursorOverlay>,
) {
    if dirty.is_empty() {
        return;
    }
    let origin = {
        let r = reg.window(root);
        (r.x as i64, r.y as i64)
    };
    paint(reg, target, dirty.translate(-origin.0, -origin.1), root, 0, origin);
    if let Some(c) = cursor {
        draw_cursor(reg, target, dirty, c);
    }
}

/// Paint `rect`, given in the border-inclusive coordinates of `win`, whose
/// outer corner sits at screen `offset`. Only children from `first_child`
/// onwards may cover it.
fn paint(reg: &Registry, target: &mut impl Target, rect: Rect, win: Handle, first_child: usize, offset: (i64, i64)) {
    let w = reg.window(win);
    let b = w.border_width as i64;
    let interior = Rect::new(b, b, w.width() as i64, w.height() as i64);

    for (i, &child) in w.children.iter().enumerate().skip(first_child) {
        let c = reg.window(child);
        if !c.mapped || c.class == WindowClass::InputOnly {
            continue;
        }
        let child_outer = c.outer_rect().translate(b, b);
        let inter = rect.intersect(&child_outer.intersect(&interior));
        if inter.is_empty() {
            continue;
        }

        let strips = [
            Rect { right: inter.left, ..rect },
            Rect { left: inter.right, ..rect },
            Rect {
                left: inter.left,
                right: inter.right,
                bottom: inter.top,
                ..rect
            },
            Rect {
                left: inter.left,
                right: inter.right,
                top: inter.bottom,
                ..rect
            },
        ];
        for strip in strips {
            if !strip.is_empty() {
                paint(reg, target, strip, win, i + 1, offset);
            }
        }

        let (cx, cy) = (child_outer.left, child_outer.top);
        paint(
            reg,
            target,
            inter.translate(-cx, -cy),
            child,
            0,
            (offset.0 + cx, offset.1 + cy),
        );
        return;
    }

    if b > 0 {
        let outer = Rect::new(0, 0, interior.right + b, interior.bottom + b);
        let rows = Rect {
            top: interior.top,
            bottom: interior.bottom,
            ..outer
        };
        let strips = [
            Rect { right: interior.left, ..rows },
            Rect { left: interior.right, ..rows },
            Rect { bottom: interior.top, ..outer },
            Rect { top: interior.bottom, ..outer },
        ];
        for strip in strips {
            let s = rect.intersect(&strip);
            if !s.is_empty() {
                paint_border(reg, target, s, w.attributes.border, offset);
            }
        }
    }

    let d = &w.drawable;
    let rect = rect.intersect(&interior);
    if rect.is_empty() || !d.has_pixels() {
        return;
    }
    let (x0, x1) = ((rect.left - b) as usize, (rect.right - b) as usize);
    for y in rect.top..rect.bottom {
        let row = d.span((y - b) as usize, x0, x1);
        target.copy_row(offset.0 + rect.left, offset.1 + y, row);
    }
}

fn paint_border(reg: &Registry, target: &mut impl Target, rect: Rect, border: Border, offset: (i64, i64)) {
    match border {
        Border::Pixel(p) => target.fill(rect.translate(offset.0, offset.1), p),
        Border::Pixmap(h) => {
            let tile = reg.drawable(h);
            let (tw, th) = (tile.width.max(1) as i64, tile.height.max(1) as i64);
            for y in rect.top..rect.bottom {
                for x in rect.left..rect.right {
                    let v = if tile.has_pixels() {
                        tile.pixel(x.rem_euclid(tw) as usize, y.rem_euclid(th) as usize)
                    } else {
                        0
                    };
                    target.put(offset.0 + x, offset.1 + y, v);
                }
            }
        }
    }
}

fn draw_cursor(reg: &Registry, target: &mut impl Target, dirty: Rect, overlay: CursorOverlay) {
    let cursor = reg.cursor(overlay.cursor);
    let source = reg.drawable(cursor.source);
    let mask = cursor.mask.map(|m| reg.drawable(m));
    let area = reg
        .cursor_bounds(overlay.cursor)
        .translate(overlay.x, overlay.y)
        .intersect(&dirty);
    for y in area.top..area.bottom {
        let sy = y - overlay.y;
        for x in area.left..area.right {
            let sx = x - overlay.x;
            if let Some(m) = mask {
                let (mx, my) = (sx - cursor.mask_x as i64, sy - cursor.mask_y as i64);
                if m.pixel(mx as usize, my as usize) == 0 {
                    continue;
                }
            }
            let lit = source.bounds().contains_point(sx, sy) && source.pixel(sx as usize, sy as usize) != 0;
            let v = if lit { cursor.foreground } else { cursor.background };
            target.put(x, y, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::Drawable;
    use crate::object::{Cursor, ObjectKind};
    use crate::window::tests::add_window;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Counts writes per screen pixel.
    struct Counter {
        width: i64,
        height: i64,
        counts: Vec<u32>,
    }

    impl Counter {
        fn new(width: i64, height: i64) -> Self {
            Self {
                width,
                height,
                counts: vec![0; (width * height) as usize],
            }
        }

        fn hit(&mut self, x: i64, y: i64) {
            assert!(x >= 0 && y >= 0 && x < self.width && y < self.height, "write outside screen at {x},{y}");
            self.counts[(y * self.width + x) as usize] += 1;
        }
    }

    impl Target for Counter {
        fn fill(&mut self, rect: Rect, _pixel: u32) {
            for y in rect.top..rect.bottom {
                for x in rect.left..rect.right {
                    self.hit(x, y);
                }
            }
        }

        fn copy_row(&mut self, x: i64, y: i64, row: &[u32]) {
            for i in 0..row.len() as i64 {
                self.hit(x + i, y);
            }
        }

        fn put(&mut self, x: i64, y: i64, _pixel: u32) {
            self.hit(x, y);
        }
    }

    fn fill(reg: &mut Registry, h: Handle, pixel: u32) {
        let d = reg.drawable_mut(h);
        let b = d.bounds();
        d.fill_rect(b, pixel);
    }

    #[test]
    fn test_every_pixel_painted_once() {
        let mut rng = StdRng::seed_from_u64(7);
        for round in 0..20 {
            let mut reg = Registry::new();
            let root = add_window(&mut reg, 1, None, 0, 0, 120, 90, 0);
            let mut parents = vec![root];
            for n in 0..12u32 {
                let parent = parents[rng.gen_range(0..parents.len())];
                let h = add_window(
                    &mut reg,
                    100 + n,
                    Some(parent),
                    rng.gen_range(-30..100),
                    rng.gen_range(-30..80),
                    rng.gen_range(0..70),
                    rng.gen_range(0..70),
                    rng.gen_range(0..6),
                );
                if rng.gen_bool(0.15) {
                    reg.window_mut(h).mapped = false;
                }
                parents.push(h);
            }
            let dirty = if round % 2 == 0 {
                Rect::new(0, 0, 120, 90)
            } else {
                Rect::new(rng.gen_range(0..60), rng.gen_range(0..45), 50, 40)
            };
            let mut counter = Counter::new(120, 90);
            composite(&reg, root, &mut counter, dirty, None);
            for y in 0..90 {
                for x in 0..120 {
                    let expected = dirty.contains_point(x, y) as u32;
                    assert_eq!(counter.counts[(y * 120 + x) as usize], expected, "round {round} pixel {x},{y}");
                }
            }
        }
    }

    #[test]
    fn test_front_sibling_occludes_back() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 100, 100, 0);
        let back = add_window(&mut reg, 2, Some(root), 10, 10, 50, 50, 0);
        let front = add_window(&mut reg, 3, Some(root), 30, 30, 50, 50, 0);
        fill(&mut reg, root, 0x111111);
        fill(&mut reg, back, 0xff0000);
        fill(&mut reg, front, 0x0000ff);
        let mut fb = Framebuffer::new(100, 100);
        let all = fb.bounds();
        composite(&reg, root, &mut fb, all, None);
        assert_eq!(fb.pixel(5, 5), 0x111111);
        assert_eq!(fb.pixel(15, 15), 0xff0000);
        assert_eq!(fb.pixel(35, 35), 0x0000ff);
        assert_eq!(fb.pixel(59, 59), 0x0000ff);
        assert_eq!(fb.pixel(79, 79), 0x0000ff);
        assert_eq!(fb.pixel(85, 85), 0x111111);
    }

    #[test]
    fn test_border_and_child_clipping() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 40, 40, 0);
        let frame = add_window(&mut reg, 2, Some(root), 5, 5, 10, 10, 2);
        reg.window_mut(frame).attributes.border = Border::Pixel(0x00ff00);
        let inner = add_window(&mut reg, 3, Some(frame), -3, -3, 30, 30, 0);
        fill(&mut reg, frame, 0xaaaaaa);
        fill(&mut reg, inner, 0xbbbbbb);
        let mut fb = Framebuffer::new(40, 40);
        let all = fb.bounds();
        composite(&reg, root, &mut fb, all, None);
        // border ring of the frame stays visible over the oversized child
        assert_eq!(fb.pixel(5, 5), 0x00ff00);
        assert_eq!(fb.pixel(18, 10), 0x00ff00);
        assert_eq!(fb.pixel(7, 7), 0xbbbbbb);
        assert_eq!(fb.pixel(16, 16), 0xbbbbbb);
        assert_eq!(fb.pixel(20, 20), 0);
    }

    #[test]
    fn test_cursor_mask() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 10, 10, 0);
        let mut source = Drawable::new(2, 2, 1, 1, 0).unwrap();
        source.set_pixel(0, 0, 1);
        let mut mask = Drawable::new(2, 2, 1, 1, 0).unwrap();
        mask.set_pixel(0, 0, 1);
        mask.set_pixel(1, 0, 1);
        let source = reg.insert(0x10, None, ObjectKind::Pixmap(source));
        let mask = reg.insert(0x11, None, ObjectKind::Pixmap(mask));
        let cursor = reg.insert(
            0x12,
            None,
            ObjectKind::Cursor(Cursor {
                source,
                mask: Some(mask),
                foreground: 0xffffff,
                background: 0x123456,
                hot_x: 0,
                hot_y: 0,
                mask_x: 0,
                mask_y: 0,
            }),
        );
        fill(&mut reg, root, 0x777777);
        let mut fb = Framebuffer::new(10, 10);
        let overlay = CursorOverlay { cursor, x: 4, y: 4 };
        let all = fb.bounds();
        composite(&reg, root, &mut fb, all, Some(overlay));
        assert_eq!(fb.pixel(4, 4), 0xffffff);
        assert_eq!(fb.pixel(5, 4), 0x123456);
        assert_eq!(fb.pixel(4, 5), 0x777777);
    }

    #[test]
    fn test_offset_mask_extends_footprint() {
        let mut reg = Registry::new();
        let root = add_window(&mut reg, 1, None, 0, 0, 10, 10, 0);
        let mut source = Drawable::new(1, 1, 1, 1, 0).unwrap();
        source.set_pixel(0, 0, 1);
        let mut mask = Drawable::new(3, 1, 1, 1, 0).unwrap();
        for x in 0..3 {
            mask.set_pixel(x, 0, 1);
        }
        let source = reg.insert(0x10, None, ObjectKind::Pixmap(source));
        let mask = reg.insert(0x11, None, ObjectKind::Pixmap(mask));
        let cursor = reg.insert(
            0x12,
            None,
            ObjectKind::Cursor(Cursor {
                source,
                mask: Some(mask),
                foreground: 0xffffff,
                background: 0x123456,
                hot_x: 0,
                hot_y: 0,
                mask_x: -1,
                mask_y: 0,
            }),
        );
        fill(&mut reg, root, 0x777777);
        let mut fb = Framebuffer::new(10, 10);
        let all = fb.bounds();
        composite(&reg, root, &mut fb, all, Some(CursorOverlay { cursor, x: 4, y: 4 }));
        assert_eq!(fb.pixel(3, 4), 0x123456);
        assert_eq!(fb.pixel(4, 4), 0xffffff);
        assert_eq!(fb.pixel(5, 4), 0x123456);
        assert_eq!(fb.pixel(6, 4), 0x777777);
    }
}
