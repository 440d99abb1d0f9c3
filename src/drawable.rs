//! Pixel storage shared by windows and pixmaps

use crate::error::XError;
use crate::proto::Gravity;
use crate::rect::Rect;

/// A pixel surface. Storage is padded to power-of-two dimensions so that
/// small resizes do not reallocate.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub width: u16,
    pub height: u16,
    pub alloc_width: usize,
    pub alloc_height: usize,
    pub depth: u8,
    /// Root window id of the screen this drawable belongs to.
    pub root: u32,
    /// `0x00RRGGBB` for depth 24/32, `0` or `1` for depth 1. Row stride is
    /// `alloc_width`.
    pixels: Vec<u32>,
}

fn npot(n: u16) -> usize {
    (n.max(1) as usize).next_power_of_two()
}

fn alloc_pixels(len: usize, fill: u32) -> Result<Vec<u32>, XError> {
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).map_err(|_| XError::Alloc)?;
    pixels.resize(len, fill);
    Ok(pixels)
}

impl Drawable {
    pub fn new(width: u16, height: u16, depth: u8, root: u32, fill: u32) -> Result<Self, XError> {
        let alloc_width = npot(width);
        let alloc_height = npot(height);
        Ok(Self {
            width,
            height,
            alloc_width,
            alloc_height,
            depth,
            root,
            pixels: alloc_pixels(alloc_width * alloc_height, fill)?,
        })
    }

    /// Geometry only, for InputOnly windows.
    pub fn without_pixels(width: u16, height: u16, root: u32) -> Self {
        Self {
            width,
            height,
            alloc_width: 0,
            alloc_height: 0,
            depth: 0,
            root,
            pixels: Vec::new(),
        }
    }

    pub fn has_pixels(&self) -> bool {
        !self.pixels.is_empty()
    }

    pub fn pitch(&self) -> usize {
        self.alloc_width
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i64, self.height as i64)
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.alloc_width + x]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, v: u32) {
        self.pixels[y * self.alloc_width + x] = v;
    }

    /// Pixels `[x0, x1)` of row `y`.
    pub fn span(&self, y: usize, x0: usize, x1: usize) -> &[u32] {
        let base = y * self.alloc_width;
        &self.pixels[base + x0..base + x1]
    }

    /// Fill `rect`, clipped to the drawable.
    pub fn fill_rect(&mut self, rect: Rect, pixel: u32) {
        let r = rect.intersect(&self.bounds());
        if r.is_empty() || !self.has_pixels() {
            return;
        }
        for y in r.top as usize..r.bottom as usize {
            let base = y * self.alloc_width;
            self.pixels[base + r.left as usize..base + r.right as usize].fill(pixel);
        }
    }

    /// Write a ZPixmap image with 32 bits per pixel in LSBFirst order.
    pub fn put_z_pixmap(&mut self, dst_x: i16, dst_y: i16, width: u16, height: u16, data: &[u8]) {
        if !self.has_pixels() {
            return;
        }
        let stride = width as usize * 4;
        let mask = if self.depth == 32 { 0xffff_ffff } else { 0x00ff_ffff };
        let target = Rect::new(dst_x as i64, dst_y as i64, width as i64, height as i64);
        let r = target.intersect(&self.bounds());
        for y in r.top..r.bottom {
            let sy = (y - target.top) as usize;
            for x in r.left..r.right {
                let sx = (x - target.left) as usize;
                let off = sy * stride + sx * 4;
                let Some(b) = data.get(off..off + 4) else {
                    return;
                };
                let v = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) & mask;
                self.set_pixel(x as usize, y as usize, v);
            }
        }
    }

    /// Write a single-plane image, LSB-first bits with 32-bit scanline pad.
    /// Set bits become `one`, clear bits `zero`.
    #[allow(clippy::too_many_arguments)]
    pub fn put_bits(
        &mut self,
        dst_x: i16,
        dst_y: i16,
        width: u16,
        height: u16,
        left_pad: u8,
        data: &[u8],
        one: u32,
        zero: u32,
    ) {
        if !self.has_pixels() {
            return;
        }
        let stride = (width as usize + left_pad as usize).div_ceil(32) * 4;
        let target = Rect::new(dst_x as i64, dst_y as i64, width as i64, height as i64);
        let r = target.intersect(&self.bounds());
        for y in r.top..r.bottom {
            let sy = (y - target.top) as usize;
            for x in r.left..r.right {
                let bit = (x - target.left) as usize + left_pad as usize;
                let Some(&byte) = data.get(sy * stride + bit / 8) else {
                    return;
                };
                let v = if byte & (1 << (bit % 8)) != 0 { one } else { zero };
                self.set_pixel(x as usize, y as usize, v);
            }
        }
    }

    /// Resize to `width` x `height`, relocating the old content by `gravity`
    /// and filling uncovered pixels with `background`.
    pub fn resize(&mut self, width: u16, height: u16, gravity: Gravity, background: u32) -> Result<(), XError> {
        if !self.has_pixels() {
            self.width = width;
            self.height = height;
            return Ok(());
        }
        let (ow, oh) = (self.width as i64, self.height as i64);
        let (w, h) = (width as i64, height as i64);
        let need_w = npot(width);
        let need_h = npot(height);
        let realloc = need_w > self.alloc_width
            || need_h > self.alloc_height
            || need_w * 2 < self.alloc_width
            || need_h * 2 < self.alloc_height;

        let (dx, dy) = match gravity {
            Gravity::Forget | Gravity::NorthWest => (0, 0),
            Gravity::North => ((w - ow) / 2, 0),
            Gravity::NorthEast => (w - ow, 0),
            Gravity::West => (0, (h - oh) / 2),
            Gravity::Center | Gravity::Static => ((w - ow) / 2, (h - oh) / 2),
            Gravity::East => (w - ow, (h - oh) / 2),
            Gravity::SouthWest => (0, h - oh),
            Gravity::South => ((w - ow) / 2, h - oh),
            Gravity::SouthEast => (w - ow, h - oh),
        };

        // source columns and rows that survive the move
        let sx0 = (-dx).max(0);
        let sx1 = ow.min(w - dx);
        let sy0 = (-dy).max(0);
        let sy1 = oh.min(h - dy);
        let keep = gravity != Gravity::Forget && sx1 > sx0 && sy1 > sy0;

        if realloc {
            let mut pixels = alloc_pixels(need_w * need_h, background)?;
            if keep {
                let len = (sx1 - sx0) as usize;
                for sy in sy0..sy1 {
                    let src = sy as usize * self.alloc_width + sx0 as usize;
                    let dst = (sy + dy) as usize * need_w + (sx0 + dx) as usize;
                    pixels[dst..dst + len].copy_from_slice(&self.pixels[src..src + len]);
                }
            }
            self.pixels = pixels;
            self.alloc_width = need_w;
            self.alloc_height = need_h;
            self.width = width;
            self.height = height;
            return Ok(());
        }

        if keep && (dx != 0 || dy != 0) {
            let pitch = self.alloc_width;
            let len = (sx1 - sx0) as usize;
            let mut copy_row = |sy: i64| {
                let src = sy as usize * pitch + sx0 as usize;
                let dst = (sy + dy) as usize * pitch + (sx0 + dx) as usize;
                self.pixels.copy_within(src..src + len, dst);
            };
            // walk rows away from the destination so nothing is read after
            // being overwritten
            if dy > 0 {
                (sy0..sy1).rev().for_each(&mut copy_row);
            } else {
                (sy0..sy1).for_each(&mut copy_row);
            }
        }

        self.width = width;
        self.height = height;
        let moved = if keep {
            Rect::new(sx0 + dx, sy0 + dy, sx1 - sx0, sy1 - sy0)
        } else {
            Rect::EMPTY
        };
        self.fill_outside(moved, background);
        Ok(())
    }

    /// Fill everything in bounds except `keep`.
    fn fill_outside(&mut self, keep: Rect, pixel: u32) {
        let b = self.bounds();
        if keep.is_empty() {
            self.fill_rect(b, pixel);
            return;
        }
        self.fill_rect(Rect { bottom: keep.top, ..b }, pixel);
        self.fill_rect(Rect { top: keep.bottom, ..b }, pixel);
        let middle = Rect {
            top: keep.top,
            bottom: keep.bottom,
            ..b
        };
        self.fill_rect(Rect { right: keep.left, ..middle }, pixel);
        self.fill_rect(Rect { left: keep.right, ..middle }, pixel);
    }
}
