//! Drawing requests
//!
//! Points, lines, rectangles, arcs and polygons are traced by
//! [`crate::raster`] onto a [`Pen`] that clips to the target drawable and
//! collects the touched area for damage. CopyGC, CopyArea and GetImage live
//! here as well.

use crate::drawable::Drawable;
use crate::error::{Flow, RequestResult, XError};
use crate::events::Event;
use crate::object::{GContext, Handle};
use crate::proto::{opcodes as op, GcAttr, IMAGE_FORMAT_XY_PIXMAP, IMAGE_FORMAT_Z_PIXMAP};
use crate::raster::{self, Canvas};
use crate::rect::Rect;
use crate::requests::Call;
use crate::ringbuf::{Reader, Writer};
use crate::server::Server;

const COORD_MODE_ORIGIN: u8 = 0;
const COORD_MODE_PREVIOUS: u8 = 1;

/// Complex, Nonconvex and Convex all fill the same way.
const SHAPE_CONVEX: u8 = 2;

const FILL_RULE_EVEN_ODD: u8 = 0;
const ARC_MODE_PIE_SLICE: u8 = 1;

/// Plots the GC foreground into one drawable.
struct Pen<'a> {
    target: &'a mut Drawable,
    pixel: u32,
    /// Side of the square brush.
    brush: i64,
    touched: Rect,
}

impl<'a> Pen<'a> {
    fn new(target: &'a mut Drawable, gc: &GContext, brush: i64) -> Self {
        let pixel = if target.depth == 1 { gc.foreground & 1 } else { gc.foreground };
        Self {
            target,
            pixel,
            brush: brush.max(1),
            touched: Rect::EMPTY,
        }
    }

    fn fill(&mut self, r: Rect) {
        let r = r.intersect(&self.target.bounds());
        if r.is_empty() {
            return;
        }
        self.target.fill_rect(r, self.pixel);
        self.touched = self.touched.union(&r);
    }
}

impl Canvas for Pen<'_> {
    fn plot(&mut self, x: i64, y: i64) {
        let half = self.brush / 2;
        self.fill(Rect::new(x - half, y - half, self.brush, self.brush));
    }

    fn hline(&mut self, x0: i64, x1: i64, y: i64) {
        if self.brush == 1 {
            self.fill(Rect::new(x0, y, x1 - x0 + 1, 1));
        } else {
            for x in x0..=x1 {
                self.plot(x, y);
            }
        }
    }
}

fn read_points(r: &mut Reader, mode: u8) -> Result<Vec<(i64, i64)>, XError> {
    if mode > COORD_MODE_PREVIOUS {
        return Err(XError::Value(mode as u32));
    }
    if r.remaining() % 4 != 0 {
        return Err(XError::Length);
    }
    let mut points: Vec<(i64, i64)> = Vec::with_capacity(r.remaining() / 4);
    while r.remaining() > 0 {
        let (mut x, mut y) = (r.i16()? as i64, r.i16()? as i64);
        if let Some(&(px, py)) = points.last().filter(|_| mode == COORD_MODE_PREVIOUS) {
            x += px;
            y += py;
        }
        points.push((x, y));
    }
    Ok(points)
}

/// Fixed-size records of `size` bytes.
fn records(r: &Reader, size: usize) -> Result<usize, XError> {
    if r.remaining() % size != 0 {
        return Err(XError::Length);
    }
    Ok(r.remaining() / size)
}

/// Parts of `outer` not covered by `inner`, as up to four bands.
fn subtract(outer: Rect, inner: Rect) -> Vec<Rect> {
    let inner = inner.intersect(&outer);
    if inner.is_empty() {
        return vec![outer];
    }
    [
        Rect { bottom: inner.top, ..outer },
        Rect { top: inner.bottom, ..outer },
        Rect {
            top: inner.top,
            bottom: inner.bottom,
            right: inner.left,
            ..outer
        },
        Rect {
            top: inner.top,
            bottom: inner.bottom,
            left: inner.right,
            ..outer
        },
    ]
    .into_iter()
    .filter(|r| !r.is_empty())
    .collect()
}

/// One bit plane of `area`, LSB first with rows padded to 32 bits.
fn push_plane(out: &mut Vec<u8>, d: &Drawable, area: Rect, bit: u32) {
    let stride = (area.width() as usize).div_ceil(32) * 4;
    for y in area.top..area.bottom {
        let row = out.len();
        out.resize(row + stride, 0);
        for (i, x) in (area.left..area.right).enumerate() {
            if d.pixel(x as usize, y as usize) & bit != 0 {
                out[row + i / 8] |= 1 << (i % 8);
            }
        }
    }
}

impl Server {
    /// Run a drawing pass over `d` and damage whatever it touched.
    fn with_pen(&mut self, d: Handle, gc: &GContext, brush: i64, draw: impl FnOnce(&mut Pen)) {
        let touched = {
            let mut pen = Pen::new(self.objects.drawable_mut(d), gc, brush);
            draw(&mut pen);
            pen.touched
        };
        if !touched.is_empty() {
            self.damage_drawable(d, touched);
        }
    }

    pub(crate) fn handle_copy_gc(&mut self, r: &mut Reader) -> RequestResult {
        let src = self.gc_arg(r.u32()?)?;
        let dst = self.gc_arg(r.u32()?)?;
        let bits = r.u32()?;
        let mask = GcAttr::from_bits(bits).ok_or(XError::Value(bits))?;
        let from = *self.objects.gcontext(src);
        let to = self.objects.gcontext_mut(dst);
        if from.depth != to.depth {
            return Err(XError::Match.into());
        }
        if mask.contains(GcAttr::FUNCTION) {
            to.function = from.function;
        }
        if mask.contains(GcAttr::PLANE_MASK) {
            to.plane_mask = from.plane_mask;
        }
        if mask.contains(GcAttr::FOREGROUND) {
            to.foreground = from.foreground;
        }
        if mask.contains(GcAttr::BACKGROUND) {
            to.background = from.background;
        }
        if mask.contains(GcAttr::LINE_WIDTH) {
            to.line_width = from.line_width;
        }
        if mask.contains(GcAttr::FILL_RULE) {
            to.fill_rule = from.fill_rule;
        }
        if mask.contains(GcAttr::ARC_MODE) {
            to.arc_mode = from.arc_mode;
        }
        if mask.contains(GcAttr::GRAPHICS_EXPOSURES) {
            to.graphics_exposures = from.graphics_exposures;
        }
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_copy_area(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let src = self.drawable_arg(r.u32()?)?;
        let dst = self.drawable_arg(r.u32()?)?;
        let g = self.gc_arg(r.u32()?)?;
        let gc = *self.objects.gcontext(g);
        let (src_x, src_y) = (r.i16()? as i64, r.i16()? as i64);
        let (dst_x, dst_y) = (r.i16()? as i64, r.i16()? as i64);
        let (width, height) = (r.u16()? as i64, r.u16()? as i64);

        let (s, d) = (self.objects.drawable(src), self.objects.drawable(dst));
        if !s.has_pixels() || !d.has_pixels() || s.root != d.root || s.depth != d.depth || gc.depth != d.depth {
            return Err(XError::Match.into());
        }
        let (dx, dy) = (dst_x - src_x, dst_y - src_y);
        let wanted = Rect::new(src_x, src_y, width, height);
        let available = wanted.intersect(&s.bounds());
        let copied = available.translate(dx, dy).intersect(&d.bounds());

        let rows: Vec<Vec<u32>> = (copied.top..copied.bottom)
            .map(|y| {
                s.span((y - dy) as usize, (copied.left - dx) as usize, (copied.right - dx) as usize)
                    .to_vec()
            })
            .collect();
        let target = self.objects.drawable_mut(dst);
        for (y, row) in (copied.top..copied.bottom).zip(rows) {
            for (x, v) in (copied.left..copied.right).zip(row) {
                target.set_pixel(x as usize, y as usize, v);
            }
        }
        self.damage_drawable(dst, copied);

        if gc.graphics_exposures {
            let dst_bounds = self.objects.drawable(dst).bounds();
            let missing: Vec<Rect> = subtract(wanted, available)
                .into_iter()
                .map(|m| m.translate(dx, dy).intersect(&dst_bounds))
                .filter(|m| !m.is_empty())
                .collect();
            let drawable = self.objects.id(dst);
            if missing.is_empty() {
                let event = Event::NoExpose {
                    drawable,
                    minor_opcode: 0,
                    major_opcode: op::COPY_AREA,
                };
                self.send_event(call.client, &event);
            }
            let total = missing.len();
            for (i, m) in missing.into_iter().enumerate() {
                let event = Event::GraphicsExpose {
                    drawable,
                    x: m.left as u16,
                    y: m.top as u16,
                    width: m.width() as u16,
                    height: m.height() as u16,
                    minor_opcode: 0,
                    count: (total - i - 1) as u16,
                    major_opcode: op::COPY_AREA,
                };
                self.send_event(call.client, &event);
            }
        }
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_poly_point(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let points = read_points(r, call.detail)?;
        self.with_pen(d, &gc, 1, |pen| {
            for (x, y) in points {
                pen.plot(x, y);
            }
        });
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_poly_line(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let points = read_points(r, call.detail)?;
        self.with_pen(d, &gc, gc.line_width as i64, |pen| match points.as_slice() {
            [] => {}
            [(x, y)] => pen.plot(*x, *y),
            _ => {
                for pair in points.windows(2) {
                    let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
                    raster::line(pen, x0, y0, x1, y1);
                }
            }
        });
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_poly_segment(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let mut segments = Vec::with_capacity(records(r, 8)?);
        while r.remaining() > 0 {
            segments.push([r.i16()?, r.i16()?, r.i16()?, r.i16()?].map(i64::from));
        }
        self.with_pen(d, &gc, gc.line_width as i64, |pen| {
            for [x0, y0, x1, y1] in segments {
                raster::line(pen, x0, y0, x1, y1);
            }
        });
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_poly_rectangle(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let mut rects = Vec::with_capacity(records(r, 8)?);
        while r.remaining() > 0 {
            rects.push([r.i16()? as i64, r.i16()? as i64, r.u16()? as i64, r.u16()? as i64]);
        }
        self.with_pen(d, &gc, gc.line_width as i64, |pen| {
            for [x, y, w, h] in rects {
                raster::rectangle(pen, x, y, w, h);
            }
        });
        Ok(Flow::Handled)
    }

    fn read_arcs(r: &mut Reader) -> Result<Vec<([i64; 4], i32, i32)>, XError> {
        let mut arcs = Vec::with_capacity(records(r, 12)?);
        while r.remaining() > 0 {
            let rect = [r.i16()? as i64, r.i16()? as i64, r.u16()? as i64, r.u16()? as i64];
            arcs.push((rect, r.i16()? as i32, r.i16()? as i32));
        }
        Ok(arcs)
    }

    pub(crate) fn handle_poly_arc(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let arcs = Self::read_arcs(r)?;
        self.with_pen(d, &gc, gc.line_width as i64, |pen| {
            for ([x, y, w, h], a1, a2) in arcs {
                raster::arc(pen, x, y, w, h, a1, a2);
            }
        });
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_poly_fill_arc(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let arcs = Self::read_arcs(r)?;
        let pie = gc.arc_mode == ARC_MODE_PIE_SLICE;
        self.with_pen(d, &gc, 1, |pen| {
            for ([x, y, w, h], a1, a2) in arcs {
                raster::fill_arc(pen, x, y, w, h, a1, a2, pie);
            }
        });
        Ok(Flow::Handled)
    }

    pub(crate) fn handle_fill_poly(&mut self, r: &mut Reader) -> RequestResult {
        let (d, gc) = self.draw_args(r)?;
        let shape = r.u8()?;
        let mode = r.u8()?;
        r.pad(2)?;
        if shape > SHAPE_CONVEX {
            return Err(XError::Value(shape as u32).into());
        }
        let points = read_points(r, mode)?;
        let even_odd = gc.fill_rule == FILL_RULE_EVEN_ODD;
        self.with_pen(d, &gc, 1, |pen| raster::fill_polygon(pen, &points, even_odd));
        Ok(Flow::Handled)
    }

    pub(crate) fn get_image(&mut self, call: &Call, r: &mut Reader) -> RequestResult {
        let format = call.detail;
        let h = self.drawable_arg(r.u32()?)?;
        let area = Rect::new(r.i16()? as i64, r.i16()? as i64, r.u16()? as i64, r.u16()? as i64);
        let plane_mask = r.u32()?;
        if format != IMAGE_FORMAT_XY_PIXMAP && format != IMAGE_FORMAT_Z_PIXMAP {
            return Err(XError::Value(format as u32).into());
        }
        let visual = if self.objects.is_window(h) {
            if !self.objects.viewable(h) {
                return Err(XError::Match.into());
            }
            self.objects.window(h).visual
        } else {
            0
        };
        let d = self.objects.drawable(h);
        if !d.has_pixels() || !d.bounds().contains(&area) {
            return Err(XError::Match.into());
        }

        let mut data = Vec::new();
        if format == IMAGE_FORMAT_Z_PIXMAP && d.depth != 1 {
            data.reserve(area.area() as usize * 4);
            for y in area.top..area.bottom {
                for &v in d.span(y as usize, area.left as usize, area.right as usize) {
                    data.extend_from_slice(&(v & plane_mask).to_le_bytes());
                }
            }
        } else {
            // depth 1 ZPixmap is a single plane
            for plane in (0..d.depth.min(32)).rev() {
                let bit = 1u32 << plane;
                if plane_mask & bit != 0 {
                    push_plane(&mut data, d, area, bit);
                }
            }
        }
        let depth = d.depth;
        let mut body = Writer::with_capacity(call.order, 24 + data.len());
        body.u32(visual).pad(20).bytes(&data);
        self.reply(call, depth, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::COPY_FROM_PARENT;
    use crate::requests::tests::{body, create_window, map, request, u32_at};
    use crate::server::tests::{connect, test_server};

    fn create_pixmap(server: &mut Server, client: crate::client::ClientId, pid: u32, depth: u8, width: u16, height: u16) {
        let mut b = body();
        b.u32(pid).u32(1).u16(width).u16(height);
        assert!(request(server, client, op::CREATE_PIXMAP, depth, b).is_empty());
    }

    fn create_gc(server: &mut Server, client: crate::client::ClientId, cid: u32, drawable: u32, mask: GcAttr, values: &[u32]) {
        let mut b = body();
        b.u32(cid).u32(drawable).u32(mask.bits());
        for &v in values {
            b.u32(v);
        }
        assert!(request(server, client, op::CREATE_GC, 0, b).is_empty());
    }

    fn pixel(server: &Server, id: u32, x: usize, y: usize) -> u32 {
        let h = server.objects.find(id).unwrap();
        server.objects.drawable(h).pixel(x, y)
    }

    #[test]
    fn test_poly_line_plots_connected_pixels() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (pid, gc) = (base + 1, base + 2);
        create_pixmap(&mut server, c, pid, 24, 8, 8);
        create_gc(&mut server, c, gc, pid, GcAttr::FOREGROUND, &[0xff0000]);

        let mut b = body();
        b.u32(pid).u32(gc).i16(0).i16(0).i16(3).i16(0).i16(0).i16(3);
        assert!(request(&mut server, c, op::POLY_LINE, COORD_MODE_PREVIOUS, b).is_empty());
        // (0,0) -> (3,0) -> (3,3)
        for x in 0..4 {
            assert_eq!(pixel(&server, pid, x, 0), 0xff0000);
        }
        for y in 0..4 {
            assert_eq!(pixel(&server, pid, 3, y), 0xff0000);
        }
        assert_eq!(pixel(&server, pid, 1, 1), 0);

        let mut bad = body();
        bad.u32(pid).u32(gc).i16(0).i16(0);
        let out = request(&mut server, c, op::POLY_LINE, 2, bad);
        assert_eq!((out[0], out[1]), (0, 2));
    }

    #[test]
    fn test_poly_segment_and_rectangle() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (pid, gc) = (base + 1, base + 2);
        create_pixmap(&mut server, c, pid, 24, 10, 10);
        create_gc(&mut server, c, gc, pid, GcAttr::FOREGROUND, &[7]);

        let mut b = body();
        b.u32(pid).u32(gc).i16(0).i16(9).i16(9).i16(9);
        assert!(request(&mut server, c, op::POLY_SEGMENT, 0, b).is_empty());
        assert_eq!(pixel(&server, pid, 0, 9), 7);
        assert_eq!(pixel(&server, pid, 9, 9), 7);

        let mut b = body();
        b.u32(pid).u32(gc).i16(1).i16(1).u16(3).u16(2);
        assert!(request(&mut server, c, op::POLY_RECTANGLE, 0, b).is_empty());
        assert_eq!(pixel(&server, pid, 1, 1), 7);
        assert_eq!(pixel(&server, pid, 4, 3), 7);
        assert_eq!(pixel(&server, pid, 2, 2), 0);

        // half a record
        let mut short = body();
        short.u32(pid).u32(gc).i16(0).i16(0);
        let out = request(&mut server, c, op::POLY_RECTANGLE, 0, short);
        assert_eq!((out[0], out[1]), (0, 16));
    }

    #[test]
    fn test_wide_line_uses_square_brush() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (pid, gc) = (base + 1, base + 2);
        create_pixmap(&mut server, c, pid, 24, 10, 10);
        create_gc(&mut server, c, gc, pid, GcAttr::FOREGROUND | GcAttr::LINE_WIDTH, &[9, 3]);
        let mut b = body();
        b.u32(pid).u32(gc).i16(2).i16(5).i16(7).i16(5);
        assert!(request(&mut server, c, op::POLY_LINE, COORD_MODE_ORIGIN, b).is_empty());
        for y in 4..=6 {
            assert_eq!(pixel(&server, pid, 4, y), 9);
        }
        assert_eq!(pixel(&server, pid, 4, 3), 0);
    }

    #[test]
    fn test_fill_poly_and_arc() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (pid, gc) = (base + 1, base + 2);
        create_pixmap(&mut server, c, pid, 24, 20, 20);
        create_gc(&mut server, c, gc, pid, GcAttr::FOREGROUND, &[5]);

        let mut b = body();
        b.u32(pid).u32(gc).u8(SHAPE_CONVEX).u8(COORD_MODE_ORIGIN).pad(2);
        b.i16(0).i16(0).i16(4).i16(0).i16(4).i16(4).i16(0).i16(4);
        assert!(request(&mut server, c, op::FILL_POLY, 0, b).is_empty());
        assert_eq!(pixel(&server, pid, 3, 3), 5);
        assert_eq!(pixel(&server, pid, 4, 4), 0);

        let mut b = body();
        b.u32(pid).u32(gc).i16(10).i16(10).u16(10).u16(10).i16(0).i16(360 * 64);
        assert!(request(&mut server, c, op::POLY_FILL_ARC, 0, b).is_empty());
        assert_eq!(pixel(&server, pid, 15, 15), 5);
        assert_eq!(pixel(&server, pid, 10, 10), 0);

        let mut bad = body();
        bad.u32(pid).u32(gc).u8(3).u8(0).pad(2);
        let out = request(&mut server, c, op::FILL_POLY, 0, bad);
        assert_eq!((out[0], out[1]), (0, 2));
    }

    #[test]
    fn test_copy_area_overlapping_and_exposures() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let (pid, gc) = (base + 1, base + 2);
        create_pixmap(&mut server, c, pid, 24, 4, 1);
        create_gc(&mut server, c, gc, pid, GcAttr::empty(), &[]);
        let h = server.objects.find(pid).unwrap();
        for x in 0..4 {
            server.objects.drawable_mut(h).set_pixel(x, 0, x as u32 + 1);
        }

        let mut b = body();
        b.u32(pid).u32(pid).u32(gc).i16(0).i16(0).i16(1).i16(0).u16(3).u16(1);
        let out = request(&mut server, c, op::COPY_AREA, 0, b);
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 14);
        assert_eq!(out[10], op::COPY_AREA);
        let row: Vec<u32> = (0..4).map(|x| pixel(&server, pid, x, 0)).collect();
        assert_eq!(row, [1, 1, 2, 3]);

        // two source columns fall outside the pixmap
        let mut b = body();
        b.u32(pid).u32(pid).u32(gc).i16(2).i16(0).i16(0).i16(0).u16(4).u16(1);
        let out = request(&mut server, c, op::COPY_AREA, 0, b);
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 13);
        assert_eq!(u32_at(&out, 4), pid);
        assert_eq!(u16::from_le_bytes([out[8], out[9]]), 2);
        assert_eq!(u16::from_le_bytes([out[12], out[13]]), 2);
        assert_eq!(u16::from_le_bytes([out[18], out[19]]), 0);
        assert_eq!(pixel(&server, pid, 0, 0), 2);
        assert_eq!(pixel(&server, pid, 1, 0), 3);
    }

    #[test]
    fn test_copy_area_depth_mismatch() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        create_pixmap(&mut server, c, base + 1, 24, 4, 4);
        create_pixmap(&mut server, c, base + 2, 1, 4, 4);
        create_gc(&mut server, c, base + 3, base + 1, GcAttr::empty(), &[]);
        let mut b = body();
        b.u32(base + 2).u32(base + 1).u32(base + 3).i16(0).i16(0).i16(0).i16(0).u16(4).u16(4);
        let out = request(&mut server, c, op::COPY_AREA, 0, b);
        assert_eq!((out[0], out[1]), (0, 8));
    }

    #[test]
    fn test_get_image_z_pixmap_and_planes() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        let pid = base + 1;
        create_pixmap(&mut server, c, pid, 24, 3, 2);
        let h = server.objects.find(pid).unwrap();
        server.objects.drawable_mut(h).set_pixel(1, 0, 0x112233);
        server.objects.drawable_mut(h).set_pixel(2, 0, 0x000001);

        let mut b = body();
        b.u32(pid).i16(1).i16(0).u16(2).u16(1).u32(0xffff00);
        let out = request(&mut server, c, op::GET_IMAGE, IMAGE_FORMAT_Z_PIXMAP, b);
        assert_eq!((out[0], out[1]), (1, 24));
        assert_eq!(u32_at(&out, 4), 2);
        assert_eq!(u32_at(&out, 8), 0);
        assert_eq!(u32_at(&out, 32), 0x112200);
        assert_eq!(u32_at(&out, 36), 0);

        // plane 0 only: one padded scanline
        let mut b = body();
        b.u32(pid).i16(0).i16(0).u16(3).u16(1).u32(1);
        let out = request(&mut server, c, op::GET_IMAGE, IMAGE_FORMAT_XY_PIXMAP, b);
        assert_eq!(u32_at(&out, 4), 1);
        assert_eq!(out[32], 0b110);

        // outside the pixmap
        let mut b = body();
        b.u32(pid).i16(2).i16(0).u16(2).u16(1).u32(!0);
        let out = request(&mut server, c, op::GET_IMAGE, IMAGE_FORMAT_Z_PIXMAP, b);
        assert_eq!((out[0], out[1]), (0, 8));
    }

    #[test]
    fn test_get_image_of_window() {
        let mut server = test_server();
        let c = connect(&mut server);
        let wid = server.clients[&c].id_base + 1;
        create_window(&mut server, c, wid, 1, (0, 0, 4, 4), 0, &[]);
        let mut b = body();
        b.u32(wid).i16(0).i16(0).u16(1).u16(1).u32(!0);
        let out = request(&mut server, c, op::GET_IMAGE, IMAGE_FORMAT_Z_PIXMAP, b);
        // not viewable yet
        assert_eq!((out[0], out[1]), (0, 8));

        map(&mut server, c, wid);
        let mut b = body();
        b.u32(wid).i16(0).i16(0).u16(1).u16(1).u32(!0);
        let out = request(&mut server, c, op::GET_IMAGE, IMAGE_FORMAT_Z_PIXMAP, b);
        assert_eq!(out[0], 1);
        let visual = server.objects.window(server.objects.find(wid).unwrap()).visual;
        assert_ne!(visual, COPY_FROM_PARENT);
        assert_eq!(u32_at(&out, 8), visual);
    }

    #[test]
    fn test_copy_gc_respects_mask() {
        let mut server = test_server();
        let c = connect(&mut server);
        let base = server.clients[&c].id_base;
        create_gc(&mut server, c, base + 1, 1, GcAttr::FOREGROUND | GcAttr::LINE_WIDTH, &[0xabcdef, 4]);
        create_gc(&mut server, c, base + 2, 1, GcAttr::empty(), &[]);
        let mut b = body();
        b.u32(base + 1).u32(base + 2).u32(GcAttr::FOREGROUND.bits());
        assert!(request(&mut server, c, op::COPY_GC, 0, b).is_empty());
        let to = *server.objects.gcontext(server.objects.find(base + 2).unwrap());
        assert_eq!(to.foreground, 0xabcdef);
        assert_eq!(to.line_width, 0);
    }
}
