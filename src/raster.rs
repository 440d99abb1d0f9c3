//! Scan conversion
//!
//! Stateless pixel plotting for the core drawing requests. Shapes are
//! traced onto any [`Canvas`]; the caller decides what a plotted pixel
//! means. Coordinates are widened to `i64` so request values never overflow.

use std::f64::consts::TAU;

/// Full circle in X angle units (1/64 degree).
pub const FULL_CIRCLE: i32 = 360 * 64;

pub trait Canvas {
    fn plot(&mut self, x: i64, y: i64);

    /// Pixels `x0..=x1` of row `y`.
    fn hline(&mut self, x0: i64, x1: i64, y: i64) {
        for x in x0..=x1 {
            self.plot(x, y);
        }
    }
}

/// Thin line including both end points.
pub fn line(c: &mut impl Canvas, x0: i64, y0: i64, x1: i64, y1: i64) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        c.plot(x, y);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Outline of `[x, x + width] x [y, y + height]`, so the outline covers
/// `width + 1` by `height + 1` pixels.
pub fn rectangle(c: &mut impl Canvas, x: i64, y: i64, width: i64, height: i64) {
    let (right, bottom) = (x + width, y + height);
    c.hline(x, right, y);
    if height > 0 {
        c.hline(x, right, bottom);
    }
    for yy in y + 1..bottom {
        c.plot(x, yy);
        if width > 0 {
            c.plot(right, yy);
        }
    }
}

/// Start and extent in radians, normalized so the extent is positive.
/// `None` means the whole ellipse.
fn sweep(angle1: i32, angle2: i32) -> Option<(f64, f64)> {
    if angle2.unsigned_abs() >= FULL_CIRCLE as u32 {
        return None;
    }
    let to_rad = |a: i32| a as f64 / 64.0 * TAU / 360.0;
    let (start, extent) = if angle2 < 0 {
        (angle1 + angle2, -angle2)
    } else {
        (angle1, angle2)
    };
    Some((to_rad(start).rem_euclid(TAU), to_rad(extent)))
}

fn in_sweep(theta: f64, sweep: Option<(f64, f64)>) -> bool {
    match sweep {
        None => true,
        Some((start, extent)) => (theta - start).rem_euclid(TAU) <= extent,
    }
}

/// Outline of the part of the ellipse inscribed in `(x, y, width, height)`
/// from `angle1` through `angle2` more, both in 1/64 degree
/// counterclockwise from three o'clock. Angles are taken in the ellipse's
/// normalized space, which is exact for circles.
pub fn arc(c: &mut impl Canvas, x: i64, y: i64, width: i64, height: i64, angle1: i32, angle2: i32) {
    let (rx, ry) = (width as f64 / 2.0, height as f64 / 2.0);
    let (cx, cy) = (x as f64 + rx, y as f64 + ry);
    let (start, extent) = sweep(angle1, angle2).unwrap_or((0.0, TAU));
    let steps = (((rx + ry) * extent).ceil() as i64).clamp(8, 1 << 16);
    let point = |i: i64| {
        let t = start + extent * i as f64 / steps as f64;
        ((cx + rx * t.cos()).round() as i64, (cy - ry * t.sin()).round() as i64)
    };
    let mut prev = point(0);
    for i in 1..=steps {
        let next = point(i);
        if next != prev {
            line(c, prev.0, prev.1, next.0, next.1);
        }
        prev = next;
    }
    c.plot(prev.0, prev.1);
}

/// Whether normalized point `(u, v)` lies on the arc's side of the chord
/// joining the arc's end points.
fn in_chord(u: f64, v: f64, sweep: Option<(f64, f64)>) -> bool {
    let Some((start, extent)) = sweep else {
        return true;
    };
    let end = start + extent;
    let (x1, y1, x2, y2) = (start.cos(), start.sin(), end.cos(), end.sin());
    let side = |x: f64, y: f64| (x2 - x1) * (y - y1) - (y2 - y1) * (x - x1);
    let mid = start + extent / 2.0;
    side(u, v) * side(mid.cos(), mid.sin()) >= 0.0
}

/// Filled arc: every pixel whose center lies inside the ellipse and inside
/// the pie slice, or with `pie` unset, inside the chord segment.
#[allow(clippy::too_many_arguments)]
pub fn fill_arc(c: &mut impl Canvas, x: i64, y: i64, width: i64, height: i64, angle1: i32, angle2: i32, pie: bool) {
    if width <= 0 || height <= 0 {
        return;
    }
    let (rx, ry) = (width as f64 / 2.0, height as f64 / 2.0);
    let (cx, cy) = (x as f64 + rx, y as f64 + ry);
    let sweep = sweep(angle1, angle2);
    for py in y..y + height {
        let dy = (py as f64 + 0.5 - cy) / ry;
        let mut run: Option<i64> = None;
        for px in x..=x + width {
            let dx = (px as f64 + 0.5 - cx) / rx;
            let inside = px < x + width
                && dx * dx + dy * dy <= 1.0
                && if pie {
                    in_sweep((-dy).atan2(dx), sweep)
                } else {
                    in_chord(dx, -dy, sweep)
                };
            match (inside, run) {
                (true, None) => run = Some(px),
                (false, Some(start)) => {
                    c.hline(start, px - 1, py);
                    run = None;
                }
                _ => {}
            }
        }
    }
}

/// Scanline fill of a closed polygon. Pixels are sampled at their centers
/// and edges are half-open in y, so shared edges are drawn once.
pub fn fill_polygon(c: &mut impl Canvas, points: &[(i64, i64)], even_odd: bool) {
    if points.len() < 3 {
        return;
    }
    let top = points.iter().map(|p| p.1).min().unwrap_or(0);
    let bottom = points.iter().map(|p| p.1).max().unwrap_or(0);
    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for y in top..bottom {
        let sy = y as f64 + 0.5;
        crossings.clear();
        for (i, &(x0, y0)) in points.iter().enumerate() {
            let (x1, y1) = points[(i + 1) % points.len()];
            let (fy0, fy1) = (y0 as f64, y1 as f64);
            let dir = if fy0 <= sy && fy1 > sy {
                1
            } else if fy1 <= sy && fy0 > sy {
                -1
            } else {
                continue;
            };
            let t = (sy - fy0) / (fy1 - fy0);
            crossings.push((x0 as f64 + t * (x1 - x0) as f64, dir));
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut winding = 0;
        for (i, &(xa, dir)) in crossings.iter().enumerate() {
            let before = winding;
            winding += dir;
            let filling = if even_odd { i % 2 == 0 } else { before == 0 && winding != 0 };
            if !filling {
                continue;
            }
            // find where this span closes
            let mut w = winding;
            let mut end = None;
            for (j, &(xb, d)) in crossings.iter().enumerate().skip(i + 1) {
                w += d;
                let closed = if even_odd { j == i + 1 } else { w == 0 };
                if closed {
                    end = Some(xb);
                    break;
                }
            }
            let Some(xb) = end else {
                continue;
            };
            // pixels whose centers fall in [xa, xb)
            let x0 = (xa - 0.5).ceil() as i64;
            let x1 = (xb - 0.5).ceil() as i64 - 1;
            if x1 >= x0 {
                c.hline(x0, x1, y);
            }
        }
    }
}
