//! Half-open rectangles in widened integer coordinates

/// `[left, right) x [top, bottom)`. Empty when either extent is non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        if r.is_empty() {
            Rect::EMPTY
        } else {
            r
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Bounding box of both. An empty side contributes nothing.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn translate(&self, dx: i64, dy: i64) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    pub fn contains_point(&self, x: i64, y: i64) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.left >= self.left
                && other.top >= self.top
                && other.right <= self.right
                && other.bottom <= self.bottom)
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 10, 10);
        assert_eq!(a.intersect(&b), Rect::new(5, 0, 5, 5));
        let c = Rect::new(10, 0, 5, 5);
        assert!(a.intersect(&c).is_empty());
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rect::new(2, 2, 3, 3);
        assert_eq!(Rect::EMPTY.union(&a), a);
        assert_eq!(a.union(&Rect::new(8, 8, 0, 4)), a);
        assert_eq!(a.union(&Rect::new(0, 4, 1, 4)), Rect::new(0, 2, 5, 6));
    }

    #[test]
    fn test_no_overflow_at_extremes() {
        let r = Rect::new(i16::MIN as i64, i16::MIN as i64, 65535 + 2 * 65535, 65535);
        assert!(!r.is_empty());
        assert_eq!(r.width(), 3 * 65535);
        assert!(r.contains_point(-1, -1));
    }

    #[test]
    fn test_contains() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains(&Rect::new(10, 10, 5, 5)));
        assert!(outer.contains(&Rect::EMPTY));
        assert!(!outer.contains(&Rect::new(95, 95, 10, 1)));
    }
}
