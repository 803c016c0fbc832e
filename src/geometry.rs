use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle with the origin at the top-left corner.
/// All engine coordinates use this convention: y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_center(center: Point, size: Size) -> Self {
        Self {
            x: center.x - size.width / 2.0,
            y: center.y - size.height / 2.0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Overlap test with the other rect inflated by `margin` on every side.
    /// Used for proximity scoring where touching is as bad as overlapping.
    pub fn near(&self, other: &Rect, margin: f32) -> bool {
        self.overlaps(&other.inflate(margin))
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn inflate(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Bounding box of a set of rects. `None` when the iterator is empty.
pub fn bounding_rect<'a, I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Rect>,
{
    let mut iter = rects.into_iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(r)))
}

// ── Cohen-Sutherland region codes ──────────────────────────────────────

const CODE_INSIDE: u8 = 0;
const CODE_LEFT: u8 = 1;
const CODE_RIGHT: u8 = 2;
const CODE_ABOVE: u8 = 4;
const CODE_BELOW: u8 = 8;

fn region_code(rect: &Rect, x: f32, y: f32) -> u8 {
    let mut code = CODE_INSIDE;
    if x < rect.x {
        code |= CODE_LEFT;
    } else if x > rect.right() {
        code |= CODE_RIGHT;
    }
    if y < rect.y {
        code |= CODE_ABOVE;
    } else if y > rect.bottom() {
        code |= CODE_BELOW;
    }
    code
}

/// True when the segment `a..b` touches the rect interior or boundary.
/// Standard Cohen-Sutherland clipping: trivially reject when both region
/// codes share a side, trivially accept when both are inside, otherwise
/// clip the outside endpoint against one violated side and retry.
pub fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let (mut x0, mut y0) = (a.x, a.y);
    let (mut x1, mut y1) = (b.x, b.y);
    let mut code0 = region_code(rect, x0, y0);
    let mut code1 = region_code(rect, x1, y1);

    loop {
        if code0 & code1 != 0 {
            return false;
        }
        if code0 | code1 == 0 {
            return true;
        }
        let outside = if code0 != 0 { code0 } else { code1 };
        let (x, y) = if outside & CODE_ABOVE != 0 {
            (x0 + (x1 - x0) * (rect.y - y0) / (y1 - y0), rect.y)
        } else if outside & CODE_BELOW != 0 {
            (
                x0 + (x1 - x0) * (rect.bottom() - y0) / (y1 - y0),
                rect.bottom(),
            )
        } else if outside & CODE_RIGHT != 0 {
            (
                rect.right(),
                y0 + (y1 - y0) * (rect.right() - x0) / (x1 - x0),
            )
        } else {
            (rect.x, y0 + (y1 - y0) * (rect.x - x0) / (x1 - x0))
        };
        if outside == code0 {
            x0 = x;
            y0 = y;
            code0 = region_code(rect, x0, y0);
        } else {
            x1 = x;
            y1 = y;
            code1 = region_code(rect, x1, y1);
        }
    }
}

/// True when any segment of the polyline touches the rect.
pub fn polyline_intersects_rect(points: &[Point], rect: &Rect) -> bool {
    points
        .windows(2)
        .any(|pair| segment_intersects_rect(pair[0], pair[1], rect))
}

fn orientation(a: Point, b: Point, c: Point) -> f32 {
    (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y)
}

fn on_segment(a: Point, b: Point, c: Point) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Proper or touching intersection of segments `p1..p2` and `p3..p4`.
pub fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let o1 = orientation(p1, p2, p3);
    let o2 = orientation(p1, p2, p4);
    let o3 = orientation(p3, p4, p1);
    let o4 = orientation(p3, p4, p2);

    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return true;
    }
    if o1 == 0.0 && on_segment(p1, p3, p2) {
        return true;
    }
    if o2 == 0.0 && on_segment(p1, p4, p2) {
        return true;
    }
    if o3 == 0.0 && on_segment(p3, p1, p4) {
        return true;
    }
    if o4 == 0.0 && on_segment(p3, p2, p4) {
        return true;
    }
    false
}

/// True when any pair of segments drawn from the two polylines intersects.
pub fn polylines_intersect(a: &[Point], b: &[Point]) -> bool {
    for pa in a.windows(2) {
        for pb in b.windows(2) {
            if segments_intersect(pa[0], pa[1], pb[0], pb[1]) {
                return true;
            }
        }
    }
    false
}

pub fn polyline_length(points: &[Point]) -> f32 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_to(pair[1]))
        .sum()
}

/// Point at fraction `t` (0..=1) of the polyline's arclength, with the unit
/// direction of the segment it falls on. Degenerate polylines yield the
/// first point and a rightward direction.
pub fn point_at_fraction(points: &[Point], t: f32) -> Option<(Point, Point)> {
    if points.is_empty() {
        return None;
    }
    if points.len() == 1 {
        return Some((points[0], Point::new(1.0, 0.0)));
    }
    let total = polyline_length(points);
    if total <= f32::EPSILON {
        return Some((points[0], Point::new(1.0, 0.0)));
    }
    let target = total * t.clamp(0.0, 1.0);
    let mut walked = 0.0f32;
    for pair in points.windows(2) {
        let seg_len = pair[0].distance_to(pair[1]);
        if seg_len <= f32::EPSILON {
            continue;
        }
        if walked + seg_len >= target {
            let local = (target - walked) / seg_len;
            let point = Point::new(
                pair[0].x + (pair[1].x - pair[0].x) * local,
                pair[0].y + (pair[1].y - pair[0].y) * local,
            );
            let dir = Point::new(
                (pair[1].x - pair[0].x) / seg_len,
                (pair[1].y - pair[0].y) / seg_len,
            );
            return Some((point, dir));
        }
        walked += seg_len;
    }
    let last = points[points.len() - 1];
    let prev = points[points.len() - 2];
    let seg_len = prev.distance_to(last).max(f32::EPSILON);
    let dir = Point::new((last.x - prev.x) / seg_len, (last.y - prev.y) / seg_len);
    Some((last, dir))
}

/// Snap a coordinate to the nearest multiple of `grid`. Non-positive grids
/// leave the coordinate untouched.
pub fn snap_to_grid(value: f32, grid: f32) -> f32 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}
