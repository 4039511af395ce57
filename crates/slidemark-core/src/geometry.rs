//! Polygon primitives shared by the composer, the brush and the element store.
//!
//! Boolean polygon operations are delegated to a [`GeometryEngine`]; everything
//! here is plain vertex math on top of kurbo.

use kurbo::{BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// A closed ring of vertices. The closing edge back to the first vertex is implicit.
pub type Ring = Vec<Point>;

/// A polygon with an exterior ring and any number of holes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Ring,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Ring>,
}

/// A list of polygons, as produced by drawing tools and boolean operations.
pub type PolygonList = Vec<Polygon>;

impl Polygon {
    /// Create a polygon without holes.
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    /// Create a polygon with holes.
    pub fn with_holes(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// Polygon covering a rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        Self::new(vec![
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x1, rect.y1),
            Point::new(rect.x0, rect.y1),
        ])
    }

    /// Number of non-empty rings (exterior plus holes).
    pub fn ring_count(&self) -> usize {
        usize::from(!self.exterior.is_empty()) + self.holes.iter().filter(|h| !h.is_empty()).count()
    }

    /// True if the exterior has no vertices.
    pub fn is_empty(&self) -> bool {
        self.exterior.is_empty()
    }

    /// All vertices of all rings.
    pub fn vertices(&self) -> impl Iterator<Item = &Point> {
        self.exterior.iter().chain(self.holes.iter().flatten())
    }

    /// Bounding box of the exterior ring.
    pub fn bounds(&self) -> Rect {
        ring_bounds(&self.exterior)
    }

    /// Check whether a point lies inside the exterior and outside every hole.
    pub fn contains(&self, point: Point) -> bool {
        ring_contains(&self.exterior, point) && !self.holes.iter().any(|h| ring_contains(h, point))
    }

    /// Drop empty holes. Returns `None` when the exterior itself is empty.
    pub fn pruned(mut self) -> Option<Self> {
        if self.exterior.is_empty() {
            return None;
        }
        self.holes.retain(|h| !h.is_empty());
        Some(self)
    }
}

/// Total number of non-empty rings across a polygon list.
pub fn ring_count(polygons: &[Polygon]) -> usize {
    polygons.iter().map(Polygon::ring_count).sum()
}

/// Build a closed kurbo path from a ring.
pub fn ring_path(ring: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let Some(first) = ring.first() else {
        return path;
    };
    path.move_to(*first);
    for point in &ring[1..] {
        path.line_to(*point);
    }
    path.close_path();
    path
}

/// Bounding box of a ring (`Rect::ZERO` when empty).
pub fn ring_bounds(ring: &[Point]) -> Rect {
    let mut iter = ring.iter();
    let Some(first) = iter.next() else {
        return Rect::ZERO;
    };
    iter.fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p))
}

/// Nonzero-winding containment test.
pub fn ring_contains(ring: &[Point], point: Point) -> bool {
    if ring.len() < 3 || !ring_bounds(ring).contains(point) {
        return false;
    }
    ring_path(ring).winding(point) != 0
}

/// Convex hull of a point set (Andrew's monotone chain), counter-clockwise.
pub fn convex_hull<I: IntoIterator<Item = Point>>(points: I) -> Ring {
    let mut pts: Vec<Point> = points.into_iter().collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: Point, a: Point, b: Point| (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x);

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Test if two line segments (a-b) and (c-d) intersect.
pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let cross = |o: Point, p: Point, q: Point| -> f64 {
        (p.x - o.x) * (q.y - o.y) - (p.y - o.y) * (q.x - o.x)
    };
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    // Collinear cases: check if endpoint lies on the other segment
    let on_segment = |p: Point, q: Point, r: Point| -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (d1.abs() < 1e-10 && on_segment(c, d, a))
        || (d2.abs() < 1e-10 && on_segment(c, d, b))
        || (d3.abs() < 1e-10 && on_segment(a, b, c))
        || (d4.abs() < 1e-10 && on_segment(a, b, d))
}

fn edges(ring: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let n = ring.len();
    (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
}

/// True if any edge of `a` crosses any edge of `b`.
pub fn rings_cross(a: &[Point], b: &[Point]) -> bool {
    if a.len() < 2 || b.len() < 2 {
        return false;
    }
    edges(a).any(|(p, q)| edges(b).any(|(r, s)| segments_intersect(p, q, r, s)))
}

/// True if the two rings share any area or boundary.
pub fn rings_overlap(a: &[Point], b: &[Point]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (ra, rb) = (ring_bounds(a), ring_bounds(b));
    if ra.x1 < rb.x0 || rb.x1 < ra.x0 || ra.y1 < rb.y0 || rb.y1 < ra.y0 {
        return false;
    }
    a.iter().any(|p| ring_contains(b, *p))
        || b.iter().any(|p| ring_contains(a, *p))
        || rings_cross(a, b)
}

/// True if every vertex of `inner` lies inside `outer` and no edges cross.
pub fn ring_within(inner: &[Point], outer: &[Point]) -> bool {
    !inner.is_empty() && inner.iter().all(|p| ring_contains(outer, *p)) && !rings_cross(inner, outer)
}

/// Boolean operation applied when composing shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    Union,
    Difference,
    Intersect,
}

impl BooleanOp {
    /// Parse the operation name used by draw-mode events.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "union" => Some(BooleanOp::Union),
            "difference" => Some(BooleanOp::Difference),
            "intersect" => Some(BooleanOp::Intersect),
            _ => None,
        }
    }

    /// Operations after which the active draw mode has to be restarted.
    pub fn restarts_draw_mode(self) -> bool {
        matches!(self, BooleanOp::Difference | BooleanOp::Intersect)
    }
}

/// How results of a boolean operation are associated with their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Correspondence {
    /// Every output polygon maps to exactly one input feature.
    #[default]
    Exact,
    /// No correspondence is tracked.
    Disabled,
}

/// Options passed to [`GeometryEngine::boolean_op`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BooleanOpOptions {
    /// Curve flattening tolerance in world units.
    pub tolerance: f64,
    pub correspondence: Correspondence,
}

/// The polygon clipping collaborator.
///
/// `subject` holds the polygons of existing elements, `clip` the newly drawn
/// shapes. Implementations return the resulting polygon list; empty rings are
/// allowed in the output and are dropped by callers.
pub trait GeometryEngine {
    fn boolean_op(
        &self,
        op: BooleanOp,
        subject: &[Polygon],
        clip: &[Polygon],
        options: &BooleanOpOptions,
    ) -> PolygonList;
}
