//! Brush strokes: turning pointer samples into coverage polygons.
//!
//! A stroke stamps the brush footprint at every sample. Between two samples
//! the gap is bridged by a blur ring, and the union of ring and footprint is
//! emitted for composition with existing elements.

use crate::elements::flatten_ellipse;
use crate::geometry::{BooleanOp, BooleanOpOptions, Correspondence, GeometryEngine, Polygon, Ring};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest brush size in screen pixels.
pub const MIN_BRUSH_SIZE_PX: f64 = 1.0;

/// Largest brush size in screen pixels.
pub const MAX_BRUSH_SIZE_PX: f64 = 1000.0;

/// Brush footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushShape {
    #[default]
    Square,
    Circle,
}

impl BrushShape {
    /// The shape after this one when cycling.
    pub fn next(self) -> Self {
        match self {
            BrushShape::Square => BrushShape::Circle,
            BrushShape::Circle => BrushShape::Square,
        }
    }
}

/// Brush footprint centered on `center`, `size` world units across.
pub fn brush_polygon(shape: BrushShape, center: Point, size: f64, tolerance: f64) -> Polygon {
    let half = size / 2.0;
    match shape {
        BrushShape::Square => Polygon::from_rect(Rect::from_center_size(center, (size, size))),
        BrushShape::Circle => Polygon::new(flatten_ellipse(center, Vec2::new(half, half), 0.0, tolerance)),
    }
}

/// Ring bridging the brush footprint at `from` and at `to`.
///
/// For a square brush this is the parallelogram spanned by the two corners
/// that lie furthest to either side of the travel direction. For a circle it
/// is the rectangle along the travel vector whose width is the diameter.
/// Returns `None` when the brush did not move.
pub fn blur_ring(shape: BrushShape, from: Point, to: Point, size: f64) -> Option<Ring> {
    let travel = to - from;
    let length = travel.hypot();
    if length <= f64::EPSILON {
        return None;
    }
    let half = size / 2.0;
    let (left, right) = match shape {
        BrushShape::Square => {
            let corners = [
                Vec2::new(-half, -half),
                Vec2::new(half, -half),
                Vec2::new(half, half),
                Vec2::new(-half, half),
            ];
            let side = |c: &Vec2| travel.cross(*c);
            let left = corners
                .iter()
                .copied()
                .max_by(|a, b| side(a).total_cmp(&side(b)))?;
            let right = corners
                .iter()
                .copied()
                .min_by(|a, b| side(a).total_cmp(&side(b)))?;
            (left, right)
        }
        BrushShape::Circle => {
            let normal = Vec2::new(-travel.y, travel.x) * (half / length);
            (normal, -normal)
        }
    };
    Some(vec![from + left, to + left, to + right, from + right])
}

/// Shapes produced by one brush sample, ready for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushEmission {
    /// Pointer sequence the shapes belong to.
    pub sequence: u64,
    pub shapes: Vec<Polygon>,
    pub op: BooleanOp,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    sequence: u64,
    last_center: Point,
    last_bounds: Rect,
    op: BooleanOp,
}

/// Brush state across pointer sequences.
#[derive(Debug, Clone)]
pub struct BrushStroke {
    pub shape: BrushShape,
    size_px: f64,
    /// Size in world units; when set, `size_px` follows the zoom.
    world_size: Option<f64>,
    tolerance_px: f64,
    next_sequence: u64,
    active: Option<ActiveStroke>,
}

impl Default for BrushStroke {
    fn default() -> Self {
        Self::new(BrushShape::Square, 20.0)
    }
}

impl BrushStroke {
    pub fn new(shape: BrushShape, size_px: f64) -> Self {
        Self {
            shape,
            size_px: size_px.clamp(MIN_BRUSH_SIZE_PX, MAX_BRUSH_SIZE_PX),
            world_size: None,
            tolerance_px: crate::compose::DEFAULT_TOLERANCE_PX,
            next_sequence: 1,
            active: None,
        }
    }

    /// Keep the brush a fixed size on the image instead of on screen.
    pub fn with_world_size(mut self, world_size: f64, units_per_pixel: f64) -> Self {
        self.world_size = Some(world_size);
        self.on_camera_changed(units_per_pixel);
        self
    }

    pub fn size_px(&self) -> f64 {
        self.size_px
    }

    pub fn world_size(&self) -> Option<f64> {
        self.world_size
    }

    /// Brush size in world units at the given zoom.
    pub fn size_world(&self, units_per_pixel: f64) -> f64 {
        self.world_size.unwrap_or(self.size_px * units_per_pixel)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Sequence id of the stroke in progress.
    pub fn sequence(&self) -> Option<u64> {
        self.active.map(|a| a.sequence)
    }

    /// Recompute the screen size after a pan or zoom.
    pub fn on_camera_changed(&mut self, units_per_pixel: f64) {
        if let Some(world) = self.world_size {
            if units_per_pixel > 0.0 {
                self.size_px = (world / units_per_pixel).clamp(MIN_BRUSH_SIZE_PX, MAX_BRUSH_SIZE_PX);
            }
        }
    }

    /// Cycle to the next brush shape.
    pub fn next_brush_shape(&mut self) -> BrushShape {
        self.shape = self.shape.next();
        self.shape
    }

    /// Grow or shrink the brush by `delta` screen pixels.
    pub fn adjust_brush_size(&mut self, delta: f64, units_per_pixel: f64) -> f64 {
        self.size_px = (self.size_px + delta).clamp(MIN_BRUSH_SIZE_PX, MAX_BRUSH_SIZE_PX);
        if self.world_size.is_some() {
            self.world_size = Some(self.size_px * units_per_pixel);
        }
        self.size_px
    }

    /// Start a new pointer sequence and stamp the brush once.
    ///
    /// `modifier` selects the operation; only union and difference are
    /// accepted, anything else falls back to union.
    pub fn pointer_down(&mut self, point: Point, units_per_pixel: f64, modifier: Option<BooleanOp>) -> BrushEmission {
        let op = match modifier {
            Some(BooleanOp::Difference) => BooleanOp::Difference,
            Some(BooleanOp::Intersect) => {
                log::debug!("Ignoring intersect modifier for brush stroke");
                BooleanOp::Union
            }
            _ => BooleanOp::Union,
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let footprint = self.footprint(point, units_per_pixel);
        self.active = Some(ActiveStroke {
            sequence,
            last_center: point,
            last_bounds: footprint.bounds(),
            op,
        });
        BrushEmission {
            sequence,
            shapes: vec![footprint],
            op,
        }
    }

    /// Continue the stroke. Emits nothing when no stroke is active or the
    /// brush footprint did not move.
    pub fn pointer_move<E: GeometryEngine + ?Sized>(
        &mut self,
        engine: &E,
        point: Point,
        units_per_pixel: f64,
    ) -> Option<BrushEmission> {
        let mut stroke = self.active?;
        let footprint = self.footprint(point, units_per_pixel);
        let bounds = footprint.bounds();
        if bounds == stroke.last_bounds {
            return None;
        }

        let size = self.size_world(units_per_pixel);
        let shapes = match blur_ring(self.shape, stroke.last_center, point, size) {
            Some(ring) => {
                let options = BooleanOpOptions {
                    tolerance: self.tolerance_px * units_per_pixel,
                    correspondence: Correspondence::Disabled,
                };
                engine
                    .boolean_op(BooleanOp::Union, &[footprint], &[Polygon::new(ring)], &options)
                    .into_iter()
                    .filter_map(Polygon::pruned)
                    .collect()
            }
            None => vec![footprint],
        };

        stroke.last_center = point;
        stroke.last_bounds = bounds;
        self.active = Some(stroke);
        Some(BrushEmission {
            sequence: stroke.sequence,
            shapes,
            op: stroke.op,
        })
    }

    /// End the pointer sequence.
    pub fn pointer_up(&mut self) -> Option<u64> {
        self.active.take().map(|a| a.sequence)
    }

    /// Abandon the stroke in progress.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    fn footprint(&self, center: Point, units_per_pixel: f64) -> Polygon {
        brush_polygon(
            self.shape,
            center,
            self.size_world(units_per_pixel),
            self.tolerance_px * units_per_pixel,
        )
    }
}
