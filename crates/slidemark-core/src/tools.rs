//! Draw modes and the shape being drawn.

use crate::elements::{Element, Geometry};
use crate::geometry::BooleanOp;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Available draw modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawMode {
    Point,
    Rectangle,
    Ellipse,
    Circle,
    Polygon,
    Line,
    Brush,
}

impl DrawMode {
    pub fn name(self) -> &'static str {
        match self {
            DrawMode::Point => "point",
            DrawMode::Rectangle => "rectangle",
            DrawMode::Ellipse => "ellipse",
            DrawMode::Circle => "circle",
            DrawMode::Polygon => "polygon",
            DrawMode::Line => "line",
            DrawMode::Brush => "brush",
        }
    }

    /// Modes that collect vertices one click at a time.
    pub fn is_vertex_based(self) -> bool {
        matches!(self, DrawMode::Polygon | DrawMode::Line)
    }
}

/// State of the shape being drawn.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ToolState {
    #[default]
    Idle,
    Active {
        start: Point,
        current: Point,
        /// Committed vertices for polygon and line modes.
        vertices: Vec<Point>,
    },
}

/// The active draw mode and its in-progress shape.
///
/// Nothing here touches an element store; a finished shape is returned to
/// the caller, and cancelling simply drops it.
#[derive(Debug, Clone, Default)]
pub struct DrawSession {
    mode: Option<DrawMode>,
    pub state: ToolState,
    boolean_op: Option<BooleanOp>,
    /// Set by [`restart`](Self::restart): the next shape reuses the operation.
    restarted: bool,
}

impl DrawSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Option<DrawMode> {
        self.mode
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    /// Switch to `mode`, or turn drawing off if it is already active.
    pub fn toggle(&mut self, mode: DrawMode) -> Option<DrawMode> {
        let next = if self.mode == Some(mode) { None } else { Some(mode) };
        self.set_mode(next);
        next
    }

    pub fn set_mode(&mut self, mode: Option<DrawMode>) {
        if self.mode != mode {
            log::debug!("Draw mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.state = ToolState::Idle;
        self.restarted = false;
    }

    /// Leave the draw mode and drop any in-progress shape.
    /// Returns true if a mode was active.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.mode.is_some();
        self.set_mode(None);
        self.boolean_op = None;
        was_active
    }

    /// Start over in the current mode with the same boolean operation,
    /// dropping any collected vertices.
    pub fn restart(&mut self) {
        if self.mode.is_some() {
            log::debug!("Restarting draw mode {:?} with {:?}", self.mode, self.boolean_op);
        }
        self.state = ToolState::Idle;
        self.restarted = true;
    }

    /// Pick the boolean operation for the shape about to begin.
    ///
    /// A modifier always wins. Without one, a restarted mode keeps its
    /// previous operation and a fresh mode draws plain shapes.
    pub fn choose_boolean_op(&mut self, modifier: Option<BooleanOp>) {
        if modifier.is_some() || !self.restarted {
            self.boolean_op = modifier;
        }
        self.restarted = false;
    }

    /// Boolean operation requested by a modifier key for the next shape.
    pub fn boolean_op(&self) -> Option<BooleanOp> {
        self.boolean_op
    }

    pub fn set_boolean_op(&mut self, op: Option<BooleanOp>) {
        self.boolean_op = op;
    }

    /// Begin a shape at `point`.
    pub fn begin(&mut self, point: Point) {
        let Some(mode) = self.mode else {
            return;
        };
        match &mut self.state {
            ToolState::Active { current, vertices, .. } if mode.is_vertex_based() => {
                vertices.push(point);
                *current = point;
            }
            _ => {
                self.state = ToolState::Active {
                    start: point,
                    current: point,
                    vertices: vec![point],
                };
            }
        }
    }

    /// Move the free end of the shape.
    pub fn update(&mut self, point: Point) {
        if let ToolState::Active { current, .. } = &mut self.state {
            *current = point;
        }
    }

    /// Complete the shape, returning it as an element with the default style.
    ///
    /// Degenerate shapes (zero-size rectangles, polygons with fewer than three
    /// vertices, ...) are discarded. Brush strokes are not built here.
    pub fn finish(&mut self) -> Option<Element> {
        let mode = self.mode?;
        let ToolState::Active { start, current, vertices } = std::mem::take(&mut self.state) else {
            return None;
        };
        let rect = Rect::from_points(start, current);
        let geometry = match mode {
            DrawMode::Point => Geometry::Point { center: current },
            DrawMode::Rectangle if rect.area() > 0.0 => Geometry::Rectangle {
                center: rect.center(),
                width: rect.width(),
                height: rect.height(),
                rotation: 0.0,
            },
            DrawMode::Ellipse if rect.area() > 0.0 => Geometry::Ellipse {
                center: rect.center(),
                width: rect.width(),
                height: rect.height(),
                rotation: 0.0,
            },
            DrawMode::Circle if start != current => Geometry::Circle {
                center: start,
                radius: (current - start).hypot(),
            },
            DrawMode::Polygon if vertices.len() >= 3 => Geometry::Polyline {
                points: vertices,
                closed: true,
                holes: Vec::new(),
            },
            DrawMode::Line if vertices.len() >= 2 => Geometry::Polyline {
                points: vertices,
                closed: false,
                holes: Vec::new(),
            },
            _ => return None,
        };
        Some(Element::new(geometry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_same_mode_turns_off() {
        let mut session = DrawSession::new();
        assert_eq!(session.toggle(DrawMode::Rectangle), Some(DrawMode::Rectangle));
        assert_eq!(session.toggle(DrawMode::Polygon), Some(DrawMode::Polygon));
        assert_eq!(session.toggle(DrawMode::Polygon), None);
    }

    #[test]
    fn test_rectangle_from_drag() {
        let mut session = DrawSession::new();
        session.toggle(DrawMode::Rectangle);
        session.begin(Point::new(10.0, 10.0));
        session.update(Point::new(0.0, 30.0));
        let element = session.finish().unwrap();
        assert_eq!(
            element.geometry,
            Geometry::Rectangle {
                center: Point::new(5.0, 20.0),
                width: 10.0,
                height: 20.0,
                rotation: 0.0
            }
        );
        assert!(!session.is_drawing());
    }

    #[test]
    fn test_polygon_collects_vertices() {
        let mut session = DrawSession::new();
        session.toggle(DrawMode::Polygon);
        session.begin(Point::new(0.0, 0.0));
        session.begin(Point::new(10.0, 0.0));
        assert!(session.clone().finish().is_none());
        session.begin(Point::new(10.0, 10.0));
        let element = session.finish().unwrap();
        assert!(element.is_polygonal());
    }

    #[test]
    fn test_cancel_discards_shape() {
        let mut session = DrawSession::new();
        session.toggle(DrawMode::Circle);
        session.begin(Point::ZERO);
        session.update(Point::new(5.0, 0.0));
        session.set_boolean_op(Some(BooleanOp::Difference));
        assert!(session.cancel());
        assert_eq!(session.mode(), None);
        assert_eq!(session.boolean_op(), None);
        assert!(session.finish().is_none());
        assert!(!session.cancel());
    }

    #[test]
    fn test_restart_keeps_mode_and_operation() {
        let mut session = DrawSession::new();
        session.toggle(DrawMode::Polygon);
        session.choose_boolean_op(Some(BooleanOp::Difference));
        session.begin(Point::ZERO);
        session.begin(Point::new(10.0, 0.0));
        session.restart();

        assert_eq!(session.mode(), Some(DrawMode::Polygon));
        assert!(!session.is_drawing());
        session.choose_boolean_op(None);
        assert_eq!(session.boolean_op(), Some(BooleanOp::Difference));

        // Without a restart the next shape is plain again
        session.choose_boolean_op(None);
        assert_eq!(session.boolean_op(), None);
    }

    #[test]
    fn test_degenerate_shapes_dropped() {
        let mut session = DrawSession::new();
        session.toggle(DrawMode::Ellipse);
        session.begin(Point::new(1.0, 1.0));
        assert!(session.finish().is_none());
    }
}
