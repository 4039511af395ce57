//! Annotation elements: vector shapes and categorical pixelmaps.

mod color;
mod pixelmap;
mod store;

pub use color::{Color, ColorParseError};
pub use pixelmap::{Category, Pixelmap};
pub use store::ElementStore;

use crate::geometry::{Polygon, Ring, ring_bounds};
use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Style attributes shared by every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyle {
    pub line_color: Color,
    pub fill_color: Color,
    pub line_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Name of the style group. `None` means the default group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            line_color: Color::black(),
            fill_color: Color::transparent(),
            line_width: 2.0,
            label: None,
            group: None,
        }
    }
}

/// Geometry of an element, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Point {
        center: Point,
    },
    Polyline {
        points: Ring,
        #[serde(default)]
        closed: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        holes: Vec<Ring>,
    },
    Rectangle {
        center: Point,
        width: f64,
        height: f64,
        #[serde(default)]
        rotation: f64,
    },
    Ellipse {
        center: Point,
        width: f64,
        height: f64,
        #[serde(default)]
        rotation: f64,
    },
    Circle {
        center: Point,
        radius: f64,
    },
    Pixelmap(Pixelmap),
}

/// A single annotation element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub style: ElementStyle,
    #[serde(flatten)]
    pub geometry: Geometry,
}

impl Element {
    /// Create an element with a fresh id and the default style.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            style: ElementStyle::default(),
            geometry,
        }
    }

    /// Create an element with the given style.
    pub fn with_style(geometry: Geometry, style: ElementStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            style,
            geometry,
        }
    }

    /// Closed polygon element built from a composed polygon.
    pub fn from_polygon(polygon: Polygon, style: ElementStyle) -> Self {
        Self::with_style(
            Geometry::Polyline {
                points: polygon.exterior,
                closed: true,
                holes: polygon.holes,
            },
            style,
        )
    }

    /// Wire name of the element type.
    pub fn type_name(&self) -> &'static str {
        match &self.geometry {
            Geometry::Point { .. } => "point",
            Geometry::Polyline { .. } => "polyline",
            Geometry::Rectangle { .. } => "rectangle",
            Geometry::Ellipse { .. } => "ellipse",
            Geometry::Circle { .. } => "circle",
            Geometry::Pixelmap(_) => "pixelmap",
        }
    }

    /// Check if this element is a pixelmap.
    pub fn is_pixelmap(&self) -> bool {
        matches!(self.geometry, Geometry::Pixelmap(_))
    }

    pub fn as_pixelmap(&self) -> Option<&Pixelmap> {
        match &self.geometry {
            Geometry::Pixelmap(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_pixelmap_mut(&mut self) -> Option<&mut Pixelmap> {
        match &mut self.geometry {
            Geometry::Pixelmap(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the element has a closed area that boolean operations can act on.
    pub fn is_polygonal(&self) -> bool {
        match &self.geometry {
            Geometry::Polyline { closed, points, .. } => *closed && points.len() >= 3,
            Geometry::Rectangle { .. } | Geometry::Ellipse { .. } | Geometry::Circle { .. } => true,
            Geometry::Point { .. } | Geometry::Pixelmap(_) => false,
        }
    }

    /// Decompose the element into a polygon.
    ///
    /// Curved outlines are flattened so that no point deviates from the true
    /// curve by more than `tolerance` world units.
    pub fn to_polygon(&self, tolerance: f64) -> Option<Polygon> {
        if !self.is_polygonal() {
            return None;
        }
        match &self.geometry {
            Geometry::Polyline { points, holes, .. } => {
                Some(Polygon::with_holes(points.clone(), holes.clone()))
            }
            Geometry::Rectangle { center, width, height, rotation } => {
                let rect = Rect::from_center_size(*center, (*width, *height));
                let rotate = Affine::rotate_about(*rotation, *center);
                Some(Polygon::new(
                    Polygon::from_rect(rect).exterior.into_iter().map(|p| rotate * p).collect(),
                ))
            }
            Geometry::Ellipse { center, width, height, rotation } => Some(Polygon::new(
                flatten_ellipse(*center, Vec2::new(width / 2.0, height / 2.0), *rotation, tolerance),
            )),
            Geometry::Circle { center, radius } => Some(Polygon::new(flatten_ellipse(
                *center,
                Vec2::new(*radius, *radius),
                0.0,
                tolerance,
            ))),
            Geometry::Point { .. } | Geometry::Pixelmap(_) => None,
        }
    }

    /// Bounding box in world coordinates.
    pub fn bounds(&self) -> Rect {
        match &self.geometry {
            Geometry::Point { center } => Rect::from_points(*center, *center),
            Geometry::Polyline { points, .. } => ring_bounds(points),
            Geometry::Pixelmap(p) => p.bounds(),
            _ => self
                .to_polygon(0.5)
                .map(|p| p.bounds())
                .unwrap_or(Rect::ZERO),
        }
    }

    /// Apply a style, keeping the id and geometry.
    pub fn set_style(&mut self, style: ElementStyle) {
        self.style = style;
    }
}

/// Sample an ellipse outline so that the chord error stays within `tolerance`.
pub fn flatten_ellipse(center: Point, radii: Vec2, rotation: f64, tolerance: f64) -> Ring {
    let r = radii.x.abs().max(radii.y.abs());
    if r <= f64::EPSILON {
        return Vec::new();
    }
    let tolerance = tolerance.max(1e-6).min(r);
    // Segment count for a circle of radius r with sagitta <= tolerance
    let step = 2.0 * (1.0 - tolerance / r).acos();
    let segments = ((std::f64::consts::TAU / step).ceil() as usize).clamp(8, 4096);
    let rotate = Affine::rotate_about(rotation, center);
    (0..segments)
        .map(|i| {
            let t = std::f64::consts::TAU * i as f64 / segments as f64;
            rotate * Point::new(center.x + radii.x * t.cos(), center.y + radii.y * t.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_to_polygon() {
        let el = Element::new(Geometry::Rectangle {
            center: Point::new(5.0, 5.0),
            width: 10.0,
            height: 4.0,
            rotation: 0.0,
        });
        let poly = el.to_polygon(0.25).unwrap();
        assert_eq!(poly.exterior.len(), 4);
        let b = poly.bounds();
        assert!((b.width() - 10.0).abs() < 1e-9);
        assert!((b.height() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotated_rectangle_bounds_grow() {
        let el = Element::new(Geometry::Rectangle {
            center: Point::ZERO,
            width: 10.0,
            height: 10.0,
            rotation: std::f64::consts::FRAC_PI_4,
        });
        assert!(el.bounds().width() > 14.0);
    }

    #[test]
    fn test_circle_flattening_respects_tolerance() {
        let el = Element::new(Geometry::Circle { center: Point::ZERO, radius: 100.0 });
        let coarse = el.to_polygon(5.0).unwrap().exterior.len();
        let fine = el.to_polygon(0.1).unwrap().exterior.len();
        assert!(fine > coarse);
        for p in el.to_polygon(0.1).unwrap().exterior {
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sub_micron_circle_flattens() {
        let el = Element::new(Geometry::Circle { center: Point::new(1.0, 1.0), radius: 5e-7 });
        let ring = el.to_polygon(0.25).unwrap().exterior;
        assert_eq!(ring.len(), 8);
        assert!(el.bounds().width() <= 1e-6 + 1e-12);
    }

    #[test]
    fn test_non_polygonal_elements() {
        let point = Element::new(Geometry::Point { center: Point::ZERO });
        assert!(point.to_polygon(1.0).is_none());
        let open = Element::new(Geometry::Polyline {
            points: vec![Point::ZERO, Point::new(1.0, 1.0), Point::new(2.0, 0.0)],
            closed: false,
            holes: Vec::new(),
        });
        assert!(open.to_polygon(1.0).is_none());
    }

    #[test]
    fn test_wire_format() {
        let mut el = Element::new(Geometry::Circle { center: Point::new(1.0, 2.0), radius: 3.0 });
        el.style.group = Some("tumor".to_string());
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["type"], "circle");
        assert_eq!(json["group"], "tumor");
        assert_eq!(json["lineColor"], "rgb(0, 0, 0)");
        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back, el);
    }
}
