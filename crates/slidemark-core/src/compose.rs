//! Combining newly drawn shapes with existing elements.

use crate::elements::{Element, ElementId, ElementStore, ElementStyle};
use crate::geometry::{
    BooleanOp, BooleanOpOptions, Correspondence, GeometryEngine, Polygon, convex_hull, ring_count,
};

/// Default curve flattening tolerance in screen pixels.
pub const DEFAULT_TOLERANCE_PX: f64 = 0.25;

/// What a composition did to the element store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionOutcome {
    /// False when the caller should add the new shapes as plain elements.
    pub handled: bool,
    /// Existing elements consumed by the operation.
    pub removed: Vec<ElementId>,
    /// Elements created from the operation's result.
    pub added: Vec<ElementId>,
    /// The active draw mode has to be restarted.
    pub restart_draw_mode: bool,
}

impl CompositionOutcome {
    fn unhandled(op: Option<BooleanOp>) -> Self {
        Self {
            restart_draw_mode: op.is_some_and(BooleanOp::restarts_draw_mode),
            ..Self::default()
        }
    }
}

/// Applies boolean operations between drawn shapes and existing elements.
pub struct ShapeComposer<'a, E: GeometryEngine + ?Sized> {
    engine: &'a E,
    tolerance: f64,
}

impl<'a, E: GeometryEngine + ?Sized> ShapeComposer<'a, E> {
    /// Create a composer whose flattening tolerance is `tolerance_px` screen
    /// pixels at the given zoom.
    pub fn new(engine: &'a E, tolerance_px: f64, units_per_pixel: f64) -> Self {
        Self {
            engine,
            tolerance: tolerance_px * units_per_pixel,
        }
    }

    /// Flattening tolerance in world units.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Compose `new_shapes` into `store`.
    ///
    /// Only existing elements of the same style group as `style` take part.
    /// Results are stamped with `style`.
    pub fn compose(
        &self,
        store: &mut ElementStore,
        style: &ElementStyle,
        new_shapes: &[Element],
        op: Option<BooleanOp>,
        as_polygon_list: bool,
    ) -> CompositionOutcome {
        let Some(op) = op else {
            return CompositionOutcome::unhandled(None);
        };

        let clip: Vec<Polygon> = new_shapes
            .iter()
            .filter_map(|shape| shape.to_polygon(self.tolerance))
            .filter_map(Polygon::pruned)
            .collect();
        let rings = ring_count(&clip);
        let decomposable = new_shapes.len() == 1 && !clip.is_empty();
        if clip.is_empty() || (!as_polygon_list && rings < 2 && !decomposable) {
            return CompositionOutcome::unhandled(Some(op));
        }

        let search = convex_hull(clip.iter().flat_map(|p| p.vertices().copied()));
        let matched: Vec<ElementId> = store
            .polygon_search(&search, true, self.tolerance)
            .into_iter()
            .filter(|id| {
                store
                    .get(*id)
                    .is_some_and(|e| e.is_polygonal() && e.style.group == style.group)
            })
            .collect();

        if matched.is_empty() && rings < 2 {
            return CompositionOutcome::unhandled(Some(op));
        }

        let subject: Vec<Polygon> = matched
            .iter()
            .filter_map(|id| store.get(*id))
            .filter_map(|e| e.to_polygon(self.tolerance))
            .collect();
        let options = BooleanOpOptions {
            tolerance: self.tolerance,
            correspondence: Correspondence::Exact,
        };
        let result = self.engine.boolean_op(op, &subject, &clip, &options);
        log::debug!(
            "{:?}: {} existing and {} new polygons gave {} polygons",
            op,
            subject.len(),
            clip.len(),
            result.len()
        );

        let removed: Vec<ElementId> = store.remove_many(&matched).into_iter().map(|e| e.id).collect();
        let added: Vec<ElementId> = result
            .into_iter()
            .filter_map(Polygon::pruned)
            .map(|polygon| {
                let element = Element::from_polygon(polygon, style.clone());
                let id = element.id;
                store.add(element);
                id
            })
            .collect();

        CompositionOutcome {
            handled: true,
            removed,
            added,
            restart_draw_mode: op.restarts_draw_mode(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::elements::Geometry;
    use crate::geometry::{PolygonList, ring_bounds};
    use kurbo::{Point, Rect};
    use std::cell::RefCell;

    /// Bounding-box engine: union merges overlapping boxes, difference and
    /// intersect work on single boxes. Enough to exercise composition.
    #[derive(Default)]
    pub(crate) struct BoxEngine {
        pub calls: RefCell<Vec<(BooleanOp, usize, usize)>>,
    }

    fn boxes(polys: &[Polygon]) -> Vec<Rect> {
        polys.iter().map(|p| ring_bounds(&p.exterior)).collect()
    }

    fn overlaps(a: Rect, b: Rect) -> bool {
        a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
    }

    impl GeometryEngine for BoxEngine {
        fn boolean_op(
            &self,
            op: BooleanOp,
            subject: &[Polygon],
            clip: &[Polygon],
            _options: &BooleanOpOptions,
        ) -> PolygonList {
            self.calls.borrow_mut().push((op, subject.len(), clip.len()));
            let (s, c) = (boxes(subject), boxes(clip));
            let out: Vec<Rect> = match op {
                BooleanOp::Union => {
                    let mut merged: Vec<Rect> = Vec::new();
                    for r in s.into_iter().chain(c) {
                        let mut r = r;
                        while let Some(i) = merged.iter().position(|m| overlaps(*m, r)) {
                            r = r.union(merged.remove(i));
                        }
                        merged.push(r);
                    }
                    merged
                }
                BooleanOp::Intersect => s
                    .iter()
                    .flat_map(|a| c.iter().map(move |b| a.intersect(*b)))
                    .filter(|r| r.area() > 0.0)
                    .collect(),
                BooleanOp::Difference => s
                    .into_iter()
                    .filter(|a| !c.iter().any(|b| b.contains(a.origin()) && b.contains(Point::new(a.x1, a.y1))))
                    .collect(),
            };
            out.into_iter().map(Polygon::from_rect).collect()
        }
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Element {
        let r = Rect::new(x0, y0, x1, y1);
        Element::new(Geometry::Rectangle {
            center: r.center(),
            width: r.width(),
            height: r.height(),
            rotation: 0.0,
        })
    }

    #[test]
    fn test_no_operation_is_unhandled() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        let outcome = composer.compose(&mut store, &ElementStyle::default(), &[rect(0.0, 0.0, 1.0, 1.0)], None, false);
        assert!(!outcome.handled);
        assert!(engine.calls.borrow().is_empty());
    }

    #[test]
    fn test_two_disjoint_rectangles_union() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        let shapes = [rect(0.0, 0.0, 10.0, 10.0), rect(20.0, 0.0, 30.0, 10.0)];

        let outcome = composer.compose(&mut store, &ElementStyle::default(), &shapes, Some(BooleanOp::Union), true);
        assert!(outcome.handled);
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(store.len(), 2);
        assert!(!outcome.restart_draw_mode);
    }

    #[test]
    fn test_single_shape_without_overlap_is_unhandled() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        store.add(rect(100.0, 100.0, 110.0, 110.0));

        let outcome = composer.compose(
            &mut store,
            &ElementStyle::default(),
            &[rect(0.0, 0.0, 10.0, 10.0)],
            Some(BooleanOp::Union),
            false,
        );
        assert!(!outcome.handled);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_union_consumes_overlapping_element() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        let existing = rect(0.0, 0.0, 10.0, 10.0);
        let existing_id = existing.id;
        store.add(existing);

        let outcome = composer.compose(
            &mut store,
            &ElementStyle::default(),
            &[rect(5.0, 5.0, 15.0, 15.0)],
            Some(BooleanOp::Union),
            false,
        );
        assert!(outcome.handled);
        assert_eq!(outcome.removed, vec![existing_id]);
        assert_eq!(outcome.added.len(), 1);
        let merged = store.get(outcome.added[0]).unwrap();
        assert_eq!(merged.bounds(), Rect::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_other_groups_are_left_alone() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        let mut other = rect(0.0, 0.0, 10.0, 10.0);
        other.style.group = Some("stroma".to_string());
        store.add(other);

        let style = ElementStyle {
            group: Some("tumor".to_string()),
            ..ElementStyle::default()
        };
        let outcome = composer.compose(&mut store, &style, &[rect(5.0, 5.0, 15.0, 15.0)], Some(BooleanOp::Union), false);
        assert!(!outcome.handled);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_difference_restarts_even_when_empty() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 1.0);
        let mut store = ElementStore::new();
        store.add(rect(2.0, 2.0, 4.0, 4.0));

        let outcome = composer.compose(
            &mut store,
            &ElementStyle::default(),
            &[rect(0.0, 0.0, 10.0, 10.0)],
            Some(BooleanOp::Difference),
            false,
        );
        assert!(outcome.handled);
        assert_eq!(outcome.removed.len(), 1);
        assert!(outcome.added.is_empty());
        assert!(outcome.restart_draw_mode);
        assert!(store.is_empty());
    }

    #[test]
    fn test_results_stamped_with_style() {
        let engine = BoxEngine::default();
        let composer = ShapeComposer::new(&engine, DEFAULT_TOLERANCE_PX, 2.0);
        assert!((composer.tolerance() - 0.5).abs() < f64::EPSILON);

        let mut store = ElementStore::new();
        let mut existing = rect(0.0, 0.0, 10.0, 10.0);
        existing.style.group = Some("tumor".to_string());
        store.add(existing);
        let style = ElementStyle {
            group: Some("tumor".to_string()),
            label: Some("tumor".to_string()),
            ..ElementStyle::default()
        };
        let outcome = composer.compose(&mut store, &style, &[rect(8.0, 0.0, 12.0, 10.0)], Some(BooleanOp::Intersect), false);
        assert!(outcome.handled);
        assert!(outcome.restart_draw_mode);
        let element = store.get(outcome.added[0]).unwrap();
        assert_eq!(element.style, style);
        assert_eq!(element.type_name(), "polyline");
    }
}
