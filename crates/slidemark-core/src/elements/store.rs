//! Ordered, id-indexed element collection for one annotation.

use super::{Element, ElementId};
use crate::geometry::{rings_overlap, ring_within};
use kurbo::{Point, Rect};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// The elements of one annotation, in insertion order.
///
/// Serialized as a plain array of elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementStore {
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
}

impl ElementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element. An element with the same id is replaced in place.
    pub fn add(&mut self, element: Element) {
        let id = element.id;
        if self.elements.insert(id, element).is_none() {
            self.order.push(id);
        }
    }

    /// Add several elements in order.
    pub fn add_many<I: IntoIterator<Item = Element>>(&mut self, elements: I) {
        for element in elements {
            self.add(element);
        }
    }

    /// Remove an element.
    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        let removed = self.elements.remove(&id)?;
        self.order.retain(|&eid| eid != id);
        Some(removed)
    }

    /// Remove several elements, returning those that existed.
    pub fn remove_many(&mut self, ids: &[ElementId]) -> Vec<Element> {
        ids.iter().filter_map(|id| self.remove(*id)).collect()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.order.clear();
    }

    /// Get an element by id.
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Get a mutable reference to an element by id.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// Elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Element ids in insertion order.
    pub fn ids(&self) -> &[ElementId] {
        &self.order
    }

    /// Ids of all pixelmap elements.
    pub fn pixelmap_ids(&self) -> Vec<ElementId> {
        self.iter().filter(|e| e.is_pixelmap()).map(|e| e.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Distinct style groups used by elements, in first-use order.
    /// Elements in the default group do not contribute.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for group in self.iter().filter_map(|e| e.style.group.as_ref()) {
            if !groups.contains(group) {
                groups.push(group.clone());
            }
        }
        groups
    }

    /// Bounding box of all elements.
    pub fn bounds(&self) -> Option<Rect> {
        self.iter().map(Element::bounds).reduce(|a, b| a.union(b))
    }

    /// Find polygonal elements that overlap a search polygon.
    ///
    /// With `partial` set, any overlap matches; otherwise the element must lie
    /// entirely within the polygon. Results are in insertion order.
    pub fn polygon_search(&self, polygon: &[Point], partial: bool, tolerance: f64) -> Vec<ElementId> {
        self.iter()
            .filter_map(|element| {
                let ring = element.to_polygon(tolerance)?.exterior;
                let hit = if partial {
                    rings_overlap(&ring, polygon)
                } else {
                    ring_within(&ring, polygon)
                };
                hit.then_some(element.id)
            })
            .collect()
    }
}

impl Serialize for ElementStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ElementStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<Element>::deserialize(deserializer)?;
        let mut store = ElementStore::new();
        store.add_many(elements);
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Geometry;
    use crate::geometry::Polygon;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Element {
        Element::new(Geometry::Rectangle {
            center: Point::new(x + w / 2.0, y + h / 2.0),
            width: w,
            height: h,
            rotation: 0.0,
        })
    }

    #[test]
    fn test_add_remove_keeps_order() {
        let mut store = ElementStore::new();
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(2.0, 0.0, 1.0, 1.0);
        let c = rect(4.0, 0.0, 1.0, 1.0);
        let (ida, idb, idc) = (a.id, b.id, c.id);
        store.add_many([a, b, c]);
        assert_eq!(store.ids(), &[ida, idb, idc]);

        assert!(store.remove(idb).is_some());
        assert_eq!(store.ids(), &[ida, idc]);
        assert!(store.remove(idb).is_none());
    }

    #[test]
    fn test_add_same_id_replaces_in_place() {
        let mut store = ElementStore::new();
        let mut a = rect(0.0, 0.0, 1.0, 1.0);
        store.add(a.clone());
        store.add(rect(5.0, 5.0, 1.0, 1.0));
        a.style.label = Some("changed".to_string());
        store.add(a.clone());
        assert_eq!(store.len(), 2);
        assert_eq!(store.ids()[0], a.id);
        assert_eq!(store.get(a.id).unwrap().style.label.as_deref(), Some("changed"));
    }

    #[test]
    fn test_groups_aggregation() {
        let mut store = ElementStore::new();
        let mut a = rect(0.0, 0.0, 1.0, 1.0);
        a.style.group = Some("tumor".to_string());
        let mut b = rect(0.0, 0.0, 1.0, 1.0);
        b.style.group = Some("tumor".to_string());
        let c = rect(0.0, 0.0, 1.0, 1.0);
        store.add_many([a, b, c]);
        assert_eq!(store.groups(), vec!["tumor".to_string()]);
    }

    #[test]
    fn test_polygon_search_partial_and_full() {
        let mut store = ElementStore::new();
        let inside = rect(1.0, 1.0, 2.0, 2.0);
        let straddling = rect(8.0, 8.0, 5.0, 5.0);
        let outside = rect(50.0, 50.0, 1.0, 1.0);
        let (id_in, id_straddle) = (inside.id, straddling.id);
        store.add_many([inside, straddling, outside]);
        store.add(Element::new(Geometry::Point { center: Point::new(2.0, 2.0) }));

        let search = Polygon::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).exterior;
        assert_eq!(store.polygon_search(&search, true, 0.25), vec![id_in, id_straddle]);
        assert_eq!(store.polygon_search(&search, false, 0.25), vec![id_in]);
    }

    #[test]
    fn test_serializes_as_array() {
        let mut store = ElementStore::new();
        store.add(rect(0.0, 0.0, 1.0, 1.0));
        let json = serde_json::to_value(&store).unwrap();
        assert!(json.is_array());
        let back: ElementStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
