//! Keeping pixelmap category tables consistent with the style registry.
//!
//! Style groups are the color source of truth. Categories without a group
//! produce new groups, groups without a category produce new categories, and
//! the default group's category always ends up first.

use super::{StyleGroup, StyleGroupRegistry};
use crate::elements::{Category, Pixelmap};

/// Result of reconciling one category table.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The new category table, default first.
    pub categories: Vec<Category>,
    /// The remapped value buffer, or `None` when no value changed.
    pub values: Option<Vec<u32>>,
    /// Groups synthesized from orphan categories; they have to be persisted.
    pub new_groups: Vec<StyleGroup>,
}

/// Reconcile a category table and its value buffer against the given groups.
///
/// After this, `categories[0]` is the default group's category and every value
/// is a valid index. Values equal to the old default index become 0, smaller
/// values shift up by one and larger values stay. Indices that were already out
/// of range are clamped to 0.
pub fn reconcile(
    categories: &[Category],
    values: &[u32],
    groups: &[StyleGroup],
    default_name: &str,
) -> Reconciliation {
    let mut categories = categories.to_vec();
    let mut new_groups = Vec::new();

    for category in &mut categories {
        match groups.iter().find(|g| g.id == category.label) {
            Some(group) => {
                category.stroke_color = group.line_color;
                category.fill_color = group.fill_color;
            }
            None if !new_groups.iter().any(|g: &StyleGroup| g.id == category.label) => {
                new_groups.push(StyleGroup::from_category(category));
            }
            None => {}
        }
    }

    for group in groups {
        if !categories.iter().any(|c| c.label == group.id) {
            categories.push(group.to_category());
        }
    }

    let old_index = match categories.iter().position(|c| c.label == default_name) {
        Some(index) => index,
        None => {
            let group = StyleGroup::default_named(default_name);
            categories.push(group.to_category());
            categories.len() - 1
        }
    };

    let mut remapped = values.to_vec();
    if old_index != 0 {
        let default = categories.remove(old_index);
        categories.insert(0, default);
        let old = old_index as u32;
        for v in &mut remapped {
            if *v == old {
                *v = 0;
            } else if *v < old {
                *v += 1;
            }
        }
    }

    let len = categories.len() as u32;
    for v in &mut remapped {
        if *v >= len {
            *v = 0;
        }
    }

    let values = (remapped != values).then_some(remapped);
    Reconciliation {
        categories,
        values,
        new_groups,
    }
}

/// What reconciling a pixelmap element did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Whether the element's categories or values changed.
    pub changed: bool,
    /// Groups that were added to the registry and need persisting.
    pub new_groups: Vec<StyleGroup>,
}

/// Reconcile a pixelmap in place and register any synthesized groups.
pub fn reconcile_pixelmap(pixelmap: &mut Pixelmap, registry: &mut StyleGroupRegistry) -> ReconcileOutcome {
    let result = reconcile(
        &pixelmap.categories,
        &pixelmap.values,
        registry.groups(),
        registry.default_name(),
    );

    let mut changed = result.categories != pixelmap.categories;
    pixelmap.categories = result.categories;
    if let Some(values) = result.values {
        pixelmap.values = values;
        changed = true;
    }

    for group in &result.new_groups {
        log::debug!("Synthesized style group '{}' from pixelmap category", group.id);
        registry.upsert(group.clone());
    }

    ReconcileOutcome {
        changed,
        new_groups: result.new_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Color;
    use crate::style::DEFAULT_GROUP_NAME;
    use kurbo::Point;

    fn category(label: &str) -> Category {
        Category::new(label, Color::rgb(10, 20, 30), Color::new(10, 20, 30, 100))
    }

    fn labels(categories: &[Category]) -> Vec<&str> {
        categories.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn test_default_moved_first_with_remap() {
        let groups = vec![StyleGroup::default_named(DEFAULT_GROUP_NAME)];
        let cats = vec![category("a"), category("default"), category("b")];
        let result = reconcile(&cats, &[0, 1, 2], &groups, DEFAULT_GROUP_NAME);

        assert_eq!(labels(&result.categories), vec!["default", "a", "b"]);
        assert_eq!(result.values, Some(vec![1, 0, 2]));
        let synthesized: Vec<&str> = result.new_groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(synthesized, vec!["a", "b"]);
    }

    #[test]
    fn test_remap_for_every_default_position() {
        let groups = vec![StyleGroup::default_named(DEFAULT_GROUP_NAME)];
        let m = 5u32;
        for j in 0..m {
            let cats: Vec<Category> = (0..m)
                .map(|i| if i == j { category("default") } else { category(&format!("c{}", i)) })
                .collect();
            // Boundary pairs: every value appears twice
            let values: Vec<u32> = (0..m).flat_map(|v| [v, v]).collect();
            let result = reconcile(&cats, &values, &groups, DEFAULT_GROUP_NAME);
            let out = result.values.unwrap_or_else(|| values.clone());

            assert_eq!(result.categories[0].label, "default");
            for (before, after) in values.iter().zip(&out) {
                let expected = if *before == j {
                    0
                } else if *before < j {
                    before + 1
                } else {
                    *before
                };
                assert_eq!(*after, expected);
            }
            for pair in out.chunks(2) {
                assert_eq!(pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_group_colors_win() {
        let mut tumor = StyleGroup::new("tumor", Color::rgb(255, 0, 0), Color::new(255, 0, 0, 50));
        tumor.line_width = 3.0;
        let groups = vec![StyleGroup::default_named(DEFAULT_GROUP_NAME), tumor.clone()];
        let cats = vec![category("default"), category("tumor")];
        let result = reconcile(&cats, &[], &groups, DEFAULT_GROUP_NAME);

        assert!(tumor.colors_match(&result.categories[1]));
        assert!(result.new_groups.is_empty());
        assert_eq!(result.values, None);
    }

    #[test]
    fn test_groups_without_category_are_appended() {
        let groups = vec![
            StyleGroup::default_named(DEFAULT_GROUP_NAME),
            StyleGroup::new("stroma", Color::rgb(0, 255, 0), Color::transparent()),
        ];
        let result = reconcile(&[category("default")], &[0], &groups, DEFAULT_GROUP_NAME);
        assert_eq!(labels(&result.categories), vec!["default", "stroma"]);
    }

    #[test]
    fn test_missing_default_created_then_moved_first() {
        let result = reconcile(&[category("a"), category("b")], &[0, 1, 1], &[], DEFAULT_GROUP_NAME);
        assert_eq!(labels(&result.categories), vec!["default", "a", "b"]);
        assert_eq!(result.values, Some(vec![1, 2, 2]));
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let groups = vec![StyleGroup::default_named(DEFAULT_GROUP_NAME)];
        let result = reconcile(&[category("default")], &[0, 9], &groups, DEFAULT_GROUP_NAME);
        assert_eq!(result.values, Some(vec![0, 0]));
    }

    #[test]
    fn test_reconcile_pixelmap_is_idempotent() {
        let mut registry = StyleGroupRegistry::default();
        registry.upsert(StyleGroup::new("tumor", Color::rgb(255, 0, 0), Color::transparent()));
        let mut pm = Pixelmap::new(
            Point::ZERO,
            2,
            2,
            vec![category("necrosis"), category("default")],
            true,
        );
        pm.values = vec![0, 0, 1, 1, 0, 0, 1, 1];

        let first = reconcile_pixelmap(&mut pm, &mut registry);
        assert!(first.changed);
        assert_eq!(first.new_groups.len(), 1);
        assert!(registry.contains("necrosis"));
        assert_eq!(labels(&pm.categories), vec!["default", "necrosis", "tumor"]);
        assert_eq!(pm.values, vec![1, 1, 0, 0, 1, 1, 0, 0]);

        let snapshot = pm.clone();
        let second = reconcile_pixelmap(&mut pm, &mut registry);
        assert!(!second.changed);
        assert!(second.new_groups.is_empty());
        assert_eq!(pm, snapshot);
    }
}
