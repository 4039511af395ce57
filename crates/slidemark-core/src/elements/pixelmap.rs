//! Categorical raster overlay backed by a per-cell index buffer.

use super::Color;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// One entry of a pixelmap's category table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub label: String,
    pub stroke_color: Color,
    pub fill_color: Color,
}

impl Category {
    pub fn new(label: impl Into<String>, stroke_color: Color, fill_color: Color) -> Self {
        Self {
            label: label.into(),
            stroke_color,
            fill_color,
        }
    }
}

/// A pixelmap element.
///
/// `values` holds one category index per cell, or two adjacent equal entries
/// per cell when `boundaries` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pixelmap {
    /// World position of the top-left cell.
    pub position: Point,
    /// World units per cell.
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub grid_width: u32,
    pub grid_height: u32,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub values: Vec<u32>,
    #[serde(default)]
    boundaries: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl Pixelmap {
    /// Create a pixelmap with every cell set to category 0.
    pub fn new(
        position: Point,
        grid_width: u32,
        grid_height: u32,
        categories: Vec<Category>,
        boundaries: bool,
    ) -> Self {
        let cells = grid_width as usize * grid_height as usize;
        let len = if boundaries { cells * 2 } else { cells };
        Self {
            position,
            scale: 1.0,
            grid_width,
            grid_height,
            categories,
            values: vec![0; len],
            boundaries,
        }
    }

    /// Boundaries mode is fixed at creation.
    pub fn boundaries(&self) -> bool {
        self.boundaries
    }

    /// Number of logical cells.
    pub fn cell_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    /// Required length of `values`.
    pub fn expected_len(&self) -> usize {
        if self.boundaries {
            self.cell_count() * 2
        } else {
            self.cell_count()
        }
    }

    /// World-space extent of the grid.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(
            self.position,
            (
                f64::from(self.grid_width) * self.scale,
                f64::from(self.grid_height) * self.scale,
            ),
        )
    }

    /// Index of the category with `label`, or 0 when there is none.
    pub fn category_index(&self, label: &str) -> u32 {
        self.categories
            .iter()
            .position(|c| c.label == label)
            .map_or(0, |i| i as u32)
    }

    /// Clamp an index into the category table; out-of-range maps to 0.
    pub fn clamp_index(&self, index: u32) -> u32 {
        if (index as usize) < self.categories.len() { index } else { 0 }
    }

    /// Category index stored for a data index, clamped.
    pub fn value_at(&self, data_index: usize) -> Option<u32> {
        self.values.get(data_index).map(|v| self.clamp_index(*v))
    }

    /// Category of a data index, if any.
    pub fn category_at(&self, data_index: usize) -> Option<&Category> {
        self.value_at(data_index)
            .and_then(|i| self.categories.get(i as usize))
    }

    /// Set the category of the cell containing `data_index`.
    ///
    /// In boundaries mode both entries of the cell pair are written. Returns
    /// false when the index is outside the buffer or the value is unchanged.
    pub fn paint(&mut self, data_index: usize, category: u32) -> bool {
        if data_index >= self.values.len() {
            return false;
        }
        let value = self.clamp_index(category);
        let (start, end) = if self.boundaries {
            let start = data_index - data_index % 2;
            (start, (start + 1).min(self.values.len() - 1))
        } else {
            (data_index, data_index)
        };
        let changed = self.values[start..=end].iter().any(|v| *v != value);
        self.values[start..=end].fill(value);
        changed
    }

    /// Data index of the cell under a world point.
    pub fn data_index_at(&self, point: Point) -> Option<usize> {
        if self.scale <= 0.0 {
            return None;
        }
        let col = ((point.x - self.position.x) / self.scale).floor();
        let row = ((point.y - self.position.y) / self.scale).floor();
        if col < 0.0 || row < 0.0 || col >= f64::from(self.grid_width) || row >= f64::from(self.grid_height) {
            return None;
        }
        let cell = row as usize * self.grid_width as usize + col as usize;
        Some(if self.boundaries { cell * 2 } else { cell })
    }

    /// One value per logical cell (the first entry of each boundary pair).
    pub fn cell_values(&self) -> Vec<u32> {
        if self.boundaries {
            self.values.iter().step_by(2).copied().collect()
        } else {
            self.values.clone()
        }
    }

    /// Replace out-of-range indices with 0. Returns the number of entries fixed.
    pub fn clamp_values(&mut self) -> usize {
        let len = self.categories.len() as u32;
        let mut fixed = 0;
        for v in &mut self.values {
            if *v >= len {
                *v = 0;
                fixed += 1;
            }
        }
        fixed
    }
}
