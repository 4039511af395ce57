//! Pan/zoom view over the image.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

/// Camera manages the view transform of the image viewer.
///
/// `zoom` is screen pixels per image (world) unit, so at zoom 1 one screen
/// pixel shows one image pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan)
    pub offset: Vec2,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 1.0 / 512.0,
            max_zoom: 64.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// World-to-screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen-to-world transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// World units covered by one screen pixel.
    pub fn units_per_pixel(&self) -> f64 {
        1.0 / self.zoom
    }

    /// Convert a screen-space length to world units.
    pub fn pixels_to_world(&self, pixels: f64) -> f64 {
        pixels * self.units_per_pixel()
    }

    /// Convert a world-space length to screen pixels.
    pub fn world_to_pixels(&self, units: f64) -> f64 {
        units * self.zoom
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom the camera, keeping the given screen point fixed.
    /// Returns false if the zoom was already at its limit.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }

        let world_point = self.screen_to_world(screen_point);
        self.zoom = new_zoom;

        // Keep world_point under screen_point
        let new_screen = self.world_to_screen(world_point);
        self.offset += screen_point - new_screen;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_per_pixel_follows_zoom() {
        let mut camera = Camera::new();
        assert!((camera.units_per_pixel() - 1.0).abs() < f64::EPSILON);
        camera.zoom = 0.25;
        assert!((camera.units_per_pixel() - 4.0).abs() < f64::EPSILON);
        assert!((camera.pixels_to_world(10.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_screen_to_world_with_offset_and_zoom() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(50.0, 100.0);
        camera.zoom = 2.0;
        let world = camera.screen_to_world(Point::new(150.0, 300.0));
        assert!((world.x - 50.0).abs() < 1e-9);
        assert!((world.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_at_keeps_point_fixed() {
        let mut camera = Camera::new();
        let anchor = Point::new(200.0, 150.0);
        let before = camera.screen_to_world(anchor);
        assert!(camera.zoom_at(anchor, 0.5));
        let after = camera.screen_to_world(anchor);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut camera = Camera::new();
        camera.zoom = camera.max_zoom;
        assert!(!camera.zoom_at(Point::ZERO, 2.0));
    }
}
