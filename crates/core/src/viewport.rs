//! Boundary to the deep-zoom viewer
//!
//! The engine never renders; it only needs coordinate transforms, the zoom
//! level and a switch for the viewer's own pan/zoom navigation.

use crate::annotation::{ImagePoint, ScreenPoint};

pub trait Viewport {
    /// Screen pixels per image pixel
    fn zoom(&self) -> f64;

    /// Zoom used to scale strokes so they keep a constant on-screen width
    fn graphic_zoom(&self) -> f64 {
        self.zoom()
    }

    fn window_to_image(&self, point: ScreenPoint) -> ImagePoint;

    fn image_to_window(&self, point: ImagePoint) -> ScreenPoint;

    /// Width and height of the referenced image in pixels
    fn image_size(&self) -> (f64, f64);

    fn microns_per_pixel(&self) -> Option<f64> {
        None
    }

    /// Enable or disable pan/zoom tracking of the viewer
    fn set_navigation_enabled(&mut self, enabled: bool);

    fn navigation_enabled(&self) -> bool;
}

/// Viewport with a fixed origin and zoom
///
/// Used headless (CLI, tests) and as a reference for host implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticViewport {
    pub zoom: f64,
    /// Image coordinate shown at window position (0, 0)
    pub origin: ImagePoint,
    pub width: f64,
    pub height: f64,
    pub microns_per_pixel: Option<f64>,
    navigation: bool,
}

impl Default for StaticViewport {
    fn default() -> Self {
        Self::new(100_000.0, 100_000.0)
    }
}

impl StaticViewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            zoom: 1.0,
            origin: ImagePoint::default(),
            width,
            height,
            microns_per_pixel: None,
            navigation: true,
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_origin(mut self, origin: ImagePoint) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_microns_per_pixel(mut self, microns: f64) -> Self {
        self.microns_per_pixel = Some(microns);
        self
    }
}

impl Viewport for StaticViewport {
    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn window_to_image(&self, point: ScreenPoint) -> ImagePoint {
        ImagePoint::new(self.origin.x + point.x / self.zoom, self.origin.y + point.y / self.zoom)
    }

    fn image_to_window(&self, point: ImagePoint) -> ScreenPoint {
        ScreenPoint::new((point.x - self.origin.x) * self.zoom, (point.y - self.origin.y) * self.zoom)
    }

    fn image_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn microns_per_pixel(&self) -> Option<f64> {
        self.microns_per_pixel
    }

    fn set_navigation_enabled(&mut self, enabled: bool) {
        self.navigation = enabled;
    }

    fn navigation_enabled(&self) -> bool {
        self.navigation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_viewport_transforms() {
        let viewport = StaticViewport::new(1000.0, 1000.0)
            .with_zoom(2.0)
            .with_origin(ImagePoint::new(100.0, 50.0));

        let image = viewport.window_to_image(ScreenPoint::new(20.0, 40.0));
        assert_eq!(image, ImagePoint::new(110.0, 70.0));
        assert_eq!(viewport.image_to_window(image), ScreenPoint::new(20.0, 40.0));
    }
}
