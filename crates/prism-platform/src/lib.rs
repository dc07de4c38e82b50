// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue. The renderer never sees winit types; the app builds
//! windows through these helpers and forwards size changes itself.

pub use winit;

use prism_render::RenderSize;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

/// Attributes for a fixed-title window with the given inner size in
/// physical pixels.
pub fn window_attributes(width: u32, height: u32, title: &str) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width, height))
}

pub fn drawable_size(window: &Window) -> RenderSize {
    to_render_size(window.inner_size())
}

pub fn to_render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_window_maps_to_empty_render_size() {
        assert!(to_render_size(PhysicalSize::new(0, 600)).is_empty());
        let s = to_render_size(PhysicalSize::new(800, 600));
        assert_eq!(s, RenderSize { width: 800, height: 600 });
        assert!(!s.is_empty());
    }
}
