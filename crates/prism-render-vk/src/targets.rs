// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

pub(crate) fn view_create_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

pub(crate) fn framebuffer_create_info(
    render_pass: vk::RenderPass,
    view: &vk::ImageView,
    extent: vk::Extent2D,
) -> vk::FramebufferCreateInfo<'_> {
    vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: 1,
        p_attachments: view,
        width: extent.width,
        height: extent.height,
        layers: 1,
        ..Default::default()
    }
}

/// One color view per swapchain image, in image order. Views made before a
/// failure are destroyed before the error returns.
pub unsafe fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &img in images {
        match device.create_image_view(&view_create_info(img, format), None) {
            Ok(v) => views.push(v),
            Err(e) => {
                destroy_image_views(device, &mut views);
                return Err(e).context("create_image_view");
            }
        }
    }
    debug!("created {} image views", views.len());
    Ok(views)
}

pub unsafe fn destroy_image_views(device: &ash::Device, views: &mut Vec<vk::ImageView>) {
    for iv in views.drain(..) {
        device.destroy_image_view(iv, None);
    }
}

/// Framebuffer i wraps exactly view i.
pub unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(views.len());
    for view in views {
        let info = framebuffer_create_info(render_pass, view, extent);
        match device.create_framebuffer(&info, None) {
            Ok(fb) => framebuffers.push(fb),
            Err(e) => {
                destroy_framebuffers(device, &mut framebuffers);
                return Err(e).context("create_framebuffer");
            }
        }
    }
    debug!(
        "created {} framebuffers ({}x{})",
        framebuffers.len(),
        extent.width,
        extent.height
    );
    Ok(framebuffers)
}

pub unsafe fn destroy_framebuffers(device: &ash::Device, framebuffers: &mut Vec<vk::Framebuffer>) {
    for fb in framebuffers.drain(..) {
        device.destroy_framebuffer(fb, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn views_are_plain_2d_color() {
        let image = vk::Image::from_raw(0xabc);
        let info = view_create_info(image, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(info.image, image);
        assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(info.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(info.components.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(info.components.a, vk::ComponentSwizzle::IDENTITY);
        let range = info.subresource_range;
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!((range.base_mip_level, range.level_count), (0, 1));
        assert_eq!((range.base_array_layer, range.layer_count), (0, 1));
    }

    #[test]
    fn framebuffer_wraps_one_view_at_full_extent() {
        let view = vk::ImageView::from_raw(7);
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let info = framebuffer_create_info(vk::RenderPass::from_raw(3), &view, extent);
        assert_eq!(info.attachment_count, 1);
        assert_eq!(unsafe { *info.p_attachments }, view);
        assert_eq!((info.width, info.height, info.layers), (640, 480, 1));
    }
}
