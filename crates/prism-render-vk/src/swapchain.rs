// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::surface;
use ash::vk;
use prism_render::RenderSize;
use tracing::info;

use crate::device::{DeviceCtx, QueueFamilies};
use crate::error::VkError;

/// The presentation surface and the loader used to query it.
pub struct SurfaceCtx {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

impl SurfaceCtx {
    pub unsafe fn destroy(&mut self) {
        self.loader.destroy_surface(self.handle, None);
        self.handle = vk::SurfaceKHR::null();
    }

    /// Fresh capability snapshot; capabilities move with the window.
    pub unsafe fn support(&self, phys: vk::PhysicalDevice) -> Result<SwapchainSupportDetails> {
        Ok(SwapchainSupportDetails {
            capabilities: self
                .loader
                .get_physical_device_surface_capabilities(phys, self.handle)
                .context("get_physical_device_surface_capabilities")?,
            formats: self
                .loader
                .get_physical_device_surface_formats(phys, self.handle)
                .context("get_physical_device_surface_formats")?,
            present_modes: self
                .loader
                .get_physical_device_surface_present_modes(phys, self.handle)
                .context("get_physical_device_surface_present_modes")?,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub extent: vk::Extent2D,
}

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    // A lone UNDEFINED entry means the surface takes anything.
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(PREFERRED_FORMAT);
        }
    }
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 && want > caps.max_image_count {
        caps.max_image_count
    } else {
        want
    }
}

impl SwapchainConfig {
    pub fn derive(details: &SwapchainSupportDetails, want: RenderSize) -> Result<Self, VkError> {
        let surf = choose_surface_format(&details.formats).ok_or(VkError::NoSurfaceFormats)?;
        Ok(SwapchainConfig {
            format: surf.format,
            color_space: surf.color_space,
            present_mode: choose_present_mode(&details.present_modes),
            image_count: choose_image_count(&details.capabilities),
            extent: choose_extent(&details.capabilities, want),
        })
    }
}

// Info only
fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub config: SwapchainConfig,
    /// Presentation order; index i pairs with view i and framebuffer i.
    pub images: Vec<vk::Image>,
}

pub unsafe fn create_swapchain(
    dev: &DeviceCtx,
    surface: &SurfaceCtx,
    want: RenderSize,
) -> Result<Swapchain> {
    let details = surface.support(dev.phys)?;
    let config = SwapchainConfig::derive(&details, want)?;
    let families: QueueFamilies = dev.families;
    let family_indices = [families.graphics, families.present];
    let sharing = families.sharing_mode();

    let (index_count, p_indices) = if sharing == vk::SharingMode::CONCURRENT {
        (family_indices.len() as u32, family_indices.as_ptr())
    } else {
        (0, std::ptr::null())
    };

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface: surface.handle,
        min_image_count: config.image_count,
        image_format: config.format,
        image_color_space: config.color_space,
        image_extent: config.extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: sharing,
        queue_family_index_count: index_count,
        p_queue_family_indices: p_indices,
        pre_transform: details.capabilities.current_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode: config.present_mode,
        clipped: vk::TRUE,
        old_swapchain: vk::SwapchainKHR::null(),
        ..Default::default()
    };

    let handle = dev
        .swapchain_loader
        .create_swapchain(&swap_info, None)
        .context("create_swapchain")?;
    let images = match dev.swapchain_loader.get_swapchain_images(handle) {
        Ok(images) => images,
        Err(e) => {
            dev.swapchain_loader.destroy_swapchain(handle, None);
            return Err(e).context("get_swapchain_images");
        }
    };

    info!(
        "swapchain ready ({}x{}, fmt {:?}/{:?}, {}, {} images)",
        config.extent.width,
        config.extent.height,
        config.format,
        config.color_space,
        pm_name(config.present_mode),
        images.len()
    );
    Ok(Swapchain {
        handle,
        config,
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn lone_undefined_format_picks_bgra_srgb() {
        let chosen =
            choose_surface_format(&[sf(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)])
                .unwrap();
        assert_eq!(chosen, PREFERRED_FORMAT);
    }

    #[test]
    fn preferred_pair_wins_even_when_listed_last() {
        let list = [
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&list), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn falls_back_to_first_format() {
        let list = [
            sf(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            sf(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&list), Some(list[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn undefined_among_others_is_not_special() {
        let list = [
            sf(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&list), Some(list[0]));
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let chosen = choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]);
        assert_eq!(chosen, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let chosen =
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED]);
        assert_eq!(chosen, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let c = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let e = choose_extent(
            &c,
            RenderSize {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!(
            e,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn free_extent_is_clamped_per_axis() {
        let c = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 500,
            },
            ..Default::default()
        };
        let e = choose_extent(
            &c,
            RenderSize {
                width: 50,
                height: 800,
            },
        );
        assert_eq!(
            e,
            vk::Extent2D {
                width: 100,
                height: 500
            }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_within_bounds() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    fn reference_details() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                ..Default::default()
            },
            formats: vec![sf(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn derive_end_to_end() {
        let cfg = SwapchainConfig::derive(
            &reference_details(),
            RenderSize {
                width: 800,
                height: 600,
            },
        )
        .unwrap();
        assert_eq!(
            cfg,
            SwapchainConfig {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                present_mode: vk::PresentModeKHR::FIFO,
                image_count: 3,
                extent: vk::Extent2D {
                    width: 800,
                    height: 600
                },
            }
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let details = reference_details();
        let want = RenderSize {
            width: 1024,
            height: 768,
        };
        let a = SwapchainConfig::derive(&details, want).unwrap();
        let b = SwapchainConfig::derive(&details, want).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_rejects_empty_format_list() {
        let details = SwapchainSupportDetails {
            formats: Vec::new(),
            ..reference_details()
        };
        let err = SwapchainConfig::derive(
            &details,
            RenderSize {
                width: 1,
                height: 1,
            },
        )
        .unwrap_err();
        assert!(matches!(err, VkError::NoSurfaceFormats));
    }
}
