// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::swapchain::SwapchainConfig;

/// The surface-dependent objects, rebuilt together when the surface changes.
/// Index i of `images`, `views`, `framebuffers` and `command_buffers` all
/// refer to the same swapchain image.
///
/// Handles are null while their kind is not live; the resource ledger, not
/// this struct, says which members are usable.
#[derive(Clone, Debug, Default)]
pub struct SwapchainGraph {
    pub swapchain: vk::SwapchainKHR,
    pub config: SwapchainConfig,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainGraph {
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
