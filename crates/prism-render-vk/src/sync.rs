// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::prelude::VkResult;
use ash::vk;

use crate::device::DeviceCtx;

/// What one pass through acquire, submit and present produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// Nothing was presented; the swapchain can no longer be used.
    OutOfDate,
}

impl FrameOutcome {
    /// Map a swapchain call's result. Errors other than the stale-surface
    /// codes are handed back to the caller.
    pub fn classify(result: VkResult<bool>) -> Result<Self, vk::Result> {
        match result {
            Ok(false) => Ok(FrameOutcome::Presented),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(FrameOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameOutcome::OutOfDate),
            Err(e) => Err(e),
        }
    }

    /// The more severe of two outcomes.
    pub fn worst(self, other: FrameOutcome) -> FrameOutcome {
        fn rank(o: FrameOutcome) -> u8 {
            match o {
                FrameOutcome::Presented => 0,
                FrameOutcome::Suboptimal => 1,
                FrameOutcome::OutOfDate => 2,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// How the frame loop treats a swapchain that no longer matches its surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StaleSwapchainPolicy {
    /// Rebuild the swapchain graph at the current size.
    #[default]
    Rebuild,
    /// Keep presenting to a suboptimal swapchain; skip out-of-date frames
    /// until the host reports a resize.
    Ignore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reaction {
    Continue,
    Rebuild,
    SkipFrame,
}

impl StaleSwapchainPolicy {
    pub fn react(self, outcome: FrameOutcome) -> Reaction {
        match (self, outcome) {
            (_, FrameOutcome::Presented) => Reaction::Continue,
            (StaleSwapchainPolicy::Rebuild, _) => Reaction::Rebuild,
            (StaleSwapchainPolicy::Ignore, FrameOutcome::Suboptimal) => Reaction::Continue,
            (StaleSwapchainPolicy::Ignore, FrameOutcome::OutOfDate) => Reaction::SkipFrame,
        }
    }
}

/// The two binary semaphores of the frame loop. Created once, kept across
/// swapchain rebuilds.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let image_available = device
            .create_semaphore(&info, None)
            .context("create_semaphore(image_available)")?;
        let render_finished = match device.create_semaphore(&info, None) {
            Ok(s) => s,
            Err(e) => {
                device.destroy_semaphore(image_available, None);
                return Err(e).context("create_semaphore(render_finished)");
            }
        };
        Ok(FrameSync {
            image_available,
            render_finished,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_available, None);
        *self = FrameSync::default();
    }

    // STRICT PER-FRAME ORDER:
    // 1) acquire_next_image (signals image_available)
    // 2) queue_submit (waits image_available at color output, signals render_finished)
    // 3) queue_present (waits render_finished)
    // No fence: the CPU never waits for the GPU here.
    pub unsafe fn draw_frame(
        &self,
        dev: &DeviceCtx,
        swapchain: vk::SwapchainKHR,
        cmds: &[vk::CommandBuffer],
        present_wait_idle: bool,
    ) -> Result<FrameOutcome> {
        // 1) Acquire
        let acquired = dev.swapchain_loader.acquire_next_image(
            swapchain,
            u64::MAX,
            self.image_available,
            vk::Fence::null(),
        );
        let (image_index, acquire_outcome) = match acquired {
            Ok((index, suboptimal)) => (
                index,
                if suboptimal {
                    FrameOutcome::Suboptimal
                } else {
                    FrameOutcome::Presented
                },
            ),
            Err(e) => {
                // Nothing acquired, nothing to submit.
                return FrameOutcome::classify(Err(e))
                    .map_err(|e| anyhow!("acquire_next_image: {e:?}"));
            }
        };

        let cmd = *cmds
            .get(image_index as usize)
            .ok_or_else(|| anyhow!("no command buffer for image {image_index}"))?;

        // 2) Submit
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &self.render_finished,
            ..Default::default()
        };
        dev.device
            .queue_submit(
                dev.graphics_queue,
                std::slice::from_ref(&submit),
                vk::Fence::null(),
            )
            .context("queue_submit")?;

        // 3) Present
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.render_finished,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let present_outcome = FrameOutcome::classify(
            dev.swapchain_loader.queue_present(dev.present_queue, &present),
        )
        .map_err(|e| anyhow!("queue_present: {e:?}"))?;

        if present_wait_idle {
            dev.device
                .queue_wait_idle(dev.present_queue)
                .context("queue_wait_idle(present)")?;
        }

        Ok(acquire_outcome.worst(present_outcome))
    }
}
