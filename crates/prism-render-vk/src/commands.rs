// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

use crate::pipeline::full_rect;

/// Everything one recording pass reads.
#[derive(Clone, Copy)]
pub struct DrawTarget<'a> {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub clear: vk::ClearValue,
}

// RESET_COMMAND_BUFFER lets a buffer be re-recorded without resetting the pool.
pub unsafe fn create_pool(device: &ash::Device, graphics_family: u32) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: graphics_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    device
        .create_command_pool(&info, None)
        .context("create_command_pool")
}

pub unsafe fn allocate(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count as u32,
        ..Default::default()
    };
    device
        .allocate_command_buffers(&info)
        .context("allocate_command_buffers")
}

pub unsafe fn free(device: &ash::Device, pool: vk::CommandPool, cmds: &mut Vec<vk::CommandBuffer>) {
    if !cmds.is_empty() {
        device.free_command_buffers(pool, cmds);
        cmds.clear();
    }
}

unsafe fn record_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    target: &DrawTarget<'_>,
) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;

    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: target.render_pass,
        framebuffer,
        render_area: full_rect(target.extent),
        clear_value_count: 1,
        p_clear_values: &target.clear,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
    device.cmd_draw(cmd, 3, 1, 0, 0);
    device.cmd_end_render_pass(cmd);

    device
        .end_command_buffer(cmd)
        .context("end_command_buffer")?;
    Ok(())
}

/// Record buffer i against framebuffer i. Beginning a buffer discards
/// whatever it held before.
pub unsafe fn record_all(
    device: &ash::Device,
    cmds: &[vk::CommandBuffer],
    target: &DrawTarget<'_>,
) -> Result<()> {
    anyhow::ensure!(
        cmds.len() == target.framebuffers.len(),
        "{} command buffers for {} framebuffers",
        cmds.len(),
        target.framebuffers.len()
    );
    for (&cmd, &fb) in cmds.iter().zip(target.framebuffers) {
        record_one(device, cmd, fb, target)?;
    }
    debug!("recorded {} command buffers", cmds.len());
    Ok(())
}

pub fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_value_carries_rgba() {
        let v = clear_value([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(unsafe { v.color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }
}
