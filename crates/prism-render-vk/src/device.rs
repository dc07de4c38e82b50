// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use std::ffi::CStr;
use tracing::{debug, info};

use crate::error::VkError;
use crate::instance::first_missing_extension;

/// Graphics and present queue family indices of one adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan families in order, keeping the first graphics-capable and the
    /// first present-capable index. Stops as soon as both are known.
    /// A family whose present query fails counts as unable to present.
    pub fn resolve<F>(families: &[vk::QueueFamilyProperties], mut can_present: F) -> Self
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut out = QueueFamilyIndices::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if out.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                out.graphics = Some(i);
            }
            if out.present.is_none() {
                match can_present(i) {
                    Ok(true) => out.present = Some(i),
                    Ok(false) => {}
                    Err(e) => debug!("queue family {i}: present query failed: {e:#}"),
                }
            }
            if out.is_complete() {
                break;
            }
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved queue families of the selected adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.graphics == self.present {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        }
    }
}

/// The chosen adapter and its queue families.
#[derive(Clone, Copy, Debug)]
pub struct Adapter {
    pub phys: vk::PhysicalDevice,
    pub families: QueueFamilies,
}

pub const DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

unsafe fn adapter_name(instance: &Instance, phys: vk::PhysicalDevice) -> String {
    let props = instance.get_physical_device_properties(phys);
    props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned())
}

/// First adapter, in enumeration order, that exposes the swapchain extension
/// and has both a graphics and a present queue family.
pub unsafe fn select_adapter(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<Adapter> {
    for phys in instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?
    {
        let name = adapter_name(instance, phys);

        let exts = match instance.enumerate_device_extension_properties(phys) {
            Ok(exts) => exts,
            Err(e) => {
                debug!("adapter {name}: skipped, extension query failed: {e:?}");
                continue;
            }
        };
        if let Some(missing) = first_missing_extension(&exts, &DEVICE_EXTENSIONS) {
            debug!("adapter {name}: skipped, lacks {}", missing.to_string_lossy());
            continue;
        }

        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let indices = QueueFamilyIndices::resolve(&qprops, |i| {
            surf_i
                .get_physical_device_surface_support(phys, i, surface)
                .context("get_physical_device_surface_support")
        });

        match indices.complete() {
            Some(families) => {
                info!(
                    "adapter: {name} (graphics family {}, present family {})",
                    families.graphics, families.present
                );
                return Ok(Adapter { phys, families });
            }
            None => debug!("adapter {name}: skipped, queue families {indices:?}"),
        }
    }
    Err(VkError::NoSuitableAdapter {
        extension: swapchain::NAME.to_string_lossy().into_owned(),
    }
    .into())
}

/// Logical device plus everything that hangs directly off it.
pub struct DeviceCtx {
    pub phys: vk::PhysicalDevice,
    pub families: QueueFamilies,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
}

impl DeviceCtx {
    pub unsafe fn new(instance: &Instance, adapter: Adapter) -> Result<Self> {
        let families = adapter.families;

        // One queue per distinct family; shared when graphics == present.
        let priorities = [1.0_f32];
        let qinfos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_exts = DEVICE_EXTENSIONS.map(|e| e.as_ptr());
        let features = vk::PhysicalDeviceFeatures::default();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: qinfos.len() as u32,
            p_queue_create_infos: qinfos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let device = instance
            .create_device(adapter.phys, &dinfo, None)
            .context("create_device")?;
        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let swapchain_loader = swapchain::Device::new(instance, &device);

        Ok(DeviceCtx {
            phys: adapter.phys,
            families,
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }

    pub unsafe fn destroy(&mut self) {
        self.device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn split_families_resolve_independently() {
        // family 0: present only, family 1: graphics only
        let families = [family(vk::QueueFlags::TRANSFER), family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::resolve(&families, |i| Ok(i == 0));
        assert_eq!(idx.graphics, Some(1));
        assert_eq!(idx.present, Some(0));

        let fams = idx.complete().unwrap();
        assert_eq!(fams.unique(), vec![1, 0]);
        assert_eq!(fams.sharing_mode(), vk::SharingMode::CONCURRENT);
    }

    #[test]
    fn shared_family_yields_one_queue() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let idx = QueueFamilyIndices::resolve(&families, |_| Ok(true));
        let fams = idx.complete().unwrap();
        assert_eq!(fams, QueueFamilies { graphics: 0, present: 0 });
        assert_eq!(fams.unique(), vec![0]);
        assert_eq!(fams.sharing_mode(), vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn first_capable_family_wins_and_scan_stops_early() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut probed = Vec::new();
        let idx = QueueFamilyIndices::resolve(&families, |i| {
            probed.push(i);
            Ok(i >= 1)
        });
        assert_eq!(idx.graphics, Some(0));
        assert_eq!(idx.present, Some(1));
        // family 2 never looked at
        assert_eq!(probed, vec![0, 1]);
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::resolve(&families, |_| Ok(false));
        assert!(!idx.is_complete());
        assert!(idx.complete().is_none());
    }

    #[test]
    fn failed_present_query_leaves_family_unresolved() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::resolve(&families, |_| Err(anyhow!("surface lost")));
        assert_eq!(idx.graphics, Some(0));
        assert_eq!(idx.present, None);
        assert!(idx.complete().is_none());
    }

    #[test]
    fn failed_present_query_moves_on_to_next_family() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::resolve(&families, |i| {
            if i == 0 {
                Err(anyhow!("surface lost"))
            } else {
                Ok(true)
            }
        });
        assert_eq!(idx.complete(), Some(QueueFamilies { graphics: 0, present: 1 }));
    }
}
