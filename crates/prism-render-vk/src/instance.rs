// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use tracing::{info, warn};

use crate::error::VkError;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// First name in `required` that `available` does not list.
pub(crate) fn first_missing_extension<'a>(
    available: &[vk::ExtensionProperties],
    required: &[&'a CStr],
) -> Option<&'a CStr> {
    required.iter().copied().find(|want| {
        !available
            .iter()
            .any(|have| have.extension_name_as_c_str().ok() == Some(*want))
    })
}

fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|l| l.layer_name_as_c_str().ok() == Some(name))
}

pub struct CreatedInstance {
    pub instance: Instance,
    /// Validation layer and debug-utils were both enabled.
    pub debug_utils: bool,
}

pub unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    want_validation: bool,
) -> Result<CreatedInstance> {
    let app_name = c"prism";

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: c"No Engine".as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let surface_exts = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?;
    let mut required: Vec<&CStr> = surface_exts.iter().map(|&p| CStr::from_ptr(p)).collect();

    let available = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    if let Some(missing) = first_missing_extension(&available, &required) {
        return Err(VkError::MissingInstanceExtension(missing.to_string_lossy().into_owned()).into());
    }

    let mut layers: Vec<*const c_char> = Vec::new();
    let mut debug_on = false;
    if want_validation {
        let layer_props = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        let layer_ok = has_layer(&layer_props, VALIDATION_LAYER);
        let utils_ok = first_missing_extension(&available, &[debug_utils::NAME]).is_none();
        if layer_ok && utils_ok {
            layers.push(VALIDATION_LAYER.as_ptr());
            required.push(debug_utils::NAME);
            debug_on = true;
        } else {
            warn!(
                "validation requested but unavailable (layer: {layer_ok}, debug utils: {utils_ok}); continuing without"
            );
        }
    }

    let ext_ptrs: Vec<*const c_char> = required.iter().map(|e| e.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    info!(
        "Vulkan instance ready ({} extensions, validation {})",
        ext_ptrs.len(),
        if debug_on { "on" } else { "off" }
    );
    Ok(CreatedInstance {
        instance,
        debug_utils: debug_on,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &CStr) -> vk::ExtensionProperties {
        let mut p = vk::ExtensionProperties::default();
        for (dst, src) in p.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        p
    }

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut p = vk::LayerProperties::default();
        for (dst, src) in p.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        p
    }

    #[test]
    fn reports_first_missing_extension() {
        let available = [ext(c"VK_KHR_surface"), ext(c"VK_KHR_xcb_surface")];
        assert_eq!(
            first_missing_extension(&available, &[c"VK_KHR_surface", c"VK_KHR_xcb_surface"]),
            None
        );
        assert_eq!(
            first_missing_extension(
                &available,
                &[c"VK_KHR_surface", c"VK_KHR_wayland_surface", c"VK_EXT_debug_utils"]
            ),
            Some(c"VK_KHR_wayland_surface")
        );
    }

    #[test]
    fn extension_match_is_exact() {
        let available = [ext(c"VK_KHR_swapchain_mutable_format")];
        assert_eq!(
            first_missing_extension(&available, &[c"VK_KHR_swapchain"]),
            Some(c"VK_KHR_swapchain")
        );
    }

    #[test]
    fn finds_validation_layer() {
        let layers = [layer(c"VK_LAYER_MESA_device_select"), layer(VALIDATION_LAYER)];
        assert!(has_layer(&layers, VALIDATION_LAYER));
        assert!(!has_layer(&layers[..1], VALIDATION_LAYER));
    }
}
