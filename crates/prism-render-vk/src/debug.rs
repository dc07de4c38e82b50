// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::vk;
use prism_render::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};

pub(crate) fn map_severity(s: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    let mut out = Severity::empty();
    if s.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        out |= Severity::VERBOSE;
    }
    if s.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        out |= Severity::INFO;
    }
    if s.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        out |= Severity::WARNING;
    }
    if s.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        out |= Severity::ERROR;
    }
    out
}

pub(crate) fn map_kind(t: vk::DebugUtilsMessageTypeFlagsEXT) -> DiagnosticKind {
    let mut out = DiagnosticKind::empty();
    if t.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        out |= DiagnosticKind::GENERAL;
    }
    if t.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        out |= DiagnosticKind::VALIDATION;
    }
    if t.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        out |= DiagnosticKind::PERFORMANCE;
    }
    out
}

unsafe fn lossy<'a>(p: *const c_char) -> Cow<'a, str> {
    if p.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(p).to_string_lossy()
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    let data = &*data;
    let sink = &*(user as *const DiagnosticSink);

    let (object_type, object_handle) = if data.object_count > 0 && !data.p_objects.is_null() {
        let obj = &*data.p_objects;
        (format!("{:?}", obj.object_type), obj.object_handle)
    } else {
        (String::new(), 0)
    };
    let location = lossy(data.p_message_id_name);
    let message = lossy(data.p_message);

    let diag = Diagnostic {
        severity: map_severity(severity),
        kind: map_kind(types),
        object_type: &object_type,
        object_handle,
        location: &location,
        message_code: data.message_id_number,
        layer: "vulkan",
        message: &message,
    };
    if sink(&diag) {
        vk::TRUE
    } else {
        vk::FALSE
    }
}

/// A debug-utils messenger forwarding into a [`DiagnosticSink`]. The sink is
/// boxed so its address stays fixed for the driver while this value moves.
pub struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    _sink: Box<DiagnosticSink>,
}

impl DebugMessenger {
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: DiagnosticSink,
    ) -> Result<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let sink = Box::new(sink);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            p_user_data: &*sink as *const DiagnosticSink as *mut c_void,
            ..Default::default()
        };
        let handle = loader
            .create_debug_utils_messenger(&ci, None)
            .context("create_debug_utils_messenger")?;
        Ok(DebugMessenger {
            loader,
            handle,
            _sink: sink,
        })
    }

    pub unsafe fn destroy(&mut self) {
        self.loader.destroy_debug_utils_messenger(self.handle, None);
        self.handle = vk::DebugUtilsMessengerEXT::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn severity_bits_map_one_to_one() {
        let s = map_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        );
        assert_eq!(s, Severity::WARNING | Severity::ERROR);
        assert_eq!(
            map_severity(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Severity::VERBOSE
        );
    }

    #[test]
    fn kind_bits_map_one_to_one() {
        assert_eq!(
            map_kind(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            DiagnosticKind::VALIDATION
        );
        assert_eq!(
            map_kind(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            ),
            DiagnosticKind::GENERAL | DiagnosticKind::PERFORMANCE
        );
    }

    #[test]
    fn callback_forwards_record_to_sink() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_sink = Arc::clone(&seen);
        let sink: DiagnosticSink = Box::new(move |d| {
            assert_eq!(d.message, "bad layout");
            assert_eq!(d.location, "VUID-test");
            assert_eq!(d.message_code, 42);
            assert_eq!(d.object_handle, 0x1234);
            assert_eq!(d.object_type, "IMAGE");
            assert!(d.severity.contains(Severity::ERROR));
            seen_in_sink.fetch_add(1, Ordering::SeqCst);
            false
        });

        let object = vk::DebugUtilsObjectNameInfoEXT {
            object_type: vk::ObjectType::IMAGE,
            object_handle: 0x1234,
            ..Default::default()
        };
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message_id_name: c"VUID-test".as_ptr(),
            message_id_number: 42,
            p_message: c"bad layout".as_ptr(),
            object_count: 1,
            p_objects: &object,
            ..Default::default()
        };

        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                &sink as *const DiagnosticSink as *mut c_void,
            )
        };
        assert_eq!(ret, vk::FALSE);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_data_is_ignored() {
        let sink: DiagnosticSink = Box::new(|_| panic!("sink must not run"));
        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                &sink as *const DiagnosticSink as *mut c_void,
            )
        };
        assert_eq!(ret, vk::FALSE);
    }
}
