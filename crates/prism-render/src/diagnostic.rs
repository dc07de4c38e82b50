// SPDX-License-Identifier: CEPL-1.0
//! Driver diagnostics as seen by the host.
//!
//! Backends translate whatever their debug layer reports into a
//! [`Diagnostic`] and hand it to a [`DiagnosticSink`]. Diagnostics are
//! observational; they never interrupt rendering.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Severity: u32 {
        const VERBOSE = 1 << 0;
        const INFO    = 1 << 1;
        const WARNING = 1 << 2;
        const ERROR   = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DiagnosticKind: u32 {
        const GENERAL     = 1 << 0;
        const VALIDATION  = 1 << 1;
        const PERFORMANCE = 1 << 2;
    }
}

/// One message from the driver or a layer.
#[derive(Clone, Copy, Debug)]
pub struct Diagnostic<'a> {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Type tag of the first object the message refers to, if any.
    pub object_type: &'a str,
    pub object_handle: u64,
    /// Free-form location hint (the message id name for Vulkan layers).
    pub location: &'a str,
    pub message_code: i32,
    pub layer: &'a str,
    pub message: &'a str,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.layer)?;
        if !self.location.is_empty() {
            write!(f, " {} ({})", self.location, self.message_code)?;
        }
        if self.object_handle != 0 {
            write!(f, " {}=0x{:x}", self.object_type, self.object_handle)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Receives diagnostics. The return value asks the driver to suppress the
/// call that triggered the message; sinks normally return `false`.
pub type DiagnosticSink = Box<dyn Fn(&Diagnostic<'_>) -> bool + Send + Sync>;

/// The default sink: forward to `tracing` at a matching level.
pub fn log_sink() -> DiagnosticSink {
    Box::new(|d| {
        if d.severity.contains(Severity::ERROR) {
            tracing::error!("{d}");
        } else if d.severity.contains(Severity::WARNING) {
            tracing::warn!("{d}");
        } else if d.severity.contains(Severity::INFO) {
            tracing::debug!("{d}");
        } else {
            tracing::trace!("{d}");
        }
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample<'a>(message: &'a str) -> Diagnostic<'a> {
        Diagnostic {
            severity: Severity::WARNING,
            kind: DiagnosticKind::VALIDATION,
            object_type: "SWAPCHAIN_KHR",
            object_handle: 0xbeef,
            location: "VUID-vkQueuePresentKHR-pWaitSemaphores-01294",
            message_code: 7,
            layer: "Validation",
            message,
        }
    }

    #[test]
    fn display_includes_object_and_location() {
        let s = sample("semaphore not signaled").to_string();
        assert_eq!(
            s,
            "[Validation] VUID-vkQueuePresentKHR-pWaitSemaphores-01294 (7) \
             SWAPCHAIN_KHR=0xbeef: semaphore not signaled"
        );
    }

    #[test]
    fn display_skips_empty_fields() {
        let d = Diagnostic {
            object_handle: 0,
            location: "",
            ..sample("hello")
        };
        assert_eq!(d.to_string(), "[Validation]: hello");
    }

    #[test]
    fn log_sink_never_suppresses() {
        let sink = log_sink();
        assert!(!sink(&sample("x")));
        let err = Diagnostic {
            severity: Severity::ERROR,
            ..sample("y")
        };
        assert!(!sink(&err));
    }
}
