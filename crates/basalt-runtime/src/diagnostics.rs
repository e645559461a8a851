//! Validation-layer message routing.
//!
//! The instance registers one debug messenger whose callback classifies each
//! message by severity and hands it to a [`MessageSink`]. The sink is chosen
//! when the context is created, so bring-up is not tied to a single logging
//! backend.

use ash::vk;
use std::ffi::{CStr, c_void};

/// Severity of a diagnostic message reported by the driver or validation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Classify a raw severity bitmask, picking the most severe bit set.
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        if flags.contains(F::ERROR) {
            Self::Error
        } else if flags.contains(F::WARNING) {
            Self::Warning
        } else if flags.contains(F::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }
}

/// Receives diagnostic messages from the accelerator API.
///
/// Called synchronously from driver threads, so implementations must be
/// cheap and must not block.
pub trait MessageSink: Send + Sync {
    fn message(&self, severity: Severity, message: &str);
}

impl<F> MessageSink for F
where
    F: Fn(Severity, &str) + Send + Sync,
{
    fn message(&self, severity: Severity, message: &str) {
        self(severity, message)
    }
}

/// Default sink: info and verbose go to `info!`, warnings to `warn!`, errors to `error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Verbose | Severity::Info => {
                tracing::info!(target: "basalt::vulkan", "{message}")
            }
            Severity::Warning => tracing::warn!(target: "basalt::vulkan", "{message}"),
            Severity::Error => tracing::error!(target: "basalt::vulkan", "{message}"),
        }
    }
}

/// Owns the sink for as long as the messenger may call into it.
///
/// The double box gives the callback a thin pointer to pass through
/// `p_user_data`.
pub(crate) struct SinkSlot(Box<Box<dyn MessageSink>>);

impl SinkSlot {
    pub(crate) fn new(sink: Box<dyn MessageSink>) -> Self {
        Self(Box::new(sink))
    }

    pub(crate) fn user_data(&self) -> *mut c_void {
        let inner: *const Box<dyn MessageSink> = &*self.0;
        inner as *mut c_void
    }

    pub(crate) fn messenger_create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(self.user_data())
    }
}

/// Messenger callback registered with `VK_EXT_debug_utils`.
///
/// # Safety
/// `p_user_data` must be the pointer produced by [`SinkSlot::user_data`] and
/// the slot must still be alive.
pub(crate) unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: non-null pointers supplied by the loader and by `SinkSlot`.
    let (data, sink) = unsafe {
        (
            &*p_callback_data,
            &*(p_user_data as *const Box<dyn MessageSink>),
        )
    };
    // SAFETY: `p_message` is either null or a NUL-terminated string owned by the caller.
    let message = unsafe { data.message_as_c_str() }
        .map(CStr::to_string_lossy)
        .unwrap_or_default();

    sink.message(Severity::from_flags(message_severity), &message);
    vk::FALSE
}
