//! Vulkan instance management.
//!
//! This module creates the VkInstance with the surface extensions a window
//! needs, and optionally the Khronos validation layer with a debug messenger
//! that forwards messages to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use raw_window_handle::HasDisplayHandle;
//! use vista_rhi::instance::Instance;
//!
//! # fn example(window: &impl HasDisplayHandle) -> Result<(), vista_rhi::RhiError> {
//! let display = window
//!     .display_handle()
//!     .map_err(|e| vista_rhi::RhiError::SurfaceError(e.to_string()))?;
//! let instance = Instance::new(display.as_raw(), true)?;
//! println!("validation active: {}", instance.has_validation());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::{Entry, vk};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Validation errors reported since process start.
static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);

/// Vulkan instance with optional validation.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance able to present to `display`.
    ///
    /// # Arguments
    ///
    /// * `display` - Display the window lives on; decides the surface extensions
    /// * `enable_validation` - Request the validation layer. Missing layers are
    ///   reported and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan loader is missing or instance creation fails.
    pub fn new(display: RawDisplayHandle, enable_validation: bool) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation = enable_validation && Self::validation_layer_available(&entry)?;
        if enable_validation && !validation {
            warn!("Validation layer requested but not installed, continuing without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vista")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vista")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| RhiError::SurfaceError(format!("no surface extensions: {e}")))?
            .to_vec();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        let debug = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None)? };
            Some((loader, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug.is_some()
    }

    /// Number of validation errors reported so far.
    pub fn validation_error_count() -> u64 {
        VALIDATION_ERRORS.load(Ordering::Relaxed)
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        }))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }

    let data = unsafe { &*data };
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(data.p_message).to_string_lossy() }
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
        error!(target: "vista_rhi::validation", "{:?}: {}", kind, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vista_rhi::validation", "{:?}: {}", kind, message);
    } else {
        debug!(target: "vista_rhi::validation", "{:?}: {}", kind, message);
    }

    vk::FALSE
}
