//! Window surface creation.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;

/// Owned `VkSurfaceKHR` with its extension loader.
///
/// The instance must outlive the surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface for a window.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] if the window handles are unavailable,
    /// or a Vulkan error if surface creation fails.
    pub fn new<W>(instance: &Instance, window: &W) -> Result<Self, RhiError>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        let display = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("display handle: {e}")))?;
        let window = window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("window handle: {e}")))?;

        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display.as_raw(),
                window.as_raw(),
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        info!("Window surface created");
        Ok(Self { handle, loader })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Window surface destroyed");
    }
}
