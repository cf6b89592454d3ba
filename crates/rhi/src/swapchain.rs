//! Swapchain management.
//!
//! Owns `VkSwapchainKHR`, its images and their views. Images are created with
//! `COLOR_ATTACHMENT | TRANSFER_DST` so a multisampled target can be resolved
//! straight into them.
//!
//! Recreation does not wait on the GPU; the caller drains the queue first.
//! Views can be released ahead of recreation so that nothing refers to the
//! old images while the new swapchain is built.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;
use crate::surface::Surface;

/// What the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries support for `surface` on `physical_device`.
    pub fn query(physical_device: vk::PhysicalDevice, surface: &Surface) -> Result<Self, RhiError> {
        let loader = surface.loader();
        let handle = surface.handle();
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, handle)?,
                formats: loader.get_physical_device_surface_formats(physical_device, handle)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, handle)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Swapchain and its per-image views.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    vsync: bool,
    preferred_image_count: u32,
}

impl Swapchain {
    /// Creates a swapchain.
    ///
    /// # Arguments
    ///
    /// * `extent` - Requested size; clamped to what the surface allows
    /// * `vsync` - FIFO when true, otherwise MAILBOX or IMMEDIATE if available
    /// * `preferred_image_count` - Usually the number of frames in flight
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        extent: vk::Extent2D,
        vsync: bool,
        preferred_image_count: u32,
    ) -> Result<Self, RhiError> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let mut swapchain = Self {
            device,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent,
            present_mode: vk::PresentModeKHR::FIFO,
            vsync,
            preferred_image_count,
        };
        swapchain.build(surface, extent, vsync)?;
        Ok(swapchain)
    }

    /// Replaces the swapchain with one of a new size or present mode.
    ///
    /// The GPU must not be using any of the current images.
    pub fn recreate(
        &mut self,
        surface: &Surface,
        extent: vk::Extent2D,
        vsync: bool,
    ) -> Result<(), RhiError> {
        info!(
            "Recreating swapchain: {}x{}, vsync {}",
            extent.width, extent.height, vsync
        );
        self.release_views();
        self.build(surface, extent, vsync)
    }

    fn build(
        &mut self,
        surface: &Surface,
        extent: vk::Extent2D,
        vsync: bool,
    ) -> Result<(), RhiError> {
        let support = SwapchainSupportDetails::query(self.device.physical_device(), surface)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, extent.width, extent.height);
        let image_count = determine_image_count(&support.capabilities, self.preferred_image_count);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None)? };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.loader.get_swapchain_images(swapchain)? };
        self.image_views = create_image_views(&self.device, &self.images, surface_format.format)?;
        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.vsync = vsync;
        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Destroys the image views. The swapchain itself stays valid.
    pub fn release_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }

    /// Acquires the next image, signaling `semaphore` when it is ready.
    ///
    /// Returns `(index, suboptimal)`. `ERROR_OUT_OF_DATE_KHR` is passed through.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    ///
    /// Returns true if the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Whether the swapchain was built for vsync presentation.
    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.release_views();
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        debug!("Swapchain destroyed");
    }
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then whatever comes first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let with_format = |format: vk::Format| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };

    if let Some(format) = with_format(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = with_format(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM");
        return format;
    }
    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// FIFO for vsync. Without vsync prefers MAILBOX, then IMMEDIATE, then FIFO.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                return mode;
            }
        }
        warn!("No tearing-capable present mode, falling back to FIFO");
    }
    vk::PresentModeKHR::FIFO
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };
    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );
    extent
}

/// `preferred` clamped into the surface's image count range.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, preferred: u32) -> u32 {
    let count = preferred.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    images
        .iter()
        .enumerate()
        .map(|(i, &image)| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            unsafe { device.handle().create_image_view(&create_info, None) }.map_err(|e| {
                RhiError::SwapchainError(format!("Failed to create image view {i}: {e:?}"))
            })
        })
        .collect()
}
