//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! The renderer submits everything on one queue, so a GPU qualifies when it
//! has:
//! 1. A queue family that supports both graphics and presentation to the surface
//! 2. Vulkan 1.3 (dynamic rendering, synchronization2)
//! 3. Timeline semaphores and update-after-bind sampled image arrays
//!
//! Among qualifying GPUs discrete ones win, then the one with more VRAM.
//! The multisample counts usable for both color and depth targets are probed
//! here once and never re-queried.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::types::{SampleCount, SampleCountSet};

/// Information about the selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Family used for graphics, transfer and present.
    pub queue_family: u32,
    /// Sample counts supported by both color and depth framebuffers.
    pub sample_counts: SampleCountSet,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Total device-local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_family", &self.queue_family)
            .field("sample_counts", &self.sample_counts)
            .finish()
    }
}

/// Picks the most suitable GPU for presenting to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device(instance, device, surface, surface_loader))
        .max_by_key(rate_device);

    let Some(selected) = best else {
        warn!("No GPU supports the required queue, version and features");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU: '{}' ({}), MSAA tiers: {}",
        selected.device_name(),
        selected.device_type_name(),
        selected
            .sample_counts
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(selected)
}

fn check_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .map(CStr::to_string_lossy)
        .unwrap_or_default();

    if properties.api_version < vk::API_VERSION_1_3 {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features_1_2)
        .push_next(&mut features_1_3);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    let required = [
        ("timelineSemaphore", features_1_2.timeline_semaphore),
        ("runtimeDescriptorArray", features_1_2.runtime_descriptor_array),
        (
            "descriptorBindingPartiallyBound",
            features_1_2.descriptor_binding_partially_bound,
        ),
        (
            "descriptorBindingSampledImageUpdateAfterBind",
            features_1_2.descriptor_binding_sampled_image_update_after_bind,
        ),
        (
            "shaderSampledImageArrayNonUniformIndexing",
            features_1_2.shader_sampled_image_array_non_uniform_indexing,
        ),
        ("dynamicRendering", features_1_3.dynamic_rendering),
        ("synchronization2", features_1_3.synchronization2),
    ];
    if let Some((missing, _)) = required.iter().find(|(_, value)| *value == vk::FALSE) {
        debug!("GPU '{}' skipped: {} not supported", name, missing);
        return None;
    }

    let Some(queue_family) = find_queue_family(instance, device, surface, surface_loader) else {
        debug!("GPU '{}' skipped: no graphics queue that can present", name);
        return None;
    };

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let sample_counts = sample_counts_from_flags(
        properties.limits.framebuffer_color_sample_counts
            & properties.limits.framebuffer_depth_sample_counts,
    );

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_family,
        sample_counts,
    })
}

fn find_queue_family(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(index, _)| index as u32)
        .find(|&index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        })
}

/// Convert Vulkan sample count flags into the renderer's tiers.
pub fn sample_counts_from_flags(flags: vk::SampleCountFlags) -> SampleCountSet {
    SampleCountSet::from_counts(
        SampleCount::ALL
            .into_iter()
            .filter(|count| flags.contains(sample_count_flag(*count))),
    )
}

/// Vulkan flag for a sample count.
pub fn sample_count_flag(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
    }
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1_000_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10_000,
        _ => 0,
    };
    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(65_536);
    type_score + vram_mb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(device_type: vk::PhysicalDeviceType, vram: u64) -> PhysicalDeviceInfo {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 1,
            ..Default::default()
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: vram,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..Default::default()
            },
            memory_properties,
            queue_family: 0,
            sample_counts: SampleCountSet::single(),
        }
    }

    #[test]
    fn test_sample_counts_from_flags() {
        let set = sample_counts_from_flags(
            vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_16,
        );
        assert!(set.contains(SampleCount::X4));
        assert!(!set.contains(SampleCount::X2));
        assert!(!set.contains(SampleCount::X8));
        assert_eq!(set.highest(), SampleCount::X4);
    }

    #[test]
    fn test_discrete_preferred_over_larger_integrated() {
        let discrete = info(vk::PhysicalDeviceType::DISCRETE_GPU, 4 << 30);
        let integrated = info(vk::PhysicalDeviceType::INTEGRATED_GPU, 16 << 30);
        assert!(rate_device(&discrete) > rate_device(&integrated));
    }

    #[test]
    fn test_vram_breaks_ties() {
        let small = info(vk::PhysicalDeviceType::DISCRETE_GPU, 2 << 30);
        let large = info(vk::PhysicalDeviceType::DISCRETE_GPU, 8 << 30);
        assert!(rate_device(&large) > rate_device(&small));
        assert_eq!(large.device_local_memory(), 8 << 30);
    }
}
