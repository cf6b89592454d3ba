//! The shader-visible descriptor heap on Vulkan.
//!
//! The flat heap index space (see [`HeapLayout`]) maps onto one descriptor
//! set per frame slot, all sharing a single layout:
//!
//! | binding | contents                         | written to          |
//! |---------|----------------------------------|---------------------|
//! | 0       | per-frame uniform buffer         | the slot's own set  |
//! | 1       | per-scene uniform buffer         | every set           |
//! | 2       | combined image sampler array     | every set           |
//!
//! Binding 2 is partially bound and updatable after bind, so textures can be
//! registered while earlier frames are still in flight.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::heap::{HeapBinding, HeapLayout};

const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Helpers for the bindings the heap uses.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(binding: u32) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(STAGES)
    }

    #[inline]
    pub fn combined_image_sampler_array(
        binding: u32,
        count: u32,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(count)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
    }
}

/// Descriptor sets backing the heap, plus the sampler shared by all textures.
pub struct DescriptorHeap {
    device: Arc<Device>,
    layout: HeapLayout,
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    sampler: vk::Sampler,
}

impl DescriptorHeap {
    pub fn new(device: Arc<Device>, layout: HeapLayout) -> RhiResult<Self> {
        let texture_count = layout.texture_capacity.max(1);
        let bindings = [
            DescriptorBindingBuilder::uniform_buffer(0),
            DescriptorBindingBuilder::uniform_buffer(1),
            DescriptorBindingBuilder::combined_image_sampler_array(2, texture_count),
        ];
        let binding_flags = [
            vk::DescriptorBindingFlags::empty(),
            vk::DescriptorBindingFlags::empty(),
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
        ];
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);
        let set_layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&layout_info, None)?
        };

        let sets_count = layout.frame_slots.max(1);
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2 * sets_count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: texture_count * sets_count,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(sets_count)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&pool_info, None)? };

        let set_layouts = vec![set_layout; sets_count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        let sets = unsafe { device.handle().allocate_descriptor_sets(&alloc_info)? };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { device.handle().create_sampler(&sampler_info, None)? };

        debug!(
            "Descriptor heap created: {} sets, {} texture views",
            sets.len(),
            texture_count
        );

        Ok(Self {
            device,
            layout,
            set_layout,
            pool,
            sets,
            sampler,
        })
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    #[inline]
    pub fn heap_layout(&self) -> HeapLayout {
        self.layout
    }

    /// Descriptor set bound for frame slot `slot`.
    pub fn set(&self, slot: usize) -> RhiResult<vk::DescriptorSet> {
        self.sets
            .get(slot)
            .copied()
            .ok_or_else(|| RhiError::InvalidHandle(format!("no descriptor set for slot {slot}")))
    }

    /// Points heap entry `index` at a uniform buffer.
    pub fn write_constants(&self, index: u32, buffer: vk::Buffer, size: u64) -> RhiResult<()> {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: size,
        }];
        let (sets, binding) = match self.classify(index)? {
            HeapBinding::FrameConstants { slot } => (&self.sets[slot as usize..=slot as usize], 0),
            HeapBinding::SceneConstants => (&self.sets[..], 1),
            HeapBinding::Texture { .. } => {
                return Err(RhiError::InvalidHandle(format!(
                    "heap index {index} holds textures, not constants"
                )));
            }
        };
        let writes: Vec<_> = sets
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)
            })
            .collect();
        unsafe { self.device.handle().update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    /// Points heap entry `index` at a sampled image view.
    pub fn write_texture(&self, index: u32, view: vk::ImageView) -> RhiResult<()> {
        let HeapBinding::Texture { element } = self.classify(index)? else {
            return Err(RhiError::InvalidHandle(format!(
                "heap index {index} holds constants, not textures"
            )));
        };
        let image_info = [vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes: Vec<_> = self
            .sets
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(2)
                    .dst_array_element(element)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
            })
            .collect();
        unsafe { self.device.handle().update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn classify(&self, index: u32) -> RhiResult<HeapBinding> {
        self.layout.classify(index).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "heap index {index} out of range (len {})",
                self.layout.len()
            ))
        })
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            device.destroy_sampler(self.sampler, None);
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer(1);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_texture_array_binding() {
        let binding = DescriptorBindingBuilder::combined_image_sampler_array(2, 337);
        assert_eq!(binding.descriptor_count, 337);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }
}
