//! [`Backend`] implementation on Vulkan 1.3.
//!
//! # Overview
//!
//! - The shared fence is a timeline semaphore. Signals are queued as empty
//!   batches behind the frame's command buffer.
//! - Each frame slot owns a command pool, one primary command buffer and the
//!   binary semaphore its acquire signals. Render-finished semaphores are per
//!   presentable image.
//! - A [`CommandList`] is translated into the slot's command buffer at submit
//!   using dynamic rendering. Barriers use the classic pipeline barrier with
//!   layouts derived from [`ResourceState`].
//! - Images, buffers, meshes and pipelines live in arenas indexed by the
//!   handles the renderer holds.
//!
//! The present mode is baked into the swapchain. Presenting with a different
//! vsync setting still presents, but reports [`PresentStatus::Suboptimal`] so
//! the caller recreates the surface, which picks up the new mode.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, submit_one_time};
use crate::command_list::{Command, CommandList};
use crate::descriptor::DescriptorHeap;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::heap::{DescriptorView, HeapLayout};
use crate::image::{DEPTH_FORMAT, GpuImage, GpuImageInfo, subresource_range};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, sample_count_flag, select_physical_device};
use crate::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use crate::shader::{Shader, ShaderStage};
use crate::surface::Surface;
use crate::swapchain::Swapchain;
use crate::sync::{Semaphore, TimelineSemaphore};
use crate::types::{
    AcquiredImage, BufferHandle, Extent2D, ImageDesc, ImageFormat, ImageHandle, ImageUsage,
    MeshHandle, PipelineDesc, PipelineHandle, PresentStatus, ResourceState, SampleCountSet,
    ScissorRect, Viewport,
};
use crate::vertex::Vertex;

/// Parameters for [`VulkanBackend::new`].
#[derive(Clone, Debug)]
pub struct VulkanConfig {
    pub extent: Extent2D,
    pub frames_in_flight: usize,
    pub vsync: bool,
    pub shader_dir: PathBuf,
    pub validation: bool,
}

struct FrameObjects {
    pool: CommandPool,
    cmd: CommandBuffer,
    image_available: Semaphore,
    /// Presentable image acquired for this slot and not yet submitted.
    acquired: Option<usize>,
}

enum ImageKind {
    Owned(GpuImage),
    Backbuffer(usize),
}

struct ImageEntry {
    kind: ImageKind,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
}

struct GpuMesh {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

/// Resolved image used while translating a command list.
#[derive(Clone, Copy)]
struct ImageRef {
    image: vk::Image,
    view: vk::ImageView,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    backbuffer: Option<usize>,
}

/// Vulkan implementation of [`Backend`].
///
/// Fields are declared in teardown order: everything holding an
/// `Arc<Device>` comes before the device, and the surface and instance last.
pub struct VulkanBackend {
    frames: Vec<FrameObjects>,
    render_finished: Vec<Semaphore>,
    pipelines: Vec<Pipeline>,
    pipeline_layout: Option<PipelineLayout>,
    heap: Option<DescriptorHeap>,
    meshes: Vec<GpuMesh>,
    buffers: Vec<Buffer>,
    images: HashMap<ImageHandle, ImageEntry>,
    upload_pool: CommandPool,
    fence: TimelineSemaphore,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    _instance: Instance,

    gpu: PhysicalDeviceInfo,
    shader_dir: PathBuf,
    backbuffers: Vec<ImageHandle>,
    /// Presentable images that have been transitioned at least once.
    backbuffer_initialized: Vec<bool>,
    next_image_id: u32,
    desired_vsync: bool,
    last_completed: Cell<u64>,
}

impl VulkanBackend {
    /// Bootstraps Vulkan for `window`: instance, surface, device, swapchain,
    /// the timeline fence and per-slot command objects.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for startup.
    pub fn new<W>(window: &W, config: &VulkanConfig) -> RhiResult<Self>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        let display = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("display handle: {e}")))?;
        let instance = Instance::new(display.as_raw(), config.validation)?;
        let surface = Surface::new(&instance, window)?;
        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &surface,
            vk::Extent2D {
                width: config.extent.width,
                height: config.extent.height,
            },
            config.vsync,
            config.frames_in_flight as u32,
        )?;

        let fence = TimelineSemaphore::new(device.clone(), 0)?;
        let upload_pool = CommandPool::new_transient(device.clone(), device.queue_family())?;

        let frames = (0..config.frames_in_flight)
            .map(|_| {
                let pool = CommandPool::new(device.clone(), device.queue_family())?;
                let cmd = pool.allocate()?;
                Ok(FrameObjects {
                    pool,
                    cmd,
                    image_available: Semaphore::new(device.clone())?,
                    acquired: None,
                })
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let mut backend = Self {
            frames,
            render_finished: Vec::new(),
            pipelines: Vec::new(),
            pipeline_layout: None,
            heap: None,
            meshes: Vec::new(),
            buffers: Vec::new(),
            images: HashMap::new(),
            upload_pool,
            fence,
            swapchain,
            device,
            surface,
            _instance: instance,
            gpu,
            shader_dir: config.shader_dir.clone(),
            backbuffers: Vec::new(),
            backbuffer_initialized: Vec::new(),
            next_image_id: 0,
            desired_vsync: config.vsync,
            last_completed: Cell::new(0),
        };
        backend.register_backbuffers()?;

        info!(
            "Vulkan backend ready on '{}' with {} frame slots",
            backend.gpu.device_name(),
            backend.frames.len()
        );
        Ok(backend)
    }

    fn allocate_image_id(&mut self) -> ImageHandle {
        let handle = ImageHandle(self.next_image_id);
        self.next_image_id += 1;
        handle
    }

    fn register_backbuffers(&mut self) -> RhiResult<()> {
        let extent = self.swapchain.extent();
        let count = self.swapchain.images().len();
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let handle = self.allocate_image_id();
            self.images.insert(
                handle,
                ImageEntry {
                    kind: ImageKind::Backbuffer(index),
                    extent,
                    aspect: vk::ImageAspectFlags::COLOR,
                },
            );
            handles.push(handle);
        }
        let render_finished = (0..count)
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        self.backbuffers = handles;
        self.backbuffer_initialized = vec![false; count];
        self.render_finished = render_finished;
        debug!("Registered {} presentable images", count);
        Ok(())
    }

    fn vk_format(&self, format: ImageFormat) -> vk::Format {
        match format {
            ImageFormat::Surface => self.swapchain.format(),
            ImageFormat::Depth32Float => DEPTH_FORMAT,
            ImageFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        }
    }

    fn new_gpu_image(&self, desc: &ImageDesc) -> RhiResult<GpuImage> {
        if !self.gpu.sample_counts.contains(desc.samples) {
            return Err(RhiError::Unsupported(format!(
                "image '{}' requests {}",
                desc.label, desc.samples
            )));
        }
        let aspect = match desc.usage {
            ImageUsage::DepthStencil => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        };
        GpuImage::new(
            self.device.clone(),
            &GpuImageInfo {
                label: &desc.label,
                extent: vk::Extent2D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                },
                format: self.vk_format(desc.format),
                usage: image_usage_flags(desc.usage),
                samples: sample_count_flag(desc.samples),
                aspect,
            },
        )
    }

    fn insert_owned(&mut self, image: GpuImage) -> ImageHandle {
        let handle = self.allocate_image_id();
        let entry = ImageEntry {
            extent: image.extent(),
            aspect: image.aspect(),
            kind: ImageKind::Owned(image),
        };
        self.images.insert(handle, entry);
        handle
    }

    fn image_ref(&self, handle: ImageHandle) -> RhiResult<ImageRef> {
        let entry = self
            .images
            .get(&handle)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown {handle}")))?;
        let (image, view, backbuffer) = match &entry.kind {
            ImageKind::Owned(image) => (image.handle(), image.view(), None),
            ImageKind::Backbuffer(index) => {
                let view = self.swapchain.image_views().get(*index).copied().ok_or_else(|| {
                    RhiError::InvalidHandle(format!("{handle} refers to a released view"))
                })?;
                (self.swapchain.images()[*index], view, Some(*index))
            }
        };
        Ok(ImageRef {
            image,
            view,
            extent: entry.extent,
            aspect: entry.aspect,
            backbuffer,
        })
    }

    fn pipeline_layout(&self) -> RhiResult<&PipelineLayout> {
        self.pipeline_layout
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("descriptor heap not created".to_string()))
    }

    fn heap(&self) -> RhiResult<&DescriptorHeap> {
        self.heap
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("descriptor heap not created".to_string()))
    }

    /// Records `commands` into the slot's command buffer.
    ///
    /// Presentable images only count as initialized once the recording
    /// succeeds.
    fn translate(&mut self, slot: usize, commands: &[Command]) -> RhiResult<()> {
        let mut initialized = self.backbuffer_initialized.clone();
        self.record(slot, commands, &mut initialized)?;
        self.backbuffer_initialized = initialized;
        Ok(())
    }

    /// Submit a batch that only hands the slot's acquired image back for
    /// presentation, after the slot's own commands could not be recorded.
    ///
    /// Consumes the acquire semaphore and signals the image's present
    /// semaphore, moving a never-used image into the present layout.
    fn release_acquired(&mut self, slot: usize, index: usize) -> RhiResult<()> {
        let frame = &self.frames[slot];
        frame.pool.reset()?;
        frame.cmd.begin()?;
        if let Some(initialized) = self.backbuffer_initialized.get_mut(index)
            && !*initialized
        {
            let image = self.swapchain.images()[index];
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
            frame.cmd.pipeline_barrier(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                std::slice::from_ref(&barrier),
            );
            *initialized = true;
        }
        frame.cmd.end()?;

        let command_buffers = [frame.cmd.handle()];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let mut submit = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        let signal = self.render_finished.get(index).map(|s| [s.handle()]);
        if let Some(signal) = signal.as_ref() {
            submit = submit.signal_semaphores(signal);
        }
        unsafe { self.device.submit(&[submit], vk::Fence::null()) }
    }

    fn record(
        &self,
        slot: usize,
        commands: &[Command],
        initialized: &mut [bool],
    ) -> RhiResult<()> {
        let cmd = &self.frames[slot].cmd;
        let layout = self.pipeline_layout()?.handle();
        let mut recorder = PassState::default();

        cmd.begin()?;
        for command in commands {
            match command {
                Command::SetPipeline(pipeline) => {
                    let pipeline = self.pipelines.get(pipeline.index()).ok_or_else(|| {
                        RhiError::InvalidHandle(format!("unknown {pipeline}"))
                    })?;
                    cmd.bind_graphics_pipeline(pipeline.handle());
                    recorder.pipeline_bound = true;
                }
                Command::BindDescriptorTable { slot } => {
                    cmd.bind_descriptor_set(layout, self.heap()?.set(*slot)?);
                }
                Command::SetViewport(viewport) => cmd.set_viewport(vk_viewport(*viewport)),
                Command::SetScissor(scissor) => cmd.set_scissor(vk_scissor(*scissor)),
                Command::Barrier {
                    image,
                    before,
                    after,
                } => {
                    recorder.end(cmd);
                    let target = self.image_ref(*image)?;
                    let mut old_layout = state_layout(*before);
                    if let Some(index) = target.backbuffer
                        && !initialized[index]
                    {
                        old_layout = vk::ImageLayout::UNDEFINED;
                        initialized[index] = true;
                    }
                    let barrier = vk::ImageMemoryBarrier::default()
                        .old_layout(old_layout)
                        .new_layout(state_layout(*after))
                        .src_access_mask(state_access(*before))
                        .dst_access_mask(state_access(*after))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(target.image)
                        .subresource_range(subresource_range(target.aspect));
                    cmd.pipeline_barrier(
                        src_stage(*before),
                        dst_stage(*after),
                        std::slice::from_ref(&barrier),
                    );
                }
                Command::SetRenderTargets { color, depth } => {
                    recorder.targets = Some((*color, *depth));
                    recorder.begin(self, cmd, *color, *depth)?;
                }
                Command::ClearRenderTarget { image, color } => {
                    if recorder.active.map(|(c, _)| c) != Some(*image) {
                        recorder.begin(self, cmd, *image, None)?;
                    }
                    let attachment = vk::ClearAttachment {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        color_attachment: 0,
                        clear_value: vk::ClearValue {
                            color: vk::ClearColorValue { float32: *color },
                        },
                    };
                    cmd.clear_attachments(&[attachment], recorder.area);
                }
                Command::ClearDepth { image, depth } => {
                    let bound = recorder.active.and_then(|(_, d)| d) == Some(*image);
                    if !bound {
                        let Some((color, _)) = recorder.targets else {
                            return Err(RhiError::InvalidHandle(format!(
                                "depth clear of {image} without render targets"
                            )));
                        };
                        recorder.begin(self, cmd, color, Some(*image))?;
                    }
                    let attachment = vk::ClearAttachment {
                        aspect_mask: vk::ImageAspectFlags::DEPTH,
                        color_attachment: 0,
                        clear_value: vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: *depth,
                                stencil: 0,
                            },
                        },
                    };
                    cmd.clear_attachments(&[attachment], recorder.area);
                }
                Command::Draw { mesh, constants } => {
                    if !recorder.pipeline_bound {
                        warn!("Draw of {} skipped: no pipeline bound", mesh);
                        continue;
                    }
                    if let Some((color, depth)) = recorder.targets
                        && recorder.active != recorder.targets
                    {
                        recorder.begin(self, cmd, color, depth)?;
                    }
                    let gpu_mesh = self
                        .meshes
                        .get(mesh.index())
                        .ok_or_else(|| RhiError::InvalidHandle(format!("unknown {mesh}")))?;
                    cmd.push_constants(layout, constants.as_bytes());
                    cmd.bind_vertex_buffer(gpu_mesh.vertices.handle());
                    cmd.bind_index_buffer(gpu_mesh.indices.handle());
                    cmd.draw_indexed(gpu_mesh.index_count);
                }
                Command::Resolve {
                    source,
                    destination,
                } => {
                    recorder.end(cmd);
                    let src = self.image_ref(*source)?;
                    let dst = self.image_ref(*destination)?;
                    cmd.resolve_image(src.image, dst.image, dst.extent);
                }
            }
        }
        recorder.end(cmd);
        cmd.end()
    }
}

/// Dynamic rendering scope tracked while translating one list.
#[derive(Default)]
struct PassState {
    targets: Option<(ImageHandle, Option<ImageHandle>)>,
    active: Option<(ImageHandle, Option<ImageHandle>)>,
    area: vk::Rect2D,
    pipeline_bound: bool,
}

impl PassState {
    fn begin(
        &mut self,
        backend: &VulkanBackend,
        cmd: &CommandBuffer,
        color: ImageHandle,
        depth: Option<ImageHandle>,
    ) -> RhiResult<()> {
        self.end(cmd);
        let color_ref = backend.image_ref(color)?;
        let depth_ref = depth.map(|d| backend.image_ref(d)).transpose()?;

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(color_ref.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let depth_attachment = depth_ref.map(|d| {
            vk::RenderingAttachmentInfo::default()
                .image_view(d.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });

        self.area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: color_ref.extent,
        };
        let mut info = vk::RenderingInfo::default()
            .render_area(self.area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            info = info.depth_attachment(depth_attachment);
        }
        cmd.begin_rendering(&info);
        self.active = Some((color, depth));
        Ok(())
    }

    fn end(&mut self, cmd: &CommandBuffer) {
        if self.active.take().is_some() {
            cmd.end_rendering();
        }
    }
}

impl Backend for VulkanBackend {
    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn supported_sample_counts(&self) -> SampleCountSet {
        self.gpu.sample_counts
    }

    fn completed_fence_value(&self) -> u64 {
        match self.fence.value() {
            Ok(value) => {
                self.last_completed.set(value);
                value
            }
            Err(e) => {
                error!("Failed to read fence value: {}", e);
                self.last_completed.get()
            }
        }
    }

    fn signal_fence(&mut self, value: u64) -> RhiResult<()> {
        self.fence.signal_on_queue(value)
    }

    fn wait_fence(&self, value: u64) -> RhiResult<()> {
        self.fence.wait(value, u64::MAX)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn surface_extent(&self) -> Extent2D {
        let extent = self.swapchain.extent();
        Extent2D::new(extent.width, extent.height)
    }

    fn backbuffers(&self) -> Vec<ImageHandle> {
        self.backbuffers.clone()
    }

    fn acquire_backbuffer(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        if self.backbuffers.is_empty() {
            return Err(RhiError::SurfaceOutOfDate);
        }
        let frame = self
            .frames
            .get_mut(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no frame slot {slot}")))?;

        let index = match self
            .swapchain
            .acquire_next_image(frame.image_available.handle())
        {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Swapchain suboptimal at acquire");
                }
                index as usize
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(RhiError::SurfaceOutOfDate),
            Err(e) => return Err(e.into()),
        };
        frame.acquired = Some(index);

        Ok(AcquiredImage {
            index,
            image: self.backbuffers[index],
        })
    }

    fn present(&mut self, _slot: usize, image_index: usize, vsync: bool) -> RhiResult<PresentStatus> {
        let wait = self
            .render_finished
            .get(image_index)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no presentable image {image_index}")))?
            .handle();

        let status = match self
            .swapchain
            .present(self.device.queue(), image_index as u32, wait)
        {
            Ok(false) => PresentStatus::Presented,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => return Err(e.into()),
        };

        if vsync != self.swapchain.vsync() {
            debug!("Vsync changed to {}, surface must be recreated", vsync);
            self.desired_vsync = vsync;
            if status == PresentStatus::Presented {
                return Ok(PresentStatus::Suboptimal);
            }
        }
        Ok(status)
    }

    fn release_backbuffers(&mut self) {
        for handle in self.backbuffers.drain(..) {
            self.images.remove(&handle);
        }
        self.backbuffer_initialized.clear();
        self.render_finished.clear();
        for frame in &mut self.frames {
            frame.acquired = None;
        }
        self.swapchain.release_views();
    }

    fn resize_surface(&mut self, extent: Extent2D) -> RhiResult<Vec<ImageHandle>> {
        if !self.backbuffers.is_empty() {
            warn!("Surface resized before its images were released");
            self.release_backbuffers();
        }
        self.swapchain.recreate(
            &self.surface,
            vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
            self.desired_vsync,
        )?;
        self.register_backbuffers()?;
        Ok(self.backbuffers.clone())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle> {
        if desc.usage == ImageUsage::Texture {
            return Err(RhiError::InvalidHandle(format!(
                "texture '{}' must be created with pixels",
                desc.label
            )));
        }
        let image = self.new_gpu_image(desc)?;
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(state_layout(desc.initial_state))
            .dst_access_mask(state_access(desc.initial_state))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle())
            .subresource_range(subresource_range(image.aspect()));
        submit_one_time(&self.device, &self.upload_pool, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage(desc.initial_state),
                std::slice::from_ref(&barrier),
            );
        })?;
        Ok(self.insert_owned(image))
    }

    fn create_texture(&mut self, desc: &ImageDesc, pixels: &[u8]) -> RhiResult<ImageHandle> {
        let expected = desc.extent.width as usize * desc.extent.height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "texture '{}' expects {} bytes of RGBA8, got {}",
                desc.label,
                expected,
                pixels.len()
            )));
        }

        let image = self.new_gpu_image(desc)?;
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, pixels)?;
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        let to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle())
            .subresource_range(range);
        let to_final = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(state_layout(desc.initial_state))
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(state_access(desc.initial_state))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle())
            .subresource_range(range);

        submit_one_time(&self.device, &self.upload_pool, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                std::slice::from_ref(&to_transfer),
            );
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), image.extent());
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                dst_stage(desc.initial_state),
                std::slice::from_ref(&to_final),
            );
        })?;
        debug!(
            "Uploaded texture '{}' ({}x{})",
            desc.label, desc.extent.width, desc.extent.height
        );
        Ok(self.insert_owned(image))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        match self.images.get(&image).map(|entry| &entry.kind) {
            Some(ImageKind::Owned(_)) => {
                self.images.remove(&image);
            }
            Some(ImageKind::Backbuffer(_)) => {
                warn!("Refusing to destroy presentable image {}", image);
            }
            None => warn!("Destroying unknown image {}", image),
        }
    }

    fn create_constant_buffer(&mut self, label: &str, size: u64) -> RhiResult<BufferHandle> {
        let buffer = Buffer::new(self.device.clone(), BufferUsage::Uniform, size)?;
        self.buffers.push(buffer);
        let handle = BufferHandle((self.buffers.len() - 1) as u32);
        debug!("Constant buffer {} '{}' ({} bytes)", handle, label, size);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.buffers
            .get(buffer.index())
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown {buffer}")))?
            .write_data(offset, data)
    }

    fn create_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RhiResult<MeshHandle> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RhiError::InvalidHandle(format!("mesh '{label}' is empty")));
        }
        let mesh = GpuMesh {
            vertices: Buffer::new_with_data(
                self.device.clone(),
                BufferUsage::Vertex,
                bytemuck::cast_slice(vertices),
            )?,
            indices: Buffer::new_with_data(
                self.device.clone(),
                BufferUsage::Index,
                bytemuck::cast_slice(indices),
            )?,
            index_count: indices.len() as u32,
        };
        self.meshes.push(mesh);
        debug!(
            "Mesh '{}' uploaded: {} vertices, {} indices",
            label,
            vertices.len(),
            indices.len()
        );
        Ok(MeshHandle((self.meshes.len() - 1) as u32))
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> RhiResult<PipelineHandle> {
        if !self.gpu.sample_counts.contains(desc.samples) {
            return Err(RhiError::Unsupported(format!(
                "pipeline '{}' at {}",
                desc.label, desc.samples
            )));
        }
        let vertex = Shader::load(
            self.device.clone(),
            &self.shader_dir,
            &desc.shader,
            ShaderStage::Vertex,
        )?;
        let fragment = Shader::load(
            self.device.clone(),
            &self.shader_dir,
            &desc.shader,
            ShaderStage::Fragment,
        )?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .rasterization_samples(sample_count_flag(desc.samples))
            .color_attachment_format(self.swapchain.format())
            .depth_attachment_format(DEPTH_FORMAT)
            .build(self.device.clone(), self.pipeline_layout()?)?;

        self.pipelines.push(pipeline);
        info!("Pipeline '{}' created at {}", desc.label, desc.samples);
        Ok(PipelineHandle((self.pipelines.len() - 1) as u32))
    }

    fn create_descriptor_heap(&mut self, layout: HeapLayout) -> RhiResult<()> {
        if self.heap.is_some() {
            return Err(RhiError::InvalidHandle(
                "descriptor heap already created".to_string(),
            ));
        }
        if layout.frame_slots as usize != self.frames.len() {
            return Err(RhiError::InvalidHandle(format!(
                "heap for {} slots on a backend with {}",
                layout.frame_slots,
                self.frames.len()
            )));
        }
        let heap = DescriptorHeap::new(self.device.clone(), layout)?;
        self.pipeline_layout = Some(PipelineLayout::new(
            self.device.clone(),
            heap.set_layout(),
        )?);
        self.heap = Some(heap);
        Ok(())
    }

    fn write_descriptor(&mut self, index: u32, view: DescriptorView) -> RhiResult<()> {
        let heap = self.heap()?;
        match view {
            DescriptorView::Constants { buffer, size } => {
                let buffer = self
                    .buffers
                    .get(buffer.index())
                    .ok_or_else(|| RhiError::InvalidHandle(format!("unknown {buffer}")))?;
                heap.write_constants(index, buffer.handle(), size)
            }
            DescriptorView::Texture(image) => {
                let image = self.image_ref(image)?;
                heap.write_texture(index, image.view)
            }
        }
    }

    fn reset_command_allocator(&mut self, slot: usize) -> RhiResult<()> {
        self.frames
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no frame slot {slot}")))?
            .pool
            .reset()
    }

    fn submit(&mut self, slot: usize, commands: &CommandList) -> RhiResult<()> {
        if !commands.is_closed() {
            return Err(RhiError::InvalidHandle(format!(
                "command list for slot {slot} submitted while still open"
            )));
        }
        if slot >= self.frames.len() {
            return Err(RhiError::InvalidHandle(format!("no frame slot {slot}")));
        }

        let acquired = self.frames[slot].acquired.take();
        if let Err(e) = self.translate(slot, commands.commands()) {
            warn!("Recording frame slot {} failed: {}", slot, e);
            if let Some(index) = acquired
                && let Err(release) = self.release_acquired(slot, index)
            {
                error!("Failed to release presentable image {}: {}", index, release);
            }
            return Err(e);
        }

        let frame = &self.frames[slot];
        let command_buffers = [frame.cmd.handle()];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages =
            [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = acquired
            .and_then(|index| self.render_finished.get(index))
            .map(|semaphore| [semaphore.handle()]);

        let mut submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if acquired.is_some() {
            submit = submit
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }
        if let Some(signal) = signal_semaphores.as_ref() {
            submit = submit.signal_semaphores(signal);
        }
        unsafe { self.device.submit(&[submit], vk::Fence::null()) }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during teardown: {}", e);
        }
        let validation_errors = Instance::validation_error_count();
        if validation_errors > 0 {
            warn!("{} validation errors reported this session", validation_errors);
        }
        info!("Vulkan backend shutting down");
    }
}

fn image_usage_flags(usage: ImageUsage) -> vk::ImageUsageFlags {
    match usage {
        ImageUsage::RenderTarget => {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        }
        ImageUsage::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ImageUsage::Texture => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
    }
}

/// Image layout an image must be in for `state`.
pub fn state_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::ResolveSource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::ResolveDest | ResourceState::CopyDest => {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        }
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

fn state_access(state: ResourceState) -> vk::AccessFlags {
    match state {
        ResourceState::Present => vk::AccessFlags::empty(),
        ResourceState::RenderTarget => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ResourceState::DepthWrite => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ResourceState::ResolveSource => vk::AccessFlags::TRANSFER_READ,
        ResourceState::ResolveDest | ResourceState::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
        ResourceState::ShaderResource => vk::AccessFlags::SHADER_READ,
    }
}

fn state_stage(state: ResourceState) -> vk::PipelineStageFlags {
    match state {
        ResourceState::Present | ResourceState::RenderTarget => {
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        }
        ResourceState::DepthWrite => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        ResourceState::ResolveSource | ResourceState::ResolveDest | ResourceState::CopyDest => {
            vk::PipelineStageFlags::TRANSFER
        }
        ResourceState::ShaderResource => vk::PipelineStageFlags::FRAGMENT_SHADER,
    }
}

fn src_stage(state: ResourceState) -> vk::PipelineStageFlags {
    state_stage(state)
}

fn dst_stage(state: ResourceState) -> vk::PipelineStageFlags {
    match state {
        ResourceState::Present => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        other => state_stage(other),
    }
}

/// Vulkan viewport with Y flipped so clip space points up.
fn vk_viewport(viewport: Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y + viewport.height,
        width: viewport.width,
        height: -viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

fn vk_scissor(scissor: ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: scissor.x,
            y: scissor.y,
        },
        extent: vk::Extent2D {
            width: scissor.width,
            height: scissor.height,
        },
    }
}
