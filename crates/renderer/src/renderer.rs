//! Main renderer orchestration.
//!
//! [`Renderer`] owns the backend and every frame-synchronization component.
//! A frame is driven by three calls:
//!
//! ```text
//! begin_frame()        wait for the slot's fence, acquire an image, open the
//!                      slot's command list and record pipeline, descriptor
//!                      table, viewport, target transitions and clears
//! submit_draw_list()   one draw per item
//! end_frame(vsync)     resolve (MSAA), transition to present, close, submit,
//!                      signal the slot's fence value, present, advance slot
//! ```
//!
//! Structural changes (resize, MSAA reconfiguration, shutdown) drain the GPU
//! first and are rejected while a frame is being recorded.
//!
//! # Resource Destruction Order
//!
//! Shutdown waits for every slot, then releases MSAA targets, the depth
//! buffer and registered textures. Pipelines, meshes, constant buffers and
//! the descriptor heap belong to the backend and go with it.

use std::path::Path;

use glam::{Mat4, Vec3};
use tracing::{debug, error, info, warn};

use vista_core::{FailurePolicy, RendererConfig};
use vista_resources::TextureData;
use vista_rhi::{
    Backend, Command, Extent2D, ImageDesc, ImageHandle, PipelineHandle, PresentStatus,
    PushConstants, ResourceState, RhiError, SampleCount, SampleCountSet, ScissorRect, Viewport,
};
use vista_scene::{RenderPipeline, SceneLighting};

use crate::constants::{PerDrawConstants, PerFrameConstants, PerSceneConstants};
use crate::descriptor::{DescriptorAllocator, DescriptorLayout, TextureClass};
use crate::draw_list::DrawItem;
use crate::error::{RendererError, RendererResult};
use crate::fence::FrameFences;
use crate::meshes::MeshCache;
use crate::msaa::{CLEAR_COLOR, DEPTH_CLEAR, MsaaManager, MsaaState, MsaaTargets};
use crate::pipelines::PipelineTable;
use crate::recorder::{FrameRecorder, SlotState};
use crate::state::{FramePath, ResourceStateTracker, Transition};
use crate::surface::SurfaceManager;

/// Smallest and largest supported number of frame slots.
pub const MIN_FRAMES_IN_FLIGHT: usize = 2;
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// The frame currently being recorded.
#[derive(Debug)]
struct ActiveFrame {
    slot: usize,
    image_index: usize,
    backbuffer: ImageHandle,
    path: FramePath,
    samples: SampleCount,
    /// Color target draws go to: the backbuffer, or the slot's MSAA target.
    color: ImageHandle,
    depth: ImageHandle,
    pipeline: Option<PipelineHandle>,
    /// Techniques already reported missing this frame.
    missing: Vec<RenderPipeline>,
    skipped_draws: usize,
    first_error: Option<RendererError>,
}

impl ActiveFrame {
    /// Apply the failure policy to the outcome of one recording step.
    fn settle(&mut self, policy: FailurePolicy, result: RendererResult<()>) {
        let Err(err) = result else {
            return;
        };
        if matches!(err, RendererError::MissingPipeline { .. }) {
            warn!("Frame slot {}: {}", self.slot, err);
        } else {
            error!("Frame slot {}: recording failed: {}", self.slot, err);
        }
        match policy {
            FailurePolicy::Lenient => {}
            FailurePolicy::Strict => {
                if self.first_error.is_none() {
                    self.first_error = Some(err);
                }
            }
            FailurePolicy::Trap => panic!("frame slot {}: {}", self.slot, err),
        }
    }
}

/// Frame-synchronized renderer over a [`Backend`].
pub struct Renderer<B: Backend> {
    backend: B,
    policy: FailurePolicy,
    frame_count: usize,
    /// Slot the next `begin_frame` records into.
    frame_slot: usize,
    fences: FrameFences,
    recorder: FrameRecorder,
    tracker: ResourceStateTracker,
    surface: SurfaceManager,
    descriptors: DescriptorAllocator,
    msaa: MsaaManager,
    pipelines: PipelineTable,
    meshes: MeshCache,
    camera: PerFrameConstants,
    frame: Option<ActiveFrame>,
    frames_submitted: u64,
    shut_down: bool,
}

impl<B: Backend> Renderer<B> {
    /// Build every component on top of an initialized backend.
    ///
    /// Order: surface targets, fences, descriptor heap and constant buffers,
    /// pipelines, meshes, the fallback texture, default lighting and finally
    /// the configured MSAA level.
    ///
    /// # Errors
    /// Returns [`RendererError::InvalidFrameCount`] unless the config asks for
    /// 2 or 3 frames in flight, and any backend failure during creation.
    pub fn new(mut backend: B, config: &RendererConfig) -> RendererResult<Self> {
        let frame_count = config.frames_in_flight;
        check_frame_count(frame_count)?;

        info!(
            "Initializing renderer on the {} backend ({} frames in flight, {:?} failure policy)",
            backend.name(),
            frame_count,
            config.failure_policy
        );

        let mut tracker = ResourceStateTracker::new();
        let surface = SurfaceManager::new(&mut backend, &mut tracker)?;
        let fences = FrameFences::new(frame_count);
        let descriptors = DescriptorAllocator::new(&mut backend, frame_count)?;
        let supported = backend.supported_sample_counts();
        let pipelines = PipelineTable::build(&mut backend, supported)?;
        let meshes = MeshCache::build(&mut backend)?;

        let mut renderer = Self {
            backend,
            policy: config.failure_policy,
            frame_count,
            frame_slot: 0,
            fences,
            recorder: FrameRecorder::new(frame_count),
            tracker,
            surface,
            descriptors,
            msaa: MsaaManager::new(supported),
            pipelines,
            meshes,
            camera: PerFrameConstants::default(),
            frame: None,
            frames_submitted: 0,
            shut_down: false,
        };

        renderer.register_texture_data(&TextureData::checkerboard(), TextureClass::Primary)?;

        let lighting = SceneLighting::default();
        renderer.update_scene_constants(
            lighting.ambient_colour,
            lighting.light_direction,
            lighting.light_colour,
        )?;

        if config.msaa_enabled() {
            match renderer.msaa.resolve_request(true, config.msaa_samples) {
                Ok(state) => renderer.msaa.recreate(
                    &mut renderer.backend,
                    &mut renderer.tracker,
                    state,
                    frame_count,
                    renderer.surface.extent(),
                )?,
                Err(e) => warn!("{}, starting with MSAA disabled", e),
            }
        }

        info!(
            "Renderer ready: {} pipelines, {} meshes, {} descriptors",
            renderer.pipelines.len(),
            renderer.meshes.len(),
            renderer.descriptors.layout().num_descriptors
        );
        Ok(renderer)
    }

    /// Start recording the next frame slot.
    ///
    /// Blocks until the GPU has finished the slot's previous submission. Once
    /// this returns `Ok`, the frame must be finished with [`end_frame`](Self::end_frame).
    ///
    /// # Errors
    /// [`RhiError::SurfaceOutOfDate`] (see [`RendererError::is_surface_out_of_date`])
    /// when the surface must be resized first; nothing is recorded in that case.
    pub fn begin_frame(&mut self) -> RendererResult<()> {
        let slot = self.frame_slot;
        if self.frame.is_some() {
            return Err(RendererError::InvalidSlotState {
                slot,
                state: SlotState::Recording,
                operation: "begin a second frame in",
            });
        }

        self.fences.wait_for_slot(&self.backend, slot)?;
        let completed = self.backend.completed_fence_value();
        let watermark = self.fences.watermark(slot);
        if completed < watermark {
            return Err(RendererError::FenceInvariant {
                slot,
                completed,
                watermark,
            });
        }
        self.recorder.retire(slot)?;
        let Some(surface_depth) = self.surface.depth() else {
            return Err(RhiError::SurfaceOutOfDate.into());
        };

        self.descriptors
            .write_frame_constants(&mut self.backend, slot, &self.camera)?;
        self.recorder.begin(slot, &mut self.backend)?;
        let acquired = match self.backend.acquire_backbuffer(slot) {
            Ok(acquired) => acquired,
            Err(e) => {
                self.recorder.abandon(slot)?;
                return Err(e.into());
            }
        };
        self.tracker.clear_log();

        let msaa = self.msaa.state();
        let (path, samples, color, depth) = match (msaa, self.msaa.targets()) {
            (MsaaState::Enabled(samples), Some(targets)) => {
                (FramePath::Resolve, samples, targets.colors[slot], targets.depth)
            }
            _ => (
                FramePath::Direct,
                SampleCount::X1,
                acquired.image,
                surface_depth,
            ),
        };

        let mut frame = ActiveFrame {
            slot,
            image_index: acquired.index,
            backbuffer: acquired.image,
            path,
            samples,
            color,
            depth,
            pipeline: None,
            missing: Vec::new(),
            skipped_draws: 0,
            first_error: None,
        };
        self.record_frame_start(&mut frame);
        self.frame = Some(frame);
        Ok(())
    }

    fn record_frame_start(&mut self, frame: &mut ActiveFrame) {
        let policy = self.policy;
        let slot = frame.slot;

        self.bind_technique(frame, RenderPipeline::Default);

        let result = self.recorder.push(slot, Command::BindDescriptorTable { slot });
        frame.settle(policy, result);

        let result = self.set_viewport(slot);
        frame.settle(policy, result);

        let result = self.bind_targets(frame);
        frame.settle(policy, result);

        let result = self.clear_targets(frame);
        frame.settle(policy, result);
    }

    fn set_viewport(&mut self, slot: usize) -> RendererResult<()> {
        self.recorder
            .push(slot, Command::SetViewport(self.surface.viewport()))?;
        self.recorder
            .push(slot, Command::SetScissor(self.surface.scissor()))
    }

    fn bind_targets(&mut self, frame: &ActiveFrame) -> RendererResult<()> {
        let list = self.recorder.recording(frame.slot)?;
        self.tracker
            .require(list, frame.color, ResourceState::RenderTarget)?;
        self.tracker
            .require(list, frame.depth, ResourceState::DepthWrite)?;
        list.push(Command::SetRenderTargets {
            color: frame.color,
            depth: Some(frame.depth),
        })?;
        Ok(())
    }

    fn clear_targets(&mut self, frame: &ActiveFrame) -> RendererResult<()> {
        self.recorder.push(
            frame.slot,
            Command::ClearRenderTarget {
                image: frame.color,
                color: CLEAR_COLOR,
            },
        )?;
        self.recorder.push(
            frame.slot,
            Command::ClearDepth {
                image: frame.depth,
                depth: DEPTH_CLEAR,
            },
        )
    }

    /// Bind the technique's pipeline at the frame's sample count.
    ///
    /// A missing pipeline keeps whatever was bound before. Returns whether any
    /// pipeline is bound afterwards.
    fn bind_technique(&mut self, frame: &mut ActiveFrame, technique: RenderPipeline) -> bool {
        match self.pipelines.get(technique, frame.samples) {
            Some(handle) if frame.pipeline == Some(handle) => {}
            Some(handle) => match self.recorder.push(frame.slot, Command::SetPipeline(handle)) {
                Ok(()) => frame.pipeline = Some(handle),
                Err(e) => frame.settle(self.policy, Err(e)),
            },
            None => {
                if !frame.missing.contains(&technique) {
                    frame.missing.push(technique);
                    let samples = frame.samples;
                    frame.settle(
                        self.policy,
                        Err(RendererError::MissingPipeline { technique, samples }),
                    );
                }
            }
        }
        frame.pipeline.is_some()
    }

    /// Record one draw per item.
    ///
    /// # Errors
    /// [`RendererError::FrameNotStarted`] outside `begin_frame`/`end_frame`.
    /// Recording failures follow the failure policy instead.
    pub fn submit_draw_list(&mut self, items: &[DrawItem]) -> RendererResult<()> {
        let mut frame = self.frame.take().ok_or(RendererError::FrameNotStarted)?;
        let policy = self.policy;

        for item in items {
            if !self.bind_technique(&mut frame, item.pipeline) {
                frame.skipped_draws += 1;
                continue;
            }
            let Some(mesh) = self.meshes.get(item.mesh) else {
                warn!("No mesh for {:?}, skipping draw", item.mesh);
                frame.skipped_draws += 1;
                continue;
            };

            let element = self.descriptors.layout().texture_element(item.texture_index);
            let constants = PerDrawConstants::new(item.transform.world_matrix(), element);
            let result = PushConstants::new(&constants)
                .map_err(RendererError::from)
                .and_then(|constants| {
                    self.recorder
                        .push(frame.slot, Command::Draw { mesh, constants })
                });
            frame.settle(policy, result);
        }

        if frame.skipped_draws > 0 {
            debug!(
                "Frame slot {}: {} draws skipped without a pipeline",
                frame.slot, frame.skipped_draws
            );
        }
        self.frame = Some(frame);
        Ok(())
    }

    /// Finish, submit and present the frame, then advance to the next slot.
    ///
    /// # Errors
    /// [`RendererError::FrameNotStarted`] without a matching `begin_frame`.
    /// Under [`FailurePolicy::Strict`], the first recording or submission
    /// failure of the frame, after the frame was presented. A frame whose
    /// submit fails is discarded, and its slot is reusable on the next lap.
    pub fn end_frame(&mut self, vsync: bool) -> RendererResult<PresentStatus> {
        let mut frame = self.frame.take().ok_or(RendererError::FrameNotStarted)?;
        let policy = self.policy;
        let slot = frame.slot;

        if frame.path == FramePath::Resolve {
            let result = self.resolve(&frame);
            frame.settle(policy, result);
        }

        let result = self.recorder.recording(slot).and_then(|list| {
            self.tracker
                .require(list, frame.backbuffer, ResourceState::Present)
                .map(|_| ())
        });
        frame.settle(policy, result);

        let submitted = self
            .recorder
            .close(slot)
            .and_then(|()| self.recorder.submit(slot, &mut self.backend));
        match submitted {
            Ok(()) => self.frames_submitted += 1,
            Err(err) => {
                self.discard_recording(slot);
                frame.settle(policy, Err(err));
            }
        }

        // A failed submit may still have queued work releasing the acquired image.
        if let Err(err) = self.fences.signal_after_submit(&mut self.backend, slot) {
            if let Err(idle) = self.backend.wait_idle() {
                error!("Failed to drain the queue after a lost fence signal: {}", idle);
            }
            frame.settle(policy, Err(err));
        }
        self.frame_slot = (slot + 1) % self.frame_count;

        let status = match self.backend.present(slot, frame.image_index, vsync) {
            Ok(status) => status,
            Err(RhiError::SurfaceOutOfDate) => PresentStatus::OutOfDate,
            Err(e) => {
                frame.settle(policy, Err(e.into()));
                PresentStatus::OutOfDate
            }
        };
        if status.needs_recreate() {
            debug!("Present reported {:?}", status);
        }

        match frame.first_error {
            Some(err) => Err(err),
            None => Ok(status),
        }
    }

    /// Resolve the multisampled target into the presentable image and put both
    /// back into render-target state.
    fn resolve(&mut self, frame: &ActiveFrame) -> RendererResult<()> {
        let list = self.recorder.recording(frame.slot)?;
        self.tracker
            .require(list, frame.color, ResourceState::ResolveSource)?;
        self.tracker
            .require(list, frame.backbuffer, ResourceState::ResolveDest)?;
        list.push(Command::Resolve {
            source: frame.color,
            destination: frame.backbuffer,
        })?;
        self.tracker
            .require(list, frame.color, ResourceState::RenderTarget)?;
        self.tracker
            .require(list, frame.backbuffer, ResourceState::RenderTarget)?;
        Ok(())
    }

    /// Drop a slot's unsubmitted commands and undo the barriers they recorded.
    fn discard_recording(&mut self, slot: usize) {
        self.tracker.rollback();
        if let Err(e) = self.recorder.abandon(slot) {
            error!("Failed to discard frame slot {}: {}", slot, e);
        }
    }

    fn ensure_idle(&self, operation: &'static str) -> RendererResult<()> {
        match &self.frame {
            Some(frame) => Err(RendererError::InvalidSlotState {
                slot: frame.slot,
                state: SlotState::Recording,
                operation,
            }),
            None => Ok(()),
        }
    }

    /// Switch multisampling on or off.
    ///
    /// Validates the request, drains the GPU and rebuilds the auxiliary
    /// targets. A request to enable at 1x disables multisampling.
    ///
    /// # Errors
    /// [`RendererError::UnsupportedSampleCount`] leaves the current state as it was.
    pub fn set_msaa(&mut self, enabled: bool, sample_count: u32) -> RendererResult<()> {
        self.ensure_idle("reconfigure MSAA while recording")?;
        let state = self.msaa.resolve_request(enabled, sample_count)?;

        self.fences.wait_for_all(&mut self.backend)?;
        self.msaa.recreate(
            &mut self.backend,
            &mut self.tracker,
            state,
            self.frame_count,
            self.surface.extent(),
        )
    }

    /// Recreate every size-dependent target. Returns false for a zero size.
    pub fn on_resize(&mut self, width: u32, height: u32) -> RendererResult<bool> {
        self.ensure_idle("resize while recording")?;
        self.surface.recreate(
            &mut self.backend,
            &mut self.fences,
            &mut self.tracker,
            &mut self.msaa,
            width,
            height,
        )
    }

    /// Rewrite the per-scene constants.
    pub fn update_scene_constants(
        &mut self,
        ambient_colour: Vec3,
        light_direction: Vec3,
        light_colour: Vec3,
    ) -> RendererResult<()> {
        let constants = PerSceneConstants::new(ambient_colour, light_direction, light_colour);
        self.descriptors
            .write_scene_constants(&mut self.backend, &constants)
    }

    /// Set the camera for the current frame and every frame after it.
    ///
    /// Written into the recording slot's constants right away, and into each
    /// slot's constants when that slot's frame begins.
    pub fn update_camera(&mut self, view: Mat4, projection: Mat4) -> RendererResult<()> {
        self.camera = PerFrameConstants::new(view, projection);
        if let Some(frame) = &self.frame {
            self.descriptors
                .write_frame_constants(&mut self.backend, frame.slot, &self.camera)?;
        }
        Ok(())
    }

    /// Load an image file and register it as a texture of `class`.
    ///
    /// # Errors
    /// [`RendererError::OutOfSlots`] is returned before the file is read.
    pub fn register_texture(&mut self, path: &Path, class: TextureClass) -> RendererResult<u32> {
        self.descriptors.next_index(class)?;
        let data = TextureData::load(path)?;
        self.register_texture_data(&data, class)
    }

    /// Upload decoded pixels and register them as a texture of `class`.
    ///
    /// Returns the descriptor heap index.
    pub fn register_texture_data(
        &mut self,
        data: &TextureData,
        class: TextureClass,
    ) -> RendererResult<u32> {
        let index = self.descriptors.next_index(class)?;
        let desc = ImageDesc::texture(
            format!("{class} {index}"),
            Extent2D::new(data.width, data.height),
        );
        let image = self.backend.create_texture(&desc, &data.pixels)?;
        match self.descriptors.register(&mut self.backend, class, image) {
            Ok(index) => Ok(index),
            Err(e) => {
                self.backend.destroy_image(image);
                Err(e)
            }
        }
    }

    /// Drain the GPU and release every renderer-owned image.
    ///
    /// Called by `Drop` when not called explicitly.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        if let Some(frame) = self.frame.take() {
            warn!("Shutting down while frame slot {} is recording", frame.slot);
        }
        self.fences.wait_for_all(&mut self.backend)?;

        self.msaa.release(&mut self.backend, &mut self.tracker);
        self.surface.release(&mut self.backend, &mut self.tracker);
        for image in self.descriptors.take_textures() {
            self.backend.destroy_image(image);
        }
        info!(
            "Renderer shut down after {} frames",
            self.frames_submitted
        );
        Ok(())
    }

    /// Slot the next frame records into.
    #[inline]
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frame_count
    }

    pub fn is_recording(&self) -> bool {
        self.frame.is_some()
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.recorder.state(slot)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn msaa_state(&self) -> MsaaState {
        self.msaa.state()
    }

    pub fn msaa_targets(&self) -> Option<&MsaaTargets> {
        self.msaa.targets()
    }

    pub fn supported_sample_counts(&self) -> SampleCountSet {
        self.msaa.supported()
    }

    pub fn surface_extent(&self) -> Extent2D {
        self.surface.extent()
    }

    pub fn viewport(&self) -> Viewport {
        self.surface.viewport()
    }

    pub fn scissor(&self) -> ScissorRect {
        self.surface.scissor()
    }

    pub fn backbuffers(&self) -> &[ImageHandle] {
        self.surface.backbuffers()
    }

    /// The single-sampled depth buffer, missing after a failed resize.
    pub fn depth_buffer(&self) -> Option<ImageHandle> {
        self.surface.depth()
    }

    pub fn fences(&self) -> &FrameFences {
        &self.fences
    }

    /// Barriers recorded by the current or most recent frame.
    pub fn transitions(&self) -> &[Transition] {
        self.tracker.transitions()
    }

    pub fn state_tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    pub fn descriptor_layout(&self) -> &DescriptorLayout {
        self.descriptors.layout()
    }

    /// Textures registered in a class so far.
    pub fn registered_textures(&self, class: TextureClass) -> u32 {
        self.descriptors.registered(class)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Renderer shutdown failed: {}", e);
        }
        debug!("Renderer destroyed");
    }
}

fn check_frame_count(frame_count: usize) -> RendererResult<()> {
    if (MIN_FRAMES_IN_FLIGHT..=MAX_FRAMES_IN_FLIGHT).contains(&frame_count) {
        Ok(())
    } else {
        Err(RendererError::InvalidFrameCount(frame_count))
    }
}

pub use vulkan::VulkanRenderer;

mod vulkan {
    use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
    use vista_core::RendererConfig;
    use vista_rhi::Extent2D;
    use vista_rhi::vulkan::{VulkanBackend, VulkanConfig};

    use super::{Renderer, check_frame_count};
    use crate::error::RendererResult;

    /// A renderer presenting to a window through Vulkan.
    pub type VulkanRenderer = Renderer<VulkanBackend>;

    impl Renderer<VulkanBackend> {
        /// Create a Vulkan backend for `window` and a renderer on top of it.
        ///
        /// The surface starts at `config.width` x `config.height`.
        pub fn with_window<W>(window: &W, config: &RendererConfig) -> RendererResult<Self>
        where
            W: HasDisplayHandle + HasWindowHandle + ?Sized,
        {
            check_frame_count(config.frames_in_flight)?;
            let backend = VulkanBackend::new(
                window,
                &VulkanConfig {
                    extent: Extent2D::new(config.width, config.height),
                    frames_in_flight: config.frames_in_flight,
                    vsync: config.vsync,
                    shader_dir: config.shader_dir.clone(),
                    validation: config.debug_validation,
                },
            )?;
            Self::new(backend, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig};

    fn renderer(frames_in_flight: usize) -> RendererResult<Renderer<HeadlessBackend>> {
        let backend = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::ZERO,
            ..Default::default()
        });
        let config = RendererConfig {
            frames_in_flight,
            ..Default::default()
        };
        Renderer::new(backend, &config)
    }

    #[test]
    fn test_frame_count_checked() {
        assert!(matches!(
            renderer(4),
            Err(RendererError::InvalidFrameCount(4))
        ));
        assert!(renderer(2).is_ok());
    }

    #[test]
    fn test_fallback_texture_in_primary_slot() {
        let renderer = renderer(3).unwrap();
        assert_eq!(renderer.registered_textures(TextureClass::Primary), 1);
        assert_eq!(renderer.registered_textures(TextureClass::Heightmap), 0);
    }

    #[test]
    fn test_calls_outside_a_frame() {
        let mut renderer = renderer(3).unwrap();
        assert!(matches!(
            renderer.submit_draw_list(&[]),
            Err(RendererError::FrameNotStarted)
        ));
        assert!(matches!(
            renderer.end_frame(true),
            Err(RendererError::FrameNotStarted)
        ));
    }

    #[test]
    fn test_structural_changes_rejected_mid_frame() {
        let mut renderer = renderer(3).unwrap();
        renderer.begin_frame().unwrap();
        assert!(renderer.on_resize(800, 600).is_err());
        assert!(renderer.set_msaa(true, 4).is_err());
        assert!(renderer.begin_frame().is_err());
        renderer.end_frame(true).unwrap();
        assert_eq!(renderer.frame_slot(), 1);
    }
}
