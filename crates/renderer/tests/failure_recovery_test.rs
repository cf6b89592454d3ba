//! Runtime failures in the middle of the frame loop.
//!
//! [`Faulty`] wraps the headless backend and fails selected calls on demand.
//! After any single failure the renderer must keep presenting frames without
//! the headless backend flagging a violation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use vista_core::{FailurePolicy, RendererConfig};
use vista_renderer::{
    DrawItem, DrawListAssembler, MsaaState, Renderer, RendererError, SlotState,
};
use vista_rhi::headless::{HeadlessBackend, HeadlessConfig, HeadlessEvent, HeadlessProbe};
use vista_rhi::{
    AcquiredImage, Backend, BufferHandle, CommandList, DescriptorView, Extent2D, HeapLayout,
    ImageDesc, ImageHandle, MeshHandle, PipelineDesc, PipelineHandle, PresentStatus,
    ResourceState, RhiError, RhiResult, SampleCount, SampleCountSet, Vertex,
};
use vista_scene::{PrimitiveType, Scene, SceneObject};

/// Calls to fail, shared with the test after the backend moves into the renderer.
#[derive(Default)]
struct Faults {
    submit: AtomicUsize,
    signal: AtomicUsize,
    acquire: AtomicUsize,
    reset_allocator: AtomicUsize,
    resize: AtomicUsize,
    /// Label of an image whose creation fails.
    image_label: Mutex<Option<String>>,
}

impl Faults {
    /// Consume one pending failure from `counter`.
    fn trip(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn fail_image(&self, label: Option<&str>) {
        *self.image_label.lock().unwrap_or_else(PoisonError::into_inner) =
            label.map(str::to_string);
    }
}

struct Faulty {
    inner: HeadlessBackend,
    faults: Arc<Faults>,
}

impl Backend for Faulty {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn supported_sample_counts(&self) -> SampleCountSet {
        self.inner.supported_sample_counts()
    }

    fn completed_fence_value(&self) -> u64 {
        self.inner.completed_fence_value()
    }

    fn signal_fence(&mut self, value: u64) -> RhiResult<()> {
        if Faults::trip(&self.faults.signal) {
            return Err(RhiError::DeviceLost(format!("signal {value} rejected")));
        }
        self.inner.signal_fence(value)
    }

    fn wait_fence(&self, value: u64) -> RhiResult<()> {
        self.inner.wait_fence(value)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.inner.wait_idle()
    }

    fn surface_extent(&self) -> Extent2D {
        self.inner.surface_extent()
    }

    fn backbuffers(&self) -> Vec<ImageHandle> {
        self.inner.backbuffers()
    }

    fn acquire_backbuffer(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        if Faults::trip(&self.faults.acquire) {
            return Err(RhiError::SurfaceOutOfDate);
        }
        self.inner.acquire_backbuffer(slot)
    }

    fn present(&mut self, slot: usize, image_index: usize, vsync: bool) -> RhiResult<PresentStatus> {
        self.inner.present(slot, image_index, vsync)
    }

    fn release_backbuffers(&mut self) {
        self.inner.release_backbuffers();
    }

    fn resize_surface(&mut self, extent: Extent2D) -> RhiResult<Vec<ImageHandle>> {
        if Faults::trip(&self.faults.resize) {
            return Err(RhiError::SwapchainError("resize rejected".to_string()));
        }
        self.inner.resize_surface(extent)
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle> {
        let failing = self
            .faults
            .image_label
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(desc.label.as_str());
        if failing {
            return Err(RhiError::DeviceLost(format!("image '{}' rejected", desc.label)));
        }
        self.inner.create_image(desc)
    }

    fn create_texture(&mut self, desc: &ImageDesc, pixels: &[u8]) -> RhiResult<ImageHandle> {
        self.inner.create_texture(desc, pixels)
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.inner.destroy_image(image);
    }

    fn create_constant_buffer(&mut self, label: &str, size: u64) -> RhiResult<BufferHandle> {
        self.inner.create_constant_buffer(label, size)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.inner.write_buffer(buffer, offset, data)
    }

    fn create_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RhiResult<MeshHandle> {
        self.inner.create_mesh(label, vertices, indices)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> RhiResult<PipelineHandle> {
        self.inner.create_pipeline(desc)
    }

    fn create_descriptor_heap(&mut self, layout: HeapLayout) -> RhiResult<()> {
        self.inner.create_descriptor_heap(layout)
    }

    fn write_descriptor(&mut self, index: u32, view: DescriptorView) -> RhiResult<()> {
        self.inner.write_descriptor(index, view)
    }

    fn reset_command_allocator(&mut self, slot: usize) -> RhiResult<()> {
        if Faults::trip(&self.faults.reset_allocator) {
            return Err(RhiError::DeviceLost(format!("allocator {slot} reset rejected")));
        }
        self.inner.reset_command_allocator(slot)
    }

    fn submit(&mut self, slot: usize, commands: &CommandList) -> RhiResult<()> {
        if Faults::trip(&self.faults.submit) {
            return Err(RhiError::DeviceLost(format!("slot {slot} submit rejected")));
        }
        self.inner.submit(slot, commands)
    }
}

struct Harness {
    renderer: Renderer<Faulty>,
    gpu: HeadlessProbe,
    faults: Arc<Faults>,
    items: Vec<DrawItem>,
}

fn start(policy: FailurePolicy) -> Harness {
    let inner = HeadlessBackend::new(HeadlessConfig {
        gpu_latency: Duration::ZERO,
        ..Default::default()
    });
    let gpu = inner.probe();
    let faults = Arc::new(Faults::default());
    let backend = Faulty {
        inner,
        faults: Arc::clone(&faults),
    };
    let config = RendererConfig {
        failure_policy: policy,
        ..Default::default()
    };
    let renderer = match Renderer::new(backend, &config) {
        Ok(renderer) => renderer,
        Err(e) => panic!("Failed to create renderer: {e}"),
    };

    let mut scene = Scene::new();
    scene
        .add(SceneObject::primitive("box", PrimitiveType::Cube))
        .unwrap();
    scene.add(SceneObject::height_field("terrain", None)).unwrap();
    let mut assembler = DrawListAssembler::new(*renderer.descriptor_layout());
    let items = assembler.assemble(&scene).to_vec();

    Harness {
        renderer,
        gpu,
        faults,
        items,
    }
}

impl Harness {
    fn frame(&mut self) -> Result<PresentStatus, RendererError> {
        self.renderer.begin_frame()?;
        self.renderer.submit_draw_list(&self.items)?;
        self.renderer.end_frame(true)
    }

    fn run_clean_frames(&mut self, count: usize) {
        for i in 0..count {
            if let Err(e) = self.frame() {
                panic!("frame {i} after recovery failed: {e}");
            }
        }
        let violations = self.gpu.violations();
        assert!(violations.is_empty(), "validation violations: {violations:#?}");
    }

    fn presents(&self) -> usize {
        self.gpu
            .count(|e| matches!(e, HeadlessEvent::Present { .. }))
    }
}

#[test]
fn test_failed_submit_lenient_discards_frame_and_continues() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(2);
    let slot = h.renderer.frame_slot();
    let presents = h.presents();

    h.faults.submit.store(1, Ordering::SeqCst);
    assert_eq!(h.frame().unwrap(), PresentStatus::Presented);

    assert_eq!(h.renderer.slot_state(slot), SlotState::Idle);
    assert_eq!(h.renderer.frame_slot(), (slot + 1) % 3);
    assert_eq!(h.renderer.frames_submitted(), 2);
    assert_eq!(h.presents(), presents + 1);
    assert!(h.renderer.transitions().is_empty());
    for image in h.renderer.backbuffers() {
        assert_eq!(
            h.renderer.state_tracker().state(*image),
            Some(ResourceState::Present)
        );
    }

    h.run_clean_frames(6);
    assert_eq!(h.renderer.frames_submitted(), 8);
}

#[test]
fn test_failed_submit_strict_reports_and_continues() {
    let mut h = start(FailurePolicy::Strict);
    h.renderer.set_msaa(true, 4).unwrap();
    h.run_clean_frames(1);

    h.faults.submit.store(1, Ordering::SeqCst);
    let err = h.frame().unwrap_err();
    assert!(matches!(err, RendererError::Rhi(RhiError::DeviceLost(_))));
    assert!(!h.renderer.is_recording());

    // Rolled back to the resting state of the resolve path.
    let targets = h.renderer.msaa_targets().unwrap().clone();
    for color in &targets.colors {
        assert_eq!(
            h.renderer.state_tracker().state(*color),
            Some(ResourceState::RenderTarget)
        );
    }

    h.run_clean_frames(6);
    assert_eq!(h.renderer.msaa_state(), MsaaState::Enabled(SampleCount::X4));
}

#[test]
#[should_panic(expected = "submit rejected")]
fn test_failed_submit_trap_panics() {
    let mut h = start(FailurePolicy::Trap);
    h.faults.submit.store(1, Ordering::SeqCst);
    let _ = h.frame();
}

#[test]
fn test_lost_fence_signal_drains_queue() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(1);
    let slot = h.renderer.frame_slot();

    h.faults.signal.store(1, Ordering::SeqCst);
    h.gpu.clear_events();
    assert!(h.frame().is_ok());

    assert_eq!(h.renderer.slot_state(slot), SlotState::Submitted);
    assert_eq!(h.gpu.count(|e| matches!(e, HeadlessEvent::WaitIdle)), 1);
    assert_eq!(h.renderer.frames_submitted(), 2);

    // Wraps around to the slot whose signal was lost.
    h.run_clean_frames(6);
}

#[test]
fn test_out_of_date_acquire_leaves_slot_idle() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(1);
    let slot = h.renderer.frame_slot();

    h.faults.acquire.store(1, Ordering::SeqCst);
    let err = h.renderer.begin_frame().unwrap_err();
    assert!(err.is_surface_out_of_date());
    assert!(!h.renderer.is_recording());
    assert_eq!(h.renderer.slot_state(slot), SlotState::Idle);
    assert_eq!(h.renderer.frame_slot(), slot);

    h.run_clean_frames(4);
}

#[test]
fn test_failed_allocator_reset_acquires_nothing() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(3);
    let slot = h.renderer.frame_slot();

    h.faults.reset_allocator.store(1, Ordering::SeqCst);
    h.gpu.clear_events();
    assert!(h.renderer.begin_frame().is_err());

    assert_eq!(h.gpu.count(|e| matches!(e, HeadlessEvent::Acquire { .. })), 0);
    assert_eq!(h.renderer.slot_state(slot), SlotState::Idle);
    assert!(!h.renderer.is_recording());

    h.run_clean_frames(4);
}

#[test]
fn test_failed_resize_then_retry() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(2);
    let old_depth = h.renderer.depth_buffer().unwrap();

    h.faults.resize.store(1, Ordering::SeqCst);
    assert!(h.renderer.on_resize(800, 600).is_err());
    assert_eq!(h.renderer.depth_buffer(), None);
    assert!(h.gpu.image(old_depth).is_none());
    assert!(h.renderer.begin_frame().unwrap_err().is_surface_out_of_date());

    assert!(h.renderer.on_resize(800, 600).unwrap());
    let depth = h.renderer.depth_buffer().unwrap();
    assert_eq!(
        h.gpu.image(depth).unwrap().desc.extent,
        Extent2D::new(800, 600)
    );
    h.run_clean_frames(4);
}

#[test]
fn test_shutdown_after_failed_resize() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(1);

    h.faults.resize.store(1, Ordering::SeqCst);
    assert!(h.renderer.on_resize(1024, 768).is_err());
    h.renderer.shutdown().unwrap();

    assert!(h.gpu.live_images().iter().all(|(_, image)| image.backbuffer));
    let violations = h.gpu.violations();
    assert!(violations.is_empty(), "validation violations: {violations:#?}");
}

#[test]
fn test_failed_msaa_allocation_falls_back_to_direct() {
    let mut h = start(FailurePolicy::Lenient);
    h.run_clean_frames(1);
    let live = h.gpu.live_images().len();

    h.faults.fail_image(Some("msaa depth"));
    assert!(h.renderer.set_msaa(true, 4).is_err());

    assert_eq!(h.renderer.msaa_state(), MsaaState::Disabled);
    assert!(h.renderer.msaa_targets().is_none());
    assert_eq!(h.gpu.live_images().len(), live);
    assert!(
        h.gpu
            .live_images()
            .iter()
            .all(|(_, image)| !image.desc.samples.is_multisampled())
    );
    h.run_clean_frames(3);

    h.faults.fail_image(None);
    h.renderer.set_msaa(true, 4).unwrap();
    assert!(h.renderer.msaa_state().is_enabled());
    h.run_clean_frames(3);
}
