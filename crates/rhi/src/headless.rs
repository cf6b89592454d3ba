//! A backend without a GPU.
//!
//! # Overview
//!
//! [`HeadlessBackend`] runs the renderer's frame loop against a simulated GPU
//! timeline. Submissions and fence signals are queued to a worker thread that
//! processes them in order after a configurable latency, so the CPU really
//! does run ahead of the "GPU" and really does block on the fence.
//!
//! Every submitted command list is checked against the tracked state of each
//! image, the way a validation layer would: barriers must start from the state
//! the image is actually in, clears and draws need bound targets, resolves need
//! a multisampled source and a single-sampled destination, and a slot's command
//! allocator must not be reset while its last submission is still in flight.
//! Problems are collected as violations instead of failing the call.
//!
//! A [`HeadlessProbe`] shares the backend's log so tests can inspect events,
//! violations, live images, descriptor heap entries and constant buffers after
//! the backend has been moved into a renderer.
//!
//! # Example
//!
//! ```no_run
//! use vista_rhi::headless::{HeadlessBackend, HeadlessConfig};
//! use vista_rhi::Backend;
//!
//! let backend = HeadlessBackend::new(HeadlessConfig::default());
//! let probe = backend.probe();
//! assert_eq!(backend.completed_fence_value(), 0);
//! assert!(probe.violations().is_empty());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::command_list::{Command, CommandList};
use crate::error::{RhiError, RhiResult};
use crate::heap::{DescriptorView, HeapBinding, HeapLayout};
use crate::types::{
    AcquiredImage, BufferHandle, Extent2D, ImageDesc, ImageHandle, ImageUsage, MeshHandle,
    PipelineDesc, PipelineHandle, PresentStatus, ResourceState, SampleCount, SampleCountSet,
};
use crate::vertex::Vertex;

/// Settings for the simulated device.
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    /// Initial surface size.
    pub extent: Extent2D,
    /// Number of presentable images.
    pub backbuffer_count: usize,
    /// Sample counts the simulated device reports.
    pub supported_samples: SampleCountSet,
    /// Time the simulated GPU spends on each submission.
    pub gpu_latency: Duration,
    /// `(shader, samples)` pairs whose pipeline creation fails.
    pub failing_pipelines: Vec<(String, SampleCount)>,
    /// Most images, presentable ones excluded, that may be alive at once.
    /// Creating one more fails as out of device memory.
    pub image_budget: Option<usize>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            extent: Extent2D::new(1280, 720),
            backbuffer_count: 3,
            supported_samples: SampleCountSet::all(),
            gpu_latency: Duration::from_millis(1),
            failing_pipelines: Vec::new(),
            image_budget: None,
        }
    }
}

/// Something the backend was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessEvent {
    ResetAllocator { slot: usize },
    Submit { slot: usize, commands: Vec<Command> },
    Signal { value: u64 },
    /// A fence wait; `blocked` is false when the value had already completed.
    Wait { value: u64, blocked: bool },
    WaitIdle,
    Acquire { slot: usize, image_index: usize },
    Present { slot: usize, image_index: usize, vsync: bool },
    ReleaseBackbuffers,
    ResizeSurface { extent: Extent2D },
    CreateImage { image: ImageHandle, desc: ImageDesc },
    DestroyImage { image: ImageHandle },
    WriteDescriptor { index: u32, view: DescriptorView },
    CreatePipeline { desc: PipelineDesc, created: bool },
    WriteBuffer { buffer: BufferHandle, offset: u64, len: usize },
}

/// A live image and the state the simulated GPU believes it is in.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessImage {
    pub desc: ImageDesc,
    pub state: ResourceState,
    pub backbuffer: bool,
}

#[derive(Default)]
struct HeadlessLog {
    events: Vec<HeadlessEvent>,
    violations: Vec<String>,
    images: BTreeMap<ImageHandle, HeadlessImage>,
    heap: Vec<Option<DescriptorView>>,
    heap_layout: Option<HeapLayout>,
    buffers: Vec<Vec<u8>>,
    meshes: Vec<(usize, usize)>,
    pipelines: Vec<PipelineDesc>,
}

impl HeadlessLog {
    fn violation(&mut self, message: String) {
        warn!("headless validation: {}", message);
        self.violations.push(message);
    }
}

struct Timeline {
    completed: Mutex<u64>,
    signaled: Condvar,
}

impl Timeline {
    fn completed(&self) -> MutexGuard<'_, u64> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Job {
    Execute,
    Signal(u64),
    Idle(Sender<()>),
}

fn run_timeline(jobs: Receiver<Job>, timeline: Arc<Timeline>, latency: Duration) {
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Execute => {
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
            }
            Job::Signal(value) => {
                let mut completed = timeline.completed();
                *completed = (*completed).max(value);
                timeline.signaled.notify_all();
            }
            Job::Idle(reply) => {
                let _ = reply.send(());
            }
        }
    }
    debug!("Headless timeline stopped");
}

/// Read access to a headless backend's log, usable after the backend moved.
#[derive(Clone)]
pub struct HeadlessProbe {
    log: Arc<Mutex<HeadlessLog>>,
    timeline: Arc<Timeline>,
}

impl HeadlessProbe {
    fn log(&self) -> MutexGuard<'_, HeadlessLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<HeadlessEvent> {
        self.log().events.clone()
    }

    /// Forget recorded events; state and violations are kept.
    pub fn clear_events(&self) {
        self.log().events.clear();
    }

    /// Count events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&HeadlessEvent) -> bool) -> usize {
        self.log().events.iter().filter(|e| predicate(e)).count()
    }

    pub fn violations(&self) -> Vec<String> {
        self.log().violations.clone()
    }

    /// Every submission as `(slot, commands)`, oldest first.
    pub fn submissions(&self) -> Vec<(usize, Vec<Command>)> {
        self.log()
            .events
            .iter()
            .filter_map(|e| match e {
                HeadlessEvent::Submit { slot, commands } => Some((*slot, commands.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn image(&self, image: ImageHandle) -> Option<HeadlessImage> {
        self.log().images.get(&image).cloned()
    }

    pub fn live_images(&self) -> Vec<(ImageHandle, HeadlessImage)> {
        self.log()
            .images
            .iter()
            .map(|(handle, image)| (*handle, image.clone()))
            .collect()
    }

    pub fn descriptor(&self, index: u32) -> Option<DescriptorView> {
        self.log().heap.get(index as usize).copied().flatten()
    }

    /// Number of populated heap entries.
    pub fn populated_descriptors(&self) -> usize {
        self.log().heap.iter().filter(|d| d.is_some()).count()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.log().buffers.get(buffer.index()).cloned()
    }

    pub fn pipelines(&self) -> Vec<PipelineDesc> {
        self.log().pipelines.clone()
    }

    pub fn mesh_sizes(&self, mesh: MeshHandle) -> Option<(usize, usize)> {
        self.log().meshes.get(mesh.index()).copied()
    }

    pub fn completed_fence_value(&self) -> u64 {
        *self.timeline.completed()
    }
}

/// Simulated GPU backend.
pub struct HeadlessBackend {
    config: HeadlessConfig,
    log: Arc<Mutex<HeadlessLog>>,
    timeline: Arc<Timeline>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    extent: Extent2D,
    backbuffers: Vec<ImageHandle>,
    next_backbuffer: usize,
    next_image_id: u32,
    /// Slots submitted since the last signal.
    unsignaled_slots: Vec<usize>,
    /// Fence value that retires each slot's latest submission.
    slot_retire_values: HashMap<usize, u64>,
    last_signaled: u64,
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> Self {
        let timeline = Arc::new(Timeline {
            completed: Mutex::new(0),
            signaled: Condvar::new(),
        });

        let (sender, receiver) = mpsc::channel();
        let worker_timeline = Arc::clone(&timeline);
        let latency = config.gpu_latency;
        let worker = thread::Builder::new()
            .name("headless-gpu".to_string())
            .spawn(move || run_timeline(receiver, worker_timeline, latency))
            .ok();

        if worker.is_none() {
            warn!("Failed to spawn the headless timeline thread; submissions will never complete");
        }

        let mut backend = Self {
            extent: config.extent,
            config,
            log: Arc::new(Mutex::new(HeadlessLog::default())),
            timeline,
            jobs: Some(sender),
            worker,
            backbuffers: Vec::new(),
            next_backbuffer: 0,
            next_image_id: 0,
            unsignaled_slots: Vec::new(),
            slot_retire_values: HashMap::new(),
            last_signaled: 0,
        };
        backend.backbuffers = backend.create_backbuffers(backend.extent);

        info!(
            "Headless backend created: {} surface, {} backbuffers, samples up to {}",
            backend.extent,
            backend.config.backbuffer_count,
            backend.config.supported_samples.highest()
        );

        backend
    }

    /// A handle onto the shared log.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            log: Arc::clone(&self.log),
            timeline: Arc::clone(&self.timeline),
        }
    }

    fn log(&self) -> MutexGuard<'_, HeadlessLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, job: Job) -> RhiResult<()> {
        self.jobs
            .as_ref()
            .ok_or_else(|| RhiError::DeviceLost("headless timeline shut down".to_string()))?
            .send(job)
            .map_err(|_| RhiError::DeviceLost("headless timeline stopped".to_string()))
    }

    fn allocate_image_id(&mut self) -> ImageHandle {
        let handle = ImageHandle(self.next_image_id);
        self.next_image_id += 1;
        handle
    }

    fn create_backbuffers(&mut self, extent: Extent2D) -> Vec<ImageHandle> {
        let mut handles = Vec::with_capacity(self.config.backbuffer_count);
        for i in 0..self.config.backbuffer_count {
            let handle = self.allocate_image_id();
            let desc = ImageDesc {
                initial_state: ResourceState::Present,
                ..ImageDesc::render_target(format!("backbuffer {i}"), extent, SampleCount::X1)
            };
            self.log().images.insert(
                handle,
                HeadlessImage {
                    desc,
                    state: ResourceState::Present,
                    backbuffer: true,
                },
            );
            handles.push(handle);
        }
        self.next_backbuffer = 0;
        handles
    }

    fn insert_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle> {
        if desc.extent.is_empty() {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' has an empty extent",
                desc.label
            )));
        }
        if !self.config.supported_samples.contains(desc.samples) {
            return Err(RhiError::Unsupported(format!(
                "{} samples for image '{}'",
                desc.samples, desc.label
            )));
        }

        if let Some(budget) = self.config.image_budget {
            let live = self.log().images.values().filter(|i| !i.backbuffer).count();
            if live >= budget {
                warn!("Image '{}' exceeds the budget of {} images", desc.label, budget);
                return Err(RhiError::VulkanError(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
        }

        let handle = self.allocate_image_id();
        let mut log = self.log();
        log.images.insert(
            handle,
            HeadlessImage {
                desc: desc.clone(),
                state: desc.initial_state,
                backbuffer: false,
            },
        );
        log.events.push(HeadlessEvent::CreateImage {
            image: handle,
            desc: desc.clone(),
        });
        debug!("Created headless image {} '{}'", handle, desc.label);
        Ok(handle)
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn supported_sample_counts(&self) -> SampleCountSet {
        self.config.supported_samples
    }

    fn completed_fence_value(&self) -> u64 {
        *self.timeline.completed()
    }

    fn signal_fence(&mut self, value: u64) -> RhiResult<()> {
        if value < self.last_signaled {
            self.log().violation(format!(
                "fence signal {} is below the previous signal {}",
                value, self.last_signaled
            ));
        }
        self.send(Job::Signal(value))?;
        self.last_signaled = value;
        for slot in self.unsignaled_slots.drain(..) {
            self.slot_retire_values.insert(slot, value);
        }
        self.log().events.push(HeadlessEvent::Signal { value });
        Ok(())
    }

    fn wait_fence(&self, value: u64) -> RhiResult<()> {
        if value > self.last_signaled {
            return Err(RhiError::DeviceLost(format!(
                "waiting for fence value {} that was never signaled (last {})",
                value, self.last_signaled
            )));
        }

        let mut completed = self.timeline.completed();
        let blocked = *completed < value;
        while *completed < value {
            completed = self
                .timeline
                .signaled
                .wait(completed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(completed);

        self.log().events.push(HeadlessEvent::Wait { value, blocked });
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        let (reply, done) = mpsc::channel();
        self.send(Job::Idle(reply))?;
        done.recv()
            .map_err(|_| RhiError::DeviceLost("headless timeline stopped".to_string()))?;
        // Nothing is in flight on an empty queue, signaled or not.
        self.unsignaled_slots.clear();
        self.log().events.push(HeadlessEvent::WaitIdle);
        Ok(())
    }

    fn surface_extent(&self) -> Extent2D {
        self.extent
    }

    fn backbuffers(&self) -> Vec<ImageHandle> {
        self.backbuffers.clone()
    }

    fn acquire_backbuffer(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        if self.backbuffers.is_empty() {
            return Err(RhiError::SurfaceOutOfDate);
        }

        let index = self.next_backbuffer;
        self.next_backbuffer = (index + 1) % self.backbuffers.len();
        self.log().events.push(HeadlessEvent::Acquire {
            slot,
            image_index: index,
        });

        Ok(AcquiredImage {
            index,
            image: self.backbuffers[index],
        })
    }

    fn present(&mut self, slot: usize, image_index: usize, vsync: bool) -> RhiResult<PresentStatus> {
        let image = *self.backbuffers.get(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no presentable image {image_index}"))
        })?;

        let mut log = self.log();
        let state = log.images.get(&image).map(|i| i.state);
        if state != Some(ResourceState::Present) {
            log.violation(format!(
                "presenting {} while it is in state {:?}",
                image, state
            ));
        }
        log.events.push(HeadlessEvent::Present {
            slot,
            image_index,
            vsync,
        });
        Ok(PresentStatus::Presented)
    }

    fn release_backbuffers(&mut self) {
        let mut log = self.log();
        for image in &self.backbuffers {
            log.images.remove(image);
        }
        log.events.push(HeadlessEvent::ReleaseBackbuffers);
        drop(log);
        self.backbuffers.clear();
    }

    fn resize_surface(&mut self, extent: Extent2D) -> RhiResult<Vec<ImageHandle>> {
        if !self.backbuffers.is_empty() {
            self.log()
                .violation("surface resized while its images are still referenced".to_string());
            self.release_backbuffers();
        }
        if self.completed_fence_value() < self.last_signaled {
            self.log()
                .violation("surface resized while the GPU is still busy".to_string());
        }

        self.extent = extent;
        self.backbuffers = self.create_backbuffers(extent);
        self.log().events.push(HeadlessEvent::ResizeSurface { extent });
        info!("Headless surface resized to {}", extent);
        Ok(self.backbuffers.clone())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle> {
        if desc.usage == ImageUsage::Texture {
            return Err(RhiError::InvalidHandle(format!(
                "texture '{}' must be created with pixels",
                desc.label
            )));
        }
        self.insert_image(desc)
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
        self.insert_image(desc)
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        let mut log = self.log();
        match log.images.get(&image) {
            Some(existing) if existing.backbuffer => {
                log.violation(format!("destroying presentable image {image}"));
            }
            Some(_) => {
                log.images.remove(&image);
                log.events.push(HeadlessEvent::DestroyImage { image });
            }
            None => log.violation(format!("destroying unknown image {image}")),
        }
    }

    fn create_constant_buffer(&mut self, label: &str, size: u64) -> RhiResult<BufferHandle> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "constant buffer '{label}' has zero size"
            )));
        }
        let mut log = self.log();
        log.buffers.push(vec![0; size as usize]);
        let handle = BufferHandle((log.buffers.len() - 1) as u32);
        debug!("Created headless constant buffer {} '{}' ({} bytes)", handle, label, size);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut log = self.log();
        let contents = log
            .buffers
            .get_mut(buffer.index())
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown {buffer}")))?;

        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes at {} exceeds {} ({} bytes)",
                data.len(),
                offset,
                buffer,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        log.events.push(HeadlessEvent::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
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
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RhiError::InvalidHandle(format!(
                "mesh '{label}' index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }

        let mut log = self.log();
        log.meshes.push((vertices.len(), indices.len()));
        Ok(MeshHandle((log.meshes.len() - 1) as u32))
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> RhiResult<PipelineHandle> {
        let rejected = !self.config.supported_samples.contains(desc.samples)
            || self
                .config
                .failing_pipelines
                .iter()
                .any(|(shader, samples)| *shader == desc.shader && *samples == desc.samples);

        let mut log = self.log();
        log.events.push(HeadlessEvent::CreatePipeline {
            desc: desc.clone(),
            created: !rejected,
        });
        if rejected {
            return Err(RhiError::PipelineError(format!(
                "pipeline '{}' rejected at {}",
                desc.label, desc.samples
            )));
        }

        log.pipelines.push(desc.clone());
        Ok(PipelineHandle((log.pipelines.len() - 1) as u32))
    }

    fn create_descriptor_heap(&mut self, layout: HeapLayout) -> RhiResult<()> {
        let mut log = self.log();
        if log.heap_layout.is_some() {
            return Err(RhiError::InvalidHandle(
                "descriptor heap already created".to_string(),
            ));
        }
        log.heap = vec![None; layout.len() as usize];
        log.heap_layout = Some(layout);
        Ok(())
    }

    fn write_descriptor(&mut self, index: u32, view: DescriptorView) -> RhiResult<()> {
        let mut log = self.log();
        let layout = log
            .heap_layout
            .ok_or_else(|| RhiError::InvalidHandle("descriptor heap not created".to_string()))?;

        let binding = layout.classify(index).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "descriptor index {} outside heap of {}",
                index,
                layout.len()
            ))
        })?;

        let matches_binding = match (binding, view) {
            (HeapBinding::Texture { .. }, DescriptorView::Texture(image)) => {
                log.images.contains_key(&image)
            }
            (
                HeapBinding::FrameConstants { .. } | HeapBinding::SceneConstants,
                DescriptorView::Constants { buffer, .. },
            ) => buffer.index() < log.buffers.len(),
            _ => false,
        };
        if !matches_binding {
            return Err(RhiError::InvalidHandle(format!(
                "descriptor {view:?} does not fit heap index {index} ({binding:?})"
            )));
        }

        log.heap[index as usize] = Some(view);
        log.events.push(HeadlessEvent::WriteDescriptor { index, view });
        Ok(())
    }

    fn reset_command_allocator(&mut self, slot: usize) -> RhiResult<()> {
        let completed = self.completed_fence_value();
        let in_flight = self.unsignaled_slots.contains(&slot)
            || self
                .slot_retire_values
                .get(&slot)
                .is_some_and(|&value| completed < value);

        let mut log = self.log();
        if in_flight {
            log.violation(format!(
                "command allocator of slot {slot} reset while its work is in flight (completed {completed})"
            ));
        }
        log.events.push(HeadlessEvent::ResetAllocator { slot });
        Ok(())
    }

    fn submit(&mut self, slot: usize, commands: &CommandList) -> RhiResult<()> {
        if !commands.is_closed() {
            return Err(RhiError::InvalidHandle(format!(
                "command list for slot {slot} submitted while still open"
            )));
        }

        {
            let mut log = self.log();
            validate_commands(&mut log, slot, commands.commands());
            log.events.push(HeadlessEvent::Submit {
                slot,
                commands: commands.commands().to_vec(),
            });
        }

        self.send(Job::Execute)?;
        self.unsignaled_slots.push(slot);
        Ok(())
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        // Closing the channel stops the worker once queued jobs are drained.
        self.jobs = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Headless timeline thread panicked");
        }
        debug!("Headless backend destroyed");
    }
}

/// Replay a command list against tracked image states.
fn validate_commands(log: &mut HeadlessLog, slot: usize, commands: &[Command]) {
    let mut pipeline: Option<PipelineHandle> = None;
    let mut targets: Option<(ImageHandle, Option<ImageHandle>)> = None;

    for (position, command) in commands.iter().enumerate() {
        match *command {
            Command::SetPipeline(handle) => {
                if handle.index() >= log.pipelines.len() {
                    log.violation(format!("#{position}: unknown {handle}"));
                }
                pipeline = Some(handle);
            }
            Command::BindDescriptorTable { slot: table } => {
                if table != slot {
                    log.violation(format!(
                        "#{position}: slot {slot} binds the descriptor table of slot {table}"
                    ));
                }
            }
            Command::SetViewport(_) | Command::SetScissor(_) => {}
            Command::Barrier {
                image,
                before,
                after,
            } => {
                if before == after {
                    log.violation(format!("#{position}: redundant barrier on {image} ({before})"));
                }
                match log.images.get_mut(&image) {
                    Some(tracked) => {
                        let actual = tracked.state;
                        tracked.state = after;
                        if actual != before {
                            log.violation(format!(
                                "#{position}: barrier on {image} expects {before} but it is {actual}"
                            ));
                        }
                    }
                    None => log.violation(format!("#{position}: barrier on unknown {image}")),
                }
            }
            Command::SetRenderTargets { color, depth } => {
                expect_state(log, position, color, ResourceState::RenderTarget);
                if let Some(depth) = depth {
                    expect_state(log, position, depth, ResourceState::DepthWrite);
                    let color_samples = log.images.get(&color).map(|i| i.desc.samples);
                    let depth_samples = log.images.get(&depth).map(|i| i.desc.samples);
                    if color_samples != depth_samples {
                        log.violation(format!(
                            "#{position}: {color} and {depth} have different sample counts"
                        ));
                    }
                }
                targets = Some((color, depth));
            }
            Command::ClearRenderTarget { image, .. } => {
                if targets.map(|(color, _)| color) != Some(image) {
                    log.violation(format!("#{position}: clearing {image} which is not bound"));
                }
                expect_state(log, position, image, ResourceState::RenderTarget);
            }
            Command::ClearDepth { image, .. } => {
                if targets.and_then(|(_, depth)| depth) != Some(image) {
                    log.violation(format!("#{position}: clearing depth {image} which is not bound"));
                }
                expect_state(log, position, image, ResourceState::DepthWrite);
            }
            Command::Draw { mesh, .. } => {
                if pipeline.is_none() {
                    log.violation(format!("#{position}: draw without a pipeline"));
                }
                if mesh.index() >= log.meshes.len() {
                    log.violation(format!("#{position}: draw of unknown {mesh}"));
                }
                match targets {
                    Some((color, _)) => {
                        expect_state(log, position, color, ResourceState::RenderTarget);
                        if let Some(handle) = pipeline
                            && let Some(desc) = log.pipelines.get(handle.index())
                            && log.images.get(&color).map(|i| i.desc.samples) != Some(desc.samples)
                        {
                            log.violation(format!(
                                "#{position}: pipeline sample count does not match {color}"
                            ));
                        }
                    }
                    None => log.violation(format!("#{position}: draw without render targets")),
                }
            }
            Command::Resolve {
                source,
                destination,
            } => {
                expect_state(log, position, source, ResourceState::ResolveSource);
                expect_state(log, position, destination, ResourceState::ResolveDest);
                let source_desc = log.images.get(&source).map(|i| (i.desc.samples, i.desc.extent));
                let dest_desc = log
                    .images
                    .get(&destination)
                    .map(|i| (i.desc.samples, i.desc.extent));
                if let (Some((src_samples, src_extent)), Some((dst_samples, dst_extent))) =
                    (source_desc, dest_desc)
                    && (!src_samples.is_multisampled()
                        || dst_samples.is_multisampled()
                        || src_extent != dst_extent)
                {
                    log.violation(format!(
                        "#{position}: cannot resolve {source} ({src_samples}, {src_extent}) into {destination} ({dst_samples}, {dst_extent})"
                    ));
                }
            }
        }
    }
}

fn expect_state(log: &mut HeadlessLog, position: usize, image: ImageHandle, expected: ResourceState) {
    match log.images.get(&image).map(|i| i.state) {
        Some(actual) if actual == expected => {}
        Some(actual) => log.violation(format!(
            "#{position}: {image} used as {expected} while it is {actual}"
        )),
        None => log.violation(format!("#{position}: use of unknown {image}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> HeadlessConfig {
        HeadlessConfig {
            gpu_latency: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_fence_completes_after_signal() {
        let mut backend = HeadlessBackend::new(quiet_config());
        backend.signal_fence(1).unwrap();
        backend.wait_fence(1).unwrap();
        assert_eq!(backend.completed_fence_value(), 1);
    }

    #[test]
    fn test_waiting_for_unsignaled_value_fails() {
        let backend = HeadlessBackend::new(quiet_config());
        assert!(matches!(
            backend.wait_fence(5),
            Err(RhiError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_backbuffers_rotate() {
        let mut backend = HeadlessBackend::new(quiet_config());
        let indices: Vec<usize> = (0..4)
            .map(|slot| backend.acquire_backbuffer(slot % 3).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_barrier_from_wrong_state_is_a_violation() {
        let mut backend = HeadlessBackend::new(quiet_config());
        let probe = backend.probe();
        let image = backend.backbuffers()[0];

        let mut list = CommandList::new();
        list.push(Command::Barrier {
            image,
            before: ResourceState::RenderTarget,
            after: ResourceState::Present,
        })
        .unwrap();
        list.close();
        backend.submit(0, &list).unwrap();

        let violations = probe.violations();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("expects render-target"));
    }

    #[test]
    fn test_open_list_cannot_be_submitted() {
        let mut backend = HeadlessBackend::new(quiet_config());
        let list = CommandList::new();
        assert!(backend.submit(0, &list).is_err());
    }

    #[test]
    fn test_reset_of_in_flight_slot_is_a_violation() {
        let mut backend = HeadlessBackend::new(quiet_config());
        let probe = backend.probe();

        let mut list = CommandList::new();
        list.close();
        backend.submit(0, &list).unwrap();
        backend.reset_command_allocator(0).unwrap();
        assert_eq!(probe.violations().len(), 1);

        backend.signal_fence(1).unwrap();
        backend.wait_fence(1).unwrap();
        backend.reset_command_allocator(0).unwrap();
        assert_eq!(probe.violations().len(), 1);
    }

    #[test]
    fn test_wait_idle_settles_unsignaled_submissions() {
        let mut backend = HeadlessBackend::new(quiet_config());
        let gpu = backend.probe();

        let mut list = CommandList::new();
        list.close();
        backend.submit(1, &list).unwrap();
        backend.wait_idle().unwrap();
        backend.reset_command_allocator(1).unwrap();
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn test_image_budget_excludes_backbuffers() {
        let mut backend = HeadlessBackend::new(HeadlessConfig {
            image_budget: Some(1),
            ..quiet_config()
        });
        let extent = backend.surface_extent();
        let depth = backend
            .create_image(&ImageDesc::depth("depth", extent, SampleCount::X1))
            .unwrap();
        assert!(matches!(
            backend.create_image(&ImageDesc::depth("second", extent, SampleCount::X1)),
            Err(RhiError::VulkanError(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));

        backend.destroy_image(depth);
        assert!(
            backend
                .create_image(&ImageDesc::depth("again", extent, SampleCount::X1))
                .is_ok()
        );
    }

    #[test]
    fn test_unsupported_samples_rejected() {
        let mut backend = HeadlessBackend::new(HeadlessConfig {
            supported_samples: SampleCountSet::from_counts([SampleCount::X4]),
            ..quiet_config()
        });
        let extent = backend.surface_extent();
        assert!(
            backend
                .create_image(&ImageDesc::render_target("msaa", extent, SampleCount::X8))
                .is_err()
        );
        assert!(
            backend
                .create_image(&ImageDesc::render_target("msaa", extent, SampleCount::X4))
                .is_ok()
        );
    }

    #[test]
    fn test_descriptor_kinds_checked() {
        let mut backend = HeadlessBackend::new(quiet_config());
        backend
            .create_descriptor_heap(HeapLayout {
                frame_slots: 3,
                texture_capacity: 2,
            })
            .unwrap();
        let buffer = backend.create_constant_buffer("frame", 256).unwrap();
        let texture = backend
            .create_texture(&ImageDesc::texture("tex", Extent2D::new(1, 1)), &[0; 4])
            .unwrap();

        let constants = DescriptorView::Constants { buffer, size: 256 };
        backend.write_descriptor(0, constants).unwrap();
        backend
            .write_descriptor(4, DescriptorView::Texture(texture))
            .unwrap();
        assert!(backend.write_descriptor(4, constants).is_err());
        assert!(backend.write_descriptor(6, DescriptorView::Texture(texture)).is_err());
    }
}
