//! Presentable images, the depth buffer and the viewport that covers them.

use tracing::{debug, info};

use vista_rhi::{
    Backend, Extent2D, ImageDesc, ImageHandle, ResourceState, SampleCount, ScissorRect, Viewport,
};

use crate::error::RendererResult;
use crate::fence::FrameFences;
use crate::msaa::MsaaManager;
use crate::state::{FrameTarget, ResourceStateTracker};

/// Owns the single-sampled per-frame targets sized to the surface.
#[derive(Debug)]
pub struct SurfaceManager {
    backbuffers: Vec<ImageHandle>,
    /// Missing only after a failed recreate.
    depth: Option<ImageHandle>,
    extent: Extent2D,
    viewport: Viewport,
    scissor: ScissorRect,
}

impl SurfaceManager {
    /// Adopt the backend's presentable images and create a matching depth buffer.
    pub fn new<B: Backend>(
        backend: &mut B,
        tracker: &mut ResourceStateTracker,
    ) -> RendererResult<Self> {
        let extent = backend.surface_extent();
        let backbuffers = backend.backbuffers();
        for image in &backbuffers {
            tracker.track(*image, FrameTarget::Backbuffer, ResourceState::Present);
        }
        let depth = create_depth(backend, tracker, extent)?;

        info!(
            "Surface ready: {} presentable images at {}",
            backbuffers.len(),
            extent
        );
        Ok(Self {
            backbuffers,
            depth: Some(depth),
            extent,
            viewport: Viewport::full(extent),
            scissor: ScissorRect::full(extent),
        })
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    #[inline]
    pub fn depth(&self) -> Option<ImageHandle> {
        self.depth
    }

    pub fn backbuffers(&self) -> &[ImageHandle] {
        &self.backbuffers
    }

    /// Recreate every size-dependent target.
    ///
    /// Drains the GPU exactly once, then releases and recreates the presentable
    /// images, the depth buffer and, when enabled, the MSAA targets. Returns
    /// false without doing anything for a zero-sized request.
    ///
    /// On failure the surface is left without presentable images or depth
    /// buffer, and a later call starts over from there.
    pub fn recreate<B: Backend>(
        &mut self,
        backend: &mut B,
        fences: &mut FrameFences,
        tracker: &mut ResourceStateTracker,
        msaa: &mut MsaaManager,
        width: u32,
        height: u32,
    ) -> RendererResult<bool> {
        let extent = Extent2D::new(width, height);
        if extent.is_empty() {
            debug!("Ignoring resize to {}", extent);
            return Ok(false);
        }

        fences.wait_for_all(backend)?;

        for image in self.backbuffers.drain(..) {
            tracker.forget(image);
        }
        backend.release_backbuffers();
        self.destroy_depth(backend, tracker);

        self.backbuffers = backend.resize_surface(extent)?;
        for image in &self.backbuffers {
            tracker.track(*image, FrameTarget::Backbuffer, ResourceState::Present);
        }
        self.extent = backend.surface_extent();
        self.depth = Some(create_depth(backend, tracker, self.extent)?);
        self.viewport = Viewport::full(self.extent);
        self.scissor = ScissorRect::full(self.extent);

        msaa.resize(backend, tracker, fences.frame_count(), self.extent)?;

        info!("Surface recreated at {}", self.extent);
        Ok(true)
    }

    /// Destroy the depth buffer. Presentable images stay with the backend.
    pub fn release<B: Backend>(&mut self, backend: &mut B, tracker: &mut ResourceStateTracker) {
        for image in &self.backbuffers {
            tracker.forget(*image);
        }
        self.destroy_depth(backend, tracker);
        debug!("Surface targets released");
    }

    fn destroy_depth<B: Backend>(&mut self, backend: &mut B, tracker: &mut ResourceStateTracker) {
        if let Some(depth) = self.depth.take() {
            tracker.forget(depth);
            backend.destroy_image(depth);
        }
    }
}

fn create_depth<B: Backend>(
    backend: &mut B,
    tracker: &mut ResourceStateTracker,
    extent: Extent2D,
) -> RendererResult<ImageHandle> {
    let desc = ImageDesc::depth("depth buffer", extent, SampleCount::X1);
    let depth = backend.create_image(&desc)?;
    tracker.track(depth, FrameTarget::Depth, desc.initial_state);
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig, HeadlessEvent};
    use vista_rhi::SampleCountSet;

    use crate::msaa::MsaaState;

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::ZERO,
            ..Default::default()
        })
    }

    #[test]
    fn test_initial_targets_tracked() {
        let mut backend = backend();
        let mut tracker = ResourceStateTracker::new();
        let surface = SurfaceManager::new(&mut backend, &mut tracker).unwrap();

        assert_eq!(surface.backbuffers().len(), 3);
        assert_eq!(tracker.tracked_count(), 4);
        assert_eq!(
            tracker.state(surface.depth().unwrap()),
            Some(ResourceState::DepthWrite)
        );
        assert_eq!(surface.viewport().width, 1280.0);
    }

    #[test]
    fn test_recreate_waits_once_and_rebuilds_msaa() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut tracker = ResourceStateTracker::new();
        let mut fences = FrameFences::new(3);
        let mut msaa = MsaaManager::new(SampleCountSet::all());
        let mut surface = SurfaceManager::new(&mut backend, &mut tracker).unwrap();
        msaa.recreate(
            &mut backend,
            &mut tracker,
            MsaaState::Enabled(SampleCount::X4),
            3,
            surface.extent(),
        )
        .unwrap();
        let old_depth = surface.depth().unwrap();

        assert!(
            surface
                .recreate(&mut backend, &mut fences, &mut tracker, &mut msaa, 1920, 1080)
                .unwrap()
        );

        assert_eq!(fences.full_wait_count(), 1);
        assert_eq!(probe.count(|e| matches!(e, HeadlessEvent::Wait { .. })), 1);
        assert_ne!(surface.depth(), Some(old_depth));
        assert!(probe.image(old_depth).is_none());
        assert_eq!(
            probe.image(surface.depth().unwrap()).unwrap().desc.extent,
            Extent2D::new(1920, 1080)
        );
        assert_eq!(msaa.targets().unwrap().extent, Extent2D::new(1920, 1080));
        assert_eq!(surface.scissor(), ScissorRect::full(Extent2D::new(1920, 1080)));
        assert!(probe.violations().is_empty(), "{:?}", probe.violations());
    }

    #[test]
    fn test_zero_size_ignored() {
        let mut backend = backend();
        let mut tracker = ResourceStateTracker::new();
        let mut fences = FrameFences::new(2);
        let mut msaa = MsaaManager::new(SampleCountSet::single());
        let mut surface = SurfaceManager::new(&mut backend, &mut tracker).unwrap();

        assert!(
            !surface
                .recreate(&mut backend, &mut fences, &mut tracker, &mut msaa, 0, 720)
                .unwrap()
        );
        assert_eq!(fences.full_wait_count(), 0);
        assert_eq!(surface.extent(), Extent2D::new(1280, 720));
    }
}
