//! Multisampled auxiliary targets.
//!
//! When multisampling is on, each frame slot draws into its own multisampled
//! color target and all slots share one multisampled depth buffer; the color
//! target is resolved into the presentable image at the end of the frame.
//! Targets are never resized: any change releases them all and allocates a
//! fresh set at the current surface size.

use tracing::{debug, info, warn};

use vista_rhi::{
    Backend, Extent2D, ImageDesc, ImageHandle, ResourceState, SampleCount, SampleCountSet,
};

use crate::error::{RendererError, RendererResult};
use crate::state::{FrameTarget, ResourceStateTracker};

/// Color every frame's render target is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.2, 0.4, 1.0];
/// Depth every frame's depth buffer is cleared to.
pub const DEPTH_CLEAR: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsaaState {
    #[default]
    Disabled,
    Enabled(SampleCount),
}

impl MsaaState {
    /// Sample count draws run at.
    pub fn samples(self) -> SampleCount {
        match self {
            MsaaState::Disabled => SampleCount::X1,
            MsaaState::Enabled(samples) => samples,
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, MsaaState::Enabled(_))
    }
}

/// The multisampled targets for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MsaaTargets {
    pub colors: Vec<ImageHandle>,
    pub depth: ImageHandle,
    pub samples: SampleCount,
    pub extent: Extent2D,
}

#[derive(Debug)]
pub struct MsaaManager {
    supported: SampleCountSet,
    state: MsaaState,
    targets: Option<MsaaTargets>,
}

impl MsaaManager {
    /// `supported` is probed once from the device and never changes.
    pub fn new(supported: SampleCountSet) -> Self {
        Self {
            supported,
            state: MsaaState::Disabled,
            targets: None,
        }
    }

    #[inline]
    pub fn state(&self) -> MsaaState {
        self.state
    }

    #[inline]
    pub fn supported(&self) -> SampleCountSet {
        self.supported
    }

    pub fn targets(&self) -> Option<&MsaaTargets> {
        self.targets.as_ref()
    }

    /// Turn an `(enabled, count)` request into a state, without applying it.
    ///
    /// A request to enable at 1x means disabled.
    ///
    /// # Errors
    /// Returns [`RendererError::UnsupportedSampleCount`] when the count is not
    /// 1, 2, 4 or 8, or the device cannot render at it.
    pub fn resolve_request(&self, enabled: bool, count: u32) -> RendererResult<MsaaState> {
        if !enabled {
            return Ok(MsaaState::Disabled);
        }
        let samples = SampleCount::from_count(count)
            .filter(|samples| self.supported.contains(*samples))
            .ok_or(RendererError::UnsupportedSampleCount(count))?;
        if samples.is_multisampled() {
            Ok(MsaaState::Enabled(samples))
        } else {
            Ok(MsaaState::Disabled)
        }
    }

    /// Apply a new state: release every target, then allocate again if enabled.
    ///
    /// The caller drains the GPU first. If allocation fails, whatever was
    /// created is destroyed and multisampling ends up disabled.
    pub fn recreate<B: Backend>(
        &mut self,
        backend: &mut B,
        tracker: &mut ResourceStateTracker,
        state: MsaaState,
        frame_count: usize,
        extent: Extent2D,
    ) -> RendererResult<()> {
        self.release(backend, tracker);
        self.state = MsaaState::Disabled;

        let MsaaState::Enabled(samples) = state else {
            info!("MSAA disabled");
            return Ok(());
        };

        let mut created = Vec::with_capacity(frame_count + 1);
        match allocate(backend, tracker, &mut created, samples, frame_count, extent) {
            Ok(targets) => {
                info!("MSAA enabled at {} ({})", samples, extent);
                self.state = state;
                self.targets = Some(targets);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "MSAA allocation at {} failed after {} targets, MSAA disabled",
                    samples,
                    created.len()
                );
                for image in created {
                    tracker.forget(image);
                    backend.destroy_image(image);
                }
                Err(e)
            }
        }
    }

    /// Rebuild the current configuration at a new surface size.
    pub fn resize<B: Backend>(
        &mut self,
        backend: &mut B,
        tracker: &mut ResourceStateTracker,
        frame_count: usize,
        extent: Extent2D,
    ) -> RendererResult<()> {
        if !self.state.is_enabled() {
            return Ok(());
        }
        self.recreate(backend, tracker, self.state, frame_count, extent)
    }

    /// Destroy every auxiliary target. The state is left as it was.
    pub fn release<B: Backend>(&mut self, backend: &mut B, tracker: &mut ResourceStateTracker) {
        let Some(targets) = self.targets.take() else {
            return;
        };
        for image in targets.colors.into_iter().chain(std::iter::once(targets.depth)) {
            tracker.forget(image);
            backend.destroy_image(image);
        }
        debug!("Released {} MSAA targets", targets.samples);
    }
}

/// Create one color target per slot and the shared depth target. Every image
/// created is pushed onto `created` as soon as it exists.
fn allocate<B: Backend>(
    backend: &mut B,
    tracker: &mut ResourceStateTracker,
    created: &mut Vec<ImageHandle>,
    samples: SampleCount,
    frame_count: usize,
    extent: Extent2D,
) -> RendererResult<MsaaTargets> {
    for slot in 0..frame_count {
        let desc = ImageDesc::render_target(format!("msaa color {slot}"), extent, samples);
        let image = backend.create_image(&desc)?;
        tracker.track(image, FrameTarget::MsaaColor, desc.initial_state);
        created.push(image);
    }
    let desc = ImageDesc::depth("msaa depth", extent, samples);
    let depth = backend.create_image(&desc)?;
    tracker.track(depth, FrameTarget::MsaaDepth, ResourceState::DepthWrite);
    created.push(depth);

    Ok(MsaaTargets {
        colors: created[..frame_count].to_vec(),
        depth,
        samples,
        extent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig};

    fn manager(counts: &[SampleCount]) -> MsaaManager {
        MsaaManager::new(SampleCountSet::from_counts(counts.iter().copied()))
    }

    #[test]
    fn test_request_validation() {
        let msaa = manager(&[SampleCount::X4]);
        assert_eq!(msaa.resolve_request(false, 8).unwrap(), MsaaState::Disabled);
        assert_eq!(msaa.resolve_request(true, 1).unwrap(), MsaaState::Disabled);
        assert_eq!(
            msaa.resolve_request(true, 4).unwrap(),
            MsaaState::Enabled(SampleCount::X4)
        );
        assert!(matches!(
            msaa.resolve_request(true, 8),
            Err(RendererError::UnsupportedSampleCount(8))
        ));
        assert!(matches!(
            msaa.resolve_request(true, 3),
            Err(RendererError::UnsupportedSampleCount(3))
        ));
    }

    #[test]
    fn test_enable_then_disable_releases_everything() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let probe = backend.probe();
        let mut tracker = ResourceStateTracker::new();
        let mut msaa = manager(&[SampleCount::X2, SampleCount::X4]);
        let extent = Extent2D::new(640, 480);
        let baseline = probe.live_images().len();

        msaa.recreate(&mut backend, &mut tracker, MsaaState::Enabled(SampleCount::X4), 3, extent)
            .unwrap();
        let targets = msaa.targets().unwrap().clone();
        assert_eq!(targets.colors.len(), 3);
        assert_eq!(probe.live_images().len(), baseline + 4);
        assert_eq!(probe.image(targets.depth).unwrap().desc.samples, SampleCount::X4);
        assert_eq!(tracker.state(targets.colors[0]), Some(ResourceState::RenderTarget));

        msaa.recreate(&mut backend, &mut tracker, MsaaState::Disabled, 3, extent)
            .unwrap();
        assert!(msaa.targets().is_none());
        assert_eq!(probe.live_images().len(), baseline);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn test_failed_allocation_leaves_nothing_behind() {
        // Room for the three color targets, not for the depth target.
        let mut backend = HeadlessBackend::new(HeadlessConfig {
            image_budget: Some(3),
            ..HeadlessConfig::default()
        });
        let gpu = backend.probe();
        let mut tracker = ResourceStateTracker::new();
        let mut msaa = manager(&[SampleCount::X4]);
        let baseline = gpu.live_images().len();

        let result = msaa.recreate(
            &mut backend,
            &mut tracker,
            MsaaState::Enabled(SampleCount::X4),
            3,
            Extent2D::new(640, 480),
        );

        assert!(matches!(result, Err(RendererError::Rhi(_))));
        assert_eq!(msaa.state(), MsaaState::Disabled);
        assert!(msaa.targets().is_none());
        assert_eq!(gpu.live_images().len(), baseline);
        assert_eq!(tracker.tracked_count(), 0);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn test_resize_while_disabled_allocates_nothing() {
        let mut backend = HeadlessBackend::new(HeadlessConfig::default());
        let mut tracker = ResourceStateTracker::new();
        let mut msaa = manager(&[SampleCount::X4]);
        msaa.resize(&mut backend, &mut tracker, 3, Extent2D::new(800, 600))
            .unwrap();
        assert!(msaa.targets().is_none());
    }
}
